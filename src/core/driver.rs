//! Build mode selecting which command list of a module runs.

use std::fmt;

/// Which set of build commands to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BuildMode {
    /// Commands used by the dev loop (`build.dev`).
    #[default]
    Dev,
    /// Commands used for release bundles (`build.prod`).
    Prod,
}

impl BuildMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
