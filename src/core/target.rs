//! Build targets: the two modules of a game package.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One module of the game package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Ui,
    Game,
}

impl Target {
    pub const ALL: [Self; 2] = [Self::Ui, Self::Game];

    /// Wire name used in reload events.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ui => "ui",
            Self::Game => "game",
        }
    }

    /// Human-facing name for log lines.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ui => "UI",
            Self::Game => "Game",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags::bitflags! {
    /// A set of targets, used for build requests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Targets: u8 {
        const UI = 1 << 0;
        const GAME = 1 << 1;
    }
}

impl From<Target> for Targets {
    fn from(target: Target) -> Self {
        match target {
            Target::Ui => Self::UI,
            Target::Game => Self::GAME,
        }
    }
}

impl Targets {
    /// Targets in the set, UI first.
    pub fn targets(self) -> impl Iterator<Item = Target> {
        Target::ALL
            .into_iter()
            .filter(move |t| self.contains(Self::from(*t)))
    }

    /// Comma-separated labels, e.g. `UI, Game`.
    pub fn describe(self) -> String {
        let labels: Vec<_> = self.targets().map(Target::label).collect();
        if labels.is_empty() {
            "nothing".to_string()
        } else {
            labels.join(", ")
        }
    }
}
