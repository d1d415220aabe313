//! Actor Message Definitions
//!
//! ```text
//! FsActor --Rebuild(targets)--> BuildActor --reload / buildError--> LiveReloadHub
//! ```

use crate::core::Targets;

/// Messages to the build actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMsg {
    /// Rebuild these targets in dev mode
    Rebuild(Targets),
    /// Finish the current build, then stop
    Shutdown,
}
