//! rotabak core library
//!
//! Backup entry pipeline with tiered daily/weekly/monthly retention and
//! reconciliation of a remote copy against the local artifacts.

pub mod artifact;
pub mod capability;
pub mod catalog;
pub mod checksum;
pub mod context;
pub mod fs;
pub mod pipeline;
pub mod retention;
pub mod rotation;
pub mod run;
pub mod sync;
pub mod utils;

// Re-export commonly used types
pub use artifact::Artifact;
pub use catalog::ArtifactCatalog;
pub use checksum::ChecksumKind;
pub use context::{CalendarAnchors, RunContext};
pub use pipeline::{Entry, EntryPipeline, EntryReport};
pub use retention::{classify, RetentionSchedule, Tier};
pub use run::{EntryOutcome, RunController, RunReport};
pub use sync::SyncPlan;
pub use utils::errors::{CoreError, Result};
