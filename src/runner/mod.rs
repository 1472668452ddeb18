//! Runner: deduplicated, stamped and observed execution of a trajectory.
//!
//! - [`Runner`], [`RunnerBuilder`], [`RunReport`], [`Disposition`] orchestration
//! - [`Deduplicator`] stored-record matching
//! - [`ProgressAdapter`] update → progress callback translation
//! - [`BatchStamp`] per-batch metadata

mod adapter;
mod dedup;
mod orchestrator;
mod stamp;

pub use adapter::ProgressAdapter;
pub use dedup::Deduplicator;
pub use orchestrator::{Disposition, RunReport, Runner, RunnerBuilder};
pub use stamp::BatchStamp;
