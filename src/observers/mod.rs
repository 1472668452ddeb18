//! Domain observers.
//!
//! - [`ProgressObserver`] callback set reported to by a [`Runner`](crate::Runner)
//! - [`CountObserver`] completion counter
//! - `LogObserver` tracing-backed reporter (feature `logging`)

mod count;
#[cfg(feature = "logging")]
mod log;
mod progress;

pub use count::{CountObserver, Counts};
#[cfg(feature = "logging")]
pub use log::LogObserver;
pub use progress::ProgressObserver;
