//! Job dispatch: specs, workers, the bounded pool and process-group termination.
//!
//! ## Contents
//! - [`JobSpec`], [`JobPayload`], [`FunctionCall`] what a job runs
//! - [`Dispatcher`], [`BatchReport`], [`JobResult`] batch execution and its outcome
//! - [`run_command`], [`run_function`] ad hoc single jobs with captured output
//! - [`FunctionTable`] child-side registry for isolated function jobs
//! - [`wait_for_shutdown_signal`] OS signal hook

mod dispatcher;
mod function;
mod shutdown;
mod spec;
pub(crate) mod terminate;
mod worker;

pub use dispatcher::{BatchReport, Dispatcher, run_command, run_function};
pub use function::{CALL_ENV, EXIT_BAD_CALL, EXIT_FAILED, EXIT_PANICKED, EXIT_UNKNOWN, FunctionTable};
pub use shutdown::wait_for_shutdown_signal;
pub use spec::{FunctionCall, JobPayload, JobSpec};
pub use terminate::{Delivery, group_alive, signal_group};
pub use worker::JobResult;
