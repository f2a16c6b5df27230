//! Cascading payroll preprocess runner.
//!
//! A run is a fixed chain of steps: attach the database, sign in, select
//! the company, load its payroll calendar, aggregate batch totals,
//! pre-calculate paychecks, then queue the preprocess reports. Calling any
//! entry point on [`WorkflowEngine`] resolves the step's prerequisites in
//! order, runs each step at most once, and publishes progress on a
//! [`StatusBus`] that any number of observers can follow live.

pub mod config;
pub mod display;
pub mod portal;
pub mod remote;
pub mod status;
pub mod workflow;

pub use config::{ReportBatch, RunnerConfig};
pub use portal::{PortalClient, PortalConfig, PortalError};
pub use remote::{RemoteError, RemoteSystem, SimulatedRemote};
pub use status::{StatusBus, StatusKey, StatusUpdate};
pub use workflow::{
    CancelScope, RunState, StepId, StepMemo, StepOutcome, StepState, WorkflowEngine,
    WorkflowError,
};
