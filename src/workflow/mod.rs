pub mod cancel;
pub mod engine;
pub mod error;
pub mod memo;
pub mod state;
pub mod step;

pub use cancel::CancelScope;
pub use engine::WorkflowEngine;
pub use error::WorkflowError;
pub use memo::StepMemo;
pub use state::RunState;
pub use step::{StepId, StepOutcome, StepState};
