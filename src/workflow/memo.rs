use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use super::step::{StepId, StepOutcome, StepState};

/// Single-flight execution ledger: one cell per step per run.
///
/// The first caller to reach a step runs its body; concurrent and later
/// callers await the same cell and observe the identical outcome. A
/// recorded failure is terminal for the run. Retrying a failed step
/// requires a fresh memo (a fresh engine).
#[derive(Default)]
pub struct StepMemo {
    cells: Mutex<HashMap<StepId, Arc<OnceCell<StepOutcome>>>>,
}

impl StepMemo {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, step: StepId) -> Arc<OnceCell<StepOutcome>> {
        self.cells.lock().unwrap().entry(step).or_default().clone()
    }

    /// Run `body` at most once for `step`. Every caller, first or late,
    /// gets the same recorded outcome.
    pub async fn run_once<F, Fut>(&self, step: StepId, body: F) -> StepOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StepOutcome>,
    {
        self.cell(step).get_or_init(body).await.clone()
    }

    /// Record an outcome without running a body (the idempotency
    /// short-circuit: NotStarted straight to Succeeded). No effect if the
    /// step already holds an outcome.
    pub fn record(&self, step: StepId, outcome: StepOutcome) {
        let _ = self.cell(step).set(outcome);
    }

    /// Recorded outcome of `step`, if it has finished.
    pub fn outcome(&self, step: StepId) -> Option<StepOutcome> {
        let cell = self.cells.lock().unwrap().get(&step).cloned();
        cell.and_then(|c| c.get().cloned())
    }

    /// Observable lifecycle state of `step`.
    pub fn state(&self, step: StepId) -> StepState {
        let cell = self.cells.lock().unwrap().get(&step).cloned();
        match cell {
            None => StepState::NotStarted,
            Some(cell) => match cell.get() {
                None => StepState::Running,
                Some(StepOutcome::Succeeded) => StepState::Succeeded,
                Some(StepOutcome::Failed(_)) => StepState::Failed,
                Some(StepOutcome::SkippedCancelled) => StepState::SkippedCancelled,
            },
        }
    }
}
