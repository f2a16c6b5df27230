use std::sync::{Arc, Mutex};
use std::time::Duration;

use slog::{debug, info, warn, Logger};

use crate::config::RunnerConfig;
use crate::display::{format_amount, format_count};
use crate::remote::RemoteSystem;
use crate::status::{StatusBus, StatusKey};

use super::cancel::CancelScope;
use super::error::WorkflowError;
use super::memo::StepMemo;
use super::state::RunState;
use super::step::{StepId, StepOutcome, StepState};

/// Delay between pre-calc progress polls.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// One preprocess run against one remote system.
///
/// Any entry point can be called first; the engine resolves the step's
/// whole prerequisite chain, running each step at most once. A failing
/// step cancels the rest of the run. The engine is single-use: a new run
/// means a new engine.
pub struct WorkflowEngine<R: RemoteSystem> {
    remote: Arc<R>,
    config: RunnerConfig,
    bus: Arc<StatusBus>,
    cancel: CancelScope,
    memo: StepMemo,
    state: Mutex<RunState>,
    logger: Logger,
}

impl<R: RemoteSystem> WorkflowEngine<R> {
    pub fn new(remote: Arc<R>, config: RunnerConfig, logger: Logger) -> Self {
        Self {
            remote,
            config,
            bus: Arc::new(StatusBus::new()),
            cancel: CancelScope::new(),
            memo: StepMemo::new(),
            state: Mutex::new(RunState::default()),
            logger,
        }
    }

    pub fn status_bus(&self) -> Arc<StatusBus> {
        self.bus.clone()
    }

    /// Handle for cancelling this run from outside (a signal handler, a
    /// UI button, another task).
    pub fn cancel_scope(&self) -> CancelScope {
        self.cancel.clone()
    }

    pub fn step_state(&self, step: StepId) -> StepState {
        self.memo.state(step)
    }

    /// Snapshot of the facts the run has accumulated so far.
    pub fn run_state(&self) -> RunState {
        self.state.lock().unwrap().clone()
    }

    pub async fn ensure_connected(&self) -> Result<(), WorkflowError> {
        self.ensure(StepId::Connect).await
    }

    pub async fn ensure_authenticated(&self) -> Result<(), WorkflowError> {
        self.ensure(StepId::Authenticate).await
    }

    pub async fn ensure_company_selected(&self) -> Result<(), WorkflowError> {
        self.ensure(StepId::SelectCompany).await
    }

    pub async fn ensure_calendar_loaded(&self) -> Result<(), WorkflowError> {
        self.ensure(StepId::LoadCalendar).await
    }

    pub async fn ensure_aggregated(&self) -> Result<(), WorkflowError> {
        self.ensure(StepId::Aggregate).await
    }

    pub async fn ensure_precalced(&self) -> Result<(), WorkflowError> {
        self.ensure(StepId::Precalc).await
    }

    /// Run the whole chain through the report batch. Returns the number of
    /// reports queued; individual report failures are recovered and do not
    /// fail the batch.
    pub async fn run_reports(&self) -> Result<usize, WorkflowError> {
        self.ensure(StepId::RunReports).await?;
        Ok(self.state.lock().unwrap().reports_run)
    }

    async fn ensure(&self, step: StepId) -> Result<(), WorkflowError> {
        if let Some(note) = self.effect_holds(step) {
            self.bus.publish(StatusKey::Status, note);
            self.memo.record(step, StepOutcome::Succeeded);
            return Ok(());
        }
        for dep in step.chain() {
            self.run_memoized(dep).await.into_result()?;
        }
        Ok(())
    }

    /// If the observable effect of `step` already holds, the message to
    /// publish in lieu of running it.
    fn effect_holds(&self, step: StepId) -> Option<String> {
        let state = self.state.lock().unwrap();
        match step {
            StepId::Connect if state.dsn == self.config.dsn && !state.dsn.is_empty() => {
                Some(format!("Database {} already attached", state.dsn))
            }
            StepId::Authenticate => state
                .principal
                .as_ref()
                .filter(|p| p.username == self.config.username)
                .map(|p| format!("{} already signed in", p.username)),
            StepId::SelectCompany => state
                .company
                .as_ref()
                .filter(|c| c.code == self.config.company)
                .map(|c| format!("Company {} already selected", c.code)),
            StepId::LoadCalendar => state
                .calendar
                .as_ref()
                .map(|c| format!("Calendar for check date {} already loaded", c.check_date)),
            _ => None,
        }
    }

    async fn run_memoized(&self, step: StepId) -> StepOutcome {
        self.memo
            .run_once(step, || async move {
                if self.cancel.is_cancelled() {
                    debug!(self.logger, "step skipped"; "step" => %step);
                    return StepOutcome::SkippedCancelled;
                }
                if let Some(note) = self.effect_holds(step) {
                    self.bus.publish(StatusKey::Status, note);
                    return StepOutcome::Succeeded;
                }
                match self.execute(step).await {
                    Ok(()) => {
                        info!(self.logger, "step complete"; "step" => %step);
                        StepOutcome::Succeeded
                    }
                    Err(WorkflowError::Cancelled) => StepOutcome::SkippedCancelled,
                    Err(err) => {
                        self.cancel.cancel();
                        self.bus.publish(StatusKey::Status, err.to_string());
                        warn!(self.logger, "step failed"; "step" => %step, "error" => %err);
                        StepOutcome::Failed(err)
                    }
                }
            })
            .await
    }

    async fn execute(&self, step: StepId) -> Result<(), WorkflowError> {
        match step {
            StepId::Connect => self.connect_step().await,
            StepId::Authenticate => self.authenticate_step().await,
            StepId::SelectCompany => self.select_company_step().await,
            StepId::LoadCalendar => self.load_calendar_step().await,
            StepId::Aggregate => self.aggregate_step().await,
            StepId::Precalc => self.precalc_step().await,
            StepId::RunReports => self.run_reports_step().await,
        }
    }

    async fn connect_step(&self) -> Result<(), WorkflowError> {
        self.remote
            .connect(&self.config.dsn)
            .await
            .map_err(|e| WorkflowError::Connection(e.to_string()))?;
        self.state.lock().unwrap().dsn = self.config.dsn.clone();
        self.bus.publish(StatusKey::Dsn, &self.config.dsn);
        self.bus
            .publish(StatusKey::Status, format!("Database {} attached", self.config.dsn));
        Ok(())
    }

    async fn authenticate_step(&self) -> Result<(), WorkflowError> {
        self.bus
            .publish(StatusKey::Status, format!("{} signing in...", self.config.username));
        let principal = self
            .remote
            .authenticate(&self.config.username, &self.config.password)
            .await
            .map_err(|e| WorkflowError::Auth {
                user: self.config.username.clone(),
                message: e.to_string(),
            })?;
        self.bus.publish(StatusKey::User, &principal.username);
        self.state.lock().unwrap().principal = Some(principal);
        self.bus.publish(StatusKey::Status, "Sign-in complete");
        Ok(())
    }

    async fn select_company_step(&self) -> Result<(), WorkflowError> {
        let company = self
            .remote
            .select_company(&self.config.company)
            .await
            .map_err(|_| WorkflowError::CompanyNotFound {
                requested: self.config.company.clone(),
                found: None,
            })?;
        // The remote answers with whatever company it actually loaded.
        if company.code != self.config.company {
            return Err(WorkflowError::CompanyNotFound {
                requested: self.config.company.clone(),
                found: Some(company.code),
            });
        }
        self.bus
            .publish(StatusKey::Company, format!("{} ({})", company.code, company.name));
        self.bus
            .publish(StatusKey::Status, format!("Company {} selected", company.code));
        self.state.lock().unwrap().company = Some(company);
        Ok(())
    }

    async fn load_calendar_step(&self) -> Result<(), WorkflowError> {
        let company = self
            .state
            .lock()
            .unwrap()
            .company
            .clone()
            .ok_or_else(|| WorkflowError::CalendarMissing("no company selected".to_string()))?;
        match self.remote.load_calendar(&company).await {
            Ok(calendar) => {
                self.bus.publish(StatusKey::CheckDate, &calendar.check_date);
                self.bus.publish(
                    StatusKey::Status,
                    format!("Calendar loaded for check date {}", calendar.check_date),
                );
                self.state.lock().unwrap().calendar = Some(calendar);
                Ok(())
            }
            Err(e) => {
                self.bus.publish(StatusKey::CheckDate, "n/a");
                Err(WorkflowError::CalendarMissing(e.to_string()))
            }
        }
    }

    async fn aggregate_step(&self) -> Result<(), WorkflowError> {
        let calendar = match self.state.lock().unwrap().calendar.clone() {
            Some(calendar) => calendar,
            None => {
                // Mark the stage rows as well as the narrative.
                self.bus.publish(StatusKey::Amount, "n/a");
                self.bus.publish(StatusKey::Hours, "n/a");
                return Err(WorkflowError::Aggregation("no calendar loaded".to_string()));
            }
        };

        let mut hours = 0.0_f64;
        let mut amount = 0.0_f64;
        for detail in &calendar.details {
            if self.cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }
            for totals in &detail.totals {
                amount += totals.amount;
                hours += totals.hours;
                // Running totals, visible as they accumulate.
                self.bus.publish(StatusKey::Amount, format_amount(amount));
                self.bus.publish(StatusKey::Hours, format_amount(hours));
            }
        }
        self.bus.publish(StatusKey::Amount, format_amount(amount));
        self.bus.publish(StatusKey::Hours, format_amount(hours));
        self.bus
            .publish(StatusKey::Status, "Aggregation of batch totals complete");

        let mut state = self.state.lock().unwrap();
        state.total_hours = hours;
        state.total_amount = amount;
        Ok(())
    }

    async fn precalc_step(&self) -> Result<(), WorkflowError> {
        let (hours, amount) = {
            let state = self.state.lock().unwrap();
            (state.total_hours, state.total_amount)
        };
        if hours == 0.0 && amount == 0.0 {
            self.bus.publish(StatusKey::CheckCount, "No pay found");
            return Err(WorkflowError::NothingToCompute);
        }

        self.bus.publish(StatusKey::Status, "Pre-calculating paychecks...");
        self.remote
            .reset_check_count()
            .await
            .map_err(|e| self.precalc_fault(e.to_string()))?;

        let mut polls = 0u32;
        let count = loop {
            if self.cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }
            let value = self
                .remote
                .poll_check_count()
                .await
                .map_err(|e| self.precalc_fault(e.to_string()))?;
            if value >= 0 {
                break value;
            }
            // Negative magnitude is the number of checks still in flight.
            self.bus.publish(StatusKey::CheckCount, format_count(value.abs()));
            polls += 1;
            if let Some(limit) = self.config.precalc_poll_limit {
                if polls >= limit {
                    return Err(
                        self.precalc_fault(format!("gave up after {} progress polls", polls))
                    );
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        };

        self.bus.publish(StatusKey::CheckCount, format_count(count));
        self.bus.publish(StatusKey::Status, "Pre-calc complete");
        self.state.lock().unwrap().check_count = count;
        Ok(())
    }

    // Mark the check-count row before the narrative gets the message.
    fn precalc_fault(&self, message: String) -> WorkflowError {
        self.bus.publish(StatusKey::CheckCount, "n/a");
        WorkflowError::Precalc(message)
    }

    async fn run_reports_step(&self) -> Result<(), WorkflowError> {
        let path = self.config.reports.normalized_path();
        let company = self
            .state
            .lock()
            .unwrap()
            .company
            .clone()
            .ok_or_else(|| WorkflowError::ReportTree {
                path: path.clone(),
                message: "no company selected".to_string(),
            })?;

        self.bus.publish(StatusKey::Status, "Running reports...");
        let items = self
            .remote
            .list_reports(&company, &path)
            .await
            .map_err(|e| WorkflowError::ReportTree {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let mut queued = 0usize;
        let mut failed = 0usize;
        for item in items.iter().filter(|i| self.config.reports.matches(i)) {
            if self.cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }
            match self
                .remote
                .run_report(&company, item, self.config.reports.output_override.as_deref())
                .await
            {
                Ok(()) => {
                    queued += 1;
                    self.bus
                        .publish(StatusKey::ReportCount, format_count(queued as i64));
                }
                Err(e) => {
                    // One bad report must not sink the batch.
                    failed += 1;
                    let fault = WorkflowError::ReportItem {
                        label: item.label.clone(),
                        message: e.to_string(),
                    };
                    self.bus.publish(StatusKey::Status, fault.to_string());
                    warn!(self.logger, "report failed"; "report" => %item.label, "error" => %e);
                }
            }
        }

        let summary = if failed == 0 {
            format!("{} report{} queued", queued, plural(queued))
        } else {
            format!("{} report{} queued, {} failed", queued, plural(queued), failed)
        };
        self.bus.publish(StatusKey::Status, summary);
        self.state.lock().unwrap().reports_run = queued;
        Ok(())
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
