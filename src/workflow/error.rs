/// Errors that can stop a preprocess run.
///
/// Every variant except `ReportItem` aborts the whole run: the engine
/// trips the shared [`CancelScope`](super::CancelScope) and publishes the
/// message under the status narrative key. `ReportItem` is recovered
/// locally by the batch loop. There is no automatic retry at any layer;
/// retrying means constructing a fresh engine.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkflowError {
    /// Could not attach to the remote system instance.
    Connection(String),
    /// Sign-in was rejected or failed.
    Auth { user: String, message: String },
    /// The requested company could not be loaded, or the remote returned
    /// a different company than the one requested.
    CompanyNotFound {
        requested: String,
        found: Option<String>,
    },
    /// The company calendar could not be loaded.
    CalendarMissing(String),
    /// Batch totals could not be aggregated.
    Aggregation(String),
    /// Paycheck pre-calculation failed.
    Precalc(String),
    /// Aggregation found no open pay. A legitimate terminal condition,
    /// not a fault, but it still ends the run: there is no work to do.
    NothingToCompute,
    /// The report tree path could not be resolved.
    ReportTree { path: String, message: String },
    /// A single report failed. Recovered locally: the batch loop logs,
    /// publishes and moves on to the next item.
    ReportItem { label: String, message: String },
    /// The run was cancelled before this step could do useful work.
    Cancelled,
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowError::Connection(msg) => write!(f, "Error attaching database: {}", msg),
            WorkflowError::Auth { user, message } => {
                write!(f, "{} user sign-in error: {}", user, message)
            }
            WorkflowError::CompanyNotFound {
                requested,
                found: Some(found),
            } => write!(
                f,
                "Requested company {} but the remote returned {}",
                requested, found
            ),
            WorkflowError::CompanyNotFound {
                requested,
                found: None,
            } => write!(f, "Error loading company {}", requested),
            WorkflowError::CalendarMissing(msg) => {
                write!(f, "Could not load the company calendar: {}", msg)
            }
            WorkflowError::Aggregation(msg) => {
                write!(f, "Could not aggregate batch totals: {}", msg)
            }
            WorkflowError::Precalc(msg) => write!(f, "Pre-calc error: {}", msg),
            WorkflowError::NothingToCompute => write!(f, "No pay found"),
            WorkflowError::ReportTree { path, message } => {
                write!(f, "Could not find the report tree path {}: {}", path, message)
            }
            WorkflowError::ReportItem { label, message } => {
                write!(f, "Could not run {}: {}", label, message)
            }
            WorkflowError::Cancelled => write!(f, "Run cancelled"),
        }
    }
}

impl std::error::Error for WorkflowError {}
