//! Seam to the payroll back end.
//!
//! Everything the workflow needs from the remote system goes through
//! [`RemoteSystem`], so the engine can run against the real service or the
//! in-process [`SimulatedRemote`] interchangeably.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod simulated;

pub use simulated::{Fixture, FixtureCompany, FixtureReport, FixtureUser, SimulatedRemote};

/// Authenticated user identity returned by a successful sign-in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
}

/// A company loaded in the remote session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompanyRef {
    pub code: String,
    pub name: String,
}

/// Hours and dollar amount of one batch line.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchTotals {
    pub hours: f64,
    pub amount: f64,
}

/// One detail section of a calendar, holding its batch totals.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct CalendarDetail {
    pub totals: Vec<BatchTotals>,
}

/// The open payroll calendar for a company.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Calendar {
    pub check_date: String,
    pub details: Vec<CalendarDetail>,
}

/// A runnable report under the company report tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportItem {
    pub label: String,
    pub description: String,
}

/// Opaque failure from the remote side.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteError(pub String);

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for RemoteError {}

/// The operations a payroll back end must provide.
///
/// Methods are session-oriented: `connect` must precede `authenticate`,
/// which must precede everything else. The engine enforces that ordering;
/// implementations may assume it.
#[async_trait]
pub trait RemoteSystem: Send + Sync {
    /// Attach to the instance named by `dsn`.
    async fn connect(&self, dsn: &str) -> Result<(), RemoteError>;

    /// Sign in and return the authenticated principal.
    async fn authenticate(&self, user: &str, password: &str) -> Result<Principal, RemoteError>;

    /// Load the company with the given code into the session. The returned
    /// ref carries whatever company the remote actually loaded, which the
    /// caller must verify against the request.
    async fn select_company(&self, code: &str) -> Result<CompanyRef, RemoteError>;

    /// Load the open payroll calendar for the selected company.
    async fn load_calendar(&self, company: &CompanyRef) -> Result<Calendar, RemoteError>;

    /// Zero the server-side pre-calc progress counter before polling.
    async fn reset_check_count(&self) -> Result<(), RemoteError>;

    /// Current pre-calc counter. Negative magnitude means checks still in
    /// flight; a non-negative value is the final count.
    async fn poll_check_count(&self) -> Result<i64, RemoteError>;

    /// Reports available under `tree_path` for the company.
    async fn list_reports(
        &self,
        company: &CompanyRef,
        tree_path: &str,
    ) -> Result<Vec<ReportItem>, RemoteError>;

    /// Queue one report for execution.
    async fn run_report(
        &self,
        company: &CompanyRef,
        item: &ReportItem,
        output_override: Option<&str>,
    ) -> Result<(), RemoteError>;
}
