//! In-process stand-in for the payroll back end, driven by a JSON fixture.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    Calendar, CompanyRef, Principal, RemoteError, RemoteSystem, ReportItem,
};

/// A credential pair accepted by the simulated sign-in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FixtureUser {
    pub username: String,
    pub password: String,
}

/// One report the simulated tree exposes. `fail` makes `run_report`
/// return an error for that item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FixtureReport {
    pub label: String,
    pub description: String,
    #[serde(default)]
    pub fail: bool,
}

/// A company the simulated remote knows about. When `miscoded` is set,
/// `select_company` answers with that code instead of the requested one,
/// simulating a remote that loaded the wrong company.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FixtureCompany {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub calendar: Option<Calendar>,
    #[serde(default)]
    pub miscoded: Option<String>,
    #[serde(default)]
    pub reports: Vec<FixtureReport>,
}

/// Full script for one simulated session.
///
/// `check_count_script` is consumed one value per `poll_check_count` call;
/// once exhausted the last value repeats.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fixture {
    pub dsn: String,
    pub users: Vec<FixtureUser>,
    pub companies: Vec<FixtureCompany>,
    #[serde(default)]
    pub check_count_script: Vec<i64>,
}

/// [`RemoteSystem`] implementation backed by a [`Fixture`].
///
/// Records every call it receives so tests can assert on call counts, and
/// can inject per-call latency to widen race windows.
pub struct SimulatedRemote {
    fixture: Fixture,
    calls: Mutex<Vec<String>>,
    poll_cursor: Mutex<usize>,
    latency: Duration,
}

impl SimulatedRemote {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture,
            calls: Mutex::new(Vec::new()),
            poll_cursor: Mutex::new(0),
            latency: Duration::ZERO,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every call received so far, in order, as "method(args)" strings.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls whose name starts with `prefix`.
    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    async fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
        if self.latency > Duration::ZERO {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn company(&self, code: &str) -> Option<&FixtureCompany> {
        self.fixture.companies.iter().find(|c| c.code == code)
    }
}

#[async_trait]
impl RemoteSystem for SimulatedRemote {
    async fn connect(&self, dsn: &str) -> Result<(), RemoteError> {
        self.record(format!("connect({})", dsn)).await;
        if dsn == self.fixture.dsn {
            Ok(())
        } else {
            Err(RemoteError(format!("unknown instance {}", dsn)))
        }
    }

    async fn authenticate(&self, user: &str, password: &str) -> Result<Principal, RemoteError> {
        self.record(format!("authenticate({})", user)).await;
        let known = self
            .fixture
            .users
            .iter()
            .any(|u| u.username == user && u.password == password);
        if known {
            Ok(Principal {
                username: user.to_string(),
            })
        } else {
            Err(RemoteError("invalid credentials".to_string()))
        }
    }

    async fn select_company(&self, code: &str) -> Result<CompanyRef, RemoteError> {
        self.record(format!("select_company({})", code)).await;
        match self.company(code) {
            Some(company) => Ok(CompanyRef {
                code: company.miscoded.clone().unwrap_or_else(|| company.code.clone()),
                name: company.name.clone(),
            }),
            None => Err(RemoteError(format!("no company {}", code))),
        }
    }

    async fn load_calendar(&self, company: &CompanyRef) -> Result<Calendar, RemoteError> {
        self.record(format!("load_calendar({})", company.code)).await;
        self.company(&company.code)
            .and_then(|c| c.calendar.clone())
            .ok_or_else(|| RemoteError(format!("no open calendar for {}", company.code)))
    }

    async fn reset_check_count(&self) -> Result<(), RemoteError> {
        self.record("reset_check_count".to_string()).await;
        *self.poll_cursor.lock().unwrap() = 0;
        Ok(())
    }

    async fn poll_check_count(&self) -> Result<i64, RemoteError> {
        self.record("poll_check_count".to_string()).await;
        let script = &self.fixture.check_count_script;
        if script.is_empty() {
            return Ok(0);
        }
        let mut cursor = self.poll_cursor.lock().unwrap();
        let value = script[(*cursor).min(script.len() - 1)];
        *cursor += 1;
        Ok(value)
    }

    async fn list_reports(
        &self,
        company: &CompanyRef,
        tree_path: &str,
    ) -> Result<Vec<ReportItem>, RemoteError> {
        self.record(format!("list_reports({})", tree_path)).await;
        match self.company(&company.code) {
            Some(c) => Ok(c
                .reports
                .iter()
                .map(|r| ReportItem {
                    label: r.label.clone(),
                    description: r.description.clone(),
                })
                .collect()),
            None => Err(RemoteError(format!("no such path {}", tree_path))),
        }
    }

    async fn run_report(
        &self,
        company: &CompanyRef,
        item: &ReportItem,
        _output_override: Option<&str>,
    ) -> Result<(), RemoteError> {
        self.record(format!("run_report({})", item.label)).await;
        let scripted_fail = self
            .company(&company.code)
            .and_then(|c| c.reports.iter().find(|r| r.label == item.label))
            .map(|r| r.fail)
            .unwrap_or(false);
        if scripted_fail {
            Err(RemoteError("report engine rejected the request".to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::BatchTotals;

    fn fixture() -> Fixture {
        Fixture {
            dsn: "PAYROLL01".to_string(),
            users: vec![FixtureUser {
                username: "clerk".to_string(),
                password: "pw".to_string(),
            }],
            companies: vec![FixtureCompany {
                code: "ACME".to_string(),
                name: "Acme Staffing".to_string(),
                calendar: Some(Calendar {
                    check_date: "2026-09-04".to_string(),
                    details: vec![crate::remote::CalendarDetail {
                        totals: vec![BatchTotals {
                            hours: 40.0,
                            amount: 1200.0,
                        }],
                    }],
                }),
                miscoded: None,
                reports: vec![],
            }],
            check_count_script: vec![-2, 5],
        }
    }

    #[tokio::test]
    async fn records_calls_in_order() {
        let remote = SimulatedRemote::new(fixture());
        remote.connect("PAYROLL01").await.unwrap();
        remote.authenticate("clerk", "pw").await.unwrap();

        assert_eq!(
            remote.calls(),
            vec!["connect(PAYROLL01)", "authenticate(clerk)"]
        );
        assert_eq!(remote.call_count("connect"), 1);
    }

    #[tokio::test]
    async fn poll_script_repeats_its_last_value() {
        let remote = SimulatedRemote::new(fixture());
        remote.reset_check_count().await.unwrap();
        assert_eq!(remote.poll_check_count().await.unwrap(), -2);
        assert_eq!(remote.poll_check_count().await.unwrap(), 5);
        assert_eq!(remote.poll_check_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn rejects_bad_credentials() {
        let remote = SimulatedRemote::new(fixture());
        assert!(remote.authenticate("clerk", "wrong").await.is_err());
    }

    #[tokio::test]
    async fn fixture_round_trips_through_json() {
        let json = serde_json::to_string(&fixture()).unwrap();
        let remote = SimulatedRemote::from_json(&json).unwrap();
        remote.connect("PAYROLL01").await.unwrap();
    }
}
