use crate::remote::{Calendar, CompanyRef, Principal};

/// Mutable facts accumulated by a run as its steps succeed.
///
/// Downstream steps read what upstream steps wrote; the engine guards the
/// whole struct with one lock since steps never overlap on the same field.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    pub dsn: String,
    pub principal: Option<Principal>,
    pub company: Option<CompanyRef>,
    pub calendar: Option<Calendar>,
    pub total_hours: f64,
    pub total_amount: f64,
    pub check_count: i64,
    pub reports_run: usize,
}
