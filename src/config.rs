use serde::{Deserialize, Serialize};

use crate::remote::ReportItem;

/// Root of the per-company report tree on the remote side. Relative batch
/// paths are resolved under it.
pub const COMPANY_TREE_ROOT: &str = "/UIRoot/CompanySets/Companies/";

/// What to run in the report phase: which tree branch, where the output
/// goes, and an optional label/description filter.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReportBatch {
    pub tree_path: String,
    pub output_override: Option<String>,
    pub filter: String,
}

impl ReportBatch {
    pub fn new(tree_path: impl Into<String>) -> Self {
        Self {
            tree_path: tree_path.into(),
            ..Self::default()
        }
    }

    pub fn with_output_override(mut self, output: impl Into<String>) -> Self {
        self.output_override = Some(output.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Absolute tree path under the company root, with stray slashes
    /// trimmed from the configured branch.
    pub fn normalized_path(&self) -> String {
        format!("{}{}", COMPANY_TREE_ROOT, self.tree_path.trim_matches('/'))
    }

    /// Whether `item` is in the batch. An empty filter admits everything;
    /// otherwise the filter must appear in the label or the description.
    pub fn matches(&self, item: &ReportItem) -> bool {
        self.filter.is_empty()
            || item.label.contains(&self.filter)
            || item.description.contains(&self.filter)
    }
}

/// Everything one preprocess run needs up front.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub dsn: String,
    pub username: String,
    pub password: String,
    pub company: String,
    pub reports: ReportBatch,
    /// Maximum number of pre-calc progress polls before the run gives up.
    /// `None` polls until the counter goes non-negative.
    pub precalc_poll_limit: Option<u32>,
}

impl RunnerConfig {
    pub fn new(
        dsn: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        company: impl Into<String>,
    ) -> Self {
        Self {
            dsn: dsn.into(),
            username: username.into(),
            password: password.into(),
            company: company.into(),
            reports: ReportBatch::default(),
            precalc_poll_limit: None,
        }
    }

    pub fn with_reports(mut self, reports: ReportBatch) -> Self {
        self.reports = reports;
        self
    }

    pub fn with_precalc_poll_limit(mut self, limit: u32) -> Self {
        self.precalc_poll_limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_path_trims_and_prefixes() {
        let batch = ReportBatch::new("/Reporting/Preprocess Reports/");
        assert_eq!(
            batch.normalized_path(),
            "/UIRoot/CompanySets/Companies/Reporting/Preprocess Reports"
        );
    }

    #[test]
    fn empty_filter_admits_everything() {
        let batch = ReportBatch::new("Reporting");
        let item = ReportItem {
            label: "Gross Pay".to_string(),
            description: "Gross pay by department".to_string(),
        };
        assert!(batch.matches(&item));
        assert!(batch.clone().with_filter("department").matches(&item));
        assert!(!batch.with_filter("401k").matches(&item));
    }

    #[test]
    fn builder_fills_in_defaults() {
        let config = RunnerConfig::new("PAYROLL01", "clerk", "pw", "ACME");
        assert!(config.precalc_poll_limit.is_none());
        assert!(config.reports.tree_path.is_empty());

        let config = config.with_precalc_poll_limit(50);
        assert_eq!(config.precalc_poll_limit, Some(50));
    }
}
