use super::error::WorkflowError;

/// The preprocess chain, one variant per step, in dependency order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepId {
    Connect,
    Authenticate,
    SelectCompany,
    LoadCalendar,
    Aggregate,
    Precalc,
    RunReports,
}

impl StepId {
    /// Direct prerequisites, in declared (left-to-right) resolution order.
    pub fn prerequisites(self) -> &'static [StepId] {
        use StepId::*;
        match self {
            Connect => &[],
            Authenticate => &[Connect],
            SelectCompany => &[Authenticate],
            LoadCalendar => &[SelectCompany],
            Aggregate => &[LoadCalendar],
            Precalc => &[Aggregate],
            RunReports => &[Precalc],
        }
    }

    /// Transitive prerequisite chain, outermost dependency first, ending
    /// with `self`. This is the order the engine resolves steps in.
    pub fn chain(self) -> Vec<StepId> {
        fn walk(step: StepId, out: &mut Vec<StepId>) {
            for &dep in step.prerequisites() {
                if !out.contains(&dep) {
                    walk(dep, out);
                }
            }
            if !out.contains(&step) {
                out.push(step);
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }

    pub fn name(self) -> &'static str {
        match self {
            StepId::Connect => "connect",
            StepId::Authenticate => "authenticate",
            StepId::SelectCompany => "select-company",
            StepId::LoadCalendar => "load-calendar",
            StepId::Aggregate => "aggregate",
            StepId::Precalc => "precalc",
            StepId::RunReports => "run-reports",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal result recorded for a step within one run.
#[derive(Clone, Debug)]
pub enum StepOutcome {
    Succeeded,
    Failed(WorkflowError),
    SkippedCancelled,
}

impl StepOutcome {
    pub fn into_result(self) -> Result<(), WorkflowError> {
        match self {
            StepOutcome::Succeeded => Ok(()),
            StepOutcome::Failed(err) => Err(err),
            StepOutcome::SkippedCancelled => Err(WorkflowError::Cancelled),
        }
    }
}

/// Observable lifecycle state of a step within one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    SkippedCancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ends_with_self_in_dependency_order() {
        assert_eq!(StepId::Connect.chain(), vec![StepId::Connect]);
        assert_eq!(
            StepId::RunReports.chain(),
            vec![
                StepId::Connect,
                StepId::Authenticate,
                StepId::SelectCompany,
                StepId::LoadCalendar,
                StepId::Aggregate,
                StepId::Precalc,
                StepId::RunReports,
            ]
        );
    }

    #[test]
    fn shared_prerequisites_appear_once() {
        let chain = StepId::Precalc.chain();
        let connects = chain.iter().filter(|&&s| s == StepId::Connect).count();
        assert_eq!(connects, 1);
    }
}
