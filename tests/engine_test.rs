use std::sync::Arc;
use std::time::Duration;

use preflight::remote::{
    BatchTotals, Calendar, CalendarDetail, Fixture, FixtureCompany, FixtureReport, FixtureUser,
    SimulatedRemote,
};
use preflight::{
    ReportBatch, RunnerConfig, StatusKey, StatusUpdate, StepId, StepState, WorkflowEngine,
    WorkflowError,
};

fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

fn standard_calendar() -> Calendar {
    Calendar {
        check_date: "2026-09-04".to_string(),
        details: vec![
            CalendarDetail {
                totals: vec![BatchTotals {
                    hours: 3.0,
                    amount: 30.0,
                }],
            },
            CalendarDetail {
                totals: vec![BatchTotals {
                    hours: 2.0,
                    amount: 20.0,
                }],
            },
        ],
    }
}

fn standard_fixture() -> Fixture {
    Fixture {
        dsn: "PAYROLL01".to_string(),
        users: vec![FixtureUser {
            username: "clerk".to_string(),
            password: "pw".to_string(),
        }],
        companies: vec![FixtureCompany {
            code: "ACME".to_string(),
            name: "Acme Staffing".to_string(),
            calendar: Some(standard_calendar()),
            miscoded: None,
            reports: vec![
                FixtureReport {
                    label: "Gross Pay".to_string(),
                    description: "Gross pay by department".to_string(),
                    fail: false,
                },
                FixtureReport {
                    label: "Deductions".to_string(),
                    description: "Deduction register".to_string(),
                    fail: false,
                },
            ],
        }],
        check_count_script: vec![-2, -1, 7],
    }
}

fn standard_config() -> RunnerConfig {
    RunnerConfig::new("PAYROLL01", "clerk", "pw", "ACME")
        .with_reports(ReportBatch::new("Reporting/Preprocess Reports"))
}

fn engine_for(fixture: Fixture, config: RunnerConfig) -> (Arc<SimulatedRemote>, WorkflowEngine<SimulatedRemote>) {
    let remote = Arc::new(SimulatedRemote::new(fixture));
    let engine = WorkflowEngine::new(remote.clone(), config, test_logger());
    (remote, engine)
}

fn drain_key(rx: &mut tokio::sync::broadcast::Receiver<StatusUpdate>, key: StatusKey) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(update) = rx.try_recv() {
        if update.key == key {
            out.push(update.message);
        }
    }
    out
}

#[tokio::test]
async fn concurrent_entry_points_connect_once() {
    let remote = Arc::new(
        SimulatedRemote::new(standard_fixture()).with_latency(Duration::from_millis(20)),
    );
    let engine = Arc::new(WorkflowEngine::new(
        remote.clone(),
        standard_config(),
        test_logger(),
    ));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.ensure_authenticated().await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(remote.call_count("connect"), 1);
    assert_eq!(remote.call_count("authenticate"), 1);
}

#[tokio::test]
async fn reselecting_the_company_makes_no_remote_calls() {
    let (remote, engine) = engine_for(standard_fixture(), standard_config());

    engine.ensure_company_selected().await.unwrap();
    let calls_after_first = remote.calls().len();

    engine.ensure_company_selected().await.unwrap();
    assert_eq!(remote.calls().len(), calls_after_first);
    assert_eq!(
        engine.status_bus().latest(StatusKey::Status),
        Some("Company ACME already selected".to_string())
    );
}

#[tokio::test]
async fn aggregation_publishes_running_totals() {
    let (_remote, engine) = engine_for(standard_fixture(), standard_config());
    let mut rx = engine.status_bus().subscribe();

    engine.ensure_aggregated().await.unwrap();

    let amounts = drain_key(&mut rx, StatusKey::Amount);
    assert_eq!(amounts, vec!["30.00", "50.00", "50.00"]);

    let state = engine.run_state();
    assert_eq!(state.total_amount, 50.0);
    assert_eq!(state.total_hours, 5.0);
}

#[tokio::test]
async fn aggregation_publishes_running_hours() {
    let (_remote, engine) = engine_for(standard_fixture(), standard_config());
    let mut rx = engine.status_bus().subscribe();

    engine.ensure_aggregated().await.unwrap();

    let hours = drain_key(&mut rx, StatusKey::Hours);
    assert_eq!(hours, vec!["3.00", "5.00", "5.00"]);
}

#[tokio::test]
async fn empty_calendar_means_no_pay_and_cancels_the_run() {
    let mut fixture = standard_fixture();
    fixture.companies[0].calendar = Some(Calendar {
        check_date: "2026-09-04".to_string(),
        details: vec![],
    });
    let (remote, engine) = engine_for(fixture, standard_config());

    let err = engine.ensure_precalced().await.unwrap_err();
    assert_eq!(err, WorkflowError::NothingToCompute);

    assert_eq!(remote.call_count("poll_check_count"), 0);
    assert!(engine.cancel_scope().is_cancelled());
    assert_eq!(
        engine.status_bus().latest(StatusKey::CheckCount),
        Some("No pay found".to_string())
    );
    assert_eq!(
        engine.status_bus().latest(StatusKey::Status),
        Some("No pay found".to_string())
    );
}

#[tokio::test]
async fn precalc_polls_until_the_counter_settles() {
    let mut fixture = standard_fixture();
    fixture.check_count_script = vec![-5, -3, -1, 7];
    let (_remote, engine) = engine_for(fixture, standard_config());
    let mut rx = engine.status_bus().subscribe();

    engine.ensure_precalced().await.unwrap();

    let counts = drain_key(&mut rx, StatusKey::CheckCount);
    assert_eq!(counts, vec!["5", "3", "1", "7"]);
    assert_eq!(engine.run_state().check_count, 7);
}

#[tokio::test]
async fn precalc_poll_limit_fails_the_run() {
    let mut fixture = standard_fixture();
    fixture.check_count_script = vec![-9];
    let config = standard_config().with_precalc_poll_limit(3);
    let (_remote, engine) = engine_for(fixture, config);

    let err = engine.ensure_precalced().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Precalc(_)));
    assert!(engine.cancel_scope().is_cancelled());

    // The fault lands on the stage row too, not just the narrative.
    assert_eq!(
        engine.status_bus().latest(StatusKey::CheckCount),
        Some("n/a".to_string())
    );
    assert_eq!(
        engine.status_bus().latest(StatusKey::Status),
        Some("Pre-calc error: gave up after 3 progress polls".to_string())
    );
}

#[tokio::test]
async fn cancelling_mid_poll_stops_the_precalc_loop() {
    let mut fixture = standard_fixture();
    // The counter never settles, so only cancellation can end the loop.
    fixture.check_count_script = vec![-9];
    let remote = Arc::new(SimulatedRemote::new(fixture).with_latency(Duration::from_millis(20)));
    let engine = Arc::new(WorkflowEngine::new(
        remote.clone(),
        standard_config(),
        test_logger(),
    ));

    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ensure_precalced().await })
    };

    // Let the loop make at least one progress poll before cancelling.
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.cancel_scope().cancel();

    let err = runner.await.unwrap().unwrap_err();
    assert_eq!(err, WorkflowError::Cancelled);
    assert_eq!(engine.step_state(StepId::Precalc), StepState::SkippedCancelled);

    let polls_at_exit = remote.call_count("poll_check_count");
    assert!(polls_at_exit >= 1);

    // No stray polling survives the cancelled step.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(remote.call_count("poll_check_count"), polls_at_exit);
}

#[tokio::test]
async fn one_bad_report_does_not_sink_the_batch() {
    let mut fixture = standard_fixture();
    fixture.companies[0].reports = (1..=5)
        .map(|i| FixtureReport {
            label: format!("Report {}", i),
            description: format!("Preprocess report {}", i),
            fail: i == 3,
        })
        .collect();
    let (_remote, engine) = engine_for(fixture, standard_config());
    let mut rx = engine.status_bus().subscribe();

    let queued = engine.run_reports().await.unwrap();
    assert_eq!(queued, 4);

    let counts = drain_key(&mut rx, StatusKey::ReportCount);
    assert_eq!(counts, vec!["1", "2", "3", "4"]);
    assert_eq!(
        engine.status_bus().latest(StatusKey::Status),
        Some("4 reports queued, 1 failed".to_string())
    );
}

#[tokio::test]
async fn report_filter_narrows_the_batch() {
    let fixture = standard_fixture();
    let config = standard_config().with_reports(
        ReportBatch::new("Reporting/Preprocess Reports").with_filter("Deduction"),
    );
    let (remote, engine) = engine_for(fixture, config);

    let queued = engine.run_reports().await.unwrap();
    assert_eq!(queued, 1);
    assert_eq!(remote.call_count("run_report(Deductions)"), 1);
    assert_eq!(remote.call_count("run_report(Gross Pay)"), 0);
}

#[tokio::test]
async fn cancelled_engine_skips_every_step() {
    let (remote, engine) = engine_for(standard_fixture(), standard_config());
    engine.cancel_scope().cancel();

    let err = engine.ensure_connected().await.unwrap_err();
    assert_eq!(err, WorkflowError::Cancelled);
    assert!(remote.calls().is_empty());
    assert_eq!(
        engine.step_state(StepId::Connect),
        StepState::SkippedCancelled
    );
}

#[tokio::test]
async fn a_failed_sign_in_poisons_the_whole_run() {
    let fixture = standard_fixture();
    let config = RunnerConfig::new("PAYROLL01", "clerk", "wrong", "ACME");
    let (remote, engine) = engine_for(fixture, config);

    let err = engine.ensure_authenticated().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Auth { .. }));
    assert!(engine.cancel_scope().is_cancelled());

    // The failure is terminal: downstream requests fail without touching
    // the remote again.
    let calls_so_far = remote.calls().len();
    let err = engine.ensure_precalced().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Auth { .. }));
    assert_eq!(remote.calls().len(), calls_so_far);
}

#[tokio::test]
async fn a_miscoded_company_is_rejected() {
    let mut fixture = standard_fixture();
    fixture.companies[0].miscoded = Some("OTHER".to_string());
    let (_remote, engine) = engine_for(fixture, standard_config());

    let err = engine.ensure_company_selected().await.unwrap_err();
    assert_eq!(
        err,
        WorkflowError::CompanyNotFound {
            requested: "ACME".to_string(),
            found: Some("OTHER".to_string()),
        }
    );
}

#[tokio::test]
async fn the_full_chain_runs_in_order() {
    let (remote, engine) = engine_for(standard_fixture(), standard_config());

    let queued = engine.run_reports().await.unwrap();
    assert_eq!(queued, 2);

    let calls = remote.calls();
    let order: Vec<&str> = calls
        .iter()
        .map(|c| c.split('(').next().unwrap_or(c))
        .collect();
    assert_eq!(&order[..4], &["connect", "authenticate", "select_company", "load_calendar"]);
    assert_eq!(order[4], "reset_check_count");
    assert!(order[5..].starts_with(&["poll_check_count"]));
    assert_eq!(&order[order.len() - 3..], &["list_reports", "run_report", "run_report"]);

    assert_eq!(engine.step_state(StepId::RunReports), StepState::Succeeded);
    assert_eq!(
        engine.status_bus().latest(StatusKey::Status),
        Some("2 reports queued".to_string())
    );
}
