use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use slog::{error, info, o, Drain, Logger};

use preflight::portal::{PortalClient, PortalConfig};
use preflight::remote::SimulatedRemote;
use preflight::{display, ReportBatch, RunnerConfig, WorkflowEngine};

/// Run the payroll preprocess chain for one company and watch it live.
#[derive(Parser, Debug)]
#[command(name = "preflight", version, about)]
struct Args {
    /// Database instance to attach.
    #[arg(long)]
    dsn: String,

    /// Sign-in user.
    #[arg(long)]
    user: String,

    /// Sign-in password.
    #[arg(long)]
    password: String,

    /// Company code to preprocess.
    #[arg(long)]
    company: String,

    /// Report tree branch to run, relative to the company root.
    #[arg(long, default_value = "Reporting/Preprocess Reports")]
    tree_path: String,

    /// Redirect report output to this destination.
    #[arg(long)]
    output: Option<String>,

    /// Only run reports whose label or description contains this text.
    #[arg(long, default_value = "")]
    filter: String,

    /// JSON fixture describing the simulated back end.
    #[arg(long)]
    fixture: PathBuf,

    /// Give up pre-calc after this many progress polls.
    #[arg(long)]
    poll_limit: Option<u32>,

    /// JSON portal config; when given, a portal sync runs before the chain.
    #[arg(long)]
    portal: Option<PathBuf>,
}

// Log to stderr so the panel owns stdout.
fn build_logger() -> Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stderr());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let logger = build_logger();

    let fixture_json = match std::fs::read_to_string(&args.fixture) {
        Ok(json) => json,
        Err(err) => {
            error!(logger, "could not read fixture"; "path" => %args.fixture.display(), "error" => %err);
            std::process::exit(1);
        }
    };
    let remote = match SimulatedRemote::from_json(&fixture_json) {
        Ok(remote) => Arc::new(remote),
        Err(err) => {
            error!(logger, "fixture is not valid"; "error" => %err);
            std::process::exit(1);
        }
    };

    let mut reports = ReportBatch::new(args.tree_path).with_filter(args.filter);
    if let Some(output) = args.output {
        reports = reports.with_output_override(output);
    }
    let mut config = RunnerConfig::new(args.dsn, args.user, args.password, args.company)
        .with_reports(reports);
    if let Some(limit) = args.poll_limit {
        config = config.with_precalc_poll_limit(limit);
    }

    let engine = WorkflowEngine::new(remote, config, logger.new(o!("component" => "engine")));

    // Subscribe without holding the bus so dropping the engine closes the
    // stream and lets the panel task finish.
    let panel_rx = engine.status_bus().subscribe();
    let panel_task = tokio::spawn(display::run_live_panel(panel_rx));

    if let Some(path) = args.portal {
        if let Err(code) = run_portal_sync(&path, &engine, &logger).await {
            drop(engine);
            let _ = panel_task.await;
            std::process::exit(code);
        }
    }

    let result = engine.run_reports().await;
    match &result {
        Ok(queued) => info!(logger, "run complete"; "reports_queued" => *queued),
        Err(err) => error!(logger, "run failed"; "error" => %err),
    }

    drop(engine);
    let panel = match panel_task.await {
        Ok(panel) => panel,
        Err(_) => display::StatusPanel::new(),
    };
    println!("{}", panel.render());

    if result.is_err() {
        std::process::exit(1);
    }
}

async fn run_portal_sync(
    path: &PathBuf,
    engine: &WorkflowEngine<SimulatedRemote>,
    logger: &Logger,
) -> Result<(), i32> {
    let json = std::fs::read_to_string(path).map_err(|err| {
        error!(logger, "could not read portal config"; "path" => %path.display(), "error" => %err);
        1
    })?;
    let config: PortalConfig = serde_json::from_str(&json).map_err(|err| {
        error!(logger, "portal config is not valid"; "error" => %err);
        1
    })?;
    let client = PortalClient::new(config, logger.new(o!("component" => "portal"))).map_err(|err| {
        error!(logger, "could not build portal client"; "error" => %err);
        1
    })?;
    client.login_and_sync(&engine.status_bus()).await.map_err(|err| {
        error!(logger, "portal sync failed"; "error" => %err);
        1
    })
}
