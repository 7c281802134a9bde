//! mft_engine - managed file-transfer node
//!
//! ```text
//! mft_engine [--config <file> | --env <name>] [--purge-days <n>]
//!            [--list | --recover-once | --worker]
//! ```
//!
//! On every start the store is swept: transfers left running by a previous
//! process are queued for resubmission and completed ones are marked done.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use mft_engine::config::EngineConfig;
use mft_engine::controller::{
    CancelReason, CancelSignal, NoTransport, RecoveryWorker, RunController, WorkerConfig,
};
use mft_engine::logging::init_logging;
use mft_engine::rule::RuleRegistry;
use mft_engine::store::open_store;
use mft_engine::task::TaskCatalog;

const USAGE: &str = "usage: mft_engine [--config <file> | --env <name>] [--purge-days <n>] [--list | --recover-once | --worker]";

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let config = match arg_value(&args, "--config") {
        Some(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => {
            let env = arg_value(&args, "--env").unwrap_or_else(|| "dev".to_string());
            EngineConfig::load(&env).with_context(|| format!("loading config/{}.yaml", env))?
        }
    };
    config.validate()?;
    let _log_guard = init_logging(&config);

    tracing::info!(
        node = %config.node_id,
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        profile = env!("MFT_BUILD_PROFILE"),
        rules = config.rules.len(),
        "Starting mft_engine"
    );

    let store = open_store(&config.store).await?;
    let rules = Arc::new(RuleRegistry::from_rules(config.rules.clone()));
    let config = Arc::new(config);
    let controller = Arc::new(RunController::new(
        Arc::clone(&config),
        Arc::clone(&store),
        rules,
        Arc::new(TaskCatalog::with_defaults()),
    ));

    controller.startup_sweep().await?;

    if let Some(days) = arg_value(&args, "--purge-days") {
        let days: i64 = days.parse().context("--purge-days expects a number of days")?;
        let purged = store.purge(Utc::now() - chrono::Duration::days(days)).await?;
        tracing::info!(purged, days, "Purged finished transfers");
    }

    if has_flag(&args, "--list") {
        for summary in controller.summaries().await? {
            println!("{}", serde_json::to_string(&summary)?);
        }
        return Ok(());
    }

    let worker = RecoveryWorker::new(
        Arc::clone(&controller),
        Arc::new(NoTransport),
        WorkerConfig::from(&config.worker),
    );

    if has_flag(&args, "--recover-once") {
        let report = worker.scan_and_recover().await?;
        println!(
            "found={} completed={} failed={} interrupted={} requeued={} skipped={}",
            report.found,
            report.completed,
            report.failed,
            report.interrupted,
            report.requeued,
            report.skipped
        );
        return Ok(());
    }

    if has_flag(&args, "--worker") {
        let (stop, listener) = CancelSignal::pair();
        let handle = tokio::spawn(async move { worker.run(listener).await });

        tokio::signal::ctrl_c().await?;
        tracing::info!("Ctrl-C received, shutting down");
        controller.shutdown();
        stop.cancel(CancelReason::Shutdown);
        handle.await?;
        return Ok(());
    }

    eprintln!("{}", USAGE);
    Ok(())
}
