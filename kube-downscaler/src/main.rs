use anyhow::Context;
use clap::Parser;
use kube::Client;
#[rustfmt::skip]
use log::{info, warn, error};

use kube_downscaler::config::Args;
use kube_downscaler::kubernetes::controller;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger with custom timestamp format
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            writeln!(buf, "[{}] [{}] [{}:{}] {}",
                timestamp,
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    let rules = args.filter_rules().context("invalid --include-resources")?;
    let client = Client::try_default()
        .await
        .context("failed to create kubernetes client")?;

    match (&args.downtime, &args.uptime) {
        (Some(downtime), _) => info!("downtime: {downtime}"),
        (None, Some(uptime)) => info!("uptime: {uptime}"),
        (None, None) => warn!("neither downtime nor uptime is set, workloads will not be touched"),
    }
    if args.dry_run {
        info!("dry run, no workload will be changed");
    }

    let mut interval = tokio::time::interval(args.interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl-C, exiting");
                break;
            }
        }

        let summary = controller::run_pass(&client, &args, &rules).await;
        if summary.failed > 0 || summary.skipped_scopes > 0 {
            error!(
                "pass finished with {} failures and {} skipped scopes ({} scaled, {} unchanged)",
                summary.failed, summary.skipped_scopes, summary.scaled, summary.unchanged
            );
        } else {
            info!("pass finished ({} scaled, {} unchanged)", summary.scaled, summary.unchanged);
        }

        if args.once {
            break;
        }
    }

    Ok(())
}
