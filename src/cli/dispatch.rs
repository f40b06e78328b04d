//! CLI command dispatch
//!
//! - serve: initial model load, background loops, HTTP API until Ctrl-C
//! - check-drift: one watchdog cycle, outcome printed as JSON
//! - retrain: one manual retraining, job printed as JSON
//! - generate-data / simulate: synthetic partitions written to the store

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use fraudguard_api::{ApiConfig, ApiServer};
use fraudguard_core::{
    publish_partitions, spawn_periodic, GeneratorSettings, ServiceConfig, TriggerReason,
    WeeklyGenerator,
};

use crate::cli::args::SyntheticArgs;
use crate::cli::components::Components;
use crate::cli::{
    Cli, Commands, Error, Result, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_SUCCESS,
};

/// Map a dispatch result to the process exit code
pub fn exit_code(result: &Result<()>) -> i32 {
    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(Error::Config(_)) => EXIT_CONFIG_ERROR,
        Err(_) => EXIT_FAILURE,
    }
}

/// Run the parsed command to completion
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = ServiceConfig::load(cli.config.as_deref())
        .map_err(|e| Error::Config(format!("{:#}", e)))?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            no_watchdog,
        } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve(Components::build(config)?, !no_watchdog).await
        }
        Commands::CheckDrift => check_drift(&Components::build(config)?).await,
        Commands::Retrain => retrain(&Components::build(config)?).await,
        Commands::GenerateData { synthetic } => {
            publish_synthetic(&Components::build(config)?, &synthetic, Duration::ZERO).await
        }
        Commands::Simulate {
            synthetic,
            interval_secs,
        } => {
            publish_synthetic(
                &Components::build(config)?,
                &synthetic,
                Duration::from_secs(interval_secs),
            )
            .await
        }
    }
}

/// Generator settings for the requested year
pub fn generator_settings(args: &SyntheticArgs) -> GeneratorSettings {
    let settings = GeneratorSettings {
        weeks: args.weeks,
        seed: args.seed,
        drift_weeks: args.drift_weeks.iter().copied().collect(),
        ..GeneratorSettings::default()
    };
    if args.drift_weeks.is_empty() {
        settings.with_random_drift_weeks(args.random_drift_weeks)
    } else {
        settings
    }
}

async fn serve(components: Components, with_watchdog: bool) -> Result<()> {
    // Serve the newest published model from the first request on, if there is one
    if let Err(e) = components.reloader.reload_once().await {
        warn!("Initial model load failed, serving without a model: {}", e);
    }

    let mut tasks: Vec<JoinHandle<()>> = vec![
        spawn_periodic(components.reloader.clone()),
        spawn_periodic(components.rotator.clone()),
    ];
    if with_watchdog {
        tasks.push(spawn_periodic(components.watchdog.clone()));
    } else {
        info!("Drift watchdog disabled for this process");
    }

    let api_config = ApiConfig {
        host: components.config.host.clone(),
        port: components.config.port,
        api_token: components.config.api_token.clone(),
        response_mode: components.config.response_mode,
    };
    let server = ApiServer::new(api_config, Arc::clone(&components.inference));

    let result = server
        .start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await
        .map_err(|e| Error::Server(format!("{:#}", e)));

    for task in tasks {
        task.abort();
    }
    result
}

async fn check_drift(components: &Components) -> Result<()> {
    let outcome = components.watchdog.run_once().await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn retrain(components: &Components) -> Result<()> {
    let job = components.orchestrator.retrain(TriggerReason::Manual).await;
    println!("{}", serde_json::to_string_pretty(&job)?);

    if job.succeeded() {
        Ok(())
    } else {
        Err(Error::Retrain(
            job.error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

async fn publish_synthetic(
    components: &Components,
    args: &SyntheticArgs,
    interval: Duration,
) -> Result<()> {
    let mut generator = WeeklyGenerator::new(generator_settings(args))?;
    info!(
        weeks = args.weeks,
        seed = args.seed,
        drift_weeks = ?generator.settings().drift_weeks,
        "Generating synthetic partitions"
    );
    let partitions = generator.generate_all()?;
    let keys = publish_partitions(
        components.store.as_ref(),
        &components.config.partition_prefix,
        partitions,
        interval,
    )
    .await?;
    info!(partitions = keys.len(), "Synthetic partitions published");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&Ok(())), EXIT_SUCCESS);
        assert_eq!(
            exit_code(&Err(Error::Config("bad alpha".into()))),
            EXIT_CONFIG_ERROR
        );
        assert_eq!(
            exit_code(&Err(Error::Retrain("no partitions".into()))),
            EXIT_FAILURE
        );
    }

    fn synthetic_args(drift_weeks: Vec<u32>) -> SyntheticArgs {
        SyntheticArgs {
            weeks: 20,
            seed: 3,
            drift_weeks,
            random_drift_weeks: 4,
        }
    }

    #[test]
    fn test_explicit_drift_weeks_are_kept() {
        let settings = generator_settings(&synthetic_args(vec![2, 9]));
        assert_eq!(settings.drift_weeks.into_iter().collect::<Vec<_>>(), vec![2, 9]);
        assert_eq!(settings.weeks, 20);
        assert_eq!(settings.min_rows, 80);
        assert_eq!(settings.max_rows, 150);
    }

    #[test]
    fn test_drift_weeks_are_drawn_when_not_given() {
        let settings = generator_settings(&synthetic_args(Vec::new()));
        assert_eq!(settings.drift_weeks.len(), 4);
        assert!(settings.drift_weeks.iter().all(|&w| (1..=20).contains(&w)));
    }
}
