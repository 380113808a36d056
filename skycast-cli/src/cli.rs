use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use inquire::{Confirm, CustomType, Select, Text};
use skycast_core::{
    Config, FileStore, FixedLocator, KeyValueStore, Location, ProviderId, ScaleUnit,
    SettingsOutcome, TriggerOutcome, UpdateOrchestrator, provider::http_client,
    store::HOURLY_API_KEY,
};

use crate::bridge::StdoutBridge;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "skycast", version, about = "Location-aware weather relay")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Choose provider, scale, hourly key and home location.
    Configure,

    /// Run one update cycle and print the payloads sent to the device.
    Update {
        /// Current latitude; the configured home location is used when absent.
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Readiness handshake.
    Ready,

    /// Print the configuration portal URL for the current selection.
    PortalUrl,

    /// Apply a response returned by the configuration portal.
    ApplySettings {
        /// Raw (URL-encoded) response, or `CANCELLED`.
        response: String,
    },
}

impl Cli {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(config),
            Command::Update { lat, lon } => {
                let position = lat.zip(lon).map(|(lat, lon)| Location::new(lat, lon));
                let orchestrator = build(config, position)?;
                match orchestrator.trigger(Utc::now()).await {
                    TriggerOutcome::Dispatched(cycle) => {
                        cycle.join().await;
                    }
                    TriggerOutcome::RateLimited => {
                        println!("Update skipped: one is already running here.");
                    }
                    TriggerOutcome::LocationUnavailable(delivery) => {
                        delivery.await?;
                    }
                }
                Ok(())
            }
            Command::Ready => {
                let orchestrator = build(config, None)?;
                orchestrator.on_ready().await.await?;
                Ok(())
            }
            Command::PortalUrl => {
                let orchestrator = build(config, None)?;
                println!("{}", orchestrator.configuration_url());
                Ok(())
            }
            Command::ApplySettings { response } => apply_settings(config, &response).await,
        }
    }
}

fn build(config: Config, position: Option<Location>) -> anyhow::Result<UpdateOrchestrator> {
    let store = FileStore::open_default()?;
    let http = http_client().context("Failed to build HTTP client")?;
    Ok(UpdateOrchestrator::new(
        config,
        Arc::new(StdoutBridge),
        Arc::new(store),
        Arc::new(FixedLocator::new(position)),
        http,
    ))
}

async fn apply_settings(mut config: Config, response: &str) -> anyhow::Result<()> {
    let orchestrator = build(config.clone(), None)?;

    match orchestrator.on_settings_closed(Utc::now(), response).await? {
        SettingsOutcome::Cancelled => {
            println!("Settings unchanged.");
            return Ok(());
        }
        SettingsOutcome::Applied { settings_delivery, update } => {
            settings_delivery.await?;
            match update {
                Some(TriggerOutcome::Dispatched(cycle)) => {
                    cycle.join().await;
                }
                Some(TriggerOutcome::LocationUnavailable(delivery)) => {
                    delivery.await?;
                }
                Some(TriggerOutcome::RateLimited) | None => {}
            }
        }
    }

    config.service = orchestrator.selection();
    config.save()?;
    println!("Settings saved to {}", Config::config_file_path()?.display());
    Ok(())
}

fn configure(mut config: Config) -> anyhow::Result<()> {
    let providers = ProviderId::all().to_vec();
    let current = providers.iter().position(|p| *p == config.service.provider).unwrap_or(0);
    let provider = Select::new("Conditions provider:", providers)
        .with_starting_cursor(current)
        .prompt()?;

    let scales = vec![ScaleUnit::Fahrenheit, ScaleUnit::Celsius];
    let current = usize::from(config.service.scale == ScaleUnit::Celsius);
    let scale = Select::new("Temperature scale:", scales).with_starting_cursor(current).prompt()?;

    if provider == ProviderId::OpenWeather {
        let existing = config.provider_api_key(provider).unwrap_or_default().to_string();
        let key = Text::new("OpenWeather API key (optional):").with_default(&existing).prompt()?;
        if key.trim().is_empty() {
            config.providers.remove(provider.as_str());
        } else {
            config.upsert_provider_api_key(provider, key.trim().to_string());
        }
    }

    let store = FileStore::open_default()?;
    let existing = store.get(HOURLY_API_KEY)?.unwrap_or_default();
    let hourly_key = Text::new("Weather Underground API key (empty disables hourly):")
        .with_default(&existing)
        .prompt()?;
    let hourly_key = hourly_key.trim();
    if hourly_key.is_empty() {
        store.remove(HOURLY_API_KEY)?;
    } else {
        store.set(HOURLY_API_KEY, hourly_key)?;
    }

    if Confirm::new("Set a home location?").with_default(config.home.is_some()).prompt()? {
        let latitude = CustomType::<f64>::new("Latitude:").prompt()?;
        let longitude = CustomType::<f64>::new("Longitude:").prompt()?;
        config.home = Some(Location::new(latitude, longitude));
    } else {
        config.home = None;
    }

    config.service.provider = provider;
    config.service.scale = scale;
    config.save()?;

    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}
