//! Core library for the `skycast` weather relay.
//!
//! This crate defines:
//! - The update gate (time + displacement rate limiting)
//! - Abstraction over weather providers and response normalization
//! - Orchestration of update cycles
//! - At-least-once delivery to the companion device
//! - Configuration, persisted settings and the configuration portal hand-off
//!
//! The device transport, the position source and the key-value store are
//! traits; `skycast-cli` supplies concrete implementations.

pub mod condition;
pub mod config;
pub mod delivery;
pub mod diagnostics;
pub mod error;
pub mod geo;
pub mod location;
pub mod model;
pub mod orchestrator;
pub mod portal;
pub mod provider;
pub mod state;
pub mod store;

pub use config::{Config, ProviderConfig, ServiceSelection, UpdateTiming};
pub use delivery::{DeliveryChannel, DeliveryOutcome, DeliveryState, DeviceBridge, RetryPolicy};
pub use error::{ConfigParseError, DeliveryRejection, FetchError, LocationError};
pub use geo::GeoRateLimiter;
pub use location::{FixedLocator, Locator};
pub use model::{HourlyPoint, HourlyReading, Location, Payload, Reading, ScaleUnit, WeatherReading};
pub use orchestrator::{
    DeviceRequest, SettingsOutcome, TriggerOutcome, UpdateCycle, UpdateOrchestrator,
};
pub use provider::{ProviderId, WeatherProvider};
pub use state::{SharedState, Slot, UpdateState};
pub use store::{FileStore, KeyValueStore, MemoryStore};
