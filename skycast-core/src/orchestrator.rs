//! Update lifecycle: gate, dispatch to providers, hand results to delivery.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use tokio::task::JoinHandle;

use crate::{
    Config,
    config::ServiceSelection,
    delivery::{DeliveryChannel, DeliveryOutcome, DeviceBridge},
    diagnostics::DebugSink,
    error::ConfigParseError,
    geo::GeoRateLimiter,
    location::{Locator, locate},
    model::{DeviceSettings, Location, Payload, ScaleUnit},
    portal::{configuration_url, parse_settings_response},
    provider::{ProviderId, WeatherProvider, hourly_provider_from_config, provider_from_config},
    state::{SharedState, Slot, UpdateState},
    store::{FIRST_RUN_FLAG, HOURLY_API_KEY, KeyValueStore},
};

/// Settings the device sends along with an update request.
#[derive(Debug, Clone, Default)]
pub struct DeviceRequest {
    pub service: String,
    pub scale: String,
    pub debug: u8,
    pub battery: u8,
}

/// Branch tasks of one dispatched cycle. Each resolves once its payload
/// reached a terminal delivery state.
#[derive(Debug)]
pub struct UpdateCycle {
    pub conditions: JoinHandle<DeliveryOutcome>,
    pub hourly: JoinHandle<DeliveryOutcome>,
}

impl UpdateCycle {
    pub async fn join(self) -> (Option<DeliveryOutcome>, Option<DeliveryOutcome>) {
        let conditions = settle(self.conditions, "conditions").await;
        let hourly = settle(self.hourly, "hourly").await;
        (conditions, hourly)
    }
}

async fn settle(handle: JoinHandle<DeliveryOutcome>, branch: &str) -> Option<DeliveryOutcome> {
    match handle.await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::error!(branch, error = %e, "update branch did not complete");
            None
        }
    }
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Dispatched(UpdateCycle),
    RateLimited,
    LocationUnavailable(JoinHandle<DeliveryOutcome>),
}

#[derive(Debug)]
pub enum SettingsOutcome {
    Cancelled,
    Applied {
        settings_delivery: JoinHandle<DeliveryOutcome>,
        update: Option<TriggerOutcome>,
    },
}

#[derive(Debug)]
pub struct UpdateOrchestrator {
    config: Config,
    selection: RwLock<ServiceSelection>,
    state: SharedState,
    limiter: GeoRateLimiter,
    delivery: DeliveryChannel,
    store: Arc<dyn KeyValueStore>,
    locator: Arc<dyn Locator>,
    http: Client,
}

impl UpdateOrchestrator {
    pub fn new(
        config: Config,
        bridge: Arc<dyn DeviceBridge>,
        store: Arc<dyn KeyValueStore>,
        locator: Arc<dyn Locator>,
        http: Client,
    ) -> Self {
        let delivery = DeliveryChannel::new(bridge, config.update.retry_policy())
            .with_diagnostics(DebugSink::from_config(&config.diagnostics, &http));

        let orchestrator = Self {
            selection: RwLock::new(config.service.clone()),
            limiter: config.update.rate_limiter(),
            state: Arc::new(Mutex::new(UpdateState::default())),
            config,
            delivery,
            store,
            locator,
            http,
        };
        orchestrator.reload_hourly_key();
        orchestrator
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub fn selection(&self) -> ServiceSelection {
        self.selection.read().clone()
    }

    /// Re-read the hourly key from the store.
    pub fn reload_hourly_key(&self) {
        let key = match self.store.get(HOURLY_API_KEY) {
            Ok(key) => key.filter(|k| !k.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "could not read hourly API key");
                None
            }
        };
        self.selection.write().hourly_api_key = key;
    }

    /// Readiness handshake. On first run without an hourly key, the device is
    /// asked once to show a notification.
    pub async fn on_ready(&self) -> JoinHandle<DeliveryOutcome> {
        tracing::info!("starting");
        let handle = self.delivery.send(Payload::ready());

        let first_run = match self.store.get(FIRST_RUN_FLAG) {
            Ok(flag) => flag.is_none(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read first-run flag");
                false
            }
        };
        if first_run && !self.selection.read().hourly_enabled() {
            if let Err(e) = self.store.set(FIRST_RUN_FLAG, "false") {
                tracing::warn!(error = %e, "could not persist first-run flag");
            }
            self.delivery
                .bridge()
                .notify(
                    "API Key Needed",
                    "Hourly forecasts need a free Weather Underground API key. \
                     Open the settings page to add one.",
                )
                .await;
        }

        handle
    }

    /// The device asked for fresh weather and told us its settings.
    ///
    /// The device only knows `open` and `yahoo`; a `yahoo` report keeps a
    /// `wunder` selection made through the portal.
    pub async fn on_device_message(
        &self,
        now: DateTime<Utc>,
        request: DeviceRequest,
    ) -> TriggerOutcome {
        {
            let mut selection = self.selection.write();
            let reported = ProviderId::from_setting(&request.service);
            if !(reported == ProviderId::Yahoo && selection.provider == ProviderId::Underground) {
                selection.provider = reported;
            }
            selection.scale = ScaleUnit::from_setting(&request.scale);
            selection.debug = request.debug == 1;
            selection.battery = request.battery == 1;
        }
        self.reload_hourly_key();
        tracing::debug!(selection = ?self.selection(), "device request");
        self.trigger(now).await
    }

    pub fn configuration_url(&self) -> String {
        let url = configuration_url(&self.config.portal_url, &self.selection.read());
        tracing::debug!(%url, "configuration requested");
        url
    }

    /// Apply a "settings closed" response from the configuration portal.
    pub async fn on_settings_closed(
        &self,
        now: DateTime<Utc>,
        response: &str,
    ) -> Result<SettingsOutcome, ConfigParseError> {
        let settings = match parse_settings_response(response) {
            Ok(Some(settings)) => settings,
            Ok(None) => return Ok(SettingsOutcome::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "unable to parse response from configuration");
                return Err(e);
            }
        };
        tracing::info!(provider = %settings.provider, scale = %settings.scale, "settings received");

        let (refresh, selection) = {
            let mut selection = self.selection.write();
            let refresh = settings.needs_refresh(&selection);
            settings.apply_to(&mut selection);
            (refresh, selection.clone())
        };

        let persisted = match &settings.hourly_api_key {
            Some(key) => self.store.set(HOURLY_API_KEY, key),
            None => self.store.remove(HOURLY_API_KEY),
        };
        if let Err(e) = persisted {
            tracing::warn!(error = %e, "could not persist hourly API key");
        }

        let settings_delivery = self.delivery.send(Payload::Settings(DeviceSettings {
            service: selection.provider,
            scale: selection.scale,
            debug: u8::from(selection.debug),
            battery: u8::from(selection.battery),
        }));

        let update = if refresh { Some(self.trigger(now).await) } else { None };
        Ok(SettingsOutcome::Applied { settings_delivery, update })
    }

    /// Resolve the position and, if the gate allows it, start a cycle.
    pub async fn trigger(&self, now: DateTime<Utc>) -> TriggerOutcome {
        match locate(self.locator.as_ref(), self.config.home).await {
            Ok(location) => self.dispatch(now, location),
            Err(e) => {
                tracing::warn!(error = %e, "location error");
                let delivery = self.delivery.send(Payload::location_unavailable());
                TriggerOutcome::LocationUnavailable(delivery)
            }
        }
    }

    /// Gate check and cycle start under one lock.
    pub fn dispatch(&self, now: DateTime<Utc>, location: Location) -> TriggerOutcome {
        let selection = self.selection();
        let slots: &[Slot] = if selection.hourly_enabled() {
            &[Slot::Conditions, Slot::Hourly]
        } else {
            &[Slot::Conditions]
        };

        {
            let mut state = self.state.lock();
            if !self.limiter.permit(&state, now, location) {
                tracing::info!(
                    last_attempt = ?state.last_attempt_at,
                    "update already started recently and location unchanged"
                );
                return TriggerOutcome::RateLimited;
            }
            state.begin(now, location, slots);
        }

        TriggerOutcome::Dispatched(self.launch(location, &selection, true))
    }

    /// Start both branches for `location` without consulting the gate or
    /// touching [`UpdateState`]. [`dispatch`](Self::dispatch) is the gated
    /// entry point.
    pub fn run(&self, location: Location) -> UpdateCycle {
        self.launch(location, &self.selection(), false)
    }

    fn launch(
        &self,
        location: Location,
        selection: &ServiceSelection,
        tracked: bool,
    ) -> UpdateCycle {
        let hourly_key = selection.hourly_api_key.as_deref();
        tracing::info!(
            provider = %selection.provider,
            scale = %selection.scale,
            hourly = selection.hourly_enabled(),
            lat = location.latitude,
            lon = location.longitude,
            "fetching weather"
        );

        let primary =
            provider_from_config(selection.provider, &self.config, hourly_key, &self.http);
        let conditions = self.spawn_branch(
            tracked.then_some(Slot::Conditions),
            primary,
            location,
            selection.scale,
        );

        let hourly = match hourly_provider_from_config(&self.config, hourly_key, &self.http) {
            Some(provider) => self.spawn_branch(
                tracked.then_some(Slot::Hourly),
                provider,
                location,
                selection.scale,
            ),
            None => {
                tracing::debug!("hourly disabled, no API key");
                self.delivery.send(Payload::hourly_disabled())
            }
        };

        UpdateCycle { conditions, hourly }
    }

    /// `slot` is the in-progress slot to release once the fetch resolves.
    fn spawn_branch(
        &self,
        slot: Option<Slot>,
        provider: Arc<dyn WeatherProvider>,
        location: Location,
        scale: ScaleUnit,
    ) -> JoinHandle<DeliveryOutcome> {
        let state = Arc::clone(&self.state);
        let delivery = self.delivery.clone();

        tokio::spawn(async move {
            let payload = match provider.fetch(location, scale).await {
                Ok(reading) => Payload::from(reading),
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %e,
                        "could not fetch weather data"
                    );
                    Payload::http_error()
                }
            };
            if let Some(slot) = slot {
                state.lock().finish(slot);
            }
            delivery.deliver(payload).await
        })
    }
}
