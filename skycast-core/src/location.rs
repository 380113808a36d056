use async_trait::async_trait;
use std::fmt::Debug;

use crate::{error::LocationError, model::Location};

/// Source of the device's current position.
#[async_trait]
pub trait Locator: Send + Sync + Debug {
    async fn current_position(&self) -> Result<Location, LocationError>;
}

/// A position known up front, e.g. from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct FixedLocator {
    position: Option<Location>,
}

impl FixedLocator {
    pub fn new(position: Option<Location>) -> Self {
        Self { position }
    }
}

#[async_trait]
impl Locator for FixedLocator {
    async fn current_position(&self) -> Result<Location, LocationError> {
        self.position
            .ok_or_else(|| LocationError::Unavailable("no position fix".to_string()))
    }
}

/// Resolve a position, falling back to `home` when no fix is available.
pub async fn locate(
    locator: &dyn Locator,
    home: Option<Location>,
) -> Result<Location, LocationError> {
    match locator.current_position().await {
        Ok(location) => Ok(location),
        Err(err) => match home {
            Some(home) => {
                tracing::info!(error = %err, "no position fix, using home location");
                Ok(home)
            }
            None => Err(err),
        },
    }
}
