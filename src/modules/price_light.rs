// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Electricity price shown as light color.
//!
//! The current price of a Tibber home is fetched periodically from the
//! Tibber GraphQL API and mapped to a color through `level_to_color`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{Module, ModuleContext, ModuleHost};
use crate::client::ServiceCall;
use crate::clock::ClockListener;
use crate::config::TibberConfig;
use crate::error::{Error, Result};
use crate::router::ModuleRegistration;
use crate::types::PriceLevel;

const PRICE_QUERY: &str = "query CurrentPrice($homeId: ID!) { \
    viewer { home(id: $homeId) { currentSubscription { priceInfo { \
    current { total level } } } } } }";

const USER_AGENT: &str = "Home Automations";

// ============================================================================
// TibberClient
// ============================================================================

/// Current price of a home.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PriceInfo {
    /// Price level as reported by Tibber.
    pub level: PriceLevel,
    /// Total price including taxes.
    pub total: f64,
}

impl PriceInfo {
    /// Returns the level to display. Prices at or below zero are
    /// [`PriceLevel::Free`].
    #[must_use]
    pub fn effective_level(&self) -> PriceLevel {
        self.level.with_total(self.total)
    }
}

/// Minimal client for the Tibber GraphQL API.
///
/// # Examples
///
/// ```no_run
/// use home_automations::config::TibberConfig;
/// use home_automations::modules::TibberClient;
///
/// # async fn example() -> home_automations::Result<()> {
/// let client = TibberClient::new(&TibberConfig::new("token", "home-id"))?;
/// if let Some(price) = client.current_price().await? {
///     println!("{} ({})", price.effective_level(), price.total);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TibberClient {
    client: Client,
    api_url: String,
    token: String,
    home_id: String,
}

impl TibberClient {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a client for the configured home.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &TibberConfig) -> Result<Self> {
        Self::with_timeout(config, Self::DEFAULT_TIMEOUT)
    }

    /// Creates a client with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn with_timeout(config: &TibberConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            token: config.token.clone(),
            home_id: config.home_id.clone(),
        })
    }

    /// Fetches the current price.
    ///
    /// Returns `None` if the home is unknown or has no active
    /// subscription.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, the API answers with an error
    /// status or GraphQL errors, or the body cannot be parsed.
    pub async fn current_price(&self) -> Result<Option<PriceInfo>> {
        let body = json!({
            "query": PRICE_QUERY,
            "variables": { "homeId": self.home_id },
        });

        tracing::debug!(url = %self.api_url, home = %self.home_id, "Fetching Tibber price");
        let response: GraphQlResponse = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.errors.first() {
            return Err(Error::CommandFailed(format!("tibber: {}", error.message)));
        }

        Ok(response
            .data
            .and_then(|data| data.viewer.home)
            .and_then(|home| home.current_subscription)
            .and_then(|subscription| subscription.price_info.current))
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ViewerData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ViewerData {
    viewer: Viewer,
}

#[derive(Debug, Deserialize)]
struct Viewer {
    home: Option<Home>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Home {
    current_subscription: Option<Subscription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Subscription {
    price_info: PriceSeries,
}

#[derive(Debug, Deserialize)]
struct PriceSeries {
    current: Option<PriceInfo>,
}

// ============================================================================
// PriceLight
// ============================================================================

/// Colors lights by the current electricity price level.
#[derive(Debug)]
pub struct PriceLight {
    context: Arc<ModuleContext>,
    config: TibberConfig,
    tibber: TibberClient,
    last_level: Mutex<Option<PriceLevel>>,
}

impl PriceLight {
    /// Creates the module and schedules the price update every
    /// `update_interval`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created or the interval
    /// is below one second.
    pub fn install(host: &ModuleHost, config: TibberConfig) -> Result<Arc<Self>> {
        let tibber = TibberClient::new(&config)?;
        let interval = config.update_interval();
        let module = Arc::new(Self {
            context: Arc::clone(host.context()),
            config,
            tibber,
            last_level: Mutex::new(None),
        });

        let task = Arc::clone(&module);
        host.clock().schedule("tibber price", interval, move || {
            let light = Arc::clone(&task);
            async move { light.update().await }
        })?;

        Ok(host.install(ModuleRegistration::new(module)))
    }

    /// Returns the level shown by the last successful update.
    #[must_use]
    pub fn last_level(&self) -> Option<PriceLevel> {
        *self.last_level.lock()
    }

    /// Fetches the current price and colors the lights.
    ///
    /// # Errors
    ///
    /// Returns error if the price cannot be fetched or a light cannot be
    /// turned on.
    pub async fn update(&self) -> Result<()> {
        match self.tibber.current_price().await? {
            Some(price) => self.show(price).await,
            None => {
                tracing::debug!(home = %self.config.home_id, "No current price for home");
                Ok(())
            }
        }
    }

    async fn show(&self, price: PriceInfo) -> Result<()> {
        let level = price.effective_level();
        let Some(color) = self.config.level_to_color.get(&level).copied() else {
            tracing::debug!(%level, "No color configured for price level");
            return Ok(());
        };

        tracing::debug!(%level, total = price.total, %color, "Showing price level");
        for light in &self.config.light_entities {
            let call = ServiceCall::new("light", "turn_on")
                .target_entity(light.as_str())
                .with_data("brightness_pct", 100)
                .with_data("rgb_color", color.to_array().to_vec());
            self.context.client().call_service(call).await?;
        }
        *self.last_level.lock() = Some(level);
        Ok(())
    }
}

#[async_trait]
impl ClockListener for PriceLight {}

#[async_trait]
impl Module for PriceLight {
    fn name(&self) -> &str {
        "tibber"
    }
}
