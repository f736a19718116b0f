// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the Tibber price client using wiremock.

#![cfg(feature = "http")]

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeZone;
use chrono_tz::Europe::Berlin;
use home_automations::Error;
use home_automations::clock::{ManualTime, TimeSource};
use home_automations::config::{Config, ConfigStore, TibberConfig};
use home_automations::controller::Controller;
use home_automations::event::Snapshot;
use home_automations::modules::TibberClient;
use home_automations::transport::{HubTransport, MemoryTransport};
use home_automations::types::{PriceLevel, RgbColor};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn price_body(total: f64, level: &str) -> serde_json::Value {
    json!({
        "data": {
            "viewer": {
                "home": {
                    "currentSubscription": {
                        "priceInfo": {
                            "current": {"total": total, "level": level}
                        }
                    }
                }
            }
        }
    })
}

fn config_for(server: &MockServer) -> TibberConfig {
    let mut config = TibberConfig::new("secret", "home-1");
    config.api_url = format!("{}/v1-beta/gql", server.uri());
    config
}

// ============================================================================
// TibberClient
// ============================================================================

mod tibber_client {
    use super::*;

    #[tokio::test]
    async fn fetches_current_price() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1-beta/gql"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({"variables": {"homeId": "home-1"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(price_body(0.3121, "NORMAL")))
            .expect(1)
            .mount(&server)
            .await;

        let client = TibberClient::new(&config_for(&server)).unwrap();
        let price = client.current_price().await.unwrap().unwrap();

        assert_eq!(price.level, PriceLevel::Normal);
        assert!((price.total - 0.3121).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unknown_home_has_no_price() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"viewer": {"home": null}}})),
            )
            .mount(&server)
            .await;

        let client = TibberClient::new(&config_for(&server)).unwrap();
        assert!(client.current_price().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn graphql_errors_fail_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [{"message": "Context creation failed: invalid token"}]
            })))
            .mount(&server)
            .await;

        let client = TibberClient::new(&config_for(&server)).unwrap();
        let err = client.current_price().await.unwrap_err();
        assert!(matches!(err, Error::CommandFailed(ref m) if m.contains("invalid token")));
    }

    #[tokio::test]
    async fn http_status_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = TibberClient::new(&config_for(&server)).unwrap();
        assert!(matches!(
            client.current_price().await,
            Err(Error::Http(_))
        ));
    }

    #[tokio::test]
    async fn slow_api_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(price_body(0.2, "CHEAP"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client =
            TibberClient::with_timeout(&config_for(&server), Duration::from_millis(50)).unwrap();
        assert!(matches!(
            client.current_price().await,
            Err(Error::Http(ref e)) if e.is_timeout()
        ));
    }
}

// ============================================================================
// PriceLight through the controller
// ============================================================================

mod price_light {
    use super::*;

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn colors_lights_every_update_interval() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(price_body(-0.02, "VERY_CHEAP")))
            .mount(&server)
            .await;

        let mut tibber = config_for(&server);
        tibber.light_entities = vec!["light.price".to_string()];
        tibber
            .level_to_color
            .insert(PriceLevel::Free, RgbColor::new(0, 128, 255));
        let mut config = Config::default();
        config.heartbeat.enabled = false;
        config.tibber = Some(tibber);

        let hub = Arc::new(MemoryTransport::new());
        hub.set_state(Snapshot::new("light.price", "off"));
        let time = Arc::new(ManualTime::new(
            Berlin.with_ymd_and_hms(2024, 2, 1, 18, 0, 0).unwrap(),
        ));
        let controller = Controller::with_parts(
            Arc::new(ConfigStore::in_memory(config)),
            Arc::clone(&hub) as Arc<dyn HubTransport>,
            Arc::clone(&time) as Arc<dyn TimeSource>,
            Duration::from_millis(20),
        )
        .unwrap();
        assert_eq!(controller.router().module_names(), vec!["tibber"]);

        controller.start().await;
        time.advance(Duration::from_secs(60));
        wait_until(|| !hub.calls_to("light", "turn_on").is_empty()).await;

        let calls = hub.calls_to("light", "turn_on");
        let call = &calls[0];
        let data = call.data().unwrap();
        assert_eq!(data["brightness_pct"], 100);
        assert_eq!(data["rgb_color"], json!([0, 128, 255]));
        assert_eq!(call.target().unwrap()["entity_id"], "light.price");

        controller.shutdown().await;
    }
}
