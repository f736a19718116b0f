// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tests of the controller against the in-memory hub.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeZone;
use chrono_tz::Europe::Berlin;
use home_automations::client::ConnectionState;
use home_automations::clock::{ManualTime, TimeSource};
use home_automations::config::{Config, ConfigStore, DimmerConfig, HeartbeatConfig};
use home_automations::controller::Controller;
use home_automations::event::{Event, Snapshot};
use home_automations::transport::{HubTransport, MemoryTransport};
use home_automations::{Error, ProtocolError, ValueError};

const REMOTE: &str = "00:0d:6f:00:0a:90";
const DESK: &str = "light.desk";

struct Setup {
    hub: Arc<MemoryTransport>,
    time: Arc<ManualTime>,
    controller: Controller,
}

fn config() -> Config {
    let mut config = Config::default();
    config.heartbeat.enabled = false;
    config.dimmers.push(DimmerConfig {
        device_ieee: REMOTE.to_string(),
        light_entities: vec![DESK.to_string()],
    });
    config
}

fn setup(config: Config) -> Setup {
    let hub = Arc::new(MemoryTransport::new());
    hub.set_state(Snapshot::new(DESK, "off"));
    let time = Arc::new(ManualTime::new(
        Berlin.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap(),
    ));
    let controller = Controller::with_parts(
        Arc::new(ConfigStore::in_memory(config)),
        Arc::clone(&hub) as Arc<dyn HubTransport>,
        Arc::clone(&time) as Arc<dyn TimeSource>,
        Duration::from_millis(20),
    )
    .unwrap();
    Setup {
        hub,
        time,
        controller,
    }
}

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
async fn hub_events_reach_modules() {
    let Setup {
        hub, controller, ..
    } = setup(config());

    assert_eq!(controller.start().await, ConnectionState::Connected);
    wait_until(|| hub.subscriber_count() == 1).await;

    assert!(hub.inject(Event::device(Some(REMOTE), Some("on"))).await);
    wait_until(|| hub.calls_to("light", "turn_on").len() == 1).await;
    assert!(hub.state(DESK).unwrap().is_on());
}

#[tokio::test]
async fn lost_connection_reconnects_and_resubscribes() {
    let Setup {
        hub, controller, ..
    } = setup(config());

    controller.start().await;
    wait_until(|| hub.subscriber_count() == 1).await;
    assert_eq!(controller.supervisor().dependent_count(), 2);

    hub.drop_connection();
    wait_until(|| controller.supervisor().reconnect_count() == 1).await;
    controller.supervisor().wait_reconnected().await;
    wait_until(|| hub.subscriber_count() == 1).await;

    assert_eq!(hub.connect_attempts(), 2);
    assert!(controller.client().is_connected());
    assert_eq!(controller.supervisor().dependent_count(), 2);

    hub.inject(Event::device(Some(REMOTE), Some("on"))).await;
    wait_until(|| hub.calls_to("light", "turn_on").len() == 1).await;
}

#[tokio::test]
async fn heartbeat_round_trip_updates_status() {
    let mut config = config();
    config.heartbeat = HeartbeatConfig {
        enabled: true,
        switch_entity: "switch.dummy".to_string(),
        interval: 5,
    };
    let Setup {
        hub,
        time,
        controller,
    } = setup(config);
    hub.set_state(Snapshot::new("switch.dummy", "off"));
    let started = controller.status().last_state_changed();

    controller.start().await;
    wait_until(|| hub.subscriber_count() == 1).await;
    time.advance(Duration::from_secs(5));

    wait_until(|| controller.status().last_state_changed() > started).await;
    assert!(hub.state("switch.dummy").unwrap().is_on());
    assert_eq!(hub.calls_to("switch", "toggle").len(), 1);
}

#[tokio::test]
async fn rejected_credentials_stop_the_controller_connecting() {
    let Setup {
        hub, controller, ..
    } = setup(config());
    hub.fail_next_connect(ProtocolError::AuthenticationFailed);

    assert_eq!(controller.start().await, ConnectionState::AuthFailed);
    assert_eq!(controller.start().await, ConnectionState::AuthFailed);
    assert_eq!(hub.connect_attempts(), 1);
    assert_eq!(hub.subscriber_count(), 0);
    assert_eq!(controller.supervisor().dependent_count(), 0);
}

#[tokio::test]
async fn shutdown_stops_dependents() {
    let Setup {
        hub, controller, ..
    } = setup(config());

    controller.start().await;
    wait_until(|| hub.subscriber_count() == 1).await;

    controller.shutdown().await;
    wait_until(|| controller.supervisor().dependent_count() == 0).await;
    assert!(!hub.is_connected());
}

#[test]
fn unknown_timezone_is_rejected() {
    let mut config = config();
    config.timezone = "Mars/Olympus_Mons".to_string();

    let result = Controller::new(Arc::new(ConfigStore::in_memory(config)));
    assert!(matches!(
        result,
        Err(Error::Value(ValueError::InvalidTimezone(_)))
    ));
}
