// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scene selection for motion lights.

use chrono::NaiveTime;

use crate::client::HubClient;
use crate::config::{MotionLightConfig, TimeWindow};
use crate::error::Result;

/// Entity carrying the sun elevation attribute.
pub const SUN_ENTITY: &str = "sun.sun";

/// Picks the scene for the current conditions.
///
/// Time windows are checked first, earliest start first. Then elevation
/// states, lowest threshold first; one matches while the sun is below its
/// threshold. Without a match the default scene is used. Scene ids are
/// lowercased.
///
/// # Errors
///
/// Returns a value error if a time window cannot be parsed.
pub async fn resolve_scene(
    client: &HubClient,
    config: &MotionLightConfig,
    now: NaiveTime,
) -> Result<String> {
    let mut windows = Vec::new();
    for state in &config.states {
        if let Some(window) = &state.time_state {
            let (from, to) = window.bounds()?;
            windows.push((from, to, &state.scene));
        }
    }
    windows.sort_by_key(|(from, _, _)| *from);

    if let Some((_, _, scene)) = windows
        .iter()
        .find(|(from, to, _)| TimeWindow::contains_between(*from, *to, now))
    {
        return Ok(scene.to_lowercase());
    }

    let mut thresholds: Vec<(f64, &String)> = config
        .states
        .iter()
        .filter_map(|s| s.elevation_state.map(|e| (e.elevation, &s.scene)))
        .collect();
    if !thresholds.is_empty() {
        thresholds.sort_by(|a, b| a.0.total_cmp(&b.0));
        if let Some(elevation) = sun_elevation(client).await
            && let Some((_, scene)) = thresholds.iter().find(|(limit, _)| elevation < *limit)
        {
            return Ok(scene.to_lowercase());
        }
    }

    Ok(config.default_state.scene.to_lowercase())
}

async fn sun_elevation(client: &HubClient) -> Option<f64> {
    match client.get_state(SUN_ENTITY).await {
        Ok(sun) => sun.attribute_f64("elevation"),
        Err(error) => {
            tracing::warn!(%error, "Sun elevation unavailable, skipping elevation scenes");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{ElevationCondition, SceneStateConfig};
    use crate::event::Snapshot;
    use crate::transport::{HubTransport, MemoryTransport};

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(from: &str, to: &str) -> TimeWindow {
        TimeWindow {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    fn config() -> MotionLightConfig {
        let mut config = MotionLightConfig::new("hall", "scene.Hall_Bright");
        config.states = vec![
            SceneStateConfig {
                scene: "scene.hall_dim".to_string(),
                elevation_state: Some(ElevationCondition { elevation: 10.0 }),
                time_state: None,
            },
            SceneStateConfig {
                scene: "scene.hall_dark".to_string(),
                elevation_state: Some(ElevationCondition { elevation: -2.0 }),
                time_state: None,
            },
            SceneStateConfig {
                scene: "scene.hall_night".to_string(),
                elevation_state: None,
                time_state: Some(window("23:00", "05:00")),
            },
        ];
        config
    }

    async fn client_with_sun(elevation: Option<f64>) -> HubClient {
        let hub = Arc::new(MemoryTransport::new());
        if let Some(elevation) = elevation {
            hub.set_state(Snapshot::new(SUN_ENTITY, "above_horizon").with_attribute("elevation", elevation));
        }
        let client = HubClient::new(hub as Arc<dyn HubTransport>);
        client.connect().await;
        client
    }

    #[test]
    fn windows_wrap_midnight() {
        let night = window("23:00", "05:00");
        assert!(night.contains(at(23, 30)).unwrap());
        assert!(night.contains(at(4, 59)).unwrap());
        assert!(!night.contains(at(12, 0)).unwrap());

        let day = window("08:00", "18:00");
        assert!(day.contains(at(8, 0)).unwrap());
        assert!(day.contains(at(18, 0)).unwrap());
        assert!(!day.contains(at(18, 1)).unwrap());
    }

    #[tokio::test]
    async fn time_window_wins_over_elevation() {
        let client = client_with_sun(Some(-10.0)).await;
        let scene = resolve_scene(&client, &config(), at(0, 30)).await.unwrap();
        assert_eq!(scene, "scene.hall_night");
    }

    #[tokio::test]
    async fn lowest_matching_elevation_wins() {
        let client = client_with_sun(Some(-5.0)).await;
        let scene = resolve_scene(&client, &config(), at(19, 0)).await.unwrap();
        assert_eq!(scene, "scene.hall_dark");

        let client = client_with_sun(Some(5.0)).await;
        let scene = resolve_scene(&client, &config(), at(19, 0)).await.unwrap();
        assert_eq!(scene, "scene.hall_dim");
    }

    #[tokio::test]
    async fn falls_back_to_lowercased_default() {
        let client = client_with_sun(Some(40.0)).await;
        let scene = resolve_scene(&client, &config(), at(12, 0)).await.unwrap();
        assert_eq!(scene, "scene.hall_bright");

        let client = client_with_sun(None).await;
        let scene = resolve_scene(&client, &config(), at(12, 0)).await.unwrap();
        assert_eq!(scene, "scene.hall_bright");
    }
}
