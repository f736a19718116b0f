// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared, persisted configuration.

use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use parking_lot::RwLock;

use super::Config;
use crate::error::{ConfigError, Error, Result};

/// The loaded configuration together with the file it came from.
///
/// Modules read through [`ConfigStore::read`]. Thermostat overrides write
/// schedule slots through [`ConfigStore::update_schedule`], which persists
/// the whole file. Writes are serialized so concurrent overrides never
/// interleave on disk.
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    config: RwLock<Config>,
    write_lock: tokio::sync::Mutex<()>,
}

impl ConfigStore {
    /// Loads the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn open(path: impl Into<PathBuf>) -> std::result::Result<Self, ConfigError> {
        let path = path.into();
        let config = Config::load(&path)?;
        Ok(Self {
            path: Some(path),
            config: RwLock::new(config),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Wraps a configuration that is persisted to `path` on change.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: Some(path.into()),
            config: RwLock::new(config),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Wraps a configuration that is never written to disk.
    #[must_use]
    pub fn in_memory(config: Config) -> Self {
        Self {
            path: None,
            config: RwLock::new(config),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns a copy of the current configuration.
    #[must_use]
    pub fn snapshot(&self) -> Config {
        self.config.read().clone()
    }

    /// Runs `f` against the current configuration.
    pub fn read<R>(&self, f: impl FnOnce(&Config) -> R) -> R {
        f(&self.config.read())
    }

    /// Returns the scheduled temperature of climate zone `zone` at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown zone and a
    /// value error if the schedule cannot be resolved.
    pub fn scheduled_temperature(&self, zone: usize, now: NaiveTime) -> Result<f64> {
        let config = self.config.read();
        let climate = config.climate.get(zone).ok_or_else(|| unknown_zone(zone))?;
        Ok(*climate.schedule.resolve_at(now)?)
    }

    /// Overwrites the schedule slot of zone `zone` that is active at `now`
    /// and persists the configuration.
    ///
    /// Returns the key of the updated slot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown zone, a value error
    /// if the schedule cannot be resolved and
    /// [`ConfigError::Write`] if persisting fails. The in-memory value is
    /// updated even when persisting fails.
    pub async fn update_schedule(&self, zone: usize, now: NaiveTime, value: f64) -> Result<String> {
        let _guard = self.write_lock.lock().await;

        let (key, yaml) = {
            let mut config = self.config.write();
            let climate = config
                .climate
                .get_mut(zone)
                .ok_or_else(|| unknown_zone(zone))?;
            let key = climate
                .schedule
                .set_at(now, value)
                .map_err(Error::from)?;
            let yaml = match self.path {
                Some(_) => Some(config.to_yaml()?),
                None => None,
            };
            (key, yaml)
        };

        tracing::info!(zone, slot = %key, value, "Updated schedule");
        if let (Some(path), Some(yaml)) = (&self.path, yaml) {
            persist(path, yaml).await?;
        }
        Ok(key)
    }
}

fn unknown_zone(zone: usize) -> Error {
    ConfigError::Invalid {
        key: format!("climate[{zone}]"),
        reason: "no such climate zone".to_string(),
    }
    .into()
}

async fn persist(path: &Path, yaml: String) -> std::result::Result<(), ConfigError> {
    let staging = path.with_extension("yml.tmp");
    let write_error = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::write(&staging, yaml).await.map_err(write_error)?;
    tokio::fs::rename(&staging, path).await.map_err(write_error)
}
