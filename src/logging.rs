// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Log output for the controller binary.
//!
//! Events go to stdout and, when `logging.path` is set, to a log file as
//! well. The filter comes from `logging.level` unless `RUST_LOG` is set.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{FileMode, LoggingConfig};
use crate::error::ConfigError;

/// Installs the global subscriber.
///
/// Relative log paths resolve against `base`, normally the directory of the
/// configuration file.
///
/// # Errors
///
/// Returns [`ConfigError::Logging`] if the filter is invalid or a
/// subscriber is already installed, and [`ConfigError::Write`] if the log
/// file cannot be opened.
pub fn init(config: &LoggingConfig, base: &Path) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_filter(&config.level)?,
    };

    let file_layer = match config.resolved_path(base) {
        Some(path) => {
            let file = open_log_file(&path, config.filemode)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}

/// Builds a filter from a level name or directive list.
///
/// # Errors
///
/// Returns [`ConfigError::Logging`] if the directive does not parse.
pub fn parse_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(level.to_ascii_lowercase())
        .map_err(|e| ConfigError::Logging(format!("invalid log level {level:?}: {e}")))
}

fn open_log_file(path: &Path, mode: FileMode) -> Result<File, ConfigError> {
    let write_error = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }

    let mut options = OpenOptions::new();
    options.create(true);
    match mode {
        FileMode::Append => {
            options.append(true);
        }
        FileMode::Truncate => {
            options.write(true).truncate(true);
        }
    }
    options.open(path).map_err(write_error)
}
