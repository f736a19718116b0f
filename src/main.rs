// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controller binary.
//!
//! Reads the configuration from `CONFIG_FILE_PATH` (default `config.yml`),
//! installs logging and runs the controller until ctrl-c. A missing
//! configuration file is replaced by a template and the process exits so
//! the operator can fill it in.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use home_automations::config::{ConfigStore, config_path_from_env};
use home_automations::controller::Controller;
use home_automations::{ConfigError, logging};

#[tokio::main]
async fn main() -> ExitCode {
    let path = config_path_from_env();
    let store = match ConfigStore::open(&path) {
        Ok(store) => store,
        Err(ConfigError::CreatedDefault(created)) => {
            eprintln!(
                "No configuration found, wrote a template to {}. Fill it in and restart.",
                created.display()
            );
            return ExitCode::FAILURE;
        }
        Err(err) => {
            eprintln!("Configuration could not be loaded: {err}");
            return ExitCode::FAILURE;
        }
    };

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let logging_config = store.read(|c| c.logging.clone());
    if let Err(err) = logging::init(&logging_config, base) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    tracing::info!(
        config = %path.display(),
        version = env!("CARGO_PKG_VERSION"),
        "Starting home automations"
    );

    let controller = match Controller::new(Arc::new(store)) {
        Ok(controller) => controller,
        Err(err) => {
            tracing::error!(error = %err, "Controller could not be created");
            return ExitCode::FAILURE;
        }
    };

    match controller.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Controller stopped with an error");
            ExitCode::FAILURE
        }
    }
}
