// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP status endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use super::{StatusReport, StatusTracker};

/// Builds the status routes: `GET /status` and `POST /status`.
pub fn router(tracker: Arc<StatusTracker>) -> Router {
    Router::new()
        .route("/status", get(get_status).post(post_status))
        .with_state(tracker)
}

/// Serves the status routes on `addr` until the task is aborted.
///
/// # Errors
///
/// Returns an I/O error if the address cannot be bound.
pub async fn serve(addr: SocketAddr, tracker: Arc<StatusTracker>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Status API listening");
    axum::serve(listener, router(tracker)).await
}

async fn get_status(State(tracker): State<Arc<StatusTracker>>) -> Json<StatusReport> {
    Json(tracker.report())
}

async fn post_status(State(tracker): State<Arc<StatusTracker>>) -> Json<StatusReport> {
    tracker.touch_post();
    Json(tracker.report())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;
    use tower::ServiceExt;

    use super::*;
    use crate::clock::{ManualTime, TimeSource};

    fn setup() -> (Arc<ManualTime>, Arc<StatusTracker>) {
        let time = Arc::new(ManualTime::new(
            Berlin.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let tracker = Arc::new(StatusTracker::new(
            Arc::clone(&time) as Arc<dyn TimeSource>
        ));
        (time, tracker)
    }

    async fn call(tracker: &Arc<StatusTracker>, method: Method) -> StatusReport {
        let response = router(Arc::clone(tracker))
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn get_reports_without_touching() {
        let (time, tracker) = setup();
        time.advance(Duration::from_secs(60));

        let report = call(&tracker, Method::GET).await;
        assert_eq!(report.last_post, "2024-06-01T12:00:00+02:00");
        assert_eq!(report.last_state_changed, "2024-06-01T12:00:00+02:00");
    }

    #[tokio::test]
    async fn post_touches_last_post() {
        let (time, tracker) = setup();
        time.advance(Duration::from_secs(60));

        let report = call(&tracker, Method::POST).await;
        assert_eq!(report.last_post, "2024-06-01T12:01:00+02:00");
        assert_eq!(report.last_state_changed, "2024-06-01T12:00:00+02:00");
    }
}
