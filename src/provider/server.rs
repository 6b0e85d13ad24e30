// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::provider::Result;
use crate::provider::messages::{
    OffboardConsumerRequest, OnboardConsumerRequest, OnboardConsumerResponse,
    ReportStatusRequest, ReportStatusResponse,
};
use crate::provider::service::ProviderService;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

/// Provider API routes.
pub fn router(service: ProviderService) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(ready_check))
        .route("/v1/onboard", post(onboard))
        .route("/v1/status", post(report_status))
        .route("/v1/offboard", post(offboard))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
}

/// Serves the provider API until the listener fails.
pub async fn run(port: u16, service: ProviderService) -> std::io::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("provider API listening on http://{}", addr);
    axum::serve(listener, router(service)).await
}

async fn onboard(
    State(service): State<ProviderService>,
    Json(req): Json<OnboardConsumerRequest>,
) -> Result<Json<OnboardConsumerResponse>> {
    service.onboard(&req).await.map(Json)
}

async fn report_status(
    State(service): State<ProviderService>,
    Json(req): Json<ReportStatusRequest>,
) -> Result<Json<ReportStatusResponse>> {
    service.report_status(&req).await.map(Json)
}

async fn offboard(
    State(service): State<ProviderService>,
    Json(req): Json<OffboardConsumerRequest>,
) -> Result<StatusCode> {
    service.offboard(&req).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn ready_check() -> impl IntoResponse {
    (StatusCode::OK, "Ready")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{NS, provider_fixture};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use tower::ServiceExt;

    async fn post_json(
        app: Router,
        uri: &str,
        body: &impl serde::Serialize,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).expect("body")))
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("bytes");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json")
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_onboard_over_http() {
        let f = provider_fixture(Some("100Gi"));
        let app = router(f.service.clone());

        let (status, body) =
            post_json(app.clone(), "/v1/onboard", &f.onboard_request("tenant-a", Some("60Gi"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["storageConsumerId"], format!("{NS}/tenant-a"));
        assert_eq!(body["grantedCapacity"], "60Gi");

        let report = ReportStatusRequest {
            storage_consumer_id: Some(format!("{NS}/tenant-a")),
            cluster_id: "cid-1".to_owned(),
            ..Default::default()
        };
        let (status, _) = post_json(app.clone(), "/v1/status", &report).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            post_json(app.clone(), "/v1/onboard", &f.onboard_request("tenant-a", Some("60Gi"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "DuplicateConsumer");

        let (status, body) =
            post_json(app, "/v1/onboard", &f.onboard_request("tenant-b", Some("50Gi"))).await;
        assert_eq!(status, StatusCode::INSUFFICIENT_STORAGE);
        assert_eq!(body["error"], "QuotaExceeded");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let f = provider_fixture(Some("100Gi"));
        let app = router(f.service.clone());

        let mut bad_ticket = f.onboard_request("tenant-a", None);
        bad_ticket.onboarding_ticket = "garbage".to_owned();
        let (status, body) = post_json(app.clone(), "/v1/onboard", &bad_ticket).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "InvalidTicket");

        let report = ReportStatusRequest {
            cluster_id: "nobody".to_owned(),
            namespaced_name: "ns/client".to_owned(),
            ..Default::default()
        };
        let (status, body) = post_json(app.clone(), "/v1/status", &report).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "UnknownConsumer");

        let offboard = OffboardConsumerRequest {
            storage_consumer_id: "not-an-id".to_owned(),
        };
        let (status, _) = post_json(app, "/v1/offboard", &offboard).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let f = provider_fixture(None);
        let app = router(f.service.clone());

        for uri in ["/healthz", "/readyz"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
