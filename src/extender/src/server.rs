// Copyright 2025 The SR-IOV Scheduler Authors
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

//! The scheduler-extender HTTP endpoints. Protocol-level failures map to
//! HTTP status codes; anything that merely prevents a placement decision is
//! reported in-band in the JSON response with status 200.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json, Router};
use tower::ServiceBuilder;
use tower_http::add_extension::AddExtensionLayer;
use tower_http::timeout::TimeoutLayer;

use crate::error::{Error, Result};
use crate::extender::ExtenderRef;
use crate::protocol::{ExtenderArgs, ExtenderFilterResult};

/// Read/write headroom for a request on top of any legitimate filter wait.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

pub fn router(extender: ExtenderRef) -> Router {
    // A starved filter call may wait out the promise expiry before
    // responding; the request deadline has to cover that.
    let request_timeout = extender.promise_expiry() + HTTP_TIMEOUT;
    Router::new()
        .route("/filter", post(filter))
        .route("/prioritize", post(prioritize))
        .layer(
            ServiceBuilder::new()
                .layer(AddExtensionLayer::new(extender))
                .into_inner(),
        )
        .layer(TimeoutLayer::new(request_timeout))
}

async fn filter(Extension(extender): Extension<ExtenderRef>, body: Bytes) -> Response {
    let args: ExtenderArgs = match serde_json::from_slice(&body) {
        Ok(args) => args,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };
    let result = match extender.filter(&args).await {
        Some(result) => result,
        // Not a VF pod: the candidate set passes through untouched.
        None => ExtenderFilterResult::unmodified(&args),
    };
    Json(result).into_response()
}

async fn prioritize(Extension(extender): Extension<ExtenderRef>, body: Bytes) -> Response {
    let args: ExtenderArgs = match serde_json::from_slice(&body) {
        Ok(args) => args,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };
    Json(extender.prioritize(&args).await).into_response()
}

/// Parses a listen address, accepting the `:8989` shorthand for binding all
/// interfaces.
fn parse_listen_addr(listen: &str) -> Result<SocketAddr> {
    let candidate = if listen.starts_with(':') {
        format!("0.0.0.0{listen}")
    } else {
        listen.to_owned()
    };
    candidate
        .parse()
        .map_err(|_| Error::InvalidListenAddr(listen.to_owned()))
}

pub async fn serve(extender: ExtenderRef, listen: &str) -> Result<()> {
    let addr = parse_listen_addr(listen)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "scheduler extender listening");
    axum::serve(listener, router(extender)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::extender::Extender;
    use crate::promises::DEFAULT_PROMISE_EXPIRY;
    use crate::protocol::HostPriority;
    use crate::test_utils::{filter_args, pod, vf_node};

    fn post(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_filter_passes_through_other_pods() {
        let extender = Arc::new(Extender::new(DEFAULT_PROMISE_EXPIRY));
        let args = filter_args(pod("pod-1", "contrail", ""), vec![vf_node("n1", 3)]);
        let request = post("/filter", serde_json::to_vec(&args).unwrap());

        let response = router(extender.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result: ExtenderFilterResult =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(result.nodes.unwrap().items.len(), 1);
        assert!(result.error.is_empty());
        assert_eq!(extender.promise_count().await, 0);
    }

    #[tokio::test]
    async fn test_filter_promises_a_vf() {
        let extender = Arc::new(Extender::new(DEFAULT_PROMISE_EXPIRY));
        let args = filter_args(pod("pod-1", "sriov", ""), vec![vf_node("n1", 1)]);
        let request = post("/filter", serde_json::to_vec(&args).unwrap());

        let response = router(extender.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result: ExtenderFilterResult =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(result.nodes.unwrap().items.len(), 1);
        assert_eq!(extender.promise_count().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let extender = Arc::new(Extender::new(DEFAULT_PROMISE_EXPIRY));
        let request = post("/filter", b"{not json".to_vec());

        let response = router(extender.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        // Nothing in the ledger changed.
        assert_eq!(extender.promise_count().await, 0);
    }

    #[tokio::test]
    async fn test_non_post_is_rejected() {
        let extender = Arc::new(Extender::new(DEFAULT_PROMISE_EXPIRY));
        let request = Request::builder()
            .method("GET")
            .uri("/filter")
            .body(Body::empty())
            .unwrap();

        let response = router(extender).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_prioritize_scores_by_headroom() {
        let extender = Arc::new(Extender::new(DEFAULT_PROMISE_EXPIRY));
        let args = filter_args(
            pod("pod-1", "sriov", ""),
            vec![vf_node("n2", 5), vf_node("n1", 10)],
        );
        let request = post("/prioritize", serde_json::to_vec(&args).unwrap());

        let response = router(extender).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let priorities: Vec<HostPriority> =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(priorities[0].host, "n1");
        assert_eq!(priorities[0].score, 10);
        assert_eq!(priorities[1].host, "n2");
        assert_eq!(priorities[1].score, 5);
    }

    #[test]
    fn test_parse_listen_addr() {
        assert_eq!(
            parse_listen_addr(":8989").unwrap(),
            "0.0.0.0:8989".parse().unwrap()
        );
        assert_eq!(
            parse_listen_addr("127.0.0.1:8989").unwrap(),
            "127.0.0.1:8989".parse().unwrap()
        );
        assert!(parse_listen_addr("not-an-addr").is_err());
    }
}
