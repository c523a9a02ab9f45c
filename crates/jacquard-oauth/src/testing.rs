//! Test doubles: a scriptable [`HttpClient`]/[`IdentityResolver`] and the
//! in-memory [`Storage`]/[`ClientAuthStore`] already exported elsewhere.
//!
//! Grounded in the `MockClient` used by [`crate::request`]'s own test module,
//! generalized into a reusable fixture rather than copy-pasted per test file.

use std::collections::VecDeque;
use std::sync::Arc;

use http::{Request, Response, StatusCode};
use jacquard_common::http_client::HttpClient;
use jacquard_identity::resolver::{DidDocResponse, IdentityError, IdentityResolver, ResolverOptions};
use tokio::sync::Mutex;

use crate::dpop::DpopExt;
use crate::resolver::OAuthResolver;

/// A scripted HTTP response queue: each call to [`MockHttpClient::send_http`]
/// pops the next queued response, panicking if the queue is empty.
#[derive(Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<VecDeque<Response<Vec<u8>>>>>,
    requests: Arc<Mutex<Vec<Request<Vec<u8>>>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_json(&self, status: StatusCode, body: serde_json::Value) {
        let response = Response::builder()
            .status(status)
            .body(serde_json::to_vec(&body).unwrap())
            .unwrap();
        self.responses.lock().await.push_back(response);
    }

    pub async fn requests_sent(&self) -> usize {
        self.requests.lock().await.len()
    }
}

impl HttpClient for MockHttpClient {
    type Error = std::convert::Infallible;

    async fn send_http(
        &self,
        request: Request<Vec<u8>>,
    ) -> core::result::Result<Response<Vec<u8>>, Self::Error> {
        self.requests.lock().await.push(request);
        let response = self
            .responses
            .lock()
            .await
            .pop_front()
            .expect("MockHttpClient: no scripted response queued");
        Ok(response)
    }
}

impl IdentityResolver for MockHttpClient {
    fn options(&self) -> &ResolverOptions {
        use std::sync::LazyLock;
        static OPTS: LazyLock<ResolverOptions> = LazyLock::new(ResolverOptions::default);
        &OPTS
    }

    async fn resolve_handle(
        &self,
        _handle: &jacquard_common::types::string::Handle<'_>,
    ) -> core::result::Result<jacquard_common::types::string::Did<'static>, IdentityError> {
        Ok(jacquard_common::types::string::Did::new_static("did:plc:test").unwrap())
    }

    async fn resolve_did_doc(
        &self,
        did: &jacquard_common::types::string::Did<'_>,
    ) -> core::result::Result<DidDocResponse, IdentityError> {
        let doc = serde_json::json!({
            "id": did.as_ref(),
            "service": [{
                "id": "#atproto_pds",
                "type": "AtprotoPersonalDataServer",
                "serviceEndpoint": "https://pds.test",
            }],
        });
        Ok(DidDocResponse {
            buffer: bytes::Bytes::from(serde_json::to_vec(&doc).unwrap()),
            status: StatusCode::OK,
            requested: None,
        })
    }
}

impl OAuthResolver for MockHttpClient {}
impl DpopExt for MockHttpClient {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_scripted_responses_in_order() {
        let client = MockHttpClient::new();
        client
            .push_json(StatusCode::OK, serde_json::json!({"a": 1}))
            .await;
        client
            .push_json(StatusCode::BAD_REQUEST, serde_json::json!({"error": "x"}))
            .await;

        let req = || {
            Request::builder()
                .uri("https://example.test")
                .body(Vec::new())
                .unwrap()
        };
        let first = client.send_http(req()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = client.send_http(req()).await.unwrap();
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        assert_eq!(client.requests_sent().await, 2);
    }
}
