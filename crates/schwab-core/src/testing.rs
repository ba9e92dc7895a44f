//! In-memory [`HttpTransport`] for tests.
//!
//! Responses are queued per URL fragment and handed out in order; every
//! request is recorded so tests can assert on attempt counts and headers.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::http::{HttpRequest, HttpResponse, HttpTransport};

struct Route {
    url_contains: String,
    responses: VecDeque<HttpResponse>,
}

/// Scripted transport returning queued responses.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` for the next request whose URL contains `url_contains`.
    pub fn push(&self, url_contains: &str, response: HttpResponse) -> &Self {
        let mut routes = self.routes.lock();
        if let Some(route) = routes.iter_mut().find(|r| r.url_contains == url_contains) {
            route.responses.push_back(response);
        } else {
            routes.push(Route {
                url_contains: url_contains.to_string(),
                responses: VecDeque::from([response]),
            });
        }
        self
    }

    /// All requests sent so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Requests whose URL contains `url_contains`.
    pub fn requests_to(&self, url_contains: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.contains(url_contains))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        let url = request.url.clone();
        self.requests.lock().push(request);

        let mut routes = self.routes.lock();
        routes
            .iter_mut()
            .filter(|r| url.contains(&r.url_contains))
            .find_map(|r| r.responses.pop_front())
            .ok_or_else(|| TransportError::Connection(format!("no scripted response for {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responses_are_served_in_order_per_route() {
        let transport = ScriptedTransport::new();
        let _ = transport
            .push("/a", HttpResponse::new(401, ""))
            .push("/a", HttpResponse::new(200, "ok"))
            .push("/b", HttpResponse::new(500, ""));
        let cancel = CancellationToken::new();

        let r1 = transport.send(HttpRequest::get("http://h/a"), &cancel).await.unwrap();
        let r2 = transport.send(HttpRequest::get("http://h/b"), &cancel).await.unwrap();
        let r3 = transport.send(HttpRequest::get("http://h/a"), &cancel).await.unwrap();
        assert_eq!((r1.status, r2.status, r3.status), (401, 500, 200));
        assert_eq!(transport.requests_to("/a").len(), 2);

        let exhausted = transport.send(HttpRequest::get("http://h/a"), &cancel).await;
        assert!(matches!(exhausted, Err(TransportError::Connection(_))));
    }
}
