//! Transport upgrade: origin policy and sub-protocol negotiation.
//!
//! The upgrade answers with the configured sub-protocol only when the peer
//! offered it. A socket that comes out of the handshake without that
//! protocol is closed before any connection state exists.

use std::future::Future;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::header::ORIGIN;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use futures::SinkExt;
use metrics::counter;
use tracing::{debug, warn};

use crate::metrics::WS_NEGOTIATION_FAILURES_TOTAL;

/// Which request origins may open a connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Accept every origin.
    #[default]
    AllowAll,
    /// Accept only these exact origins.
    AllowList(Vec<String>),
}

impl OriginPolicy {
    /// Whether a request carrying `origin` may upgrade.
    ///
    /// Requests without an `Origin` header (non-browser clients) are accepted.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (Self::AllowAll, _) | (Self::AllowList(_), None) => true,
            (Self::AllowList(allowed), Some(origin)) => allowed.iter().any(|a| a == origin),
        }
    }

    /// Check the `Origin` header of a request.
    pub fn allows_request(&self, headers: &HeaderMap) -> bool {
        let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
        self.allows(origin)
    }
}

impl From<Option<Vec<String>>> for OriginPolicy {
    fn from(origins: Option<Vec<String>>) -> Self {
        origins.map_or(Self::AllowAll, Self::AllowList)
    }
}

/// Whether the negotiated protocol equals `expected`.
pub fn protocol_matches(negotiated: Option<&HeaderValue>, expected: &str) -> bool {
    negotiated.is_some_and(|p| p.as_bytes() == expected.as_bytes())
}

/// Performs the handshake for one sub-protocol.
#[derive(Clone, Debug)]
pub struct Upgrader {
    subprotocol: String,
    max_message_size: usize,
}

impl Upgrader {
    /// Upgrader requiring `subprotocol`.
    pub fn new(subprotocol: impl Into<String>, max_message_size: usize) -> Self {
        Self {
            subprotocol: subprotocol.into(),
            max_message_size,
        }
    }

    /// The sub-protocol peers must offer.
    pub fn subprotocol(&self) -> &str {
        &self.subprotocol
    }

    /// Finish the handshake and hand a negotiated socket to `on_ready`.
    ///
    /// A handshake failure is logged and dropped. A socket whose negotiated
    /// protocol is not ours is closed and `on_ready` never runs.
    pub fn upgrade<F, Fut>(&self, ws: WebSocketUpgrade, on_ready: F) -> Response
    where
        F: FnOnce(WebSocket) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let expected = self.subprotocol.clone();
        ws.protocols([self.subprotocol.clone()])
            .max_message_size(self.max_message_size)
            .on_failed_upgrade(|err: axum::Error| {
                counter!(WS_NEGOTIATION_FAILURES_TOTAL, "reason" => "handshake").increment(1);
                warn!(error = %err, "Failed to establish WebSocket connection");
            })
            .on_upgrade(move |mut socket| async move {
                if !protocol_matches(socket.protocol(), &expected) {
                    counter!(WS_NEGOTIATION_FAILURES_TOTAL, "reason" => "subprotocol").increment(1);
                    warn!(
                        expected = %expected,
                        "Connection does not implement the GraphQL WS protocol"
                    );
                    if let Err(err) = socket.close().await {
                        debug!(error = %err, "error closing rejected socket");
                    }
                    return;
                }
                on_ready(socket).await;
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_accepts_anything() {
        let policy = OriginPolicy::AllowAll;
        assert!(policy.allows(Some("https://evil.test")));
        assert!(policy.allows(None));
    }

    #[test]
    fn allow_list_matches_exactly() {
        let policy = OriginPolicy::AllowList(vec!["https://app.test".into()]);
        assert!(policy.allows(Some("https://app.test")));
        assert!(!policy.allows(Some("https://app.test.evil")));
        assert!(!policy.allows(Some("http://app.test")));
    }

    #[test]
    fn allow_list_accepts_missing_origin() {
        let policy = OriginPolicy::AllowList(vec![]);
        assert!(policy.allows(None));
    }

    #[test]
    fn request_headers_are_checked() {
        let policy = OriginPolicy::AllowList(vec!["https://app.test".into()]);
        let mut headers = HeaderMap::new();
        let _ = headers.insert(ORIGIN, HeaderValue::from_static("https://other.test"));
        assert!(!policy.allows_request(&headers));
        let _ = headers.insert(ORIGIN, HeaderValue::from_static("https://app.test"));
        assert!(policy.allows_request(&headers));
    }

    #[test]
    fn policy_from_settings_value() {
        assert_eq!(OriginPolicy::from(None), OriginPolicy::AllowAll);
        assert_eq!(
            OriginPolicy::from(Some(vec!["a".to_owned()])),
            OriginPolicy::AllowList(vec!["a".to_owned()])
        );
    }

    #[test]
    fn protocol_match_requires_exact_token() {
        let ours = HeaderValue::from_static("graphql-ws");
        let other = HeaderValue::from_static("graphql-transport-ws");
        assert!(protocol_matches(Some(&ours), "graphql-ws"));
        assert!(!protocol_matches(Some(&other), "graphql-ws"));
        assert!(!protocol_matches(None, "graphql-ws"));
    }

    #[test]
    fn upgrader_keeps_protocol() {
        assert_eq!(Upgrader::new("graphql-ws", 1024).subprotocol(), "graphql-ws");
    }
}
