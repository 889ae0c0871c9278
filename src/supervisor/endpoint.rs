//! Connection target — derived from the page origin the client runs under.
//!
//! `https` origins upgrade to `wss`, everything else uses `ws`. Host comes
//! from the origin; port and path are deployment constants from config.

use url::Url;

use crate::transport::TransportError;

pub const DEFAULT_PORT: u16 = 50002;
pub const DEFAULT_PATH: &str = "/ws";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Origin of the page, e.g. `https://tasks.example.com`.
    pub origin: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    pub fn new(origin: impl Into<String>) -> Self {
        Self { origin: origin.into(), port: DEFAULT_PORT, path: DEFAULT_PATH.to_string() }
    }

    /// Build `<scheme>://<host>:<port><path>[?user_id=<id>]`.
    ///
    /// An identity of `0` is left out: the server reserves 0 for broadcast.
    pub fn target(&self, identity: Option<u64>) -> Result<Url, TransportError> {
        let origin = Url::parse(&self.origin)
            .map_err(|e| TransportError::Endpoint(format!("bad origin '{}': {e}", self.origin)))?;
        let scheme = match origin.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        let host = origin
            .host_str()
            .ok_or_else(|| TransportError::Endpoint(format!("origin '{}' has no host", self.origin)))?;

        let path = if self.path.starts_with('/') { self.path.clone() } else { format!("/{}", self.path) };
        let mut url = Url::parse(&format!("{scheme}://{host}:{}{path}", self.port))
            .map_err(|e| TransportError::Endpoint(e.to_string()))?;

        if let Some(id) = identity.filter(|id| *id != 0) {
            url.query_pairs_mut().append_pair("user_id", &id.to_string());
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_origin_uses_ws() {
        let url = Endpoint::new("http://localhost:5173").target(None).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:50002/ws");
    }

    #[test]
    fn https_origin_upgrades_to_wss() {
        let url = Endpoint::new("https://tasks.example.com/board").target(None).unwrap();
        assert_eq!(url.as_str(), "wss://tasks.example.com:50002/ws");
    }

    #[test]
    fn identity_becomes_query() {
        let url = Endpoint::new("http://localhost").target(Some(42)).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:50002/ws?user_id=42");
    }

    #[test]
    fn zero_identity_is_omitted() {
        let url = Endpoint::new("http://localhost").target(Some(0)).unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn custom_port_and_path() {
        let endpoint = Endpoint { origin: "http://10.0.0.5".into(), port: 9000, path: "live".into() };
        assert_eq!(endpoint.target(None).unwrap().as_str(), "ws://10.0.0.5:9000/live");
    }

    #[test]
    fn ipv6_host_is_bracketed() {
        let url = Endpoint::new("http://[::1]:3000").target(None).unwrap();
        assert_eq!(url.as_str(), "ws://[::1]:50002/ws");
    }

    #[test]
    fn malformed_origins_error() {
        assert!(matches!(Endpoint::new("not a url").target(None), Err(TransportError::Endpoint(_))));
        assert!(matches!(Endpoint::new("data:text/plain,hi").target(None), Err(TransportError::Endpoint(_))));
    }
}
