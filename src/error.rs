//! Application-wide error types.

use thiserror::Error;

use crate::api::ApiError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("api error: {0}")]
    Api(#[from] ApiError),

    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("client error: {0}")]
    Client(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(!e.to_string().is_empty());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn logger_error_display() {
        let e = AppError::Logger("already initialized".into());
        assert!(e.to_string().contains("already initialized"));
    }

    #[test]
    fn transport_error_converts() {
        let e: AppError = TransportError::Closed.into();
        assert!(e.to_string().starts_with("transport error"));
    }

    #[test]
    fn api_error_converts() {
        let e: AppError = ApiError::AuthorizationRequired.into();
        assert!(e.to_string().contains("Authorization header required"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        // satisfies std::error::Error trait
        let _: &dyn Error = &e;
    }
}
