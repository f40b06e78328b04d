//! FraudGuard API Module
//!
//! The API module exposes fraud scoring over HTTP: a liveness check, batch
//! prediction against the active model and the active model's version.

pub mod handlers;
pub mod models;
pub mod server;

pub use handlers::*;
pub use models::*;
pub use server::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_defaults() {
        let config = ApiConfig::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert!(config.api_token.is_none());
    }
}
