//! Yandex - YandexGPT foundation models provider
//!
//! Talks to the synchronous completion endpoint of Yandex Foundation Models.
//! Authentication uses either a service-account API key or an IAM token.

/// HTTP client
pub mod provider;
/// Wire types and configuration
pub mod types;


pub use provider::YandexProvider;
pub use types::{YandexAuth, YandexConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
