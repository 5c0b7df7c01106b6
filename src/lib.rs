//! # Qri Relay - chat relay library
//!
//! This crate provides a small HTTP relay that takes chat requests from a browser
//! client, shapes them (identity preamble, history trimming, model tier selection) and
//! forwards them to an OpenAI-compatible chat-completions API. Answers go back either
//! as one JSON message or as a live Server-Sent Events stream.
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use qri_relay::{Config, create_app};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load configuration
//!     let config = Config::from_env()?;
//!
//!     // Create the application
//!     let app = create_app(config)?;
//!
//!     // Start server
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Configuration management and environment variable handling
//! - [`shaping`] - Inbound sanitation and outbound payload composition
//! - [`upstream`] - Client for the upstream completion API
//! - [`frame`] - Event-stream frames and the upstream frame splitter
//! - [`server`] - HTTP route handlers and the streaming state machine
//! - [`error`] - Error types and handling

pub mod config;
pub mod error;
pub mod frame;
pub mod server;
pub mod shaping;
pub mod upstream;

// Re-export commonly used types
pub use config::{Config, DeliveryMode, ValidationIssue, ValidationSeverity};
pub use error::RelayError;

/* --- constants ------------------------------------------------------------------------------ */

/** route served by the relay */
pub const RELAY_PATH: &str = "/api/qri-chat";

/** health check route */
pub const HEALTH_PATH: &str = "/health";

/* --- start of code -------------------------------------------------------------------------- */

/// Creates a new relay application with the given configuration.
///
/// Sets up the chat route with its method gate, the health route, uniform CORS
/// headers on every response, and request tracing.
///
/// # Arguments
///
/// * `config` - Application configuration
///
/// # Returns
///
/// Returns an Axum Router that can be served directly.
///
/// # Errors
///
/// Returns a `RelayError` if the upstream HTTP client cannot be created.
pub fn create_app(config: Config) -> Result<axum::Router, RelayError> {
    use axum::Router;
    use axum::http::{HeaderValue, header};
    use axum::routing::{get, post};
    use std::sync::Arc;
    use tower_http::set_header::SetResponseHeaderLayer;
    use tower_http::trace::TraceLayer;

    let app_state = Arc::new(server::AppState::new(config)?);

    Ok(Router::new()
        .route(
            RELAY_PATH,
            post(server::chat)
                .options(server::preflight)
                .fallback(server::method_not_allowed),
        )
        .route(HEALTH_PATH, get(server::health))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state))
}
