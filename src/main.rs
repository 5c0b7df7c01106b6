//! # Qri Relay - chat relay server
//!
//! Serves the browser chat widget: accepts chat requests, strips client-supplied
//! system prompts, pins the Qri persona, trims the history and forwards the request to
//! an OpenAI-compatible completion API, answering buffered or streamed.
//!
//! ## Features
//!
//! - **CORS everywhere**: every response carries the same permissive CORS headers
//! - **Request shaping**: identity preamble, history window, model escalation
//! - **Streaming Support**: Server-Sent Events relayed frame by frame with a keep-alive
//!   ping up front and a single `data: [DONE]` at the end
//! - **Friendly failures**: every error reaches the caller as assistant-shaped prose
//! - **Configurable Logging**: Structured logging with tracing
//!
//! ## Configuration
//!
//! ```bash
//! # Upstream credential (not validated up front)
//! export OPENAI_API_KEY="sk-..."
//!
//! # Optional
//! export RELAY_DELIVERY_MODE=streaming  # buffered, streaming
//! export PORT=3000
//! export LOG_LEVEL=info
//! ```
//!
//! ## API Usage
//!
//! ```bash
//! curl -N -X POST http://localhost:3000/api/qri-chat \
//!   -H "Content-Type: application/json" \
//!   -d '{"messages": [{"role": "user", "content": "Hello!"}], "meta": {"escalate": false}}'
//! ```
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license at your option.
//!
//! Authors: Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp
//!

/* --- uses ------------------------------------------------------------------------------------ */

use std::env;

use axum::Router;
use tracing::{Level, info};

use qri_relay::config::{self, Config, ValidationIssue, ValidationSeverity, mask_secret};
use qri_relay::error::{RelayError, Result};
use qri_relay::{HEALTH_PATH, RELAY_PATH, create_app};

/* --- constants ------------------------------------------------------------------------------ */

/** the version as defined in cargo.toml */
const VERSION: &str = env!("CARGO_PKG_VERSION");

/* --- start of code -------------------------------------------------------------------------- */

///
/// Main application entry point for the Qri chat relay.
///
/// Initializes logging, loads configuration from environment variables, builds the
/// router and starts the HTTP server.
#[tokio::main]
async fn main() {
    // Handle CLI arguments before config loading
    handle_cli_args();

    if let Err(e) = run().await {
        // Print error message line by line to ensure proper formatting
        let error_msg = format!("{}", e);
        eprintln!("Error:");
        for line in error_msg.lines() {
            eprintln!("{}", line);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;
    initialize_logging(&config);

    let app = create_app(config.clone())?;

    start_server(&config, app).await
}

///
/// Handle command line arguments like --version and --help before config loading.
///
/// This ensures these commands work even without proper configuration.
fn handle_cli_args() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return; // No arguments, proceed with normal startup
    }

    match args[1].as_str() {
        "--version" | "-V" => {
            println!("qri-relay {}", VERSION);
            std::process::exit(0);
        }
        "--help" | "-h" => {
            print_help();
            std::process::exit(0);
        }
        "doctor" => {
            run_doctor();
            std::process::exit(0);
        }
        "validate" => {
            let exit_code = run_validate();
            std::process::exit(exit_code);
        }
        other => {
            if other.starts_with('-') {
                eprintln!("Error: Unknown option: {}", other);
            } else {
                eprintln!("Error: Unknown command: {}", other);
            }
            eprintln!();
            print_help();
            std::process::exit(1);
        }
    }
}

///
/// Print help information for the relay CLI.
fn print_help() {
    println!("Qri Relay v{}", VERSION);
    println!("Chat relay between the browser widget and an OpenAI-compatible completion API");
    println!();
    println!("USAGE:");
    println!("    qri-relay [COMMAND] [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    doctor              Check configuration health");
    println!("    validate            Validate configuration and exit");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help          Print help information");
    println!("    -V, --version       Print version information");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("    OPENAI_API_KEY                Upstream bearer credential");
    println!("    RELAY_UPSTREAM_URL            Chat-completions URL (default: {})", config::DEFAULT_UPSTREAM_URL);
    println!("    RELAY_CHEAP_MODEL             Default model (default: {})", config::DEFAULT_CHEAP_MODEL);
    println!("    RELAY_ESCALATED_MODEL         Model for meta.escalate (default: {})", config::DEFAULT_ESCALATED_MODEL);
    println!("    RELAY_HISTORY_PAIRS           Exchange pairs kept (default: {})", config::DEFAULT_HISTORY_PAIRS);
    println!("    RELAY_BUFFERED_MAX_TOKENS     Token ceiling, buffered (default: {})", config::DEFAULT_BUFFERED_MAX_TOKENS);
    println!("    RELAY_STREAMING_MAX_TOKENS    Token ceiling, streaming (default: {})", config::DEFAULT_STREAMING_MAX_TOKENS);
    println!("    RELAY_UPSTREAM_TIMEOUT_SECS   Wait for upstream to answer (default: {})", config::DEFAULT_UPSTREAM_TIMEOUT_SECS);
    println!("    RELAY_DELIVERY_MODE           buffered or streaming (default: streaming)");
    println!("    RELAY_IDENTITY_PROMPT         System prompt pinned ahead of every conversation");
    println!("    PORT                          Server port (default: {})", config::DEFAULT_PORT);
    println!("    LOG_LEVEL                     trace, debug, info, warn, error (default: info)");
    println!();
    println!("EXAMPLES:");
    println!("    qri-relay                   Start the relay");
    println!("    qri-relay doctor            Check configuration");
    println!("    qri-relay validate          Validate and exit");
}

///
/// Run the doctor command to check configuration health.
///
/// Loads the configuration the same way the server does and prints every
/// validation issue with its suggestion. The credential is only shown masked.
fn run_doctor() {
    // Load .env file first so we can check actual environment variables
    let _ = dotenvy::dotenv();

    println!("Qri Relay Doctor - Configuration Health Check");
    println!("{}", "=".repeat(60));
    println!();

    if std::path::Path::new(".env").exists() {
        println!("[OK] Found .env file");
    } else {
        println!("[INFO] No .env file found (using environment variables)");
    }
    println!();

    println!("Configuration Validation:");
    match Config::from_env() {
        Ok(config) => {
            println!("  [OK] Configuration loaded successfully");
            println!("     OPENAI_API_KEY: {}", mask_secret(&config.api_key));
            println!("     Upstream: {}", config.upstream_url);
            println!("     Models: {} / {}", config.cheap_model, config.escalated_model);
            println!("     Delivery: {:?}", config.delivery_mode);
            println!();

            let issues = config.validate();
            if issues.is_empty() {
                println!("  [OK] No validation issues found");
                println!();
                println!("[SUCCESS] Configuration looks good! You're ready to run Qri Relay.");
                return;
            }

            print_issues("[ERROR]", "error", &issues, ValidationSeverity::Error);
            print_issues("[WARNING]", "warning", &issues, ValidationSeverity::Warning);
            print_issues("[INFO]", "info message", &issues, ValidationSeverity::Info);

            if issues.iter().any(|i| i.severity == ValidationSeverity::Error) {
                println!("[ERROR] Configuration has errors. Please fix them before running Qri Relay.");
            } else {
                println!("[SUCCESS] Configuration has warnings but should work. Review suggestions above.");
            }
        }
        Err(e) => {
            println!("  [ERROR] Failed to load configuration:");
            println!("     {}", e);
        }
    }
}

fn print_issues(tag: &str, noun: &str, issues: &[ValidationIssue], severity: ValidationSeverity) {
    let matching: Vec<_> = issues.iter().filter(|i| i.severity == severity).collect();
    if matching.is_empty() {
        return;
    }

    println!("  {} Found {} {}(s):", tag, matching.len(), noun);
    for issue in &matching {
        println!("     • {}: {}", issue.field, issue.message);
        if let Some(suggestion) = &issue.suggestion {
            println!("       [TIP] {}", suggestion);
        }
    }
    println!();
}

///
/// Run the validate command to validate configuration and exit.
///
/// Returns exit code 0 if valid, 1 if invalid.
fn run_validate() -> i32 {
    match Config::from_env() {
        Ok(config) => {
            let issues = config.validate();
            let errors: Vec<_> =
                issues.iter().filter(|i| i.severity == ValidationSeverity::Error).collect();

            if errors.is_empty() {
                println!("[OK] Configuration is valid");
                0
            } else {
                eprintln!("[ERROR] Configuration validation failed:");
                for issue in &errors {
                    eprintln!("  • {}: {}", issue.field, issue.message);
                    if let Some(suggestion) = &issue.suggestion {
                        eprintln!("    Suggestion: {}", suggestion);
                    }
                }
                1
            }
        }
        Err(e) => {
            eprintln!("[ERROR] Configuration error: {}", e);
            1
        }
    }
}

///
/// Initialize logging with the specified log level.
///
/// # Arguments
///  * `config` - application configuration containing log level settings
fn initialize_logging(config: &Config) {
    let log_level = match config.log_level {
        config::LogLevel::Trace => Level::TRACE,
        config::LogLevel::Debug => Level::DEBUG,
        config::LogLevel::Info => Level::INFO,
        config::LogLevel::Warn => Level::WARN,
        config::LogLevel::Error => Level::ERROR,
    };

    tracing_subscriber::fmt().with_max_level(log_level).with_target(false).init();
}

///
/// Start the HTTP server and log startup information.
///
/// # Arguments
///  * `config` - application configuration
///  * `app` - configured Axum application
///
/// # Returns
///  * `Ok(())` when server shuts down gracefully
///  * `RelayError::Http` if server binding or startup fails
async fn start_server(config: &Config, app: Router) -> Result<()> {
    let listener =
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await.map_err(|e| {
            RelayError::Http(format!(
                "Failed to bind to port {}: {}\n\
                \n\
                To fix this:\n\
                • Check that no other process is using the port (lsof -i :{})\n\
                • Ensure you have permission to bind to the port\n\
                • Try a different port: export PORT=3001\n\
                \n\
                Run 'qri-relay doctor' for more help.",
                config.port, e, config.port
            ))
        })?;

    log_startup_info(config);

    axum::serve(listener, app)
        .await
        .map_err(|e| RelayError::Http(format!("Server error: {}", e)))?;

    Ok(())
}

///
/// Log startup information and configuration details.
fn log_startup_info(config: &Config) {
    info!("Qri Relay v{} running on port {}", VERSION, config.port);
    info!("Chat endpoint: http://localhost:{}{}", config.port, RELAY_PATH);
    info!("Health endpoint: http://localhost:{}{}", config.port, HEALTH_PATH);
    info!(
        "Upstream: {} (models {} / {}, delivery {:?})",
        config.upstream_url, config.cheap_model, config.escalated_model, config.delivery_mode
    );

    if config.api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set; upstream calls will fail authorization");
    }

    if config.log_level.is_trace_enabled() {
        info!("[TRACE] Trace logging is ENABLED (LOG_LEVEL={:?})", config.log_level);
    }
}
