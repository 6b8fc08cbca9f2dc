//! Structured logging and optional OpenTelemetry span export.
//!
//! Logs are JSON lines on stdout. When an OTLP endpoint is configured, spans
//! are additionally exported over OTLP/gRPC.
//!
//! # Telemetry invariants
//!
//! - **No key material, passwords, tokens or payloads** may appear in any
//!   span attribute or log field.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`).

pub mod init;

pub use init::init_telemetry;
