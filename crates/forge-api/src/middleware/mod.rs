//! # HTTP Middleware
//!
//! Request counting for the `/metrics` endpoint. Request tracing uses
//! `tower_http::trace::TraceLayer` directly in [`crate::app`].

pub mod metrics;
