//! HTTP API Module
//!
//! Read-only status API exposing node health and replication deficiencies.

mod http;

pub use http::{DeficiencyEntry, HealthResponse, HttpServer, StatusResponse};
