//! Local inference sidecar: one GGUF model at a time behind a loopback
//! HTTP API that returns a single sanitized answer per prompt.

pub mod web;
