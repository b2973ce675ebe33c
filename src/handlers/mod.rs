//! HTTP handlers, thin adapters between axum extractors and the services.

pub mod bucket_handlers;
pub mod health_handlers;
pub mod object_handlers;
pub mod search_handlers;
