//! Typed clients for the facade's collaborators: the blob store, the caption
//! service, and the caption vector index.
//!
//! Each collaborator is a trait so the services layer can be exercised
//! against fakes; the shipped implementations are `FsObjectStore` (local
//! disk + SQLite) and reqwest-backed HTTP clients.

pub mod caption;
pub mod fs_store;
pub mod store;
pub mod vector_index;

use thiserror::Error;

/// Failure talking to an outbound HTTP collaborator.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} response missing `{field}` field")]
    MalformedResponse {
        service: &'static str,
        field: &'static str,
    },
}
