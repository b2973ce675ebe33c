//! JSON representations returned by the HTTP surface.
//!
//! These are the wire shapes, kept separate from the object-store client's
//! own types so the store contract can evolve without leaking into responses.

pub mod bucket;
pub mod object;
pub mod search;
