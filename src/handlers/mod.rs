//! HTTP handlers.
//!
//! Each handler performs a single blob store call and writes a fixed-shape
//! response.  Route wiring and extractor plumbing live in [`crate::server`].

pub mod admin;
pub mod blob;
pub mod container;
