//! Core types and trait definitions for the Canvass feedback distribution
//! engine.
//!
//! This crate is deliberately free of HTTP, database and runtime
//! dependencies. Storage backends implement [`store::FeedbackStore`] and
//! [`store::JobQueue`]; the operations here (credential issuance, recipient
//! resolution, lifecycle transitions, token access, expiry) are generic over
//! those traits.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod credential;
pub mod error;
pub mod expiry;
pub mod form;
pub mod job;
pub mod lifecycle;
pub mod recipient;
pub mod store;
pub mod template;

pub use error::{Error, Result};
