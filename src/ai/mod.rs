//! External completion API client
//!
//! The text generator and vision verifier are opaque external services.
//! Core logic depends only on the narrow [`CompletionClient`] capability
//! trait so unit tests run against in-memory stubs.

pub mod completion;

pub use completion::{CompletionClient, CompletionConfig, HttpCompletionClient};
