//! AvatarForge API server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! the SSE progress publisher) so integration tests and the binary
//! entrypoint can both access them.

pub mod config;
pub mod error;
pub mod publisher;
pub mod router;
pub mod routes;
pub mod state;
