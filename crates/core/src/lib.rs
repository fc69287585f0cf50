//! Shared domain types for the AvatarForge progress bridge.
//!
//! Holds the types that cross crate boundaries: job identifiers,
//! progress samples, and the job status collaborator contract. No I/O
//! lives here.

pub mod job;
pub mod types;
