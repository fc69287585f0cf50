//! ComfyUI progress bridge: WebSocket adapter and subscription registry.
//!
//! Consumes the engine's heterogeneous progress notifications over a
//! single shared WebSocket connection, reconciles them into one
//! monotonic progress signal per job, and fans the result out to any
//! number of in-process subscribers. Also provides a reqwest-backed
//! status poller over the engine's history endpoint for consumers whose
//! push path is unavailable.

pub mod bridge;
pub mod client;
pub mod hub;
pub mod messages;
pub mod processor;
pub mod reconnect;
pub mod status;

pub use bridge::ComfyUiBridge;
pub use hub::{JobSubscription, ProgressHub};
