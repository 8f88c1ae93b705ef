pub mod actions;
/// Health check payload.
pub mod health;
pub mod rooms;
/// Server-sent event payloads.
pub mod sse;
pub mod validation;
