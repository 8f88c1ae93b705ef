//! Library crate for hotseat-heat-back, exposing modules for binaries and integration tests.

pub mod config;
/// Room records, update batches and the stores that hold them.
pub mod dao;
/// Request, response and event payloads.
pub mod dto;
pub mod engine;
/// Error types and their HTTP mapping.
pub mod error;
/// HTTP routes.
pub mod routes;
/// Game services and the authorities that advance rooms.
pub mod services;
/// Shared application state.
pub mod state;
