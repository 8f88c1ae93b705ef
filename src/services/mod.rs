/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Player actions: votes, readiness, attack decisions and acknowledgements.
pub mod player_service;
/// Question catalogue and draw order.
pub mod questions;
/// Bounded retries for store operations and the registry of in-flight ones.
pub mod retry;
/// Room lifecycle and host controls.
pub mod room_service;
/// Host-side driver of automatic transitions.
pub mod round_controller;
/// Server-side trigger advancing any room from the global mutation feed.
pub mod server_trigger;
/// Server-Sent Events streaming of room snapshots.
pub mod sse_service;
/// Room store connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Transition batches and their idempotent execution.
pub mod transitions;
/// Liveness and condition checks recovering stalled rooms.
pub mod watchdog;
