/// Database model definitions.
pub mod models;
/// Field-scoped mutation primitives.
pub mod patch;
/// Room record storage backends and their change feeds.
pub mod room_store;
/// Storage abstraction layer for database operations.
pub mod storage;
