//! DTO definitions for room lifecycle endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{GameMode, RoomEntity},
    dto::validation::validate_player_name,
};

/// Payload creating a room; the caller becomes its host and first player.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateRoomRequest {
    /// Name of the creating player.
    #[validate(custom(function = "validate_player_name"))]
    pub host: String,
    /// Avatar of the creating player.
    #[serde(default)]
    #[validate(length(max = 16))]
    pub emoji: String,
    /// Overrides of the configured room defaults.
    #[serde(default)]
    pub game_mode: Option<GameMode>,
    /// Heat dealt by a plain attack.
    #[serde(default)]
    #[validate(range(min = 1, max = 100))]
    pub base_damage: Option<u32>,
    /// Temperature at which players boil over.
    #[serde(default)]
    #[validate(range(min = 10, max = 1000))]
    pub max_temperature: Option<u32>,
    /// Question categories to draw from.
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

/// Payload adding a player to a lobby.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRoomRequest {
    /// Player name, unique within the room.
    #[validate(custom(function = "validate_player_name"))]
    pub name: String,
    /// Avatar emoji.
    #[serde(default)]
    #[validate(length(max = 16))]
    pub emoji: String,
}

/// Snapshot of a room together with its code.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomResponse {
    /// Four-letter room code.
    pub room_id: String,
    /// Current record.
    pub room: RoomEntity,
}

impl RoomResponse {
    /// Pair a record with its code.
    pub fn new(room_id: impl Into<String>, room: RoomEntity) -> Self {
        Self {
            room_id: room_id.into(),
            room,
        }
    }
}
