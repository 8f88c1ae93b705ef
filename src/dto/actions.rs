//! DTO definitions for in-game player actions.

use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{dao::models::Item, dto::validation::validate_player_name};

/// Action that only needs to know who is acting.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PlayerRequest {
    /// Acting player.
    #[validate(custom(function = "validate_player_name"))]
    pub player: String,
}

/// A guess (or the hotseat's own choice) for the current question.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct VoteRequest {
    /// Voting player.
    #[validate(custom(function = "validate_player_name"))]
    pub player: String,
    /// Chosen answer.
    #[validate(length(min = 1, max = 200))]
    pub choice: String,
}

/// Attack decision of a correct guesser.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AttackRequest {
    /// Attacking player.
    #[validate(custom(function = "validate_player_name"))]
    pub player: String,
    /// Player to heat up.
    #[validate(custom(function = "validate_player_name"))]
    pub target: String,
    /// Spend one oil to double the attack.
    #[serde(default)]
    pub use_oil: bool,
}

/// Take an item instead of attacking.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct RewardRequest {
    /// Player taking the reward.
    #[validate(custom(function = "validate_player_name"))]
    pub player: String,
    /// Item to add to the inventory.
    pub item: Item,
}
