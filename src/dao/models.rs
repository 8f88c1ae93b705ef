//! Shape of the shared room record as it is stored and replicated to every observer.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Players are joining and flagging themselves ready.
    #[default]
    Lobby,
    /// A question is live and votes are being collected.
    Game,
    /// Truth revealed; attacks are chosen, resolved and acknowledged.
    Result,
    /// At most one player is left; terminal for this game instance.
    Winner,
}

impl RoomStatus {
    /// Wire name of the status, as stored in the record.
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Lobby => "lobby",
            RoomStatus::Game => "game",
            RoomStatus::Result => "result",
            RoomStatus::Winner => "winner",
        }
    }
}

/// Single-use modifiers a player can hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Item {
    /// Doubles the damage of the attack it is spent on.
    Oil,
    /// Reflects every attack aimed at the holder for one round.
    Mirror,
    /// Cools the holder down when they would otherwise boil over.
    Ice,
}

/// Rule set selected when the room is created.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Wrong guesses heat up immediately, as soon as the truth is known.
    #[default]
    Party,
    /// Wrong guesses heat up together with the attacks.
    Classic,
}

/// Per-player state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PlayerEntity {
    /// Heat counter; reaching the room maximum eliminates the player.
    #[serde(default)]
    pub temperature: u32,
    /// Items held, duplicates allowed.
    #[serde(default)]
    pub inventory: Vec<Item>,
    /// Avatar emoji picked when joining.
    #[serde(default)]
    pub emoji: String,
}

/// Question currently asked to the hotseat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEntity {
    /// Text shown to every player.
    pub prompt: String,
    /// First answer.
    pub option_a: String,
    /// Second answer.
    pub option_b: String,
    /// Catalogue category used by the room's filter.
    pub category: String,
}

/// A player's guess (or, for the hotseat, their private choice).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteEntity {
    /// Selected answer.
    pub choice: String,
    /// Round the vote was cast in; votes from other rounds are ignored.
    pub round_id: u64,
}

/// Attack queued against a target until the round is resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PendingAttackEntity {
    /// Player who queued the attack.
    pub attacker: String,
    /// Heat before any oil bonus.
    pub damage: u32,
    /// The attacker asked to spend an oil on it.
    #[serde(default)]
    pub has_oil_bonus: bool,
}

/// One line of a player's round recap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttackDetailEntity {
    /// Source of the heat: a player name, or the penalty label.
    pub attacker: String,
    /// Heat carried by this line.
    pub damage: u32,
    /// The attack bounced off a mirror.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mirrored: bool,
    /// Wrong-guess penalty rather than an attack.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_penalty: bool,
}

/// Round recap for one player.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttackResultEntity {
    /// Distinct players involved in this player's attacks, in resolution order.
    pub attackers: Vec<String>,
    /// Heat received this round, penalty included.
    pub total_damage: u32,
    /// Recap lines, penalty first.
    pub attack_details: Vec<AttackDetailEntity>,
    /// Heat removed by an ice item this round.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cooled: u32,
}

/// Rules fixed at room creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfigEntity {
    /// Heat dealt by a plain attack.
    pub base_damage: u32,
    /// Temperature at which a player boils over.
    pub max_temperature: u32,
    /// Penalty timing.
    pub game_mode: GameMode,
    /// Question categories to draw from; empty means all.
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Default for RoomConfigEntity {
    fn default() -> Self {
        Self {
            base_damage: 20,
            max_temperature: 100,
            game_mode: GameMode::Party,
            categories: Vec::new(),
        }
    }
}

/// The shared room record. Every writer patches fields of this document; every observer
/// receives it whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomEntity {
    /// Current lifecycle status.
    #[serde(default)]
    pub status: RoomStatus,
    /// Monotonic round counter; zero before the first round.
    #[serde(default)]
    pub round_id: u64,
    /// Player who created the room and may start, force or reset it.
    pub host: String,
    /// Players in join order; this order drives hotseat rotation.
    #[serde(default)]
    pub players: IndexMap<String, PlayerEntity>,
    /// Player whose choice is the round's truth.
    #[serde(default)]
    pub hotseat: Option<String>,
    /// Question of the running round.
    #[serde(default)]
    pub current_question: Option<QuestionEntity>,
    /// Catalogue indices already asked in this room.
    #[serde(default)]
    pub used_questions: Vec<usize>,
    /// Votes keyed by player.
    #[serde(default)]
    pub votes: IndexMap<String, VoteEntity>,
    /// Players who settled their attack phase (attacked, took a reward, skipped or were
    /// disqualified).
    #[serde(default)]
    pub attack_decisions: IndexMap<String, bool>,
    /// Attacks keyed by target.
    #[serde(default)]
    pub pending_attacks: IndexMap<String, Vec<PendingAttackEntity>>,
    /// Recaps of the last resolution, keyed by player.
    #[serde(default)]
    pub attack_results: IndexMap<String, AttackResultEntity>,
    /// Set together with the resolution effects; marks the round as resolved.
    #[serde(default)]
    pub round_recap_shown: bool,
    /// Players ready for the next phase.
    #[serde(default)]
    pub ready: Vec<String>,
    /// Players who acknowledged their recap.
    #[serde(default)]
    pub popup_confirmed: Vec<String>,
    /// Players out of the game, in elimination order.
    #[serde(default)]
    pub eliminated_players: Vec<String>,
    /// Last player standing, once the game is over.
    #[serde(default)]
    pub winner: Option<String>,
    /// Rules fixed at creation.
    #[serde(default)]
    pub config: RoomConfigEntity,
    /// Human-readable event log, one line per event.
    #[serde(default)]
    pub log: Vec<String>,
    /// RFC 3339 creation timestamp.
    #[serde(default)]
    pub created_at: String,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}
