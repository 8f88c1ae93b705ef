//! Pure game rules shared by every authority that advances a room.

pub mod resolution;
pub mod rules;

pub use resolution::{Resolution, resolve_attacks};
pub use rules::{DueTransition, PenaltyPolicy, due_transition, next_transition};
