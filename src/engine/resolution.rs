//! Attack resolution: turns one round's queued attacks, penalties and items into temperature
//! deltas and per-player recaps. Pure; the caller commits the output together with the
//! round's completion flag.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::dao::models::{AttackDetailEntity, AttackResultEntity, Item, RoomEntity};

use super::rules::{
    ICE_COOLING, PENALTY_DAMAGE, PENALTY_LABEL, PenaltyPolicy, active_players, eligible_attackers,
    wrong_guessers,
};

/// Everything a resolution pass decides for one round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Non-zero temperature changes, in join order.
    pub deltas: IndexMap<String, i64>,
    /// One recap per active player, including players nobody touched.
    pub results: IndexMap<String, AttackResultEntity>,
    /// Inventories that lost an item this round.
    pub inventories: IndexMap<String, Vec<Item>>,
    /// Players reaching the maximum temperature for the first time.
    pub eliminated: Vec<String>,
}

impl Resolution {
    /// Temperature change for `name`, zero when untouched.
    pub fn delta(&self, name: &str) -> i64 {
        self.deltas.get(name).copied().unwrap_or(0)
    }
}

/// Compute the outcome of the current round from a snapshot in `result` status.
pub fn resolve_attacks(room: &RoomEntity) -> Resolution {
    let policy = PenaltyPolicy::from(room.config.game_mode);
    let participants = active_players(room);
    let eligible: HashSet<&str> = eligible_attackers(room).into_iter().collect();

    let mut inventories: IndexMap<&str, Vec<Item>> = participants
        .iter()
        .map(|name| (*name, room.players[*name].inventory.clone()))
        .collect();
    let mut deltas: IndexMap<&str, i64> = participants.iter().map(|name| (*name, 0)).collect();
    let mut results: IndexMap<&str, AttackResultEntity> = participants
        .iter()
        .map(|name| (*name, AttackResultEntity::default()))
        .collect();

    // Penalty lines come first in each recap.
    for name in wrong_guessers(room) {
        let Some(result) = results.get_mut(name) else {
            continue;
        };
        result.total_damage += PENALTY_DAMAGE;
        result.attack_details.push(AttackDetailEntity {
            attacker: PENALTY_LABEL.to_owned(),
            damage: PENALTY_DAMAGE,
            mirrored: false,
            is_penalty: true,
        });
        if policy == PenaltyPolicy::Deferred {
            deltas[name] += i64::from(PENALTY_DAMAGE);
        }
    }

    for target in &participants {
        let Some(attacks) = room.pending_attacks.get(*target) else {
            continue;
        };
        let mut seen = HashSet::new();
        let valid: Vec<_> = attacks
            .iter()
            .filter(|attack| {
                attack.attacker != *target
                    && eligible.contains(attack.attacker.as_str())
                    && seen.insert(attack.attacker.as_str())
            })
            .collect();
        if valid.is_empty() {
            continue;
        }
        let mirrored = take_item(&mut inventories, target, Item::Mirror);

        for attack in valid {
            let attacker = attack.attacker.as_str();
            let mut damage = attack.damage;
            if attack.has_oil_bonus && take_item(&mut inventories, attacker, Item::Oil) {
                damage *= 2;
            }

            if mirrored {
                deltas[attacker] += i64::from(damage);
                let own = &mut results[attacker];
                push_unique(&mut own.attackers, target);
                own.total_damage += damage;
                own.attack_details.push(AttackDetailEntity {
                    attacker: (*target).to_owned(),
                    damage,
                    mirrored: true,
                    is_penalty: false,
                });
                let reflected = &mut results[*target];
                push_unique(&mut reflected.attackers, attacker);
                reflected.attack_details.push(AttackDetailEntity {
                    attacker: attacker.to_owned(),
                    damage,
                    mirrored: true,
                    is_penalty: false,
                });
            } else {
                deltas[*target] += i64::from(damage);
                let hit = &mut results[*target];
                push_unique(&mut hit.attackers, attacker);
                hit.total_damage += damage;
                hit.attack_details.push(AttackDetailEntity {
                    attacker: attacker.to_owned(),
                    damage,
                    mirrored: false,
                    is_penalty: false,
                });
            }
        }
    }

    let max = i64::from(room.config.max_temperature);
    let mut eliminated = Vec::new();
    for name in &participants {
        let before = i64::from(room.players[*name].temperature);
        let delta = &mut deltas[*name];
        if *delta > 0 && before + *delta >= max && take_item(&mut inventories, name, Item::Ice) {
            let cooled = i64::from(ICE_COOLING).min(before + *delta);
            *delta -= cooled;
            results[*name].cooled = u32::try_from(cooled).unwrap_or(ICE_COOLING);
        }
        if before + *delta >= max {
            eliminated.push((*name).to_owned());
        }
    }

    Resolution {
        deltas: deltas
            .into_iter()
            .filter(|(_, delta)| *delta != 0)
            .map(|(name, delta)| (name.to_owned(), delta))
            .collect(),
        results: results
            .into_iter()
            .map(|(name, result)| (name.to_owned(), result))
            .collect(),
        inventories: inventories
            .into_iter()
            .filter(|(name, items)| room.players[*name].inventory != *items)
            .map(|(name, items)| (name.to_owned(), items))
            .collect(),
        eliminated,
    }
}

fn take_item(inventories: &mut IndexMap<&str, Vec<Item>>, owner: &str, item: Item) -> bool {
    let Some(items) = inventories.get_mut(owner) else {
        return false;
    };
    match items.iter().position(|held| *held == item) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|existing| existing == name) {
        names.push(name.to_owned());
    }
}
