//! Combat session state: roster, turn order, rounds and pending attacks.

use crate::character::{DEAD, UNCONSCIOUS};
use crate::dice::{DiceExpression, DieRoller};
use crate::monsters::MonsterStats;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for combatants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatantId(pub Uuid);

impl CombatantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CombatantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Players sort ahead of enemies on initiative ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CombatantKind {
    Player,
    Enemy,
}

// ============================================================================
// Combatant
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: CombatantId,
    pub kind: CombatantKind,
    pub character_id: Option<String>,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub armor_class: i32,
    pub initiative_bonus: i32,
    /// Rolled total, set by initiative.
    pub initiative: Option<i32>,
    /// The raw d20 behind `initiative`.
    pub initiative_roll: Option<u32>,
    pub status: Vec<String>,
    pub reaction_available: bool,
    /// Temporary AC from Shield, cleared at the start of this combatant's turn.
    pub shield_bonus: i32,
    pub monster: Option<MonsterStats>,
}

/// What one application of damage did to a combatant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageReport {
    pub name: String,
    pub damage: i32,
    pub hp: i32,
    pub max_hp: i32,
    /// True if this damage dropped the combatant to 0.
    pub downed: bool,
}

impl Combatant {
    fn new(kind: CombatantKind, name: impl Into<String>, hp: i32, armor_class: i32) -> Self {
        let max_hp = hp.max(1);
        Self {
            id: CombatantId::new(),
            kind,
            character_id: None,
            name: name.into(),
            hp: hp.clamp(0, max_hp),
            max_hp,
            armor_class,
            initiative_bonus: 0,
            initiative: None,
            initiative_roll: None,
            status: Vec::new(),
            reaction_available: true,
            shield_bonus: 0,
            monster: None,
        }
    }

    pub fn player(name: impl Into<String>, hp: i32, armor_class: i32) -> Self {
        Self::new(CombatantKind::Player, name, hp, armor_class)
    }

    pub fn enemy(name: impl Into<String>, hp: i32, armor_class: i32) -> Self {
        Self::new(CombatantKind::Enemy, name, hp, armor_class)
    }

    pub fn with_character_id(mut self, id: impl Into<String>) -> Self {
        self.character_id = Some(id.into());
        self
    }

    pub fn with_initiative_bonus(mut self, bonus: i32) -> Self {
        self.initiative_bonus = bonus;
        self
    }

    pub fn with_max_hp(mut self, max_hp: i32) -> Self {
        self.max_hp = max_hp.max(1);
        self.hp = self.hp.clamp(0, self.max_hp);
        self
    }

    pub fn with_monster(mut self, stats: MonsterStats) -> Self {
        self.monster = Some(stats);
        self
    }

    /// AC including any active Shield.
    pub fn effective_ac(&self) -> i32 {
        self.armor_class.saturating_add(self.shield_bonus)
    }

    pub fn is_player(&self) -> bool {
        self.kind == CombatantKind::Player
    }

    pub fn has_status(&self, tag: &str) -> bool {
        let tag = tag.trim();
        self.status.iter().any(|s| s.eq_ignore_ascii_case(tag))
    }

    /// Add a status tag once. Returns false if it was already present.
    pub fn add_status(&mut self, tag: &str) -> bool {
        if self.has_status(tag) {
            return false;
        }
        self.status.push(tag.trim().to_lowercase());
        true
    }

    pub fn remove_status(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        let before = self.status.len();
        self.status.retain(|s| !s.eq_ignore_ascii_case(tag));
        self.status.len() != before
    }

    /// Down, unconscious or dead.
    pub fn is_incapacitated(&self) -> bool {
        self.hp <= 0 || self.has_status(UNCONSCIOUS) || self.has_status(DEAD)
    }

    /// Subtract hp, floored at 0. Reaching 0 adds `unconscious` once.
    pub fn take_damage(&mut self, amount: i32) -> DamageReport {
        let before = self.hp;
        self.hp = (self.hp - amount.max(0)).max(0);
        if self.hp == 0 {
            self.add_status(UNCONSCIOUS);
        }
        DamageReport {
            name: self.name.clone(),
            damage: before - self.hp,
            hp: self.hp,
            max_hp: self.max_hp,
            downed: before > 0 && self.hp == 0,
        }
    }
}

// ============================================================================
// Pending attacks
// ============================================================================

/// A d20 attack roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackRoll {
    pub d20: u32,
    pub bonus: i32,
    pub total: i32,
}

impl AttackRoll {
    pub fn new(d20: u32, bonus: i32) -> Self {
        Self {
            d20,
            bonus,
            total: (d20 as i32).saturating_add(bonus),
        }
    }

    pub fn roll(bonus: i32, roller: &mut dyn DieRoller) -> Self {
        Self::new(roller.roll_die(20), bonus)
    }

    pub fn is_crit(&self) -> bool {
        self.d20 == 20
    }

    pub fn is_fumble(&self) -> bool {
        self.d20 == 1
    }

    /// Natural 20 always hits, natural 1 always misses, otherwise the total
    /// must meet `armor_class`.
    pub fn hits(&self, armor_class: i32) -> bool {
        self.is_crit() || (!self.is_fumble() && self.total >= armor_class)
    }
}

/// A hit that has been rolled but whose damage is not yet applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAttack {
    pub id: Uuid,
    pub attacker: CombatantId,
    pub target: CombatantId,
    pub roll: AttackRoll,
    pub damage: DiceExpression,
    /// Uncanny Dodge was used against this hit.
    pub halved: bool,
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatPhase {
    /// Roster assembled, no initiative yet.
    Forming,
    /// Turn order fixed.
    Active,
}

impl fmt::Display for CombatPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombatPhase::Forming => write!(f, "forming"),
            CombatPhase::Active => write!(f, "active"),
        }
    }
}

/// Result of advancing the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnAdvance {
    /// The new current combatant, or `None` when nobody can act.
    pub combatant: Option<Combatant>,
    pub round: u32,
    pub new_round: bool,
}

/// One encounter, keyed by channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatSession {
    pub channel_id: String,
    pub combatants: Vec<Combatant>,
    pub phase: CombatPhase,
    pub turn_order: Vec<CombatantId>,
    pub current_turn: usize,
    pub round: u32,
    pub pending: Vec<PendingAttack>,
}

impl CombatSession {
    pub fn new(channel_id: impl Into<String>, combatants: Vec<Combatant>) -> Self {
        Self {
            channel_id: channel_id.into(),
            combatants,
            phase: CombatPhase::Forming,
            turn_order: Vec::new(),
            current_turn: 0,
            round: 0,
            pending: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == CombatPhase::Active
    }

    pub fn get(&self, id: CombatantId) -> Option<&Combatant> {
        self.combatants.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: CombatantId) -> Option<&mut Combatant> {
        self.combatants.iter_mut().find(|c| c.id == id)
    }

    /// Case-insensitive exact name match.
    pub fn find_by_name(&self, name: &str) -> Option<&Combatant> {
        let name = name.trim();
        self.combatants
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Match a character id first, then a name.
    pub fn find_actor(&self, key: &str) -> Option<&Combatant> {
        let key = key.trim();
        self.combatants
            .iter()
            .find(|c| c.character_id.as_deref() == Some(key))
            .or_else(|| self.find_by_name(key))
    }

    pub fn current(&self) -> Option<&Combatant> {
        self.turn_order
            .get(self.current_turn)
            .and_then(|id| self.get(*id))
    }

    pub fn pending(&self, id: Uuid) -> Option<&PendingAttack> {
        self.pending.iter().find(|p| p.id == id)
    }

    pub fn pending_mut(&mut self, id: Uuid) -> Option<&mut PendingAttack> {
        self.pending.iter_mut().find(|p| p.id == id)
    }

    pub fn take_pending(&mut self, id: Uuid) -> Option<PendingAttack> {
        let index = self.pending.iter().position(|p| p.id == id)?;
        Some(self.pending.remove(index))
    }

    /// Roll 1d20 + bonus for everyone and fix the turn order.
    ///
    /// Ties go to the higher initiative bonus, then players before enemies,
    /// then roster order.
    pub fn roll_initiative(&mut self, roller: &mut dyn DieRoller) {
        for combatant in &mut self.combatants {
            let d20 = roller.roll_die(20);
            combatant.initiative_roll = Some(d20);
            combatant.initiative = Some(d20 as i32 + combatant.initiative_bonus);
            combatant.reaction_available = true;
            combatant.shield_bonus = 0;
        }

        let mut order: Vec<&Combatant> = self.combatants.iter().collect();
        order.sort_by_key(|c| {
            (
                Reverse(c.initiative.unwrap_or(i32::MIN)),
                Reverse(c.initiative_bonus),
                c.kind,
            )
        });
        self.turn_order = order.into_iter().map(|c| c.id).collect();

        self.phase = CombatPhase::Active;
        self.current_turn = 0;
        self.round = 1;
        self.pending.clear();
    }

    /// Move to the next combatant who can act.
    ///
    /// Scans at most one lap. Passing the end of the order starts a new round
    /// and restores every reaction. When nobody is eligible the turn stays put.
    pub fn advance_turn(&mut self) -> TurnAdvance {
        self.pending.clear();
        let len = self.turn_order.len();

        let next = (1..=len).find_map(|step| {
            let index = (self.current_turn + step) % len;
            let id = self.turn_order[index];
            let eligible = self.get(id).is_some_and(|c| !c.is_incapacitated());
            eligible.then_some((index, self.current_turn + step >= len))
        });

        let Some((index, wrapped)) = next else {
            return TurnAdvance {
                combatant: None,
                round: self.round,
                new_round: false,
            };
        };

        if wrapped {
            self.round += 1;
            for combatant in &mut self.combatants {
                combatant.reaction_available = true;
            }
        }
        self.current_turn = index;

        let id = self.turn_order[index];
        let combatant = self.get_mut(id).map(|c| {
            c.shield_bonus = 0;
            if let Some(monster) = c.monster.as_mut() {
                monster.refresh_legendary_actions();
            }
            c.clone()
        });

        TurnAdvance {
            combatant,
            round: self.round,
            new_round: wrapped,
        }
    }
}
