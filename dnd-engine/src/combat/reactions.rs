//! Reactions: one per combatant per round.
//!
//! Shield and Uncanny Dodge act on a pending attack between
//! [`CombatManager::resolve_to_hit`] and
//! [`CombatManager::apply_pending_damage`]. Shield and Counterspell spend a
//! spell slot from the reacting combatant's linked character; when no slot is
//! available the reaction is not used.

use super::manager::CombatManager;
use super::resolver::{self, AttackOutcome};
use super::session::{CombatSession, Combatant};
use super::CombatError;
use crate::dice::DiceExpression;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Result of attempting a reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionOutcome<T> {
    Resolved(T),
    /// The reaction was already used this round.
    Unavailable,
    /// No spell slot of a high enough level; the reaction was not used.
    NoSlot,
}

impl<T> ReactionOutcome<T> {
    pub fn resolved(self) -> Option<T> {
        match self {
            ReactionOutcome::Resolved(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldOutcome {
    pub shielder: String,
    /// `None` for combatants without a linked character.
    pub slot_level: Option<u8>,
    pub armor_class: i32,
    /// Whether the pending attack still hits against the raised AC.
    pub still_hits: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncannyDodgeOutcome {
    pub defender: String,
    pub pending_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterspellOutcome {
    pub caster: String,
    pub slot_level: u8,
    pub spell_level: u8,
    /// The slot was high enough to counter without a check.
    pub automatic: bool,
    pub countered: bool,
}

enum SlotCheck {
    Spent(u8),
    NotLinked,
    Missing,
}

/// Reaction handling bound to a [`CombatManager`].
pub struct Reactions<'a> {
    manager: &'a CombatManager,
}

impl<'a> Reactions<'a> {
    pub(super) fn new(manager: &'a CombatManager) -> Self {
        Self { manager }
    }

    /// Whether `combatant` (character id or name) still has its reaction.
    pub async fn is_available(
        &self,
        channel: &str,
        combatant: &str,
    ) -> Result<Option<bool>, CombatError> {
        let session = self.manager.session(channel).await?;
        Ok(session
            .as_ref()
            .and_then(|s| s.find_actor(combatant))
            .map(|c| c.reaction_available))
    }

    /// Use up a reaction. Returns false if it was already spent.
    pub async fn consume(&self, channel: &str, combatant: &str) -> Result<Option<bool>, CombatError> {
        self.manager
            .update(channel, |session, _| {
                let Some(id) = session.find_actor(combatant).map(|c| c.id) else {
                    return Ok(None);
                };
                Ok(session.get_mut(id).map(|c| {
                    let was_available = c.reaction_available;
                    c.reaction_available = false;
                    was_available
                }))
            })
            .await
    }

    /// Attack of opportunity. The caller decides that the trigger happened;
    /// this spends the reactor's reaction and resolves an atomic attack.
    pub async fn opportunity_attack(
        &self,
        channel: &str,
        reactor: &str,
        target: &str,
        bonus: i32,
        damage: &str,
    ) -> Result<Option<ReactionOutcome<AttackOutcome>>, CombatError> {
        let damage = DiceExpression::parse(damage)?;
        self.manager
            .update(channel, |session, roller| {
                if !session.is_active() {
                    return Ok(None);
                }
                let Some(attacker) = session.find_actor(reactor).cloned() else {
                    return Ok(None);
                };
                let Some(defender) = session.find_by_name(target).map(|c| c.id) else {
                    return Ok(None);
                };
                if !attacker.reaction_available {
                    return Ok(Some(ReactionOutcome::Unavailable));
                }
                if let Some(c) = session.get_mut(attacker.id) {
                    c.reaction_available = false;
                }
                info!(reactor = %attacker.name, target, "opportunity attack");
                Ok(resolver::attack(session, attacker.id, defender, bonus, damage, roller)
                    .map(ReactionOutcome::Resolved))
            })
            .await
    }

    /// Cast Shield against a pending hit.
    ///
    /// The target of the pending attack gains the configured AC bonus until
    /// the start of its next turn and the hit is re-checked. A natural 20
    /// still hits.
    pub async fn shield(
        &self,
        channel: &str,
        pending_id: Uuid,
    ) -> Result<Option<ReactionOutcome<ShieldOutcome>>, CombatError> {
        let manager = self.manager;
        let _guard = manager.locks.lock(channel).await;
        let Some(mut session) = manager.records.load(channel).await? else {
            return Ok(None);
        };
        if !session.is_active() {
            return Ok(None);
        }
        let Some(pending) = session.pending(pending_id).cloned() else {
            return Ok(None);
        };
        let Some(shielder) = session.get(pending.target).cloned() else {
            return Ok(None);
        };
        if !shielder.reaction_available {
            return Ok(Some(ReactionOutcome::Unavailable));
        }

        let slot_level = match self.spend_slot(&shielder, 1).await? {
            SlotCheck::Spent(level) => Some(level),
            SlotCheck::NotLinked => None,
            SlotCheck::Missing => return Ok(Some(ReactionOutcome::NoSlot)),
        };

        let bonus = manager.shield_bonus;
        let Some(armor_class) = session.get_mut(pending.target).map(|c| {
            c.reaction_available = false;
            c.shield_bonus = bonus;
            c.effective_ac()
        }) else {
            return Ok(None);
        };
        let still_hits = pending.roll.hits(armor_class);

        self.save_after_slot(channel, &session).await?;
        info!(shielder = %shielder.name, armor_class, still_hits, "shield");
        Ok(Some(ReactionOutcome::Resolved(ShieldOutcome {
            shielder: shielder.name,
            slot_level,
            armor_class,
            still_hits,
        })))
    }

    /// Halve the damage of a pending hit against the reacting combatant.
    pub async fn uncanny_dodge(
        &self,
        channel: &str,
        pending_id: Uuid,
    ) -> Result<Option<ReactionOutcome<UncannyDodgeOutcome>>, CombatError> {
        self.manager
            .update(channel, |session, _| {
                if !session.is_active() {
                    return Ok(None);
                }
                let Some(target) = session.pending(pending_id).map(|p| p.target) else {
                    return Ok(None);
                };
                let Some(defender) = session.get_mut(target) else {
                    return Ok(None);
                };
                if !defender.reaction_available {
                    return Ok(Some(ReactionOutcome::Unavailable));
                }
                defender.reaction_available = false;
                let name = defender.name.clone();
                if let Some(pending) = session.pending_mut(pending_id) {
                    pending.halved = true;
                }
                info!(defender = %name, "uncanny dodge");
                Ok(Some(ReactionOutcome::Resolved(UncannyDodgeOutcome {
                    defender: name,
                    pending_id,
                })))
            })
            .await
    }

    /// Counter a spell of `spell_level` using a slot of at least
    /// `slot_level`.
    ///
    /// A spent slot at or above the spell's level counters automatically;
    /// otherwise `check_succeeded` (the caller's ability check) decides.
    pub async fn counterspell(
        &self,
        channel: &str,
        caster: &str,
        slot_level: u8,
        spell_level: u8,
        check_succeeded: bool,
    ) -> Result<Option<ReactionOutcome<CounterspellOutcome>>, CombatError> {
        for level in [slot_level, spell_level] {
            if !(1..=9).contains(&level) {
                return Err(StoreError::InvalidSpellLevel(level).into());
            }
        }

        let manager = self.manager;
        let _guard = manager.locks.lock(channel).await;
        let Some(mut session) = manager.records.load(channel).await? else {
            return Ok(None);
        };
        if !session.is_active() {
            return Ok(None);
        }
        let Some(reactor) = session.find_actor(caster).cloned() else {
            return Ok(None);
        };
        if !reactor.reaction_available {
            return Ok(Some(ReactionOutcome::Unavailable));
        }

        let spent = match self.spend_slot(&reactor, slot_level).await? {
            SlotCheck::Spent(level) => level,
            SlotCheck::NotLinked => slot_level,
            SlotCheck::Missing => return Ok(Some(ReactionOutcome::NoSlot)),
        };
        if let Some(c) = session.get_mut(reactor.id) {
            c.reaction_available = false;
        }

        let automatic = spent >= spell_level;
        let countered = automatic || check_succeeded;
        self.save_after_slot(channel, &session).await?;
        info!(caster = %reactor.name, spent, spell_level, countered, "counterspell");
        Ok(Some(ReactionOutcome::Resolved(CounterspellOutcome {
            caster: reactor.name,
            slot_level: spent,
            spell_level,
            automatic,
            countered,
        })))
    }

    /// Spend a slot from the combatant's linked character, if it has one.
    ///
    /// Takes the character lock while the caller holds the session lock.
    async fn spend_slot(&self, combatant: &Combatant, min_level: u8) -> Result<SlotCheck, CombatError> {
        let Some(id) = combatant.character_id.as_deref() else {
            return Ok(SlotCheck::NotLinked);
        };
        match self.manager.characters.use_lowest_slot(id, min_level).await {
            Ok(Some(spend)) => Ok(SlotCheck::Spent(spend.level)),
            Ok(None) | Err(StoreError::NoSlotAvailable { .. }) => Ok(SlotCheck::Missing),
            Err(e) => Err(e.into()),
        }
    }

    /// Save a session after a character write already succeeded. The two
    /// writes are not atomic; a failure here leaves the slot spent.
    async fn save_after_slot(&self, channel: &str, session: &CombatSession) -> Result<(), CombatError> {
        if let Err(e) = self.manager.records.save(channel, session).await {
            warn!(channel, error = %e, "session write failed after a character change");
            return Err(e.into());
        }
        Ok(())
    }
}
