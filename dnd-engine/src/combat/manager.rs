//! Persisted combat operations.
//!
//! Each operation locks the channel, loads the session, runs the resolver and
//! saves. Operations that also touch a character take the session lock first
//! and the character lock second; character operations never take a session
//! lock, so the two can not deadlock.

use super::reactions::Reactions;
use super::resolver::{self, AoeOutcome, AttackOutcome, ToHitOutcome};
use super::session::{CombatPhase, CombatSession, Combatant, CombatantId, TurnAdvance};
use super::spawn::{player_combatant, spawn_enemies, EnemySpec, PlayerEntry};
use super::CombatError;
use crate::config::{EngineConfig, PlayerDefaults};
use crate::dice::{DiceExpression, DieRoller, SharedRoller};
use crate::persist::{KeyedLocks, RecordStore};
use crate::store::CharacterStore;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Runs combat sessions, one per channel.
pub struct CombatManager {
    pub(super) records: RecordStore<CombatSession>,
    pub(super) locks: KeyedLocks,
    pub(super) characters: Arc<CharacterStore>,
    pub(super) roller: SharedRoller,
    pub(super) shield_bonus: i32,
    player_defaults: PlayerDefaults,
    max_spawn: u32,
}

impl CombatManager {
    pub fn new(config: &EngineConfig, characters: Arc<CharacterStore>, roller: SharedRoller) -> Self {
        Self {
            records: RecordStore::new(config.combat_dir()),
            locks: KeyedLocks::new(),
            characters,
            roller,
            shield_bonus: config.shield_bonus,
            player_defaults: config.player_defaults,
            max_spawn: config.max_spawn,
        }
    }

    /// Reaction handling for this manager's sessions.
    pub fn reactions(&self) -> Reactions<'_> {
        Reactions::new(self)
    }

    /// One locked load-mutate-save cycle on a channel's session.
    ///
    /// `Ok(None)` from `mutate` skips the save.
    pub(super) async fn update<R, F>(&self, channel: &str, mutate: F) -> Result<Option<R>, CombatError>
    where
        F: FnOnce(&mut CombatSession, &mut dyn DieRoller) -> Result<Option<R>, CombatError>,
    {
        let _guard = self.locks.lock(channel).await;
        let Some(mut session) = self.records.load(channel).await? else {
            debug!(channel, "no combat session");
            return Ok(None);
        };
        let outcome = {
            let mut roller = self.roller.lock();
            mutate(&mut session, &mut **roller)?
        };
        let Some(outcome) = outcome else {
            return Ok(None);
        };
        self.records.save(channel, &session).await?;
        Ok(Some(outcome))
    }

    /// Like [`Self::update`] but only for sessions past initiative.
    async fn update_active<R, F>(&self, channel: &str, mutate: F) -> Result<Option<R>, CombatError>
    where
        F: FnOnce(&mut CombatSession, &mut dyn DieRoller) -> Result<Option<R>, CombatError>,
    {
        self.update(channel, |session, roller| {
            if !session.is_active() {
                return Ok(None);
            }
            mutate(session, roller)
        })
        .await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open a session in the Forming phase.
    ///
    /// Player stats are snapshotted from the character store now; later
    /// character changes do not reach the encounter.
    pub async fn start(
        &self,
        channel: &str,
        players: &[PlayerEntry],
        enemies: &[EnemySpec],
    ) -> Result<CombatSession, CombatError> {
        if players.is_empty() && enemies.is_empty() {
            return Err(CombatError::EmptyRoster);
        }
        let _guard = self.locks.lock(channel).await;
        if self.records.load(channel).await?.is_some() {
            return Err(CombatError::SessionExists(channel.to_string()));
        }

        let snapshots =
            try_join_all(players.iter().map(|p| self.characters.get(&p.character_id))).await?;
        let mut combatants: Vec<Combatant> = players
            .iter()
            .zip(&snapshots)
            .map(|(entry, character)| {
                player_combatant(entry, character.as_ref(), self.player_defaults)
            })
            .collect();
        for spec in enemies {
            let spawned = spawn_enemies(spec, self.max_spawn, &combatants);
            combatants.extend(spawned);
        }

        let session = CombatSession::new(channel, combatants);
        self.records.save(channel, &session).await?;
        info!(
            channel,
            combatants = session.combatants.len(),
            "combat started"
        );
        Ok(session)
    }

    /// Roll initiative and move the session to Active.
    pub async fn roll_initiative(&self, channel: &str) -> Result<Option<CombatSession>, CombatError> {
        self.update(channel, |session, roller| {
            if session.phase != CombatPhase::Forming {
                return Err(CombatError::WrongPhase {
                    expected: CombatPhase::Forming,
                    found: session.phase,
                });
            }
            session.roll_initiative(roller);
            info!(channel = %session.channel_id, "initiative rolled");
            Ok(Some(session.clone()))
        })
        .await
    }

    pub async fn next_turn(&self, channel: &str) -> Result<Option<TurnAdvance>, CombatError> {
        self.update_active(channel, |session, _| {
            let turn = session.advance_turn();
            debug!(
                channel = %session.channel_id,
                round = turn.round,
                current = turn.combatant.as_ref().map(|c| c.name.as_str()),
                "turn advanced"
            );
            Ok(Some(turn))
        })
        .await
    }

    pub async fn session(&self, channel: &str) -> Result<Option<CombatSession>, CombatError> {
        let _guard = self.locks.lock(channel).await;
        Ok(self.records.load(channel).await?)
    }

    /// Delete the session. Returns false if there was none.
    pub async fn end(&self, channel: &str) -> Result<bool, CombatError> {
        let _guard = self.locks.lock(channel).await;
        let ended = self.records.delete(channel).await?;
        if ended {
            info!(channel, "combat ended");
        }
        Ok(ended)
    }

    // ========================================================================
    // Attacks
    // ========================================================================

    /// Roll to hit and apply damage atomically.
    ///
    /// `attacker` may be a character id or a name; `target` is a name.
    /// `Ok(None)` when there is no active session or either party is unknown.
    pub async fn attack(
        &self,
        channel: &str,
        attacker: &str,
        target: &str,
        bonus: i32,
        damage: &str,
    ) -> Result<Option<AttackOutcome>, CombatError> {
        let damage = DiceExpression::parse(damage)?;
        self.update_active(channel, |session, roller| {
            let Some((attacker, target)) = resolve_pair(session, attacker, target) else {
                return Ok(None);
            };
            Ok(resolver::attack(session, attacker, target, bonus, damage, roller))
        })
        .await
    }

    /// First phase of a two-step attack. A hit is stored as pending so that
    /// reactions can intervene before [`Self::apply_pending_damage`].
    pub async fn resolve_to_hit(
        &self,
        channel: &str,
        attacker: &str,
        target: &str,
        bonus: i32,
        damage: &str,
    ) -> Result<Option<ToHitOutcome>, CombatError> {
        let damage = DiceExpression::parse(damage)?;
        self.update_active(channel, |session, roller| {
            let Some((attacker, target)) = resolve_pair(session, attacker, target) else {
                return Ok(None);
            };
            Ok(resolver::resolve_to_hit(
                session, attacker, target, bonus, damage, roller,
            ))
        })
        .await
    }

    /// Second phase: roll and apply damage for a pending hit.
    ///
    /// `Ok(None)` if the pending attack is unknown or was discarded by a turn
    /// change.
    pub async fn apply_pending_damage(
        &self,
        channel: &str,
        pending_id: Uuid,
    ) -> Result<Option<AttackOutcome>, CombatError> {
        self.update_active(channel, |session, roller| {
            Ok(resolver::apply_pending(session, pending_id, roller))
        })
        .await
    }

    /// Attack with a named action from a template monster's statblock.
    pub async fn monster_attack(
        &self,
        channel: &str,
        monster: &str,
        action: &str,
        target: &str,
    ) -> Result<Option<AttackOutcome>, CombatError> {
        self.update_active(channel, |session, roller| {
            let Some(attacker) = session.find_by_name(monster) else {
                return Ok(None);
            };
            let Some(chosen) = attacker.monster.as_ref().and_then(|m| m.action(action)) else {
                debug!(monster, action, "unknown monster action");
                return Ok(None);
            };
            let bonus = chosen.attack_bonus;
            let damage = DiceExpression::parse(&chosen.damage)?;
            let attacker = attacker.id;
            let Some(target) = session.find_by_name(target).map(|c| c.id) else {
                return Ok(None);
            };
            Ok(resolver::attack(session, attacker, target, bonus, damage, roller))
        })
        .await
    }

    pub async fn apply_aoe_damage(
        &self,
        channel: &str,
        names: &[String],
        amount: i32,
    ) -> Result<Option<AoeOutcome>, CombatError> {
        self.update_active(channel, |session, _| {
            let outcome = resolver::apply_aoe(session, names, amount);
            debug!(
                channel = %session.channel_id,
                hit = outcome.hits.len(),
                unknown = outcome.unknown.len(),
                "area damage"
            );
            Ok(Some(outcome))
        })
        .await
    }

    // ========================================================================
    // Status and legendary resources
    // ========================================================================

    pub async fn apply_status(
        &self,
        channel: &str,
        target: &str,
        tag: &str,
    ) -> Result<Option<Combatant>, CombatError> {
        self.update(channel, |session, _| {
            Ok(with_named(session, target, |c| {
                c.add_status(tag);
                c.clone()
            }))
        })
        .await
    }

    pub async fn remove_status(
        &self,
        channel: &str,
        target: &str,
        tag: &str,
    ) -> Result<Option<Combatant>, CombatError> {
        self.update(channel, |session, _| {
            Ok(with_named(session, target, |c| {
                c.remove_status(tag);
                c.clone()
            }))
        })
        .await
    }

    /// Spend one legendary action. Returns how many remain this round.
    pub async fn use_legendary_action(
        &self,
        channel: &str,
        monster: &str,
    ) -> Result<Option<u32>, CombatError> {
        self.update(channel, |session, _| {
            let Some(Some(spent)) = with_named(session, monster, |c| {
                let stats = c.monster.as_mut()?;
                stats.legendary_actions_remaining =
                    stats.legendary_actions_remaining.checked_sub(1)?;
                Some(stats.legendary_actions_remaining)
            }) else {
                return match session.find_by_name(monster) {
                    Some(c) => Err(CombatError::NoLegendaryActions(c.name.clone())),
                    None => Ok(None),
                };
            };
            Ok(Some(spent))
        })
        .await
    }

    /// Spend one legendary resistance. Returns how many remain.
    pub async fn use_legendary_resistance(
        &self,
        channel: &str,
        monster: &str,
    ) -> Result<Option<u32>, CombatError> {
        self.update(channel, |session, _| {
            let Some(Some(left)) = with_named(session, monster, |c| {
                let stats = c.monster.as_mut()?;
                stats.legendary_resistances_remaining =
                    stats.legendary_resistances_remaining.checked_sub(1)?;
                Some(stats.legendary_resistances_remaining)
            }) else {
                return match session.find_by_name(monster) {
                    Some(c) => Err(CombatError::NoLegendaryResistance(c.name.clone())),
                    None => Ok(None),
                };
            };
            Ok(Some(left))
        })
        .await
    }
}

/// Attacker by character id or name, target by name.
fn resolve_pair(
    session: &CombatSession,
    attacker: &str,
    target: &str,
) -> Option<(CombatantId, CombatantId)> {
    let attacker = session.find_actor(attacker)?.id;
    let target = session.find_by_name(target)?.id;
    Some((attacker, target))
}

fn with_named<R>(
    session: &mut CombatSession,
    name: &str,
    f: impl FnOnce(&mut Combatant) -> R,
) -> Option<R> {
    let id = session.find_by_name(name)?.id;
    session.get_mut(id).map(f)
}
