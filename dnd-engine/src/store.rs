//! Character resource store.
//!
//! Owns the persisted [`Character`] records. Every operation runs
//! lock → load → mutate → save under the character's key lock and returns the
//! updated record, or `Ok(None)` when no character is registered under the id.

use crate::character::{
    score_modifier, Ability, AbilityScores, Character, CharacterClass, DEAD, EXHAUSTION,
};
use crate::class_data::{self, ResetRule, RestTiming, MAX_LEVEL};
use crate::dice::{DieRoller, SharedRoller};
use crate::persist::{KeyedLocks, PersistError, RecordStore};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Highest exhaustion level; reaching it is fatal.
pub const MAX_EXHAUSTION: u8 = 6;

/// Errors from character operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("{name} is already level {max}")]
    MaxLevel { name: String, max: u32 },

    #[error("Invalid spell level: {0}")]
    InvalidSpellLevel(u8),

    #[error("No spell slot of level {level} or higher is available")]
    NoSlotAvailable { level: u8 },

    #[error("Ability scores must be between 1 and 30, got {0}")]
    InvalidAbilityScore(u8),

    #[error("{class} has no resource named '{resource}'")]
    UnknownResource {
        class: CharacterClass,
        resource: String,
    },

    #[error("Not enough '{resource}' left: {available} available, {requested} requested")]
    ResourceExhausted {
        resource: String,
        available: i32,
        requested: i32,
    },

    #[error("'{0}' is not in the inventory")]
    ItemNotCarried(String),
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongRestOutcome {
    pub character: Character,
    /// Human-readable list of what was restored.
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortRestOutcome {
    pub character: Character,
    pub healed: i32,
    pub dice_spent: u32,
    /// Raw hit die results, one per die spent.
    pub rolls: Vec<u32>,
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathSaveResult {
    /// Third success: back to 1 hp.
    Stabilized,
    /// Third failure.
    Died,
    /// Counter incremented.
    Recorded { successes: u8, failures: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathSaveOutcome {
    pub character: Character,
    pub result: DeathSaveResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUpOutcome {
    pub character: Character,
    pub hp_gained: i32,
    pub new_features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpend {
    pub character: Character,
    /// Level of the slot actually spent.
    pub level: u8,
}

// ============================================================================
// Store
// ============================================================================

/// Persisted character records with per-id locking.
pub struct CharacterStore {
    records: RecordStore<Character>,
    locks: KeyedLocks,
    roller: SharedRoller,
}

impl CharacterStore {
    pub fn new(dir: impl Into<PathBuf>, roller: SharedRoller) -> Self {
        Self {
            records: RecordStore::new(dir),
            locks: KeyedLocks::new(),
            roller,
        }
    }

    /// Run one locked load-mutate-save cycle.
    ///
    /// `mutate` returning `Ok(None)` skips the save and yields `Ok(None)`;
    /// an error also leaves the stored record untouched.
    async fn update<R, F>(&self, id: &str, mutate: F) -> Result<Option<R>, StoreError>
    where
        F: FnOnce(&mut Character, &mut dyn DieRoller) -> Result<Option<R>, StoreError>,
    {
        let _guard = self.locks.lock(id).await;
        let Some(mut character) = self.records.load(id).await? else {
            debug!(id, "character not found");
            return Ok(None);
        };
        let outcome = {
            let mut roller = self.roller.lock();
            mutate(&mut character, &mut **roller)?
        };
        let Some(outcome) = outcome else {
            return Ok(None);
        };
        self.records.save(id, &character).await?;
        Ok(Some(outcome))
    }

    /// Apply an infallible change and return the updated record.
    async fn modify<F>(&self, id: &str, change: F) -> Result<Option<Character>, StoreError>
    where
        F: FnOnce(&mut Character),
    {
        self.update(id, |character, _| {
            change(character);
            Ok(Some(character.clone()))
        })
        .await
    }

    /// Create (or replace) a level 1 character.
    pub async fn register(
        &self,
        id: &str,
        name: &str,
        class: CharacterClass,
        race: &str,
        abilities: AbilityScores,
    ) -> Result<Character, StoreError> {
        if let Some(bad) = Ability::all()
            .into_iter()
            .map(|a| abilities.get(a))
            .find(|score| !(1..=30).contains(score))
        {
            return Err(StoreError::InvalidAbilityScore(bad));
        }
        let _guard = self.locks.lock(id).await;
        let character = Character::new(id, name, class, race, abilities);
        self.records.save(id, &character).await?;
        info!(id, name, class = %class, "registered character");
        Ok(character)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Character>, StoreError> {
        let _guard = self.locks.lock(id).await;
        Ok(self.records.load(id).await?)
    }

    // ========================================================================
    // Hit points
    // ========================================================================

    /// Damage temporary hp first, then hp, never below 0.
    pub async fn damage(&self, id: &str, amount: i32) -> Result<Option<Character>, StoreError> {
        self.modify(id, |c| {
            let lost = c.take_damage(amount);
            debug!(id = %c.id, amount, lost, hp = c.hp, "damage applied");
        })
        .await
    }

    /// Heal, capped at max hp.
    pub async fn heal(&self, id: &str, amount: i32) -> Result<Option<Character>, StoreError> {
        self.modify(id, |c| {
            c.heal(amount);
        })
        .await
    }

    /// Grant temporary hp. Temporary hp does not stack; the larger value wins.
    pub async fn add_temp_hp(
        &self,
        id: &str,
        amount: i32,
    ) -> Result<Option<Character>, StoreError> {
        self.modify(id, |c| c.temp_hp = c.temp_hp.max(amount)).await
    }

    // ========================================================================
    // Rests
    // ========================================================================

    pub async fn long_rest(&self, id: &str) -> Result<Option<LongRestOutcome>, StoreError> {
        self.update(id, |c, _| {
            let mut changes = Vec::new();

            c.set_hp(c.max_hp);
            changes.push(format!("HP restored to {}", c.max_hp));

            if c.spell_slots.slots.iter().any(|s| s.used > 0) {
                c.spell_slots.recover_all();
                changes.push("Spell slots recovered".to_string());
            }

            let recovered = (c.level / 2).max(1).min(c.hit_dice_used);
            if recovered > 0 {
                c.hit_dice_used -= recovered;
                changes.push(format!("Recovered {recovered} hit dice"));
            }

            if !c.death_saves.is_clear() {
                c.death_saves.reset();
                changes.push("Death saves cleared".to_string());
            }

            if c.exhaustion > 0 {
                c.exhaustion -= 1;
                if c.exhaustion == 0 {
                    c.remove_condition(EXHAUSTION);
                }
                changes.push(format!("Exhaustion reduced to {}", c.exhaustion));
            }

            for rule in class_data::resource_rules(c.class) {
                if rule.restored_by(RestTiming::Long) && c.reset_resource(rule) {
                    changes.push(format!("{} restored", rule.label));
                }
            }

            info!(id = %c.id, changes = changes.len(), "long rest");
            Ok(Some(LongRestOutcome {
                character: c.clone(),
                changes,
            }))
        })
        .await
    }

    /// Spend up to `dice` hit dice and reset short-rest resources.
    pub async fn short_rest(
        &self,
        id: &str,
        dice: u32,
    ) -> Result<Option<ShortRestOutcome>, StoreError> {
        self.update(id, |c, roller| {
            let spent = dice.min(c.level.saturating_sub(c.hit_dice_used));
            let sides = c.class.hit_die();
            let con = c.modifier(Ability::Constitution);

            let rolls: Vec<u32> = (0..spent).map(|_| roller.roll_die(sides)).collect();
            let total: i32 = rolls.iter().map(|r| (*r as i32 + con).max(0)).sum();
            c.hit_dice_used += spent;
            let healed = c.heal(total);

            let mut changes = Vec::new();
            if spent > 0 {
                changes.push(format!("Spent {spent} hit dice, healed {healed}"));
            }
            for rule in class_data::resource_rules(c.class) {
                if rule.timing == RestTiming::Short && c.reset_resource(rule) {
                    changes.push(format!("{} restored", rule.label));
                }
            }

            info!(id = %c.id, spent, healed, "short rest");
            Ok(Some(ShortRestOutcome {
                character: c.clone(),
                healed,
                dice_spent: spent,
                rolls,
                changes,
            }))
        })
        .await
    }

    /// Record a death saving throw.
    ///
    /// `Ok(None)` when the character is missing, above 0 hp, or already dead.
    pub async fn death_save(
        &self,
        id: &str,
        success: bool,
    ) -> Result<Option<DeathSaveOutcome>, StoreError> {
        self.update(id, |c, _| {
            if c.hp > 0 || c.is_dead() {
                return Ok(None);
            }
            let result = if success {
                if c.death_saves.add_success() {
                    c.set_hp(1);
                    DeathSaveResult::Stabilized
                } else {
                    DeathSaveResult::Recorded {
                        successes: c.death_saves.successes,
                        failures: c.death_saves.failures,
                    }
                }
            } else if c.death_saves.add_failure() {
                c.add_condition(DEAD);
                DeathSaveResult::Died
            } else {
                DeathSaveResult::Recorded {
                    successes: c.death_saves.successes,
                    failures: c.death_saves.failures,
                }
            };
            info!(id = %c.id, ?result, "death save");
            Ok(Some(DeathSaveOutcome {
                character: c.clone(),
                result,
            }))
        })
        .await
    }

    // ========================================================================
    // Progression
    // ========================================================================

    /// Gain a level. HP gain is a hit die roll when `roll_hp`, otherwise the
    /// fixed average, plus CON, at least 1.
    pub async fn level_up(
        &self,
        id: &str,
        roll_hp: bool,
    ) -> Result<Option<LevelUpOutcome>, StoreError> {
        self.update(id, |c, roller| {
            if c.level >= MAX_LEVEL {
                return Err(StoreError::MaxLevel {
                    name: c.name.clone(),
                    max: MAX_LEVEL,
                });
            }
            let sides = c.class.hit_die();
            let base = if roll_hp {
                roller.roll_die(sides) as i32
            } else {
                (sides / 2 + 1) as i32
            };
            let hp_gained = (base + c.modifier(Ability::Constitution)).max(1);

            c.level += 1;
            c.recompute_proficiency();
            c.hit_dice_total = c.level;
            c.max_hp += hp_gained;
            c.set_hp(c.hp + hp_gained);
            c.refresh_spell_slots();
            let new_features = c.unlock_features();

            info!(id = %c.id, level = c.level, hp_gained, "level up");
            Ok(Some(LevelUpOutcome {
                character: c.clone(),
                hp_gained,
                new_features,
            }))
        })
        .await
    }

    /// Set XP and move to the level its threshold table gives.
    ///
    /// Proficiency, slots, hit dice and features follow the new level; max
    /// hp is left for explicit level-ups.
    pub async fn set_xp(&self, id: &str, xp: u32) -> Result<Option<Character>, StoreError> {
        self.modify(id, |c| {
            c.experience = xp;
            let level = class_data::level_for_xp(xp);
            if level != c.level {
                debug!(id = %c.id, from = c.level, to = level, "level changed by xp");
                c.level = level;
                c.hit_dice_total = level;
                c.hit_dice_used = c.hit_dice_used.min(level);
                c.refresh_spell_slots();
                c.unlock_features();
            }
            c.recompute_proficiency();
        })
        .await
    }

    // ========================================================================
    // Field mutators
    // ========================================================================

    /// Change one ability score, shifting the stats derived from it.
    ///
    /// A CON change moves max hp and hp by the modifier delta times level;
    /// a DEX change moves AC by the modifier delta.
    pub async fn set_ability_score(
        &self,
        id: &str,
        ability: Ability,
        score: u8,
    ) -> Result<Option<Character>, StoreError> {
        if !(1..=30).contains(&score) {
            return Err(StoreError::InvalidAbilityScore(score));
        }
        self.modify(id, |c| {
            let delta = modifier_delta(c.ability_scores.get(ability), score);
            c.ability_scores.set(ability, score);
            match ability {
                Ability::Constitution if delta != 0 => {
                    let shift = delta * c.level as i32;
                    c.max_hp = (c.max_hp + shift).max(1);
                    c.set_hp(c.hp + shift);
                }
                Ability::Dexterity => c.armor_class += delta,
                _ => {}
            }
        })
        .await
    }

    /// Switch class. Slots, features and class resources are rebuilt for the
    /// new class at the current level.
    pub async fn set_class(
        &self,
        id: &str,
        class: CharacterClass,
    ) -> Result<Option<Character>, StoreError> {
        self.modify(id, |c| {
            c.class = class;
            c.features.clear();
            c.unlock_features();
            c.refresh_spell_slots();
            c.init_resources();
        })
        .await
    }

    pub async fn set_race(&self, id: &str, race: &str) -> Result<Option<Character>, StoreError> {
        self.modify(id, |c| c.race = race.trim().to_string()).await
    }

    pub async fn add_inventory_item(
        &self,
        id: &str,
        item: &str,
    ) -> Result<Option<Character>, StoreError> {
        self.modify(id, |c| c.inventory.push(item.trim().to_string()))
            .await
    }

    /// Remove the first item matching `item`, ignoring case.
    pub async fn remove_inventory_item(
        &self,
        id: &str,
        item: &str,
    ) -> Result<Option<Character>, StoreError> {
        self.update(id, |c, _| {
            let wanted = item.trim();
            let index = c
                .inventory
                .iter()
                .position(|i| i.eq_ignore_ascii_case(wanted))
                .ok_or_else(|| StoreError::ItemNotCarried(wanted.to_string()))?;
            c.inventory.remove(index);
            Ok(Some(c.clone()))
        })
        .await
    }

    pub async fn add_condition(
        &self,
        id: &str,
        condition: &str,
    ) -> Result<Option<Character>, StoreError> {
        self.modify(id, |c| {
            c.add_condition(condition);
        })
        .await
    }

    pub async fn remove_condition(
        &self,
        id: &str,
        condition: &str,
    ) -> Result<Option<Character>, StoreError> {
        self.modify(id, |c| {
            c.remove_condition(condition);
        })
        .await
    }

    /// Raise exhaustion, capped at 6. Level 6 is death.
    pub async fn add_exhaustion(
        &self,
        id: &str,
        levels: u8,
    ) -> Result<Option<Character>, StoreError> {
        self.modify(id, |c| {
            c.exhaustion = c.exhaustion.saturating_add(levels).min(MAX_EXHAUSTION);
            if c.exhaustion > 0 {
                c.add_condition(EXHAUSTION);
            }
            if c.exhaustion == MAX_EXHAUSTION {
                c.add_condition(DEAD);
            }
        })
        .await
    }

    pub async fn set_skill_proficiency(
        &self,
        id: &str,
        skill: &str,
        proficient: bool,
        expertise: bool,
    ) -> Result<Option<Character>, StoreError> {
        let skill = skill.trim().to_lowercase();
        self.modify(id, move |c| {
            if proficient {
                c.skill_proficiencies.insert(skill.clone());
            } else {
                c.skill_proficiencies.remove(&skill);
            }
            // Expertise only applies to proficient skills.
            if proficient && expertise {
                c.expertise.insert(skill);
            } else {
                c.expertise.remove(&skill);
            }
        })
        .await
    }

    // ========================================================================
    // Spell slots and class resources
    // ========================================================================

    /// Spend one slot of exactly `level`.
    pub async fn use_spell_slot(
        &self,
        id: &str,
        level: u8,
    ) -> Result<Option<Character>, StoreError> {
        check_spell_level(level)?;
        self.update(id, |c, _| {
            if !c.spell_slots.use_slot(level) {
                return Err(StoreError::NoSlotAvailable { level });
            }
            Ok(Some(c.clone()))
        })
        .await
    }

    /// Spend the lowest available slot at or above `min_level`, pact slots
    /// included.
    pub async fn use_lowest_slot(
        &self,
        id: &str,
        min_level: u8,
    ) -> Result<Option<SlotSpend>, StoreError> {
        check_spell_level(min_level)?;
        self.update(id, |c, _| {
            let level = c
                .spend_slot_at_least(min_level)
                .ok_or(StoreError::NoSlotAvailable { level: min_level })?;
            debug!(id = %c.id, level, "spell slot spent");
            Ok(Some(SlotSpend {
                character: c.clone(),
                level,
            }))
        })
        .await
    }

    pub async fn reset_spell_slot(
        &self,
        id: &str,
        level: u8,
    ) -> Result<Option<Character>, StoreError> {
        check_spell_level(level)?;
        self.modify(id, |c| {
            c.spell_slots.reset(level);
        })
        .await
    }

    pub async fn use_pact_slot(&self, id: &str) -> Result<Option<Character>, StoreError> {
        self.update(id, |c, _| {
            let pact = &mut c.pact_slots;
            if pact.slots.available() == 0 {
                return Err(StoreError::NoSlotAvailable {
                    level: pact.slot_level,
                });
            }
            pact.slots.used += 1;
            Ok(Some(c.clone()))
        })
        .await
    }

    /// Spend `amount` of a class resource.
    ///
    /// Use counters go up by `amount`; pools such as Lay on Hands go down and
    /// refuse to overdraw.
    pub async fn use_class_resource(
        &self,
        id: &str,
        resource: &str,
        amount: i32,
    ) -> Result<Option<Character>, StoreError> {
        self.update(id, |c, _| {
            let rule = class_data::resource_rule(c.class, resource).ok_or_else(|| {
                StoreError::UnknownResource {
                    class: c.class,
                    resource: resource.trim().to_string(),
                }
            })?;
            let amount = amount.max(0);
            match rule.reset {
                ResetRule::ClearUsed => {
                    *c.resources.entry(rule.resource.to_string()).or_insert(0) += amount;
                }
                ResetRule::PoolPerLevel(_) => {
                    let available = c.resource(rule.resource);
                    if available < amount {
                        return Err(StoreError::ResourceExhausted {
                            resource: rule.resource.to_string(),
                            available,
                            requested: amount,
                        });
                    }
                    c.resources
                        .insert(rule.resource.to_string(), available - amount);
                }
                ResetRule::PactSlots => {
                    let pact = &mut c.pact_slots.slots;
                    let available = pact.available() as i32;
                    if available < amount {
                        return Err(StoreError::ResourceExhausted {
                            resource: rule.resource.to_string(),
                            available,
                            requested: amount,
                        });
                    }
                    pact.used += amount as u8;
                }
            }
            Ok(Some(c.clone()))
        })
        .await
    }
}

fn check_spell_level(level: u8) -> Result<(), StoreError> {
    if (1..=9).contains(&level) {
        Ok(())
    } else {
        Err(StoreError::InvalidSpellLevel(level))
    }
}

/// Modifier change when a score moves from `old` to `new`.
fn modifier_delta(old: u8, new: u8) -> i32 {
    score_modifier(new) - score_modifier(old)
}
