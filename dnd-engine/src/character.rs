//! Character records and the resource types they carry.
//!
//! A [`Character`] is the persisted per-player record. All mutation from the
//! outside goes through [`crate::store::CharacterStore`]; the methods here keep
//! the record's own invariants (hp bounds, slot bounds, death saves only at
//! 0 hp) and are shared by the store operations.

use crate::class_data::{self, ResourceRule};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Condition tag applied when a creature drops to 0 hp.
pub const UNCONSCIOUS: &str = "unconscious";

/// Condition tag applied after three failed death saves.
pub const DEAD: &str = "dead";

/// Condition tag mirrored while exhaustion is above 0.
pub const EXHAUSTION: &str = "exhaustion";

// ============================================================================
// Ability Scores
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

impl FromStr for Ability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Ability::all()
            .into_iter()
            .find(|a| {
                a.abbreviation().eq_ignore_ascii_case(&lower)
                    || format!("{a:?}").to_lowercase() == lower
            })
            .ok_or_else(|| format!("unknown ability: {s}"))
    }
}

/// Ability scores container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, value: u8) {
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        score_modifier(self.get(ability))
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

/// 8-9 = -1, 10-11 = 0, 12-13 = +1, etc.
pub fn score_modifier(score: u8) -> i32 {
    (score as i32 - 10).div_euclid(2)
}

// ============================================================================
// Classes
// ============================================================================

/// D&D character classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
}

/// How a class gains spell slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasterKind {
    None,
    Full,
    Half,
    Pact,
}

impl CharacterClass {
    pub const ALL: [CharacterClass; 12] = [
        CharacterClass::Barbarian,
        CharacterClass::Bard,
        CharacterClass::Cleric,
        CharacterClass::Druid,
        CharacterClass::Fighter,
        CharacterClass::Monk,
        CharacterClass::Paladin,
        CharacterClass::Ranger,
        CharacterClass::Rogue,
        CharacterClass::Sorcerer,
        CharacterClass::Warlock,
        CharacterClass::Wizard,
    ];

    /// Sides of the class hit die.
    pub fn hit_die(&self) -> u32 {
        match self {
            CharacterClass::Barbarian => 12,
            CharacterClass::Fighter | CharacterClass::Paladin | CharacterClass::Ranger => 10,
            CharacterClass::Bard
            | CharacterClass::Cleric
            | CharacterClass::Druid
            | CharacterClass::Monk
            | CharacterClass::Rogue
            | CharacterClass::Warlock => 8,
            CharacterClass::Sorcerer | CharacterClass::Wizard => 6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CharacterClass::Barbarian => "Barbarian",
            CharacterClass::Bard => "Bard",
            CharacterClass::Cleric => "Cleric",
            CharacterClass::Druid => "Druid",
            CharacterClass::Fighter => "Fighter",
            CharacterClass::Monk => "Monk",
            CharacterClass::Paladin => "Paladin",
            CharacterClass::Ranger => "Ranger",
            CharacterClass::Rogue => "Rogue",
            CharacterClass::Sorcerer => "Sorcerer",
            CharacterClass::Warlock => "Warlock",
            CharacterClass::Wizard => "Wizard",
        }
    }

    pub fn caster_kind(&self) -> CasterKind {
        match self {
            CharacterClass::Bard
            | CharacterClass::Cleric
            | CharacterClass::Druid
            | CharacterClass::Sorcerer
            | CharacterClass::Wizard => CasterKind::Full,
            CharacterClass::Paladin | CharacterClass::Ranger => CasterKind::Half,
            CharacterClass::Warlock => CasterKind::Pact,
            _ => CasterKind::None,
        }
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CharacterClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        CharacterClass::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| format!("unknown class: {s}"))
    }
}

// ============================================================================
// Slots and Saves
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub total: u8,
    pub used: u8,
}

impl SlotInfo {
    pub fn available(&self) -> u8 {
        self.total.saturating_sub(self.used)
    }

    /// Change the total, keeping `used <= total`.
    pub fn set_total(&mut self, total: u8) {
        self.total = total;
        self.used = self.used.min(total);
    }
}

/// Spell slot tracking for levels 1-9.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellSlots {
    pub slots: [SlotInfo; 9],
}

impl SpellSlots {
    pub fn get(&self, level: u8) -> Option<&SlotInfo> {
        level
            .checked_sub(1)
            .and_then(|index| self.slots.get(index as usize))
    }

    fn get_mut(&mut self, level: u8) -> Option<&mut SlotInfo> {
        level
            .checked_sub(1)
            .and_then(|index| self.slots.get_mut(index as usize))
    }

    /// Spend one slot of exactly `level`. Returns false if none is left.
    pub fn use_slot(&mut self, level: u8) -> bool {
        match self.get_mut(level) {
            Some(slot) if slot.available() > 0 => {
                slot.used += 1;
                true
            }
            _ => false,
        }
    }

    /// Spend the lowest available slot at or above `min_level`.
    pub fn use_lowest(&mut self, min_level: u8) -> Option<u8> {
        let level = (min_level.max(1)..=9).find(|l| {
            self.get(*l)
                .map(|slot| slot.available() > 0)
                .unwrap_or(false)
        })?;
        self.use_slot(level);
        Some(level)
    }

    pub fn reset(&mut self, level: u8) -> bool {
        match self.get_mut(level) {
            Some(slot) => {
                slot.used = 0;
                true
            }
            None => false,
        }
    }

    pub fn recover_all(&mut self) {
        for slot in &mut self.slots {
            slot.used = 0;
        }
    }

    /// Replace the totals with a progression row, clamping used counts.
    pub fn apply_totals(&mut self, totals: &[u8]) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.set_total(totals.get(index).copied().unwrap_or(0));
        }
    }
}

/// Warlock pact magic slots: all of one level, recovered on a short rest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PactSlots {
    pub slots: SlotInfo,
    pub slot_level: u8,
}

/// Death saving throws.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathSaves {
    pub successes: u8,
    pub failures: u8,
}

impl DeathSaves {
    pub fn add_success(&mut self) -> bool {
        self.successes += 1;
        self.successes >= 3
    }

    pub fn add_failure(&mut self) -> bool {
        self.failures += 1;
        self.failures >= 3
    }

    pub fn reset(&mut self) {
        self.successes = 0;
        self.failures = 0;
    }

    pub fn is_clear(&self) -> bool {
        self.successes == 0 && self.failures == 0
    }
}

// ============================================================================
// Character
// ============================================================================

/// A persisted player character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    /// Stable external id (for example a chat-platform user id).
    pub id: String,
    pub name: String,
    pub class: CharacterClass,
    pub race: String,

    pub ability_scores: AbilityScores,
    pub proficiency_bonus: i32,
    pub skill_proficiencies: BTreeSet<String>,
    pub expertise: BTreeSet<String>,

    pub hp: i32,
    pub max_hp: i32,
    pub temp_hp: i32,
    pub armor_class: i32,

    pub hit_dice_total: u32,
    pub hit_dice_used: u32,

    pub spell_slots: SpellSlots,
    pub pact_slots: PactSlots,
    pub spells_known: Vec<String>,
    pub cantrips: Vec<String>,
    pub prepared_spells: Vec<String>,

    pub conditions: BTreeSet<String>,
    pub exhaustion: u8,
    pub death_saves: DeathSaves,

    pub inventory: Vec<String>,
    pub level: u32,
    pub experience: u32,
    pub features: Vec<String>,
    /// Class resource counters keyed by resource name.
    pub resources: BTreeMap<String, i32>,
}

impl Character {
    /// Build a fresh level 1 character.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        class: CharacterClass,
        race: impl Into<String>,
        ability_scores: AbilityScores,
    ) -> Self {
        let con = ability_scores.modifier(Ability::Constitution);
        let dex = ability_scores.modifier(Ability::Dexterity);
        let max_hp = (class.hit_die() as i32 + con).max(1);

        let mut character = Self {
            id: id.into(),
            name: name.into(),
            class,
            race: race.into(),
            ability_scores,
            proficiency_bonus: class_data::proficiency_bonus(1),
            skill_proficiencies: BTreeSet::new(),
            expertise: BTreeSet::new(),
            hp: max_hp,
            max_hp,
            temp_hp: 0,
            armor_class: 10 + dex,
            hit_dice_total: 1,
            hit_dice_used: 0,
            spell_slots: SpellSlots::default(),
            pact_slots: PactSlots::default(),
            spells_known: Vec::new(),
            cantrips: Vec::new(),
            prepared_spells: Vec::new(),
            conditions: BTreeSet::new(),
            exhaustion: 0,
            death_saves: DeathSaves::default(),
            inventory: Vec::new(),
            level: 1,
            experience: 0,
            features: Vec::new(),
            resources: BTreeMap::new(),
        };
        character.refresh_spell_slots();
        character.unlock_features();
        character.init_resources();
        character
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        self.ability_scores.modifier(ability)
    }

    pub fn initiative_bonus(&self) -> i32 {
        self.modifier(Ability::Dexterity)
    }

    pub fn is_dead(&self) -> bool {
        self.has_condition(DEAD)
    }

    pub fn hit_dice_remaining(&self) -> u32 {
        self.hit_dice_total.saturating_sub(self.hit_dice_used)
    }

    /// The single path for changing hp.
    ///
    /// Clamps to `0..=max_hp`; any positive result clears death saves and the
    /// unconscious tag.
    pub fn set_hp(&mut self, hp: i32) {
        self.hp = hp.clamp(0, self.max_hp);
        if self.hp > 0 {
            self.death_saves.reset();
            self.conditions.remove(UNCONSCIOUS);
        }
    }

    /// Apply damage to temporary hp first, then hp. Returns damage taken by hp.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        let amount = amount.max(0);
        let absorbed = amount.min(self.temp_hp);
        self.temp_hp -= absorbed;
        let remaining = amount - absorbed;
        let before = self.hp;
        self.set_hp(self.hp - remaining);
        before - self.hp
    }

    /// Heal up to max hp. Returns the hp actually gained.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let before = self.hp;
        self.set_hp(self.hp.saturating_add(amount.max(0)));
        self.hp - before
    }

    pub fn has_condition(&self, tag: &str) -> bool {
        self.conditions.contains(&tag.trim().to_lowercase())
    }

    /// Returns true if the tag was not already present.
    pub fn add_condition(&mut self, tag: &str) -> bool {
        self.conditions.insert(tag.trim().to_lowercase())
    }

    pub fn remove_condition(&mut self, tag: &str) -> bool {
        self.conditions.remove(&tag.trim().to_lowercase())
    }

    pub fn resource(&self, name: &str) -> i32 {
        self.resources.get(name).copied().unwrap_or(0)
    }

    /// Recompute slot totals for the current class and level.
    pub fn refresh_spell_slots(&mut self) {
        self.spell_slots
            .apply_totals(class_data::spell_slot_totals(self.class, self.level));
        let (count, slot_level) = class_data::pact_slots(self.class, self.level);
        self.pact_slots.slots.set_total(count);
        self.pact_slots.slot_level = slot_level;
    }

    /// Append any class features unlocked at or below the current level.
    /// Returns the newly added names.
    pub fn unlock_features(&mut self) -> Vec<String> {
        let mut added = Vec::new();
        for feature in class_data::features_through(self.class, self.level) {
            if !self.features.iter().any(|f| f == feature) {
                self.features.push(feature.to_string());
                added.push(feature.to_string());
            }
        }
        added
    }

    /// Start every class resource at its rested value, dropping counters
    /// that belong to another class.
    pub fn init_resources(&mut self) {
        let rules = class_data::resource_rules(self.class);
        self.resources
            .retain(|name, _| rules.iter().any(|rule| rule.resource == name.as_str()));
        for rule in rules {
            self.reset_resource(rule);
        }
    }

    /// Reset one resource according to its rule. Returns true if it changed.
    pub fn reset_resource(&mut self, rule: &ResourceRule) -> bool {
        rule.apply(self)
    }

    pub fn recompute_proficiency(&mut self) {
        self.proficiency_bonus = class_data::proficiency_bonus(self.level);
    }

    /// Spend the lowest slot at or above `min_level`, falling back to a pact
    /// slot when its level is high enough. Returns the level spent.
    pub fn spend_slot_at_least(&mut self, min_level: u8) -> Option<u8> {
        if let Some(level) = self.spell_slots.use_lowest(min_level) {
            return Some(level);
        }
        let pact = &mut self.pact_slots;
        if pact.slot_level >= min_level.max(1) && pact.slots.available() > 0 {
            pact.slots.used += 1;
            return Some(pact.slot_level);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wizard() -> Character {
        Character::new(
            "u1",
            "Elminster",
            CharacterClass::Wizard,
            "Human",
            AbilityScores::new(8, 14, 12, 16, 12, 10),
        )
    }

    #[test]
    fn test_new_character_derived_stats() {
        let c = wizard();
        assert_eq!(c.max_hp, 7);
        assert_eq!(c.hp, 7);
        assert_eq!(c.armor_class, 12);
        assert_eq!(c.proficiency_bonus, 2);
        assert_eq!(c.spell_slots.get(1).unwrap().total, 2);
        assert!(c.features.contains(&"Arcane Recovery".to_string()));
    }

    #[test]
    fn test_modifier_floors_negative_scores() {
        assert_eq!(score_modifier(9), -1);
        assert_eq!(score_modifier(8), -1);
        assert_eq!(score_modifier(7), -2);
        assert_eq!(score_modifier(1), -5);
        assert_eq!(score_modifier(20), 5);
    }

    #[test]
    fn test_temp_hp_absorbs_first() {
        let mut c = wizard();
        c.max_hp = 12;
        c.hp = 4;
        c.temp_hp = 3;
        c.take_damage(10);
        assert_eq!(c.temp_hp, 0);
        assert_eq!(c.hp, 0);
    }

    #[test]
    fn test_positive_hp_clears_death_saves() {
        let mut c = wizard();
        c.take_damage(100);
        c.add_condition(UNCONSCIOUS);
        c.death_saves.add_failure();
        c.death_saves.add_success();
        c.heal(1);
        assert!(c.death_saves.is_clear());
        assert!(!c.has_condition(UNCONSCIOUS));
    }

    #[test]
    fn test_use_lowest_slot_skips_empty_levels() {
        let mut slots = SpellSlots::default();
        slots.apply_totals(&[1, 2]);
        assert_eq!(slots.use_lowest(1), Some(1));
        assert_eq!(slots.use_lowest(1), Some(2));
        assert_eq!(slots.use_lowest(3), None);
        assert!(!slots.use_slot(10));
    }

    #[test]
    fn test_spend_slot_falls_back_to_pact() {
        let mut warlock = Character::new(
            "u2",
            "Hex",
            CharacterClass::Warlock,
            "Tiefling",
            AbilityScores::new(8, 14, 12, 10, 12, 16),
        );
        assert_eq!(warlock.spend_slot_at_least(1), Some(1));
        assert_eq!(warlock.pact_slots.slots.used, 1);
        assert_eq!(warlock.spend_slot_at_least(1), None);
        assert_eq!(wizard().spend_slot_at_least(3), None);
    }

    #[test]
    fn test_shrinking_totals_clamp_used() {
        let mut slot = SlotInfo { total: 4, used: 3 };
        slot.set_total(2);
        assert_eq!(slot.used, 2);
    }

    #[test]
    fn test_class_parse() {
        assert_eq!("warlock".parse::<CharacterClass>(), Ok(CharacterClass::Warlock));
        assert!("Artificer".parse::<CharacterClass>().is_err());
        assert_eq!("dex".parse::<Ability>(), Ok(Ability::Dexterity));
        assert_eq!("Wisdom".parse::<Ability>(), Ok(Ability::Wisdom));
    }
}
