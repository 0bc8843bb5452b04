//! D&D 5e class and progression tables.
//!
//! Everything that varies by class or level lives here as data: proficiency
//! steps, XP thresholds, spell slot progressions, class features by level,
//! and which class resources reset on which rest. Adding a class resource is
//! a table edit, not a code change.

use crate::character::{CasterKind, Character, CharacterClass};

pub const MAX_LEVEL: u32 = 20;

/// Proficiency bonus for a character level.
pub fn proficiency_bonus(level: u32) -> i32 {
    match level {
        0..=4 => 2,
        5..=8 => 3,
        9..=12 => 4,
        13..=16 => 5,
        _ => 6,
    }
}

/// Minimum XP for each level, index 0 = level 1.
pub const XP_THRESHOLDS: [u32; 20] = [
    0, 300, 900, 2_700, 6_500, 14_000, 23_000, 34_000, 48_000, 64_000, 85_000, 100_000, 120_000,
    140_000, 165_000, 195_000, 225_000, 265_000, 305_000, 355_000,
];

/// Level reached with `xp` experience points.
pub fn level_for_xp(xp: u32) -> u32 {
    XP_THRESHOLDS.iter().filter(|threshold| xp >= **threshold).count() as u32
}

// ============================================================================
// Spell Slots
// ============================================================================

/// Full caster slots per spell level, index 0 = character level 1.
const FULL_CASTER_SLOTS: [[u8; 9]; 20] = [
    [2, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 0, 0, 0, 0, 0, 0, 0],
    [4, 2, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 2, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 1, 0, 0, 0, 0, 0],
    [4, 3, 3, 2, 0, 0, 0, 0, 0],
    [4, 3, 3, 3, 1, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 2, 1, 1],
];

const NO_SLOTS: [u8; 9] = [0; 9];

/// Spell slot totals (levels 1-9) for a class at a character level.
pub fn spell_slot_totals(class: CharacterClass, level: u32) -> &'static [u8] {
    let level = level.clamp(1, MAX_LEVEL);
    let row = match class.caster_kind() {
        CasterKind::Full => level,
        // Half casters follow the full table at half their level, rounded up,
        // starting at level 2.
        CasterKind::Half if level >= 2 => level.div_ceil(2),
        _ => return &NO_SLOTS,
    };
    &FULL_CASTER_SLOTS[row as usize - 1]
}

/// Pact magic `(slot count, slot level)` for a class at a character level.
pub fn pact_slots(class: CharacterClass, level: u32) -> (u8, u8) {
    if class.caster_kind() != CasterKind::Pact {
        return (0, 0);
    }
    let count = match level {
        0..=1 => 1,
        2..=10 => 2,
        11..=16 => 3,
        _ => 4,
    };
    let slot_level = match level {
        0..=2 => 1,
        3..=4 => 2,
        5..=6 => 3,
        7..=8 => 4,
        _ => 5,
    };
    (count, slot_level)
}

// ============================================================================
// Features
// ============================================================================

/// Class features as `(level gained, name)`.
pub fn class_features(class: CharacterClass) -> &'static [(u32, &'static str)] {
    match class {
        CharacterClass::Barbarian => &[
            (1, "Rage"),
            (1, "Unarmored Defense"),
            (2, "Reckless Attack"),
            (2, "Danger Sense"),
            (3, "Primal Path"),
            (5, "Extra Attack"),
            (5, "Fast Movement"),
            (7, "Feral Instinct"),
            (9, "Brutal Critical"),
            (11, "Relentless Rage"),
            (15, "Persistent Rage"),
            (18, "Indomitable Might"),
            (20, "Primal Champion"),
        ],
        CharacterClass::Bard => &[
            (1, "Spellcasting"),
            (1, "Bardic Inspiration"),
            (2, "Jack of All Trades"),
            (2, "Song of Rest"),
            (3, "Bard College"),
            (3, "Expertise"),
            (5, "Font of Inspiration"),
            (6, "Countercharm"),
            (10, "Magical Secrets"),
            (20, "Superior Inspiration"),
        ],
        CharacterClass::Cleric => &[
            (1, "Spellcasting"),
            (1, "Divine Domain"),
            (2, "Channel Divinity"),
            (5, "Destroy Undead"),
            (10, "Divine Intervention"),
        ],
        CharacterClass::Druid => &[
            (1, "Druidic"),
            (1, "Spellcasting"),
            (2, "Wild Shape"),
            (2, "Druid Circle"),
            (18, "Timeless Body"),
            (20, "Archdruid"),
        ],
        CharacterClass::Fighter => &[
            (1, "Fighting Style"),
            (1, "Second Wind"),
            (2, "Action Surge"),
            (3, "Martial Archetype"),
            (5, "Extra Attack"),
            (9, "Indomitable"),
            (11, "Extra Attack (2)"),
            (20, "Extra Attack (3)"),
        ],
        CharacterClass::Monk => &[
            (1, "Unarmored Defense"),
            (1, "Martial Arts"),
            (2, "Ki"),
            (2, "Unarmored Movement"),
            (3, "Monastic Tradition"),
            (3, "Deflect Missiles"),
            (4, "Slow Fall"),
            (5, "Extra Attack"),
            (5, "Stunning Strike"),
            (7, "Evasion"),
            (14, "Diamond Soul"),
        ],
        CharacterClass::Paladin => &[
            (1, "Divine Sense"),
            (1, "Lay on Hands"),
            (2, "Fighting Style"),
            (2, "Spellcasting"),
            (2, "Divine Smite"),
            (3, "Sacred Oath"),
            (3, "Channel Divinity"),
            (5, "Extra Attack"),
            (6, "Aura of Protection"),
            (10, "Aura of Courage"),
            (11, "Improved Divine Smite"),
        ],
        CharacterClass::Ranger => &[
            (1, "Favored Enemy"),
            (1, "Natural Explorer"),
            (2, "Fighting Style"),
            (2, "Spellcasting"),
            (3, "Ranger Archetype"),
            (5, "Extra Attack"),
            (8, "Land's Stride"),
            (14, "Vanish"),
        ],
        CharacterClass::Rogue => &[
            (1, "Expertise"),
            (1, "Sneak Attack"),
            (1, "Thieves' Cant"),
            (2, "Cunning Action"),
            (3, "Roguish Archetype"),
            (5, "Uncanny Dodge"),
            (7, "Evasion"),
            (11, "Reliable Talent"),
            (20, "Stroke of Luck"),
        ],
        CharacterClass::Sorcerer => &[
            (1, "Spellcasting"),
            (1, "Sorcerous Origin"),
            (2, "Font of Magic"),
            (3, "Metamagic"),
            (20, "Sorcerous Restoration"),
        ],
        CharacterClass::Warlock => &[
            (1, "Otherworldly Patron"),
            (1, "Pact Magic"),
            (2, "Eldritch Invocations"),
            (3, "Pact Boon"),
            (11, "Mystic Arcanum (6th level)"),
            (20, "Eldritch Master"),
        ],
        CharacterClass::Wizard => &[
            (1, "Spellcasting"),
            (1, "Arcane Recovery"),
            (2, "Arcane Tradition"),
            (18, "Spell Mastery"),
            (20, "Signature Spells"),
        ],
    }
}

/// Feature names unlocked at or below `level`, in table order.
pub fn features_through(
    class: CharacterClass,
    level: u32,
) -> impl Iterator<Item = &'static str> {
    class_features(class)
        .iter()
        .filter(move |(gained, _)| *gained <= level)
        .map(|(_, name)| *name)
}

// ============================================================================
// Rest Resources
// ============================================================================

/// Which rest restores a resource. A long rest restores both kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestTiming {
    Short,
    Long,
}

/// How a resource returns to its rested value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetRule {
    /// A used counter goes back to 0.
    ClearUsed,
    /// A pool refills to `level * n`.
    PoolPerLevel(i32),
    /// Pact magic slots are all recovered.
    PactSlots,
}

/// One row of the class resource table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRule {
    pub resource: &'static str,
    /// Label used in rest summaries.
    pub label: &'static str,
    pub timing: RestTiming,
    pub reset: ResetRule,
}

impl ResourceRule {
    const fn new(
        resource: &'static str,
        label: &'static str,
        timing: RestTiming,
        reset: ResetRule,
    ) -> Self {
        Self {
            resource,
            label,
            timing,
            reset,
        }
    }

    /// Whether a rest of `timing` restores this resource.
    pub fn restored_by(&self, timing: RestTiming) -> bool {
        timing == RestTiming::Long || self.timing == RestTiming::Short
    }

    /// Whether spending this resource draws down a pool rather than
    /// counting uses.
    pub fn is_pool(&self) -> bool {
        matches!(self.reset, ResetRule::PoolPerLevel(_))
    }

    /// Restore the resource on `character`. Returns true if anything changed.
    pub fn apply(&self, character: &mut Character) -> bool {
        let target = match self.reset {
            ResetRule::ClearUsed => 0,
            ResetRule::PoolPerLevel(per_level) => character.level as i32 * per_level,
            ResetRule::PactSlots => {
                let changed = character.pact_slots.slots.used != 0;
                character.pact_slots.slots.used = 0;
                return changed;
            }
        };
        let previous = character.resources.insert(self.resource.to_string(), target);
        previous != Some(target)
    }
}

const BARBARIAN: &[ResourceRule] = &[ResourceRule::new(
    "rages_used",
    "Rage uses",
    RestTiming::Long,
    ResetRule::ClearUsed,
)];

const BARD: &[ResourceRule] = &[ResourceRule::new(
    "bardic_inspiration_used",
    "Bardic Inspiration",
    RestTiming::Long,
    ResetRule::ClearUsed,
)];

const CLERIC: &[ResourceRule] = &[ResourceRule::new(
    "channel_divinity_used",
    "Channel Divinity",
    RestTiming::Short,
    ResetRule::ClearUsed,
)];

const DRUID: &[ResourceRule] = &[ResourceRule::new(
    "wild_shape_used",
    "Wild Shape uses",
    RestTiming::Long,
    ResetRule::ClearUsed,
)];

const FIGHTER: &[ResourceRule] = &[
    ResourceRule::new(
        "second_wind_used",
        "Second Wind",
        RestTiming::Short,
        ResetRule::ClearUsed,
    ),
    ResourceRule::new(
        "action_surge_used",
        "Action Surge",
        RestTiming::Long,
        ResetRule::ClearUsed,
    ),
];

const MONK: &[ResourceRule] = &[ResourceRule::new(
    "ki_used",
    "Ki points",
    RestTiming::Short,
    ResetRule::ClearUsed,
)];

const PALADIN: &[ResourceRule] = &[
    ResourceRule::new(
        "lay_on_hands_pool",
        "Lay on Hands pool",
        RestTiming::Long,
        ResetRule::PoolPerLevel(5),
    ),
    ResourceRule::new(
        "channel_divinity_used",
        "Channel Divinity",
        RestTiming::Short,
        ResetRule::ClearUsed,
    ),
];

const WARLOCK: &[ResourceRule] = &[ResourceRule::new(
    "pact_slots",
    "Pact slots",
    RestTiming::Short,
    ResetRule::PactSlots,
)];

/// Rest resources tracked for a class.
pub fn resource_rules(class: CharacterClass) -> &'static [ResourceRule] {
    match class {
        CharacterClass::Barbarian => BARBARIAN,
        CharacterClass::Bard => BARD,
        CharacterClass::Cleric => CLERIC,
        CharacterClass::Druid => DRUID,
        CharacterClass::Fighter => FIGHTER,
        CharacterClass::Monk => MONK,
        CharacterClass::Paladin => PALADIN,
        CharacterClass::Warlock => WARLOCK,
        CharacterClass::Ranger
        | CharacterClass::Rogue
        | CharacterClass::Sorcerer
        | CharacterClass::Wizard => &[],
    }
}

pub fn resource_rule(class: CharacterClass, resource: &str) -> Option<&'static ResourceRule> {
    resource_rules(class)
        .iter()
        .find(|rule| rule.resource.eq_ignore_ascii_case(resource.trim()))
}
