//! Testing utilities.
//!
//! - `ScriptedRoller` for deterministic dice without touching an RNG
//! - Sample characters for scenario tests

use crate::character::{AbilityScores, Character, CharacterClass};
use crate::dice::DieRoller;
use std::collections::VecDeque;

/// A roller that replays scripted values in order.
///
/// Each value is clamped into `1..=sides` for the die being rolled. Once the
/// script runs out every roll returns `fallback` (1 unless changed).
#[derive(Debug, Clone, Default)]
pub struct ScriptedRoller {
    script: VecDeque<u32>,
    fallback: u32,
}

impl ScriptedRoller {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            script: values.into_iter().collect(),
            fallback: 1,
        }
    }

    /// Value returned after the script is exhausted.
    pub fn with_fallback(mut self, value: u32) -> Self {
        self.fallback = value;
        self
    }

    /// Append more values to the script.
    pub fn push(&mut self, values: impl IntoIterator<Item = u32>) {
        self.script.extend(values);
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl DieRoller for ScriptedRoller {
    fn roll_die(&mut self, sides: u32) -> u32 {
        let value = self.script.pop_front().unwrap_or(self.fallback);
        value.clamp(1, sides.max(1))
    }
}

/// A level 1 human fighter: STR 16, DEX 14, CON 14.
pub fn sample_fighter(id: &str, name: &str) -> Character {
    Character::new(
        id,
        name,
        CharacterClass::Fighter,
        "Human",
        AbilityScores::new(16, 14, 14, 10, 12, 8),
    )
}

/// A level 1 elf wizard: DEX 14, CON 12, INT 16.
pub fn sample_wizard(id: &str, name: &str) -> Character {
    Character::new(
        id,
        name,
        CharacterClass::Wizard,
        "Elf",
        AbilityScores::new(8, 14, 12, 16, 12, 10),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_roller_clamps_and_falls_back() {
        let mut roller = ScriptedRoller::new([25, 0, 3]).with_fallback(4);
        assert_eq!(roller.roll_die(20), 20);
        assert_eq!(roller.roll_die(20), 1);
        assert_eq!(roller.roll_die(6), 3);
        assert_eq!(roller.remaining(), 0);
        assert_eq!(roller.roll_die(6), 4);
    }

    #[test]
    fn test_sample_characters() {
        let fighter = sample_fighter("p1", "Thorin");
        assert_eq!(fighter.max_hp, 12);
        assert_eq!(fighter.armor_class, 12);
        let wizard = sample_wizard("p2", "Merla");
        assert_eq!(wizard.max_hp, 7);
    }
}
