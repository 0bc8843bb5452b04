//! D&D dice rolling system.
//!
//! Supports `XdY`, `dY`, `XdY+Z` and a bare `Y` (one die with `Y` sides),
//! ability checks with advantage/disadvantage, and scanning narrative text
//! for bracketed inline rolls such as `[1d20+5]`.

use crate::character::{Ability, Character};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Upper bound on dice rolled by a single expression.
pub const MAX_DICE: u32 = 100;

/// Upper bound on die size.
pub const MAX_SIDES: u32 = 1000;

/// Upper bound on the absolute value of a flat modifier.
pub const MAX_MODIFIER: i32 = 10_000;

/// Error type for dice parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("Invalid dice count: {0}")]
    InvalidCount(u32),
    #[error("Modifier out of range: {0}")]
    InvalidModifier(i32),
    #[error("No dice specified")]
    NoDice,
}

/// Source of individual die results.
///
/// Everything that rolls goes through this trait so callers can swap in a
/// seeded or scripted roller.
pub trait DieRoller: Send {
    /// Roll one die, returning a value in `1..=sides`.
    fn roll_die(&mut self, sides: u32) -> u32;
}

/// A [`DieRoller`] backed by any `rand` RNG.
pub struct RngRoller<R>(pub R);

impl RngRoller<StdRng> {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> DieRoller for RngRoller<R> {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.0.gen_range(1..=sides.max(1))
    }
}

/// A roller shared between the character store and the combat manager.
pub type SharedRoller = Arc<Mutex<Box<dyn DieRoller>>>;

/// Wrap a roller for sharing.
pub fn shared(roller: impl DieRoller + 'static) -> SharedRoller {
    Arc::new(Mutex::new(Box::new(roller)))
}

/// Advantage state for checks.
///
/// Advantage and disadvantage are variants of one enum, so a caller cannot
/// request both at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Build from the two flags a command layer usually carries.
    /// Both set cancels out to a normal roll.
    pub fn from_flags(advantage: bool, disadvantage: bool) -> Self {
        match (advantage, disadvantage) {
            (true, false) => Advantage::Advantage,
            (false, true) => Advantage::Disadvantage,
            _ => Advantage::Normal,
        }
    }
}

/// A parsed dice expression (e.g. `2d6+3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

impl DiceExpression {
    pub fn new(count: u32, sides: u32, modifier: i32) -> Self {
        Self {
            count,
            sides,
            modifier,
        }
    }

    /// A single d20.
    pub fn d20() -> Self {
        Self::new(1, 20, 0)
    }

    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let cleaned: String = notation
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        if cleaned.is_empty() {
            return Err(DiceError::NoDice);
        }
        let invalid = || DiceError::InvalidNotation(notation.trim().to_string());

        let Some(d_pos) = cleaned.find('d') else {
            // Bare integer: one die with that many sides.
            let sides: u32 = cleaned.parse().map_err(|_| invalid())?;
            return Self::validated(1, sides, 0);
        };

        let count_str = &cleaned[..d_pos];
        let rest = &cleaned[d_pos + 1..];

        let count: u32 = if count_str.is_empty() {
            1
        } else {
            count_str.parse().map_err(|_| invalid())?
        };

        let (sides_str, modifier) = match rest.find(['+', '-']) {
            Some(sign_pos) => {
                let value: i32 = rest[sign_pos + 1..].parse().map_err(|_| invalid())?;
                let modifier = if rest.as_bytes()[sign_pos] == b'-' {
                    -value
                } else {
                    value
                };
                (&rest[..sign_pos], modifier)
            }
            None => (rest, 0),
        };

        let sides: u32 = sides_str.parse().map_err(|_| invalid())?;
        Self::validated(count, sides, modifier)
    }

    fn validated(count: u32, sides: u32, modifier: i32) -> Result<Self, DiceError> {
        if count == 0 || count > MAX_DICE {
            return Err(DiceError::InvalidCount(count));
        }
        if sides == 0 || sides > MAX_SIDES {
            return Err(DiceError::InvalidDieSize(sides));
        }
        if !(-MAX_MODIFIER..=MAX_MODIFIER).contains(&modifier) {
            return Err(DiceError::InvalidModifier(modifier));
        }
        Ok(Self::new(count, sides, modifier))
    }

    /// Roll with a fresh entropy-seeded roller.
    pub fn roll(&self) -> RollResult {
        self.roll_with(&mut RngRoller::from_entropy())
    }

    /// Roll with a specific roller (useful for testing).
    pub fn roll_with(&self, roller: &mut dyn DieRoller) -> RollResult {
        let rolls = self.roll_set(roller);
        RollResult::new(rolls, Vec::new(), self.modifier)
    }

    fn roll_set(&self, roller: &mut dyn DieRoller) -> Vec<u32> {
        (0..self.count).map(|_| roller.roll_die(self.sides)).collect()
    }

    /// Lowest possible total.
    pub fn min(&self) -> i32 {
        (self.count as i32).saturating_add(self.modifier)
    }

    /// Highest possible total.
    pub fn max(&self) -> i32 {
        ((self.count * self.sides) as i32).saturating_add(self.modifier)
    }
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modifier {
            0 => write!(f, "{}d{}", self.count, self.sides),
            m if m > 0 => write!(f, "{}d{}+{}", self.count, self.sides, m),
            m => write!(f, "{}d{}{}", self.count, self.sides, m),
        }
    }
}

/// Result of a roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    /// Die outcomes that count toward the total.
    pub rolls: Vec<u32>,
    /// Outcomes dropped by advantage or disadvantage.
    pub discarded: Vec<u32>,
    /// The modifier actually applied.
    pub modifier: i32,
    pub total: i32,
}

impl RollResult {
    fn new(rolls: Vec<u32>, discarded: Vec<u32>, modifier: i32) -> Self {
        let dice_total = rolls
            .iter()
            .fold(0i32, |sum, r| sum.saturating_add(*r as i32));
        Self {
            total: dice_total.saturating_add(modifier),
            rolls,
            discarded,
            modifier,
        }
    }

    /// Check if the roll meets or exceeds a DC.
    pub fn meets_dc(&self, dc: i32) -> bool {
        self.total >= dc
    }

    /// Format the individual dice results for display.
    pub fn dice_display(&self) -> String {
        let dice = self
            .rolls
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        match self.modifier {
            0 => format!("[{dice}]"),
            m if m > 0 => format!("[{dice}] + {m}"),
            m => format!("[{dice}] - {}", m.abs()),
        }
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.dice_display(), self.total)
    }
}

/// Roll an ability check or any expression with advantage state and an
/// optional actor.
///
/// With advantage or disadvantage two full sets of dice are rolled and the
/// higher or lower outcome is kept at each die position.
pub fn roll_check(
    expression: &DiceExpression,
    actor: Option<&Character>,
    ability: Option<Ability>,
    advantage: Advantage,
    proficient: bool,
    roller: &mut dyn DieRoller,
) -> RollResult {
    let mut modifier = expression.modifier;
    if let Some(actor) = actor {
        if let Some(ability) = ability {
            modifier = modifier.saturating_add(actor.ability_scores.modifier(ability));
        }
        if proficient {
            modifier = modifier.saturating_add(actor.proficiency_bonus);
        }
    }

    let first = expression.roll_set(roller);
    if advantage == Advantage::Normal {
        return RollResult::new(first, Vec::new(), modifier);
    }

    let second = expression.roll_set(roller);
    let mut kept = Vec::with_capacity(first.len());
    let mut discarded = Vec::with_capacity(first.len());
    for (a, b) in first.into_iter().zip(second) {
        let (keep, drop) = match advantage {
            Advantage::Advantage => (a.max(b), a.min(b)),
            _ => (a.min(b), a.max(b)),
        };
        kept.push(keep);
        discarded.push(drop);
    }
    RollResult::new(kept, discarded, modifier)
}

lazy_static! {
    static ref INLINE_ROLL: Regex =
        Regex::new(r"(?i)\[\s*(\d*\s*d\s*\d+(?:\s*[+-]\s*\d+)?)\s*\]").expect("valid regex");
}

/// Evaluate every bracketed dice notation found in `text`.
///
/// Keys are the notation as written inside the brackets. A notation that
/// appears twice is rolled twice and the later total replaces the earlier.
pub fn extract_inline_rolls(text: &str, roller: &mut dyn DieRoller) -> HashMap<String, i32> {
    let mut results = HashMap::new();
    for capture in INLINE_ROLL.captures_iter(text) {
        let notation = capture[1].trim().to_string();
        if let Ok(expr) = DiceExpression::parse(&notation) {
            results.insert(notation, expr.roll_with(roller).total);
        }
    }
    results
}

/// Convenience function to roll dice from a notation string.
pub fn roll(notation: &str) -> Result<RollResult, DiceError> {
    Ok(DiceExpression::parse(notation)?.roll())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{AbilityScores, CharacterClass};
    use crate::testing::ScriptedRoller;

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            DiceExpression::parse("2d6+3").unwrap(),
            DiceExpression::new(2, 6, 3)
        );
        assert_eq!(
            DiceExpression::parse("d8").unwrap(),
            DiceExpression::new(1, 8, 0)
        );
        assert_eq!(
            DiceExpression::parse("1D20 - 2").unwrap(),
            DiceExpression::new(1, 20, -2)
        );
        assert_eq!(
            DiceExpression::parse("20").unwrap(),
            DiceExpression::new(1, 20, 0)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            DiceExpression::parse("abc"),
            Err(DiceError::InvalidNotation(_))
        ));
        assert!(DiceExpression::parse("2d").is_err());
        assert!(DiceExpression::parse("2d6+").is_err());
        assert!(DiceExpression::parse("2d6+1d4").is_err());
        assert_eq!(DiceExpression::parse(""), Err(DiceError::NoDice));
        assert_eq!(DiceExpression::parse("0d6"), Err(DiceError::InvalidCount(0)));
        assert_eq!(DiceExpression::parse("1d0"), Err(DiceError::InvalidDieSize(0)));
    }

    #[test]
    fn test_parse_rejects_huge_modifier() {
        assert_eq!(
            DiceExpression::parse("1d20+2147483647"),
            Err(DiceError::InvalidModifier(i32::MAX))
        );
        assert_eq!(
            DiceExpression::parse("1d20-10001"),
            Err(DiceError::InvalidModifier(-10_001))
        );
        assert_eq!(
            DiceExpression::parse("1d20+10000").unwrap().modifier,
            MAX_MODIFIER
        );
    }

    #[test]
    fn test_unchecked_expression_total_saturates() {
        let expr = DiceExpression::new(1, 20, i32::MAX);
        let result = expr.roll_with(&mut ScriptedRoller::new([20]));
        assert_eq!(result.total, i32::MAX);
        assert_eq!(expr.max(), i32::MAX);
    }

    #[test]
    fn test_roll_range() {
        let expr = DiceExpression::parse("3d6-2").unwrap();
        let mut roller = RngRoller::seeded(7);
        for _ in 0..200 {
            let result = expr.roll_with(&mut roller);
            assert!(result.total >= expr.min() && result.total <= expr.max());
            assert_eq!(result.rolls.len(), 3);
            assert_eq!(result.modifier, -2);
        }
    }

    #[test]
    fn test_advantage_is_per_die_position() {
        let expr = DiceExpression::parse("2d6").unwrap();
        // First set: 1, 6. Second set: 5, 2.
        let mut roller = ScriptedRoller::new([1, 6, 5, 2]);
        let adv = roll_check(&expr, None, None, Advantage::Advantage, false, &mut roller);
        assert_eq!(adv.rolls, vec![5, 6]);
        assert_eq!(adv.discarded, vec![1, 2]);
        assert_eq!(adv.total, 11);

        let mut roller = ScriptedRoller::new([1, 6, 5, 2]);
        let dis = roll_check(&expr, None, None, Advantage::Disadvantage, false, &mut roller);
        assert_eq!(dis.rolls, vec![1, 2]);
        assert_eq!(dis.total, 3);
    }

    #[test]
    fn test_check_adds_ability_and_proficiency() {
        let actor = Character::new(
            "Thorin",
            "Thorin",
            CharacterClass::Fighter,
            "Dwarf",
            AbilityScores::new(16, 12, 14, 8, 10, 10),
        );
        let expr = DiceExpression::d20();
        let mut roller = ScriptedRoller::new([10]);
        let result = roll_check(
            &expr,
            Some(&actor),
            Some(Ability::Strength),
            Advantage::Normal,
            true,
            &mut roller,
        );
        assert_eq!(result.modifier, 3 + 2);
        assert_eq!(result.total, 15);
    }

    #[test]
    fn test_advantage_flags() {
        assert_eq!(Advantage::from_flags(true, false), Advantage::Advantage);
        assert_eq!(Advantage::from_flags(true, true), Advantage::Normal);
    }

    #[test]
    fn test_inline_rolls() {
        let mut roller = ScriptedRoller::new([4, 3, 6]);
        let text = "The goblin swings [1d6+2] and then again [1d6+2], the trap deals [d6].";
        let rolls = extract_inline_rolls(text, &mut roller);
        assert_eq!(rolls.len(), 2);
        // The second evaluation of "1d6+2" overwrote the first.
        assert_eq!(rolls["1d6+2"], 5);
        assert_eq!(rolls["d6"], 6);
    }

    #[test]
    fn test_inline_rolls_ignore_footnotes() {
        let mut roller = ScriptedRoller::new([]);
        assert!(extract_inline_rolls("see note [1], table [20] and [abc]", &mut roller).is_empty());
    }
}
