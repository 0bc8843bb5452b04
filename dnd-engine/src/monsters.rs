//! Monster compendium.
//!
//! Statblocks that enemy specs are matched against when combat starts. A
//! match replaces the caller's hp and AC with the template's and attaches
//! the full [`MonsterStats`] block to each spawned combatant.

use crate::character::{Ability, AbilityScores};
use serde::{Deserialize, Serialize};

/// An attack a monster can make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterAction {
    pub name: String,
    pub attack_bonus: i32,
    /// Damage notation, e.g. `1d6+2`.
    pub damage: String,
}

impl MonsterAction {
    pub fn new(name: impl Into<String>, attack_bonus: i32, damage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attack_bonus,
            damage: damage.into(),
        }
    }
}

/// The statblock carried by a template enemy during combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterStats {
    pub ability_scores: AbilityScores,
    pub actions: Vec<MonsterAction>,
    pub traits: Vec<String>,
    pub legendary_actions: Vec<String>,
    /// Legendary actions available each round.
    pub legendary_actions_per_round: u32,
    pub legendary_actions_remaining: u32,
    pub legendary_resistances_remaining: u32,
    pub reactions: Vec<String>,
}

impl MonsterStats {
    /// Find an action by case-insensitive name.
    pub fn action(&self, name: &str) -> Option<&MonsterAction> {
        let name = name.trim();
        self.actions
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn is_legendary(&self) -> bool {
        self.legendary_actions_per_round > 0
    }

    /// Refill the legendary action budget.
    pub fn refresh_legendary_actions(&mut self) {
        self.legendary_actions_remaining = self.legendary_actions_per_round;
    }
}

/// A compendium entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonsterTemplate {
    pub name: String,
    pub hp: i32,
    pub armor_class: i32,
    pub stats: MonsterStats,
}

impl MonsterTemplate {
    pub fn new(name: &str, hp: i32, armor_class: i32) -> Self {
        Self {
            name: name.to_string(),
            hp,
            armor_class,
            stats: MonsterStats {
                ability_scores: AbilityScores::default(),
                actions: Vec::new(),
                traits: Vec::new(),
                legendary_actions: Vec::new(),
                legendary_actions_per_round: 0,
                legendary_actions_remaining: 0,
                legendary_resistances_remaining: 0,
                reactions: Vec::new(),
            },
        }
    }

    pub fn with_scores(mut self, scores: AbilityScores) -> Self {
        self.stats.ability_scores = scores;
        self
    }

    pub fn with_action(mut self, name: &str, attack_bonus: i32, damage: &str) -> Self {
        self.stats
            .actions
            .push(MonsterAction::new(name, attack_bonus, damage));
        self
    }

    pub fn with_traits(mut self, traits: &[&str]) -> Self {
        self.stats.traits = traits.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_reactions(mut self, reactions: &[&str]) -> Self {
        self.stats.reactions = reactions.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_legendary(mut self, per_round: u32, resistances: u32, actions: &[&str]) -> Self {
        self.stats.legendary_actions = actions.iter().map(|a| a.to_string()).collect();
        self.stats.legendary_actions_per_round = per_round;
        self.stats.legendary_actions_remaining = per_round;
        self.stats.legendary_resistances_remaining = resistances;
        self
    }

    /// Initiative bonus derived from the template's DEX.
    pub fn initiative_bonus(&self) -> i32 {
        self.stats.ability_scores.modifier(Ability::Dexterity)
    }
}

/// Find a template by case-insensitive name.
pub fn lookup(name: &str) -> Option<&'static MonsterTemplate> {
    let name = name.trim();
    MONSTERS.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

lazy_static::lazy_static! {
    /// Built-in statblocks.
    pub static ref MONSTERS: Vec<MonsterTemplate> = vec![
        MonsterTemplate::new("Goblin", 7, 15)
            .with_scores(AbilityScores::new(8, 14, 10, 10, 8, 8))
            .with_action("Scimitar", 4, "1d6+2")
            .with_action("Shortbow", 4, "1d6+2")
            .with_traits(&["Nimble Escape"]),
        MonsterTemplate::new("Kobold", 5, 12)
            .with_scores(AbilityScores::new(7, 15, 9, 8, 7, 8))
            .with_action("Dagger", 4, "1d4+2")
            .with_action("Sling", 4, "1d4+2")
            .with_traits(&["Sunlight Sensitivity", "Pack Tactics"]),
        MonsterTemplate::new("Skeleton", 13, 13)
            .with_scores(AbilityScores::new(10, 14, 15, 6, 8, 5))
            .with_action("Shortsword", 4, "1d6+2")
            .with_action("Shortbow", 4, "1d6+2"),
        MonsterTemplate::new("Zombie", 22, 8)
            .with_scores(AbilityScores::new(13, 6, 16, 3, 6, 5))
            .with_action("Slam", 3, "1d6+1")
            .with_traits(&["Undead Fortitude"]),
        MonsterTemplate::new("Orc", 15, 13)
            .with_scores(AbilityScores::new(16, 12, 16, 7, 11, 10))
            .with_action("Greataxe", 5, "1d12+3")
            .with_action("Javelin", 5, "1d6+3")
            .with_traits(&["Aggressive"]),
        MonsterTemplate::new("Wolf", 11, 13)
            .with_scores(AbilityScores::new(12, 15, 12, 3, 12, 6))
            .with_action("Bite", 4, "2d4+2")
            .with_traits(&["Keen Hearing and Smell", "Pack Tactics"]),
        MonsterTemplate::new("Bandit", 11, 12)
            .with_scores(AbilityScores::new(11, 12, 12, 10, 10, 10))
            .with_action("Scimitar", 3, "1d6+1")
            .with_action("Light Crossbow", 3, "1d8+1"),
        MonsterTemplate::new("Bandit Captain", 65, 15)
            .with_scores(AbilityScores::new(15, 16, 14, 14, 11, 14))
            .with_action("Scimitar", 5, "1d6+3")
            .with_action("Dagger", 5, "1d4+3")
            .with_reactions(&["Parry"]),
        MonsterTemplate::new("Bugbear", 27, 16)
            .with_scores(AbilityScores::new(15, 14, 13, 8, 11, 9))
            .with_action("Morningstar", 4, "2d8+2")
            .with_action("Javelin", 4, "2d6+2")
            .with_traits(&["Brute", "Surprise Attack"]),
        MonsterTemplate::new("Ogre", 59, 11)
            .with_scores(AbilityScores::new(19, 8, 16, 5, 7, 7))
            .with_action("Greatclub", 6, "2d8+4")
            .with_action("Javelin", 6, "2d6+4"),
        MonsterTemplate::new("Owlbear", 59, 13)
            .with_scores(AbilityScores::new(20, 12, 17, 3, 12, 7))
            .with_action("Beak", 7, "1d10+5")
            .with_action("Claws", 7, "2d8+5")
            .with_traits(&["Keen Sight and Smell"]),
        MonsterTemplate::new("Adult Red Dragon", 256, 19)
            .with_scores(AbilityScores::new(27, 10, 25, 16, 13, 21))
            .with_action("Bite", 14, "2d10+8")
            .with_action("Claw", 14, "2d6+8")
            .with_action("Tail", 14, "2d8+8")
            .with_traits(&["Frightful Presence", "Fire Breath"])
            .with_legendary(3, 3, &["Detect", "Tail Attack", "Wing Attack"]),
    ];
}
