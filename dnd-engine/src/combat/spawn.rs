//! Combatant factory.
//!
//! Turns the caller's player and enemy lists into fully initialised
//! combatants. Enemy specs may carry a `Name*N` suffix to spawn N copies.

use super::session::Combatant;
use crate::character::Character;
use crate::config::PlayerDefaults;
use crate::monsters;

/// A player joining combat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerEntry {
    pub character_id: String,
    pub name: String,
}

impl PlayerEntry {
    pub fn new(character_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            character_id: character_id.into(),
            name: name.into(),
        }
    }
}

/// An enemy group as requested by the caller.
///
/// `hp`, `armor_class` and `initiative_bonus` are only used when the name
/// does not match a compendium entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnemySpec {
    pub name: String,
    pub hp: i32,
    pub armor_class: i32,
    pub initiative_bonus: i32,
}

impl EnemySpec {
    pub fn new(name: impl Into<String>, hp: i32, armor_class: i32) -> Self {
        Self {
            name: name.into(),
            hp,
            armor_class,
            initiative_bonus: 0,
        }
    }

    /// A spec that relies on the compendium for its stats.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, 10, 10)
    }

    pub fn with_initiative_bonus(mut self, bonus: i32) -> Self {
        self.initiative_bonus = bonus;
        self
    }
}

/// Split `Name*N` into its base name and count.
///
/// A missing, zero or unparsable count means the whole text is a plain name.
/// Counts above `max` are capped.
pub fn parse_spawn_spec(spec: &str, max: u32) -> (&str, u32) {
    let spec = spec.trim();
    if let Some((base, count)) = spec.rsplit_once('*') {
        let base = base.trim();
        if let Ok(count) = count.trim().parse::<u32>() {
            if count > 0 && !base.is_empty() {
                return (base, count.min(max.max(1)));
            }
        }
    }
    (spec, 1)
}

/// Build every copy of one enemy spec.
///
/// A single copy keeps the base name; multiple copies are numbered
/// `Name 1`, `Name 2`, and so on. Names already used in `roster` are
/// skipped, so a single copy whose base name is taken gets the next free
/// number and a second `Goblin*2` continues at `Goblin 3`.
pub fn spawn_enemies(spec: &EnemySpec, max: u32, roster: &[Combatant]) -> Vec<Combatant> {
    let (base, count) = parse_spawn_spec(&spec.name, max);
    let template = monsters::lookup(base);

    let mut spawned: Vec<Combatant> = Vec::with_capacity(count as usize);
    let mut next = 1u32;
    for _ in 0..count {
        let name = if count == 1 && !name_taken(base, roster, &spawned) {
            base.to_string()
        } else {
            loop {
                let candidate = format!("{base} {next}");
                next += 1;
                if !name_taken(&candidate, roster, &spawned) {
                    break candidate;
                }
            }
        };
        let enemy = match template {
            Some(t) => Combatant::enemy(name, t.hp, t.armor_class)
                .with_initiative_bonus(t.initiative_bonus())
                .with_monster(t.stats.clone()),
            None => Combatant::enemy(name, spec.hp, spec.armor_class)
                .with_initiative_bonus(spec.initiative_bonus),
        };
        spawned.push(enemy);
    }
    spawned
}

fn name_taken(name: &str, roster: &[Combatant], spawned: &[Combatant]) -> bool {
    roster
        .iter()
        .chain(spawned)
        .any(|c| c.name.eq_ignore_ascii_case(name))
}

/// Snapshot a player's stats for the encounter.
pub fn player_combatant(
    entry: &PlayerEntry,
    character: Option<&Character>,
    defaults: PlayerDefaults,
) -> Combatant {
    let combatant = match character {
        Some(c) => Combatant::player(&entry.name, c.hp, c.armor_class)
            .with_max_hp(c.max_hp)
            .with_initiative_bonus(c.initiative_bonus()),
        None => Combatant::player(&entry.name, defaults.hp, defaults.armor_class)
            .with_initiative_bonus(defaults.initiative_bonus),
    };
    combatant.with_character_id(&entry.character_id)
}
