//! D&D 5e character resource tracking and turn-based combat.
//!
//! This crate provides:
//! - Dice notation parsing, checks with advantage, and inline roll scanning
//! - Persisted characters with hit points, spell slots, rests and leveling
//! - Combat sessions with initiative, attacks, area damage and statuses
//! - Reactions (Shield, Uncanny Dodge, Counterspell, opportunity attacks)
//!   through a two-phase attack API
//!
//! # Quick Start
//!
//! ```ignore
//! use dnd_engine::{AbilityScores, CharacterClass, EnemySpec, Engine, EngineConfig, PlayerEntry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::open(EngineConfig::from_env());
//!     engine
//!         .characters()
//!         .register("u1", "Thorin", CharacterClass::Fighter, "Dwarf", AbilityScores::default())
//!         .await?;
//!
//!     let combat = engine.combat();
//!     combat
//!         .start("table-1", &[PlayerEntry::new("u1", "Thorin")], &[EnemySpec::named("Goblin*2")])
//!         .await?;
//!     combat.roll_initiative("table-1").await?;
//!     let outcome = combat.attack("table-1", "u1", "Goblin 1", 5, "1d8+3").await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod character;
pub mod class_data;
pub mod combat;
pub mod config;
pub mod dice;
pub mod engine;
pub mod monsters;
pub mod persist;
pub mod store;
pub mod testing;

// Primary public API
pub use character::{Ability, AbilityScores, Character, CharacterClass};
pub use combat::{CombatError, CombatManager, EnemySpec, PlayerEntry};
pub use config::{EngineConfig, PlayerDefaults};
pub use dice::{Advantage, DiceError, DiceExpression, DieRoller, RngRoller, RollResult};
pub use engine::Engine;
pub use persist::PersistError;
pub use store::{CharacterStore, StoreError};
pub use testing::ScriptedRoller;
