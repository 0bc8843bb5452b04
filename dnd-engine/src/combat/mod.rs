//! Combat: sessions, the combatant factory, attack resolution, the persisted
//! manager and reactions.
//!
//! A session moves Forming → Active → Ended. Ending deletes the record; there
//! is no way back from Active to Forming.

pub mod manager;
pub mod reactions;
pub mod resolver;
pub mod session;
pub mod spawn;

pub use manager::CombatManager;
pub use reactions::{
    CounterspellOutcome, ReactionOutcome, Reactions, ShieldOutcome, UncannyDodgeOutcome,
};
pub use resolver::{AoeOutcome, AttackOutcome, ToHitOutcome};
pub use session::{
    AttackRoll, CombatPhase, CombatSession, Combatant, CombatantId, CombatantKind, DamageReport,
    PendingAttack, TurnAdvance,
};
pub use spawn::{EnemySpec, PlayerEntry};

use crate::dice::DiceError;
use crate::persist::PersistError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors from combat operations.
#[derive(Debug, Error)]
pub enum CombatError {
    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("Character error: {0}")]
    Store(#[from] StoreError),

    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Combat is already running in channel '{0}'")]
    SessionExists(String),

    #[error("Combat is {found}, expected {expected}")]
    WrongPhase {
        expected: CombatPhase,
        found: CombatPhase,
    },

    #[error("Combat needs at least one combatant")]
    EmptyRoster,

    #[error("{0} has no legendary actions left")]
    NoLegendaryActions(String),

    #[error("{0} has no legendary resistances left")]
    NoLegendaryResistance(String),
}
