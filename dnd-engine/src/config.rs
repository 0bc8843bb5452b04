//! Engine configuration.

use std::path::PathBuf;
use tracing::warn;

/// Stats given to a player combatant with no registered character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerDefaults {
    pub hp: i32,
    pub armor_class: i32,
    pub initiative_bonus: i32,
}

impl Default for PlayerDefaults {
    fn default() -> Self {
        Self {
            hp: 10,
            armor_class: 10,
            initiative_bonus: 0,
        }
    }
}

/// Configuration for opening an [`crate::Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory for persisted records.
    pub data_dir: PathBuf,

    /// Fallback stats for unregistered players.
    pub player_defaults: PlayerDefaults,

    /// AC bonus granted by the Shield reaction.
    pub shield_bonus: i32,

    /// Largest `N` accepted in a `Name*N` enemy spec.
    pub max_spawn: u32,

    /// Seed for the shared dice roller. `None` seeds from entropy.
    pub dice_seed: Option<u64>,
}

impl EngineConfig {
    /// Create a config rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            player_defaults: PlayerDefaults::default(),
            shield_bonus: 5,
            max_spawn: 20,
            dice_seed: None,
        }
    }

    /// Read overrides from the environment.
    ///
    /// - `DND_ENGINE_DATA_DIR` (default `./data`)
    /// - `DND_ENGINE_SHIELD_BONUS`
    /// - `DND_ENGINE_MAX_SPAWN`
    /// - `DND_ENGINE_DICE_SEED`
    pub fn from_env() -> Self {
        let data_dir =
            std::env::var("DND_ENGINE_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
        let mut config = Self::new(data_dir);
        if let Some(bonus) = env_number("DND_ENGINE_SHIELD_BONUS") {
            config.shield_bonus = bonus;
        }
        if let Some(max) = env_number("DND_ENGINE_MAX_SPAWN") {
            config.max_spawn = max;
        }
        config.dice_seed = env_number("DND_ENGINE_DICE_SEED");
        config
    }

    /// Set the fallback stats for unregistered players.
    pub fn with_player_defaults(mut self, defaults: PlayerDefaults) -> Self {
        self.player_defaults = defaults;
        self
    }

    /// Set the Shield AC bonus.
    pub fn with_shield_bonus(mut self, bonus: i32) -> Self {
        self.shield_bonus = bonus;
        self
    }

    /// Set the largest accepted spawn count.
    pub fn with_max_spawn(mut self, max: u32) -> Self {
        self.max_spawn = max.max(1);
        self
    }

    /// Seed the dice roller for reproducible sessions.
    pub fn with_dice_seed(mut self, seed: u64) -> Self {
        self.dice_seed = Some(seed);
        self
    }

    pub fn characters_dir(&self) -> PathBuf {
        self.data_dir.join("characters")
    }

    pub fn combat_dir(&self) -> PathBuf {
        self.data_dir.join("combat")
    }
}

fn env_number<N: std::str::FromStr>(key: &str) -> Option<N> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
