//! Engine facade.
//!
//! Opens the character store and combat manager from one [`EngineConfig`]
//! with a single shared dice roller.

use crate::combat::CombatManager;
use crate::config::EngineConfig;
use crate::dice::{self, DieRoller, RngRoller, SharedRoller};
use crate::store::CharacterStore;
use std::sync::Arc;
use tracing::info;

/// Character store plus combat manager over one data directory.
pub struct Engine {
    config: EngineConfig,
    characters: Arc<CharacterStore>,
    combat: CombatManager,
}

impl Engine {
    /// Open with an RNG roller, seeded if the config asks for it.
    pub fn open(config: EngineConfig) -> Self {
        let roller = match config.dice_seed {
            Some(seed) => dice::shared(RngRoller::seeded(seed)),
            None => dice::shared(RngRoller::from_entropy()),
        };
        Self::with_shared_roller(config, roller)
    }

    /// Open with a specific roller, e.g. a scripted one in tests.
    pub fn with_roller(config: EngineConfig, roller: impl DieRoller + 'static) -> Self {
        Self::with_shared_roller(config, dice::shared(roller))
    }

    fn with_shared_roller(config: EngineConfig, roller: SharedRoller) -> Self {
        let characters = Arc::new(CharacterStore::new(
            config.characters_dir(),
            roller.clone(),
        ));
        let combat = CombatManager::new(&config, characters.clone(), roller);
        info!(data_dir = %config.data_dir.display(), "engine opened");
        Self {
            config,
            characters,
            combat,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn characters(&self) -> &CharacterStore {
        &self.characters
    }

    pub fn combat(&self) -> &CombatManager {
        &self.combat
    }
}
