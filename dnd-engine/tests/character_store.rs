//! Integration tests for character resource tracking.

use dnd_engine::character::UNCONSCIOUS;
use dnd_engine::store::DeathSaveResult;
use dnd_engine::{
    AbilityScores, Character, CharacterClass, Engine, EngineConfig, ScriptedRoller, StoreError,
};
use tempfile::TempDir;

fn engine(dir: &TempDir, script: impl IntoIterator<Item = u32>) -> Engine {
    Engine::with_roller(EngineConfig::new(dir.path()), ScriptedRoller::new(script))
}

async fn register_fighter(engine: &Engine, id: &str) -> Character {
    engine
        .characters()
        .register(
            id,
            "Thorin",
            CharacterClass::Fighter,
            "Dwarf",
            AbilityScores::new(16, 12, 14, 8, 10, 10),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_temp_hp_then_hp_floors_at_zero() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, []);
    let store = engine.characters();
    let thorin = register_fighter(&engine, "p1").await;
    assert_eq!(thorin.max_hp, 12);

    store.damage("p1", 8).await.unwrap();
    store.add_temp_hp("p1", 3).await.unwrap();
    let c = store.damage("p1", 10).await.unwrap().unwrap();
    assert_eq!(c.temp_hp, 0);
    assert_eq!(c.hp, 0);

    let c = store.heal("p1", 100).await.unwrap().unwrap();
    assert_eq!(c.hp, c.max_hp);
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let engine = engine(&dir, []);
        register_fighter(&engine, "guild:42").await;
        engine.characters().damage("guild:42", 5).await.unwrap();
    }
    let engine = engine(&dir, []);
    let c = engine.characters().get("guild:42").await.unwrap().unwrap();
    assert_eq!(c.hp, 7);
    assert!(dir.path().join("characters").join("guild_3a42.json").exists());
}

#[tokio::test]
async fn test_reregistering_replaces_record() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, []);
    register_fighter(&engine, "p1").await;
    engine.characters().damage("p1", 5).await.unwrap();
    let fresh = engine
        .characters()
        .register(
            "p1",
            "Merla",
            CharacterClass::Wizard,
            "Elf",
            AbilityScores::new(8, 14, 12, 16, 12, 10),
        )
        .await
        .unwrap();
    let stored = engine.characters().get("p1").await.unwrap().unwrap();
    assert_eq!(stored, fresh);
    assert_eq!(stored.hp, stored.max_hp);
}

#[tokio::test]
async fn test_long_rest_restores_everything() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, []);
    let store = engine.characters();
    store
        .register(
            "w1",
            "Merla",
            CharacterClass::Wizard,
            "Elf",
            AbilityScores::new(8, 14, 12, 16, 12, 10),
        )
        .await
        .unwrap();
    store.use_spell_slot("w1", 1).await.unwrap();
    store.use_spell_slot("w1", 1).await.unwrap();
    store.damage("w1", 5).await.unwrap();

    let rest = store.long_rest("w1").await.unwrap().unwrap();
    let c = rest.character;
    assert_eq!(c.hp, c.max_hp);
    assert_eq!(c.spell_slots.get(1).unwrap().used, 0);
    assert!(rest.changes.iter().any(|s| s == "Spell slots recovered"));
}

#[tokio::test]
async fn test_long_rest_resets_class_resources() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, []);
    let store = engine.characters();
    register_fighter(&engine, "p1").await;
    store
        .use_class_resource("p1", "second_wind_used", 1)
        .await
        .unwrap();
    store
        .use_class_resource("p1", "action_surge_used", 1)
        .await
        .unwrap();

    let rest = store.long_rest("p1").await.unwrap().unwrap();
    assert_eq!(rest.character.resource("second_wind_used"), 0);
    assert_eq!(rest.character.resource("action_surge_used"), 0);
    assert!(rest.changes.iter().any(|s| s == "Action Surge restored"));
}

#[tokio::test]
async fn test_short_rest_spends_at_most_available_dice() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, [6, 6, 6]);
    let store = engine.characters();
    register_fighter(&engine, "p1").await;
    store.damage("p1", 10).await.unwrap();
    store
        .use_class_resource("p1", "second_wind_used", 1)
        .await
        .unwrap();
    store
        .use_class_resource("p1", "action_surge_used", 1)
        .await
        .unwrap();

    let rest = store.short_rest("p1", 3).await.unwrap().unwrap();
    assert_eq!(rest.dice_spent, 1);
    assert_eq!(rest.rolls, vec![6]);
    assert_eq!(rest.healed, 8);
    assert_eq!(rest.character.hp, 10);
    assert_eq!(rest.character.hit_dice_used, 1);
    assert_eq!(rest.character.resource("second_wind_used"), 0);
    assert_eq!(rest.character.resource("action_surge_used"), 1);

    let again = store.short_rest("p1", 2).await.unwrap().unwrap();
    assert_eq!(again.dice_spent, 0);
    assert_eq!(again.healed, 0);
}

#[tokio::test]
async fn test_warlock_pact_slots_return_on_short_rest() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, []);
    let store = engine.characters();
    store
        .register(
            "k1",
            "Hex",
            CharacterClass::Warlock,
            "Tiefling",
            AbilityScores::new(8, 14, 12, 10, 12, 16),
        )
        .await
        .unwrap();
    let c = store.use_pact_slot("k1").await.unwrap().unwrap();
    assert_eq!(c.pact_slots.slots.used, 1);
    assert!(matches!(
        store.use_pact_slot("k1").await,
        Err(StoreError::NoSlotAvailable { level: 1 })
    ));

    let rest = store.short_rest("k1", 0).await.unwrap().unwrap();
    assert_eq!(rest.character.pact_slots.slots.used, 0);
    assert!(rest.changes.iter().any(|s| s == "Pact slots restored"));
}

#[tokio::test]
async fn test_death_saves() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, []);
    let store = engine.characters();
    register_fighter(&engine, "p1").await;

    assert!(store.death_save("p1", true).await.unwrap().is_none());

    store.damage("p1", 50).await.unwrap();
    store.add_condition("p1", UNCONSCIOUS).await.unwrap();
    store.death_save("p1", false).await.unwrap();
    store.death_save("p1", true).await.unwrap();
    let second = store.death_save("p1", true).await.unwrap().unwrap();
    assert_eq!(
        second.result,
        DeathSaveResult::Recorded {
            successes: 2,
            failures: 1
        }
    );
    let third = store.death_save("p1", true).await.unwrap().unwrap();
    assert_eq!(third.result, DeathSaveResult::Stabilized);
    assert_eq!(third.character.hp, 1);
    assert!(third.character.death_saves.is_clear());
    assert!(!third.character.has_condition(UNCONSCIOUS));

    store.damage("p1", 50).await.unwrap();
    for _ in 0..2 {
        store.death_save("p1", false).await.unwrap();
    }
    let last = store.death_save("p1", false).await.unwrap().unwrap();
    assert_eq!(last.result, DeathSaveResult::Died);
    assert!(last.character.is_dead());
    assert!(store.death_save("p1", true).await.unwrap().is_none());
}

#[tokio::test]
async fn test_level_up_progression() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, [1]);
    let store = engine.characters();
    register_fighter(&engine, "p1").await;

    let up = store.level_up("p1", false).await.unwrap().unwrap();
    assert_eq!(up.hp_gained, 8);
    assert_eq!(up.character.level, 2);
    assert_eq!(up.character.max_hp, 20);
    assert_eq!(up.character.hit_dice_total, 2);
    assert_eq!(up.new_features, vec!["Action Surge".to_string()]);

    // A rolled 1 plus CON +2 still gains 3.
    let up = store.level_up("p1", true).await.unwrap().unwrap();
    assert_eq!(up.hp_gained, 3);
    assert!(up.new_features.contains(&"Martial Archetype".to_string()));

    for _ in 3..20 {
        store.level_up("p1", false).await.unwrap();
    }
    let c = store.get("p1").await.unwrap().unwrap();
    assert_eq!(c.level, 20);
    assert_eq!(c.proficiency_bonus, 6);
    assert!(matches!(
        store.level_up("p1", false).await,
        Err(StoreError::MaxLevel { max: 20, .. })
    ));
}

#[tokio::test]
async fn test_level_up_gains_at_least_one_hp() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, [1]);
    let store = engine.characters();
    store
        .register(
            "w1",
            "Frail",
            CharacterClass::Wizard,
            "Human",
            AbilityScores::new(8, 10, 3, 16, 10, 10),
        )
        .await
        .unwrap();
    let up = store.level_up("w1", true).await.unwrap().unwrap();
    assert_eq!(up.hp_gained, 1);
    assert_eq!(up.character.spell_slots.get(1).unwrap().total, 3);
}

#[tokio::test]
async fn test_set_class_rebuilds_resources() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, []);
    let store = engine.characters();
    register_fighter(&engine, "p1").await;
    let c = store
        .set_class("p1", CharacterClass::Wizard)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(c.spell_slots.get(1).unwrap().total, 2);
    assert!(c.resources.is_empty());
    assert!(c.features.contains(&"Arcane Recovery".to_string()));
    assert!(!c.features.contains(&"Second Wind".to_string()));
}

#[tokio::test]
async fn test_inventory_and_skills() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, []);
    let store = engine.characters();
    register_fighter(&engine, "p1").await;
    store.add_inventory_item("p1", "Rope").await.unwrap();
    store.add_inventory_item("p1", "Torch").await.unwrap();
    let c = store
        .remove_inventory_item("p1", "rope")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(c.inventory, vec!["Torch".to_string()]);

    let c = store
        .set_skill_proficiency("p1", "Athletics", true, true)
        .await
        .unwrap()
        .unwrap();
    assert!(c.skill_proficiencies.contains("athletics"));
    assert!(c.expertise.contains("athletics"));

    let c = store
        .set_skill_proficiency("p1", "athletics", false, true)
        .await
        .unwrap()
        .unwrap();
    assert!(c.skill_proficiencies.is_empty());
    assert!(c.expertise.is_empty());
}

#[tokio::test]
async fn test_concurrent_damage_is_serialized() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir, []);
    register_fighter(&engine, "p1").await;

    let hits = (0..10).map(|_| engine.characters().damage("p1", 1));
    let results = futures::future::join_all(hits).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let c = engine.characters().get("p1").await.unwrap().unwrap();
    assert_eq!(c.hp, 2);
}
