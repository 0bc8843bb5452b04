//! Integration tests for reactions and the two-phase attack API.

use dnd_engine::combat::ReactionOutcome;
use dnd_engine::{
    AbilityScores, CharacterClass, EnemySpec, Engine, EngineConfig, PlayerEntry, ScriptedRoller,
};
use tempfile::TempDir;

const TABLE: &str = "table-1";

/// A level 1 wizard (AC 12, 7 hp, initiative +2) against a brute (AC 12).
///
/// Initiative consumes the first two values of `script`: Merla, then Brute.
async fn wizard_vs_brute(dir: &TempDir, script: impl IntoIterator<Item = u32>) -> Engine {
    let engine = Engine::with_roller(EngineConfig::new(dir.path()), ScriptedRoller::new(script));
    engine
        .characters()
        .register(
            "w1",
            "Merla",
            CharacterClass::Wizard,
            "Elf",
            AbilityScores::new(8, 14, 12, 16, 12, 10),
        )
        .await
        .unwrap();
    engine
        .combat()
        .start(
            TABLE,
            &[PlayerEntry::new("w1", "Merla")],
            &[EnemySpec::new("Brute", 30, 12)],
        )
        .await
        .unwrap();
    engine.combat().roll_initiative(TABLE).await.unwrap();
    engine
}

#[tokio::test]
async fn test_shield_turns_hit_into_miss() {
    let dir = TempDir::new().unwrap();
    let engine = wizard_vs_brute(&dir, [10, 5, 14]).await;
    let combat = engine.combat();

    let to_hit = combat
        .resolve_to_hit(TABLE, "Brute", "Merla", 0, "1d6")
        .await
        .unwrap()
        .unwrap();
    assert!(to_hit.hit);
    let pending_id = to_hit.pending_id.unwrap();

    let shield = combat
        .reactions()
        .shield(TABLE, pending_id)
        .await
        .unwrap()
        .unwrap()
        .resolved()
        .unwrap();
    assert_eq!(shield.slot_level, Some(1));
    assert_eq!(shield.armor_class, 17);
    assert!(!shield.still_hits);

    let outcome = combat
        .apply_pending_damage(TABLE, pending_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!outcome.hit);
    assert_eq!(outcome.target_hp, 7);

    let merla = engine.characters().get("w1").await.unwrap().unwrap();
    assert_eq!(merla.spell_slots.get(1).unwrap().used, 1);
    assert_eq!(
        combat.reactions().is_available(TABLE, "w1").await.unwrap(),
        Some(false)
    );
}

#[tokio::test]
async fn test_shield_cannot_stop_a_natural_20() {
    let dir = TempDir::new().unwrap();
    let engine = wizard_vs_brute(&dir, [10, 5, 20, 3]).await;
    let combat = engine.combat();

    let to_hit = combat
        .resolve_to_hit(TABLE, "Brute", "Merla", 0, "1d6")
        .await
        .unwrap()
        .unwrap();
    let pending_id = to_hit.pending_id.unwrap();
    let shield = combat
        .reactions()
        .shield(TABLE, pending_id)
        .await
        .unwrap()
        .unwrap()
        .resolved()
        .unwrap();
    assert!(shield.still_hits);

    let outcome = combat
        .apply_pending_damage(TABLE, pending_id)
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.hit && outcome.crit());
    assert_eq!(outcome.damage, 6);
    assert_eq!(outcome.target_hp, 1);
}

#[tokio::test]
async fn test_shield_without_slot_keeps_reaction() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::with_roller(
        EngineConfig::new(dir.path()),
        ScriptedRoller::new([10, 5, 14]),
    );
    let combat = engine.combat();
    combat
        .start(
            TABLE,
            &[PlayerEntry::new("nobody", "Pip")],
            &[EnemySpec::new("Brute", 30, 12)],
        )
        .await
        .unwrap();
    combat.roll_initiative(TABLE).await.unwrap();

    let to_hit = combat
        .resolve_to_hit(TABLE, "Brute", "Pip", 0, "1d6")
        .await
        .unwrap()
        .unwrap();
    let outcome = combat
        .reactions()
        .shield(TABLE, to_hit.pending_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ReactionOutcome::NoSlot);
    assert_eq!(
        combat.reactions().is_available(TABLE, "Pip").await.unwrap(),
        Some(true)
    );
}

#[tokio::test]
async fn test_shield_expires_on_shielders_turn() {
    let dir = TempDir::new().unwrap();
    let engine = wizard_vs_brute(&dir, [10, 5, 14]).await;
    let combat = engine.combat();

    let to_hit = combat
        .resolve_to_hit(TABLE, "Brute", "Merla", 0, "1d6")
        .await
        .unwrap()
        .unwrap();
    combat
        .reactions()
        .shield(TABLE, to_hit.pending_id.unwrap())
        .await
        .unwrap();

    // Merla acts first; advancing to the Brute keeps the shield up.
    combat.next_turn(TABLE).await.unwrap();
    let session = combat.session(TABLE).await.unwrap().unwrap();
    assert_eq!(session.find_by_name("Merla").unwrap().effective_ac(), 17);

    let turn = combat.next_turn(TABLE).await.unwrap().unwrap();
    assert!(turn.new_round);
    let merla = turn.combatant.unwrap();
    assert_eq!(merla.name, "Merla");
    assert_eq!(merla.effective_ac(), 12);
    assert!(merla.reaction_available);
}

#[tokio::test]
async fn test_uncanny_dodge_halves_after_crit() {
    let dir = TempDir::new().unwrap();
    // Crit, then 5 on the d6: doubled to 10, halved to 5. A second hit on 15.
    let engine = wizard_vs_brute(&dir, [10, 5, 20, 5, 15]).await;
    let combat = engine.combat();
    let to_hit = combat
        .resolve_to_hit(TABLE, "Merla", "Brute", 0, "1d6")
        .await
        .unwrap()
        .unwrap();
    let pending_id = to_hit.pending_id.unwrap();

    let dodge = combat
        .reactions()
        .uncanny_dodge(TABLE, pending_id)
        .await
        .unwrap()
        .unwrap()
        .resolved()
        .unwrap();
    assert_eq!(dodge.defender, "Brute");

    let outcome = combat
        .apply_pending_damage(TABLE, pending_id)
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.halved);
    assert_eq!(outcome.damage, 5);
    assert_eq!(outcome.target_hp, 25);

    let again = combat
        .resolve_to_hit(TABLE, "Merla", "Brute", 10, "1d6")
        .await
        .unwrap()
        .unwrap();
    let second = combat
        .reactions()
        .uncanny_dodge(TABLE, again.pending_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second, ReactionOutcome::Unavailable);
}

#[tokio::test]
async fn test_pending_attacks_are_discarded_by_next_turn() {
    let dir = TempDir::new().unwrap();
    let engine = wizard_vs_brute(&dir, [10, 5, 14]).await;
    let combat = engine.combat();
    let to_hit = combat
        .resolve_to_hit(TABLE, "Brute", "Merla", 0, "1d6")
        .await
        .unwrap()
        .unwrap();
    combat.next_turn(TABLE).await.unwrap();
    assert!(combat
        .apply_pending_damage(TABLE, to_hit.pending_id.unwrap())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_counterspell_with_low_slot_needs_check() {
    let dir = TempDir::new().unwrap();
    let engine = wizard_vs_brute(&dir, [10, 5]).await;
    let reactions = engine.combat().reactions();

    let failed = reactions
        .counterspell(TABLE, "w1", 1, 3, false)
        .await
        .unwrap()
        .unwrap()
        .resolved()
        .unwrap();
    assert_eq!(failed.slot_level, 1);
    assert!(!failed.automatic);
    assert!(!failed.countered);

    assert_eq!(
        reactions
            .counterspell(TABLE, "w1", 1, 3, true)
            .await
            .unwrap()
            .unwrap(),
        ReactionOutcome::Unavailable
    );
}

#[tokio::test]
async fn test_counterspell_with_high_slot_is_automatic() {
    let dir = TempDir::new().unwrap();
    let engine = wizard_vs_brute(&dir, [10, 5]).await;
    engine.characters().set_xp("w1", 6_500).await.unwrap();

    let outcome = engine
        .combat()
        .reactions()
        .counterspell(TABLE, "Merla", 3, 3, false)
        .await
        .unwrap()
        .unwrap()
        .resolved()
        .unwrap();
    assert!(outcome.automatic);
    assert!(outcome.countered);

    let merla = engine.characters().get("w1").await.unwrap().unwrap();
    assert_eq!(merla.spell_slots.get(3).unwrap().used, 1);
}

#[tokio::test]
async fn test_counterspell_without_slot_is_not_consumed() {
    let dir = TempDir::new().unwrap();
    let engine = wizard_vs_brute(&dir, [10, 5]).await;
    let reactions = engine.combat().reactions();
    assert_eq!(
        reactions
            .counterspell(TABLE, "w1", 3, 3, true)
            .await
            .unwrap()
            .unwrap(),
        ReactionOutcome::NoSlot
    );
    assert_eq!(reactions.is_available(TABLE, "w1").await.unwrap(), Some(true));
}

#[tokio::test]
async fn test_opportunity_attack_uses_reaction() {
    let dir = TempDir::new().unwrap();
    // To hit 15 + 2 against AC 12, then a 4 on the d4.
    let engine = wizard_vs_brute(&dir, [10, 5, 15, 4]).await;
    let reactions = engine.combat().reactions();

    let attack = reactions
        .opportunity_attack(TABLE, "Brute", "Merla", 2, "1d4")
        .await
        .unwrap()
        .unwrap()
        .resolved()
        .unwrap();
    assert!(attack.hit);
    assert_eq!(attack.target_hp, 3);

    assert_eq!(
        reactions
            .opportunity_attack(TABLE, "Brute", "Merla", 2, "1d4")
            .await
            .unwrap()
            .unwrap(),
        ReactionOutcome::Unavailable
    );
    assert_eq!(reactions.consume(TABLE, "Brute").await.unwrap(), Some(false));
    assert_eq!(reactions.consume(TABLE, "Merla").await.unwrap(), Some(true));
}
