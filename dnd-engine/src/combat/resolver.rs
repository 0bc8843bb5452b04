//! Attack, area damage and status resolution against a session.
//!
//! These functions are pure over a [`CombatSession`] and a roller; locking
//! and persistence live in the manager.

use super::session::{AttackRoll, CombatSession, CombatantId, DamageReport, PendingAttack};
use crate::dice::{DiceExpression, DieRoller, RollResult};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// First phase of an attack: the roll against the target's AC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToHitOutcome {
    pub attacker: String,
    pub target: String,
    pub roll: AttackRoll,
    pub target_ac: i32,
    pub hit: bool,
    /// Set when the attack hit; pass it to the damage phase.
    pub pending_id: Option<Uuid>,
}

/// A fully resolved attack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub attacker: String,
    pub target: String,
    pub roll: AttackRoll,
    /// AC the roll was finally compared against, Shield included.
    pub target_ac: i32,
    pub hit: bool,
    pub damage: i32,
    pub damage_roll: Option<RollResult>,
    /// Damage was halved by Uncanny Dodge.
    pub halved: bool,
    pub target_hp: i32,
    pub target_max_hp: i32,
    pub downed: bool,
}

impl AttackOutcome {
    pub fn crit(&self) -> bool {
        self.roll.is_crit()
    }

    pub fn fumble(&self) -> bool {
        self.roll.is_fumble()
    }
}

/// Area damage applied to a list of names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AoeOutcome {
    pub hits: Vec<DamageReport>,
    /// Names that matched no combatant.
    pub unknown: Vec<String>,
}

/// Roll to hit. A hit is parked in the session as a pending attack until
/// [`apply_pending`] rolls and applies its damage.
///
/// Returns `None` if either id is not in the roster.
pub fn resolve_to_hit(
    session: &mut CombatSession,
    attacker: CombatantId,
    target: CombatantId,
    bonus: i32,
    damage: DiceExpression,
    roller: &mut dyn DieRoller,
) -> Option<ToHitOutcome> {
    let attacker_name = session.get(attacker)?.name.clone();
    let defender = session.get(target)?;
    let target_name = defender.name.clone();
    let target_ac = defender.effective_ac();

    let roll = AttackRoll::roll(bonus, roller);
    let hit = roll.hits(target_ac);
    debug!(
        attacker = %attacker_name,
        target = %target_name,
        d20 = roll.d20,
        total = roll.total,
        target_ac,
        hit,
        "attack roll"
    );

    let pending_id = hit.then(|| {
        let id = Uuid::new_v4();
        session.pending.push(PendingAttack {
            id,
            attacker,
            target,
            roll,
            damage,
            halved: false,
        });
        id
    });

    Some(ToHitOutcome {
        attacker: attacker_name,
        target: target_name,
        roll,
        target_ac,
        hit,
        pending_id,
    })
}

/// Finish a pending attack.
///
/// The hit is re-checked against the target's current AC, so a Shield cast in
/// between can turn it into a miss. A critical hit doubles the rolled damage
/// total; Uncanny Dodge then halves it, rounding down.
pub fn apply_pending(
    session: &mut CombatSession,
    pending_id: Uuid,
    roller: &mut dyn DieRoller,
) -> Option<AttackOutcome> {
    let pending = session.take_pending(pending_id)?;
    let attacker = session
        .get(pending.attacker)
        .map(|c| c.name.clone())
        .unwrap_or_default();
    let target = session.get_mut(pending.target)?;
    let target_ac = target.effective_ac();
    let hit = pending.roll.hits(target_ac);

    let (damage, damage_roll, downed) = if hit {
        let rolled = pending.damage.roll_with(roller);
        let mut amount = rolled.total.max(0);
        if pending.roll.is_crit() {
            amount = amount.saturating_mul(2);
        }
        if pending.halved {
            amount /= 2;
        }
        let report = target.take_damage(amount);
        (report.damage, Some(rolled), report.downed)
    } else {
        (0, None, false)
    };

    Some(AttackOutcome {
        attacker,
        target: target.name.clone(),
        roll: pending.roll,
        target_ac,
        hit,
        damage,
        damage_roll,
        halved: pending.halved,
        target_hp: target.hp,
        target_max_hp: target.max_hp,
        downed,
    })
}

/// Roll to hit and apply damage in one step.
pub fn attack(
    session: &mut CombatSession,
    attacker: CombatantId,
    target: CombatantId,
    bonus: i32,
    damage: DiceExpression,
    roller: &mut dyn DieRoller,
) -> Option<AttackOutcome> {
    let to_hit = resolve_to_hit(session, attacker, target, bonus, damage, roller)?;
    if let Some(pending_id) = to_hit.pending_id {
        return apply_pending(session, pending_id, roller);
    }
    let defender = session.get(target)?;
    Some(AttackOutcome {
        attacker: to_hit.attacker,
        target: to_hit.target,
        roll: to_hit.roll,
        target_ac: to_hit.target_ac,
        hit: false,
        damage: 0,
        damage_roll: None,
        halved: false,
        target_hp: defender.hp,
        target_max_hp: defender.max_hp,
        downed: false,
    })
}

/// Apply `amount` to every named combatant without a to-hit roll.
pub fn apply_aoe(session: &mut CombatSession, names: &[String], amount: i32) -> AoeOutcome {
    let mut outcome = AoeOutcome::default();
    for name in names {
        let id = session.find_by_name(name).map(|c| c.id);
        match id.and_then(|id| session.get_mut(id)) {
            Some(target) => outcome.hits.push(target.take_damage(amount)),
            None => outcome.unknown.push(name.clone()),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::session::Combatant;
    use crate::testing::ScriptedRoller;

    fn duel() -> (CombatSession, CombatantId, CombatantId) {
        let hero = Combatant::player("Aria", 20, 14);
        let ogre = Combatant::enemy("Ogre", 59, 25);
        let (a, b) = (hero.id, ogre.id);
        (CombatSession::new("c", vec![hero, ogre]), a, b)
    }

    #[test]
    fn test_nat_20_hits_high_ac_and_doubles() {
        let (mut session, hero, ogre) = duel();
        let damage = DiceExpression::parse("1d8+2").unwrap();
        let mut roller = ScriptedRoller::new([20, 5]);
        let outcome = attack(&mut session, hero, ogre, 0, damage, &mut roller).unwrap();
        assert!(outcome.hit);
        assert!(outcome.crit());
        assert_eq!(outcome.damage, 14);
        assert_eq!(outcome.target_hp, 45);
        assert!(session.pending.is_empty());
    }

    #[test]
    fn test_nat_1_misses_low_ac() {
        let (mut session, hero, ogre) = duel();
        let damage = DiceExpression::parse("1d8").unwrap();
        let outcome =
            attack(&mut session, ogre, hero, 40, damage, &mut ScriptedRoller::new([1])).unwrap();
        assert!(!outcome.hit);
        assert!(outcome.fumble());
        assert_eq!(outcome.target_hp, 20);
    }

    #[test]
    fn test_pending_hit_respects_shield_and_halving() {
        let (mut session, hero, ogre) = duel();
        let damage = DiceExpression::parse("2d6").unwrap();
        let mut roller = ScriptedRoller::new([15, 6, 6]);
        let to_hit = resolve_to_hit(&mut session, ogre, hero, 0, damage, &mut roller).unwrap();
        assert!(to_hit.hit);
        let pending_id = to_hit.pending_id.unwrap();

        session.pending_mut(pending_id).unwrap().halved = true;
        let outcome = apply_pending(&mut session, pending_id, &mut roller).unwrap();
        assert_eq!(outcome.damage, 6);
        assert!(outcome.halved);

        let mut roller = ScriptedRoller::new([15]);
        let to_hit = resolve_to_hit(&mut session, ogre, hero, 0, damage, &mut roller).unwrap();
        session.get_mut(hero).unwrap().shield_bonus = 5;
        let outcome = apply_pending(&mut session, to_hit.pending_id.unwrap(), &mut roller).unwrap();
        assert!(!outcome.hit);
        assert_eq!(outcome.target_ac, 19);
        assert_eq!(outcome.target_hp, 14);
    }

    #[test]
    fn test_crit_with_huge_modifier_saturates() {
        let (mut session, hero, ogre) = duel();
        let damage = DiceExpression::new(1, 4, i32::MAX / 2 + 1);
        let mut roller = ScriptedRoller::new([20, 4]);
        let outcome = attack(&mut session, ogre, hero, i32::MAX, damage, &mut roller).unwrap();
        assert!(outcome.crit());
        assert_eq!(outcome.roll.total, i32::MAX);
        assert_eq!(outcome.damage, 20);
        assert_eq!(outcome.target_hp, 0);
    }

    #[test]
    fn test_aoe_reports_unknown_names() {
        let (mut session, _, _) = duel();
        let names = vec!["aria".to_string(), "Nobody".to_string()];
        let outcome = apply_aoe(&mut session, &names, 25);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].hp, 0);
        assert!(outcome.hits[0].downed);
        assert_eq!(outcome.unknown, vec!["Nobody".to_string()]);
    }
}
