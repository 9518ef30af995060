//! Rules arbiter: attack and skill check resolution.
//!
//! The arbiter only decides whether something lands; it never touches the
//! world. Damage is rolled and applied by the caller, so "did it hit" and
//! "how much" can be tested separately.

use crate::dice::{self, Advantage, DiceSource, RollResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an attack roll compared against armor class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttackOutcome {
    Crit,
    Hit,
    Miss,
}

impl AttackOutcome {
    /// Crits and hits both land.
    pub fn lands(&self) -> bool {
        !matches!(self, AttackOutcome::Miss)
    }
}

impl fmt::Display for AttackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttackOutcome::Crit => "CRITICAL HIT!",
            AttackOutcome::Hit => "HIT!",
            AttackOutcome::Miss => "MISS.",
        })
    }
}

/// Result of an attack roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackResolution {
    pub attacker_id: String,
    pub outcome: AttackOutcome,
    pub target_armor_class: i32,
    pub roll: RollResult,
}

impl AttackResolution {
    /// Log-style summary, e.g. `HIT! (Rolled 14 + 5 = 19 vs AC 12)`.
    pub fn summary(&self) -> String {
        match self.outcome {
            AttackOutcome::Crit => format!("{} ({})", self.outcome, self.roll.description),
            _ => format!(
                "{} ({} vs AC {})",
                self.outcome, self.roll.description, self.target_armor_class
            ),
        }
    }
}

/// Pass or fail of a skill check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckOutcome {
    Success,
    Failure,
}

/// Result of a skill check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResolution {
    pub outcome: CheckOutcome,
    pub difficulty_class: i32,
    pub roll: RollResult,
}

impl CheckResolution {
    pub fn succeeded(&self) -> bool {
        self.outcome == CheckOutcome::Success
    }

    pub fn summary(&self) -> String {
        let label = match self.outcome {
            CheckOutcome::Success => "SUCCESS",
            CheckOutcome::Failure => "FAILURE",
        };
        format!(
            "{label}: {} vs DC {}",
            self.roll.description, self.difficulty_class
        )
    }
}

/// Resolve an attack roll against a target's armor class.
///
/// A natural 20 is a crit whatever the armor class; otherwise the total must
/// meet or beat it.
pub fn resolve_attack(
    attacker_id: &str,
    target_armor_class: i32,
    weapon_modifier: i32,
    dice: &mut dyn DiceSource,
) -> AttackResolution {
    let roll = dice::roll_check(weapon_modifier, Advantage::Normal, dice);

    let outcome = if roll.is_crit {
        AttackOutcome::Crit
    } else if roll.total >= target_armor_class {
        AttackOutcome::Hit
    } else {
        AttackOutcome::Miss
    };

    tracing::debug!(attacker_id, %outcome, total = roll.total, target_armor_class, "attack resolved");

    AttackResolution {
        attacker_id: attacker_id.to_string(),
        outcome,
        target_armor_class,
        roll,
    }
}

/// Resolve a skill check with a normal roll.
pub fn resolve_skill_check(
    modifier: i32,
    difficulty_class: i32,
    dice: &mut dyn DiceSource,
) -> CheckResolution {
    resolve_skill_check_with(modifier, difficulty_class, Advantage::Normal, dice)
}

/// Resolve a skill check with advantage or disadvantage.
pub fn resolve_skill_check_with(
    modifier: i32,
    difficulty_class: i32,
    advantage: Advantage,
    dice: &mut dyn DiceSource,
) -> CheckResolution {
    let roll = dice::roll_check(modifier, advantage, dice);
    let outcome = if roll.meets_dc(difficulty_class) {
        CheckOutcome::Success
    } else {
        CheckOutcome::Failure
    };

    CheckResolution {
        outcome,
        difficulty_class,
        roll,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDice;

    #[test]
    fn test_natural_20_crits_through_any_armor() {
        let mut dice = ScriptedDice::new().with_rolls([20, 3]);
        let resolution = resolve_attack("hero", 99, 0, &mut dice);
        assert_eq!(resolution.outcome, AttackOutcome::Crit);
        assert!(resolution.roll.is_crit);
        assert!(resolution.roll.total < 99);
    }

    #[test]
    fn test_hit_on_meeting_armor_class() {
        let mut dice = ScriptedDice::new().with_rolls([7, 1]);
        let resolution = resolve_attack("hero", 12, 5, &mut dice);
        assert_eq!(resolution.outcome, AttackOutcome::Hit);
        assert_eq!(resolution.summary(), "HIT! (Rolled 7 + 5 = 12 vs AC 12)");
    }

    #[test]
    fn test_miss_below_armor_class() {
        let mut dice = ScriptedDice::new().with_rolls([6, 20]);
        let resolution = resolve_attack("hero", 12, 5, &mut dice);
        assert_eq!(resolution.outcome, AttackOutcome::Miss);
        assert!(!resolution.outcome.lands());
    }

    #[test]
    fn test_natural_1_can_still_hit_low_armor() {
        let mut dice = ScriptedDice::new().with_rolls([1, 1]);
        let resolution = resolve_attack("hero", 5, 5, &mut dice);
        assert!(resolution.roll.is_fail);
        assert_eq!(resolution.outcome, AttackOutcome::Hit);
    }

    #[test]
    fn test_crit_holds_for_every_armor_class() {
        for armor_class in [1, 10, 25, 40, 99, i32::MAX] {
            let mut dice = ScriptedDice::new().with_rolls([20, 20]);
            assert_eq!(
                resolve_attack("hero", armor_class, -10, &mut dice).outcome,
                AttackOutcome::Crit
            );
        }
    }

    #[test]
    fn test_skill_check_against_dc() {
        let mut dice = ScriptedDice::new().with_rolls([12, 2, 11, 2]);
        let pass = resolve_skill_check(3, 15, &mut dice);
        assert!(pass.succeeded());
        assert_eq!(pass.summary(), "SUCCESS: Rolled 12 + 3 = 15 vs DC 15");

        let fail = resolve_skill_check(3, 15, &mut dice);
        assert_eq!(fail.outcome, CheckOutcome::Failure);
    }

    #[test]
    fn test_skill_check_with_advantage_takes_higher() {
        let mut dice = ScriptedDice::new().with_rolls([4, 17]);
        let check = resolve_skill_check_with(0, 15, Advantage::Advantage, &mut dice);
        assert!(check.succeeded());
        assert_eq!(check.roll.natural_roll, 17);
    }
}
