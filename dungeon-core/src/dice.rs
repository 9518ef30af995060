//! Dice rolling for checks and damage.
//!
//! Randomness always comes through a [`DiceSource`], so tests can force
//! exact draws and a seeded RNG reproduces a whole session.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for dice expression parsing.
#[derive(Debug, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
}

/// A source of uniform random draws.
pub trait DiceSource {
    /// Uniform integer in `1..=sides`.
    fn roll(&mut self, sides: u32) -> u32;

    /// Uniform index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;

    /// `true` with the given probability.
    fn chance(&mut self, probability: f64) -> bool;
}

/// Adapts any `rand` RNG into a [`DiceSource`].
#[derive(Debug, Clone)]
pub struct RngDice<R>(pub R);

impl RngDice<StdRng> {
    /// Reproducible dice for a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }
}

impl<R: Rng> DiceSource for RngDice<R> {
    fn roll(&mut self, sides: u32) -> u32 {
        self.0.gen_range(1..=sides.max(1))
    }

    fn pick(&mut self, len: usize) -> usize {
        self.0.gen_range(0..len.max(1))
    }

    fn chance(&mut self, probability: f64) -> bool {
        self.0.gen::<f64>() < probability
    }
}

/// Advantage state for d20 checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

/// Outcome of a single d20 check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    pub total: i32,
    pub natural_roll: u32,
    pub modifier: i32,
    pub is_crit: bool,
    pub is_fail: bool,
    pub description: String,
}

impl RollResult {
    /// Build a result from an already chosen natural roll.
    pub fn from_natural(natural_roll: u32, modifier: i32) -> Self {
        let total = natural_roll as i32 + modifier;
        Self {
            total,
            natural_roll,
            modifier,
            is_crit: natural_roll == 20,
            is_fail: natural_roll == 1,
            description: format!("Rolled {natural_roll} + {modifier} = {total}"),
        }
    }

    /// Check if the roll meets or exceeds a DC.
    pub fn meets_dc(&self, dc: i32) -> bool {
        self.total >= dc
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Roll a d20 check.
///
/// Two d20s are drawn in every mode; `Normal` keeps the first. The fixed draw
/// count means a seeded source stays in step regardless of mode.
pub fn roll_check(modifier: i32, advantage: Advantage, dice: &mut dyn DiceSource) -> RollResult {
    let first = dice.roll(20);
    let second = dice.roll(20);

    let natural = match advantage {
        Advantage::Normal => first,
        Advantage::Advantage => first.max(second),
        Advantage::Disadvantage => first.min(second),
    };

    let result = RollResult::from_natural(natural, modifier);
    tracing::debug!(?advantage, first, second, total = result.total, "d20 check");
    result
}

/// Standard die sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// A parsed damage expression such as `2d4+2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceExpression {
    /// `(count, die)` pairs; a negative count subtracts that group.
    pub groups: Vec<(i32, DieType)>,
    pub modifier: i32,
    pub original: String,
}

impl DiceExpression {
    /// `count` dice of one size with no modifier.
    pub fn single(count: i32, die: DieType) -> Self {
        Self {
            groups: vec![(count, die)],
            modifier: 0,
            original: format!("{count}{die}"),
        }
    }

    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let original = notation.trim().to_lowercase();
        let compact: String = original.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut groups = Vec::new();
        let mut modifier = 0;
        let mut term = String::new();
        let mut sign = 1;

        for ch in compact.chars().chain(std::iter::once('+')) {
            if ch == '+' || ch == '-' {
                if term.is_empty() {
                    // Only a leading sign may appear without a term before it.
                    if !groups.is_empty() || modifier != 0 {
                        return Err(DiceError::InvalidNotation(original));
                    }
                } else {
                    Self::push_term(&term, sign, &original, &mut groups, &mut modifier)?;
                    term.clear();
                }
                sign = if ch == '-' { -1 } else { 1 };
            } else {
                term.push(ch);
            }
        }

        if groups.is_empty() && modifier == 0 {
            return Err(DiceError::NoDice);
        }

        Ok(Self {
            groups,
            modifier,
            original,
        })
    }

    fn push_term(
        term: &str,
        sign: i32,
        original: &str,
        groups: &mut Vec<(i32, DieType)>,
        modifier: &mut i32,
    ) -> Result<(), DiceError> {
        let invalid = || DiceError::InvalidNotation(original.to_string());

        match term.split_once('d') {
            Some((count, sides)) => {
                let count: i32 = if count.is_empty() {
                    1
                } else {
                    count.parse().map_err(|_| invalid())?
                };
                let sides: u32 = sides.parse().map_err(|_| invalid())?;
                let die = DieType::from_sides(sides).ok_or(DiceError::InvalidDieSize(sides))?;
                groups.push((sign * count, die));
            }
            None => {
                let value: i32 = term.parse().map_err(|_| invalid())?;
                *modifier += sign * value;
            }
        }
        Ok(())
    }

    /// Roll every group and add the flat modifier.
    pub fn roll(&self, dice: &mut dyn DiceSource) -> i32 {
        let rolled: i32 = self
            .groups
            .iter()
            .map(|&(count, die)| {
                let sum: i32 = (0..count.abs())
                    .map(|_| dice.roll(die.sides()) as i32)
                    .sum();
                count.signum() * sum
            })
            .sum();
        rolled + self.modifier
    }

    /// Largest possible total.
    pub fn max(&self) -> i32 {
        let rolled: i32 = self
            .groups
            .iter()
            .map(|&(count, die)| {
                // A subtracted group is largest when every die shows 1.
                if count > 0 {
                    count * die.sides() as i32
                } else {
                    count
                }
            })
            .sum();
        rolled + self.modifier
    }
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}
