//! Dice rolling for seeding scores.
//!
//! Supports standard notation: `XdY+Z`, several dice groups (`2d6+1d4+3`),
//! and keep highest/lowest (`4d6kh3`, `2d20kl1`). Rolling is kept outside
//! the chain engine; a roll is turned into a static link and the chain
//! never sees the dice.

use crate::link::{Link, Value};
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for dice parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
    #[error("Cannot keep {keep} dice when only rolling {count} (in {notation})")]
    InvalidKeepCount {
        keep: u32,
        count: u32,
        notation: String,
    },
}

/// Which dice of a group count toward the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    All,
    Highest(u32),
    Lowest(u32),
}

/// One `XdY` group of an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceGroup {
    pub count: u32,
    pub sides: u32,
    pub keep: Keep,
}

impl DiceGroup {
    fn roll_with_rng<R: Rng>(&self, rng: &mut R) -> i64 {
        let mut rolls: Vec<u32> = (0..self.count)
            .map(|_| rng.gen_range(1..=self.sides))
            .collect();

        let kept = match self.keep {
            Keep::All => rolls.len(),
            Keep::Highest(keep) => {
                rolls.sort_by(|a, b| b.cmp(a));
                keep as usize
            }
            Keep::Lowest(keep) => {
                rolls.sort();
                keep as usize
            }
        };

        rolls.iter().take(kept).map(|&r| i64::from(r)).sum()
    }
}

/// A parsed dice expression such as `4d6kh3` or `1d8+2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceExpression {
    pub groups: Vec<DiceGroup>,
    pub modifier: i64,
    notation: String,
}

impl DiceExpression {
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut groups = Vec::new();
        let mut modifier: i64 = 0;
        let mut current = String::new();
        let mut sign: i64 = 1;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_term(&current, sign, &mut groups, &mut modifier)?;
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                }
                ' ' => continue,
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            Self::parse_term(&current, sign, &mut groups, &mut modifier)?;
        }

        if groups.is_empty() && modifier == 0 {
            return Err(DiceError::NoDice);
        }

        Ok(DiceExpression {
            groups,
            modifier,
            notation,
        })
    }

    fn parse_term(
        term: &str,
        sign: i64,
        groups: &mut Vec<DiceGroup>,
        modifier: &mut i64,
    ) -> Result<(), DiceError> {
        let invalid = || DiceError::InvalidNotation(term.to_string());

        let Some((count, rest)) = term.split_once('d') else {
            let value: i64 = term.parse().map_err(|_| invalid())?;
            *modifier += sign * value;
            return Ok(());
        };

        // Subtracted dice are not supported
        if sign < 0 {
            return Err(invalid());
        }

        let count: u32 = if count.is_empty() {
            1
        } else {
            count.parse().map_err(|_| invalid())?
        };

        let (sides, keep) = if let Some((sides, keep)) = rest.split_once("kh") {
            (sides, Keep::Highest(keep.parse().map_err(|_| invalid())?))
        } else if let Some((sides, keep)) = rest.split_once("kl") {
            (sides, Keep::Lowest(keep.parse().map_err(|_| invalid())?))
        } else {
            (rest, Keep::All)
        };

        let sides: u32 = sides.parse().map_err(|_| invalid())?;
        if sides == 0 {
            return Err(DiceError::InvalidDieSize(sides));
        }

        if let Keep::Highest(keep) | Keep::Lowest(keep) = keep {
            if keep > count {
                return Err(DiceError::InvalidKeepCount {
                    keep,
                    count,
                    notation: term.to_string(),
                });
            }
        }

        groups.push(DiceGroup { count, sides, keep });
        Ok(())
    }

    /// Smallest possible total.
    pub fn min(&self) -> i64 {
        self.groups.iter().map(|g| i64::from(kept_count(g))).sum::<i64>() + self.modifier
    }

    /// Largest possible total.
    pub fn max(&self) -> i64 {
        self.groups
            .iter()
            .map(|g| i64::from(kept_count(g)) * i64::from(g.sides))
            .sum::<i64>()
            + self.modifier
    }

    pub fn roll(&self) -> i64 {
        self.roll_with_rng(&mut rand::thread_rng())
    }

    /// Roll with a specific RNG (useful for testing).
    pub fn roll_with_rng<R: Rng>(&self, rng: &mut R) -> i64 {
        let total = self
            .groups
            .iter()
            .map(|group| group.roll_with_rng(rng))
            .sum::<i64>()
            + self.modifier;
        tracing::trace!(notation = %self.notation, total, "dice rolled");
        total
    }
}

fn kept_count(group: &DiceGroup) -> u32 {
    match group.keep {
        Keep::All => group.count,
        Keep::Highest(keep) | Keep::Lowest(keep) => keep,
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
        write!(f, "{}", self.notation)
    }
}

/// Roll dice from a notation string.
pub fn roll(notation: &str) -> Result<i64, DiceError> {
    Ok(DiceExpression::parse(notation)?.roll())
}

pub fn roll_with_rng<R: Rng>(notation: &str, rng: &mut R) -> Result<i64, DiceError> {
    Ok(DiceExpression::parse(notation)?.roll_with_rng(rng))
}

/// Roll once and freeze the result into a static link.
pub fn rolled_link<R: Rng>(
    name: impl Into<String>,
    notation: &str,
    rng: &mut R,
) -> Result<Link, DiceError> {
    let total = roll_with_rng(notation, rng)?;
    Ok(Link::static_value(name, total as Value))
}
