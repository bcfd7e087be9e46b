//! Preference levels and their combination.
//!
//! Levels are kept both as a named scale ([`PreferenceLevel`]) used on the
//! wire and in snapshots, and as integer weights used when preferences are
//! summed or combined.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Weight of a required preference.
pub const REQUIRED: i32 = -100;
/// Weight of a prohibited preference.
pub const PROHIBITED: i32 = 100;
/// Weight of a neutral preference.
pub const NEUTRAL: i32 = 0;

/// Character printed in availability patterns for hard unavailability.
pub const NOT_AVAILABLE_CHAR: char = 'N';

/// Ordered preference scale, from required to prohibited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum PreferenceLevel {
    Required,
    StronglyPreferred,
    Preferred,
    #[default]
    Neutral,
    Discouraged,
    StronglyDiscouraged,
    Prohibited,
}

impl PreferenceLevel {
    /// Returns all levels in scale order.
    pub fn all() -> &'static [PreferenceLevel] {
        &[
            PreferenceLevel::Required,
            PreferenceLevel::StronglyPreferred,
            PreferenceLevel::Preferred,
            PreferenceLevel::Neutral,
            PreferenceLevel::Discouraged,
            PreferenceLevel::StronglyDiscouraged,
            PreferenceLevel::Prohibited,
        ]
    }

    /// Integer weight of this level.
    pub fn weight(&self) -> i32 {
        match self {
            PreferenceLevel::Required => REQUIRED,
            PreferenceLevel::StronglyPreferred => -4,
            PreferenceLevel::Preferred => -1,
            PreferenceLevel::Neutral => NEUTRAL,
            PreferenceLevel::Discouraged => 1,
            PreferenceLevel::StronglyDiscouraged => 4,
            PreferenceLevel::Prohibited => PROHIBITED,
        }
    }

    /// Maps a (possibly combined) weight back onto the named scale.
    pub fn from_weight(weight: i32) -> Self {
        if weight >= PROHIBITED {
            PreferenceLevel::Prohibited
        } else if weight <= REQUIRED {
            PreferenceLevel::Required
        } else if weight <= -4 {
            PreferenceLevel::StronglyPreferred
        } else if weight < 0 {
            PreferenceLevel::Preferred
        } else if weight >= 4 {
            PreferenceLevel::StronglyDiscouraged
        } else if weight > 0 {
            PreferenceLevel::Discouraged
        } else {
            PreferenceLevel::Neutral
        }
    }

    /// Short code used in snapshots and backups (`R`, `-2` .. `2`, `P`).
    pub fn code(&self) -> &'static str {
        match self {
            PreferenceLevel::Required => "R",
            PreferenceLevel::StronglyPreferred => "-2",
            PreferenceLevel::Preferred => "-1",
            PreferenceLevel::Neutral => "0",
            PreferenceLevel::Discouraged => "1",
            PreferenceLevel::StronglyDiscouraged => "2",
            PreferenceLevel::Prohibited => "P",
        }
    }

    /// Single character used in availability patterns.
    pub fn as_char(&self) -> char {
        match self {
            PreferenceLevel::Required => 'R',
            PreferenceLevel::StronglyPreferred => '0',
            PreferenceLevel::Preferred => '1',
            PreferenceLevel::Neutral => '2',
            PreferenceLevel::Discouraged => '3',
            PreferenceLevel::StronglyDiscouraged => '4',
            PreferenceLevel::Prohibited => 'P',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        PreferenceLevel::all().iter().find(|level| level.as_char() == c).copied()
    }

    pub fn is_prohibited(&self) -> bool {
        matches!(self, PreferenceLevel::Prohibited)
    }

    pub fn is_required(&self) -> bool {
        matches!(self, PreferenceLevel::Required)
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, PreferenceLevel::Neutral)
    }
}

impl fmt::Display for PreferenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for PreferenceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PreferenceLevel::all()
            .iter()
            .find(|level| level.code().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("unknown preference level '{}'", s))
    }
}

impl Serialize for PreferenceLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for PreferenceLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}

/// A preference for a target (instructor, course, attribute, time block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference<T> {
    pub target: T,
    pub level: PreferenceLevel,
}

impl<T> Preference<T> {
    pub fn new(target: T, level: PreferenceLevel) -> Self {
        Self { target, level }
    }

    pub fn weight(&self) -> i32 {
        self.level.weight()
    }

    pub fn is_prohibited(&self) -> bool {
        self.level.is_prohibited()
    }

    pub fn is_required(&self) -> bool {
        self.level.is_required()
    }
}

/// Most-restrictive combination of several preferences.
///
/// A prohibited contribution dominates everything, a required one dominates
/// soft levels. Among soft levels the one with the larger magnitude wins,
/// ties go to the discouraging side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreferenceCombination {
    min: i32,
    max: i32,
    prohibited: bool,
    required: bool,
}

impl PreferenceCombination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, weight: i32) {
        if weight >= PROHIBITED {
            self.prohibited = true;
        } else if weight <= REQUIRED {
            self.required = true;
        } else {
            self.min = self.min.min(weight);
            self.max = self.max.max(weight);
        }
    }

    pub fn add_level(&mut self, level: PreferenceLevel) {
        self.add(level.weight());
    }

    pub fn is_prohibited(&self) -> bool {
        self.prohibited
    }

    pub fn is_required(&self) -> bool {
        !self.prohibited && self.required
    }

    /// Combined weight.
    pub fn weight(&self) -> i32 {
        if self.prohibited {
            PROHIBITED
        } else if self.required {
            REQUIRED
        } else {
            combine_min_max(self.min, self.max)
        }
    }

    pub fn level(&self) -> PreferenceLevel {
        PreferenceLevel::from_weight(self.weight())
    }
}

/// Picks the dominating soft weight out of a `(min, max)` pair.
pub fn combine_min_max(min: i32, max: i32) -> i32 {
    if max > -min {
        max
    } else if -min > max {
        min
    } else {
        max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_codes_round_trip() {
        for level in PreferenceLevel::all() {
            assert_eq!(level.code().parse::<PreferenceLevel>().unwrap(), *level);
        }
        assert!("X".parse::<PreferenceLevel>().is_err());
        assert_eq!(PreferenceLevel::from_char('2'), Some(PreferenceLevel::Neutral));
        assert_eq!(PreferenceLevel::from_char('x'), None);
    }

    #[test]
    fn test_from_weight_buckets() {
        assert_eq!(PreferenceLevel::from_weight(250), PreferenceLevel::Prohibited);
        assert_eq!(PreferenceLevel::from_weight(-100), PreferenceLevel::Required);
        assert_eq!(PreferenceLevel::from_weight(-1), PreferenceLevel::Preferred);
        assert_eq!(PreferenceLevel::from_weight(0), PreferenceLevel::Neutral);
        assert_eq!(PreferenceLevel::from_weight(2), PreferenceLevel::Discouraged);
        assert_eq!(PreferenceLevel::from_weight(4), PreferenceLevel::StronglyDiscouraged);
    }

    #[test]
    fn test_combination_prohibited_dominates() {
        let mut comb = PreferenceCombination::new();
        comb.add_level(PreferenceLevel::Required);
        comb.add_level(PreferenceLevel::Prohibited);
        comb.add_level(PreferenceLevel::Preferred);
        assert!(comb.is_prohibited());
        assert!(!comb.is_required());
        assert_eq!(comb.weight(), PROHIBITED);
    }

    #[test]
    fn test_combination_larger_magnitude_wins() {
        let mut comb = PreferenceCombination::new();
        comb.add_level(PreferenceLevel::Preferred);
        comb.add_level(PreferenceLevel::StronglyDiscouraged);
        assert_eq!(comb.level(), PreferenceLevel::StronglyDiscouraged);

        let mut comb = PreferenceCombination::new();
        comb.add_level(PreferenceLevel::StronglyPreferred);
        comb.add_level(PreferenceLevel::Discouraged);
        assert_eq!(comb.level(), PreferenceLevel::StronglyPreferred);

        let mut tie = PreferenceCombination::new();
        tie.add(-1);
        tie.add(1);
        assert_eq!(tie.weight(), 1);
    }

    #[test]
    fn test_serde_uses_codes() {
        let json = serde_json::to_string(&PreferenceLevel::Prohibited).unwrap();
        assert_eq!(json, "\"P\"");
        let level: PreferenceLevel = serde_json::from_str("\"-2\"").unwrap();
        assert_eq!(level, PreferenceLevel::StronglyPreferred);
    }
}
