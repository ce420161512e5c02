//! Game settings and their flat string encoding.
//!
//! Settings travel inside join links and room updates as a single
//! space-delimited string:
//!
//! ```text
//! <gamemode> <gravity> <rows> <cols> <softDrop> <numColours> <targetPoints> <marginTime> <minChain>
//! ```
//!
//! The seed is deliberately not part of the string; every parse rolls a fresh one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::MAX_COLOURS;

/// Ruleset variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Gamemode {
    /// Pairs only, single death column.
    #[default]
    Tsu,
    /// Mixed drop shapes, two death columns.
    Fever,
}

impl Gamemode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gamemode::Tsu => "Tsu",
            Gamemode::Fever => "Fever",
        }
    }
}

impl FromStr for Gamemode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("tsu") {
            Ok(Gamemode::Tsu)
        } else if s.eq_ignore_ascii_case("fever") {
            Ok(Gamemode::Fever)
        } else {
            Err(SettingsError::UnknownGamemode(s.to_string()))
        }
    }
}

/// Errors raised while decoding or validating [`Settings`].
#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("expected {expected} settings fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("unknown gamemode: {0}")]
    UnknownGamemode(String),

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
}

/// Per-game configuration shared by every participant of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub gamemode: Gamemode,
    /// Rows fallen per frame.
    pub gravity: f64,
    pub rows: u32,
    pub cols: u32,
    /// Rows fallen per frame while soft-dropping.
    pub soft_drop: f64,
    pub num_colours: u32,
    /// Score needed per nuisance puyo sent.
    pub target_points: u32,
    /// Milliseconds before margin time begins lowering `target_points`.
    pub margin_time: u64,
    /// Chains shorter than this send no nuisance.
    pub min_chain: u32,
    /// Drop generator seed.
    pub seed: u32,
}

const FIELD_COUNT: usize = 9;

impl Default for Settings {
    fn default() -> Self {
        Self {
            gamemode: Gamemode::Tsu,
            gravity: 0.036,
            rows: 12,
            cols: 6,
            soft_drop: 0.375,
            num_colours: 4,
            target_points: 70,
            margin_time: 96_000,
            min_chain: 0,
            seed: 1,
        }
    }
}

impl Settings {
    /// Default settings with a random seed.
    pub fn random_seed() -> Self {
        Self {
            seed: rand::random(),
            ..Self::default()
        }
    }

    /// Same settings with a different seed.
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    /// Check value ranges. Parsing always validates.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.cols < 4 {
            return Err(SettingsError::OutOfRange {
                field: "cols",
                value: self.cols.to_string(),
            });
        }
        if self.rows < 2 {
            return Err(SettingsError::OutOfRange {
                field: "rows",
                value: self.rows.to_string(),
            });
        }
        if self.num_colours == 0 || self.num_colours > MAX_COLOURS {
            return Err(SettingsError::OutOfRange {
                field: "numColours",
                value: self.num_colours.to_string(),
            });
        }
        if self.target_points == 0 {
            return Err(SettingsError::OutOfRange {
                field: "targetPoints",
                value: self.target_points.to_string(),
            });
        }
        if !(self.gravity.is_finite() && self.gravity > 0.0) {
            return Err(SettingsError::OutOfRange {
                field: "gravity",
                value: self.gravity.to_string(),
            });
        }
        if !(self.soft_drop.is_finite() && self.soft_drop > 0.0) {
            return Err(SettingsError::OutOfRange {
                field: "softDrop",
                value: self.soft_drop.to_string(),
            });
        }
        Ok(())
    }

    /// Whether two settings agree on everything but the seed.
    pub fn same_rules(&self, other: &Settings) -> bool {
        self.clone().with_seed(0) == other.clone().with_seed(0)
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {} {}",
            self.gamemode.as_str(),
            self.gravity,
            self.rows,
            self.cols,
            self.soft_drop,
            self.num_colours,
            self.target_points,
            self.margin_time,
            self.min_chain
        )
    }
}

fn parse_field<T: FromStr>(field: &'static str, value: &str) -> Result<T, SettingsError> {
    value.parse().map_err(|_| SettingsError::InvalidField {
        field,
        value: value.to_string(),
    })
}

impl FromStr for Settings {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != FIELD_COUNT {
            return Err(SettingsError::FieldCount {
                expected: FIELD_COUNT,
                found: fields.len(),
            });
        }

        let settings = Settings {
            gamemode: fields[0].parse()?,
            gravity: parse_field("gravity", fields[1])?,
            rows: parse_field("rows", fields[2])?,
            cols: parse_field("cols", fields[3])?,
            soft_drop: parse_field("softDrop", fields[4])?,
            num_colours: parse_field("numColours", fields[5])?,
            target_points: parse_field("targetPoints", fields[6])?,
            margin_time: parse_field("marginTime", fields[7])?,
            min_chain: parse_field("minChain", fields[8])?,
            seed: rand::random(),
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_string_layout() {
        let settings = Settings::default();
        assert_eq!(settings.to_string(), "Tsu 0.036 12 6 0.375 4 70 96000 0");
    }

    #[test]
    fn test_string_roundtrip_ignores_seed() {
        let settings = Settings {
            gamemode: Gamemode::Fever,
            gravity: 0.05,
            rows: 13,
            cols: 8,
            soft_drop: 0.5,
            num_colours: 5,
            target_points: 120,
            margin_time: 60_000,
            min_chain: 2,
            seed: 42,
        };
        let parsed: Settings = settings.to_string().parse().unwrap();
        assert!(parsed.same_rules(&settings));
        assert_eq!(parsed.with_seed(42), settings);
    }

    #[test]
    fn test_rejects_wrong_field_count() {
        let err = "Tsu 0.036 12".parse::<Settings>().unwrap_err();
        assert_eq!(
            err,
            SettingsError::FieldCount {
                expected: 9,
                found: 3
            }
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            "Tsu abc 12 6 0.375 4 70 96000 0".parse::<Settings>(),
            Err(SettingsError::InvalidField { field: "gravity", .. })
        ));
        assert!(matches!(
            "Puzzle 0.036 12 6 0.375 4 70 96000 0".parse::<Settings>(),
            Err(SettingsError::UnknownGamemode(_))
        ));
        assert!(matches!(
            "Tsu 0.036 12 6 0.375 9 70 96000 0".parse::<Settings>(),
            Err(SettingsError::OutOfRange { field: "numColours", .. })
        ));
    }
}
