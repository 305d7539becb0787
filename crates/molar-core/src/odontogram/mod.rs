//! Per-tooth record types consumed by the clinical layer.
//!
//! The odontogram is a map from FDI tooth codes to a small tagged-state
//! record. The engine stores and serves these records; it never interprets
//! them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A validated FDI (two-digit) tooth code: quadrant 1-4 for permanent
/// dentition or 5-8 for deciduous, then position within the quadrant
/// (1-8 permanent, 1-5 deciduous). E.g. `"11"` is the upper right central
/// incisor, `"48"` the lower right third molar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToothCode {
    quadrant: u8,
    position: u8,
}

impl ToothCode {
    /// Build a code from quadrant and position, validating FDI ranges.
    pub fn new(quadrant: u8, position: u8) -> Result<Self, InvalidToothCode> {
        let max_position = match quadrant {
            1..=4 => 8,
            5..=8 => 5,
            _ => return Err(InvalidToothCode(format!("{quadrant}{position}"))),
        };
        if position < 1 || position > max_position {
            return Err(InvalidToothCode(format!("{quadrant}{position}")));
        }
        Ok(Self { quadrant, position })
    }

    pub fn quadrant(self) -> u8 {
        self.quadrant
    }

    pub fn position(self) -> u8 {
        self.position
    }

    /// Whether the code belongs to the deciduous (primary) dentition.
    pub fn is_deciduous(self) -> bool {
        self.quadrant >= 5
    }
}

impl fmt::Display for ToothCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.quadrant, self.position)
    }
}

impl FromStr for ToothCode {
    type Err = InvalidToothCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let (Some(q), Some(p), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(InvalidToothCode(s.to_owned()));
        };
        let quadrant = q.to_digit(10).ok_or_else(|| InvalidToothCode(s.to_owned()))?;
        let position = p.to_digit(10).ok_or_else(|| InvalidToothCode(s.to_owned()))?;
        Self::new(quadrant as u8, position as u8)
    }
}

impl TryFrom<String> for ToothCode {
    type Error = InvalidToothCode;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ToothCode> for String {
    fn from(code: ToothCode) -> Self {
        code.to_string()
    }
}

/// Error returned for a string that is not a valid FDI tooth code.
#[derive(Debug, Clone)]
pub struct InvalidToothCode(pub String);

impl fmt::Display for InvalidToothCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid FDI tooth code: {:?}", self.0)
    }
}

impl std::error::Error for InvalidToothCode {}

/// The finite set of recordable tooth conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToothCondition {
    Healthy,
    Caries,
    Restored,
    Crown,
    RootCanal,
    Extracted,
    Missing,
    Implant,
    Prosthesis,
    Fracture,
}

/// Tooth surfaces, for locating a finding on the tooth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToothSurface {
    Occlusal,
    Mesial,
    Distal,
    Buccal,
    Lingual,
    Palatal,
}

/// The recorded state of one tooth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToothRecord {
    pub condition: ToothCondition,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub surfaces: Vec<ToothSurface>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ToothRecord {
    pub fn new(condition: ToothCondition) -> Self {
        Self {
            condition,
            surfaces: Vec::new(),
            notes: None,
        }
    }
}

/// A full per-tooth chart: FDI code to recorded state.
pub type Odontogram = BTreeMap<ToothCode, ToothRecord>;
