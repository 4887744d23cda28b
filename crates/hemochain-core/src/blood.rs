use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ABO/Rh blood groups.
///
/// Transfers carry the group as a plain label so that inventory can also
/// track products such as plasma; this type is for compatibility lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "O-")]
    ONeg,
    #[serde(rename = "O+")]
    OPos,
    #[serde(rename = "A-")]
    ANeg,
    #[serde(rename = "A+")]
    APos,
    #[serde(rename = "B-")]
    BNeg,
    #[serde(rename = "B+")]
    BPos,
    #[serde(rename = "AB-")]
    AbNeg,
    #[serde(rename = "AB+")]
    AbPos,
}

impl BloodType {
    pub const ALL: [BloodType; 8] = [
        BloodType::ONeg,
        BloodType::OPos,
        BloodType::ANeg,
        BloodType::APos,
        BloodType::BNeg,
        BloodType::BPos,
        BloodType::AbNeg,
        BloodType::AbPos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodType::ONeg => "O-",
            BloodType::OPos => "O+",
            BloodType::ANeg => "A-",
            BloodType::APos => "A+",
            BloodType::BNeg => "B-",
            BloodType::BPos => "B+",
            BloodType::AbNeg => "AB-",
            BloodType::AbPos => "AB+",
        }
    }

    fn antigens(&self) -> (bool, bool, bool) {
        // (A, B, Rh)
        match self {
            BloodType::ONeg => (false, false, false),
            BloodType::OPos => (false, false, true),
            BloodType::ANeg => (true, false, false),
            BloodType::APos => (true, false, true),
            BloodType::BNeg => (false, true, false),
            BloodType::BPos => (false, true, true),
            BloodType::AbNeg => (true, true, false),
            BloodType::AbPos => (true, true, true),
        }
    }

    /// Red-cell compatibility: the recipient must carry every antigen the
    /// donor carries.
    pub fn can_donate_to(&self, recipient: BloodType) -> bool {
        let (da, db, drh) = self.antigens();
        let (ra, rb, rrh) = recipient.antigens();
        (!da || ra) && (!db || rb) && (!drh || rrh)
    }

    pub fn compatible_recipients(&self) -> Vec<BloodType> {
        BloodType::ALL
            .iter()
            .copied()
            .filter(|r| self.can_donate_to(*r))
            .collect()
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown blood type: {0}")]
pub struct ParseBloodTypeError(pub String);

impl FromStr for BloodType {
    type Err = ParseBloodTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        BloodType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ParseBloodTypeError(s.to_string()))
    }
}
