// src/models/band.rs

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// IELTS band in half steps (`0.0..=9.0`).
///
/// Stored as the number of half bands so that comparisons and averaging stay
/// in integer arithmetic. Serialized as a plain JSON number, e.g. `6.5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct Band(i16);

impl Band {
    pub const MIN: Band = Band(0);
    pub const MAX: Band = Band(18);

    pub const fn from_half_steps(half_steps: i16) -> Option<Band> {
        if half_steps >= Self::MIN.0 && half_steps <= Self::MAX.0 {
            Some(Band(half_steps))
        } else {
            None
        }
    }

    pub const fn half_steps(self) -> i16 {
        self.0
    }

    /// Accepts only exact half-band values within range.
    pub fn from_f64(value: f64) -> Option<Band> {
        if !value.is_finite() {
            return None;
        }
        let doubled = value * 2.0;
        if doubled.fract() != 0.0 {
            return None;
        }
        if doubled < f64::from(Self::MIN.0) || doubled > f64::from(Self::MAX.0) {
            return None;
        }
        Self::from_half_steps(doubled as i16)
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 2.0
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}", self.as_f64())
    }
}

impl Serialize for Band {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Band {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Band::from_f64(value).ok_or_else(|| {
            de::Error::custom(format!(
                "band must be a multiple of 0.5 between 0 and 9, got {value}"
            ))
        })
    }
}
