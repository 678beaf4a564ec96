//! Vehicle occupancy level.

use std::fmt;

use serde::{Serialize, Serializer};

/// Error returned for an occupancy value outside 0-5.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid occupancy {0}: must be between 0 and 5")]
pub struct InvalidOccupancy(pub i64);

/// Crowding level reported by a vehicle, on the BISON 0-5 scale.
///
/// # Examples
///
/// ```
/// use kv6_live::domain::Occupancy;
///
/// let occ = Occupancy::new(3).unwrap();
/// assert_eq!(occ.label(), "Few seats");
/// assert!(Occupancy::new(6).is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Occupancy(u8);

impl Occupancy {
    pub const MAX: u8 = 5;

    /// Create an occupancy level, rejecting anything outside 0-5.
    pub fn new(level: i64) -> Result<Self, InvalidOccupancy> {
        match u8::try_from(level) {
            Ok(l) if l <= Self::MAX => Ok(Occupancy(l)),
            _ => Err(InvalidOccupancy(level)),
        }
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// Human-readable description of the level.
    pub fn label(self) -> &'static str {
        match self.0 {
            0 => "Unknown",
            1 => "Empty",
            2 => "Many seats",
            3 => "Few seats",
            4 => "Standing only",
            _ => "Full",
        }
    }
}

impl fmt::Debug for Occupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Occupancy({})", self.0)
    }
}

impl fmt::Display for Occupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

impl Serialize for Occupancy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_zero_to_five() {
        for level in 0..=5 {
            assert_eq!(Occupancy::new(level).unwrap().level() as i64, level);
        }
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(Occupancy::new(6), Err(InvalidOccupancy(6)));
        assert_eq!(Occupancy::new(-1), Err(InvalidOccupancy(-1)));
        assert!(Occupancy::new(256).is_err());
    }

    #[test]
    fn labels() {
        assert_eq!(Occupancy::new(0).unwrap().label(), "Unknown");
        assert_eq!(Occupancy::new(1).unwrap().label(), "Empty");
        assert_eq!(Occupancy::new(4).unwrap().label(), "Standing only");
        assert_eq!(Occupancy::new(5).unwrap().label(), "Full");
    }

    #[test]
    fn display_and_serialize() {
        let occ = Occupancy::new(2).unwrap();
        assert_eq!(occ.to_string(), "2 (Many seats)");
        assert_eq!(serde_json::to_string(&occ).unwrap(), "2");
    }
}
