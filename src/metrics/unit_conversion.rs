//! Unit conversion resolution
//!
//! Decides which selector suffix converts a metric from its native unit to a
//! requested unit. No lookups happen here; the caller supplies the source unit
//! and whether the metric supports the `toUnit` transformation.

use std::fmt;

use super::error::{MetricsError, Result};

pub const UNIT_COUNT: &str = "Count";
pub const UNIT_UNSPECIFIED: &str = "Unspecified";

/// Magnitude units reachable from a unitless metric, with their divisors
const UNITLESS_CONVERSIONS: [(&str, u64); 4] = [
    ("Kilo", 1_000),
    ("Million", 1_000_000),
    ("Billion", 1_000_000_000),
    ("Trillion", 1_000_000_000_000),
];

/// Target unit IDs meaning "leave the unit as it is"
const NO_CONVERSION_UNIT_IDS: [&str; 3] = ["", "auto", "none"];

/// Whether the target unit asks for no conversion at all
pub fn is_no_conversion(target_unit_id: &str) -> bool {
    NO_CONVERSION_UNIT_IDS.contains(&target_unit_id)
}

fn is_unitless(unit_id: &str) -> bool {
    unit_id == UNIT_COUNT || unit_id == UNIT_UNSPECIFIED
}

/// A selector suffix converting a metric to another unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitConversion {
    /// Plain arithmetic division, e.g. `/1000`
    Divide(u64),
    /// `:toUnit(source,target)`
    ToUnit { source: String, target: String },
    /// `:auto:toUnit(source,target)`
    AutoToUnit { source: String, target: String },
}

impl UnitConversion {
    /// Resolve the conversion from `source_unit_id` to `target_unit_id`
    ///
    /// Unitless sources only convert to the magnitude units; that check wins
    /// over `to_unit_supported`.
    pub fn resolve(
        source_unit_id: &str,
        target_unit_id: &str,
        to_unit_supported: bool,
    ) -> Result<Self> {
        if is_unitless(source_unit_id) {
            return UNITLESS_CONVERSIONS
                .iter()
                .find(|(unit_id, _)| *unit_id == target_unit_id)
                .map(|(_, divisor)| UnitConversion::Divide(*divisor))
                .ok_or_else(|| MetricsError::UnknownUnitConversion {
                    unit_id: target_unit_id.to_string(),
                });
        }

        let source = source_unit_id.to_string();
        let target = target_unit_id.to_string();
        if to_unit_supported {
            Ok(UnitConversion::ToUnit { source, target })
        } else {
            Ok(UnitConversion::AutoToUnit { source, target })
        }
    }
}

impl fmt::Display for UnitConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitConversion::Divide(divisor) => write!(f, "/{}", divisor),
            UnitConversion::ToUnit { source, target } => {
                write!(f, ":toUnit({},{})", source, target)
            }
            UnitConversion::AutoToUnit { source, target } => {
                write!(f, ":auto:toUnit({},{})", source, target)
            }
        }
    }
}
