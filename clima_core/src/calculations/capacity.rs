//! # Capacity Sizing
//!
//! Number of cooling units and redundancy tier needed to cover a load with
//! a safety margin.
//!
//! ## Algorithm
//!
//! ```text
//! required    = load × (1 + safety% / 100)
//! operating   = ⌈required / unit⌉
//! total       = operating + spares(n | n+1 | n+2)
//! installed   = operating × unit          (spares do not add capacity)
//! margin (%)  = (installed / load − 1) × 100, or 0 when load is 0
//! ```
//!
//! Malformed inputs never abort the solver: a non-finite safety factor
//! becomes 10 %, a non-positive or non-finite unit capacity becomes 1 TR,
//! and each substitution is recorded in [`CapacitySolution::warnings`].
//!
//! ## Example
//!
//! ```rust
//! use clima_core::calculations::capacity::solve_capacity;
//! use clima_core::room::BackupPolicy;
//!
//! let solution = solve_capacity(18.0, 10.0, 5.0, BackupPolicy::NPlusOne);
//! assert_eq!(solution.operating_units, 4);
//! assert_eq!(solution.total_units, 5);
//! assert_eq!(solution.installed_capacity_tr, 20.0);
//! assert_eq!(solution.margin_percent, 11.1);
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::CalcError;
use crate::room::BackupPolicy;

/// Unit sizes offered by the equipment catalog (TR).
pub const UNIT_CAPACITY_MENU_TR: [f64; 12] = [1.0, 2.0, 3.0, 4.0, 5.0, 7.5, 10.0, 12.5, 15.0, 20.0, 25.0, 30.0];

/// Safety factor used when the entered one is not a number (fraction).
pub const DEFAULT_SAFETY_FACTOR: f64 = 0.10;

/// Unit capacity used when the entered one is unusable (TR).
pub const DEFAULT_UNIT_CAPACITY_TR: f64 = 1.0;

/// Ratios within this distance of an integer are treated as that integer,
/// so `50 × 1.1 / 5` sizes to 11 units rather than 12.
const RATIO_TOLERANCE: f64 = 1e-9;

/// Whether `unit_tr` is one of the catalog sizes.
pub fn is_catalog_unit(unit_tr: f64) -> bool {
    UNIT_CAPACITY_MENU_TR.iter().any(|&c| (c - unit_tr).abs() < 1e-9)
}

/// Results from the capacity solver.
///
/// ## JSON Example
///
/// ```json
/// {
///   "estimated_load_tr": 18.0,
///   "safety_factor_percent": 10.0,
///   "unit_capacity_tr": 5.0,
///   "required_capacity_tr": 19.8,
///   "operating_units": 4,
///   "backup": "n+1",
///   "total_units": 5,
///   "installed_capacity_tr": 20.0,
///   "margin_percent": 11.1
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacitySolution {
    /// Load sized for (TR)
    pub estimated_load_tr: f64,

    /// Safety factor actually applied (%)
    pub safety_factor_percent: f64,

    /// Capacity of one unit actually used (TR)
    pub unit_capacity_tr: f64,

    /// Load including the safety factor (TR)
    pub required_capacity_tr: f64,

    /// Units needed to carry the required capacity
    pub operating_units: u32,

    pub backup: BackupPolicy,

    /// Operating plus spare units
    pub total_units: u32,

    /// Capacity of the operating units (TR)
    pub installed_capacity_tr: f64,

    /// "Folga": installed over estimated, in percent, one decimal
    pub margin_percent: f64,

    /// Inputs that were replaced by defaults
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CalcError>,
}

impl CapacitySolution {
    /// Installed capacity covers the required capacity.
    pub fn covers_load(&self) -> bool {
        self.installed_capacity_tr + RATIO_TOLERANCE * self.unit_capacity_tr >= self.required_capacity_tr
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

fn round_to_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Size cooling units for a load.
///
/// The load is used as given; choosing between a computed load and a user
/// override happens before this call.
pub fn solve_capacity(
    estimated_load_tr: f64,
    safety_factor_percent: f64,
    unit_capacity_tr: f64,
    backup: BackupPolicy,
) -> CapacitySolution {
    let mut warnings = Vec::new();

    let load = if estimated_load_tr.is_finite() && estimated_load_tr >= 0.0 {
        estimated_load_tr
    } else {
        warn!(value = estimated_load_tr, "invalid estimated load; using 0");
        warnings.push(CalcError::invalid_input(
            "estimated_load_tr",
            estimated_load_tr.to_string(),
            "Load must be a non-negative number; using 0",
        ));
        0.0
    };

    let safety_percent = if !safety_factor_percent.is_finite() {
        warn!(value = safety_factor_percent, "invalid safety factor; using 10%");
        warnings.push(CalcError::invalid_input(
            "safety_factor_percent",
            safety_factor_percent.to_string(),
            "Safety factor is not a number; using 10%",
        ));
        DEFAULT_SAFETY_FACTOR * 100.0
    } else if safety_factor_percent < 0.0 {
        warn!(value = safety_factor_percent, "negative safety factor; using 0%");
        warnings.push(CalcError::invalid_input(
            "safety_factor_percent",
            safety_factor_percent.to_string(),
            "Safety factor cannot be negative; using 0%",
        ));
        0.0
    } else {
        safety_factor_percent
    };
    let safety = safety_percent / 100.0;

    let unit = if unit_capacity_tr.is_finite() && unit_capacity_tr > 0.0 {
        if !is_catalog_unit(unit_capacity_tr) {
            warn!(value = unit_capacity_tr, "unit capacity is not a catalog size");
        }
        unit_capacity_tr
    } else {
        warn!(value = unit_capacity_tr, "invalid unit capacity; using 1 TR");
        warnings.push(CalcError::invalid_input(
            "unit_capacity_tr",
            unit_capacity_tr.to_string(),
            "Unit capacity must be positive; using 1 TR",
        ));
        DEFAULT_UNIT_CAPACITY_TR
    };

    let required = load * (1.0 + safety);
    let ratio = required / unit;
    let nearest = ratio.round();
    let ratio = if (ratio - nearest).abs() < RATIO_TOLERANCE { nearest } else { ratio };
    // `as` saturates on absurdly large loads
    let operating_units = ratio.ceil() as u32;

    let total_units = operating_units.saturating_add(backup.spare_units());
    let installed = operating_units as f64 * unit;

    let margin_percent = if load > 0.0 {
        round_to_tenth((installed / load - 1.0) * 100.0)
    } else {
        0.0
    };

    CapacitySolution {
        estimated_load_tr: load,
        safety_factor_percent: safety_percent,
        unit_capacity_tr: unit,
        required_capacity_tr: required,
        operating_units,
        backup,
        total_units,
        installed_capacity_tr: installed,
        margin_percent,
        warnings,
    }
}
