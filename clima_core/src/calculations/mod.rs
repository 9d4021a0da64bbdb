//! # Sizing Calculations
//!
//! The three pipeline stages, each a pure function of its inputs plus the
//! constants table:
//!
//! - [`airflow`] - makeup airflow from door leakage and pressurization
//! - [`thermal_gains`] - conduction, internal and ventilation gains
//! - [`capacity`] - unit count, redundancy and margin
//!
//! Stages run in that order because each consumes the previous output:
//! airflow (L/s) feeds the ventilation gains, and the grand total in TR
//! feeds the capacity solver.
//!
//! ## Example
//!
//! ```rust
//! use clima_core::calculations::{airflow, capacity, thermal_gains};
//! use clima_core::constants::{ConstantKey, SystemConstants};
//! use clima_core::room::{BackupPolicy, ConstructionType, RoomClimateInput};
//!
//! let constants = SystemConstants::from_values(
//!     ConstantKey::REQUIRED.iter().map(|k| (k.name(), 1.0)),
//! );
//! let input = RoomClimateInput {
//!     area_m2: 40.0,
//!     ceiling_height_m: 3.0,
//!     construction: ConstructionType::Alvenaria,
//!     double_doors: 1,
//!     pressurization_pa: 25.0,
//!     ..Default::default()
//! };
//!
//! let flow = airflow::compute_airflow(input.double_doors, input.single_doors, input.pressurization_pa, &constants).unwrap();
//! let gains = thermal_gains::compute_thermal_gains(&input, flow, &constants).unwrap();
//! let solution = capacity::solve_capacity(gains.totals.geral_tr as f64, 10.0, 5.0, BackupPolicy::NPlusOne);
//! assert!(solution.covers_load());
//! ```

pub mod airflow;
pub mod capacity;
pub mod thermal_gains;

use std::fmt;

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use airflow::{compute_airflow, AirflowResult};
pub use capacity::{solve_capacity, CapacitySolution, UNIT_CAPACITY_MENU_TR};
pub use thermal_gains::{compute_thermal_gains, GainComponents, GainTotals, ThermalGainsResult};

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Airflow,
    ThermalGains,
    Capacity,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Airflow => "airflow",
            Stage::ThermalGains => "thermal_gains",
            Stage::Capacity => "capacity",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything one run produced for a room.
///
/// Stages that did not run (capacity without a capacity table, or anything
/// after a failed stage) are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomResults {
    pub airflow: Option<AirflowResult>,
    pub thermal_gains: Option<ThermalGainsResult>,
    pub capacity: Option<CapacitySolution>,
}

impl RoomResults {
    /// Last stage that produced a result.
    pub fn last_stage(&self) -> Option<Stage> {
        if self.capacity.is_some() {
            Some(Stage::Capacity)
        } else if self.thermal_gains.is_some() {
            Some(Stage::ThermalGains)
        } else if self.airflow.is_some() {
            Some(Stage::Airflow)
        } else {
            None
        }
    }
}
