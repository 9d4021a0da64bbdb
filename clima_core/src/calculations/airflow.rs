//! # Airflow Calculation
//!
//! External makeup air needed to hold the room's pressurization setpoint
//! against door leakage.
//!
//! ## Formula
//!
//! Per door type (double doors use `VARIAVEL_PD`, single doors `VARIAVEL_PS`):
//!
//! ```text
//! Q (m³/h) = 0.827 × doors × door_variable × ΔP^0.5 × 3600
//! ```
//!
//! The two flows are summed, converted to L/s (÷ 3.6), multiplied by the
//! 1.25 safety factor and rounded up. A non-positive ΔP contributes nothing.
//!
//! ## Example
//!
//! ```rust
//! use clima_core::calculations::airflow::compute_airflow;
//! use clima_core::constants::SystemConstants;
//!
//! let constants = SystemConstants::from_values([("VARIAVEL_PD", 0.042), ("VARIAVEL_PS", 0.024)]);
//! let flow_lps = compute_airflow(1, 2, 25.0, &constants).unwrap();
//! assert!(flow_lps > 0);
//!
//! // No pressurization, no makeup air
//! assert_eq!(compute_airflow(1, 2, 0.0, &constants).unwrap(), 0);
//! ```

use serde::{Deserialize, Serialize};

use crate::constants::{ConstantKey, SystemConstants};
use crate::errors::CalcResult;
use crate::units::{CubicMetersPerHour, LitersPerSecond, Pascals};

/// Orifice discharge coefficient
pub const FLOW_COEFFICIENT: f64 = 0.827;

pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// m³/h → L/s divisor
pub const FLOW_DIVISOR: f64 = crate::units::M3H_PER_LPS;

/// Margin applied to the leakage flow
pub const SAFETY_FACTOR: f64 = 1.25;

pub const PRESSURE_EXPONENT: f64 = 0.5;

/// Airflow with the per-door-type breakdown.
///
/// ## JSON Example
///
/// ```json
/// {
///   "double_door_m3h": 625.2,
///   "single_door_m3h": 714.5,
///   "flow_lps": 466
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AirflowResult {
    /// Leakage through double doors (m³/h, before safety factor)
    pub double_door_m3h: f64,

    /// Leakage through single doors (m³/h, before safety factor)
    pub single_door_m3h: f64,

    /// Required makeup air (L/s), safety factor applied, rounded up
    pub flow_lps: u32,
}

/// Leakage flow through `door_count` doors of one type (m³/h).
pub fn door_flow_m3h(door_count: u32, door_variable: f64, pressurization_pa: f64) -> f64 {
    let pressure_term = Pascals(pressurization_pa).powf_or_zero(PRESSURE_EXPONENT);
    FLOW_COEFFICIENT * door_count as f64 * door_variable * pressure_term * SECONDS_PER_HOUR
}

/// Calculate required makeup airflow.
///
/// # Returns
///
/// * `Ok(AirflowResult)` - flow in L/s plus breakdown
/// * `Err(CalcError::NotReady)` - `VARIAVEL_PD` or `VARIAVEL_PS` absent
pub fn calculate(
    double_doors: u32,
    single_doors: u32,
    pressurization_pa: f64,
    constants: &SystemConstants,
) -> CalcResult<AirflowResult> {
    constants.require(&[ConstantKey::VariavelPd, ConstantKey::VariavelPs])?;
    let variavel_pd = constants.value(ConstantKey::VariavelPd)?;
    let variavel_ps = constants.value(ConstantKey::VariavelPs)?;

    let double_door_m3h = door_flow_m3h(double_doors, variavel_pd, pressurization_pa);
    let single_door_m3h = door_flow_m3h(single_doors, variavel_ps, pressurization_pa);

    let total: LitersPerSecond = CubicMetersPerHour(double_door_m3h + single_door_m3h).into();
    let with_margin = total * SAFETY_FACTOR;

    // `as` saturates: negative or NaN flows land on 0
    let flow_lps = with_margin.value().ceil() as u32;

    Ok(AirflowResult {
        double_door_m3h,
        single_door_m3h,
        flow_lps,
    })
}

/// Required makeup airflow in L/s.
pub fn compute_airflow(
    double_doors: u32,
    single_doors: u32,
    pressurization_pa: f64,
    constants: &SystemConstants,
) -> CalcResult<u32> {
    calculate(double_doors, single_doors, pressurization_pa, constants).map(|r| r.flow_lps)
}
