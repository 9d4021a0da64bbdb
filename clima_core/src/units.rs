//! # Unit Types
//!
//! Type-safe wrappers for the units the sizing pipeline converts between.
//! They stay lightweight (just f64 wrappers) and serialize as bare numbers.
//!
//! ## SI Units with Refrigeration Tons
//!
//! - Length: meters (m); area: square meters (m²)
//! - Air flow: liters per second (L/s), cubic meters per hour (m³/h)
//! - Pressure: pascals (Pa)
//! - Heat: watts (W), tons of refrigeration (TR, 1 TR = 3517 W)
//!
//! ## Example
//!
//! ```rust
//! use clima_core::units::{CubicMetersPerHour, LitersPerSecond, RefrigerationTons, Watts};
//!
//! let flow: LitersPerSecond = CubicMetersPerHour(36.0).into();
//! assert_eq!(flow.0, 10.0);
//!
//! let tr: RefrigerationTons = Watts(7034.0).into();
//! assert_eq!(tr.0, 2.0);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Sub};

/// Watts per ton of refrigeration
pub const WATTS_PER_TR: f64 = 3517.0;

/// Cubic meters per hour in one liter per second
pub const M3H_PER_LPS: f64 = 3.6;

// ============================================================================
// Geometry
// ============================================================================

/// Length in meters
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Meters(pub f64);

/// Area in square meters
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SquareMeters(pub f64);

impl Mul<Meters> for Meters {
    type Output = SquareMeters;
    fn mul(self, rhs: Meters) -> SquareMeters {
        SquareMeters(self.0 * rhs.0)
    }
}

// ============================================================================
// Air Flow
// ============================================================================

/// Volumetric flow in liters per second
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LitersPerSecond(pub f64);

/// Volumetric flow in cubic meters per hour
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CubicMetersPerHour(pub f64);

impl From<CubicMetersPerHour> for LitersPerSecond {
    fn from(m3h: CubicMetersPerHour) -> Self {
        LitersPerSecond(m3h.0 / M3H_PER_LPS)
    }
}

impl From<LitersPerSecond> for CubicMetersPerHour {
    fn from(lps: LitersPerSecond) -> Self {
        CubicMetersPerHour(lps.0 * M3H_PER_LPS)
    }
}

// ============================================================================
// Pressure
// ============================================================================

/// Pressure differential in pascals
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pascals(pub f64);

impl Pascals {
    /// `p^exponent`, or 0 for non-positive pressures.
    pub fn powf_or_zero(self, exponent: f64) -> f64 {
        if self.0 > 0.0 {
            self.0.powf(exponent)
        } else {
            0.0
        }
    }
}

// ============================================================================
// Heat
// ============================================================================

/// Heat rate in watts
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watts(pub f64);

/// Cooling capacity in tons of refrigeration
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefrigerationTons(pub f64);

impl From<Watts> for RefrigerationTons {
    fn from(w: Watts) -> Self {
        RefrigerationTons(w.0 / WATTS_PER_TR)
    }
}

impl From<RefrigerationTons> for Watts {
    fn from(tr: RefrigerationTons) -> Self {
        Watts(tr.0 * WATTS_PER_TR)
    }
}

// ============================================================================
// Arithmetic Implementations (macro to reduce boilerplate)
// ============================================================================

macro_rules! impl_arithmetic {
    ($type:ty) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl $type {
            /// Get the raw f64 value
            pub fn value(self) -> f64 {
                self.0
            }

            /// Create from raw f64 value
            pub fn new(value: f64) -> Self {
                Self(value)
            }
        }
    };
}

impl_arithmetic!(Meters);
impl_arithmetic!(SquareMeters);
impl_arithmetic!(LitersPerSecond);
impl_arithmetic!(CubicMetersPerHour);
impl_arithmetic!(Pascals);
impl_arithmetic!(Watts);
impl_arithmetic!(RefrigerationTons);
