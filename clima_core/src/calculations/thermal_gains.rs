//! # Thermal Gains Calculation
//!
//! Heat the cooling units must remove from a technical room, split into
//! envelope conduction, internal gains and outside-air (ventilation) gains.
//!
//! ## Formulas
//!
//! | Component | Formula |
//! |-----------|---------|
//! | Ceiling | `area × U_ceiling × ΔT_teto` |
//! | Wall (each orientation) | `length × height × U_wall × ΔT_orientation` |
//! | Partition (each) | `entered_area × height × U_wall × ΔT_partition` |
//! | Floor | `area × U_piso × ΔT_piso` |
//! | Lighting | `area × AUX_Fator_Iluminacao × AUX_Fs_Iluminacao` |
//! | Dissipation | `AUX_Fator_Conver_Painel × W × AUX_Fs_Paineis / 100` |
//! | People | `(Csp × n × 100) / 100 + (Clp × n × 100) / 100` |
//! | Outside air, sensible | `(Q × 3.6 × ρ × 1000 × c × ΔT) / 1000 × 1.16` |
//! | Outside air, latent | `Q × f × ΔUa` |
//!
//! Partition inputs are already areas and are still multiplied by the
//! ceiling height. Rooms with an unspecified construction type report zero
//! envelope gain (ceiling, walls, partitions).
//!
//! ## Rounding
//!
//! Every component and every category subtotal is rounded up to whole
//! watts. The grand total is the ceiling of the *unrounded* sum, so it can
//! be a few watts below the sum of the rounded subtotals.
//!
//! ## Example
//!
//! ```rust
//! use clima_core::calculations::thermal_gains::compute_thermal_gains;
//! use clima_core::constants::{ConstantKey, SystemConstants};
//! use clima_core::room::{ConstructionType, RoomClimateInput};
//!
//! let constants = SystemConstants::from_values(
//!     ConstantKey::REQUIRED.iter().map(|k| (k.name(), 1.0)),
//! );
//! let input = RoomClimateInput {
//!     area_m2: 30.0,
//!     ceiling_height_m: 3.0,
//!     construction: ConstructionType::Eletrocentro,
//!     ..Default::default()
//! };
//!
//! let gains = compute_thermal_gains(&input, 0, &constants).unwrap();
//! assert!(gains.totals.geral_w > 0);
//! ```

use serde::{Deserialize, Serialize};

use crate::constants::{ConstantKey, SystemConstants};
use crate::errors::CalcResult;
use crate::room::RoomClimateInput;
use crate::units::{CubicMetersPerHour, LitersPerSecond, Meters, RefrigerationTons, SquareMeters, Watts};

/// kcal/h → W conversion applied to the sensible outside-air gain
const KCALH_TO_W: f64 = 1.16;

/// People gains use a fixed 100 % simultaneity
const PEOPLE_FS_PERCENT: f64 = 100.0;

/// Constants this calculator reads.
pub const THERMAL_KEYS: [ConstantKey; 22] = [
    ConstantKey::DeltaTTeto,
    ConstantKey::DeltaTParedeOeste,
    ConstantKey::DeltaTParedeLeste,
    ConstantKey::DeltaTParedeNorte,
    ConstantKey::DeltaTParedeSul,
    ConstantKey::DeltaTDivisaoNaoClim1,
    ConstantKey::DeltaTDivisaoNaoClim2,
    ConstantKey::DeltaTDivisaoClim1,
    ConstantKey::DeltaTDivisaoClim2,
    ConstantKey::FatorIluminacao,
    ConstantKey::FsIluminacao,
    ConstantKey::FatorConversaoPainel,
    ConstantKey::FsPaineis,
    ConstantKey::OcupanteCalorSensivel,
    ConstantKey::OcupanteCalorLatente,
    ConstantKey::DensidadeAr,
    ConstantKey::CalorEspecificoArExterno,
    ConstantKey::DeltaTArExterno,
    ConstantKey::FatorLatenteArExterno,
    ConstantKey::DeltaUaArExterno,
    ConstantKey::UValuePiso,
    ConstantKey::DeltaTPiso,
];

/// Individual gains in whole watts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GainComponents {
    pub teto: u64,
    pub parede_oeste: u64,
    pub parede_leste: u64,
    pub parede_norte: u64,
    pub parede_sul: u64,
    pub divisao_nao_clim1: u64,
    pub divisao_nao_clim2: u64,
    pub divisao_clim1: u64,
    pub divisao_clim2: u64,
    pub piso: u64,
    pub iluminacao: u64,
    pub dissipacao: u64,
    pub pessoas: u64,
    pub ar_externo_sensivel: u64,
    pub ar_externo_latente: u64,
}

/// Category subtotals and grand totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GainTotals {
    /// Ceiling plus the four walls (W)
    pub externo: u64,
    /// The four partitions (W)
    pub divisoes: u64,
    pub piso: u64,
    pub iluminacao: u64,
    pub equipamentos: u64,
    pub pessoas: u64,
    /// Sensible plus latent outside-air gain (W)
    pub ar_externo: u64,
    /// Grand total (W)
    pub geral_w: u64,
    /// Grand total in tons of refrigeration, rounded up
    pub geral_tr: u64,
}

impl GainTotals {
    /// Sum of the rounded category subtotals.
    pub fn subtotal_sum(&self) -> u64 {
        self.externo
            + self.divisoes
            + self.piso
            + self.iluminacao
            + self.equipamentos
            + self.pessoas
            + self.ar_externo
    }
}

/// Results from the thermal gains calculation.
///
/// ## JSON Example
///
/// ```json
/// {
///   "components": { "teto": 3961, "parede_oeste": 0, "iluminacao": 350, "...": 0 },
///   "totals": { "externo": 3961, "iluminacao": 350, "geral_w": 4311, "geral_tr": 2, "...": 0 }
/// }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThermalGainsResult {
    pub components: GainComponents,
    pub totals: GainTotals,
}

/// Whole watts, rounded up; negative or non-finite values count as 0.
fn ceil_w(w: Watts) -> u64 {
    let v = w.value();
    if v.is_finite() && v > 0.0 {
        v.ceil() as u64
    } else {
        0
    }
}

/// `area × U × ΔT`
fn conduction(area: SquareMeters, u_value: f64, delta_t: f64) -> Watts {
    Watts(area.value() * u_value * delta_t)
}

/// Unrounded gains, kept so the grand total can be rounded once.
#[derive(Debug, Clone, Copy, Default)]
struct RawGains {
    teto: Watts,
    parede_oeste: Watts,
    parede_leste: Watts,
    parede_norte: Watts,
    parede_sul: Watts,
    divisao_nao_clim1: Watts,
    divisao_nao_clim2: Watts,
    divisao_clim1: Watts,
    divisao_clim2: Watts,
    piso: Watts,
    iluminacao: Watts,
    dissipacao: Watts,
    pessoas: Watts,
    ar_externo_sensivel: Watts,
    ar_externo_latente: Watts,
}

impl RawGains {
    fn externo(&self) -> Watts {
        self.teto + self.parede_oeste + self.parede_leste + self.parede_norte + self.parede_sul
    }

    fn divisoes(&self) -> Watts {
        self.divisao_nao_clim1 + self.divisao_nao_clim2 + self.divisao_clim1 + self.divisao_clim2
    }

    fn ar_externo(&self) -> Watts {
        self.ar_externo_sensivel + self.ar_externo_latente
    }

    fn total(&self) -> Watts {
        self.externo()
            + self.divisoes()
            + self.piso
            + self.iluminacao
            + self.dissipacao
            + self.pessoas
            + self.ar_externo()
    }

    fn rounded(&self) -> ThermalGainsResult {
        let components = GainComponents {
            teto: ceil_w(self.teto),
            parede_oeste: ceil_w(self.parede_oeste),
            parede_leste: ceil_w(self.parede_leste),
            parede_norte: ceil_w(self.parede_norte),
            parede_sul: ceil_w(self.parede_sul),
            divisao_nao_clim1: ceil_w(self.divisao_nao_clim1),
            divisao_nao_clim2: ceil_w(self.divisao_nao_clim2),
            divisao_clim1: ceil_w(self.divisao_clim1),
            divisao_clim2: ceil_w(self.divisao_clim2),
            piso: ceil_w(self.piso),
            iluminacao: ceil_w(self.iluminacao),
            dissipacao: ceil_w(self.dissipacao),
            pessoas: ceil_w(self.pessoas),
            ar_externo_sensivel: ceil_w(self.ar_externo_sensivel),
            ar_externo_latente: ceil_w(self.ar_externo_latente),
        };

        let geral_w = ceil_w(self.total());
        let geral_tr = RefrigerationTons::from(Watts(geral_w as f64)).value().ceil() as u64;

        let totals = GainTotals {
            externo: ceil_w(self.externo()),
            divisoes: ceil_w(self.divisoes()),
            piso: ceil_w(self.piso),
            iluminacao: ceil_w(self.iluminacao),
            equipamentos: ceil_w(self.dissipacao),
            pessoas: ceil_w(self.pessoas),
            ar_externo: ceil_w(self.ar_externo()),
            geral_w,
            geral_tr,
        };

        ThermalGainsResult { components, totals }
    }
}

/// Sensible gain of the makeup air (W).
fn outside_air_sensible(airflow: LitersPerSecond, density: f64, specific_heat: f64, delta_t: f64) -> Watts {
    let m3h: CubicMetersPerHour = airflow.into();
    let mass_flow = m3h.value() * density * 1000.0;
    let gain = mass_flow * specific_heat * delta_t;
    Watts(gain / 1000.0 * KCALH_TO_W)
}

/// Calculate all thermal gains for one room.
///
/// # Arguments
///
/// * `input` - Room geometry, construction and internal loads
/// * `airflow_lps` - Makeup airflow from [`super::airflow::compute_airflow`]
/// * `constants` - Loaded constants table
///
/// # Returns
///
/// * `Ok(ThermalGainsResult)` - Components, subtotals and totals
/// * `Err(CalcError::NotReady)` - A required constant is absent
pub fn compute_thermal_gains(
    input: &RoomClimateInput,
    airflow_lps: u32,
    constants: &SystemConstants,
) -> CalcResult<ThermalGainsResult> {
    constants.require(&THERMAL_KEYS)?;
    let c = |key: ConstantKey| constants.value(key);

    let u = input.construction.u_values();
    let height = Meters(input.ceiling_height_m);
    let area = SquareMeters(input.area_m2);
    let wall = |length_m: f64, key: ConstantKey| -> CalcResult<Watts> {
        Ok(conduction(Meters(length_m) * height, u.wall, c(key)?))
    };
    let partition = |area_m2: f64, key: ConstantKey| -> CalcResult<Watts> {
        Ok(conduction(SquareMeters(area_m2 * height.value()), u.wall, c(key)?))
    };

    let occupants = input.occupants as f64;
    let airflow = LitersPerSecond(airflow_lps as f64);

    let raw = RawGains {
        teto: conduction(area, u.ceiling, c(ConstantKey::DeltaTTeto)?),
        parede_oeste: wall(input.wall_oeste_m, ConstantKey::DeltaTParedeOeste)?,
        parede_leste: wall(input.wall_leste_m, ConstantKey::DeltaTParedeLeste)?,
        parede_norte: wall(input.wall_norte_m, ConstantKey::DeltaTParedeNorte)?,
        parede_sul: wall(input.wall_sul_m, ConstantKey::DeltaTParedeSul)?,
        divisao_nao_clim1: partition(input.partition_nao_clim1_m2, ConstantKey::DeltaTDivisaoNaoClim1)?,
        divisao_nao_clim2: partition(input.partition_nao_clim2_m2, ConstantKey::DeltaTDivisaoNaoClim2)?,
        divisao_clim1: partition(input.partition_clim1_m2, ConstantKey::DeltaTDivisaoClim1)?,
        divisao_clim2: partition(input.partition_clim2_m2, ConstantKey::DeltaTDivisaoClim2)?,
        piso: conduction(area, c(ConstantKey::UValuePiso)?, c(ConstantKey::DeltaTPiso)?),
        iluminacao: Watts(area.value() * c(ConstantKey::FatorIluminacao)? * c(ConstantKey::FsIluminacao)?),
        dissipacao: Watts(
            c(ConstantKey::FatorConversaoPainel)? * input.dissipation_w * c(ConstantKey::FsPaineis)? / 100.0,
        ),
        pessoas: Watts(
            (c(ConstantKey::OcupanteCalorSensivel)? * occupants * PEOPLE_FS_PERCENT) / 100.0
                + (c(ConstantKey::OcupanteCalorLatente)? * occupants * PEOPLE_FS_PERCENT) / 100.0,
        ),
        ar_externo_sensivel: outside_air_sensible(
            airflow,
            c(ConstantKey::DensidadeAr)?,
            c(ConstantKey::CalorEspecificoArExterno)?,
            c(ConstantKey::DeltaTArExterno)?,
        ),
        ar_externo_latente: Watts(
            airflow.value() * c(ConstantKey::FatorLatenteArExterno)? * c(ConstantKey::DeltaUaArExterno)?,
        ),
    };

    Ok(raw.rounded())
}
