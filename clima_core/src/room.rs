//! # Room Data Structures
//!
//! Per-room inputs the form layer hands to the pipeline. A room is
//! identified by the string id the CRUD layer assigns; the core never
//! creates or deletes rooms itself.
//!
//! ## Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use clima_core::room::{ConstructionType, RoomClimateInput};
//!
//! let mut fields = HashMap::new();
//! fields.insert("area".to_string(), "50".to_string());
//! fields.insert("peDireito".to_string(), "3,2".to_string());
//! fields.insert("tipoConstrucao".to_string(), "Alvenaria".to_string());
//! fields.insert("numPortasDuplas".to_string(), "dois".to_string());
//!
//! let parsed = RoomClimateInput::from_fields(&fields);
//! assert_eq!(parsed.input.area_m2, 50.0);
//! assert_eq!(parsed.input.ceiling_height_m, 3.2);
//! assert_eq!(parsed.input.construction, ConstructionType::Alvenaria);
//! assert_eq!(parsed.input.double_doors, 0);
//! assert_eq!(parsed.warnings.len(), 1);
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::CalcError;

/// Identifier of a room ("sala") as assigned by the CRUD layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        RoomId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        RoomId(s.to_string())
    }
}

// ============================================================================
// Construction type
// ============================================================================

/// Envelope construction, which selects the wall and ceiling U-values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstructionType {
    /// Not classified yet; envelope gains are reported as zero
    #[default]
    Unspecified,
    /// Masonry building
    Alvenaria,
    /// Prefabricated electrical-room module
    Eletrocentro,
}

/// Thermal transmittance pair for a construction type (W/m²·°C).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UValues {
    pub wall: f64,
    pub ceiling: f64,
}

impl ConstructionType {
    /// Parse the form value; unknown strings are unspecified.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "alvenaria" => ConstructionType::Alvenaria,
            "eletrocentro" => ConstructionType::Eletrocentro,
            _ => ConstructionType::Unspecified,
        }
    }

    pub fn u_values(self) -> UValues {
        match self {
            ConstructionType::Alvenaria => UValues {
                wall: 2.546,
                ceiling: 3.961,
            },
            ConstructionType::Eletrocentro => UValues {
                wall: 1.12,
                ceiling: 1.145,
            },
            ConstructionType::Unspecified => UValues {
                wall: 0.0,
                ceiling: 0.0,
            },
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ConstructionType::Unspecified => "Não especificado",
            ConstructionType::Alvenaria => "Alvenaria",
            ConstructionType::Eletrocentro => "Eletrocentro",
        }
    }
}

// ============================================================================
// Backup policy
// ============================================================================

/// Redundancy tier: spare units beyond the operating count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum BackupPolicy {
    #[default]
    #[serde(rename = "n")]
    N,
    #[serde(rename = "n+1")]
    NPlusOne,
    #[serde(rename = "n+2")]
    NPlusTwo,
}

impl BackupPolicy {
    /// Parse the selector value; anything unrecognised falls back to `n`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().replace(' ', "").as_str() {
            "n+1" => BackupPolicy::NPlusOne,
            "n+2" => BackupPolicy::NPlusTwo,
            "n" => BackupPolicy::N,
            other => {
                warn!(value = other, "unknown backup policy; using n");
                BackupPolicy::N
            }
        }
    }

    pub fn spare_units(self) -> u32 {
        match self {
            BackupPolicy::N => 0,
            BackupPolicy::NPlusOne => 1,
            BackupPolicy::NPlusTwo => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackupPolicy::N => "n",
            BackupPolicy::NPlusOne => "n+1",
            BackupPolicy::NPlusTwo => "n+2",
        }
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// Everything the airflow and thermal-gains stages read for one room.
///
/// ## JSON Example
///
/// ```json
/// {
///   "area_m2": 50.0,
///   "wall_oeste_m": 10.0,
///   "wall_leste_m": 10.0,
///   "wall_norte_m": 5.0,
///   "wall_sul_m": 5.0,
///   "ceiling_height_m": 3.0,
///   "construction": "alvenaria",
///   "partition_nao_clim1_m2": 0.0,
///   "partition_nao_clim2_m2": 0.0,
///   "partition_clim1_m2": 12.0,
///   "partition_clim2_m2": 0.0,
///   "dissipation_w": 8000.0,
///   "occupants": 2,
///   "double_doors": 1,
///   "single_doors": 2,
///   "pressurization_pa": 25.0,
///   "backup": "n+1"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomClimateInput {
    /// Floor/ceiling area (m²)
    pub area_m2: f64,

    /// West wall length (m)
    pub wall_oeste_m: f64,
    /// East wall length (m)
    pub wall_leste_m: f64,
    /// North wall length (m)
    pub wall_norte_m: f64,
    /// South wall length (m)
    pub wall_sul_m: f64,

    /// Ceiling height, "pé-direito" (m)
    pub ceiling_height_m: f64,

    pub construction: ConstructionType,

    /// Partition to first non-climatized neighbour (m², multiplied by height)
    pub partition_nao_clim1_m2: f64,
    /// Partition to second non-climatized neighbour
    pub partition_nao_clim2_m2: f64,
    /// Partition to first climatized neighbour
    pub partition_clim1_m2: f64,
    /// Partition to second climatized neighbour
    pub partition_clim2_m2: f64,

    /// Equipment dissipation (W)
    pub dissipation_w: f64,

    pub occupants: u32,
    pub double_doors: u32,
    pub single_doors: u32,

    /// Pressurization differential (Pa)
    pub pressurization_pa: f64,

    pub backup: BackupPolicy,
}

/// Result of parsing raw form fields: the coerced input plus one
/// `InvalidInput` per field that had to be replaced by a default.
#[derive(Debug, Clone, Default)]
pub struct ParsedInput {
    pub input: RoomClimateInput,
    pub warnings: Vec<CalcError>,
}

/// Form field names used by the room form.
pub mod field {
    pub const AREA: &str = "area";
    pub const PAREDE_OESTE: &str = "paredeOeste";
    pub const PAREDE_LESTE: &str = "paredeLeste";
    pub const PAREDE_NORTE: &str = "paredeNorte";
    pub const PAREDE_SUL: &str = "paredeSul";
    pub const PE_DIREITO: &str = "peDireito";
    pub const TIPO_CONSTRUCAO: &str = "tipoConstrucao";
    pub const DIVISAO_NAO_CLIM1: &str = "divisaoNaoClima1";
    pub const DIVISAO_NAO_CLIM2: &str = "divisaoNaoClima2";
    pub const DIVISAO_CLIM1: &str = "divisaoClima1";
    pub const DIVISAO_CLIM2: &str = "divisaoClima2";
    pub const DISSIPACAO: &str = "dissipacao";
    pub const NUM_PESSOAS: &str = "numPessoas";
    pub const NUM_PORTAS_DUPLAS: &str = "numPortasDuplas";
    pub const NUM_PORTAS_SIMPLES: &str = "numPortasSimples";
    pub const PRESSURIZACAO: &str = "pressurizacao";
    pub const BACKUP: &str = "backup";
}

/// Collects coercion warnings while reading fields.
struct FieldReader<'a> {
    fields: &'a HashMap<String, String>,
    warnings: Vec<CalcError>,
}

impl<'a> FieldReader<'a> {
    /// Non-negative decimal; blank or absent means 0 without a warning.
    fn number(&mut self, name: &str) -> f64 {
        let fields = self.fields;
        let raw = match fields.get(name).map(|s| s.trim()) {
            Some(s) if !s.is_empty() => s,
            _ => return 0.0,
        };
        match raw.replace(',', ".").parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => v,
            Ok(_) => self.reject(name, raw, "Value must be a non-negative number"),
            Err(_) => self.reject(name, raw, "Value is not a number"),
        }
    }

    /// Non-negative whole count; fractions are truncated.
    fn count(&mut self, name: &str) -> u32 {
        let v = self.number(name);
        if v > u32::MAX as f64 {
            return u32::MAX;
        }
        v.trunc() as u32
    }

    fn text(&self, name: &str) -> &str {
        self.fields.get(name).map(|s| s.as_str()).unwrap_or("")
    }

    fn reject(&mut self, name: &str, raw: &str, reason: &str) -> f64 {
        warn!(field = name, value = raw, "{}; using 0", reason);
        self.warnings
            .push(CalcError::invalid_input(name, raw, reason));
        0.0
    }
}

impl RoomClimateInput {
    /// Build an input from the flat string map the form layer produces.
    ///
    /// Malformed fields never abort: they become 0 and are reported back.
    pub fn from_fields(fields: &HashMap<String, String>) -> ParsedInput {
        let mut r = FieldReader {
            fields,
            warnings: Vec::new(),
        };

        let input = RoomClimateInput {
            area_m2: r.number(field::AREA),
            wall_oeste_m: r.number(field::PAREDE_OESTE),
            wall_leste_m: r.number(field::PAREDE_LESTE),
            wall_norte_m: r.number(field::PAREDE_NORTE),
            wall_sul_m: r.number(field::PAREDE_SUL),
            ceiling_height_m: r.number(field::PE_DIREITO),
            construction: ConstructionType::parse(r.text(field::TIPO_CONSTRUCAO)),
            partition_nao_clim1_m2: r.number(field::DIVISAO_NAO_CLIM1),
            partition_nao_clim2_m2: r.number(field::DIVISAO_NAO_CLIM2),
            partition_clim1_m2: r.number(field::DIVISAO_CLIM1),
            partition_clim2_m2: r.number(field::DIVISAO_CLIM2),
            dissipation_w: r.number(field::DISSIPACAO),
            occupants: r.count(field::NUM_PESSOAS),
            double_doors: r.count(field::NUM_PORTAS_DUPLAS),
            single_doors: r.count(field::NUM_PORTAS_SIMPLES),
            pressurization_pa: r.number(field::PRESSURIZACAO),
            backup: BackupPolicy::parse(r.text(field::BACKUP)),
        };

        ParsedInput {
            input,
            warnings: r.warnings,
        }
    }
}

/// Capacity-stage inputs; only present when the room shows the capacity table.
///
/// The redundancy tier is not here: it is the room's own selector,
/// [`RoomClimateInput::backup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityInputs {
    /// Load typed in by the user; wins over the computed TR when usable
    pub estimated_load_override_tr: Option<f64>,

    /// Safety factor in percent (e.g. 10 for 10 %)
    pub safety_factor_percent: f64,

    /// Capacity of one unit (TR), normally from [`crate::calculations::capacity::UNIT_CAPACITY_MENU_TR`]
    pub unit_capacity_tr: f64,
}

impl Default for CapacityInputs {
    fn default() -> Self {
        CapacityInputs {
            estimated_load_override_tr: None,
            safety_factor_percent: 10.0,
            unit_capacity_tr: 1.0,
        }
    }
}

impl CapacityInputs {
    /// Pick the load the solver should size for.
    ///
    /// A finite, non-negative override wins; otherwise the computed TR.
    pub fn effective_load_tr(&self, computed_tr: f64) -> f64 {
        match self.estimated_load_override_tr {
            Some(v) if v.is_finite() && v >= 0.0 => v,
            Some(v) => {
                warn!(value = v, "ignoring unusable estimated-load override");
                computed_tr
            }
            None => computed_tr,
        }
    }
}

/// Snapshot of one room's inputs taken at the start of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub climate: RoomClimateInput,
    pub capacity: Option<CapacityInputs>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_backup_policy_parse() {
        assert_eq!(BackupPolicy::parse("n"), BackupPolicy::N);
        assert_eq!(BackupPolicy::parse("N+1"), BackupPolicy::NPlusOne);
        assert_eq!(BackupPolicy::parse(" n + 2 "), BackupPolicy::NPlusTwo);
        assert_eq!(BackupPolicy::parse("n+3"), BackupPolicy::N);
        assert_eq!(BackupPolicy::parse(""), BackupPolicy::N);
    }

    #[test]
    fn test_backup_policy_serialization() {
        let json = serde_json::to_string(&BackupPolicy::NPlusOne).unwrap();
        assert_eq!(json, "\"n+1\"");
        let back: BackupPolicy = serde_json::from_str("\"n+2\"").unwrap();
        assert_eq!(back, BackupPolicy::NPlusTwo);
    }

    #[test]
    fn test_construction_u_values() {
        assert_eq!(ConstructionType::parse("ALVENARIA").u_values().ceiling, 3.961);
        assert_eq!(ConstructionType::parse("eletrocentro").u_values().wall, 1.12);
        let none = ConstructionType::parse("");
        assert_eq!(none, ConstructionType::Unspecified);
        assert_eq!(none.u_values().wall, 0.0);
        assert_eq!(none.u_values().ceiling, 0.0);
    }

    #[test]
    fn test_from_fields_coerces_bad_values() {
        let parsed = RoomClimateInput::from_fields(&fields(&[
            (field::AREA, "abc"),
            (field::PE_DIREITO, "-3"),
            (field::NUM_PESSOAS, "2.7"),
            (field::PRESSURIZACAO, "25"),
            (field::BACKUP, "n+1"),
        ]));
        assert_eq!(parsed.input.area_m2, 0.0);
        assert_eq!(parsed.input.ceiling_height_m, 0.0);
        assert_eq!(parsed.input.occupants, 2);
        assert_eq!(parsed.input.pressurization_pa, 25.0);
        assert_eq!(parsed.input.backup, BackupPolicy::NPlusOne);
        assert_eq!(parsed.warnings.len(), 2);
        assert!(parsed.warnings.iter().all(|w| w.error_code() == "INVALID_INPUT"));
    }

    #[test]
    fn test_from_fields_blank_is_silent_zero() {
        let parsed = RoomClimateInput::from_fields(&fields(&[(field::AREA, "  ")]));
        assert_eq!(parsed.input, RoomClimateInput::default());
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_effective_load_override() {
        let mut cap = CapacityInputs::default();
        assert_eq!(cap.effective_load_tr(7.0), 7.0);
        cap.estimated_load_override_tr = Some(12.0);
        assert_eq!(cap.effective_load_tr(7.0), 12.0);
        cap.estimated_load_override_tr = Some(f64::NAN);
        assert_eq!(cap.effective_load_tr(7.0), 7.0);
        cap.estimated_load_override_tr = Some(-1.0);
        assert_eq!(cap.effective_load_tr(7.0), 7.0);
    }

    #[test]
    fn test_input_serialization_defaults() {
        let json = r#"{ "area_m2": 20.0, "construction": "eletrocentro" }"#;
        let input: RoomClimateInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.area_m2, 20.0);
        assert_eq!(input.construction, ConstructionType::Eletrocentro);
        assert_eq!(input.backup, BackupPolicy::N);
    }
}
