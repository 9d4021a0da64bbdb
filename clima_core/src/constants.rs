//! # System Constants
//!
//! The named engineering coefficients the calculators read (door-flow
//! variables, design ΔT per surface, internal-gain factors, psychrometric
//! coefficients). The table is fetched once from the backend and never
//! mutated afterwards.
//!
//! ## Readiness
//!
//! Calculations never run against a partial table. [`SystemConstants::value`]
//! returns [`CalcError::NotReady`] for an absent key unless that key has a
//! literal fallback ([`ConstantKey::fallback`]); only the floor U-value and
//! floor ΔT have one.
//!
//! [`ConstantsRegistry`] is the process-wide holder. It is written exactly
//! once and exposes an async readiness gate, [`ConstantsRegistry::wait_ready`],
//! which polls on a bounded schedule until every required key is present.
//!
//! ## Example
//!
//! ```rust
//! use clima_core::constants::{ConstantKey, SystemConstants};
//!
//! let json = serde_json::json!({ "VARIAVEL_PD": 0.042, "VARIAVEL_PS": "0.024" });
//! let constants = SystemConstants::from_json(&json).unwrap();
//!
//! assert_eq!(constants.value(ConstantKey::VariavelPs).unwrap(), 0.024);
//! assert_eq!(constants.value(ConstantKey::DeltaTPiso).unwrap(), 7.5); // fallback
//! assert!(constants.value(ConstantKey::DeltaTTeto).is_err());
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::errors::{CalcError, CalcResult};

// ============================================================================
// Keys
// ============================================================================

/// Every constant the calculators know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstantKey {
    VariavelPd,
    VariavelPs,
    DeltaTTeto,
    DeltaTParedeOeste,
    DeltaTParedeLeste,
    DeltaTParedeNorte,
    DeltaTParedeSul,
    DeltaTDivisaoNaoClim1,
    DeltaTDivisaoNaoClim2,
    DeltaTDivisaoClim1,
    DeltaTDivisaoClim2,
    FatorIluminacao,
    FsIluminacao,
    FatorConversaoPainel,
    FsPaineis,
    OcupanteCalorSensivel,
    OcupanteCalorLatente,
    DensidadeAr,
    CalorEspecificoArExterno,
    DeltaTArExterno,
    FatorLatenteArExterno,
    DeltaUaArExterno,
    UValuePiso,
    DeltaTPiso,
}

impl ConstantKey {
    /// Keys that must be present before any calculation runs.
    pub const REQUIRED: [ConstantKey; 22] = [
        ConstantKey::VariavelPd,
        ConstantKey::VariavelPs,
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
    ];

    /// Keys that may be absent; the calculator substitutes a literal.
    pub const OPTIONAL: [ConstantKey; 2] = [ConstantKey::UValuePiso, ConstantKey::DeltaTPiso];

    /// Name of the key in the backend's `/constants` payload.
    pub fn name(self) -> &'static str {
        match self {
            ConstantKey::VariavelPd => "VARIAVEL_PD",
            ConstantKey::VariavelPs => "VARIAVEL_PS",
            ConstantKey::DeltaTTeto => "deltaT_teto",
            ConstantKey::DeltaTParedeOeste => "deltaT_parede_Oes",
            ConstantKey::DeltaTParedeLeste => "deltaT_parede_Les",
            ConstantKey::DeltaTParedeNorte => "deltaT_parede_Nor",
            ConstantKey::DeltaTParedeSul => "deltaT_parede_Sul",
            ConstantKey::DeltaTDivisaoNaoClim1 => "deltaT_divi_N_clim1",
            ConstantKey::DeltaTDivisaoNaoClim2 => "deltaT_divi_N_clim2",
            ConstantKey::DeltaTDivisaoClim1 => "deltaT_divi_clim1",
            ConstantKey::DeltaTDivisaoClim2 => "deltaT_divi_clim2",
            ConstantKey::FatorIluminacao => "AUX_Fator_Iluminacao",
            ConstantKey::FsIluminacao => "AUX_Fs_Iluminacao",
            ConstantKey::FatorConversaoPainel => "AUX_Fator_Conver_Painel",
            ConstantKey::FsPaineis => "AUX_Fs_Paineis",
            ConstantKey::OcupanteCalorSensivel => "AUX_OCp_Csp",
            ConstantKey::OcupanteCalorLatente => "AUX_OCp_Clp",
            ConstantKey::DensidadeAr => "Densi_ar",
            ConstantKey::CalorEspecificoArExterno => "AUX_c_ArExterno",
            ConstantKey::DeltaTArExterno => "AUX_deltaT_ArExterno",
            ConstantKey::FatorLatenteArExterno => "AUX_f_ArExterno",
            ConstantKey::DeltaUaArExterno => "AUX_deltaUa_ArExterno",
            ConstantKey::UValuePiso => "AUX_U_Value_Piso",
            ConstantKey::DeltaTPiso => "deltaT_piso",
        }
    }

    /// Literal used when the key is absent from the table.
    ///
    /// The floor ΔT fallback is 7.5 °C everywhere (the display layer used
    /// to default to 5; that value is not used).
    pub fn fallback(self) -> Option<f64> {
        match self {
            ConstantKey::UValuePiso => Some(2.7),
            ConstantKey::DeltaTPiso => Some(7.5),
            _ => None,
        }
    }
}

// ============================================================================
// Table
// ============================================================================

/// Flat `name -> value` table as delivered by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SystemConstants {
    values: BTreeMap<String, f64>,
}

impl SystemConstants {
    /// Build a table from already-numeric values.
    pub fn from_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        SystemConstants {
            values: values
                .into_iter()
                .filter(|(_, v)| v.is_finite())
                .map(|(k, v)| (k.into(), v))
                .collect(),
        }
    }

    /// Parse the flat JSON object served by `GET /constants`.
    ///
    /// Numbers and numeric strings are accepted. Anything else is dropped
    /// (and logged), so the key counts as absent.
    pub fn from_json(json: &serde_json::Value) -> CalcResult<Self> {
        let object = json.as_object().ok_or_else(|| {
            CalcError::serialization("constants payload must be a JSON object")
        })?;

        let mut values = BTreeMap::new();
        for (key, raw) in object {
            let parsed = match raw {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
                _ => None,
            };
            match parsed {
                Some(v) if v.is_finite() => {
                    values.insert(key.clone(), v);
                }
                _ => warn!(key = %key, value = %raw, "ignoring non-numeric constant"),
            }
        }
        Ok(SystemConstants { values })
    }

    /// Raw lookup by backend name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Typed lookup, applying the literal fallback where one exists.
    pub fn value(&self, key: ConstantKey) -> CalcResult<f64> {
        self.get(key.name())
            .or_else(|| key.fallback())
            .ok_or_else(|| CalcError::not_ready([key.name()]))
    }

    /// Fail with every absent key (without fallback) in one error.
    pub fn require(&self, keys: &[ConstantKey]) -> CalcResult<()> {
        let missing: Vec<&str> = keys
            .iter()
            .filter(|k| k.fallback().is_none() && self.get(k.name()).is_none())
            .map(|k| k.name())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CalcError::not_ready(missing))
        }
    }

    /// True when every required key is present.
    pub fn is_ready(&self) -> bool {
        self.require(&ConstantKey::REQUIRED).is_ok()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// Source
// ============================================================================

/// Somewhere the constants table can be fetched from.
#[async_trait]
pub trait ConstantsSource: Send + Sync {
    async fn fetch(&self) -> CalcResult<SystemConstants>;
}

#[async_trait]
impl ConstantsSource for SystemConstants {
    async fn fetch(&self) -> CalcResult<SystemConstants> {
        Ok(self.clone())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Bounded polling schedule for the readiness gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        ReadinessPolicy {
            max_attempts: 100,
            interval_ms: 200,
        }
    }
}

impl ReadinessPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Longest time the gate will wait before giving up.
    pub fn ceiling(&self) -> Duration {
        self.interval() * self.max_attempts.saturating_sub(1)
    }
}

/// Process-wide, write-once constants holder.
#[derive(Debug, Default)]
pub struct ConstantsRegistry {
    table: OnceCell<Arc<SystemConstants>>,
    ready: OnceCell<Arc<SystemConstants>>,
}

impl ConstantsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the table. Only the first call has any effect.
    pub fn populate(&self, constants: SystemConstants) -> bool {
        let count = constants.len();
        match self.table.set(Arc::new(constants)) {
            Ok(()) => {
                info!(count, "constants registry populated");
                true
            }
            Err(_) => {
                warn!("constants registry already populated; ignoring reload");
                false
            }
        }
    }

    /// Fetch from `source` and populate.
    pub async fn load_from(&self, source: &dyn ConstantsSource) -> CalcResult<()> {
        let constants = source.fetch().await?;
        self.populate(constants);
        Ok(())
    }

    /// Raw lookup; `None` before the table is loaded.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.table.get().and_then(|t| t.get(name))
    }

    /// The validated table, or `NotReady` listing what is still missing.
    pub fn snapshot(&self) -> CalcResult<Arc<SystemConstants>> {
        if let Some(ready) = self.ready.get() {
            return Ok(Arc::clone(ready));
        }
        let table = self
            .table
            .get()
            .ok_or_else(|| CalcError::not_ready(ConstantKey::REQUIRED.iter().map(|k| k.name())))?;
        table.require(&ConstantKey::REQUIRED)?;
        Ok(Arc::clone(self.ready.get_or_init(|| Arc::clone(table))))
    }

    /// Poll until the table is ready or the policy's attempts run out.
    ///
    /// Returns immediately once the registry has been validated.
    pub async fn wait_ready(&self, policy: ReadinessPolicy) -> CalcResult<Arc<SystemConstants>> {
        let attempts = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.snapshot() {
                Ok(constants) => return Ok(constants),
                Err(e) if attempt >= attempts => {
                    error!(attempts, error = %e, "constants registry not ready; giving up");
                    return Err(e);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "waiting for constants registry");
                    tokio::time::sleep(policy.interval()).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_constants() -> SystemConstants {
    SystemConstants::from_values([
        ("VARIAVEL_PD", 0.042),
        ("VARIAVEL_PS", 0.024),
        ("deltaT_teto", 20.0),
        ("deltaT_parede_Oes", 13.0),
        ("deltaT_parede_Les", 13.0),
        ("deltaT_parede_Nor", 12.0),
        ("deltaT_parede_Sul", 14.0),
        ("deltaT_divi_N_clim1", 10.0),
        ("deltaT_divi_N_clim2", 10.0),
        ("deltaT_divi_clim1", 3.0),
        ("deltaT_divi_clim2", 3.0),
        ("AUX_Fator_Iluminacao", 7.0),
        ("AUX_Fs_Iluminacao", 1.0),
        ("AUX_Fator_Conver_Painel", 1.0),
        ("AUX_Fs_Paineis", 100.0),
        ("AUX_OCp_Csp", 86.5),
        ("AUX_OCp_Clp", 133.3),
        ("Densi_ar", 1.16),
        ("AUX_c_ArExterno", 0.24),
        ("AUX_deltaT_ArExterno", 10.0),
        ("AUX_f_ArExterno", 3.01),
        ("AUX_deltaUa_ArExterno", 8.47),
        ("AUX_U_Value_Piso", 2.7),
        ("deltaT_piso", 7.5),
    ])
}
