//! # clima_core - HVAC Sizing Engine for Technical Rooms
//!
//! `clima_core` sizes the air conditioning of technical rooms (electrical
//! rooms, panel rooms, "eletrocentros"): how much makeup air holds the room
//! pressurized, how much heat enters it, and how many cooling units carry
//! that heat with the chosen redundancy.
//!
//! ## Design Philosophy
//!
//! - **Pure stages**: every calculation is a function of its inputs plus the
//!   constants table
//! - **JSON-First**: inputs, results and errors implement Serialize/Deserialize
//! - **Never guess**: a calculation refuses to run on a partial constants table
//! - **Rich Errors**: structured error types with a severity
//!
//! ## Quick Start
//!
//! ```rust
//! use clima_core::calculations::capacity::solve_capacity;
//! use clima_core::room::BackupPolicy;
//!
//! // 18 TR load, 10 % safety, 5 TR units, one spare
//! let solution = solve_capacity(18.0, 10.0, 5.0, BackupPolicy::NPlusOne);
//! assert_eq!(solution.operating_units, 4);
//! assert_eq!(solution.total_units, 5);
//! assert_eq!(solution.margin_percent, 11.1);
//! ```
//!
//! ## Modules
//!
//! - [`calculations`] - Airflow, thermal gains and capacity stages
//! - [`constants`] - Constants table, registry and readiness gate
//! - [`room`] - Room inputs and form-field parsing
//! - [`orchestrator`] - Debounced per-room recompute
//! - [`record`] - Persisted room snapshots
//! - [`http`] - Backend adapters (constants fetch, record upload)
//! - [`file_io`] - Local record storage with atomic saves and locking
//! - [`units`] - Type-safe unit wrappers
//! - [`errors`] - Structured error types
//! - [`logging`] - `tracing` subscriber setup

pub mod calculations;
pub mod constants;
pub mod errors;
#[cfg(not(target_arch = "wasm32"))]
pub mod file_io;
pub mod http;
pub mod logging;
pub mod orchestrator;
pub mod record;
pub mod room;
pub mod units;

// Re-export commonly used types at crate root for convenience
pub use calculations::{AirflowResult, CapacitySolution, RoomResults, ThermalGainsResult};
pub use constants::{ConstantKey, ConstantsRegistry, SystemConstants};
pub use errors::{CalcError, CalcResult, Severity};
pub use orchestrator::{DisplaySink, InputProvider, Orchestrator, OrchestratorConfig, RoomState};
pub use record::{PersistenceSink, RoomRecord};
pub use room::{BackupPolicy, CapacityInputs, ConstructionType, RoomClimateInput, RoomId, RoomSnapshot};
