//! # Recompute Orchestrator
//!
//! Keeps every room's results in step with its inputs. Each room gets its own
//! actor task fed by an event channel, so rooms never wait on one another.
//!
//! ## Room Lifecycle
//!
//! ```text
//!            input change              timer expires
//!   Idle ─────────────────▶ PendingDebounce ─────────────▶ Computing
//!    ▲                        │  ▲   │ change: restart timer    │
//!    │                        │  └───┘                          │
//!    └────────────────────────┼─────────────────────────────────┘
//!                             │ remove                  chain done
//!                             ▼
//!                          Removed
//! ```
//!
//! A run snapshots the room's inputs the moment it starts, waits for the
//! constants registry, then runs Airflow → Thermal Gains → Capacity (the last only when the room has
//! capacity inputs). Changes that arrive while a run is in flight are kept
//! and collapse into exactly one follow-up run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clima_core::constants::ConstantsRegistry;
//! use clima_core::orchestrator::{DisplaySink, InputProvider, Orchestrator, OrchestratorConfig};
//! use clima_core::room::RoomId;
//!
//! # async fn demo(inputs: Arc<dyn InputProvider>, display: Arc<dyn DisplaySink>) {
//! let registry = Arc::new(ConstantsRegistry::new());
//! let orchestrator = Orchestrator::new(OrchestratorConfig::default(), registry, inputs, display);
//!
//! let room = RoomId::from("sala-101");
//! orchestrator.run_now(&room);              // initial page load
//! orchestrator.notify_input_changed(&room); // every keystroke
//! orchestrator.shutdown().await;
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::{SendError, TryRecvError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::calculations::{
    airflow, compute_thermal_gains, solve_capacity, AirflowResult, CapacitySolution, RoomResults, Stage,
    ThermalGainsResult,
};
use crate::constants::{ConstantsRegistry, ReadinessPolicy};
use crate::errors::{CalcError, CalcResult};
use crate::record::{PersistenceSink, RoomRecord};
use crate::room::{RoomId, RoomSnapshot};

// ============================================================================
// Configuration
// ============================================================================

/// Orchestrator tuning.
///
/// ## JSON Example
///
/// ```json
/// {
///   "debounce_ms": 400,
///   "readiness": { "max_attempts": 100, "interval_ms": 200 },
///   "persist_capacity": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Quiet period after the last input change before a run starts
    pub debounce_ms: u64,

    /// How long a run waits for the constants registry
    pub readiness: ReadinessPolicy,

    /// Save a room record after each run that produced a capacity solution
    pub persist_capacity: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            debounce_ms: 400,
            readiness: ReadinessPolicy::default(),
            persist_capacity: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Parse a config; absent fields take their defaults.
    pub fn from_json(json: &str) -> CalcResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// Seams
// ============================================================================

/// Reads a room's current inputs. Called once at the start of every run.
pub trait InputProvider: Send + Sync {
    fn collect_inputs(&self, room: &RoomId) -> CalcResult<RoomSnapshot>;
}

/// Receives results as each stage finishes.
///
/// Returning [`CalcError::ElementMissing`] means the room has nowhere to show
/// that result; the write is skipped and the run carries on.
pub trait DisplaySink: Send + Sync {
    fn on_airflow_computed(&self, room: &RoomId, result: &AirflowResult) -> CalcResult<()>;

    fn on_thermal_gains_computed(&self, room: &RoomId, result: &ThermalGainsResult) -> CalcResult<()>;

    fn on_capacity_solved(&self, room: &RoomId, solution: &CapacitySolution) -> CalcResult<()>;

    /// Surface an error; [`CalcError::severity`] decides alert vs. toast.
    fn on_error(&self, room: &RoomId, error: &CalcError);
}

// ============================================================================
// Room state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Idle,
    PendingDebounce,
    Computing,
    Removed,
}

impl RoomState {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomState::Idle => "idle",
            RoomState::PendingDebounce => "pending_debounce",
            RoomState::Computing => "computing",
            RoomState::Removed => "removed",
        }
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomEvent {
    InputChanged,
    RunNow,
    Remove,
}

/// What the actor does once a run has finished.
enum AfterRun {
    Wait,
    Rerun(RoomEvent),
    Stop,
}

// ============================================================================
// Run chain
// ============================================================================

/// Everything a room actor needs; shared by all rooms.
#[derive(Clone)]
struct Shared {
    config: OrchestratorConfig,
    registry: Arc<ConstantsRegistry>,
    inputs: Arc<dyn InputProvider>,
    display: Arc<dyn DisplaySink>,
    persistence: Option<Arc<dyn PersistenceSink>>,
}

impl Shared {
    async fn run_chain(&self, room: &RoomId) -> RoomResults {
        let mut results = RoomResults::default();

        // Inputs are snapshotted when the run starts, before any wait
        let snapshot = match self.inputs.collect_inputs(room) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(room = %room, error = %e, "could not read room inputs");
                self.display.on_error(room, &e);
                return results;
            }
        };

        let constants = match self.registry.wait_ready(self.config.readiness).await {
            Ok(constants) => constants,
            Err(e) => {
                error!(room = %room, error = %e, "run aborted: constants never became ready");
                self.display.on_error(room, &e);
                return results;
            }
        };
        let climate = &snapshot.climate;

        let flow = match airflow::calculate(
            climate.double_doors,
            climate.single_doors,
            climate.pressurization_pa,
            &constants,
        ) {
            Ok(flow) => flow,
            Err(e) => {
                self.stage_failed(room, Stage::Airflow, &e);
                return results;
            }
        };
        debug!(room = %room, flow_lps = flow.flow_lps, "airflow computed");
        results.airflow = Some(flow);
        self.deliver(room, Stage::Airflow, self.display.on_airflow_computed(room, &flow));

        let gains = match compute_thermal_gains(climate, flow.flow_lps, &constants) {
            Ok(gains) => gains,
            Err(e) => {
                self.stage_failed(room, Stage::ThermalGains, &e);
                return results;
            }
        };
        debug!(
            room = %room,
            total_w = gains.totals.geral_w,
            total_tr = gains.totals.geral_tr,
            "thermal gains computed"
        );
        results.thermal_gains = Some(gains);
        self.deliver(room, Stage::ThermalGains, self.display.on_thermal_gains_computed(room, &gains));

        let Some(capacity) = &snapshot.capacity else {
            return results;
        };
        let load_tr = capacity.effective_load_tr(gains.totals.geral_tr as f64);
        let solution = solve_capacity(
            load_tr,
            capacity.safety_factor_percent,
            capacity.unit_capacity_tr,
            climate.backup,
        );
        debug!(
            room = %room,
            operating = solution.operating_units,
            total = solution.total_units,
            margin = solution.margin_percent,
            "capacity solved"
        );
        for warning in &solution.warnings {
            self.display.on_error(room, warning);
        }
        self.deliver(room, Stage::Capacity, self.display.on_capacity_solved(room, &solution));
        results.capacity = Some(solution);

        if self.config.persist_capacity {
            self.persist(room, snapshot.clone(), results.clone());
        }
        results
    }

    fn stage_failed(&self, room: &RoomId, stage: Stage, e: &CalcError) {
        error!(room = %room, stage = %stage, error = %e, "stage failed; later stages skipped");
        self.display.on_error(room, e);
    }

    fn deliver(&self, room: &RoomId, stage: Stage, outcome: CalcResult<()>) {
        match outcome {
            Ok(()) => {}
            Err(e @ CalcError::ElementMissing { .. }) => {
                warn!(room = %room, stage = %stage, error = %e, "display element missing; skipped");
            }
            Err(e) => {
                warn!(room = %room, stage = %stage, error = %e, "display write failed");
                self.display.on_error(room, &e);
            }
        }
    }

    /// Save in the background; the run does not wait for it.
    fn persist(&self, room: &RoomId, snapshot: RoomSnapshot, results: RoomResults) {
        let Some(store) = self.persistence.clone() else {
            return;
        };
        let display = Arc::clone(&self.display);
        let record = RoomRecord::new(room.clone(), snapshot, results);

        tokio::spawn(async move {
            match store.save(&record).await {
                Ok(()) => debug!(room = %record.room_id, "room record saved"),
                Err(e) => {
                    let failure = match e {
                        e @ CalcError::PersistenceFailure { .. } => e,
                        other => CalcError::persistence_failure(record.room_id.as_str(), other.to_string()),
                    };
                    warn!(room = %record.room_id, error = %failure, "room record not saved; results kept");
                    display.on_error(&record.room_id, &failure);
                }
            }
        });
    }
}

// ============================================================================
// Room actor
// ============================================================================

struct RoomActor {
    room: RoomId,
    shared: Arc<Shared>,
    events: mpsc::UnboundedReceiver<RoomEvent>,
    state: watch::Sender<RoomState>,
}

impl RoomActor {
    async fn run(mut self) {
        let mut carried: Option<RoomEvent> = None;

        loop {
            let event = match carried.take() {
                Some(event) => event,
                None => match self.events.recv().await {
                    Some(event) => event,
                    None => break,
                },
            };

            let proceed = match event {
                RoomEvent::InputChanged => self.debounce().await,
                RoomEvent::RunNow => true,
                RoomEvent::Remove => false,
            };
            if !proceed {
                break;
            }

            self.state.send_replace(RoomState::Computing);
            let results = self.shared.run_chain(&self.room).await;
            self.state.send_replace(RoomState::Idle);
            debug!(room = %self.room, last_stage = ?results.last_stage(), "run finished");

            match self.drain() {
                AfterRun::Wait => {}
                AfterRun::Rerun(event) => carried = Some(event),
                AfterRun::Stop => break,
            }
        }

        self.state.send_replace(RoomState::Removed);
        debug!(room = %self.room, "room actor stopped");
    }

    /// Wait out the quiet period, restarting it on every new change.
    ///
    /// Returns `false` when the room is removed before the timer fires.
    async fn debounce(&mut self) -> bool {
        self.state.send_replace(RoomState::PendingDebounce);
        let quiet = self.shared.config.debounce();
        let mut coalesced = 1u32;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(quiet) => {
                    debug!(room = %self.room, coalesced, "debounce elapsed");
                    return true;
                }
                next = self.events.recv() => match next {
                    Some(RoomEvent::InputChanged) => coalesced += 1,
                    Some(RoomEvent::RunNow) => return true,
                    Some(RoomEvent::Remove) | None => return false,
                },
            }
        }
    }

    /// Collapse whatever arrived during the run into at most one follow-up.
    fn drain(&mut self) -> AfterRun {
        let mut pending: Option<RoomEvent> = None;
        loop {
            match self.events.try_recv() {
                Ok(RoomEvent::InputChanged) => {
                    pending.get_or_insert(RoomEvent::InputChanged);
                }
                Ok(RoomEvent::RunNow) => pending = Some(RoomEvent::RunNow),
                Ok(RoomEvent::Remove) | Err(TryRecvError::Disconnected) => return AfterRun::Stop,
                Err(TryRecvError::Empty) => break,
            }
        }
        match pending {
            Some(event) => AfterRun::Rerun(event),
            None => AfterRun::Wait,
        }
    }
}

struct RoomHandle {
    events: mpsc::UnboundedSender<RoomEvent>,
    state: watch::Receiver<RoomState>,
    task: JoinHandle<()>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Per-room debounced recompute scheduler.
///
/// Room actors are spawned on the current Tokio runtime, so the event
/// methods must be called from within one.
pub struct Orchestrator {
    shared: Arc<Shared>,
    rooms: Mutex<HashMap<RoomId, RoomHandle>>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<ConstantsRegistry>,
        inputs: Arc<dyn InputProvider>,
        display: Arc<dyn DisplaySink>,
    ) -> Self {
        Orchestrator {
            shared: Arc::new(Shared {
                config,
                registry,
                inputs,
                display,
                persistence: None,
            }),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a persistence sink. Rooms already running keep the old setup.
    pub fn with_persistence(self, sink: Arc<dyn PersistenceSink>) -> Self {
        let mut shared = (*self.shared).clone();
        shared.persistence = Some(sink);
        Orchestrator {
            shared: Arc::new(shared),
            rooms: self.rooms,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    /// An input of `room` changed; schedule a debounced run.
    pub fn notify_input_changed(&self, room: &RoomId) {
        self.send(room, RoomEvent::InputChanged);
    }

    /// Run `room` now, skipping the debounce. Supersedes a pending timer;
    /// queued behind a run already in flight.
    pub fn run_now(&self, room: &RoomId) {
        self.send(room, RoomEvent::RunNow);
    }

    /// Stop tracking `room`. A pending run is dropped; a run already in
    /// flight finishes. Returns `false` for unknown rooms.
    pub fn remove_room(&self, room: &RoomId) -> bool {
        match self.lock_rooms().remove(room) {
            Some(handle) => {
                // A closed channel means the actor is already gone
                let _ = handle.events.send(RoomEvent::Remove);
                info!(room = %room, "room removed");
                true
            }
            None => false,
        }
    }

    /// Current state of `room`, or `None` if it is not tracked.
    pub fn room_state(&self, room: &RoomId) -> Option<RoomState> {
        self.lock_rooms().get(room).map(|handle| *handle.state.borrow())
    }

    pub fn rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self.lock_rooms().keys().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Remove every room and wait for in-flight runs to finish.
    pub async fn shutdown(&self) {
        let handles: Vec<(RoomId, RoomHandle)> = self.lock_rooms().drain().collect();
        info!(rooms = handles.len(), "shutting down orchestrator");

        for (room, handle) in handles {
            let RoomHandle { events, task, .. } = handle;
            let _ = events.send(RoomEvent::Remove);
            drop(events);
            if let Err(e) = task.await {
                warn!(room = %room, error = %e, "room actor ended abnormally");
            }
        }
    }

    fn send(&self, room: &RoomId, event: RoomEvent) {
        let mut rooms = self.lock_rooms();

        let event = match rooms.get(room) {
            Some(handle) => match handle.events.send(event) {
                Ok(()) => return,
                Err(SendError(event)) => {
                    warn!(room = %room, "room actor gone; restarting it");
                    event
                }
            },
            None => event,
        };

        let handle = self.spawn_actor(room);
        // Fresh channel whose receiver is owned by the task just spawned
        let _ = handle.events.send(event);
        rooms.insert(room.clone(), handle);
    }

    fn spawn_actor(&self, room: &RoomId) -> RoomHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(RoomState::Idle);

        let actor = RoomActor {
            room: room.clone(),
            shared: Arc::clone(&self.shared),
            events: events_rx,
            state: state_tx,
        };
        debug!(room = %room, "spawning room actor");

        RoomHandle {
            events: events_tx,
            state: state_rx,
            task: tokio::spawn(actor.run()),
        }
    }

    fn lock_rooms(&self) -> MutexGuard<'_, HashMap<RoomId, RoomHandle>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculations::compute_airflow;
    use crate::constants::sample_constants;
    use crate::errors::Severity;
    use crate::room::{BackupPolicy, CapacityInputs, ConstructionType, RoomClimateInput};
    use async_trait::async_trait;
    use tokio::time::{sleep, Instant};

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct ScriptedInputs {
        rooms: Mutex<HashMap<RoomId, RoomSnapshot>>,
        reads: Mutex<Vec<(RoomId, Instant)>>,
    }

    impl ScriptedInputs {
        fn set(&self, room: &RoomId, snapshot: RoomSnapshot) {
            self.rooms.lock().unwrap().insert(room.clone(), snapshot);
        }

        fn reads_for(&self, room: &RoomId) -> Vec<Instant> {
            self.reads
                .lock()
                .unwrap()
                .iter()
                .filter(|(r, _)| r == room)
                .map(|(_, at)| *at)
                .collect()
        }
    }

    impl InputProvider for ScriptedInputs {
        fn collect_inputs(&self, room: &RoomId) -> CalcResult<RoomSnapshot> {
            self.reads.lock().unwrap().push((room.clone(), Instant::now()));
            self.rooms
                .lock()
                .unwrap()
                .get(room)
                .cloned()
                .ok_or_else(|| CalcError::missing_field(room.as_str()))
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Airflow(u32),
        Gains(ThermalGainsResult),
        Capacity(CapacitySolution),
        Error(CalcError),
    }

    #[derive(Default)]
    struct RecordingDisplay {
        seen: Mutex<Vec<(RoomId, Seen)>>,
        no_airflow_element: bool,
    }

    impl RecordingDisplay {
        fn push(&self, room: &RoomId, seen: Seen) {
            self.seen.lock().unwrap().push((room.clone(), seen));
        }

        fn seen_for(&self, room: &RoomId) -> Vec<Seen> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter(|(r, _)| r == room)
                .map(|(_, s)| s.clone())
                .collect()
        }

        fn gains(&self, room: &RoomId) -> Vec<ThermalGainsResult> {
            self.seen_for(room)
                .into_iter()
                .filter_map(|s| match s {
                    Seen::Gains(g) => Some(g),
                    _ => None,
                })
                .collect()
        }

        fn capacities(&self, room: &RoomId) -> Vec<CapacitySolution> {
            self.seen_for(room)
                .into_iter()
                .filter_map(|s| match s {
                    Seen::Capacity(c) => Some(c),
                    _ => None,
                })
                .collect()
        }

        fn errors(&self, room: &RoomId) -> Vec<CalcError> {
            self.seen_for(room)
                .into_iter()
                .filter_map(|s| match s {
                    Seen::Error(e) => Some(e),
                    _ => None,
                })
                .collect()
        }
    }

    impl DisplaySink for RecordingDisplay {
        fn on_airflow_computed(&self, room: &RoomId, result: &AirflowResult) -> CalcResult<()> {
            if self.no_airflow_element {
                return Err(CalcError::element_missing(room.as_str(), "vazao"));
            }
            self.push(room, Seen::Airflow(result.flow_lps));
            Ok(())
        }

        fn on_thermal_gains_computed(&self, room: &RoomId, result: &ThermalGainsResult) -> CalcResult<()> {
            self.push(room, Seen::Gains(*result));
            Ok(())
        }

        fn on_capacity_solved(&self, room: &RoomId, solution: &CapacitySolution) -> CalcResult<()> {
            self.push(room, Seen::Capacity(solution.clone()));
            Ok(())
        }

        fn on_error(&self, room: &RoomId, error: &CalcError) {
            self.push(room, Seen::Error(error.clone()));
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<Vec<RoomRecord>>,
    }

    #[async_trait]
    impl PersistenceSink for MemoryStore {
        async fn save(&self, record: &RoomRecord) -> CalcResult<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl PersistenceSink for FailingStore {
        async fn save(&self, record: &RoomRecord) -> CalcResult<()> {
            Err(CalcError::network(format!("/salas/{}", record.room_id), "connection refused"))
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        inputs: Arc<ScriptedInputs>,
        display: Arc<RecordingDisplay>,
        registry: Arc<ConstantsRegistry>,
    }

    impl Harness {
        fn build(config: OrchestratorConfig, display: RecordingDisplay, store: Option<Arc<dyn PersistenceSink>>) -> Self {
            let inputs = Arc::new(ScriptedInputs::default());
            let display = Arc::new(display);
            let registry = Arc::new(ConstantsRegistry::new());
            let mut orchestrator = Orchestrator::new(
                config,
                Arc::clone(&registry),
                Arc::clone(&inputs) as Arc<dyn InputProvider>,
                Arc::clone(&display) as Arc<dyn DisplaySink>,
            );
            if let Some(store) = store {
                orchestrator = orchestrator.with_persistence(store);
            }
            Harness {
                orchestrator,
                inputs,
                display,
                registry,
            }
        }

        fn new() -> Self {
            Self::build(OrchestratorConfig::default(), RecordingDisplay::default(), None)
        }

        fn ready() -> Self {
            let h = Self::new();
            h.registry.populate(sample_constants());
            h
        }
    }

    fn climate(area: f64) -> RoomClimateInput {
        RoomClimateInput {
            area_m2: area,
            wall_oeste_m: 5.0,
            ceiling_height_m: 3.0,
            construction: ConstructionType::Alvenaria,
            dissipation_w: 1500.0,
            occupants: 2,
            double_doors: 1,
            single_doors: 1,
            pressurization_pa: 25.0,
            ..Default::default()
        }
    }

    fn snapshot(area: f64) -> RoomSnapshot {
        RoomSnapshot {
            climate: climate(area),
            capacity: None,
        }
    }

    fn expected_gains(area: f64) -> ThermalGainsResult {
        let constants = sample_constants();
        let input = climate(area);
        let flow = compute_airflow(input.double_doors, input.single_doors, input.pressurization_pa, &constants).unwrap();
        compute_thermal_gains(&input, flow, &constants).unwrap()
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    // ------------------------------------------------------------------
    // Debounce
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_rapid_changes_coalesce_into_one_run() {
        let h = Harness::ready();
        let room = RoomId::from("sala-1");

        for area in [10.0, 20.0, 30.0, 40.0, 50.0] {
            h.inputs.set(&room, snapshot(area));
            h.orchestrator.notify_input_changed(&room);
            sleep(ms(100)).await;
        }
        assert_eq!(h.orchestrator.room_state(&room), Some(RoomState::PendingDebounce));
        assert!(h.inputs.reads_for(&room).is_empty());

        sleep(ms(1000)).await;
        assert_eq!(h.inputs.reads_for(&room).len(), 1);
        assert_eq!(h.display.gains(&room), vec![expected_gains(50.0)]);
        assert_eq!(h.orchestrator.room_state(&room), Some(RoomState::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_starts_after_quiet_period() {
        let h = Harness::ready();
        let room = RoomId::from("sala-1");
        h.inputs.set(&room, snapshot(20.0));

        let start = Instant::now();
        h.orchestrator.notify_input_changed(&room);
        sleep(ms(300)).await;
        assert!(h.inputs.reads_for(&room).is_empty());

        sleep(ms(500)).await;
        let reads = h.inputs.reads_for(&room);
        assert_eq!(reads.len(), 1);
        let waited = reads[0] - start;
        assert!(waited >= ms(400) && waited < ms(450), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_during_compute_triggers_one_more_run() {
        let h = Harness::new();
        let room = RoomId::from("sala-1");
        h.inputs.set(&room, snapshot(20.0));

        h.orchestrator.notify_input_changed(&room);
        // Debounce has fired; the run is parked on the readiness gate
        sleep(ms(500)).await;
        assert_eq!(h.orchestrator.room_state(&room), Some(RoomState::Computing));

        h.inputs.set(&room, snapshot(35.0));
        h.orchestrator.notify_input_changed(&room);
        h.orchestrator.notify_input_changed(&room);
        h.registry.populate(sample_constants());

        sleep(ms(2000)).await;
        assert_eq!(h.inputs.reads_for(&room).len(), 2);
        // The parked run keeps the values it started with
        assert_eq!(h.display.gains(&room), vec![expected_gains(20.0), expected_gains(35.0)]);
        assert_eq!(h.orchestrator.room_state(&room), Some(RoomState::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_now_skips_debounce() {
        let h = Harness::ready();
        let room = RoomId::from("sala-1");
        h.inputs.set(&room, snapshot(20.0));

        let start = Instant::now();
        h.orchestrator.run_now(&room);
        sleep(ms(10)).await;

        let reads = h.inputs.reads_for(&room);
        assert_eq!(reads.len(), 1);
        assert!(reads[0] - start < ms(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_now_supersedes_pending_timer() {
        let h = Harness::ready();
        let room = RoomId::from("sala-1");
        h.inputs.set(&room, snapshot(20.0));

        h.orchestrator.notify_input_changed(&room);
        sleep(ms(100)).await;
        h.orchestrator.run_now(&room);
        sleep(ms(1000)).await;

        assert_eq!(h.inputs.reads_for(&room).len(), 1);
    }

    // ------------------------------------------------------------------
    // Readiness
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_readiness_timeout_is_blocking() {
        let config = OrchestratorConfig {
            readiness: ReadinessPolicy {
                max_attempts: 5,
                interval_ms: 200,
            },
            ..Default::default()
        };
        let h = Harness::build(config, RecordingDisplay::default(), None);
        let room = RoomId::from("sala-1");
        h.inputs.set(&room, snapshot(20.0));

        h.orchestrator.notify_input_changed(&room);
        sleep(ms(3000)).await;

        let errors = h.display.errors(&room);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], CalcError::NotReady { .. }));
        assert_eq!(errors[0].severity(), Severity::Blocking);
        assert_eq!(h.inputs.reads_for(&room).len(), 1);
        assert!(h.display.gains(&room).is_empty());
        assert_eq!(h.orchestrator.room_state(&room), Some(RoomState::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_constants_still_compute() {
        let h = Harness::new();
        let room = RoomId::from("sala-1");
        h.inputs.set(&room, snapshot(20.0));

        h.orchestrator.run_now(&room);
        sleep(ms(1500)).await;
        assert!(h.display.gains(&room).is_empty());

        h.registry.populate(sample_constants());
        sleep(ms(500)).await;
        assert_eq!(h.display.gains(&room).len(), 1);
        assert!(h.display.errors(&room).is_empty());
    }

    // ------------------------------------------------------------------
    // Stage chain
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_stages_reported_in_order() {
        let h = Harness::ready();
        let room = RoomId::from("sala-1");
        h.inputs.set(
            &room,
            RoomSnapshot {
                climate: climate(20.0),
                capacity: Some(CapacityInputs::default()),
            },
        );

        h.orchestrator.run_now(&room);
        sleep(ms(10)).await;

        let seen = h.display.seen_for(&room);
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[0], Seen::Airflow(_)));
        assert!(matches!(seen[1], Seen::Gains(_)));
        assert!(matches!(seen[2], Seen::Capacity(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_skipped_without_capacity_inputs() {
        let h = Harness::ready();
        let room = RoomId::from("sala-1");
        h.inputs.set(&room, snapshot(20.0));

        h.orchestrator.run_now(&room);
        sleep(ms(10)).await;

        assert_eq!(h.display.gains(&room).len(), 1);
        assert!(h.display.capacities(&room).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_uses_computed_load() {
        let h = Harness::ready();
        let room = RoomId::from("sala-1");
        h.inputs.set(
            &room,
            RoomSnapshot {
                climate: climate(20.0),
                capacity: Some(CapacityInputs::default()),
            },
        );

        h.orchestrator.run_now(&room);
        sleep(ms(10)).await;

        let computed_tr = expected_gains(20.0).totals.geral_tr as f64;
        let solutions = h.display.capacities(&room);
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].estimated_load_tr, computed_tr);
        assert!(solutions[0].covers_load());
    }

    #[tokio::test(start_paused = true)]
    async fn test_estimated_load_override_wins() {
        let h = Harness::ready();
        let room = RoomId::from("sala-1");
        h.inputs.set(
            &room,
            RoomSnapshot {
                climate: RoomClimateInput {
                    backup: BackupPolicy::NPlusOne,
                    ..climate(20.0)
                },
                capacity: Some(CapacityInputs {
                    estimated_load_override_tr: Some(18.0),
                    safety_factor_percent: 10.0,
                    unit_capacity_tr: 5.0,
                }),
            },
        );

        h.orchestrator.run_now(&room);
        sleep(ms(10)).await;

        let solutions = h.display.capacities(&room);
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].estimated_load_tr, 18.0);
        assert_eq!(solutions[0].operating_units, 4);
        assert_eq!(solutions[0].total_units, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unusable_override_falls_back_to_computed() {
        let h = Harness::ready();
        let room = RoomId::from("sala-1");
        h.inputs.set(
            &room,
            RoomSnapshot {
                climate: climate(20.0),
                capacity: Some(CapacityInputs {
                    estimated_load_override_tr: Some(-3.0),
                    ..Default::default()
                }),
            },
        );

        h.orchestrator.run_now(&room);
        sleep(ms(10)).await;

        let computed_tr = expected_gains(20.0).totals.geral_tr as f64;
        assert_eq!(h.display.capacities(&room)[0].estimated_load_tr, computed_tr);
    }

    #[tokio::test(start_paused = true)]
    async fn test_room_backup_selector_drives_spare_units() {
        let h = Harness::ready();
        let room = RoomId::from("sala-1");
        let form: HashMap<String, String> = [("area", "50"), ("peDireito", "3"), ("backup", "n+2")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let parsed = RoomClimateInput::from_fields(&form);
        assert!(parsed.warnings.is_empty());
        h.inputs.set(
            &room,
            RoomSnapshot {
                climate: parsed.input,
                capacity: Some(CapacityInputs {
                    estimated_load_override_tr: Some(18.0),
                    unit_capacity_tr: 5.0,
                    ..Default::default()
                }),
            },
        );

        h.orchestrator.run_now(&room);
        sleep(ms(10)).await;

        let solutions = h.display.capacities(&room);
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].backup, BackupPolicy::NPlusTwo);
        assert_eq!(solutions[0].operating_units, 4);
        assert_eq!(solutions[0].total_units, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_display_element_is_skipped() {
        let display = RecordingDisplay {
            no_airflow_element: true,
            ..Default::default()
        };
        let h = Harness::build(OrchestratorConfig::default(), display, None);
        h.registry.populate(sample_constants());
        let room = RoomId::from("sala-1");
        h.inputs.set(&room, snapshot(20.0));

        h.orchestrator.run_now(&room);
        sleep(ms(10)).await;

        assert_eq!(h.display.gains(&room), vec![expected_gains(20.0)]);
        assert!(h.display.errors(&room).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_inputs_reported() {
        let h = Harness::ready();
        let room = RoomId::from("sala-sem-dados");

        h.orchestrator.run_now(&room);
        sleep(ms(10)).await;

        let errors = h.display.errors(&room);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_code(), "MISSING_FIELD");
        assert!(h.display.gains(&room).is_empty());
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn capacity_snapshot() -> RoomSnapshot {
        RoomSnapshot {
            climate: climate(20.0),
            capacity: Some(CapacityInputs {
                unit_capacity_tr: 2.0,
                ..Default::default()
            }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_saved_after_capacity_run() {
        let store = Arc::new(MemoryStore::default());
        let h = Harness::build(
            OrchestratorConfig::default(),
            RecordingDisplay::default(),
            Some(Arc::clone(&store) as Arc<dyn PersistenceSink>),
        );
        h.registry.populate(sample_constants());
        let room = RoomId::from("sala-1");
        h.inputs.set(&room, capacity_snapshot());

        h.orchestrator.run_now(&room);
        sleep(ms(10)).await;

        let records = store.records.lock().unwrap().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].room_id, room);
        assert_eq!(records[0].inputs, capacity_snapshot());
        assert_eq!(records[0].capacity, h.display.capacities(&room).first().cloned());
        assert_eq!(records[0].thermal_gains, Some(expected_gains(20.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_saved_when_disabled_or_no_capacity() {
        let store = Arc::new(MemoryStore::default());
        let config = OrchestratorConfig {
            persist_capacity: false,
            ..Default::default()
        };
        let h = Harness::build(
            config,
            RecordingDisplay::default(),
            Some(Arc::clone(&store) as Arc<dyn PersistenceSink>),
        );
        h.registry.populate(sample_constants());
        let room = RoomId::from("sala-1");
        h.inputs.set(&room, capacity_snapshot());
        h.orchestrator.run_now(&room);

        let store2 = Arc::new(MemoryStore::default());
        let h2 = Harness::build(
            OrchestratorConfig::default(),
            RecordingDisplay::default(),
            Some(Arc::clone(&store2) as Arc<dyn PersistenceSink>),
        );
        h2.registry.populate(sample_constants());
        h2.inputs.set(&room, snapshot(20.0));
        h2.orchestrator.run_now(&room);

        sleep(ms(10)).await;
        assert!(store.records.lock().unwrap().is_empty());
        assert!(store2.records.lock().unwrap().is_empty());
        assert_eq!(h.display.capacities(&room).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistence_failure_is_a_warning() {
        let h = Harness::build(
            OrchestratorConfig::default(),
            RecordingDisplay::default(),
            Some(Arc::new(FailingStore) as Arc<dyn PersistenceSink>),
        );
        h.registry.populate(sample_constants());
        let room = RoomId::from("sala-1");
        h.inputs.set(&room, capacity_snapshot());

        h.orchestrator.run_now(&room);
        sleep(ms(10)).await;

        assert_eq!(h.display.capacities(&room).len(), 1);
        let errors = h.display.errors(&room);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], CalcError::PersistenceFailure { .. }));
        assert_eq!(errors[0].severity(), Severity::Warning);
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_rooms_debounce_independently() {
        let h = Harness::ready();
        let a = RoomId::from("sala-a");
        let b = RoomId::from("sala-b");
        h.inputs.set(&a, snapshot(20.0));
        h.inputs.set(&b, snapshot(30.0));

        let start = Instant::now();
        h.orchestrator.notify_input_changed(&a);
        h.orchestrator.notify_input_changed(&b);
        sleep(ms(300)).await;
        h.orchestrator.notify_input_changed(&a);
        sleep(ms(1000)).await;

        let reads_a = h.inputs.reads_for(&a);
        let reads_b = h.inputs.reads_for(&b);
        assert_eq!(reads_a.len(), 1);
        assert_eq!(reads_b.len(), 1);
        assert!(reads_b[0] - start < ms(450));
        assert!(reads_a[0] - start >= ms(700));
        assert_eq!(h.orchestrator.rooms(), vec![a, b]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_room_never_runs() {
        let h = Harness::ready();
        let room = RoomId::from("sala-1");
        h.inputs.set(&room, snapshot(20.0));

        h.orchestrator.notify_input_changed(&room);
        sleep(ms(100)).await;
        assert!(h.orchestrator.remove_room(&room));
        assert_eq!(h.orchestrator.room_state(&room), None);
        assert!(!h.orchestrator.remove_room(&room));

        sleep(ms(1000)).await;
        assert!(h.inputs.reads_for(&room).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_every_room() {
        let h = Harness::ready();
        for name in ["sala-1", "sala-2", "sala-3"] {
            let room = RoomId::from(name);
            h.inputs.set(&room, snapshot(20.0));
            h.orchestrator.notify_input_changed(&room);
        }
        assert_eq!(h.orchestrator.rooms().len(), 3);

        h.orchestrator.shutdown().await;
        assert!(h.orchestrator.rooms().is_empty());

        sleep(ms(1000)).await;
        assert!(h.inputs.reads.lock().unwrap().is_empty());
    }

    // ------------------------------------------------------------------
    // Config
    // ------------------------------------------------------------------

    #[test]
    fn test_config_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.debounce(), ms(400));
        assert_eq!(config.readiness.max_attempts, 100);
        assert_eq!(config.readiness.interval_ms, 200);
        assert!(config.persist_capacity);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = OrchestratorConfig::from_json(r#"{ "debounce_ms": 250, "readiness": { "max_attempts": 3 } }"#).unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.readiness.max_attempts, 3);
        assert_eq!(config.readiness.interval_ms, 200);
        assert!(config.persist_capacity);

        assert!(OrchestratorConfig::from_json("not json").is_err());
    }
}
