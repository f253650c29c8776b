//! Guaranteed delivery engine: idle/delivering state machine and the
//! single delivery lane.
//!
//! The engine owns one background task (the lane) fed by a command
//! channel. Producers enqueue from any task; the lane serializes all
//! delivery attempts so at most one is in flight system-wide and events
//! are always attempted oldest-first. Retryable failures arm a one-shot
//! timer that re-enters the lane for the same head event; the
//! `canScheduleOperations` gate defers (never loses) work while the host
//! is in a lifecycle-sensitive window.
//!
//! ```text
//! enqueue ─▶ store ─▶ ┌──────┐  work/timer   ┌────────────┐
//!                     │ Idle │ ─────────────▶│ Delivering │──▶ transport
//!                     └──────┘ ◀──────── ────└────────────┘
//!                        ▲      retry timer        │
//!                        └── empty / parked ◀──────┘
//! ```

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use bytes::Bytes;
use tokio::{
    sync::{mpsc, watch, RwLock},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::EngineConfig,
    error::Result,
    event::{EventId, TrackingEvent},
    store::EventStore,
    time::Clock,
    transport::{HttpTransport, Transport},
    worker::{AttemptOutcome, DeliveryWorker},
};

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No attempt in flight; waiting for work, a timer, or the gate.
    Idle,
    /// The lane is working through pending events.
    Delivering,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Delivering => write!(f, "delivering"),
        }
    }
}

/// Counters for diagnostics and tests.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Events accepted by `enqueue`.
    pub events_enqueued: u64,
    /// Transport attempts made.
    pub attempts_made: u64,
    /// Events acknowledged by the server.
    pub delivered: u64,
    /// Retries scheduled after retryable failures.
    pub retries_scheduled: u64,
    /// Events dropped on permanent rejection.
    pub dropped: u64,
    /// Events parked after exhausting the auto-retry budget.
    pub parked: u64,
}

/// Signals feeding the delivery lane.
#[derive(Debug)]
enum Command {
    /// An event was enqueued (or the host asked for a sweep).
    WorkAvailable,
    /// The armed retry timer fired. Stale generations are ignored.
    RetryTimerFired { generation: u64 },
    /// The scheduling gate was re-enabled.
    GateOpened,
}

/// At-least-once delivery engine for tracking events.
///
/// Construct with a store and transport, call [`start`](Self::start) to
/// spawn the delivery lane, and [`shutdown`](Self::shutdown) to stop it.
/// All other methods are safe to call from any task at any time.
pub struct GuaranteedDeliveryEngine {
    store: Arc<dyn EventStore>,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    stats: Arc<RwLock<EngineStats>>,
    gate_open: Arc<AtomicBool>,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: Option<mpsc::UnboundedReceiver<Command>>,
    state_tx: Option<watch::Sender<EngineState>>,
    state_rx: watch::Receiver<EngineState>,
    cancellation_token: CancellationToken,
    lane_handle: Option<JoinHandle<()>>,
}

impl GuaranteedDeliveryEngine {
    /// Creates an engine over an explicit store and transport.
    ///
    /// Events may be enqueued before [`start`](Self::start); delivery
    /// begins once the lane is running.
    pub fn new(
        store: Arc<dyn EventStore>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(EngineState::Idle);

        Self {
            store,
            transport,
            config,
            clock,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            gate_open: Arc::new(AtomicBool::new(true)),
            command_tx,
            command_rx: Some(command_rx),
            state_tx: Some(state_tx),
            state_rx,
            cancellation_token: CancellationToken::new(),
            lane_handle: None,
        }
    }

    /// Creates a production engine with the HTTP transport built from the
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be initialized.
    pub fn with_http_transport(
        store: Arc<dyn EventStore>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::new(store, transport, config, clock))
    }

    /// Starts the delivery lane.
    ///
    /// If the store already holds pending events (process restart), the
    /// lane begins delivering immediately. Calling `start` twice is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`](crate::error::EngineError) if the
    /// initial pending check fails.
    pub async fn start(&mut self) -> Result<()> {
        let (Some(command_rx), Some(state_tx)) = (self.command_rx.take(), self.state_tx.take())
        else {
            debug!("delivery engine already started");
            return Ok(());
        };

        info!(
            retry_deadline_ms = self.config.retry_policy.retry_deadline.as_millis(),
            "starting guaranteed delivery engine"
        );

        let lane = DeliveryLane {
            store: self.store.clone(),
            worker: DeliveryWorker::new(
                self.store.clone(),
                self.transport.clone(),
                self.config.retry_policy.clone(),
                self.clock.clone(),
                self.stats.clone(),
            ),
            command_rx,
            command_tx: self.command_tx.clone(),
            state_tx,
            gate_open: self.gate_open.clone(),
            pending_intent: false,
            timer_armed: false,
            timer_generation: 0,
            cancellation_token: self.cancellation_token.clone(),
            clock: self.clock.clone(),
        };

        self.lane_handle = Some(tokio::spawn(lane.run()));

        // Resume anything left over from a previous process lifetime
        if !self.store.is_empty().await? {
            let _ = self.command_tx.send(Command::WorkAvailable);
        }

        Ok(())
    }

    /// Persists an event and notifies the lane.
    ///
    /// Never blocks on delivery; retries and failures are invisible to
    /// producers.
    ///
    /// # Errors
    ///
    /// Fails only with [`EngineError::Storage`](crate::error::EngineError)
    /// when the store cannot persist the event.
    pub async fn enqueue(&self, payload: Bytes) -> Result<EventId> {
        let event = TrackingEvent::new(payload, self.clock.now_utc());
        let id = event.id;

        self.store.enqueue(event).await?;
        self.stats.write().await.events_enqueued += 1;

        debug!(event_id = %id, "event enqueued");
        let _ = self.command_tx.send(Command::WorkAvailable);
        Ok(id)
    }

    /// Number of events still awaiting delivery.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying store.
    pub async fn pending_count(&self) -> Result<usize> {
        self.store.count().await
    }

    /// Administrative purge of every pending event.
    ///
    /// Does not interrupt an in-flight attempt; its subsequent store
    /// mutation lands as a tolerated no-op.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the underlying store.
    pub async fn erase_all(&self) -> Result<()> {
        self.store.erase_all().await
    }

    /// Toggles the scheduling gate.
    ///
    /// While disabled no new attempt starts (including timer-triggered
    /// retries); deferred intent is replayed immediately on re-enable.
    /// An attempt already in flight is not cancelled.
    pub fn set_scheduling_enabled(&self, enabled: bool) {
        let was = self.gate_open.swap(enabled, Ordering::AcqRel);
        if enabled && !was {
            let _ = self.command_tx.send(Command::GateOpened);
        }
        debug!(enabled, "scheduling gate toggled");
    }

    /// Current scheduler state snapshot.
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Watch channel following scheduler state transitions.
    pub fn watch_state(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    /// Returns current engine statistics.
    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    /// Stops the delivery lane, waiting up to the configured shutdown
    /// timeout for an in-flight attempt to finish.
    pub async fn shutdown(mut self) {
        info!("shutting down delivery engine");
        self.cancellation_token.cancel();

        if let Some(handle) = self.lane_handle.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, handle).await {
                Ok(Ok(())) => info!("delivery lane stopped"),
                Ok(Err(e)) => error!(error = %e, "delivery lane panicked"),
                Err(_) => warn!("delivery lane did not stop within shutdown timeout"),
            }
        }
    }
}

/// The single-concurrency execution lane.
///
/// Owns the scheduler state; every attempt in the process goes through
/// this task, which is what makes the single-in-flight and oldest-first
/// guarantees hold.
struct DeliveryLane {
    store: Arc<dyn EventStore>,
    worker: DeliveryWorker,
    command_rx: mpsc::UnboundedReceiver<Command>,
    command_tx: mpsc::UnboundedSender<Command>,
    state_tx: watch::Sender<EngineState>,
    gate_open: Arc<AtomicBool>,
    /// Work arrived (or a timer fired) while the gate was closed.
    pending_intent: bool,
    /// A retry timer is pending for the head event. Enqueue notifications
    /// are coalesced while set; the timer's pass drains newer work too.
    timer_armed: bool,
    /// Monotonic tag distinguishing the armed timer from stale ones.
    timer_generation: u64,
    cancellation_token: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl DeliveryLane {
    async fn run(mut self) {
        loop {
            tokio::select! {
                () = self.cancellation_token.cancelled() => break,
                command = self.command_rx.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command).await;
                },
            }
        }
        debug!("delivery lane stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::WorkAvailable => {
                if self.timer_armed {
                    // The head is waiting out a backoff; re-attempting it now
                    // would defeat the pacing. The timer's pass picks up
                    // newer events as well.
                    debug!("retry timer armed, enqueue notification coalesced");
                    return;
                }
                self.try_deliver().await;
            },
            Command::RetryTimerFired { generation } => {
                if generation == self.timer_generation {
                    self.timer_armed = false;
                    self.try_deliver().await;
                } else {
                    debug!(generation, "stale retry timer ignored");
                }
            },
            Command::GateOpened => {
                if self.pending_intent {
                    self.pending_intent = false;
                    self.try_deliver().await;
                }
            },
        }
    }

    /// Enters `Delivering` if the gate permits, otherwise records intent.
    async fn try_deliver(&mut self) {
        if !self.gate_open.load(Ordering::Acquire) {
            self.pending_intent = true;
            return;
        }
        self.deliver_pending().await;
    }

    /// The delivery loop: attempts the head event until the store drains,
    /// a retry is scheduled, an event parks, or the gate closes.
    async fn deliver_pending(&mut self) {
        let _ = self.state_tx.send(EngineState::Delivering);

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }
            if !self.gate_open.load(Ordering::Acquire) {
                // Head-of-line work remains; replay once the gate reopens
                self.pending_intent = true;
                break;
            }

            let head = match self.store.oldest_pending().await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "store unreadable, pausing delivery until next trigger");
                    break;
                },
            };

            match self.worker.attempt(head).await {
                Ok(AttemptOutcome::Delivered | AttemptOutcome::Dropped) => {
                    // Terminal outcome: move straight to the next oldest
                },
                Ok(AttemptOutcome::Retry(after)) => {
                    self.arm_retry_timer(after);
                    break;
                },
                Ok(AttemptOutcome::Parked) => {
                    // Stays stored; revisited on the next external trigger
                    break;
                },
                Err(e) => {
                    error!(error = %e, "attempt bookkeeping failed, pausing delivery");
                    break;
                },
            }
        }

        let _ = self.state_tx.send(EngineState::Idle);
    }

    /// Arms a one-shot timer re-entering the lane for the head event.
    ///
    /// Arming invalidates any previously armed timer via the generation
    /// tag, so an early external trigger never stacks extra retries.
    fn arm_retry_timer(&mut self, after: std::time::Duration) {
        self.timer_armed = true;
        self.timer_generation += 1;
        let generation = self.timer_generation;
        let clock = self.clock.clone();
        let tx = self.command_tx.clone();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = clock.sleep(after) => {
                    let _ = tx.send(Command::RetryTimerFired { generation });
                },
                () = token.cancelled() => {},
            }
        });
    }
}
