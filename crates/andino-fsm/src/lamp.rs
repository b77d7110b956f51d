//! Active/downtime lamp controller.
//!
//! A production line terminal shows green while pieces keep arriving and red
//! once nothing has arrived for the downtime period:
//!
//! ```text
//!            input 0 rising
//!   ┌──────┐ ─────────────▶ ┌────────┐ ◀─┐ input 0 rising:
//!   │ down │                │ active │ ──┘ count, restart timer
//!   └──────┘ ◀───────────── └────────┘
//!    (red)      downtime      (green)
//! ```
//!
//! Input 1 counts secondary pieces in either state without a transition.
//! Events are fed to the machine from one task, so handlers never race.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{Result, State, StateMachine};

pub const PIN_CHANGE_EVENT: &str = "andinoio pin change";
pub const DOWNTIME_EVENT: &str = "downtime";
pub const DOWN: &str = "down";
pub const ACTIVE: &str = "active";

/// Input that counts pieces and keeps the line active.
const PRIMARY_INPUT: usize = 0;
const SECONDARY_INPUT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lamp {
    Green,
    Red,
}

/// Where the lamp colour goes, typically a pair of relays.
pub trait LampOutputs: Send + Sync + 'static {
    fn show(&self, lamp: Lamp);
}

/// A debounced input changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinChange {
    pub input: usize,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LampEvent {
    Pin(PinChange),
    /// Timer of the given generation expired.
    Downtime(u64),
}

impl LampEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Pin(_) => PIN_CHANGE_EVENT,
            Self::Downtime(_) => DOWNTIME_EVENT,
        }
    }
}

/// Observable state of the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LampSnapshot {
    pub state: String,
    pub pieces: u64,
    pub secondary: u64,
}

struct Shared {
    downtime: Duration,
    pieces: AtomicU64,
    secondary: AtomicU64,
    generation: AtomicU64,
    timer: Mutex<Option<JoinHandle<()>>>,
    events: mpsc::WeakUnboundedSender<LampEvent>,
}

impl Shared {
    fn timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// (Re)start the downtime timer. Older timers are aborted; one that
    /// already fired is ignored through its stale generation.
    fn restart_timer(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let downtime = self.downtime;
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(downtime).await;
            if let Some(events) = events.upgrade() {
                let _ = events.send(LampEvent::Downtime(generation));
            }
        });
        if let Some(previous) = self.timer().replace(task) {
            previous.abort();
        }
    }

    fn cancel_timer(&self) {
        if let Some(task) = self.timer().take() {
            task.abort();
        }
    }

    /// Count a rising edge. Returns whether it was a primary piece.
    fn count(&self, change: &PinChange) -> bool {
        if !change.active {
            return false;
        }
        match change.input {
            PRIMARY_INPUT => {
                self.pieces.fetch_add(1, Ordering::Relaxed);
                self.restart_timer();
                true
            }
            SECONDARY_INPUT => {
                self.secondary.fetch_add(1, Ordering::Relaxed);
                false
            }
            _ => false,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }
}

fn build_machine(shared: &Arc<Shared>, outputs: Arc<dyn LampOutputs>) -> StateMachine<LampEvent> {
    let mut fsm = StateMachine::new();

    let down_shared = Arc::clone(shared);
    let red = Arc::clone(&outputs);
    fsm.add_start_state(
        DOWN,
        State::new()
            .on(PIN_CHANGE_EVENT, move |event| match event {
                LampEvent::Pin(change) if down_shared.count(change) => Some(ACTIVE.to_string()),
                _ => None,
            })
            .on_enter(move || red.show(Lamp::Red)),
    );

    let active_shared = Arc::clone(shared);
    let downtime_shared = Arc::clone(shared);
    fsm.add_state(
        ACTIVE,
        State::new()
            .on(PIN_CHANGE_EVENT, move |event| {
                if let LampEvent::Pin(change) = event {
                    active_shared.count(change);
                }
                None
            })
            .on(DOWNTIME_EVENT, move |event| match event {
                LampEvent::Downtime(generation) if downtime_shared.is_current(*generation) => {
                    Some(DOWN.to_string())
                }
                _ => None,
            })
            .on_enter(move || outputs.show(Lamp::Green)),
    );

    fsm
}

/// Runs the lamp state machine on its own task.
///
/// ```
/// use std::time::Duration;
/// use andino_fsm::{Lamp, LampController, LampOutputs};
///
/// struct Print;
/// impl LampOutputs for Print {
///     fn show(&self, lamp: Lamp) {
///         println!("{lamp:?}");
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> andino_fsm::Result<()> {
/// let lamps = LampController::start(Print, Duration::from_secs(10))?;
/// lamps.pin_change(0, true);
/// lamps.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LampController {
    events: mpsc::UnboundedSender<LampEvent>,
    snapshot: watch::Receiver<LampSnapshot>,
    task: JoinHandle<()>,
}

impl LampController {
    /// Enter `down` and start listening for input changes.
    pub fn start(outputs: impl LampOutputs, downtime: Duration) -> Result<Self> {
        let (events, mut rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            downtime,
            pieces: AtomicU64::new(0),
            secondary: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            timer: Mutex::new(None),
            events: events.downgrade(),
        });

        let mut fsm = build_machine(&shared, Arc::new(outputs));
        fsm.run()?;

        let snapshot_of = |fsm: &StateMachine<LampEvent>, shared: &Shared| LampSnapshot {
            state: fsm.current_state().unwrap_or_default().to_string(),
            pieces: shared.pieces.load(Ordering::Relaxed),
            secondary: shared.secondary.load(Ordering::Relaxed),
        };
        let (publish, snapshot) = watch::channel(snapshot_of(&fsm, &shared));

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match fsm.send_event(event.name(), &event) {
                    Ok(Some(t)) => info!(from = %t.from, to = %t.to, "Lamp state changed"),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Lamp state machine rejected event"),
                }
                publish.send_replace(snapshot_of(&fsm, &shared));
            }
            shared.cancel_timer();
            fsm.stop();
            debug!("Lamp controller finished");
        });

        info!(downtime_ms = downtime.as_millis() as u64, "Lamp controller started");
        Ok(Self {
            events,
            snapshot,
            task,
        })
    }

    /// Feed a debounced input change.
    pub fn pin_change(&self, input: usize, active: bool) {
        if self
            .events
            .send(LampEvent::Pin(PinChange { input, active }))
            .is_err()
        {
            debug!(input, "Lamp controller gone, input change dropped");
        }
    }

    pub fn snapshot(&self) -> LampSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that is notified after every processed event.
    pub fn subscribe(&self) -> watch::Receiver<LampSnapshot> {
        self.snapshot.clone()
    }

    /// Stop the machine; the current state is exited.
    pub async fn shutdown(self) {
        drop(self.events);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Lamp controller task failed");
        }
    }
}
