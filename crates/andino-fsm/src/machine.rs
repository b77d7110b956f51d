//! Generic state machine engine.
//!
//! # Dispatch
//!
//! ```text
//! send_event(name, payload)
//!   ├─ current state has a handler for `name`? ──▶ call it
//!   ├─ else a global handler for `name`?       ──▶ call it
//!   └─ else                                    ──▶ ignored
//!
//! handler returned Some(next) and next exists:
//!   current.on_exit() ─▶ current = next ─▶ next.on_enter()
//! ```
//!
//! A handler returning `None` (or an empty name) keeps the current state.
//! Returning an unknown name fails with [`FsmError::InvalidTransition`] and
//! leaves the machine where it was.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::{FsmError, Result};

/// Number of transitions kept for inspection.
const MAX_HISTORY_SIZE: usize = 64;

/// Event handler: payload in, optional next state name out.
pub type Handler<P> = Box<dyn FnMut(&P) -> Option<String> + Send>;

type Callback = Box<dyn FnMut() + Send>;

/// A named state's behaviour.
pub struct State<P> {
    handlers: HashMap<String, Handler<P>>,
    on_enter: Option<Callback>,
    on_exit: Option<Callback>,
}

impl<P> State<P> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            on_enter: None,
            on_exit: None,
        }
    }

    /// Builder form of [`add_handler`](Self::add_handler).
    pub fn on<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&P) -> Option<String> + Send + 'static,
    {
        self.add_handler(event, handler);
        self
    }

    /// Handle `event` while in this state. Replaces an earlier handler.
    pub fn add_handler<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: FnMut(&P) -> Option<String> + Send + 'static,
    {
        self.handlers.insert(event.into(), Box::new(handler));
    }

    pub fn on_enter(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_enter = Some(Box::new(callback));
        self
    }

    pub fn on_exit(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_exit = Some(Box::new(callback));
        self
    }

    pub fn handles(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }
}

impl<P> Default for State<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for State<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        events.sort_unstable();
        f.debug_struct("State")
            .field("events", &events)
            .field("on_enter", &self.on_enter.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

/// One completed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: String,
    pub to: String,
    pub at: Instant,
}

impl StateTransition {
    fn new(from: String, to: String) -> Self {
        Self {
            from,
            to,
            at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.at.elapsed()
    }
}

/// State machine over event payloads of type `P`.
///
/// Register states, then [`run`](Self::run). Not thread-safe by itself; an
/// owner that shares it across tasks wraps it or, like
/// [`LampController`](crate::LampController), feeds it from a single task.
pub struct StateMachine<P> {
    states: HashMap<String, State<P>>,
    global_handlers: HashMap<String, Handler<P>>,
    start_state: Option<String>,
    current: Option<String>,
    history: VecDeque<StateTransition>,
}

impl<P> StateMachine<P> {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
            global_handlers: HashMap::new(),
            start_state: None,
            current: None,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    /// Register (or replace) a state.
    pub fn add_state(&mut self, name: impl Into<String>, state: State<P>) {
        self.states.insert(name.into(), state);
    }

    /// Register a state and make it the one [`run`](Self::run) enters.
    pub fn add_start_state(&mut self, name: impl Into<String>, state: State<P>) {
        let name = name.into();
        self.start_state = Some(name.clone());
        self.states.insert(name, state);
    }

    /// Handle `event` in any state without a handler of its own.
    pub fn add_global_handler<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: FnMut(&P) -> Option<String> + Send + 'static,
    {
        self.global_handlers.insert(event.into(), Box::new(handler));
    }

    /// Enter the start state.
    ///
    /// Calling `run` on a running machine restarts it: the current state is
    /// exited and the start state entered again.
    pub fn run(&mut self) -> Result<()> {
        let start = self
            .start_state
            .clone()
            .filter(|name| self.states.contains_key(name))
            .ok_or(FsmError::NoStartState)?;

        if let Some(current) = self.current.take() {
            debug!(state = %current, "Restarting state machine");
            self.fire_exit(&current);
        }
        info!(state = %start, "State machine started");
        self.current = Some(start.clone());
        self.fire_enter(&start);
        Ok(())
    }

    /// Exit the current state and stop accepting events.
    pub fn stop(&mut self) {
        if let Some(current) = self.current.take() {
            self.fire_exit(&current);
            info!(state = %current, "State machine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_state(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn start_state(&self) -> Option<&str> {
        self.start_state.as_deref()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Dispatch an event.
    ///
    /// Returns the transition taken, if any.
    ///
    /// # Errors
    ///
    /// - [`FsmError::NotStarted`] before [`run`](Self::run)
    /// - [`FsmError::InvalidTransition`] if the handler names an unknown state
    pub fn send_event(&mut self, event: &str, payload: &P) -> Result<Option<StateTransition>> {
        let current = self.current.clone().ok_or(FsmError::NotStarted)?;

        let own = self
            .states
            .get_mut(&current)
            .and_then(|state| state.handlers.get_mut(event));
        let next = match own {
            Some(handler) => handler(payload),
            None => match self.global_handlers.get_mut(event) {
                Some(handler) => handler(payload),
                None => {
                    trace!(state = %current, event, "Event not handled");
                    return Ok(None);
                }
            },
        };

        let Some(next) = next.filter(|name| !name.is_empty()) else {
            return Ok(None);
        };
        if !self.states.contains_key(&next) {
            return Err(FsmError::InvalidTransition {
                from: current,
                to: next,
            });
        }

        self.fire_exit(&current);
        self.current = Some(next.clone());
        self.fire_enter(&next);
        debug!(from = %current, to = %next, event, "State transition");

        let transition = StateTransition::new(current, next);
        if self.history.len() == MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition.clone());
        Ok(Some(transition))
    }

    fn fire_enter(&mut self, name: &str) {
        if let Some(callback) = self.states.get_mut(name).and_then(|s| s.on_enter.as_mut()) {
            callback();
        }
    }

    fn fire_exit(&mut self, name: &str) {
        if let Some(callback) = self.states.get_mut(name).and_then(|s| s.on_exit.as_mut()) {
            callback();
        }
    }
}

impl<P> Default for StateMachine<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for StateMachine<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("states", &self.states)
            .field("start_state", &self.start_state)
            .field("current", &self.current)
            .finish()
    }
}
