// Session context - Which page context is live, and the engines created in it
//
// A new session supersedes every player created under an older one: those
// players notice on their next liveness poll and tear themselves down.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::audio::engine::AudioEngine;

/// Identifier of a session; the first one is 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session #{}", self.0)
    }
}

struct SessionState {
    current: Cell<u64>,
    engines: RefCell<Vec<Weak<dyn AudioEngine>>>,
    interacted: Cell<bool>,
}

/// Shared handle on the session registry; clones see the same state
#[derive(Clone)]
pub struct SessionContext {
    state: Rc<SessionState>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            state: Rc::new(SessionState {
                current: Cell::new(0),
                engines: RefCell::new(Vec::new()),
                interacted: Cell::new(false),
            }),
        }
    }

    /// The live session
    pub fn current_id(&self) -> SessionId {
        SessionId(self.state.current.get())
    }

    /// Start a new session, making every earlier one stale
    pub fn begin(&self) -> SessionId {
        let next = self.state.current.get() + 1;
        self.state.current.set(next);
        log::info!("Started {}", SessionId(next));
        SessionId(next)
    }

    /// Remember an engine so `resume_all` can reach it
    pub fn register_engine(&self, engine: &Rc<dyn AudioEngine>) {
        let mut engines = self.state.engines.borrow_mut();
        engines.retain(|e| e.strong_count() > 0);
        engines.push(Rc::downgrade(engine));
    }

    /// Number of registered engines still alive
    pub fn engine_count(&self) -> usize {
        self.state
            .engines
            .borrow()
            .iter()
            .filter(|e| e.strong_count() > 0)
            .count()
    }

    /// Resume every registered engine that is still alive
    pub fn resume_all(&self) -> usize {
        let engines: Vec<Rc<dyn AudioEngine>> = self
            .state
            .engines
            .borrow()
            .iter()
            .filter_map(|e| e.upgrade())
            .collect();
        for engine in &engines {
            engine.resume();
        }
        log::debug!("Resumed {} audio engine(s)", engines.len());
        engines.len()
    }

    /// First user interaction unlocks audio: resumes all engines, once
    ///
    /// Returns `true` only for the call that actually resumed.
    pub fn notify_first_interaction(&self) -> bool {
        if self.state.interacted.replace(true) {
            return false;
        }
        self.resume_all();
        true
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
