// Scheduler - Timing primitives that drive the player
// One-shot timers, per-frame callbacks and cancellation, on a single thread

use std::cell::RefCell;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Default frame rate of the repeating callbacks (60 fps)
pub const FRAME_INTERVAL_MS: f64 = 1000.0 / 60.0;

/// Handle of a scheduled task; cancelling a stale handle is a no-op
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// Host timing services used by the player
pub trait Scheduler {
    /// Current time of this scheduler's clock, in milliseconds
    fn now_ms(&self) -> f64;

    /// Run `task` once after `delay_ms` milliseconds
    fn schedule_once(&self, delay_ms: f64, task: Box<dyn FnOnce()>) -> TaskId;

    /// Run `tick` on every frame for as long as it returns `true`
    fn schedule_repeating(&self, tick: Box<dyn FnMut() -> bool>) -> TaskId;

    /// Cancel a pending task
    fn cancel(&self, id: TaskId);
}

struct Timer {
    id: TaskId,
    due_ms: f64,
    task: Box<dyn FnOnce()>,
}

struct FrameTask {
    id: TaskId,
    tick: Box<dyn FnMut() -> bool>,
}

#[derive(Default)]
struct LoopState {
    now_ms: f64,
    next_id: u64,
    next_frame_ms: f64,
    timers: Vec<Timer>,
    frames: Vec<FrameTask>,
    // Frame tasks taken out while a frame runs
    in_flight: HashSet<TaskId>,
    cancelled: HashSet<TaskId>,
}

impl LoopState {
    fn allocate_id(&mut self) -> TaskId {
        self.next_id += 1;
        TaskId(self.next_id)
    }

    /// Index of the earliest timer (insertion order breaks ties)
    fn next_timer(&self) -> Option<usize> {
        self.timers
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.due_ms
                    .total_cmp(&b.due_ms)
                    .then_with(|| a.id.0.cmp(&b.id.0))
            })
            .map(|(index, _)| index)
    }
}

/// Single-threaded event loop with its own clock
///
/// Time only moves through `advance_by` (virtual time, used by tests and
/// offline hosts) or `run_realtime`, which feeds it wall-clock time.
/// Callbacks run with no internal borrow held, so they may schedule or
/// cancel freely.
pub struct EventLoop {
    state: RefCell<LoopState>,
    frame_interval_ms: f64,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::with_frame_interval(FRAME_INTERVAL_MS)
    }

    pub fn with_frame_interval(frame_interval_ms: f64) -> Self {
        let frame_interval_ms = if frame_interval_ms > 0.0 {
            frame_interval_ms
        } else {
            FRAME_INTERVAL_MS
        };
        Self {
            state: RefCell::new(LoopState {
                next_frame_ms: frame_interval_ms,
                ..LoopState::default()
            }),
            frame_interval_ms,
        }
    }

    pub fn frame_interval_ms(&self) -> f64 {
        self.frame_interval_ms
    }

    /// Number of one-shot timers still waiting (including never-due ones)
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Number of live repeating tasks
    pub fn active_frame_tasks(&self) -> usize {
        let state = self.state.borrow();
        state.frames.len() + state.in_flight.len()
    }

    /// Due time of the next finite timer
    pub fn next_timer_due(&self) -> Option<f64> {
        let state = self.state.borrow();
        state
            .next_timer()
            .map(|i| state.timers[i].due_ms)
            .filter(|due| due.is_finite())
    }

    /// Move the clock forward, firing timers and frames in time order
    pub fn advance_by(&self, ms: f64) {
        let target = self.now_ms() + ms.max(0.0);

        loop {
            let (timer_due, frame_due, no_frame_tasks) = {
                let state = self.state.borrow();
                let timer_due = state.next_timer().map(|i| state.timers[i].due_ms);
                (timer_due, state.next_frame_ms, state.frames.is_empty())
            };

            // Skip over frames nobody listens to
            let horizon = timer_due.filter(|due| *due <= target).unwrap_or(target);
            if no_frame_tasks && frame_due < horizon {
                let skipped = ((horizon - frame_due) / self.frame_interval_ms).ceil();
                self.state.borrow_mut().next_frame_ms += skipped * self.frame_interval_ms;
                continue;
            }

            match timer_due {
                Some(due) if due <= target && due <= frame_due => self.fire_next_timer(),
                _ if frame_due <= target => self.run_frame(),
                _ => break,
            }
        }

        self.state.borrow_mut().now_ms = target;
    }

    /// Advance exactly to the next finite timer and fire it
    ///
    /// Returns `false` when no timer is pending.
    pub fn advance_to_next_timer(&self) -> bool {
        match self.next_timer_due() {
            Some(due) => {
                let delta = due - self.now_ms();
                self.advance_by(delta);
                true
            }
            None => false,
        }
    }

    /// Drive the loop with wall-clock time until `keep_running` says stop
    pub fn run_realtime(&self, mut keep_running: impl FnMut() -> bool) {
        let frame = Duration::from_secs_f64(self.frame_interval_ms / 1000.0);
        let mut last = Instant::now();
        while keep_running() {
            std::thread::sleep(frame);
            let now = Instant::now();
            self.advance_by((now - last).as_secs_f64() * 1000.0);
            last = now;
        }
    }

    fn fire_next_timer(&self) {
        let timer = {
            let mut state = self.state.borrow_mut();
            let Some(index) = state.next_timer() else {
                return;
            };
            let timer = state.timers.swap_remove(index);
            state.now_ms = state.now_ms.max(timer.due_ms);
            timer
        };
        (timer.task)();
    }

    fn run_frame(&self) {
        let tasks = {
            let mut state = self.state.borrow_mut();
            state.now_ms = state.now_ms.max(state.next_frame_ms);
            state.next_frame_ms += self.frame_interval_ms;
            let tasks = std::mem::take(&mut state.frames);
            state.in_flight = tasks.iter().map(|t| t.id).collect();
            tasks
        };

        // Tasks that already ticked stay in `in_flight` until the frame ends,
        // so a later task of the same frame can still cancel them
        let mut kept = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            if self.state.borrow_mut().cancelled.remove(&task.id) {
                self.state.borrow_mut().in_flight.remove(&task.id);
                continue;
            }

            let keep = (task.tick)();

            let mut state = self.state.borrow_mut();
            let cancelled = state.cancelled.remove(&task.id);
            if keep && !cancelled {
                kept.push(task);
            } else {
                state.in_flight.remove(&task.id);
            }
        }

        let mut state = self.state.borrow_mut();
        let LoopState {
            cancelled,
            in_flight,
            ..
        } = &mut *state;
        kept.retain(|task| !cancelled.remove(&task.id));
        cancelled.clear();
        in_flight.clear();
        // Tasks added during this frame run after the older ones
        kept.append(&mut state.frames);
        state.frames = kept;
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for EventLoop {
    fn now_ms(&self) -> f64 {
        self.state.borrow().now_ms
    }

    fn schedule_once(&self, delay_ms: f64, task: Box<dyn FnOnce()>) -> TaskId {
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id();
        // NaN or infinite delays park the timer forever
        let delay = if delay_ms.is_nan() { f64::INFINITY } else { delay_ms.max(0.0) };
        let due_ms = state.now_ms + delay;
        state.timers.push(Timer { id, due_ms, task });
        id
    }

    fn schedule_repeating(&self, tick: Box<dyn FnMut() -> bool>) -> TaskId {
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id();
        state.frames.push(FrameTask { id, tick });
        id
    }

    fn cancel(&self, id: TaskId) {
        let mut state = self.state.borrow_mut();
        if let Some(index) = state.timers.iter().position(|t| t.id == id) {
            state.timers.swap_remove(index);
        } else if let Some(index) = state.frames.iter().position(|t| t.id == id) {
            state.frames.remove(index);
        } else if state.in_flight.contains(&id) {
            state.cancelled.insert(id);
        }
    }
}
