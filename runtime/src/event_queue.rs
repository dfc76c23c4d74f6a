//! The event queue state machine.
//!
//! Dispatched events are buffered here and drained in batches on a
//! deferred tick. The queue is a pure state machine: instead of firing
//! callbacks it returns explicit "schedule a tick" decisions, and the
//! store's drain loop (`Store::run_queue_tick`) performs the scheduling and
//! the per-event processing. A processing error purges the whole batch.

use std::collections::VecDeque;

use reflow_core::Event;

/// Scheduling states of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueState {
    /// Nothing buffered, nothing scheduled.
    Idle,
    /// Events buffered and a drain tick scheduled.
    Scheduled,
    /// A drain pass is executing.
    Running,
    /// Draining is suspended; events still buffer.
    Paused,
}

/// FIFO buffer of pending events plus the scheduling state.
///
/// Events added while a pass is running are deferred to the next pass:
/// [`EventQueue::begin_run`] records the batch length up front and the
/// drain loop pops exactly that many events.
#[derive(Debug)]
pub(crate) struct EventQueue {
    state: QueueState,
    buffer: VecDeque<Event>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: QueueState::Idle,
            buffer: VecDeque::new(),
        }
    }

    pub(crate) fn state(&self) -> QueueState {
        self.state
    }

    pub(crate) fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer an event. Returns `true` when the caller must schedule a
    /// drain tick (only on the `Idle` → `Scheduled` transition).
    #[must_use]
    pub(crate) fn push(&mut self, event: Event) -> bool {
        self.buffer.push_back(event);
        match self.state {
            QueueState::Idle => {
                self.state = QueueState::Scheduled;
                true
            }
            QueueState::Scheduled | QueueState::Running | QueueState::Paused => false,
        }
    }

    /// Suspend automatic draining. Buffered events are kept.
    pub(crate) fn pause(&mut self) {
        self.state = QueueState::Paused;
    }

    /// Resume after a pause. Returns `true` when the caller must schedule
    /// a drain tick (buffer is non-empty); with an empty buffer the queue
    /// goes straight back to `Idle`.
    #[must_use]
    pub(crate) fn resume(&mut self) -> bool {
        if self.state != QueueState::Paused {
            return false;
        }
        if self.buffer.is_empty() {
            self.state = QueueState::Idle;
            false
        } else {
            self.state = QueueState::Scheduled;
            true
        }
    }

    /// Start a drain pass, recording the batch length.
    ///
    /// Returns `None` unless the queue is `Scheduled`; a tick that fires
    /// after a pause (or after a purge) is a no-op.
    #[must_use]
    pub(crate) fn begin_run(&mut self) -> Option<usize> {
        if self.state != QueueState::Scheduled {
            return None;
        }
        self.state = QueueState::Running;
        Some(self.buffer.len())
    }

    /// Pop the next event of the current batch.
    pub(crate) fn pop_next(&mut self) -> Option<Event> {
        self.buffer.pop_front()
    }

    /// End a drain pass. Returns `true` when events arrived during the
    /// pass and the caller must schedule the next tick. A queue paused
    /// mid-pass stays paused.
    #[must_use]
    pub(crate) fn finish_run(&mut self) -> bool {
        if self.state != QueueState::Running {
            return false;
        }
        if self.buffer.is_empty() {
            self.state = QueueState::Idle;
            false
        } else {
            self.state = QueueState::Scheduled;
            true
        }
    }

    /// Abort the current pass after a processing error: every buffered
    /// event is discarded and the queue returns to `Idle`.
    pub(crate) fn fail(&mut self) {
        self.buffer.clear();
        self.state = QueueState::Idle;
    }

    /// Discard all buffered events without changing state.
    pub(crate) fn purge(&mut self) {
        self.buffer.clear();
    }
}
