//! Event capture, debouncing and batching
//!
//! The batcher owns the event queue and is the only thing that mutates it:
//! `record` appends (immediately or through a debouncer), `drain` atomically
//! takes the accumulated batch. Click-family interactions append one event
//! synchronously per occurrence. Resize, scroll and per-field input edits go
//! through a settle-after-quiet-period debouncer: rapid occurrences keep
//! pushing the deadline out and coalesce into a single event carrying the
//! last observed state. Bursts shorter than the window emit nothing until
//! quiet — this is not a rate limiter.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::element;
use crate::event::{
    mask_value, EventPayload, InputChangePayload, InputField, Interaction, PointerPayload,
    TrackEvent,
};
use crate::types::{ScrollPosition, Viewport};

/// Quiet period after the last raw occurrence before a coalesced event fires
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Ordered, append-only buffer of captured events.
///
/// Append and drain are the only mutation entry points; the mutex keeps the
/// drain atomic with respect to concurrent appends, so an event recorded
/// during a flush lands in the next batch instead of being lost.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Mutex<Vec<TrackEvent>>,
}

impl EventQueue {
    pub fn append(&self, event: TrackEvent) {
        self.lock().push(event);
    }

    /// Take the whole queue, leaving it empty
    pub fn drain(&self) -> Vec<TrackEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TrackEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Per-class debounce state: idle, or armed with the latest observed state
#[derive(Debug)]
enum DebounceState<T> {
    Idle,
    Pending { deadline: Instant, latest: T },
}

/// Settle-after-quiet-period state machine for one event class (or one
/// input element).
///
/// `observe` reschedules: any pending deadline is cancelled and re-armed one
/// window after `now`, with the latest state replacing whatever was pending.
/// `fire_due` emits that state exactly once after the deadline passes.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    state: DebounceState<T>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
        }
    }

    pub fn observe(&mut self, latest: T, now: Instant) {
        self.state = DebounceState::Pending {
            deadline: now + self.window,
            latest,
        };
    }

    pub fn fire_due(&mut self, now: Instant) -> Option<T> {
        match &self.state {
            DebounceState::Pending { deadline, .. } if *deadline <= now => {
                match std::mem::replace(&mut self.state, DebounceState::Idle) {
                    DebounceState::Pending { latest, .. } => Some(latest),
                    DebounceState::Idle => None,
                }
            }
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            DebounceState::Pending { deadline, .. } => Some(*deadline),
            DebounceState::Idle => None,
        }
    }
}

/// Debouncers for every debounced class: one for resize, one for scroll, one
/// per input field registered at construction time.
#[derive(Debug)]
struct DebounceTable {
    resize: Debouncer<Viewport>,
    scroll: Debouncer<ScrollPosition>,
    input: Vec<Debouncer<String>>,
}

/// Accumulates interaction events and applies the per-class debounce policy.
pub struct EventBatcher {
    queue: EventQueue,
    fields: Vec<InputField>,
    timers: Mutex<DebounceTable>,
}

impl EventBatcher {
    /// Build a batcher over the input fields present at load time.
    ///
    /// Fields added to the page later are not observed.
    pub fn new(window: Duration, fields: Vec<InputField>) -> Self {
        let timers = DebounceTable {
            resize: Debouncer::new(window),
            scroll: Debouncer::new(window),
            input: fields.iter().map(|_| Debouncer::new(window)).collect(),
        };

        Self {
            queue: EventQueue::default(),
            fields,
            timers: Mutex::new(timers),
        }
    }

    /// Record one raw occurrence.
    ///
    /// Immediate classes append synchronously; debounced classes only
    /// reschedule their timer. Never panics: a malformed interaction
    /// degrades (absent descriptor, ignored unknown field) rather than
    /// aborting capture.
    pub fn record(&self, interaction: Interaction) {
        let now = Instant::now();
        match interaction {
            Interaction::ViewportResize { viewport } => {
                self.timers().resize.observe(viewport, now);
            }
            Interaction::Scroll { position } => {
                self.timers().scroll.observe(position, now);
            }
            Interaction::Click { x, y, path } => {
                self.append_pointer(x, y, &path, |pointer| EventPayload::Click { pointer });
            }
            Interaction::DoubleClick { x, y, path } => {
                self.append_pointer(x, y, &path, |pointer| EventPayload::DoubleClick { pointer });
            }
            Interaction::RightClick { x, y, path } => {
                self.append_pointer(x, y, &path, |pointer| EventPayload::RightClick { pointer });
            }
            Interaction::InputEdit { field_index, value } => {
                let mut timers = self.timers();
                match timers.input.get_mut(field_index) {
                    Some(debouncer) => debouncer.observe(value, now),
                    None => {
                        tracing::debug!(field_index, "input edit on unregistered field ignored");
                    }
                }
            }
        }
    }

    fn append_pointer(
        &self,
        x: f64,
        y: f64,
        path: &[element::DomNode],
        build: impl FnOnce(PointerPayload) -> EventPayload,
    ) {
        let pointer = PointerPayload {
            x,
            y,
            element: element::identify(path),
        };
        self.queue.append(TrackEvent::new(build(pointer)));
    }

    /// Append events for every debouncer whose quiet period has elapsed.
    ///
    /// Returns how many events were appended.
    pub fn fire_due(&self, now: Instant) -> usize {
        let mut fired = 0;
        let mut timers = self.timers();

        if let Some(viewport) = timers.resize.fire_due(now) {
            self.queue
                .append(TrackEvent::new(EventPayload::ViewportResize { viewport }));
            fired += 1;
        }

        if let Some(position) = timers.scroll.fire_due(now) {
            self.queue
                .append(TrackEvent::new(EventPayload::Scroll { position }));
            fired += 1;
        }

        for (index, debouncer) in timers.input.iter_mut().enumerate() {
            if let Some(raw) = debouncer.fire_due(now) {
                let field = &self.fields[index];
                self.queue
                    .append(TrackEvent::new(EventPayload::InputChange {
                        input: InputChangePayload {
                            field_id: field.id.clone(),
                            field_name: field.name.clone(),
                            field_type: field.field_type.clone(),
                            value: mask_value(&raw),
                            element: element::identify(&field.path),
                        },
                    }));
                fired += 1;
            }
        }

        fired
    }

    /// Earliest pending debounce deadline, if any timer is armed
    pub fn next_deadline(&self) -> Option<Instant> {
        let timers = self.timers();
        let mut earliest: Option<Instant> = None;

        let deadlines = timers
            .resize
            .deadline()
            .into_iter()
            .chain(timers.scroll.deadline())
            .chain(timers.input.iter().filter_map(Debouncer::deadline));

        for deadline in deadlines {
            earliest = Some(match earliest {
                Some(current) if current <= deadline => current,
                _ => deadline,
            });
        }

        earliest
    }

    /// Atomically take the accumulated batch, leaving the queue empty
    pub fn drain(&self) -> Vec<TrackEvent> {
        self.queue.drain()
    }

    /// Take the batch for a flush tick.
    ///
    /// `None` when nothing accumulated, so an empty tick performs no send.
    pub fn drain_nonempty(&self) -> Option<Vec<TrackEvent>> {
        let events = self.queue.drain();
        if events.is_empty() {
            None
        } else {
            Some(events)
        }
    }

    /// Number of events currently queued
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn timers(&self) -> std::sync::MutexGuard<'_, DebounceTable> {
        self.timers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
