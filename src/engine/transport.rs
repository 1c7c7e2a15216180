//! Shared musical transport
//!
//! A tempo-aware clock with a timeline of labelled callbacks. All band
//! scheduling happens here rather than on wall-clock timers, so stopping
//! the transport and clearing its timeline silences every pending note.
//!
//! The transport only moves when [`Transport::advance`] is called. In a
//! running session [`Transport::spawn_clock`] drives it from the tokio clock.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use super::lock;
use crate::error::{AeolusError, Result};

/// Beats per bar. The band only plays in 4/4.
pub const BEATS_PER_BAR: f64 = 4.0;

/// Transport states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Position is frozen at zero (default state)
    #[default]
    Stopped,
    /// Position advances with the clock
    Started,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "Stopped"),
            TransportState::Started => write!(f, "Started"),
        }
    }
}

/// Handle to a scheduled event, used to cancel it.
pub type EventId = u64;

type Callback = Box<dyn FnMut(f64) + Send>;

struct ScheduledEvent {
    id: EventId,
    label: String,
    at: f64,
    interval: Option<f64>,
    callback: Callback,
}

struct TransportInner {
    state: TransportState,
    bpm: f64,
    position: f64,
    next_id: EventId,
    events: Vec<ScheduledEvent>,
    /// Event whose callback is currently running outside the lock.
    in_flight: Option<EventId>,
    in_flight_cancelled: bool,
}

/// Shared tempo clock and event timeline
///
/// Every method takes `&self`; share it as `Arc<Transport>`. Callbacks run
/// without the internal lock held, so they may schedule, cancel or stop.
pub struct Transport {
    inner: Mutex<TransportInner>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Transport")
            .field("state", &inner.state)
            .field("bpm", &inner.bpm)
            .field("position", &inner.position)
            .field("pending", &inner.events.len())
            .finish()
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl Transport {
    /// Create a stopped transport at the given tempo
    ///
    /// # Example
    /// ```
    /// use aeolus::engine::Transport;
    /// let transport = Transport::new(80.0);
    /// assert!(!transport.is_started());
    /// assert_eq!(transport.position(), 0.0);
    /// ```
    pub fn new(bpm: f64) -> Self {
        Self {
            inner: Mutex::new(TransportInner {
                state: TransportState::Stopped,
                bpm,
                position: 0.0,
                next_id: 0,
                events: Vec::new(),
                in_flight: None,
                in_flight_cancelled: false,
            }),
        }
    }

    // ========================================================================
    // Controls
    // ========================================================================

    /// Start advancing from the current position
    ///
    /// # Example
    /// ```
    /// use aeolus::engine::{Transport, TransportState};
    /// let transport = Transport::new(80.0);
    /// transport.start();
    /// assert_eq!(transport.state(), TransportState::Started);
    /// ```
    pub fn start(&self) {
        let mut inner = lock(&self.inner);
        if inner.state == TransportState::Started {
            trace!("Transport already started");
            return;
        }
        inner.state = TransportState::Started;
        debug!(position = inner.position, bpm = inner.bpm, "Transport started");
    }

    /// Stop and rewind to zero. Scheduled events are kept.
    ///
    /// # Example
    /// ```
    /// use aeolus::engine::Transport;
    /// let transport = Transport::new(80.0);
    /// transport.start();
    /// transport.advance(3.0);
    /// transport.stop();
    /// assert_eq!(transport.position(), 0.0);
    /// ```
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        inner.state = TransportState::Stopped;
        inner.position = 0.0;
        debug!("Transport stopped");
    }

    pub fn state(&self) -> TransportState {
        lock(&self.inner).state
    }

    pub fn is_started(&self) -> bool {
        self.state() == TransportState::Started
    }

    /// Current position in seconds
    pub fn position(&self) -> f64 {
        lock(&self.inner).position
    }

    pub fn bpm(&self) -> f64 {
        lock(&self.inner).bpm
    }

    /// Set the tempo. Non-positive tempos are ignored.
    pub fn set_bpm(&self, bpm: f64) {
        if bpm > 0.0 && bpm.is_finite() {
            lock(&self.inner).bpm = bpm;
        }
    }

    // ========================================================================
    // Time Conversions
    // ========================================================================

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm()
    }

    pub fn bars_to_seconds(&self, bars: f64) -> f64 {
        bars * BEATS_PER_BAR * self.seconds_per_beat()
    }

    /// Length of a note value such as `4n` (quarter) or `1m` (one bar)
    ///
    /// # Example
    /// ```
    /// use aeolus::engine::Transport;
    /// let transport = Transport::new(120.0);
    /// assert_eq!(transport.note_value("4n").unwrap(), 0.5);
    /// assert_eq!(transport.note_value("1m").unwrap(), 2.0);
    /// assert!(transport.note_value("3q").is_err());
    /// ```
    pub fn note_value(&self, value: &str) -> Result<f64> {
        let beats = match value {
            "1m" | "1n" => 4.0,
            "2n" => 2.0,
            "4n" => 1.0,
            "8n" => 0.5,
            "16n" => 0.25,
            other => {
                return Err(AeolusError::InvalidConfig {
                    reason: format!("unknown note value: {}", other),
                })
            }
        };
        Ok(beats * self.seconds_per_beat())
    }

    // ========================================================================
    // Timeline
    // ========================================================================

    fn push(&self, at: f64, interval: Option<f64>, label: &str, callback: Callback) -> EventId {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = inner.next_id;
        inner.events.push(ScheduledEvent {
            id,
            label: label.to_string(),
            at: at.max(0.0),
            interval,
            callback,
        });
        trace!(id, label, at, "Transport event scheduled");
        id
    }

    /// Run `callback` once when the position reaches `at` seconds
    pub fn schedule_once<F>(&self, at: f64, label: &str, callback: F) -> EventId
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.push(at, None, label, Box::new(callback))
    }

    /// Run `callback` at `start` and every `interval` seconds after
    ///
    /// Intervals shorter than a millisecond are clamped to one millisecond.
    pub fn schedule_repeat<F>(&self, start: f64, interval: f64, label: &str, callback: F) -> EventId
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.push(start, Some(interval.max(0.001)), label, Box::new(callback))
    }

    /// Remove a scheduled event. Returns whether it was pending.
    pub fn cancel(&self, id: EventId) -> bool {
        let mut inner = lock(&self.inner);
        if inner.in_flight == Some(id) {
            inner.in_flight_cancelled = true;
            return true;
        }
        let before = inner.events.len();
        inner.events.retain(|e| e.id != id);
        before != inner.events.len()
    }

    /// Remove every scheduled event.
    pub fn cancel_all(&self) {
        let mut inner = lock(&self.inner);
        let dropped = inner.events.len();
        inner.events.clear();
        if inner.in_flight.is_some() {
            inner.in_flight_cancelled = true;
        }
        debug!(dropped, "Transport timeline cleared");
    }

    /// Pending events as `(id, label, time)` in time order.
    pub fn pending(&self) -> Vec<(EventId, String, f64)> {
        let inner = lock(&self.inner);
        let mut pending: Vec<_> = inner
            .events
            .iter()
            .map(|e| (e.id, e.label.clone(), e.at))
            .collect();
        pending.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)));
        pending
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.inner).events.len()
    }

    /// Move the position forward, firing due events in time order
    ///
    /// Does nothing while stopped. Returns the number of callbacks run.
    ///
    /// # Example
    /// ```
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    /// use aeolus::engine::Transport;
    ///
    /// let transport = Transport::new(60.0);
    /// let hits = Arc::new(AtomicUsize::new(0));
    /// let counter = hits.clone();
    /// transport.schedule_repeat(0.0, 1.0, "tick", move |_| {
    ///     counter.fetch_add(1, Ordering::SeqCst);
    /// });
    ///
    /// transport.start();
    /// transport.advance(2.5);
    /// assert_eq!(hits.load(Ordering::SeqCst), 3);
    /// ```
    pub fn advance(&self, seconds: f64) -> usize {
        let target = {
            let inner = lock(&self.inner);
            if inner.state != TransportState::Started {
                return 0;
            }
            inner.position + seconds.max(0.0)
        };

        let mut fired = 0;
        loop {
            let mut event = {
                let mut inner = lock(&self.inner);
                if inner.state != TransportState::Started {
                    return fired;
                }
                let next = inner
                    .events
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.at <= target)
                    .min_by(|(_, a), (_, b)| a.at.total_cmp(&b.at).then(a.id.cmp(&b.id)))
                    .map(|(i, _)| i);
                match next {
                    Some(index) => {
                        let event = inner.events.swap_remove(index);
                        inner.position = inner.position.max(event.at);
                        inner.in_flight = Some(event.id);
                        inner.in_flight_cancelled = false;
                        event
                    }
                    None => {
                        inner.position = target;
                        return fired;
                    }
                }
            };

            trace!(id = event.id, label = %event.label, at = event.at, "Transport event fired");
            (event.callback)(event.at);
            fired += 1;

            let mut inner = lock(&self.inner);
            let cancelled = inner.in_flight_cancelled;
            inner.in_flight = None;
            inner.in_flight_cancelled = false;
            if let (Some(interval), false) = (event.interval, cancelled) {
                event.at += interval;
                inner.events.push(event);
            }
        }
    }

    /// Drive the transport from the tokio clock every `tick`
    ///
    /// The task ends once the transport is dropped; abort the handle to stop
    /// it earlier.
    pub fn spawn_clock(self: &Arc<Self>, tick: Duration) -> JoinHandle<()> {
        let weak: Weak<Transport> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = Instant::now();
            loop {
                interval.tick().await;
                let now = Instant::now();
                let elapsed = now.duration_since(last).as_secs_f64();
                last = now;
                match weak.upgrade() {
                    Some(transport) => {
                        transport.advance(elapsed);
                    }
                    None => break,
                }
            }
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
