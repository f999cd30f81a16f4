//! Engine notifications.
//!
//! Every boundary condition the engine resolves by clamping (maximum zoom,
//! holdoff at the buffer edge, acquisition depth ceiling) is reported as a
//! non-blocking [`EngineEvent`], alongside informational events such as view
//! changes and auto-arrange progress. Each event carries a set of
//! [`EventKind`] flags so one occurrence can match several categories.
//!
//! Subscribers pass an [`EventFilter`]; an event is delivered when
//! `(event.kinds & filter) != 0`.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use crate::data::channels::ChannelId;
use crate::data::trigger::TriggerEdge;

// ─────────────────────────────────────────────────────────────────────────────
// EventKind – bitflags
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKind(pub u64);

impl EventKind {
    // ── User-visible notifications ──────────────────────────────────────
    /// A zoom was clamped to the minimal resolvable timespan.
    pub const MAX_ZOOM_REACHED: Self = Self(1 << 0);
    /// A holdoff write was clamped to `±length/2`.
    pub const HOLDOFF_AT_MAXIMUM: Self = Self(1 << 1);
    /// The acquisition depth ceiling was hit while zooming out.
    pub const INCREASE_RAM_DEPTH: Self = Self(1 << 2);

    // ── Model changes ───────────────────────────────────────────────────
    pub const VIEW_CHANGED: Self = Self(1 << 3);
    pub const ACQUISITION_LENGTH_CHANGED: Self = Self(1 << 4);
    pub const ROLLING_CHANGED: Self = Self(1 << 5);
    pub const PANORAMA_SHOWN: Self = Self(1 << 6);
    pub const PANORAMA_HIDDEN: Self = Self(1 << 7);

    // ── Convergence / arrange ───────────────────────────────────────────
    pub const AUTO_TRIGGER_CONVERGED: Self = Self(1 << 8);
    pub const ARRANGE_PROGRESS: Self = Self(1 << 9);
    pub const ARRANGE_COMPLETE: Self = Self(1 << 10);

    // ── Device ──────────────────────────────────────────────────────────
    pub const DEVICE_CONNECTED: Self = Self(1 << 11);
    pub const DEVICE_ERROR: Self = Self(1 << 12);

    /// The three clamp notifications shown to the user.
    pub const NOTIFICATIONS: Self = Self(
        Self::MAX_ZOOM_REACHED.0 | Self::HOLDOFF_AT_MAXIMUM.0 | Self::INCREASE_RAM_DEPTH.0,
    );

    pub const ALL: Self = Self(u64::MAX);

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for EventKind {
    type Output = Self;
    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for EventKind {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "EMPTY");
        }
        if *self == EventKind::ALL {
            return write!(f, "ALL");
        }

        let pairs: &[(EventKind, &str)] = &[
            (EventKind::MAX_ZOOM_REACHED, "MAX_ZOOM_REACHED"),
            (EventKind::HOLDOFF_AT_MAXIMUM, "HOLDOFF_AT_MAXIMUM"),
            (EventKind::INCREASE_RAM_DEPTH, "INCREASE_RAM_DEPTH"),
            (EventKind::VIEW_CHANGED, "VIEW_CHANGED"),
            (EventKind::ACQUISITION_LENGTH_CHANGED, "ACQUISITION_LENGTH_CHANGED"),
            (EventKind::ROLLING_CHANGED, "ROLLING_CHANGED"),
            (EventKind::PANORAMA_SHOWN, "PANORAMA_SHOWN"),
            (EventKind::PANORAMA_HIDDEN, "PANORAMA_HIDDEN"),
            (EventKind::AUTO_TRIGGER_CONVERGED, "AUTO_TRIGGER_CONVERGED"),
            (EventKind::ARRANGE_PROGRESS, "ARRANGE_PROGRESS"),
            (EventKind::ARRANGE_COMPLETE, "ARRANGE_COMPLETE"),
            (EventKind::DEVICE_CONNECTED, "DEVICE_CONNECTED"),
            (EventKind::DEVICE_ERROR, "DEVICE_ERROR"),
        ];

        let mut names = Vec::new();
        let mut known_bits: u64 = 0;
        for (kind, name) in pairs {
            known_bits |= kind.0;
            if self.contains(*kind) {
                names.push((*name).to_string());
            }
        }
        let extra = self.0 & !known_bits;
        if extra != 0 {
            names.push(format!("0x{:x}", extra));
        }
        write!(f, "{}", names.join("|"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Model snapshot attached to view and acquisition events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewMeta {
    pub acquisition_length: f64,
    pub viewport_offset: f64,
    pub viewport_timespan: f64,
    pub holdoff: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerMeta {
    pub channel: ChannelId,
    pub level: f64,
    pub edge: TriggerEdge,
}

// ─────────────────────────────────────────────────────────────────────────────
// EngineEvent
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub kinds: EventKind,
    /// Seconds since the controller was created; set on emit.
    pub timestamp: f64,
    /// Human readable text for notification toasts.
    pub message: Option<String>,
    pub view: Option<ViewMeta>,
    pub trigger: Option<TriggerMeta>,
    /// Fraction `[0, 1]` for progress events.
    pub progress: Option<f64>,
}

impl EngineEvent {
    pub fn new(kinds: EventKind) -> Self {
        Self {
            kinds,
            timestamp: 0.0,
            message: None,
            view: None,
            trigger: None,
            progress: None,
        }
    }

    pub fn notification(kinds: EventKind, message: impl Into<String>) -> Self {
        let mut evt = Self::new(kinds);
        evt.message = Some(message.into());
        evt
    }

    pub fn with_view(mut self, view: ViewMeta) -> Self {
        self.view = Some(view);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventFilter
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct EventFilter {
    pub mask: EventKind,
}

impl EventFilter {
    pub const fn all() -> Self {
        Self {
            mask: EventKind::ALL,
        }
    }

    pub const fn only(mask: EventKind) -> Self {
        Self { mask }
    }

    #[inline]
    pub fn matches(&self, event: &EngineEvent) -> bool {
        event.kinds.intersects(self.mask)
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventController
// ─────────────────────────────────────────────────────────────────────────────

struct Subscriber {
    filter: EventFilter,
    sender: Sender<EngineEvent>,
}

/// Distributes engine events to subscribers over `mpsc` channels.
///
/// Cloning shares the subscriber list, so the UI can keep a handle while the
/// session owns another.
#[derive(Clone)]
pub struct EventController {
    inner: Arc<Mutex<EventCtrlInner>>,
}

struct EventCtrlInner {
    subscribers: Vec<Subscriber>,
    start_instant: std::time::Instant,
}

impl EventController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EventCtrlInner {
                subscribers: Vec::new(),
                start_instant: std::time::Instant::now(),
            })),
        }
    }

    pub fn subscribe(&self, filter: EventFilter) -> Receiver<EngineEvent> {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.subscribers.push(Subscriber { filter, sender: tx });
        rx
    }

    pub fn subscribe_all(&self) -> Receiver<EngineEvent> {
        self.subscribe(EventFilter::all())
    }

    /// Deliver to matching subscribers; subscribers whose receiver was
    /// dropped are pruned on their next matching event.
    pub fn emit(&self, mut event: EngineEvent) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        event.timestamp = inner.start_instant.elapsed().as_secs_f64();
        inner.subscribers.retain(|sub| {
            if sub.filter.matches(&event) {
                sub.sender.send(event.clone()).is_ok()
            } else {
                true
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }
}

impl Default for EventController {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_group_contains_clamp_kinds() {
        let n = EventKind::NOTIFICATIONS;
        assert!(n.contains(EventKind::MAX_ZOOM_REACHED));
        assert!(n.contains(EventKind::HOLDOFF_AT_MAXIMUM));
        assert!(n.contains(EventKind::INCREASE_RAM_DEPTH));
        assert!(!n.intersects(EventKind::VIEW_CHANGED));
    }

    #[test]
    fn filter_routes_events() {
        let ctrl = EventController::new();
        let rx_all = ctrl.subscribe_all();
        let rx_notes = ctrl.subscribe(EventFilter::only(EventKind::NOTIFICATIONS));

        ctrl.emit(EngineEvent::new(EventKind::VIEW_CHANGED));
        ctrl.emit(EngineEvent::notification(
            EventKind::MAX_ZOOM_REACHED,
            "maximum zoom reached",
        ));

        assert_eq!(rx_all.try_iter().count(), 2);
        let notes: Vec<_> = rx_notes.try_iter().collect();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].message.as_deref(), Some("maximum zoom reached"));
    }

    #[test]
    fn dropped_receiver_is_pruned() {
        let ctrl = EventController::new();
        let rx1 = ctrl.subscribe_all();
        let rx2 = ctrl.subscribe_all();
        drop(rx1);

        ctrl.emit(EngineEvent::new(EventKind::ARRANGE_COMPLETE));
        assert!(rx2.try_recv().is_ok());
        assert_eq!(ctrl.subscriber_count(), 1);
    }

    #[test]
    fn display_joins_names() {
        let combo = EventKind::HOLDOFF_AT_MAXIMUM | EventKind::PANORAMA_SHOWN;
        assert_eq!(format!("{combo}"), "HOLDOFF_AT_MAXIMUM|PANORAMA_SHOWN");
        assert_eq!(format!("{}", EventKind::ALL), "ALL");
        assert!(format!("{}", EventKind(1 << 63)).starts_with("0x"));
    }

    #[test]
    fn event_kinds_do_not_overlap() {
        let kinds = [
            EventKind::MAX_ZOOM_REACHED,
            EventKind::HOLDOFF_AT_MAXIMUM,
            EventKind::INCREASE_RAM_DEPTH,
            EventKind::VIEW_CHANGED,
            EventKind::ACQUISITION_LENGTH_CHANGED,
            EventKind::ROLLING_CHANGED,
            EventKind::PANORAMA_SHOWN,
            EventKind::PANORAMA_HIDDEN,
            EventKind::AUTO_TRIGGER_CONVERGED,
            EventKind::ARRANGE_PROGRESS,
            EventKind::ARRANGE_COMPLETE,
            EventKind::DEVICE_CONNECTED,
            EventKind::DEVICE_ERROR,
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in kinds.iter().skip(i + 1) {
                assert!(!a.intersects(*b), "{a} overlaps {b}");
            }
        }
    }
}
