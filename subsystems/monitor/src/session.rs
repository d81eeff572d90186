//! # Device Session
//!
//! One [`DeviceSession`] per host, created when the monitor attaches and kept
//! for as long as the host driver is loaded. It owns every counter the
//! monitor keeps; the host reaches it through the entry points below.
//!
//! ## Serialization
//!
//! The host completes at most one request at a time per host instance, so the
//! session is written by one context at a time. Mutating entry points take
//! `&mut self`; a host that needs to share the session between its
//! completion path, its card-detect handler and its deferred work context
//! wraps it in a `spin::Mutex`.

use alloc::string::String;
use alloc::sync::Arc;

use sdwatch_hal::card_detect::CardDetectPolarity;
use sdwatch_hal::{CardDetect, Clock, Nanoseconds};

use crate::busy::BusyStuckDetector;
use crate::card::{CardPresence, SlotType};
use crate::classifier::StatusErrorCounters;
use crate::config::MonitorConfig;
use crate::errlog::{ErrorKind, ErrorLogTable};
use crate::notify::{
    self, Delivery, NotificationQueue, NotificationRequest, NotificationWorker, UeventEnv,
    UeventSink,
};
use crate::report;
use crate::request::{Phase, RequestRecord};
use crate::MonitorResult;

/// Per-host monitor state
#[derive(Debug)]
pub struct DeviceSession<C: Clock> {
    config: MonitorConfig,
    clock: C,
    table: ErrorLogTable,
    counters: StatusErrorCounters,
    presence: CardPresence,
    slot_type: SlotType,
    busy: BusyStuckDetector,
    notifier: Option<Arc<NotificationQueue>>,
}

impl<C: Clock> DeviceSession<C> {
    /// Create a session with no card and no notification channel
    ///
    /// Call [`configure`](Self::configure) once the host knows its slot.
    pub fn new(config: MonitorConfig, clock: C) -> Self {
        let now = clock.now();
        Self {
            busy: BusyStuckDetector::new(config.busy_timeout, now),
            slot_type: config.slot_type.unwrap_or(SlotType::Invalid),
            config,
            clock,
            table: ErrorLogTable::new(),
            counters: StatusErrorCounters::new(),
            presence: CardPresence::new(false),
            notifier: None,
        }
    }

    /// Create and configure a session from the host's card-detect line
    ///
    /// A slot without a readable line is assumed to hold a card and, unless
    /// the configuration names a slot type, is classified as
    /// [`SlotType::NoDetect`].
    pub fn attach(config: MonitorConfig, clock: C, card_detect: &dyn CardDetect) -> Self {
        let hint = config.slot_type.or_else(|| Some(SlotType::detect(card_detect)));
        let present = card_detect.read_card_detect().unwrap_or(true);

        let mut session = Self::new(config, clock);
        session.configure(hint, present);
        session
    }

    /// One-time setup at attach
    ///
    /// Records the initial presence without counting it as a transition.
    pub fn configure(&mut self, slot_type_hint: Option<SlotType>, initial_presence: bool) {
        self.slot_type = slot_type_hint
            .or(self.config.slot_type)
            .unwrap_or(SlotType::Invalid);
        self.presence = CardPresence::new(initial_presence);
        self.table.clear();
        self.counters.clear();
        self.busy.note_command(self.clock.now());

        log::info!(
            "{}: error monitor attached, slot type {:?}, card {}",
            self.config.device_name,
            self.slot_type,
            if initial_presence { "present" } else { "absent" }
        );
    }

    /// Open the notification channel
    ///
    /// Threshold crossings are only scheduled once a channel exists. The
    /// returned worker is what the host runs from its deferred context.
    pub fn register_notifier(&mut self) -> NotificationWorker {
        let queue = self
            .notifier
            .get_or_insert_with(|| Arc::new(NotificationQueue::new()));
        NotificationWorker::new(Arc::clone(queue))
    }

    // =========================================================================
    // Card events
    // =========================================================================

    /// Presence reading from the host's card-detect handling
    ///
    /// Returns `true` when the reading changed the presence state.
    pub fn on_card_event(&mut self, present: bool) -> bool {
        self.apply_presence(present, None)
    }

    /// Sample the card-detect line and apply it
    ///
    /// A line that cannot be read counts as a card being present.
    pub fn on_card_event_from(&mut self, card_detect: &dyn CardDetect) -> bool {
        match card_detect.read_card_detect() {
            Ok(present) => self.apply_presence(present, Some(card_detect.polarity())),
            Err(err) => {
                log::warn!(
                    "{}: card detect unavailable: {}",
                    self.config.device_name,
                    err
                );
                self.apply_presence(true, None)
            }
        }
    }

    fn apply_presence(&mut self, present: bool, polarity: Option<CardDetectPolarity>) -> bool {
        let Some(previous) = self
            .presence
            .apply(present, &mut self.table, &mut self.counters)
        else {
            return false;
        };

        match polarity {
            Some(polarity) => log::info!(
                "{}: slot status change detected ({} -> {}), GPIO_ACTIVE_{}",
                self.config.device_name,
                u8::from(previous),
                u8::from(present),
                polarity.name()
            ),
            None => log::info!(
                "{}: slot status change detected ({} -> {})",
                self.config.device_name,
                u8::from(previous),
                u8::from(present)
            ),
        }
        true
    }

    // =========================================================================
    // Request completion
    // =========================================================================

    /// Account for a completed request
    pub fn on_request_completed(&mut self, request: &RequestRecord) {
        if !self.presence.is_present() {
            log::trace!("{}: no card, request ignored", self.config.device_name);
            return;
        }
        if request.is_tuning() {
            return;
        }

        let now = self.clock.now();
        let status_poll = request.is_status_poll();
        if !status_poll {
            self.busy.note_command(now);
        }

        if !request.is_loggable() {
            log::trace!(
                "{}: CMD{} not logged (flags {:?})",
                self.config.device_name,
                request.cmd.opcode,
                request.cmd.flags
            );
            return;
        }

        let status = request.combined_status();
        if status.has_tracked_error()
            && self.counters.classify(status, &self.config.thresholds)
        {
            self.schedule_notification(now);
        }

        for (phase, error) in request.phase_errors() {
            self.table.record(phase, error, status, now);
        }

        if status_poll && self.busy.check(status, now) {
            log::warn!(
                "{}: card stuck in busy, status {:#010x}",
                self.config.device_name,
                status.raw()
            );
            self.table
                .record(Phase::Busy, ErrorKind::Timeout.errno(), status, now);
        }
    }

    fn schedule_notification(&self, now: Nanoseconds) {
        let Some(queue) = self.notifier.as_ref() else {
            return;
        };
        if !queue.schedule(NotificationRequest { scheduled_at: now }) {
            log::debug!(
                "{}: notification already pending",
                self.config.device_name
            );
        }
    }

    // =========================================================================
    // Notification
    // =========================================================================

    /// Deliver one IO error notification now
    ///
    /// Normally reached through [`NotificationWorker::run`].
    pub fn deliver_notification(&mut self, sink: &dyn UeventSink) -> Delivery {
        notify::deliver(
            &self.config.device_name,
            self.presence.is_present(),
            &mut self.counters,
            &self.config.thresholds,
            sink,
        )
    }

    /// Event environment as it would be sent right now
    pub fn uevent_env(&self) -> MonitorResult<UeventEnv> {
        notify::build_env(
            &self.config.device_name,
            self.presence.is_present(),
            &self.counters,
            &self.config.thresholds,
        )
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Name used in events and logs
    pub fn device_name(&self) -> &str {
        &self.config.device_name
    }

    /// Active configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Per-phase error log
    pub fn error_log(&self) -> &ErrorLogTable {
        &self.table
    }

    /// Status error counters
    pub fn counters(&self) -> &StatusErrorCounters {
        &self.counters
    }

    /// Card currently in the slot
    pub fn is_card_present(&self) -> bool {
        self.presence.is_present()
    }

    /// Slot classification
    pub fn slot_type(&self) -> SlotType {
        self.slot_type
    }

    /// Card-detect transitions since attach
    pub fn detect_count(&self) -> u32 {
        self.presence.detect_count()
    }

    /// Time of the last command other than a status poll
    pub fn last_command(&self) -> Nanoseconds {
        self.busy.last_command()
    }

    /// Notification queue, once registered
    pub fn notifier(&self) -> Option<&Arc<NotificationQueue>> {
        self.notifier.as_ref()
    }

    // =========================================================================
    // Attribute text
    // =========================================================================

    /// Error log table as attribute text
    pub fn error_log_report(&self) -> String {
        report::render_error_log(&self.table)
    }

    /// Counter summary as attribute text
    pub fn summary_report(&self) -> String {
        report::render_summary(&self.counters, &self.table, self.detect_count())
    }

    /// Tray status as attribute text
    pub fn tray_report(&self) -> String {
        report::render_tray(self.presence.is_present())
    }
}
