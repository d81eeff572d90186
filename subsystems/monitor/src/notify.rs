//! # IO Error Notification
//!
//! Threshold crossings found on the completion path are not reported there.
//! The completion path only schedules a notification request on the
//! [`NotificationQueue`]; a [`NotificationWorker`] running in the host's
//! deferred context picks it up, checks that the card is still there and
//! emits a change event to user space.
//!
//! ```text
//!  completion path                     deferred context
//!  ───────────────                     ────────────────
//!  classify() ── threshold ──► schedule() ──► run() ── card present? ──► emit_change()
//! ```
//!
//! Scheduling while a request is already pending is a no-op, like a kernel
//! work item that is already queued.

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use sdwatch_hal::{Clock, Nanoseconds};

use crate::classifier::{StatusErrorCounters, Thresholds};
use crate::session::DeviceSession;
use crate::{MonitorError, MonitorResult};

// =============================================================================
// Event environment
// =============================================================================

/// Maximum number of variables in one event
pub const UEVENT_NUM_ENVP: usize = 64;

/// Maximum total size of the event environment
pub const UEVENT_BUFFER_SIZE: usize = 2048;

/// Value of the `IOERROR` variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoErrorFlag {
    /// A counter sits on its threshold
    Yes,
    /// Card present, nothing to report
    No,
    /// No card in the slot
    NoCard,
}

impl IoErrorFlag {
    /// Evaluate against the live counters
    pub fn evaluate(
        card_present: bool,
        counters: &StatusErrorCounters,
        thresholds: &Thresholds,
    ) -> Self {
        if !card_present {
            IoErrorFlag::NoCard
        } else if counters.at_threshold(thresholds) {
            IoErrorFlag::Yes
        } else {
            IoErrorFlag::No
        }
    }

    /// Value as written into the environment
    pub const fn as_str(self) -> &'static str {
        match self {
            IoErrorFlag::Yes => "YES",
            IoErrorFlag::No => "NO",
            IoErrorFlag::NoCard => "NoCard",
        }
    }
}

/// `KEY=value` variables attached to a change event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UeventEnv {
    vars: Vec<String>,
    len: usize,
}

impl UeventEnv {
    /// Empty environment
    pub const fn new() -> Self {
        Self {
            vars: Vec::new(),
            len: 0,
        }
    }

    /// Append a variable
    pub fn add_var(&mut self, key: &str, value: &str) -> MonitorResult<()> {
        if self.vars.len() >= UEVENT_NUM_ENVP {
            return Err(MonitorError::EnvFull);
        }
        let var = format!("{}={}", key, value);
        // Stored NUL-terminated by the transport
        let needed = var.len() + 1;
        if self.len + needed > UEVENT_BUFFER_SIZE {
            return Err(MonitorError::EnvFull);
        }
        self.len += needed;
        self.vars.push(var);
        Ok(())
    }

    /// Value of `key`, if set
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.iter().find_map(|var| {
            let (k, v) = var.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    /// Variables in insertion order
    pub fn vars(&self) -> &[String] {
        &self.vars
    }
}

/// Build the environment of an IO error event
///
/// `IOERROR` is computed here, from the counters as they are now.
pub fn build_env(
    device: &str,
    card_present: bool,
    counters: &StatusErrorCounters,
    thresholds: &Thresholds,
) -> MonitorResult<UeventEnv> {
    let mut env = UeventEnv::new();
    env.add_var("DEVNAME", device)?;
    let flag = IoErrorFlag::evaluate(card_present, counters, thresholds);
    env.add_var("IOERROR", flag.as_str())?;
    Ok(env)
}

/// User-space facing listener for change events
pub trait UeventSink: Send + Sync {
    /// Deliver a change event for `device`
    fn emit_change(&self, device: &str, env: &UeventEnv) -> MonitorResult<()>;
}

// =============================================================================
// Notification queue
// =============================================================================

/// A scheduled notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationRequest {
    /// When the threshold crossing was seen
    pub scheduled_at: Nanoseconds,
}

/// Single-slot deferred work queue for notifications
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: Mutex<Option<NotificationRequest>>,
    scheduled: AtomicU64,
    coalesced: AtomicU64,
}

impl NotificationQueue {
    /// Empty queue
    pub const fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            scheduled: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Queue a notification
    ///
    /// Returns `false` if one is already pending.
    pub fn schedule(&self, request: NotificationRequest) -> bool {
        let mut pending = self.pending.lock();
        if pending.is_some() {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        *pending = Some(request);
        self.scheduled.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Take the pending notification
    pub fn take(&self) -> Option<NotificationRequest> {
        self.pending.lock().take()
    }

    /// A notification is waiting to run
    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Notifications accepted so far
    pub fn scheduled_count(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    /// Schedule attempts folded into an already pending one
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Delivery
// =============================================================================

/// Result of running one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Event handed to the sink
    Sent,
    /// Card gone before the notification ran
    NoCard,
    /// The sink or environment rejected the event
    Failed(MonitorError),
}

/// Send one IO error notification
///
/// Counts the notification even when the sink then fails; a lost event is
/// only logged.
pub fn deliver(
    device: &str,
    card_present: bool,
    counters: &mut StatusErrorCounters,
    thresholds: &Thresholds,
    sink: &dyn UeventSink,
) -> Delivery {
    if !card_present {
        return Delivery::NoCard;
    }

    counters.notification = counters.notification.saturating_add(1);
    log::info!(
        "{}: Send notification for SD card IO error. cnt({})",
        device,
        counters.notification
    );

    let result = build_env(device, card_present, counters, thresholds)
        .and_then(|env| sink.emit_change(device, &env));
    match result {
        Ok(()) => Delivery::Sent,
        Err(err) => {
            log::error!("{}: Failed to send uevent: {}", device, err);
            Delivery::Failed(err)
        }
    }
}

/// Consumer side of the notification queue
#[derive(Debug, Clone)]
pub struct NotificationWorker {
    queue: Arc<NotificationQueue>,
}

impl NotificationWorker {
    /// Worker draining `queue`
    pub fn new(queue: Arc<NotificationQueue>) -> Self {
        Self { queue }
    }

    /// Queue this worker drains
    pub fn queue(&self) -> &Arc<NotificationQueue> {
        &self.queue
    }

    /// Run the pending notification, if any
    ///
    /// Returns `None` when nothing was pending.
    pub fn run<C: Clock>(
        &self,
        session: &mut DeviceSession<C>,
        sink: &dyn UeventSink,
    ) -> Option<Delivery> {
        let request = self.queue.take()?;
        log::trace!(
            "{}: running notification scheduled at {}",
            session.device_name(),
            request.scheduled_at
        );
        Some(session.deliver_notification(sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        events: Mutex<Vec<(String, UeventEnv)>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new(fail: bool) -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    impl UeventSink for RecordingSink {
        fn emit_change(&self, device: &str, env: &UeventEnv) -> MonitorResult<()> {
            if self.fail {
                return Err(MonitorError::EmitFailed(-12));
            }
            self.events.lock().push((String::from(device), env.clone()));
            Ok(())
        }
    }

    fn counters_with_wp(wp: u32) -> StatusErrorCounters {
        StatusErrorCounters {
            write_protect: wp,
            ..StatusErrorCounters::new()
        }
    }

    #[test]
    fn test_io_error_flag() {
        let t = Thresholds::DEFAULT;
        assert_eq!(IoErrorFlag::evaluate(false, &counters_with_wp(100), &t), IoErrorFlag::NoCard);
        assert_eq!(IoErrorFlag::evaluate(true, &counters_with_wp(100), &t), IoErrorFlag::Yes);
        assert_eq!(IoErrorFlag::evaluate(true, &counters_with_wp(101), &t), IoErrorFlag::No);
        assert_eq!(IoErrorFlag::evaluate(true, &counters_with_wp(0), &t), IoErrorFlag::No);

        let ecc = StatusErrorCounters {
            ecc_error: 1000,
            ..StatusErrorCounters::new()
        };
        assert_eq!(IoErrorFlag::evaluate(true, &ecc, &t), IoErrorFlag::Yes);

        let oor = StatusErrorCounters {
            out_of_range: 100,
            ..StatusErrorCounters::new()
        };
        assert_eq!(IoErrorFlag::evaluate(true, &oor, &t), IoErrorFlag::Yes);
    }

    #[test]
    fn test_build_env() {
        let env = build_env("sdcard", true, &counters_with_wp(200), &Thresholds::DEFAULT).unwrap();
        assert_eq!(env.vars(), &["DEVNAME=sdcard", "IOERROR=YES"]);
        assert_eq!(env.get("IOERROR"), Some("YES"));
        assert_eq!(env.get("ACTION"), None);

        let env = build_env("sdcard", false, &counters_with_wp(200), &Thresholds::DEFAULT).unwrap();
        assert_eq!(env.get("IOERROR"), Some("NoCard"));
    }

    #[test]
    fn test_env_limits() {
        let mut env = UeventEnv::new();
        for i in 0..UEVENT_NUM_ENVP {
            env.add_var("K", if i % 2 == 0 { "a" } else { "b" }).unwrap();
        }
        assert_eq!(env.add_var("K", "c"), Err(MonitorError::EnvFull));

        let mut env = UeventEnv::new();
        let long = "x".repeat(UEVENT_BUFFER_SIZE);
        assert_eq!(env.add_var("BIG", &long), Err(MonitorError::EnvFull));
        assert!(env.vars().is_empty());
    }

    #[test]
    fn test_queue_coalesces() {
        let queue = NotificationQueue::new();
        let req = NotificationRequest {
            scheduled_at: Nanoseconds::new(1),
        };

        assert!(queue.schedule(req));
        assert!(!queue.schedule(req));
        assert!(queue.is_pending());
        assert_eq!(queue.scheduled_count(), 1);
        assert_eq!(queue.coalesced_count(), 1);

        assert_eq!(queue.take(), Some(req));
        assert_eq!(queue.take(), None);
        assert!(queue.schedule(req));
        assert_eq!(queue.scheduled_count(), 2);
    }

    #[test]
    fn test_deliver() {
        let sink = RecordingSink::new(false);
        let mut counters = counters_with_wp(100);

        let outcome = deliver("sdcard", true, &mut counters, &Thresholds::DEFAULT, &sink);
        assert_eq!(outcome, Delivery::Sent);
        assert_eq!(counters.notification, 1);

        let events = sink.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "sdcard");
        assert_eq!(events[0].1.get("IOERROR"), Some("YES"));
    }

    #[test]
    fn test_deliver_without_card() {
        let sink = RecordingSink::new(false);
        let mut counters = counters_with_wp(100);

        let outcome = deliver("sdcard", false, &mut counters, &Thresholds::DEFAULT, &sink);
        assert_eq!(outcome, Delivery::NoCard);
        assert_eq!(counters.notification, 0);
        assert!(sink.events.lock().is_empty());
    }

    #[test]
    fn test_deliver_failure_is_swallowed() {
        let sink = RecordingSink::new(true);
        let mut counters = counters_with_wp(100);

        let outcome = deliver("sdcard", true, &mut counters, &Thresholds::DEFAULT, &sink);
        assert_eq!(outcome, Delivery::Failed(MonitorError::EmitFailed(-12)));
        assert_eq!(counters.notification, 1);
    }
}
