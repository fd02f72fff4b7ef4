//! ---
//! hmc_section: "02-messaging-core"
//! hmc_subsection: "module"
//! hmc_type: "source"
//! hmc_scope: "code"
//! hmc_description: "Bookkeeping for periodically republished messages."
//! hmc_version: "v0.1.0-alpha"
//! hmc_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

use crate::bus::MessageBus;
use crate::generator::MessageGenerator;
use crate::types::Message;

/// Default upper bound of the one-time random start-up offset.
const DEFAULT_MAX_OFFSET: Duration = Duration::from_secs(300);

struct ScheduleEntry {
    message: Arc<Message>,
    generator: MessageGenerator,
    interval: Duration,
}

/// Owns the set of periodically republished messages.
///
/// Adding a message does not publish it immediately: its generator first
/// sleeps a random offset (up to five minutes by default) so that messages
/// scheduled near process start do not all hit the bus at once, then settles
/// into the fixed interval.
///
/// Schedule entries are matched by `Arc` identity, not value equality: two
/// structurally identical messages scheduled separately are distinct entries.
pub struct MessageScheduler {
    bus: Arc<MessageBus>,
    entries: Mutex<Vec<ScheduleEntry>>,
    max_offset: Duration,
}

impl MessageScheduler {
    /// Create a scheduler publishing onto `bus`.
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            bus,
            entries: Mutex::new(Vec::new()),
            max_offset: DEFAULT_MAX_OFFSET,
        }
    }

    /// Override the maximum random start-up offset. Zero disables the
    /// jitter entirely; tests rely on this to get deterministic timing.
    pub fn with_max_offset(mut self, max_offset: Duration) -> Self {
        self.max_offset = max_offset;
        self
    }

    /// Schedule `message` for republication every `interval`.
    pub fn add_message(&self, message: Arc<Message>, interval: Duration) {
        let offset = self.random_offset();
        debug!(kind = ?message.kind(), ?interval, ?offset, "message scheduled");
        let generator = MessageGenerator::spawn(
            Arc::clone(&self.bus),
            Arc::clone(&message),
            interval,
            offset,
        );
        self.entries.lock().push(ScheduleEntry {
            message,
            generator,
            interval,
        });
    }

    /// Stop republishing `message` and drop its schedule entry. The
    /// generator dies at its next interval boundary; absence is a no-op.
    pub fn remove_message(&self, message: &Arc<Message>) {
        self.entries.lock().retain(|entry| {
            if Arc::ptr_eq(&entry.message, message) {
                entry.generator.stop();
                debug!(kind = ?entry.message.kind(), "scheduled message removed");
                false
            } else {
                true
            }
        });
    }

    /// Replace the cadence of an already scheduled message. The old
    /// generator is stopped and the replacement starts counting
    /// `new_interval` immediately, with no fresh random offset.
    pub fn change_interval(&self, message: &Arc<Message>, new_interval: Duration) {
        let mut entries = self.entries.lock();
        for entry in entries.iter_mut() {
            if Arc::ptr_eq(&entry.message, message) {
                entry.generator.stop();
                entry.generator = MessageGenerator::spawn(
                    Arc::clone(&self.bus),
                    Arc::clone(&entry.message),
                    new_interval,
                    Duration::ZERO,
                );
                entry.interval = new_interval;
                debug!(kind = ?entry.message.kind(), ?new_interval, "schedule interval changed");
            }
        }
    }

    /// Number of currently scheduled messages.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the scheduler has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn random_offset(&self) -> Duration {
        if self.max_offset.is_zero() {
            return Duration::ZERO;
        }
        let jitter = rand::thread_rng().gen_range(0.0..self.max_offset.as_secs_f64());
        Duration::from_secs_f64(jitter)
    }
}

impl Drop for MessageScheduler {
    fn drop(&mut self) {
        // Abort outstanding timer tasks so a dropped scheduler leaks nothing.
        for entry in self.entries.get_mut().iter() {
            entry.generator.abort();
        }
    }
}
