//! ---
//! hmc_section: "02-messaging-core"
//! hmc_subsection: "module"
//! hmc_type: "source"
//! hmc_scope: "code"
//! hmc_description: "Background timer task republishing one fixed message."
//! hmc_version: "v0.1.0-alpha"
//! hmc_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::bus::MessageBus;
use crate::types::Message;

/// Timer task that republishes one fixed message onto the bus at a fixed
/// cadence.
///
/// The one-time `offset` is slept before the first interval so generators
/// created together do not all fire together. Stopping is cooperative: the
/// flag is checked once per interval boundary, so a generator that is mid
/// sleep when stopped dies at its next wake-up without publishing.
pub struct MessageGenerator {
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl MessageGenerator {
    /// Spawn a generator publishing `message` every `interval`, after an
    /// initial one-time `offset`.
    pub fn spawn(
        bus: Arc<MessageBus>,
        message: Arc<Message>,
        interval: Duration,
        offset: Duration,
    ) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(offset).await;
            loop {
                tokio::time::sleep(interval).await;
                if !flag.load(Ordering::Acquire) {
                    break;
                }
                bus.notify(&message);
            }
            debug!(kind = ?message.kind(), "message generator stopped");
        });
        Self { active, handle }
    }

    /// Ask the generator to stop at its next interval boundary.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Stop the generator and abort its task immediately.
    pub fn abort(&self) {
        self.stop();
        self.handle.abort();
    }
}
