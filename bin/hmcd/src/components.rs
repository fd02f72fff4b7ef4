//! ---
//! hmc_section: "01-backend-daemon"
//! hmc_subsection: "module"
//! hmc_type: "source"
//! hmc_scope: "code"
//! hmc_description: "In-process bus subscribers of the backend daemon."
//! hmc_version: "v0.1.0-alpha"
//! hmc_owner: "tbd"
//! ---
//! The backend's own subscribers. Both are deliberately thin: actual cache
//! building and configuration parsing live outside the messaging core, the
//! handlers only acknowledge the request and keep counters so operators can
//! see traffic in the logs.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use hmc_msg::{Message, MessageHandler, MessageKind, MessagePriority, SubscriptionMap};

/// Reloads the media configuration when the content-management UI announces
/// an update. Registered at very-high priority so it runs before anything
/// that consumes the refreshed configuration.
pub struct ConfigurationWatcher {
    reloads: AtomicU64,
}

impl ConfigurationWatcher {
    /// Create a watcher with zeroed counters.
    pub fn new() -> Self {
        Self {
            reloads: AtomicU64::new(0),
        }
    }

    /// Kind/priority map this component registers with.
    pub fn subscriptions() -> SubscriptionMap {
        let mut map = SubscriptionMap::new();
        map.insert(MessageKind::ContentConfUpdated, MessagePriority::VeryHigh);
        map
    }

    /// Number of configuration reloads performed so far.
    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }
}

impl MessageHandler for ConfigurationWatcher {
    fn name(&self) -> &str {
        "configuration-watcher"
    }

    fn handle(&self, message: &Message) -> anyhow::Result<()> {
        if message.kind() == MessageKind::ContentConfUpdated {
            let reloads = self.reloads.fetch_add(1, Ordering::Relaxed) + 1;
            info!(reloads, "media configuration updated; reloading");
        }
        Ok(())
    }
}

impl Default for ConfigurationWatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Acts on cache rebuild requests. Registered at very-low priority for
/// configuration updates so the watcher refreshes the configuration first.
pub struct MediaCacheManager {
    image_rebuilds: AtomicU64,
    music_rebuilds: AtomicU64,
    video_rebuilds: AtomicU64,
}

impl MediaCacheManager {
    /// Create a manager with zeroed counters.
    pub fn new() -> Self {
        Self {
            image_rebuilds: AtomicU64::new(0),
            music_rebuilds: AtomicU64::new(0),
            video_rebuilds: AtomicU64::new(0),
        }
    }

    /// Kind/priority map this component registers with.
    pub fn subscriptions() -> SubscriptionMap {
        let mut map = SubscriptionMap::new();
        map.insert(MessageKind::ContentConfUpdated, MessagePriority::VeryLow);
        map.insert(MessageKind::RebuildImageCache, MessagePriority::High);
        map.insert(MessageKind::RebuildMusicCache, MessagePriority::High);
        map.insert(MessageKind::RebuildVideoCache, MessagePriority::High);
        map
    }
}

impl MessageHandler for MediaCacheManager {
    fn name(&self) -> &str {
        "media-cache-manager"
    }

    fn handle(&self, message: &Message) -> anyhow::Result<()> {
        match message.kind() {
            MessageKind::ContentConfUpdated => {
                info!("content folders changed; cache targets refreshed");
            }
            MessageKind::RebuildImageCache => {
                let total = self.image_rebuilds.fetch_add(1, Ordering::Relaxed) + 1;
                info!(total, "image cache rebuild requested");
            }
            MessageKind::RebuildMusicCache => {
                let total = self.music_rebuilds.fetch_add(1, Ordering::Relaxed) + 1;
                info!(total, "music cache rebuild requested");
            }
            MessageKind::RebuildVideoCache => {
                let total = self.video_rebuilds.fetch_add(1, Ordering::Relaxed) + 1;
                info!(total, "video cache rebuild requested");
            }
        }
        Ok(())
    }
}

impl Default for MediaCacheManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hmc_msg::MessageBus;

    use super::*;

    #[test]
    fn watcher_counts_configuration_updates() {
        let bus = MessageBus::new();
        let watcher = Arc::new(ConfigurationWatcher::new());
        bus.register(watcher.clone(), &ConfigurationWatcher::subscriptions());

        bus.notify(&Message::new(MessageKind::ContentConfUpdated));
        bus.notify(&Message::new(MessageKind::RebuildMusicCache));
        assert_eq!(watcher.reloads(), 1);
    }
}
