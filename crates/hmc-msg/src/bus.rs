//! ---
//! hmc_section: "02-messaging-core"
//! hmc_subsection: "module"
//! hmc_type: "source"
//! hmc_scope: "code"
//! hmc_description: "Priority-ordered message bus and handler capability."
//! hmc_version: "v0.1.0-alpha"
//! hmc_owner: "tbd"
//! ---
use std::sync::Arc;

use parking_lot::Mutex;
use strum::EnumCount;
use tracing::{debug, warn};

use crate::types::{Message, MessageKind, MessagePriority, SubscriptionMap};

/// Capability interface implemented by every bus subscriber.
///
/// Handlers run on the publisher's task while the bus is locked, so
/// [`MessageHandler::handle`] must return quickly. Anything slow belongs on a
/// channel drained by a dedicated worker.
pub trait MessageHandler: Send + Sync {
    /// Stable name used for log attribution.
    fn name(&self) -> &str;

    /// Process one message. An `Err` is logged by the bus and dispatch
    /// continues with the remaining handlers.
    fn handle(&self, message: &Message) -> anyhow::Result<()>;
}

struct Registration {
    priority: MessagePriority,
    handler: Arc<dyn MessageHandler>,
}

/// Central registry and dispatcher of the backend messaging system.
///
/// The bus maps each [`MessageKind`] to a priority-ordered list of handlers
/// and fans messages out synchronously under a single process-wide lock.
/// One bus per backend process is a deployment convention, not a singleton:
/// components receive an `Arc<MessageBus>` at construction time.
pub struct MessageBus {
    // One slot per message kind; a single lock because unregistration must
    // atomically touch every slot.
    handlers: Mutex<[Vec<Registration>; MessageKind::COUNT]>,
}

impl MessageBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(std::array::from_fn(|_| Vec::new())),
        }
    }

    /// Register `handler` for every kind in `subscriptions` at the given
    /// priorities.
    ///
    /// Registrations are additive: registering the same handler again adds
    /// another delivery, it does not replace the previous one. Each touched
    /// list is re-sorted with a stable sort, so handlers at equal priority
    /// keep their registration order.
    pub fn register(&self, handler: Arc<dyn MessageHandler>, subscriptions: &SubscriptionMap) {
        let mut table = self.handlers.lock();
        for (kind, priority) in subscriptions {
            let slot = &mut table[kind.index()];
            slot.push(Registration {
                priority: *priority,
                handler: Arc::clone(&handler),
            });
            slot.sort_by_key(|registration| registration.priority);
        }
        debug!(handler = handler.name(), subscriptions = subscriptions.len(), "handler registered");
    }

    /// Remove every registration of `handler`, across all kinds and
    /// priorities. Handlers are matched by pointer identity, and removing a
    /// handler that was never registered is a no-op.
    pub fn unregister(&self, handler: &Arc<dyn MessageHandler>) {
        let mut table = self.handlers.lock();
        for slot in table.iter_mut() {
            slot.retain(|registration| !Arc::ptr_eq(&registration.handler, handler));
        }
        debug!(handler = handler.name(), "handler unregistered");
    }

    /// Number of registrations currently held for `kind`. Duplicate
    /// registrations of one handler count separately.
    pub fn subscriber_count(&self, kind: MessageKind) -> usize {
        self.handlers.lock()[kind.index()].len()
    }

    /// Publish a message to every handler registered for its kind, in
    /// ascending priority order.
    ///
    /// A kind with no registrations is a silent no-op. The whole fan-out runs
    /// under the bus lock, so concurrent `notify` calls are serialized. A
    /// failing handler is logged and skipped; it never breaks delivery to the
    /// remaining handlers.
    pub fn notify(&self, message: &Message) {
        let table = self.handlers.lock();
        let slot = &table[message.kind().index()];
        debug!(kind = ?message.kind(), handlers = slot.len(), "message on the bus");
        for registration in slot {
            if let Err(error) = registration.handler.handle(message) {
                warn!(
                    handler = registration.handler.name(),
                    kind = ?message.kind(),
                    error = %error,
                    "handler failed; continuing dispatch"
                );
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Appends its name to a shared call log on every delivery.
    struct RecordingHandler {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        calls: AtomicUsize,
    }

    impl RecordingHandler {
        fn new(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                log,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl MessageHandler for RecordingHandler {
        fn name(&self) -> &str {
            self.name
        }

        fn handle(&self, _message: &Message) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().push(self.name);
            Ok(())
        }
    }

    struct FailingHandler;

    impl MessageHandler for FailingHandler {
        fn name(&self) -> &str {
            "failing"
        }

        fn handle(&self, _message: &Message) -> anyhow::Result<()> {
            anyhow::bail!("simulated handler fault")
        }
    }

    fn subscriptions(entries: &[(MessageKind, MessagePriority)]) -> SubscriptionMap {
        entries.iter().copied().collect()
    }

    #[test]
    fn dispatch_follows_ascending_priority() {
        let bus = MessageBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let low = RecordingHandler::new("low", Arc::clone(&log));
        let normal = RecordingHandler::new("normal", Arc::clone(&log));
        let very_high = RecordingHandler::new("very_high", Arc::clone(&log));

        // Registration order is deliberately not priority order.
        bus.register(
            low.clone(),
            &subscriptions(&[(MessageKind::RebuildMusicCache, MessagePriority::Low)]),
        );
        bus.register(
            very_high.clone(),
            &subscriptions(&[(MessageKind::RebuildMusicCache, MessagePriority::VeryHigh)]),
        );
        bus.register(
            normal.clone(),
            &subscriptions(&[(MessageKind::RebuildMusicCache, MessagePriority::Normal)]),
        );

        bus.notify(&Message::new(MessageKind::RebuildMusicCache));
        assert_eq!(*log.lock(), vec!["very_high", "normal", "low"]);
    }

    #[test]
    fn equal_priorities_keep_registration_order() {
        let bus = MessageBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = RecordingHandler::new("first", Arc::clone(&log));
        let second = RecordingHandler::new("second", Arc::clone(&log));

        let map = subscriptions(&[(MessageKind::ContentConfUpdated, MessagePriority::Normal)]);
        bus.register(first, &map);
        bus.register(second, &map);

        bus.notify(&Message::new(MessageKind::ContentConfUpdated));
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn unregister_removes_every_registration() {
        let bus = MessageBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = RecordingHandler::new("multi", Arc::clone(&log));

        bus.register(
            handler.clone(),
            &subscriptions(&[
                (MessageKind::RebuildImageCache, MessagePriority::High),
                (MessageKind::RebuildVideoCache, MessagePriority::Low),
            ]),
        );
        // A second registration for one of the kinds must disappear as well.
        bus.register(
            handler.clone(),
            &subscriptions(&[(MessageKind::RebuildImageCache, MessagePriority::VeryLow)]),
        );

        let as_dyn: Arc<dyn MessageHandler> = handler.clone();
        bus.unregister(&as_dyn);

        bus.notify(&Message::new(MessageKind::RebuildImageCache));
        bus.notify(&Message::new(MessageKind::RebuildVideoCache));
        assert_eq!(handler.calls(), 0);
    }

    #[test]
    fn unregistering_an_unknown_handler_is_a_noop() {
        let bus = MessageBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let stranger: Arc<dyn MessageHandler> = RecordingHandler::new("stranger", log);
        bus.unregister(&stranger);
    }

    #[test]
    fn kind_without_registrations_is_a_noop() {
        let bus = MessageBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = RecordingHandler::new("music", Arc::clone(&log));
        bus.register(
            handler.clone(),
            &subscriptions(&[(MessageKind::RebuildMusicCache, MessagePriority::Normal)]),
        );

        bus.notify(&Message::new(MessageKind::RebuildVideoCache));
        assert_eq!(handler.calls(), 0);
    }

    #[test]
    fn handler_on_several_kinds_is_delivered_once_per_notify() {
        let bus = MessageBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = RecordingHandler::new("both", Arc::clone(&log));
        bus.register(
            handler.clone(),
            &subscriptions(&[
                (MessageKind::RebuildMusicCache, MessagePriority::High),
                (MessageKind::RebuildVideoCache, MessagePriority::Low),
            ]),
        );

        bus.notify(&Message::new(MessageKind::RebuildMusicCache));
        assert_eq!(handler.calls(), 1);
        bus.notify(&Message::new(MessageKind::RebuildVideoCache));
        assert_eq!(handler.calls(), 2);
    }

    #[test]
    fn duplicate_registrations_deliver_twice() {
        let bus = MessageBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = RecordingHandler::new("twice", Arc::clone(&log));
        let map = subscriptions(&[(MessageKind::ContentConfUpdated, MessagePriority::Normal)]);
        bus.register(handler.clone(), &map);
        bus.register(handler.clone(), &map);

        bus.notify(&Message::new(MessageKind::ContentConfUpdated));
        assert_eq!(handler.calls(), 2);
    }

    #[test]
    fn subscriber_count_tracks_register_and_unregister() {
        let bus = MessageBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = RecordingHandler::new("counted", Arc::clone(&log));

        assert_eq!(bus.subscriber_count(MessageKind::RebuildImageCache), 0);
        bus.register(
            handler.clone(),
            &subscriptions(&[
                (MessageKind::RebuildImageCache, MessagePriority::High),
                (MessageKind::RebuildVideoCache, MessagePriority::Low),
            ]),
        );
        bus.register(
            handler.clone(),
            &subscriptions(&[(MessageKind::RebuildImageCache, MessagePriority::VeryLow)]),
        );
        assert_eq!(bus.subscriber_count(MessageKind::RebuildImageCache), 2);
        assert_eq!(bus.subscriber_count(MessageKind::RebuildVideoCache), 1);
        assert_eq!(bus.subscriber_count(MessageKind::ContentConfUpdated), 0);

        let as_dyn: Arc<dyn MessageHandler> = handler;
        bus.unregister(&as_dyn);
        assert_eq!(bus.subscriber_count(MessageKind::RebuildImageCache), 0);
        assert_eq!(bus.subscriber_count(MessageKind::RebuildVideoCache), 0);
    }

    #[test]
    fn failing_handler_does_not_break_fanout() {
        let bus = MessageBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let survivor = RecordingHandler::new("survivor", Arc::clone(&log));

        bus.register(
            Arc::new(FailingHandler),
            &subscriptions(&[(MessageKind::RebuildImageCache, MessagePriority::VeryHigh)]),
        );
        bus.register(
            survivor.clone(),
            &subscriptions(&[(MessageKind::RebuildImageCache, MessagePriority::Normal)]),
        );

        bus.notify(&Message::new(MessageKind::RebuildImageCache));
        assert_eq!(survivor.calls(), 1);
    }
}
