//! # In-process message bus
//!
//! Process-wide publish/subscribe transport. Each subscriber owns an
//! independent bounded [`Inbox`]; publishers never block and never run
//! subscriber handlers inline. A full inbox counts the dropped message on a
//! counter shared with the owning task, which reports the loss as
//! entity-state degradation rather than silently discarding it.
//!
//! Ordering: FIFO per (publisher, subscriber); no ordering guarantee across
//! publishers.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::warn;
use thiserror::Error;

use crate::msg::{Message, MessageId, SYS_NONE};

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

/// Monotonic source of inbox identifiers.
static NEXT_INBOX_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default inbox capacity in messages.
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Identifies a subscriber inbox, used to implement loop-back exclusion.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct InboxId(u64);

/// Flags modifying a publish operation.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct PublishFlags(u8);

impl PublishFlags {
    pub const NONE: PublishFlags = PublishFlags(0);
    /// Deliver the message to the publisher's own inbox too.
    pub const LOOP_BACK: PublishFlags = PublishFlags(0x01);
    /// Keep the timestamp already present in the header.
    pub const KEEP_TIME: PublishFlags = PublishFlags(0x02);

    pub fn contains(&self, other: PublishFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(&self, other: PublishFlags) -> PublishFlags {
        PublishFlags(self.0 | other.0)
    }
}

/// A bounded receive queue owned by a single task.
pub struct Inbox {
    id: InboxId,
    rx: Receiver<Message>,
    tx: SyncSender<Message>,
    dropped: Arc<AtomicU64>,
}

/// One registered subscription.
struct Subscriber {
    inbox: InboxId,
    tx: SyncSender<Message>,
    dropped: Arc<AtomicU64>,

    /// Optional filter on the source entity id.
    src_ent: Option<u8>,
}

/// The process-wide bus. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Bus {
    registry: Arc<RwLock<HashMap<MessageId, Vec<Subscriber>>>>,

    /// This system's id, stamped onto unaddressed outgoing messages.
    system_id: u16,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("\"{0}\" is not a known message type name")]
    UnknownMessageName(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Inbox {
    /// Create an inbox with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = sync_channel(capacity);

        Self {
            id: InboxId(NEXT_INBOX_ID.fetch_add(1, Ordering::Relaxed)),
            rx,
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn id(&self) -> InboxId {
        self.id
    }

    /// Block until a message is ready or the timeout elapses.
    pub fn wait(&self, timeout_s: f64) -> Option<Message> {
        self.rx
            .recv_timeout(Duration::from_secs_f64(timeout_s.max(0.0)))
            .ok()
    }

    /// Take a pending message without blocking.
    pub fn try_recv(&self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Number of messages dropped on the floor because this inbox was full,
    /// since the last call. Resets the counter.
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new(DEFAULT_INBOX_CAPACITY)
    }
}

impl Bus {
    pub fn new(system_id: u16) -> Self {
        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            system_id,
        }
    }

    pub fn system_id(&self) -> u16 {
        self.system_id
    }

    /// Register a subscription of `inbox` to messages of type `id`.
    pub fn subscribe(&self, inbox: &Inbox, id: MessageId) {
        self.add_subscriber(inbox, id, None);
    }

    /// Register a subscription filtered by source entity id.
    pub fn subscribe_filtered(&self, inbox: &Inbox, id: MessageId, src_ent: u8) {
        self.add_subscriber(inbox, id, Some(src_ent));
    }

    /// Register subscriptions by abbreviated type names.
    ///
    /// Unknown names are a fatal configuration error: nothing is registered
    /// and the offending name is returned.
    pub fn subscribe_list(&self, inbox: &Inbox, names: &[&str]) -> Result<(), BusError> {
        let mut ids = Vec::with_capacity(names.len());

        for name in names {
            match MessageId::from_abbrev(name) {
                Some(id) => ids.push(id),
                None => return Err(BusError::UnknownMessageName((*name).into())),
            }
        }

        for id in ids {
            self.subscribe(inbox, id);
        }

        Ok(())
    }

    /// Publish a message.
    ///
    /// Stamps the source system when unset and the timestamp unless
    /// `KEEP_TIME` is given, then enqueues a copy for every matching
    /// subscriber. The publisher's own inbox (`origin`) is skipped unless
    /// `LOOP_BACK` is set.
    pub fn publish(
        &self,
        mut msg: Message,
        flags: PublishFlags,
        now_epoch: f64,
        origin: Option<InboxId>,
    ) {
        if msg.header.src_sys == SYS_NONE {
            msg.header.src_sys = self.system_id;
        }

        if !flags.contains(PublishFlags::KEEP_TIME) {
            msg.header.timestamp = now_epoch;
        }

        let id = msg.id();
        let mut dead = Vec::new();

        {
            let registry = self.registry.read().unwrap_or_else(|p| p.into_inner());

            if let Some(subs) = registry.get(&id) {
                for sub in subs {
                    if Some(sub.inbox) == origin && !flags.contains(PublishFlags::LOOP_BACK) {
                        continue;
                    }

                    if let Some(src_ent) = sub.src_ent {
                        if msg.header.src_ent != src_ent {
                            continue;
                        }
                    }

                    match sub.tx.try_send(msg.clone()) {
                        Ok(()) => (),
                        Err(TrySendError::Full(_)) => {
                            sub.dropped.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            dead.push(sub.inbox);
                        }
                    }
                }
            }
        }

        // Drop subscriptions whose inboxes are gone
        if !dead.is_empty() {
            let mut registry = self.registry.write().unwrap_or_else(|p| p.into_inner());

            if let Some(subs) = registry.get_mut(&id) {
                subs.retain(|s| !dead.contains(&s.inbox));
            }
        }
    }

    fn add_subscriber(&self, inbox: &Inbox, id: MessageId, src_ent: Option<u8>) {
        let mut registry = self.registry.write().unwrap_or_else(|p| p.into_inner());

        let subs = registry.entry(id).or_insert_with(Vec::new);

        if subs
            .iter()
            .any(|s| s.inbox == inbox.id && s.src_ent == src_ent)
        {
            warn!(
                "Duplicate subscription of inbox {:?} to message id {}",
                inbox.id, id.0
            );
            return;
        }

        subs.push(Subscriber {
            inbox: inbox.id,
            tx: inbox.tx.clone(),
            dropped: inbox.dropped.clone(),
            src_ent,
        });
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::msg::{DesiredZ, Payload, ZUnits, ENT_NONE};

    fn z_msg(value: f64) -> Message {
        Message::new(Payload::DesiredZ(DesiredZ {
            value,
            z_units: ZUnits::Depth,
        }))
    }

    #[test]
    fn test_publish_subscribe() {
        let bus = Bus::new(0x20);
        let inbox = Inbox::default();

        bus.subscribe(&inbox, MessageId::DESIRED_Z);
        bus.publish(z_msg(3.0), PublishFlags::NONE, 100.0, None);

        let msg = inbox.wait(0.1).unwrap();
        assert_eq!(msg.header.src_sys, 0x20);
        assert_eq!(msg.header.timestamp, 100.0);
        assert!(matches!(msg.payload, Payload::DesiredZ(ref z) if z.value == 3.0));

        // Not subscribed to anything else
        bus.publish(
            Message::new(Payload::Abort),
            PublishFlags::NONE,
            101.0,
            None,
        );
        assert!(inbox.wait(0.05).is_none());
    }

    #[test]
    fn test_keep_time() {
        let bus = Bus::new(0x20);
        let inbox = Inbox::default();
        bus.subscribe(&inbox, MessageId::DESIRED_Z);

        let mut msg = z_msg(1.0);
        msg.header.timestamp = 42.0;
        bus.publish(msg, PublishFlags::KEEP_TIME, 100.0, None);

        assert_eq!(inbox.wait(0.1).unwrap().header.timestamp, 42.0);
    }

    #[test]
    fn test_loop_back() {
        let bus = Bus::new(0x20);
        let inbox = Inbox::default();
        bus.subscribe(&inbox, MessageId::DESIRED_Z);

        // Without LOOP_BACK own messages are not delivered
        bus.publish(z_msg(1.0), PublishFlags::NONE, 0.0, Some(inbox.id()));
        assert!(inbox.wait(0.05).is_none());

        // With LOOP_BACK they are
        bus.publish(z_msg(2.0), PublishFlags::LOOP_BACK, 0.0, Some(inbox.id()));
        assert!(inbox.wait(0.1).is_some());
    }

    #[test]
    fn test_source_entity_filter() {
        let bus = Bus::new(0x20);
        let inbox = Inbox::default();
        bus.subscribe_filtered(&inbox, MessageId::DESIRED_Z, 3);

        let mut msg = z_msg(1.0);
        msg.header.src_ent = 7;
        bus.publish(msg, PublishFlags::NONE, 0.0, None);
        assert!(inbox.wait(0.05).is_none());

        let mut msg = z_msg(2.0);
        msg.header.src_ent = 3;
        bus.publish(msg, PublishFlags::NONE, 0.0, None);
        assert!(inbox.wait(0.1).is_some());
    }

    #[test]
    fn test_overflow_counts_drops() {
        let bus = Bus::new(0x20);
        let inbox = Inbox::new(2);
        bus.subscribe(&inbox, MessageId::DESIRED_Z);

        for i in 0..5 {
            bus.publish(z_msg(i as f64), PublishFlags::NONE, 0.0, None);
        }

        assert_eq!(inbox.take_dropped(), 3);
        assert_eq!(inbox.take_dropped(), 0);

        // The two oldest messages survived, in order
        assert!(matches!(
            inbox.wait(0.1).unwrap().payload,
            Payload::DesiredZ(ref z) if z.value == 0.0
        ));
        assert!(matches!(
            inbox.wait(0.1).unwrap().payload,
            Payload::DesiredZ(ref z) if z.value == 1.0
        ));
    }

    #[test]
    fn test_fifo_per_publisher() {
        let bus = Bus::new(0x20);
        let inbox = Inbox::default();
        bus.subscribe(&inbox, MessageId::DESIRED_Z);

        for i in 0..10 {
            bus.publish(z_msg(i as f64), PublishFlags::NONE, 0.0, None);
        }

        for i in 0..10 {
            let msg = inbox.wait(0.1).unwrap();
            assert!(matches!(
                msg.payload,
                Payload::DesiredZ(ref z) if z.value == i as f64
            ));
        }
    }

    #[test]
    fn test_subscribe_list() {
        let bus = Bus::new(0x20);
        let inbox = Inbox::default();

        bus.subscribe_list(&inbox, &["DesiredZ", "Abort"]).unwrap();

        bus.publish(Message::new(Payload::Abort), PublishFlags::NONE, 0.0, None);
        assert!(inbox.wait(0.1).is_some());

        // Unknown names are fatal and register nothing
        let err = bus
            .subscribe_list(&inbox, &["VehicleState", "Bogus"])
            .unwrap_err();
        assert!(matches!(err, BusError::UnknownMessageName(ref n) if n == "Bogus"));

        let vs = Message::new(Payload::VehicleState(Default::default()));
        bus.publish(vs, PublishFlags::NONE, 0.0, None);
        assert!(inbox.wait(0.05).is_none());
    }

    #[test]
    fn test_source_entity_left_unstamped() {
        // The bus stamps the system id but entity identity belongs to the
        // dispatching task
        let bus = Bus::new(0x20);
        let inbox = Inbox::default();
        bus.subscribe(&inbox, MessageId::DESIRED_Z);

        bus.publish(z_msg(1.0), PublishFlags::NONE, 0.0, None);
        assert_eq!(inbox.wait(0.1).unwrap().header.src_ent, ENT_NONE);
    }
}
