//! The event fan-out hub: three topics (messages, chats, signaling),
//! each gated by a pure guard over (event, subscriber). Guards are
//! expressed as a match over one sum type per topic rather than
//! dynamic predicates — there's only ever three topics and their
//! payload shapes are fixed, so dynamic dispatch buys nothing.
//!
//! Delivery is per-client and non-blocking: each subscriber owns a
//! bounded `tokio::sync::mpsc` channel, and a client that can't keep up
//! is dropped from the subscriber table rather than stalling the
//! publisher. A single shared broadcast channel was considered and
//! rejected: the `signal` topic needs per-device targeting, which a
//! broadcast-and-filter model can't do without handing every subscriber
//! a copy of payloads meant for someone else's devices.

use crate::models::{Chat, ChatId, DeviceId, Message, UserId};
use tokio::sync::mpsc;

/// Per-subscriber channel depth before a client is considered stalled.
const CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOp {
    Add,
    Update,
    Remove,
    Append,
}

#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub op: MessageOp,
    pub message: Message,
    pub originator_device: DeviceId,
    /// Members of `message.chat` at publish time, supplied by the
    /// caller (who already consulted the Repository). The Hub itself
    /// never talks to storage.
    pub recipients: Vec<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOp {
    Add,
    Update,
    SetUsers,
    Leave,
}

#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub op: ChatOp,
    pub chat_id: ChatId,
    pub initiating_user: UserId,
    /// When set, only these users are eligible regardless of current
    /// membership (used for `setUsers`/`leave`, where someone removed
    /// from the chat still needs the update).
    pub explicit_users: Option<Vec<UserId>>,
    pub chat: Option<Chat>,
    pub recipients: Vec<UserId>,
}

#[derive(Debug, Clone)]
pub struct SignalEvent {
    pub kind: String,
    pub body: serde_json::Value,
    pub users: Vec<UserId>,
    /// Parallel to `users`; 0 means "every device of that user".
    pub devices: Vec<DeviceId>,
}

#[derive(Debug, Clone)]
pub enum HubEvent {
    Message(MessageEvent),
    Chat(ChatEvent),
    Signal(SignalEvent),
}

fn message_guard(event: &MessageEvent, user: UserId, device: DeviceId) -> bool {
    event.originator_device != device && event.recipients.contains(&user)
}

fn chat_guard(event: &ChatEvent, user: UserId, _device: DeviceId) -> bool {
    if event.initiating_user == user {
        return false;
    }
    match &event.explicit_users {
        Some(list) => list.contains(&user),
        None => event.recipients.contains(&user),
    }
}

fn signal_guard(event: &SignalEvent, user: UserId, device: DeviceId) -> bool {
    event
        .users
        .iter()
        .zip(event.devices.iter())
        .any(|(&u, &d)| u == user && (d == 0 || d == device))
}

struct Subscriber {
    user: UserId,
    device: DeviceId,
    tx: mpsc::Sender<HubEvent>,
}

/// The Hub's subscriber table. Reads (publishes) take the read side;
/// subscribe/unsubscribe take the write side.
#[derive(Default)]
pub struct Hub {
    subscribers: std::sync::RwLock<Vec<Subscriber>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new client connection and returns its receiving end.
    /// A client that reconnects with the same (user, device) replaces
    /// its previous entry.
    pub fn subscribe(&self, user: UserId, device: DeviceId) -> mpsc::Receiver<HubEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut subs = self.subscribers.write().unwrap();
        subs.retain(|s| !(s.user == user && s.device == device));
        subs.push(Subscriber { user, device, tx });
        rx
    }

    pub fn unsubscribe(&self, user: UserId, device: DeviceId) {
        let mut subs = self.subscribers.write().unwrap();
        subs.retain(|s| !(s.user == user && s.device == device));
    }

    pub fn publish_message(&self, event: MessageEvent) {
        self.publish(HubEvent::Message(event), |e, user, device| match e {
            HubEvent::Message(m) => message_guard(m, user, device),
            _ => false,
        });
    }

    pub fn publish_chat(&self, event: ChatEvent) {
        self.publish(HubEvent::Chat(event), |e, user, device| match e {
            HubEvent::Chat(c) => chat_guard(c, user, device),
            _ => false,
        });
    }

    pub fn publish_signal(&self, event: SignalEvent) {
        self.publish(HubEvent::Signal(event), |e, user, device| match e {
            HubEvent::Signal(s) => signal_guard(s, user, device),
            _ => false,
        });
    }

    fn publish(&self, event: HubEvent, guard: impl Fn(&HubEvent, UserId, DeviceId) -> bool) {
        let subs = self.subscribers.read().unwrap();
        let mut stalled = Vec::new();

        for (idx, sub) in subs.iter().enumerate() {
            if !guard(&event, sub.user, sub.device) {
                continue;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(user = sub.user, device = sub.device, "stalled subscriber, dropping");
                    stalled.push(idx);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    stalled.push(idx);
                }
            }
        }
        drop(subs);

        if !stalled.is_empty() {
            let mut subs = self.subscribers.write().unwrap();
            let mut idx = 0;
            subs.retain(|_| {
                let keep = !stalled.contains(&idx);
                idx += 1;
                keep
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatKind, MessageKind};

    fn sample_message(chat: ChatId) -> Message {
        Message {
            id: 1,
            chat,
            author: 1,
            date: chrono::Utc::now(),
            kind: MessageKind::Text,
            body: "hi".into(),
            edited: false,
            related_entity: None,
            reactions: Default::default(),
        }
    }

    #[tokio::test]
    async fn message_guard_excludes_originator_device_and_non_members() {
        let hub = Hub::new();
        let mut rx_member = hub.subscribe(2, 202);
        let mut rx_origin = hub.subscribe(1, 101);
        let mut rx_outsider = hub.subscribe(9, 909);

        hub.publish_message(MessageEvent {
            op: MessageOp::Add,
            message: sample_message(10),
            originator_device: 101,
            recipients: vec![1, 2],
        });

        assert!(rx_member.try_recv().is_ok());
        assert!(rx_origin.try_recv().is_err());
        assert!(rx_outsider.try_recv().is_err());
    }

    #[tokio::test]
    async fn chat_guard_never_delivers_to_initiator() {
        let hub = Hub::new();
        let mut rx_initiator = hub.subscribe(1, 101);
        let mut rx_other = hub.subscribe(2, 202);

        hub.publish_chat(ChatEvent {
            op: ChatOp::Update,
            chat_id: 10,
            initiating_user: 1,
            explicit_users: None,
            chat: Some(Chat {
                id: 10,
                kind: ChatKind::Direct,
                name: String::new(),
                avatar: String::new(),
                last_message: None,
            }),
            recipients: vec![1, 2],
        });

        assert!(rx_initiator.try_recv().is_err());
        assert!(rx_other.try_recv().is_ok());
    }

    #[tokio::test]
    async fn signal_guard_honors_device_wildcard() {
        let hub = Hub::new();
        let mut rx_a = hub.subscribe(2, 202);
        let mut rx_b = hub.subscribe(2, 203);

        hub.publish_signal(SignalEvent {
            kind: "connect".into(),
            body: serde_json::json!({}),
            users: vec![2],
            devices: vec![0],
        });

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn stalled_subscriber_is_dropped_not_backpressured() {
        let hub = Hub::new();
        let _rx = hub.subscribe(1, 101);

        for _ in 0..CHANNEL_CAPACITY + 10 {
            hub.publish_message(MessageEvent {
                op: MessageOp::Add,
                message: sample_message(10),
                originator_device: 0,
                recipients: vec![1],
            });
        }

        assert_eq!(hub.subscribers.read().unwrap().len(), 0);
    }
}
