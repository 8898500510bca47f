//! The Informer: serializes outgoing call snapshots and message events
//! and routes them through the Hub. Three entry points — call signals,
//! message events, chat events — all funneling through a single
//! "connect" signal kind for call snapshots.

use crate::hub::{ChatEvent, ChatOp, Hub, MessageEvent, MessageOp, SignalEvent};
use crate::models::{CallStatus, CallWithParticipants, Chat, ChatId, DeviceId, Message, UserId};
use crate::repository::Repository;
use std::sync::Arc;

pub struct Informer {
    repo: Arc<dyn Repository>,
    hub: Arc<Hub>,
}

impl Informer {
    pub fn new(repo: Arc<dyn Repository>, hub: Arc<Hub>) -> Self {
        Self { repo, hub }
    }

    /// `status` overrides `call.call.status` in the outgoing payload
    /// without touching persisted state — used to tell a subset of
    /// participants "ignored"/"disconnected" while the call itself
    /// carries on for everyone else.
    fn snapshot(call: &CallWithParticipants, status: CallStatus) -> serde_json::Value {
        serde_json::json!({
            "id": call.call.id,
            "status": status as i32,
            "initiator": call.call.initiator,
            "chat": call.call.chat,
            "start": call.call.start,
            "group": call.call.kind == crate::models::CallKind::Group,
            "users": call.user_ids(),
        })
    }

    /// Publishes a `connect` signal carrying the call snapshot. When
    /// `to` is given, only those participants are targeted; otherwise
    /// every non-disconnected participant is. `status` defaults to the
    /// call's own persisted status.
    pub fn send_signal_to_call(
        &self,
        call: &CallWithParticipants,
        status: Option<CallStatus>,
        to: Option<&[UserId]>,
    ) {
        let (users, devices): (Vec<UserId>, Vec<DeviceId>) = match to {
            Some(subset) => call
                .participants
                .iter()
                .filter(|p| subset.contains(&p.user))
                .map(|p| (p.user, p.device))
                .unzip(),
            None => call.non_disconnected().map(|p| (p.user, p.device)).unzip(),
        };

        self.hub.publish_signal(SignalEvent {
            kind: "connect".into(),
            body: Self::snapshot(call, status.unwrap_or(call.call.status)),
            users,
            devices,
        });
    }

    pub fn send_signal_to_user(&self, user: UserId, payload: serde_json::Value) {
        self.hub.publish_signal(SignalEvent {
            kind: "connect".into(),
            body: payload,
            users: vec![user],
            devices: vec![0],
        });
    }

    pub fn send_raw_signal(&self, kind: &str, body: serde_json::Value, users: Vec<UserId>, devices: Vec<DeviceId>) {
        self.hub.publish_signal(SignalEvent {
            kind: kind.to_string(),
            body,
            users,
            devices,
        });
    }

    /// Persists (if requested), publishes to `messages`, and updates the
    /// chat's unread counters and last-message pointer.
    pub fn send_message_event(
        &self,
        chat: ChatId,
        mut msg: Message,
        op: MessageOp,
        originator_device: DeviceId,
        persist: bool,
    ) -> crate::error::CoreResult<Message> {
        if persist {
            msg.id = self.repo.save_message(&msg)?;
        }

        let recipients = self.repo.members_of(chat);
        self.hub.publish_message(MessageEvent {
            op,
            message: msg.clone(),
            originator_device,
            recipients,
        });

        self.repo.increment_counters(chat, msg.author)?;
        self.repo.set_last_message(chat, msg.id)?;

        Ok(msg)
    }

    pub fn send_chat_event(
        &self,
        chat_id: ChatId,
        initiating_user: UserId,
        op: ChatOp,
        chat: Option<Chat>,
        explicit_users: Option<Vec<UserId>>,
    ) {
        let recipients = self.repo.members_of(chat_id);
        self.hub.publish_chat(ChatEvent {
            op,
            chat_id,
            initiating_user,
            explicit_users,
            chat,
            recipients,
        });
    }
}
