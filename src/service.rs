//! The RPC facade: the entry points a (currently out-of-scope) transport
//! layer calls. `Service` owns one instance of each component and
//! exposes the `message.*` / `chat.*` / `call.*` operations as plain
//! methods, sync where storage is the only thing touched and async
//! where the call engine or SFU is involved.

use crate::call::CallEngine;
use crate::config::FeatureFlags;
use crate::error::{CoreError, CoreResult};
use crate::hub::{ChatOp, Hub, MessageOp};
use crate::informer::Informer;
use crate::models::*;
use crate::repository::Repository;
use crate::sanitize;
use crate::Ctx;
use chrono::Utc;
use std::sync::Arc;

pub struct Service {
    pub repo: Arc<dyn Repository>,
    pub hub: Arc<Hub>,
    pub informer: Arc<Informer>,
    pub calls: Arc<CallEngine>,
    pub flags: FeatureFlags,
}

impl Service {
    pub fn new(
        repo: Arc<dyn Repository>,
        hub: Arc<Hub>,
        informer: Arc<Informer>,
        calls: Arc<CallEngine>,
        flags: FeatureFlags,
    ) -> Self {
        Self {
            repo,
            hub,
            informer,
            calls,
            flags,
        }
    }

    fn require_member(&self, user: UserId, chat: ChatId) -> CoreResult<()> {
        if self.repo.is_member(user, chat) {
            Ok(())
        } else {
            Err(CoreError::AccessDenied)
        }
    }

    // --- message.* --------------------------------------------------------

    pub fn message_get_all(&self, ctx: Ctx, chat: ChatId) -> CoreResult<Vec<Message>> {
        self.require_member(ctx.user, chat)?;
        let messages = self.repo.get_all_messages(chat)?;
        Ok(messages.into_iter().map(|m| self.redact_reactions(m)).collect())
    }

    /// Clears `reactions` when the feature is disabled, so a flipped
    /// flag doesn't require a storage migration to take effect.
    fn redact_reactions(&self, mut msg: Message) -> Message {
        if !self.flags.with_reactions {
            msg.reactions.clear();
        }
        msg
    }

    pub fn message_add(&self, ctx: Ctx, chat: ChatId, text: &str, origin_tag: &str) -> CoreResult<Message> {
        self.require_member(ctx.user, chat)?;

        let msg = Message {
            id: 0,
            chat,
            author: ctx.user,
            date: Utc::now(),
            kind: MessageKind::Text,
            body: sanitize::html_escape(text),
            edited: false,
            related_entity: None,
            reactions: Default::default(),
        };

        self.informer
            .send_message_event(chat, msg, MessageOp::Add, ctx.device, true)
    }

    pub fn message_update(&self, ctx: Ctx, msg_id: MessageId, text: &str) -> CoreResult<Message> {
        let mut msg = self.repo.get_message(msg_id)?;
        if msg.author != ctx.user {
            return Err(CoreError::AccessDenied);
        }
        msg.body = sanitize::html_escape(text);
        msg.edited = true;
        self.repo.save_message(&msg)?;

        let recipients = self.repo.members_of(msg.chat);
        self.hub.publish_message(crate::hub::MessageEvent {
            op: MessageOp::Update,
            message: msg.clone(),
            originator_device: ctx.device,
            recipients,
        });

        Ok(self.redact_reactions(msg))
    }

    pub fn message_remove(&self, ctx: Ctx, msg_id: MessageId) -> CoreResult<()> {
        let msg = self.repo.get_message(msg_id)?;
        if msg.author != ctx.user {
            return Err(CoreError::AccessDenied);
        }
        self.repo.delete_message(msg_id)?;

        let recipients = self.repo.members_of(msg.chat);
        self.hub.publish_message(crate::hub::MessageEvent {
            op: MessageOp::Remove,
            message: msg,
            originator_device: ctx.device,
            recipients,
        });
        Ok(())
    }

    pub fn message_reset_counter(&self, ctx: Ctx, chat: ChatId) -> CoreResult<()> {
        self.require_member(ctx.user, chat)?;
        self.repo.reset_counter(chat, ctx.user)
    }

    pub fn message_add_reaction(&self, ctx: Ctx, msg_id: MessageId, reaction: &str) -> CoreResult<bool> {
        if !self.flags.with_reactions {
            return Err(CoreError::FeatureDisabled);
        }
        let msg = self.repo.get_message(msg_id)?;
        if msg.author == ctx.user {
            return Err(CoreError::InvalidArgument("cannot react to your own message".into()));
        }
        self.require_member(ctx.user, msg.chat)?;

        let added = self.repo.add_reaction(msg_id, reaction, ctx.user)?;
        if added {
            let recipients = self.repo.members_of(msg.chat);
            self.hub.publish_message(crate::hub::MessageEvent {
                op: MessageOp::Update,
                message: self.repo.get_message(msg_id)?,
                originator_device: ctx.device,
                recipients,
            });
        }
        Ok(added)
    }

    pub fn message_remove_reaction(&self, ctx: Ctx, msg_id: MessageId, reaction: &str) -> CoreResult<()> {
        if !self.flags.with_reactions {
            return Err(CoreError::FeatureDisabled);
        }
        let msg = self.repo.get_message(msg_id)?;
        self.require_member(ctx.user, msg.chat)?;
        self.repo.remove_reaction(msg_id, reaction, ctx.user)?;

        let recipients = self.repo.members_of(msg.chat);
        self.hub.publish_message(crate::hub::MessageEvent {
            op: MessageOp::Update,
            message: self.repo.get_message(msg_id)?,
            originator_device: ctx.device,
            recipients,
        });
        Ok(())
    }

    // --- chat.* -------------------------------------------------------

    pub fn chat_add_direct(&self, ctx: Ctx, other_user: UserId) -> CoreResult<Chat> {
        let chat_id = self.repo.add_direct(ctx.user, other_user)?;
        let chat = self.repo.get_chat(chat_id)?;
        self.informer.send_chat_event(
            chat_id,
            ctx.user,
            ChatOp::Add,
            Some(chat.clone()),
            Some(vec![ctx.user, other_user]),
        );
        Ok(chat)
    }

    pub fn chat_add_group(&self, ctx: Ctx, name: &str, avatar: &str, users: &[UserId]) -> CoreResult<Chat> {
        let name = sanitize::html_escape(name);
        let avatar = sanitize::strip_quotes(avatar);
        let mut members = users.to_vec();
        if !members.contains(&ctx.user) {
            members.push(ctx.user);
        }
        let chat_id = self.repo.add_group(&name, &avatar, &members)?;
        let chat = self.repo.get_chat(chat_id)?;
        self.informer.send_chat_event(
            chat_id,
            ctx.user,
            ChatOp::Add,
            Some(chat.clone()),
            Some(members),
        );
        Ok(chat)
    }

    pub fn chat_update(&self, ctx: Ctx, chat_id: ChatId, name: &str, avatar: &str) -> CoreResult<()> {
        self.require_member(ctx.user, chat_id)?;
        self.repo
            .update_chat(chat_id, &sanitize::html_escape(name), &sanitize::strip_quotes(avatar))?;

        let chat = self.repo.get_chat(chat_id)?;
        self.informer
            .send_chat_event(chat_id, ctx.user, ChatOp::Update, Some(chat), None);
        Ok(())
    }

    pub fn chat_set_users(&self, ctx: Ctx, chat_id: ChatId, users: &[UserId]) -> CoreResult<()> {
        self.require_member(ctx.user, chat_id)?;
        let delta = self.repo.set_members(chat_id, users)?;

        if !self.flags.with_group_calls {
            let mut affected = delta.added.clone();
            affected.extend(delta.removed.clone());
            let chat = self.repo.get_chat(chat_id)?;
            self.informer
                .send_chat_event(chat_id, ctx.user, ChatOp::SetUsers, Some(chat), Some(affected));
            return Ok(());
        }

        if let Some(mut call) = self.repo.check_if_chat_in_call(chat_id)? {
            if !call.call.status.is_terminal() {
                let call_delta = self.repo.refresh_participants(call.call.id, users)?;
                if !call_delta.removed.is_empty() || !call_delta.added.is_empty() {
                    call = self
                        .repo
                        .get_call(call.call.id)?
                        .unwrap_or(call);
                    if !call_delta.removed.is_empty() {
                        self.informer
                            .send_signal_to_call(&call, Some(CallStatus::Disconnected), Some(&call_delta.removed));
                    }
                    if !call_delta.added.is_empty() {
                        self.informer.send_signal_to_call(&call, None, Some(&call_delta.added));
                    }
                }
            }
        }

        let mut affected = delta.added;
        affected.extend(delta.removed);
        let chat = self.repo.get_chat(chat_id)?;
        self.informer
            .send_chat_event(chat_id, ctx.user, ChatOp::SetUsers, Some(chat), Some(affected));
        Ok(())
    }

    pub fn chat_leave(&self, ctx: Ctx, chat_id: ChatId) -> CoreResult<()> {
        self.require_member(ctx.user, chat_id)?;
        let destroyed = self.repo.leave(chat_id, ctx.user)?;
        if !destroyed {
            self.informer
                .send_chat_event(chat_id, ctx.user, ChatOp::Leave, None, Some(vec![ctx.user]));
        }
        Ok(())
    }

    // --- call.* -------------------------------------------------------

    pub async fn call_start(&self, ctx: Ctx, target_user: UserId, target_chat: ChatId) -> CoreResult<CallWithParticipants> {
        self.calls.start(ctx, target_chat, target_user).await
    }

    /// `status == 2` is `Join`; `status >= 900` is `Disconnect`.
    pub async fn call_set_status(&self, ctx: Ctx, call_id: CallId, status: i32) -> CoreResult<()> {
        if status == CallStatus::Accepted as i32 {
            self.calls.join(ctx, call_id).await?;
            return Ok(());
        }
        let status = CallStatus::from_i32(status).ok_or_else(|| CoreError::InvalidArgument("status".into()))?;
        self.calls.disconnect(ctx, call_id, status).await
    }

    pub async fn call_set_user_status(&self, ctx: Ctx, call_id: CallId, status: i32) -> CoreResult<()> {
        let status = ParticipantStatus::from_i32(status).ok_or_else(|| CoreError::InvalidArgument("status".into()))?;
        self.calls.set_user_status(ctx, call_id, status).await
    }

    pub fn call_signal(&self, ctx: Ctx, kind: &str, body: serde_json::Value) -> CoreResult<()> {
        let call = self
            .repo
            .get_call_by_device(ctx.device)?
            .ok_or_else(|| CoreError::NotFound("call".into()))?;
        let other = call
            .participants
            .iter()
            .find(|p| p.user != ctx.user || p.device != ctx.device)
            .ok_or_else(|| CoreError::NotFound("peer".into()))?;

        self.informer
            .send_raw_signal(kind, body, vec![other.user], vec![other.device]);
        Ok(())
    }

    pub async fn call_join_token(&self, ctx: Ctx, call_id: CallId) -> CoreResult<String> {
        self.calls.join_token(ctx, call_id).await
    }
}
