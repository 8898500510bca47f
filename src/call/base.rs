//! Shared plumbing for both call variants: a capability interface
//! {Start, Join, Disconnect} with two implementations sharing a common
//! base struct for the repetitive parts.

use crate::config::{Config, FeatureFlags};
use crate::error::{CoreError, CoreResult};
use crate::informer::Informer;
use crate::models::*;
use crate::repository::Repository;
use crate::sfu::{random_room_name, SfuAdapter};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub struct CallEngineBase {
    pub repo: Arc<dyn Repository>,
    pub informer: Arc<Informer>,
    pub sfu: Arc<dyn SfuAdapter>,
    pub config: Config,
    pub flags: FeatureFlags,
    pub sfu_enabled: bool,
    reconnect_epoch: Mutex<HashMap<(CallId, UserId), u64>>,
    epoch_counter: AtomicU64,
}

impl CallEngineBase {
    pub fn new(
        repo: Arc<dyn Repository>,
        informer: Arc<Informer>,
        sfu: Arc<dyn SfuAdapter>,
        config: Config,
        flags: FeatureFlags,
        sfu_enabled: bool,
    ) -> Self {
        Self {
            repo,
            informer,
            sfu,
            config,
            flags,
            sfu_enabled,
            reconnect_epoch: Mutex::new(HashMap::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn check_user_access(&self, user: UserId, chat: ChatId) -> CoreResult<()> {
        if self.repo.is_member(user, chat) {
            Ok(())
        } else {
            Err(CoreError::AccessDenied)
        }
    }

    /// Returns `Ok(Some(existing_call_id))` when the caller already has
    /// a non-terminal call in the *same* chat (idempotent reconnect via
    /// `Join`), or `Err(active_in_other_chat)` when it's a different one.
    pub fn existing_call_in_chat(&self, user: UserId, chat: ChatId) -> CoreResult<Option<CallId>> {
        match self.repo.get_call_by_user(user)? {
            Some(existing) if existing.call.chat == chat => Ok(Some(existing.call.id)),
            Some(_) => Err(CoreError::active_in_other_chat()),
            None => Ok(None),
        }
    }

    /// Personal-call busy precondition. Busy calls are synthetic and
    /// never persisted as a `Call` row.
    pub fn check_busy(
        &self,
        initiator: UserId,
        target_user: UserId,
        chat: ChatId,
    ) -> CoreResult<Option<CallWithParticipants>> {
        if target_user == 0 || !self.repo.check_if_user_in_call(target_user)? {
            return Ok(None);
        }

        let busy = CallWithParticipants {
            call: Call {
                id: 0,
                chat,
                initiator,
                kind: CallKind::Personal,
                start: None,
                status: CallStatus::Busy,
                room_name: None,
            },
            participants: Vec::new(),
        };

        let message = Message {
            id: 0,
            chat,
            author: initiator,
            date: Utc::now(),
            kind: MessageKind::CallBusyMessage,
            body: String::new(),
            edited: false,
            related_entity: None,
            reactions: Default::default(),
        };
        self.informer
            .send_message_event(chat, message, crate::hub::MessageOp::Add, 0, true)?;

        Ok(Some(busy))
    }

    /// Allocates an SFU room for `call` if an SFU is configured. On SFU
    /// failure the call is marked `lost`.
    pub async fn create_room(&self, call_id: CallId) -> CoreResult<Option<String>> {
        if !self.sfu_enabled {
            return Ok(None);
        }

        let name = random_room_name();
        match self.sfu.create_room(&name).await {
            Ok(name) => {
                self.repo.set_room_name(call_id, &name)?;
                Ok(Some(name))
            }
            Err(err) => {
                self.repo.update_call_status(call_id, CallStatus::Lost)?;
                Err(err)
            }
        }
    }

    /// Persists the joining user's new participant status and device,
    /// returning whether the participant became `active` (vs.
    /// `connecting`, mid-handshake).
    pub fn update_accepted(&self, call: &mut CallWithParticipants, user: UserId, device: DeviceId) -> CoreResult<bool> {
        let current = call
            .participant(user)
            .ok_or(CoreError::AccessDenied)?
            .status;
        if current == ParticipantStatus::Active {
            return Err(CoreError::already_in_call());
        }

        let became_active = current == ParticipantStatus::Connecting
            || (call.call.status == CallStatus::Initiated && current == ParticipantStatus::Initiated);
        let new_status = if became_active {
            ParticipantStatus::Active
        } else {
            ParticipantStatus::Connecting
        };

        self.repo.set_participant(call.call.id, user, device, new_status)?;
        if let Some(p) = call.participant_mut(user) {
            p.status = new_status;
            p.device = device;
        }

        Ok(became_active)
    }

    /// Transitions `call` to `status`, persists it, and emits whichever
    /// chat summary message the new status implies (none for
    /// non-terminal/non-rejected/non-ignored transitions). Idempotent:
    /// re-entering a terminal status from a call already terminal is a
    /// no-op.
    pub async fn transition_and_message(
        &self,
        call: &mut CallWithParticipants,
        status: CallStatus,
    ) -> CoreResult<()> {
        let status = if status == CallStatus::Disconnected {
            CallStatus::Ended
        } else {
            status
        };

        if status.is_terminal() && call.call.status.is_terminal() {
            return Ok(());
        }

        self.repo.update_call_status(call.call.id, status)?;
        call.call.status = if status == CallStatus::Accepted {
            CallStatus::Active
        } else {
            status
        };
        if call.call.status == CallStatus::Active && call.call.start.is_none() {
            call.call.start = Some(Utc::now());
        }

        let message = match status {
            CallStatus::Ended | CallStatus::Lost => {
                let seconds = call
                    .call
                    .start
                    .map(|start| (Utc::now() - start).num_seconds().max(0))
                    .unwrap_or(0);
                Some((
                    format!("{:02}:{:02}", seconds / 60, seconds % 60),
                    MessageKind::CallStartMessage,
                ))
            }
            CallStatus::Rejected => Some((String::new(), MessageKind::CallRejectedMessage)),
            CallStatus::Ignored => Some((String::new(), MessageKind::CallMissedMessage)),
            _ => None,
        };

        if let Some((body, kind)) = message {
            let msg = Message {
                id: 0,
                chat: call.call.chat,
                author: call.call.initiator,
                date: call.call.start.unwrap_or_else(Utc::now),
                kind,
                body,
                edited: false,
                related_entity: Some(call.call.id),
                reactions: Default::default(),
            };
            self.informer
                .send_message_event(call.call.chat, msg, crate::hub::MessageOp::Add, 0, true)?;
        }

        if status.is_terminal() {
            self.end_call(call).await;
        }

        Ok(())
    }

    /// Disconnects every participant and releases the SFU room.
    /// Deletion failures are logged and swallowed: the call ends
    /// regardless.
    async fn end_call(&self, call: &CallWithParticipants) {
        if let Err(err) = self.repo.disconnect_all_participants(call.call.id) {
            tracing::warn!(call = call.call.id, error = %err, "failed to mark participants disconnected");
        }
        if let Some(room) = &call.call.room_name {
            if let Err(err) = self.sfu.delete_room(room).await {
                tracing::warn!(call = call.call.id, room, error = %err, "sfu room deletion failed, call ended regardless");
            }
        }
    }

    /// Arms (or rearms) the reconnect epoch for (call, user) and
    /// returns the freshly minted value. A monotonic counter stands in
    /// for a cancellation handle: firing compares the captured epoch
    /// against whatever is current.
    pub fn arm_epoch(&self, call: CallId, user: UserId) -> u64 {
        let epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.reconnect_epoch.lock().unwrap().insert((call, user), epoch);
        epoch
    }

    pub fn epoch_current(&self, call: CallId, user: UserId, epoch: u64) -> bool {
        self.reconnect_epoch.lock().unwrap().get(&(call, user)) == Some(&epoch)
    }
}
