//! Group calls.

use super::{base::CallEngineBase, CallVariant};
use crate::error::{CoreError, CoreResult};
use crate::models::*;
use crate::Ctx;
use async_trait::async_trait;
use std::collections::HashSet;

pub struct Group;

#[async_trait]
impl CallVariant for Group {
    async fn start(
        &self,
        base: &CallEngineBase,
        ctx: Ctx,
        chat: ChatId,
        _target_user: UserId,
    ) -> CoreResult<CallWithParticipants> {
        if !base.sfu_enabled {
            return Err(CoreError::FeatureDisabled);
        }

        base.check_user_access(ctx.user, chat)?;

        if let Some(existing_id) = base.existing_call_in_chat(ctx.user, chat)? {
            let mut call = base
                .repo
                .get_call(existing_id)?
                .ok_or_else(|| CoreError::NotFound("call".into()))?;
            self.join(base, ctx, &mut call).await?;
            return Ok(call);
        }

        if let Some(existing) = base.repo.check_if_chat_in_call(chat)? {
            let mut call = existing;
            self.join(base, ctx, &mut call).await?;
            return Ok(call);
        }

        // Chat members already on another call see no invite: create
        // the call, then immediately disconnect those participants.
        let members = base.repo.members_of(chat);
        let mut already_busy = HashSet::new();
        for &member in &members {
            if member != ctx.user && base.repo.check_if_user_in_call(member)? {
                already_busy.insert(member);
            }
        }

        let mut call = base.repo.start_call(ctx.user, ctx.device, CallKind::Group, chat)?;
        for &member in &already_busy {
            base.repo.set_participant(call.call.id, member, 0, ParticipantStatus::Disconnected)?;
            if let Some(p) = call.participant_mut(member) {
                p.status = ParticipantStatus::Disconnected;
            }
        }

        match base.create_room(call.call.id).await {
            Ok(name) => call.call.room_name = name,
            Err(err) => return Err(err),
        }

        base.informer.send_signal_to_call(&call, None, None);

        Ok(call)
    }

    async fn join(&self, base: &CallEngineBase, ctx: Ctx, call: &mut CallWithParticipants) -> CoreResult<bool> {
        let became_active = base.update_accepted(call, ctx.user, ctx.device)?;

        let mut targets = vec![ctx.user];
        if call.call.status == CallStatus::Initiated && became_active {
            // The first non-initiator acceptance also wakes the
            // initiator, who until now hasn't been notified the call
            // was picked up.
            targets.push(call.call.initiator);
            base.transition_and_message(call, CallStatus::Accepted).await?;
        }

        base.informer.send_signal_to_call(call, None, Some(&targets));

        if became_active {
            base.informer.send_signal_to_user(
                ctx.user,
                serde_json::json!({ "message": "joined from another device" }),
            );
        }

        Ok(!became_active)
    }

    async fn disconnect(
        &self,
        base: &CallEngineBase,
        ctx: Ctx,
        call: &mut CallWithParticipants,
        _status: CallStatus,
    ) -> CoreResult<()> {
        if call.call.status.is_terminal() {
            base.informer
                .send_signal_to_call(call, Some(CallStatus::Disconnected), Some(&[ctx.user]));
            return Ok(());
        }

        if ctx.user == call.call.initiator && call.call.status == CallStatus::Initiated {
            base.transition_and_message(call, CallStatus::Rejected).await?;
            base.informer.send_signal_to_call(call, None, None);
            return Ok(());
        }

        let leaving_status = call.participant(ctx.user).map(|p| p.status);
        base.repo
            .set_participant(call.call.id, ctx.user, ctx.device, ParticipantStatus::Disconnected)?;
        if let Some(p) = call.participant_mut(ctx.user) {
            p.status = ParticipantStatus::Disconnected;
        }

        let active_count = call
            .participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Active)
            .count();
        let connecting_count = call
            .participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Connecting)
            .count();

        let drop = (leaving_status == Some(ParticipantStatus::Active) && active_count == 0)
            || (active_count == 0 && connecting_count == 0);

        let mut targets: Vec<UserId> = vec![ctx.user];
        if drop {
            targets.extend(
                call.non_disconnected()
                    .map(|p| p.user)
                    .filter(|u| *u != ctx.user),
            );
            base.transition_and_message(call, CallStatus::Ended).await?;
        }

        base.informer
            .send_signal_to_call(call, Some(CallStatus::Disconnected), Some(&targets));

        if let Some(room) = call.call.room_name.clone() {
            let sfu = base.sfu.clone();
            let identity = ctx.user.to_string();
            tokio::spawn(async move {
                let _ = sfu.disconnect_participant(&room, &identity).await;
            });
        }

        Ok(())
    }

    async fn handle_not_accepted_timeout(&self, base: &CallEngineBase, call_id: CallId) {
        let Ok(Some(mut call)) = base.repo.get_call(call_id) else {
            return;
        };
        if call.call.status.is_terminal() {
            return;
        }

        let mut not_accepted = Vec::new();
        for p in call.participants.clone() {
            if p.status == ParticipantStatus::Initiated && p.device == 0 {
                if let Err(err) = base
                    .repo
                    .set_participant(call_id, p.user, 0, ParticipantStatus::Disconnected)
                {
                    tracing::warn!(call = call_id, user = p.user, error = %err, "failed to drop unaccepted participant");
                    continue;
                }
                not_accepted.push(p.user);
            }
        }
        if not_accepted.is_empty() {
            return;
        }

        for p in call.participants.iter_mut() {
            if not_accepted.contains(&p.user) {
                p.status = ParticipantStatus::Disconnected;
            }
        }

        base.informer
            .send_signal_to_call(&call, Some(CallStatus::Ignored), Some(&not_accepted));
    }
}
