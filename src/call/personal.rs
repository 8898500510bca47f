//! One-to-one calls.

use super::{base::CallEngineBase, CallVariant};
use crate::error::{CoreError, CoreResult};
use crate::models::*;
use crate::Ctx;
use async_trait::async_trait;

pub struct Personal;

#[async_trait]
impl CallVariant for Personal {
    async fn start(
        &self,
        base: &CallEngineBase,
        ctx: Ctx,
        chat: ChatId,
        target_user: UserId,
    ) -> CoreResult<CallWithParticipants> {
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

        if let Some(busy) = base.check_busy(ctx.user, target_user, chat)? {
            return Ok(busy);
        }

        let mut call = base.repo.start_call(ctx.user, ctx.device, CallKind::Personal, chat)?;

        if base.sfu_enabled {
            match base.create_room(call.call.id).await {
                Ok(name) => call.call.room_name = name,
                Err(err) => return Err(err),
            }
        }

        base.informer.send_signal_to_call(&call, None, None);

        Ok(call)
    }

    async fn join(&self, base: &CallEngineBase, ctx: Ctx, call: &mut CallWithParticipants) -> CoreResult<bool> {
        let became_active = base.update_accepted(call, ctx.user, ctx.device)?;

        if call.call.status == CallStatus::Initiated {
            base.transition_and_message(call, CallStatus::Accepted).await?;
        }

        base.informer.send_signal_to_call(call, None, None);

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
        status: CallStatus,
    ) -> CoreResult<()> {
        if call.call.status.is_terminal() {
            base.informer
                .send_signal_to_call(call, Some(CallStatus::Disconnected), Some(&[ctx.user]));
            return Ok(());
        }

        if ctx.user == call.call.initiator && call.call.status == CallStatus::Initiated {
            base.transition_and_message(call, CallStatus::Rejected).await?;
        } else {
            base.transition_and_message(call, status).await?;
        }

        base.informer.send_signal_to_call(call, None, None);
        Ok(())
    }

    async fn handle_not_accepted_timeout(&self, base: &CallEngineBase, call_id: CallId) {
        let Ok(Some(mut call)) = base.repo.get_call(call_id) else {
            return;
        };
        if call.call.status != CallStatus::Initiated {
            return;
        }

        if let Err(err) = base.transition_and_message(&mut call, CallStatus::Ignored).await {
            tracing::warn!(call = call_id, error = %err, "failed to mark personal call ignored");
            return;
        }
        base.informer.send_signal_to_call(&call, None, None);
    }
}
