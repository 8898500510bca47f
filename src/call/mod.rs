//! The Call State Engine: the spine of the core. Two variants, Personal
//! and Group, selected per call by `kind` and sharing `CallEngineBase`
//! for the repetitive parts (message emission, SFU room lifecycle,
//! timer scheduling).

mod base;
mod group;
mod personal;

pub use base::CallEngineBase;

use crate::config::{Config, FeatureFlags};
use crate::error::{CoreError, CoreResult};
use crate::informer::Informer;
use crate::models::*;
use crate::repository::Repository;
use crate::sfu::SfuAdapter;
use crate::Ctx;
use async_trait::async_trait;
use group::Group;
use personal::Personal;
use std::sync::Arc;

/// The {Start, Join, Disconnect} capability interface, implemented once
/// per call kind. `handle_not_accepted_timeout` is the not-accepted
/// timer's callback, also kind-specific.
#[async_trait]
trait CallVariant: Send + Sync {
    async fn start(
        &self,
        base: &CallEngineBase,
        ctx: Ctx,
        chat: ChatId,
        target_user: UserId,
    ) -> CoreResult<CallWithParticipants>;

    /// Returns `true` when a reconnecting timer should be armed for
    /// this join (the participant stayed in `connecting`, mid-handshake
    /// with the SFU, rather than becoming `active` outright).
    async fn join(&self, base: &CallEngineBase, ctx: Ctx, call: &mut CallWithParticipants) -> CoreResult<bool>;

    async fn disconnect(
        &self,
        base: &CallEngineBase,
        ctx: Ctx,
        call: &mut CallWithParticipants,
        status: CallStatus,
    ) -> CoreResult<()>;

    async fn handle_not_accepted_timeout(&self, base: &CallEngineBase, call_id: CallId);
}

/// The not-accepted timer's default delay is exposed from `Config`
/// rather than hardcoded (default: 30s).
pub struct CallEngine {
    base: CallEngineBase,
    personal: Personal,
    group: Group,
}

impl CallEngine {
    pub fn new(
        repo: Arc<dyn Repository>,
        informer: Arc<Informer>,
        sfu: Arc<dyn SfuAdapter>,
        config: Config,
        flags: FeatureFlags,
        sfu_enabled: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: CallEngineBase::new(repo, informer, sfu, config, flags, sfu_enabled),
            personal: Personal,
            group: Group,
        })
    }

    fn variant(&self, kind: CallKind) -> &(dyn CallVariant) {
        match kind {
            CallKind::Personal => &self.personal,
            CallKind::Group => &self.group,
        }
    }

    /// `target_user == 0` means "group call in this chat".
    pub async fn start(
        self: &Arc<Self>,
        ctx: Ctx,
        chat: ChatId,
        target_user: UserId,
    ) -> CoreResult<CallWithParticipants> {
        let kind = if target_user == 0 { CallKind::Group } else { CallKind::Personal };
        if kind == CallKind::Group && !self.base.flags.with_group_calls {
            return Err(CoreError::FeatureDisabled);
        }

        let call = self.variant(kind).start(&self.base, ctx, chat, target_user).await?;

        if call.call.id != 0 && call.call.status == CallStatus::Initiated {
            self.arm_not_accepted_timer(kind, call.call.id);
        }

        Ok(call)
    }

    /// Accepts an invite or reconnects to an existing call.
    pub async fn join(self: &Arc<Self>, ctx: Ctx, call_id: CallId) -> CoreResult<CallWithParticipants> {
        let mut call = self
            .base
            .repo
            .get_call(call_id)?
            .ok_or_else(|| CoreError::NotFound("call".into()))?;
        let kind = call.call.kind;

        let rearmed_same_device = self.variant(kind).join(&self.base, ctx, &mut call).await?;
        if rearmed_same_device {
            let epoch = self.base.arm_epoch(call_id, ctx.user);
            self.arm_reconnecting_timer(kind, call_id, ctx.user, epoch);
        }

        Ok(call)
    }

    /// Ends the caller's participation, transitioning the call to a
    /// terminal status.
    pub async fn disconnect(self: &Arc<Self>, ctx: Ctx, call_id: CallId, status: CallStatus) -> CoreResult<()> {
        let mut call = match self.base.repo.get_call(call_id)? {
            Some(call) => call,
            None => return Ok(()),
        };
        let kind = call.call.kind;
        self.variant(kind).disconnect(&self.base, ctx, &mut call, status).await
    }

    /// Updates the caller's own participant status, arming a
    /// reconnecting timer if it moves to `Connecting`.
    pub async fn set_user_status(
        self: &Arc<Self>,
        ctx: Ctx,
        call_id: CallId,
        status: ParticipantStatus,
    ) -> CoreResult<()> {
        let call = self
            .base
            .repo
            .get_call(call_id)?
            .ok_or_else(|| CoreError::NotFound("call".into()))?;
        if call.participant(ctx.user).is_none() {
            return Err(CoreError::AccessDenied);
        }

        self.base.repo.set_participant(call_id, ctx.user, ctx.device, status)?;

        if status == ParticipantStatus::Connecting {
            let epoch = self.base.arm_epoch(call_id, ctx.user);
            self.arm_reconnecting_timer(call.call.kind, call_id, ctx.user, epoch);
        }

        Ok(())
    }

    /// Mints a fresh SFU join token for the caller's active call.
    pub async fn join_token(&self, ctx: Ctx, call_id: CallId) -> CoreResult<String> {
        let call = self
            .base
            .repo
            .get_call(call_id)?
            .ok_or_else(|| CoreError::NotFound("call".into()))?;
        self.base.check_user_access(ctx.user, call.call.chat)?;

        if !self.base.sfu_enabled {
            return Err(CoreError::FeatureDisabled);
        }
        let room = call
            .call
            .room_name
            .as_deref()
            .ok_or_else(|| CoreError::NotFound("room".into()))?;
        self.base.sfu.create_join_token(room, &ctx.user.to_string()).await
    }

    fn arm_not_accepted_timer(self: &Arc<Self>, kind: CallKind, call_id: CallId) {
        let engine = Arc::clone(self);
        let delay = engine.base.config.call_not_accepted_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.variant(kind).handle_not_accepted_timeout(&engine.base, call_id).await;
        });
    }

    /// Spawns the reconnecting timer. On firing, re-reads the participant's
    /// status and the stored epoch; a mismatch (a later `Join` rearmed
    /// it) makes this a no-op.
    fn arm_reconnecting_timer(self: &Arc<Self>, kind: CallKind, call_id: CallId, user: UserId, epoch: u64) {
        let engine = Arc::clone(self);
        let delay = engine.base.config.call_reconnecting_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !engine.base.epoch_current(call_id, user, epoch) {
                return;
            }
            let Ok(Some(call)) = engine.base.repo.get_call(call_id) else {
                return;
            };
            if call.call.status.is_terminal() {
                return;
            }
            let Some(participant) = call.participant(user) else {
                return;
            };
            if participant.status != ParticipantStatus::Connecting {
                return;
            }

            let ctx = Ctx {
                user,
                device: participant.device,
            };
            let mut call = call;
            if let Err(err) = engine
                .variant(kind)
                .disconnect(&engine.base, ctx, &mut call, CallStatus::Disconnected)
                .await
            {
                tracing::warn!(call = call_id, user, error = %err, "reconnecting timeout disconnect failed");
            }
        });
    }
}
