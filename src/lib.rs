//! Calling and signaling core for a real-time chat service: the call
//! lifecycle, presence tracking, and the event fan-out hub that a
//! (separately built) transport layer sits on top of.
//!
//! One `Config`, one concrete `Repository`, and the handful of
//! components layered on top of it are assembled once at boot by
//! `Core::bootstrap`.

pub mod call;
pub mod config;
pub mod db;
pub mod error;
pub mod hub;
pub mod informer;
pub mod models;
pub mod presence;
pub mod repository;
pub mod sanitize;
pub mod service;
pub mod sfu;

use call::CallEngine;
use config::{Config, FeatureFlags};
use db::Db;
use hub::Hub;
use informer::Informer;
use models::{CallStatus, DeviceId, UserId};
use presence::{PresenceSink, PresenceTracker};
use repository::{Repository, SqliteRepository};
use service::Service;
use sfu::{HttpSfu, HttpSfuConfig, NullSfu, SfuAdapter};
use std::sync::Arc;

/// Session context a transport layer binds at connect time from an
/// opaque token: which user, which device/connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ctx {
    pub user: UserId,
    pub device: DeviceId,
}

/// Everything the core needs, assembled once at boot.
pub struct Core {
    pub repo: Arc<dyn Repository>,
    pub hub: Arc<Hub>,
    pub informer: Arc<Informer>,
    pub presence: Arc<PresenceTracker>,
    pub service: Arc<Service>,
}

impl Core {
    /// Opens (or creates) the SQLite-backed repository at `db_path`,
    /// wires every component in dependency order — Repository → SFU
    /// Adapter → Event Hub → Informer → Presence Tracker → Call State
    /// Engine — and runs the startup cleanup pass.
    pub async fn bootstrap(db_path: &str) -> error::CoreResult<Arc<Self>> {
        let config = Config::from_env();
        let db = Db::open(db_path)?;
        let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::new(db)?);

        let (sfu, sfu_configured): (Arc<dyn SfuAdapter>, bool) = match sfu_config_from_env() {
            Some(cfg) => (Arc::new(HttpSfu::new(cfg)), true),
            None => (Arc::new(NullSfu), false),
        };

        let flags = FeatureFlags::from_env(sfu_configured);

        let hub = Arc::new(Hub::new());
        let informer = Arc::new(Informer::new(Arc::clone(&repo), Arc::clone(&hub)));
        let presence = Arc::new(PresenceTracker::new(config.clone()));
        let calls = CallEngine::new(
            Arc::clone(&repo),
            Arc::clone(&informer),
            Arc::clone(&sfu),
            config.clone(),
            flags,
            sfu_configured,
        );

        let service = Arc::new(Service::new(
            Arc::clone(&repo),
            Arc::clone(&hub),
            Arc::clone(&informer),
            Arc::clone(&calls),
            flags,
        ));

        let core = Arc::new(Self {
            repo,
            hub,
            informer,
            presence,
            service,
        });

        core.cleanup_stale_calls()?;
        core.presence.spawn_sweeper(Arc::clone(&core) as Arc<dyn PresenceSink>);

        Ok(core)
    }

    /// On startup, discards call state left by a crash: every
    /// previously non-terminal call is marked `lost`, with a disconnect
    /// signal and a summary message sent to each affected chat.
    fn cleanup_stale_calls(&self) -> error::CoreResult<()> {
        let dropped = self.repo.drop_all(CallStatus::Lost)?;
        for call in dropped {
            self.informer.send_signal_to_call(&call, Some(CallStatus::Lost), None);

            let seconds = call
                .call
                .start
                .map(|start| (chrono::Utc::now() - start).num_seconds().max(0))
                .unwrap_or(0);
            let message = models::Message {
                id: 0,
                chat: call.call.chat,
                author: call.call.initiator,
                date: call.call.start.unwrap_or_else(chrono::Utc::now),
                kind: models::MessageKind::CallStartMessage,
                body: format!("{:02}:{:02}", seconds / 60, seconds % 60),
                edited: false,
                related_entity: Some(call.call.id),
                reactions: Default::default(),
            };
            self.informer
                .send_message_event(call.call.chat, message, hub::MessageOp::Add, 0, true)?;

            tracing::info!(call = call.call.id, chat = call.call.chat, "dropped stale call at startup");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PresenceSink for Core {
    async fn on_device_stale(&self, device: DeviceId) {
        let call = match self.repo.get_call_by_device(device) {
            Ok(Some(call)) => call,
            _ => return,
        };
        if call.call.status.is_terminal() {
            return;
        }

        let Some(participant) = call.participant_by_device(device) else {
            return;
        };
        let ctx = Ctx {
            user: participant.user,
            device,
        };

        if let Err(err) = self.service.calls.disconnect(ctx, call.call.id, CallStatus::Lost).await {
            tracing::warn!(call = call.call.id, device, error = %err, "failed to drop stale device's call");
        }
    }
}

fn sfu_config_from_env() -> Option<HttpSfuConfig> {
    let base_url = std::env::var("SFU_URL").ok()?;
    let api_key = std::env::var("SFU_API_KEY").ok()?;
    let api_secret = std::env::var("SFU_API_SECRET").ok()?;
    Some(HttpSfuConfig {
        base_url,
        api_key,
        api_secret,
    })
}

/// Initializes the process-wide `tracing` subscriber, honoring
/// `RUST_LOG`. Call once at process startup.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
