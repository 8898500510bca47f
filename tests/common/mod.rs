//! Shared harness for the integration tests: an in-memory `Service`
//! wired the same way `Core::bootstrap` wires one, minus the
//! env-dependent bits (SFU config, tracing) tests don't need.

use async_trait::async_trait;
use chat_calling_core::call::CallEngine;
use chat_calling_core::config::{Config, FeatureFlags};
use chat_calling_core::db::Db;
use chat_calling_core::error::CoreResult;
use chat_calling_core::hub::Hub;
use chat_calling_core::informer::Informer;
use chat_calling_core::repository::{Repository, SqliteRepository};
use chat_calling_core::service::Service;
use chat_calling_core::sfu::SfuAdapter;
use std::sync::Arc;

/// Always-succeeds SFU stand-in, so group-call tests don't need a real
/// media server.
pub struct StubSfu;

#[async_trait]
impl SfuAdapter for StubSfu {
    async fn create_room(&self, name: &str) -> CoreResult<String> {
        Ok(name.to_string())
    }

    async fn delete_room(&self, _name: &str) -> CoreResult<()> {
        Ok(())
    }

    async fn disconnect_participant(&self, _room: &str, _identity: &str) -> CoreResult<()> {
        Ok(())
    }

    async fn create_join_token(&self, _room: &str, identity: &str) -> CoreResult<String> {
        Ok(format!("token-for-{identity}"))
    }
}

pub struct Harness {
    pub service: Arc<Service>,
    pub repo: Arc<dyn Repository>,
    pub hub: Arc<Hub>,
}

/// `group_calls_enabled` controls both the feature flag and whether the
/// call engine is given a (stub) SFU at all, mirroring how
/// `Core::bootstrap` auto-disables group calls when no SFU is configured.
pub fn build(config: Config, group_calls_enabled: bool) -> Harness {
    let db = Db::open_in_memory().expect("in-memory db");
    let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::new(db).expect("repository"));
    let hub = Arc::new(Hub::new());
    let informer = Arc::new(Informer::new(Arc::clone(&repo), Arc::clone(&hub)));
    let sfu: Arc<dyn SfuAdapter> = Arc::new(StubSfu);

    let flags = FeatureFlags {
        with_reactions: true,
        with_files: true,
        with_bots: false,
        with_group_calls: group_calls_enabled,
        with_voice_messages: true,
    };

    let calls = CallEngine::new(
        Arc::clone(&repo),
        Arc::clone(&informer),
        sfu,
        config,
        flags,
        group_calls_enabled,
    );

    let service = Arc::new(Service::new(
        Arc::clone(&repo),
        Arc::clone(&hub),
        Arc::clone(&informer),
        calls,
        flags,
    ));

    Harness { service, repo, hub }
}
