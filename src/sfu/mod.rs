//! The SFU Adapter: a thin, stateless control-plane façade over the
//! external media server, built on `reqwest` for the REST control
//! plane and `jsonwebtoken` for join-token minting rather than a
//! vendor SDK.

use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use jsonwebtoken::{encode, EncodingKey, Header};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// How long a join token is valid for.
const JOIN_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Length of a generated room id.
const ROOM_ID_LEN: usize = 16;

pub fn random_room_name() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ROOM_ID_LEN)
        .map(char::from)
        .collect()
}

#[async_trait]
pub trait SfuAdapter: Send + Sync {
    async fn create_room(&self, name: &str) -> CoreResult<String>;
    async fn delete_room(&self, name: &str) -> CoreResult<()>;
    async fn disconnect_participant(&self, room: &str, identity: &str) -> CoreResult<()>;
    async fn create_join_token(&self, room: &str, identity: &str) -> CoreResult<String>;
}

/// Used when no SFU is configured; group calls are disabled at boot in
/// that case (see `FeatureFlags::from_env`), so this exists mainly to
/// keep the personal-call path and tests free of an `Option<dyn ...>`.
pub struct NullSfu;

#[async_trait]
impl SfuAdapter for NullSfu {
    async fn create_room(&self, _name: &str) -> CoreResult<String> {
        Err(CoreError::UpstreamUnavailable("no SFU configured".into()))
    }

    async fn delete_room(&self, _name: &str) -> CoreResult<()> {
        Ok(())
    }

    async fn disconnect_participant(&self, _room: &str, _identity: &str) -> CoreResult<()> {
        Ok(())
    }

    async fn create_join_token(&self, _room: &str, _identity: &str) -> CoreResult<String> {
        Err(CoreError::UpstreamUnavailable("no SFU configured".into()))
    }
}

#[derive(Debug, Clone)]
pub struct HttpSfuConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
}

/// REST-backed adapter for a LiveKit-shaped control plane.
pub struct HttpSfu {
    client: reqwest::Client,
    config: HttpSfuConfig,
}

impl HttpSfu {
    pub fn new(config: HttpSfuConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct CreateRoomRequest<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct RoomResponse {
    name: String,
}

#[derive(Serialize)]
struct DeleteRoomRequest<'a> {
    room: &'a str,
}

#[derive(Serialize)]
struct DisconnectRequest<'a> {
    room: &'a str,
    identity: &'a str,
}

#[derive(Serialize)]
struct JoinClaims<'a> {
    sub: &'a str,
    room: &'a str,
    video: VideoGrant<'a>,
    exp: u64,
}

#[derive(Serialize)]
struct VideoGrant<'a> {
    room_join: bool,
    room: &'a str,
}

#[async_trait]
impl SfuAdapter for HttpSfu {
    async fn create_room(&self, name: &str) -> CoreResult<String> {
        let resp = self
            .client
            .post(format!("{}/twirp/livekit.RoomService/CreateRoom", self.config.base_url))
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .json(&CreateRoomRequest { name })
            .send()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))?
            .json::<RoomResponse>()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))?;
        Ok(resp.name)
    }

    async fn delete_room(&self, name: &str) -> CoreResult<()> {
        self.client
            .post(format!("{}/twirp/livekit.RoomService/DeleteRoom", self.config.base_url))
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .json(&DeleteRoomRequest { room: name })
            .send()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn disconnect_participant(&self, room: &str, identity: &str) -> CoreResult<()> {
        self.client
            .post(format!(
                "{}/twirp/livekit.RoomService/RemoveParticipant",
                self.config.base_url
            ))
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .json(&DisconnectRequest { room, identity })
            .send()
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn create_join_token(&self, room: &str, identity: &str) -> CoreResult<String> {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .checked_add(JOIN_TOKEN_TTL)
            .unwrap_or_default()
            .as_secs();

        let claims = JoinClaims {
            sub: identity,
            room,
            video: VideoGrant {
                room_join: true,
                room,
            },
            exp,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.api_secret.as_bytes()),
        )
        .map_err(|e| CoreError::Internal(e.to_string()))
    }
}
