//! Wire and persistence types for the core data model: users, chats,
//! memberships, messages, calls and their participants.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type UserId = i64;
pub type DeviceId = i64;
pub type ChatId = i64;
pub type MessageId = i64;
pub type CallId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: String,
    pub presence: Presence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Direct,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub kind: ChatKind,
    pub name: String,
    pub avatar: String,
    pub last_message: Option<MessageId>,
}

/// Per-member state for (user, chat).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub user: UserId,
    pub chat: ChatId,
    pub unread_count: i64,
    /// The other party's user id for a direct chat, 0 for group chats.
    pub direct_peer: UserId,
    pub favorite: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    CallStartMessage,
    CallRejectedMessage,
    CallMissedMessage,
    CallBusyMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat: ChatId,
    pub author: UserId,
    pub date: chrono::DateTime<chrono::Utc>,
    pub kind: MessageKind,
    pub body: String,
    pub edited: bool,
    pub related_entity: Option<i64>,
    /// reaction -> users who reacted
    #[serde(default)]
    pub reactions: HashMap<String, Vec<UserId>>,
}

/// Wire-stable call status integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum CallStatus {
    Initiated = 1,
    Accepted = 2,
    Active = 3,
    Reconnecting = 4,
    Disconnected = 801,
    Rejected = 901,
    Ended = 902,
    Ignored = 903,
    Lost = 904,
    Busy = 905,
}

impl CallStatus {
    pub fn is_terminal(self) -> bool {
        (self as i32) >= 900
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            1 => Self::Initiated,
            2 => Self::Accepted,
            3 => Self::Active,
            4 => Self::Reconnecting,
            801 => Self::Disconnected,
            901 => Self::Rejected,
            902 => Self::Ended,
            903 => Self::Ignored,
            904 => Self::Lost,
            905 => Self::Busy,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Personal,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub chat: ChatId,
    pub initiator: UserId,
    pub kind: CallKind,
    pub start: Option<chrono::DateTime<chrono::Utc>>,
    pub status: CallStatus,
    pub room_name: Option<String>,
}

/// Per-user per-call participant status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ParticipantStatus {
    Disconnected = 0,
    Initiated = 1,
    Connecting = 2,
    Active = 3,
}

impl ParticipantStatus {
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            0 => Self::Disconnected,
            1 => Self::Initiated,
            2 => Self::Connecting,
            3 => Self::Active,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallParticipant {
    pub call: CallId,
    pub user: UserId,
    /// 0 until the participant's first accept.
    pub device: DeviceId,
    pub status: ParticipantStatus,
}

/// A full call snapshot with its participants, as tracked in memory by
/// the call engine and repository while the call is non-terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallWithParticipants {
    pub call: Call,
    pub participants: Vec<CallParticipant>,
}

impl CallWithParticipants {
    pub fn participant(&self, user: UserId) -> Option<&CallParticipant> {
        self.participants.iter().find(|p| p.user == user)
    }

    pub fn participant_mut(&mut self, user: UserId) -> Option<&mut CallParticipant> {
        self.participants.iter_mut().find(|p| p.user == user)
    }

    pub fn participant_by_device(&self, device: DeviceId) -> Option<&CallParticipant> {
        self.participants.iter().find(|p| p.device == device)
    }

    pub fn non_disconnected(&self) -> impl Iterator<Item = &CallParticipant> {
        self.participants
            .iter()
            .filter(|p| p.status != ParticipantStatus::Disconnected)
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.participants.iter().map(|p| p.user).collect()
    }
}
