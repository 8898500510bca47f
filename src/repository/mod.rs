//! The Repository facade: the only place cross-table consistency is
//! enforced. Everything else in the core talks to storage exclusively
//! through this trait.

mod sqlite;

pub use sqlite::SqliteRepository;

use crate::error::CoreResult;
use crate::models::{
    CallId, CallKind, CallStatus, CallWithParticipants, Chat, ChatId, Membership, Message,
    MessageId, ParticipantStatus, UserId,
};
use std::collections::HashMap;

/// Added/removed user sets, returned by `refresh_participants` and used
/// by the group call engine to notify affected participants.
#[derive(Debug, Default, Clone)]
pub struct MembershipDelta {
    pub added: Vec<UserId>,
    pub removed: Vec<UserId>,
}

/// Everything the core consumes from persistent storage, grouped by
/// concern: users/membership cache, chats, messages, calls, reactions.
pub trait Repository: Send + Sync {
    // --- Membership cache -------------------------------------------------
    fn is_member(&self, user: UserId, chat: ChatId) -> bool;
    fn members_of(&self, chat: ChatId) -> Vec<UserId>;
    fn chats_of(&self, user: UserId) -> Vec<ChatId>;

    // --- Chats --------------------------------------------------------
    fn add_direct(&self, user_a: UserId, user_b: UserId) -> CoreResult<ChatId>;
    fn add_group(&self, name: &str, avatar: &str, members: &[UserId]) -> CoreResult<ChatId>;
    fn update_chat(&self, id: ChatId, name: &str, avatar: &str) -> CoreResult<()>;
    fn set_members(&self, chat: ChatId, new_members: &[UserId]) -> CoreResult<MembershipDelta>;
    /// Removes `user` from `chat`. Returns `true` if the chat was
    /// destroyed as a result (membership dropped to zero).
    fn leave(&self, chat: ChatId, user: UserId) -> CoreResult<bool>;
    fn set_last_message(&self, chat: ChatId, msg: MessageId) -> CoreResult<()>;
    fn get_chat(&self, chat: ChatId) -> CoreResult<Chat>;
    fn get_membership(&self, user: UserId, chat: ChatId) -> CoreResult<Membership>;

    // --- Messages -------------------------------------------------------
    fn get_message(&self, id: MessageId) -> CoreResult<Message>;
    fn get_last_message(&self, chat: ChatId) -> CoreResult<Option<Message>>;
    fn get_last_n_messages(&self, chat: ChatId, n: usize) -> CoreResult<Vec<Message>>;
    fn get_all_messages(&self, chat: ChatId) -> CoreResult<Vec<Message>>;
    /// Inserts a new message if `id == 0`, otherwise updates the
    /// existing row (body/edited). Returns the persisted id.
    fn save_message(&self, msg: &Message) -> CoreResult<MessageId>;
    fn delete_message(&self, id: MessageId) -> CoreResult<()>;
    fn reset_counter(&self, chat: ChatId, user: UserId) -> CoreResult<()>;
    fn increment_counters(&self, chat: ChatId, except_user: UserId) -> CoreResult<()>;

    // --- Calls ------------------------------------------------------------
    /// Creates a Call row plus one CallParticipant per chat member.
    /// The initiator's row starts `connecting` with `device`; every
    /// other member starts `initiated` with device 0.
    fn start_call(
        &self,
        initiator: UserId,
        device: i64,
        kind: CallKind,
        chat: ChatId,
    ) -> CoreResult<CallWithParticipants>;
    fn set_room_name(&self, call: CallId, room_name: &str) -> CoreResult<()>;
    fn get_call(&self, id: CallId) -> CoreResult<Option<CallWithParticipants>>;
    /// The caller's single non-terminal call, if any.
    fn get_call_by_user(&self, user: UserId) -> CoreResult<Option<CallWithParticipants>>;
    fn get_call_by_device(&self, device: i64) -> CoreResult<Option<CallWithParticipants>>;
    fn check_if_chat_in_call(&self, chat: ChatId) -> CoreResult<Option<CallWithParticipants>>;
    fn check_if_user_in_call(&self, user: UserId) -> CoreResult<bool>;
    /// Updates the call's own status. Mapping `Accepted` to `Active` and
    /// stamping `start` (only if unset) happens here.
    fn update_call_status(&self, call: CallId, status: CallStatus) -> CoreResult<()>;
    fn set_participant(
        &self,
        call: CallId,
        user: UserId,
        device: i64,
        status: ParticipantStatus,
    ) -> CoreResult<()>;
    /// Marks every participant of `call` as disconnected. Called on
    /// entry into any terminal status.
    fn disconnect_all_participants(&self, call: CallId) -> CoreResult<()>;
    fn refresh_participants(
        &self,
        call: CallId,
        new_members: &[UserId],
    ) -> CoreResult<MembershipDelta>;
    /// Marks every previously non-terminal call as `status`. Returns
    /// the calls that were dropped, for startup cleanup notifications.
    fn drop_all(&self, status: CallStatus) -> CoreResult<Vec<CallWithParticipants>>;

    // --- Reactions --------------------------------------------------------
    /// Returns `true` if a new reaction row was inserted, `false` if it
    /// already existed (idempotent).
    fn add_reaction(&self, message: MessageId, reaction: &str, user: UserId) -> CoreResult<bool>;
    fn remove_reaction(&self, message: MessageId, reaction: &str, user: UserId) -> CoreResult<()>;
    fn reactions_for_message(&self, message: MessageId) -> CoreResult<HashMap<String, Vec<UserId>>>;
    fn reactions_for_chat(
        &self,
        chat: ChatId,
    ) -> CoreResult<HashMap<MessageId, HashMap<String, Vec<UserId>>>>;
}
