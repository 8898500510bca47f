//! SQLite-backed implementation of the Repository facade.
//!
//! The membership cache is a two-way index: a `RwLock<HashMap<...>>`
//! kept in lockstep with every membership write, so `is_member`/
//! `members_of`/`chats_of` never touch the database.

use super::{MembershipDelta, Repository};
use crate::db::Db;
use crate::error::{CoreError, CoreResult};
use crate::models::*;
use rusqlite::{params, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Two-way membership index: user -> chats and chat -> users.
/// Invariant: this is the truth of active membership; every persisted
/// add/remove updates both directions atomically under one write lock.
#[derive(Default)]
struct MembershipCache {
    by_user: HashMap<UserId, HashSet<ChatId>>,
    by_chat: HashMap<ChatId, HashSet<UserId>>,
}

impl MembershipCache {
    fn join(&mut self, user: UserId, chat: ChatId) {
        self.by_user.entry(user).or_default().insert(chat);
        self.by_chat.entry(chat).or_default().insert(user);
    }

    fn leave(&mut self, user: UserId, chat: ChatId) {
        if let Some(chats) = self.by_user.get_mut(&user) {
            chats.remove(&chat);
        }
        if let Some(users) = self.by_chat.get_mut(&chat) {
            users.remove(&user);
        }
    }
}

pub struct SqliteRepository {
    db: Db,
    cache: RwLock<MembershipCache>,
}

impl SqliteRepository {
    pub fn new(db: Db) -> CoreResult<Self> {
        let repo = Self {
            db,
            cache: RwLock::new(MembershipCache::default()),
        };
        repo.load_cache()?;
        Ok(repo)
    }

    fn load_cache(&self) -> CoreResult<()> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT user_id, chat_id FROM user_chats")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        drop_and_collect(&self.cache, rows)
    }

    fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
        let date_str: String = row.get(3)?;
        let kind_str: String = row.get(4)?;
        Ok(Message {
            id: row.get(0)?,
            chat: row.get(1)?,
            author: row.get(2)?,
            date: chrono::DateTime::parse_from_rfc3339(&date_str)
                .map(|d| d.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
            kind: message_kind_from_str(&kind_str),
            body: row.get(5)?,
            edited: row.get::<_, i64>(6)? != 0,
            related_entity: row.get(7)?,
            reactions: HashMap::new(),
        })
    }

    fn load_participants(
        &self,
        conn: &rusqlite::Connection,
        call_id: CallId,
    ) -> rusqlite::Result<Vec<CallParticipant>> {
        let mut stmt =
            conn.prepare("SELECT call_id, user_id, device_id, status FROM call_user WHERE call_id = ?1")?;
        let rows = stmt.query_map(params![call_id], |row| {
            Ok(CallParticipant {
                call: row.get(0)?,
                user: row.get(1)?,
                device: row.get(2)?,
                status: ParticipantStatus::from_i32(row.get(3)?).unwrap_or(ParticipantStatus::Disconnected),
            })
        })?;
        rows.collect()
    }

    fn load_call(
        &self,
        conn: &rusqlite::Connection,
        call_id: CallId,
    ) -> rusqlite::Result<Option<CallWithParticipants>> {
        let call = conn
            .query_row(
                "SELECT id, chat_id, initiator_id, kind, start, status, room_name FROM calls WHERE id = ?1",
                params![call_id],
                |row| {
                    let start: Option<String> = row.get(4)?;
                    let kind_str: String = row.get(3)?;
                    Ok(Call {
                        id: row.get(0)?,
                        chat: row.get(1)?,
                        initiator: row.get(2)?,
                        kind: if kind_str == "group" { CallKind::Group } else { CallKind::Personal },
                        start: start.and_then(|s| {
                            chrono::DateTime::parse_from_rfc3339(&s)
                                .ok()
                                .map(|d| d.with_timezone(&chrono::Utc))
                        }),
                        status: CallStatus::from_i32(row.get(5)?).unwrap_or(CallStatus::Ended),
                        room_name: row.get(6)?,
                    })
                },
            )
            .optional()?;

        match call {
            Some(call) => {
                let participants = self.load_participants(conn, call_id)?;
                Ok(Some(CallWithParticipants { call, participants }))
            }
            None => Ok(None),
        }
    }
}

fn drop_and_collect(
    cache: &RwLock<MembershipCache>,
    rows: impl Iterator<Item = rusqlite::Result<(i64, i64)>>,
) -> CoreResult<()> {
    let mut cache = cache.write().unwrap();
    for row in rows {
        let (user, chat) = row?;
        cache.join(user, chat);
    }
    Ok(())
}

fn message_kind_from_str(s: &str) -> MessageKind {
    match s {
        "call_start_message" => MessageKind::CallStartMessage,
        "call_rejected_message" => MessageKind::CallRejectedMessage,
        "call_missed_message" => MessageKind::CallMissedMessage,
        "call_busy_message" => MessageKind::CallBusyMessage,
        _ => MessageKind::Text,
    }
}

fn message_kind_to_str(k: MessageKind) -> &'static str {
    match k {
        MessageKind::Text => "text",
        MessageKind::CallStartMessage => "call_start_message",
        MessageKind::CallRejectedMessage => "call_rejected_message",
        MessageKind::CallMissedMessage => "call_missed_message",
        MessageKind::CallBusyMessage => "call_busy_message",
    }
}

impl Repository for SqliteRepository {
    fn is_member(&self, user: UserId, chat: ChatId) -> bool {
        self.cache
            .read()
            .unwrap()
            .by_chat
            .get(&chat)
            .is_some_and(|users| users.contains(&user))
    }

    fn members_of(&self, chat: ChatId) -> Vec<UserId> {
        self.cache
            .read()
            .unwrap()
            .by_chat
            .get(&chat)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    fn chats_of(&self, user: UserId) -> Vec<ChatId> {
        self.cache
            .read()
            .unwrap()
            .by_user
            .get(&user)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    fn add_direct(&self, user_a: UserId, user_b: UserId) -> CoreResult<ChatId> {
        let conn = self.db.conn.lock().unwrap();

        let existing: Option<ChatId> = conn
            .query_row(
                "SELECT chat_id FROM user_chats WHERE user_id = ?1 AND direct_peer = ?2",
                params![user_a, user_b],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(chat_id) = existing {
            return Ok(chat_id);
        }

        conn.execute(
            "INSERT INTO chats (kind, name, avatar, last_message) VALUES ('direct', '', '', NULL)",
            [],
        )?;
        let chat_id = conn.last_insert_rowid();

        conn.execute(
            "INSERT INTO user_chats (user_id, chat_id, direct_peer) VALUES (?1, ?2, ?3)",
            params![user_a, chat_id, user_b],
        )?;
        conn.execute(
            "INSERT INTO user_chats (user_id, chat_id, direct_peer) VALUES (?1, ?2, ?3)",
            params![user_b, chat_id, user_a],
        )?;

        let mut cache = self.cache.write().unwrap();
        cache.join(user_a, chat_id);
        cache.join(user_b, chat_id);

        Ok(chat_id)
    }

    fn add_group(&self, name: &str, avatar: &str, members: &[UserId]) -> CoreResult<ChatId> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO chats (kind, name, avatar, last_message) VALUES ('group', ?1, ?2, NULL)",
            params![name, avatar],
        )?;
        let chat_id = conn.last_insert_rowid();

        let mut cache = self.cache.write().unwrap();
        for &user in members {
            conn.execute(
                "INSERT INTO user_chats (user_id, chat_id, direct_peer) VALUES (?1, ?2, 0)",
                params![user, chat_id],
            )?;
            cache.join(user, chat_id);
        }

        Ok(chat_id)
    }

    fn update_chat(&self, id: ChatId, name: &str, avatar: &str) -> CoreResult<()> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE chats SET name = ?1, avatar = ?2 WHERE id = ?3",
            params![name, avatar, id],
        )?;
        Ok(())
    }

    fn set_members(&self, chat: ChatId, new_members: &[UserId]) -> CoreResult<MembershipDelta> {
        let conn = self.db.conn.lock().unwrap();
        let current: HashSet<UserId> = self.cache.read().unwrap().by_chat.get(&chat).cloned().unwrap_or_default();
        let next: HashSet<UserId> = new_members.iter().copied().collect();

        let added: Vec<UserId> = next.difference(&current).copied().collect();
        let removed: Vec<UserId> = current.difference(&next).copied().collect();

        let mut cache = self.cache.write().unwrap();
        for &user in &added {
            conn.execute(
                "INSERT INTO user_chats (user_id, chat_id, direct_peer) VALUES (?1, ?2, 0)",
                params![user, chat],
            )?;
            cache.join(user, chat);
        }
        for &user in &removed {
            conn.execute(
                "DELETE FROM user_chats WHERE user_id = ?1 AND chat_id = ?2",
                params![user, chat],
            )?;
            cache.leave(user, chat);
        }

        Ok(MembershipDelta { added, removed })
    }

    fn leave(&self, chat: ChatId, user: UserId) -> CoreResult<bool> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM user_chats WHERE user_id = ?1 AND chat_id = ?2",
            params![user, chat],
        )?;
        self.cache.write().unwrap().leave(user, chat);

        let remaining: i64 = conn.query_row(
            "SELECT COUNT(*) FROM user_chats WHERE chat_id = ?1",
            params![chat],
            |row| row.get(0),
        )?;

        if remaining == 0 {
            conn.execute("DELETE FROM chats WHERE id = ?1", params![chat])?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn set_last_message(&self, chat: ChatId, msg: MessageId) -> CoreResult<()> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE chats SET last_message = ?1 WHERE id = ?2",
            params![msg, chat],
        )?;
        Ok(())
    }

    fn get_chat(&self, chat: ChatId) -> CoreResult<Chat> {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, kind, name, avatar, last_message FROM chats WHERE id = ?1",
            params![chat],
            |row| {
                let kind_str: String = row.get(1)?;
                Ok(Chat {
                    id: row.get(0)?,
                    kind: if kind_str == "group" { ChatKind::Group } else { ChatKind::Direct },
                    name: row.get(2)?,
                    avatar: row.get(3)?,
                    last_message: row.get(4)?,
                })
            },
        )
        .map_err(CoreError::from)
    }

    fn get_membership(&self, user: UserId, chat: ChatId) -> CoreResult<Membership> {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row(
            "SELECT user_id, chat_id, unread_count, direct_peer, favorite, hidden
             FROM user_chats WHERE user_id = ?1 AND chat_id = ?2",
            params![user, chat],
            |row| {
                Ok(Membership {
                    user: row.get(0)?,
                    chat: row.get(1)?,
                    unread_count: row.get(2)?,
                    direct_peer: row.get(3)?,
                    favorite: row.get::<_, i64>(4)? != 0,
                    hidden: row.get::<_, i64>(5)? != 0,
                })
            },
        )
        .map_err(CoreError::from)
    }

    fn get_message(&self, id: MessageId) -> CoreResult<Message> {
        let conn = self.db.conn.lock().unwrap();
        let mut msg = conn
            .query_row(
                "SELECT id, chat_id, author_id, date, kind, body, edited, related_entity
                 FROM messages WHERE id = ?1",
                params![id],
                Self::row_to_message,
            )
            .map_err(CoreError::from)?;
        msg.reactions = self.reactions_for_message_locked(&conn, id)?;
        Ok(msg)
    }

    fn get_last_message(&self, chat: ChatId) -> CoreResult<Option<Message>> {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, chat_id, author_id, date, kind, body, edited, related_entity
             FROM messages WHERE chat_id = ?1 ORDER BY id DESC LIMIT 1",
            params![chat],
            Self::row_to_message,
        )
        .optional()
        .map_err(CoreError::from)
    }

    fn get_last_n_messages(&self, chat: ChatId, n: usize) -> CoreResult<Vec<Message>> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, author_id, date, kind, body, edited, related_entity
             FROM messages WHERE chat_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![chat, n as i64], Self::row_to_message)?;
        let mut out: Vec<Message> = rows.collect::<rusqlite::Result<_>>()?;
        out.reverse();
        Ok(out)
    }

    fn get_all_messages(&self, chat: ChatId) -> CoreResult<Vec<Message>> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, author_id, date, kind, body, edited, related_entity
             FROM messages WHERE chat_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![chat], Self::row_to_message)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn save_message(&self, msg: &Message) -> CoreResult<MessageId> {
        let conn = self.db.conn.lock().unwrap();
        if msg.id == 0 {
            conn.execute(
                "INSERT INTO messages (chat_id, author_id, date, kind, body, edited, related_entity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    msg.chat,
                    msg.author,
                    msg.date.to_rfc3339(),
                    message_kind_to_str(msg.kind),
                    msg.body,
                    msg.edited as i64,
                    msg.related_entity,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        } else {
            conn.execute(
                "UPDATE messages SET body = ?1, edited = ?2 WHERE id = ?3",
                params![msg.body, msg.edited as i64, msg.id],
            )?;
            Ok(msg.id)
        }
    }

    fn delete_message(&self, id: MessageId) -> CoreResult<()> {
        let conn = self.db.conn.lock().unwrap();
        let chat: ChatId = conn.query_row(
            "SELECT chat_id FROM messages WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;

        let new_tail: Option<MessageId> = conn
            .query_row(
                "SELECT id FROM messages WHERE chat_id = ?1 ORDER BY id DESC LIMIT 1",
                params![chat],
                |row| row.get(0),
            )
            .optional()?;
        conn.execute(
            "UPDATE chats SET last_message = ?1 WHERE id = ?2",
            params![new_tail, chat],
        )?;
        Ok(())
    }

    fn reset_counter(&self, chat: ChatId, user: UserId) -> CoreResult<()> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE user_chats SET unread_count = 0 WHERE chat_id = ?1 AND user_id = ?2",
            params![chat, user],
        )?;
        Ok(())
    }

    fn increment_counters(&self, chat: ChatId, except_user: UserId) -> CoreResult<()> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE user_chats SET unread_count = unread_count + 1
             WHERE chat_id = ?1 AND user_id <> ?2",
            params![chat, except_user],
        )?;
        Ok(())
    }

    fn start_call(
        &self,
        initiator: UserId,
        device: i64,
        kind: CallKind,
        chat: ChatId,
    ) -> CoreResult<CallWithParticipants> {
        let conn = self.db.conn.lock().unwrap();
        let kind_str = if kind == CallKind::Group { "group" } else { "personal" };
        conn.execute(
            "INSERT INTO calls (chat_id, initiator_id, kind, start, status, room_name)
             VALUES (?1, ?2, ?3, NULL, ?4, NULL)",
            params![chat, initiator, kind_str, CallStatus::Initiated as i32],
        )?;
        let call_id = conn.last_insert_rowid();

        let members = self
            .cache
            .read()
            .unwrap()
            .by_chat
            .get(&chat)
            .cloned()
            .unwrap_or_default();

        for &user in &members {
            let status = if user == initiator {
                ParticipantStatus::Connecting
            } else {
                ParticipantStatus::Initiated
            };
            let dev = if user == initiator { device } else { 0 };
            conn.execute(
                "INSERT INTO call_user (call_id, user_id, device_id, status) VALUES (?1, ?2, ?3, ?4)",
                params![call_id, user, dev, status as i32],
            )?;
        }

        Ok(self.load_call(&conn, call_id)?.expect("just inserted"))
    }

    fn set_room_name(&self, call: CallId, room_name: &str) -> CoreResult<()> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE calls SET room_name = ?1 WHERE id = ?2",
            params![room_name, call],
        )?;
        Ok(())
    }

    fn get_call(&self, id: CallId) -> CoreResult<Option<CallWithParticipants>> {
        let conn = self.db.conn.lock().unwrap();
        Ok(self.load_call(&conn, id)?)
    }

    fn get_call_by_user(&self, user: UserId) -> CoreResult<Option<CallWithParticipants>> {
        let conn = self.db.conn.lock().unwrap();
        let call_id: Option<CallId> = conn
            .query_row(
                "SELECT c.id FROM calls c JOIN call_user cu ON cu.call_id = c.id
                 WHERE cu.user_id = ?1 AND c.status < 900 AND cu.status <> 0 LIMIT 1",
                params![user],
                |row| row.get(0),
            )
            .optional()?;
        match call_id {
            Some(id) => Ok(self.load_call(&conn, id)?),
            None => Ok(None),
        }
    }

    fn get_call_by_device(&self, device: i64) -> CoreResult<Option<CallWithParticipants>> {
        let conn = self.db.conn.lock().unwrap();
        let call_id: Option<CallId> = conn
            .query_row(
                "SELECT c.id FROM calls c JOIN call_user cu ON cu.call_id = c.id
                 WHERE cu.device_id = ?1 AND c.status < 900 LIMIT 1",
                params![device],
                |row| row.get(0),
            )
            .optional()?;
        match call_id {
            Some(id) => Ok(self.load_call(&conn, id)?),
            None => Ok(None),
        }
    }

    fn check_if_chat_in_call(&self, chat: ChatId) -> CoreResult<Option<CallWithParticipants>> {
        let conn = self.db.conn.lock().unwrap();
        let call_id: Option<CallId> = conn
            .query_row(
                "SELECT id FROM calls WHERE chat_id = ?1 AND status < 900 LIMIT 1",
                params![chat],
                |row| row.get(0),
            )
            .optional()?;
        match call_id {
            Some(id) => Ok(self.load_call(&conn, id)?),
            None => Ok(None),
        }
    }

    fn check_if_user_in_call(&self, user: UserId) -> CoreResult<bool> {
        let conn = self.db.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM calls c JOIN call_user cu ON cu.call_id = c.id
             WHERE cu.user_id = ?1 AND c.status < 900 AND cu.status <> 0",
            params![user],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn update_call_status(&self, call: CallId, status: CallStatus) -> CoreResult<()> {
        let conn = self.db.conn.lock().unwrap();
        let mut effective = status;
        if status == CallStatus::Accepted {
            effective = CallStatus::Active;
        }

        if effective == CallStatus::Active {
            let already_started: Option<String> = conn.query_row(
                "SELECT start FROM calls WHERE id = ?1",
                params![call],
                |row| row.get(0),
            )?;
            if already_started.is_none() {
                conn.execute(
                    "UPDATE calls SET status = ?1, start = ?2 WHERE id = ?3",
                    params![effective as i32, chrono::Utc::now().to_rfc3339(), call],
                )?;
                return Ok(());
            }
        }

        conn.execute(
            "UPDATE calls SET status = ?1 WHERE id = ?2",
            params![effective as i32, call],
        )?;
        Ok(())
    }

    fn set_participant(
        &self,
        call: CallId,
        user: UserId,
        device: i64,
        status: ParticipantStatus,
    ) -> CoreResult<()> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE call_user SET device_id = ?1, status = ?2 WHERE call_id = ?3 AND user_id = ?4",
            params![device, status as i32, call, user],
        )?;
        Ok(())
    }

    fn disconnect_all_participants(&self, call: CallId) -> CoreResult<()> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE call_user SET status = ?1 WHERE call_id = ?2",
            params![ParticipantStatus::Disconnected as i32, call],
        )?;
        Ok(())
    }

    fn refresh_participants(
        &self,
        call: CallId,
        new_members: &[UserId],
    ) -> CoreResult<MembershipDelta> {
        let conn = self.db.conn.lock().unwrap();
        let current: HashSet<UserId> = {
            let mut stmt = conn.prepare("SELECT user_id FROM call_user WHERE call_id = ?1")?;
            stmt.query_map(params![call], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?
        };
        let next: HashSet<UserId> = new_members.iter().copied().collect();

        let added: Vec<UserId> = next.difference(&current).copied().collect();
        let removed: Vec<UserId> = current.difference(&next).copied().collect();

        for &user in &added {
            conn.execute(
                "INSERT INTO call_user (call_id, user_id, device_id, status) VALUES (?1, ?2, 0, ?3)",
                params![call, user, ParticipantStatus::Initiated as i32],
            )?;
        }
        for &user in &removed {
            conn.execute(
                "UPDATE call_user SET status = ?1 WHERE call_id = ?2 AND user_id = ?3",
                params![ParticipantStatus::Disconnected as i32, call, user],
            )?;
        }

        Ok(MembershipDelta { added, removed })
    }

    fn drop_all(&self, status: CallStatus) -> CoreResult<Vec<CallWithParticipants>> {
        let conn = self.db.conn.lock().unwrap();
        let ids: Vec<CallId> = {
            let mut stmt = conn.prepare("SELECT id FROM calls WHERE status < 900")?;
            stmt.query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?
        };

        let mut dropped = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(call) = self.load_call(&conn, id)? {
                dropped.push(call);
            }
            conn.execute(
                "UPDATE calls SET status = ?1 WHERE id = ?2",
                params![status as i32, id],
            )?;
            conn.execute(
                "UPDATE call_user SET status = 0 WHERE call_id = ?1",
                params![id],
            )?;
        }

        Ok(dropped)
    }

    fn add_reaction(&self, message: MessageId, reaction: &str, user: UserId) -> CoreResult<bool> {
        let conn = self.db.conn.lock().unwrap();
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM message_reactions WHERE message_id = ?1 AND reaction = ?2 AND user_id = ?3",
            params![message, reaction, user],
            |row| row.get(0),
        )?;
        if exists > 0 {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO message_reactions (message_id, user_id, reaction) VALUES (?1, ?2, ?3)",
            params![message, user, reaction],
        )?;
        Ok(true)
    }

    fn remove_reaction(&self, message: MessageId, reaction: &str, user: UserId) -> CoreResult<()> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM message_reactions WHERE message_id = ?1 AND reaction = ?2 AND user_id = ?3",
            params![message, reaction, user],
        )?;
        Ok(())
    }

    fn reactions_for_message(&self, message: MessageId) -> CoreResult<HashMap<String, Vec<UserId>>> {
        let conn = self.db.conn.lock().unwrap();
        self.reactions_for_message_locked(&conn, message)
    }

    fn reactions_for_chat(
        &self,
        chat: ChatId,
    ) -> CoreResult<HashMap<MessageId, HashMap<String, Vec<UserId>>>> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT r.message_id, r.reaction, r.user_id FROM message_reactions r
             JOIN messages m ON m.id = r.message_id WHERE m.chat_id = ?1",
        )?;
        let rows = stmt.query_map(params![chat], |row| {
            Ok((
                row.get::<_, MessageId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, UserId>(2)?,
            ))
        })?;

        let mut out: HashMap<MessageId, HashMap<String, Vec<UserId>>> = HashMap::new();
        for row in rows {
            let (msg, reaction, user) = row?;
            out.entry(msg).or_default().entry(reaction).or_default().push(user);
        }
        Ok(out)
    }
}

impl SqliteRepository {
    fn reactions_for_message_locked(
        &self,
        conn: &rusqlite::Connection,
        message: MessageId,
    ) -> CoreResult<HashMap<String, Vec<UserId>>> {
        let mut stmt =
            conn.prepare("SELECT reaction, user_id FROM message_reactions WHERE message_id = ?1")?;
        let rows = stmt.query_map(params![message], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, UserId>(1)?))
        })?;
        let mut out: HashMap<String, Vec<UserId>> = HashMap::new();
        for row in rows {
            let (reaction, user) = row?;
            out.entry(reaction).or_default().push(user);
        }
        Ok(out)
    }
}
