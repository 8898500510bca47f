//! SQLite-backed storage bootstrap: a single `rusqlite::Connection`
//! behind a `Mutex`, WAL journaling, and idempotent migrations run once
//! at construction.

use rusqlite::Connection;
use std::sync::Mutex;

pub struct Db {
    pub conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &str) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Db {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Db {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                display_name TEXT NOT NULL DEFAULT '',
                avatar_url TEXT NOT NULL DEFAULT '',
                presence TEXT NOT NULL DEFAULT 'offline'
            );

            CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                avatar TEXT NOT NULL DEFAULT '',
                last_message INTEGER
            );

            CREATE TABLE IF NOT EXISTS user_chats (
                user_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                unread_count INTEGER NOT NULL DEFAULT 0,
                direct_peer INTEGER NOT NULL DEFAULT 0,
                favorite INTEGER NOT NULL DEFAULT 0,
                hidden INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, chat_id)
            );
            CREATE INDEX IF NOT EXISTS idx_user_chats_chat ON user_chats(chat_id);

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                author_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'text',
                body TEXT NOT NULL DEFAULT '',
                edited INTEGER NOT NULL DEFAULT 0,
                related_entity INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_messages_chat_date ON messages(chat_id, date);

            CREATE TABLE IF NOT EXISTS message_reactions (
                message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL,
                reaction TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id, reaction)
            );

            CREATE TABLE IF NOT EXISTS calls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                initiator_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                start TEXT,
                status INTEGER NOT NULL,
                room_name TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_calls_chat ON calls(chat_id);

            CREATE TABLE IF NOT EXISTS call_user (
                call_id INTEGER NOT NULL REFERENCES calls(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL,
                device_id INTEGER NOT NULL DEFAULT 0,
                status INTEGER NOT NULL,
                PRIMARY KEY (call_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_call_user_user ON call_user(user_id);
            CREATE INDEX IF NOT EXISTS idx_call_user_device ON call_user(device_id);
            ",
        )?;
        Ok(())
    }
}
