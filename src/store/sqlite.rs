use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use boardroom_common::{
    ChainLink, History, HistoryQuery, Member, MemberPatch, NewHistory, NewMember, Picture,
};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, types::Type};

use super::Store;
use crate::errors::StoreError;

/// Async-safe handle to the local database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&BoardDb) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Database(anyhow::anyhow!("DB task panicked: {}", e)))?
    }
}

pub struct BoardDb {
    conn: Connection,
}

const MEMBER_COLUMNS: &str =
    "id, user_id, name, description, background, role, picture, created_at";
const HISTORY_COLUMNS: &str =
    "id, user_id, member_id, user_input, member_output, chat, created_at";

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS members (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    background TEXT NOT NULL DEFAULT '',
                    role TEXT NOT NULL DEFAULT '[]',
                    picture TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS history (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    member_id TEXT NOT NULL REFERENCES members(id) ON DELETE CASCADE,
                    user_input TEXT NOT NULL,
                    member_output TEXT NOT NULL,
                    chat TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS pictures (
                    id TEXT PRIMARY KEY,
                    url TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_members_user ON members(user_id);
                CREATE INDEX IF NOT EXISTS idx_history_user ON history(user_id);
                CREATE INDEX IF NOT EXISTS idx_history_member ON history(user_id, member_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Members ───────────────────────────────────────────────────────

    pub fn list_members(&self, user_id: &str) -> Result<Vec<Member>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE user_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt.query_map(params![user_id], member_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_member(&self, id: &str) -> Result<Option<Member>, StoreError> {
        let member = self
            .conn
            .query_row(
                &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1"),
                params![id],
                member_from_row,
            )
            .optional()?;
        Ok(member)
    }

    pub fn create_member(&self, new: &NewMember) -> Result<Member, StoreError> {
        let member = Member {
            id: new_id(),
            user_id: new.user_id.clone(),
            name: new.name.clone(),
            description: new.description.clone(),
            background: new.background.clone(),
            role: new.role.clone(),
            picture: new.picture.clone(),
            created_at: now(),
        };
        self.conn.execute(
            &format!("INSERT INTO members ({MEMBER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                member.id,
                member.user_id,
                member.name,
                member.description,
                member.background,
                encode_json(&member.role)?,
                member.picture,
                member.created_at,
            ],
        )?;
        Ok(member)
    }

    pub fn update_member(&self, id: &str, patch: MemberPatch) -> Result<Option<Member>, StoreError> {
        let Some(mut member) = self.get_member(id)? else {
            return Ok(None);
        };
        patch.apply_to(&mut member);
        self.conn.execute(
            "UPDATE members
             SET name = ?2, description = ?3, background = ?4, role = ?5, picture = ?6
             WHERE id = ?1",
            params![
                member.id,
                member.name,
                member.description,
                member.background,
                encode_json(&member.role)?,
                member.picture,
            ],
        )?;
        Ok(Some(member))
    }

    pub fn delete_member(&self, id: &str) -> Result<bool, StoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM members WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    // ── History ───────────────────────────────────────────────────────

    pub fn insert_history(&self, new: &NewHistory) -> Result<History, StoreError> {
        let history = History {
            id: new_id(),
            user_id: new.user_id.clone(),
            member_id: new.member_id.clone(),
            user_input: new.user_input.clone(),
            member_output: new.member_output.clone(),
            chat: new.chat.clone(),
            created_at: now(),
        };
        let chat = history.chat.as_ref().map(encode_json).transpose()?;
        self.conn.execute(
            &format!("INSERT INTO history ({HISTORY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                history.id,
                history.user_id,
                history.member_id,
                history.user_input,
                history.member_output,
                chat,
                history.created_at,
            ],
        )?;
        Ok(history)
    }

    pub fn get_history(&self, id: &str) -> Result<Option<History>, StoreError> {
        let history = self
            .conn
            .query_row(
                &format!("SELECT {HISTORY_COLUMNS} FROM history WHERE id = ?1"),
                params![id],
                history_from_row,
            )
            .optional()?;
        Ok(history)
    }

    pub fn list_history(&self, query: &HistoryQuery) -> Result<Vec<History>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history
             WHERE user_id = ?1 AND (?2 IS NULL OR member_id = ?2)
             ORDER BY rowid DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![query.user_id, query.member_id, query.effective_limit()],
            history_from_row,
        )?;
        let mut records = rows.collect::<Result<Vec<_>, _>>()?;
        records.reverse();
        Ok(records)
    }

    // ── Pictures ──────────────────────────────────────────────────────

    pub fn list_pictures(&self) -> Result<Vec<Picture>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, url, created_at FROM pictures ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok(Picture {
                id: row.get(0)?,
                url: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn insert_picture(&self, url: &str) -> Result<Picture, StoreError> {
        let picture = Picture {
            id: new_id(),
            url: url.to_string(),
            created_at: now(),
        };
        self.conn.execute(
            "INSERT INTO pictures (id, url, created_at) VALUES (?1, ?2, ?3)",
            params![picture.id, picture.url, picture.created_at],
        )?;
        Ok(picture)
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Decode(e.to_string()))
}

fn decode_json<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: &str,
) -> Result<T, rusqlite::Error> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    let role: String = row.get(5)?;
    Ok(Member {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        background: row.get(4)?,
        role: decode_json(5, &role)?,
        picture: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<History> {
    let chat: Option<String> = row.get(5)?;
    let chat: Option<ChainLink> = match chat {
        Some(raw) => Some(decode_json(5, &raw)?),
        None => None,
    };
    Ok(History {
        id: row.get(0)?,
        user_id: row.get(1)?,
        member_id: row.get(2)?,
        user_input: row.get(3)?,
        member_output: row.get(4)?,
        chat,
        created_at: row.get(6)?,
    })
}

/// `Store` over a local SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    db: DbHandle,
}

impl SqliteStore {
    pub fn new(db: BoardDb) -> Self {
        Self {
            db: DbHandle::new(db),
        }
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(BoardDb::new_in_memory()?))
    }

    pub async fn insert_picture(&self, url: &str) -> Result<Picture, StoreError> {
        let url = url.to_string();
        self.db.call(move |db| db.insert_picture(&url)).await
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn list_members(&self, user_id: &str) -> Result<Vec<Member>, StoreError> {
        let user_id = user_id.to_string();
        self.db.call(move |db| db.list_members(&user_id)).await
    }

    async fn get_member(&self, id: &str) -> Result<Option<Member>, StoreError> {
        let id = id.to_string();
        self.db.call(move |db| db.get_member(&id)).await
    }

    async fn create_member(&self, member: NewMember) -> Result<Member, StoreError> {
        self.db.call(move |db| db.create_member(&member)).await
    }

    async fn update_member(
        &self,
        id: &str,
        patch: MemberPatch,
    ) -> Result<Option<Member>, StoreError> {
        let id = id.to_string();
        self.db.call(move |db| db.update_member(&id, patch)).await
    }

    async fn delete_member(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.db.call(move |db| db.delete_member(&id)).await
    }

    async fn insert_history(&self, entry: NewHistory) -> Result<History, StoreError> {
        self.db.call(move |db| db.insert_history(&entry)).await
    }

    async fn get_history(&self, id: &str) -> Result<Option<History>, StoreError> {
        let id = id.to_string();
        self.db.call(move |db| db.get_history(&id)).await
    }

    async fn list_history(&self, query: &HistoryQuery) -> Result<Vec<History>, StoreError> {
        let query = query.clone();
        self.db.call(move |db| db.list_history(&query)).await
    }

    async fn list_pictures(&self) -> Result<Vec<Picture>, StoreError> {
        self.db.call(|db| db.list_pictures()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_member(user_id: &str, name: &str) -> NewMember {
        NewMember {
            user_id: user_id.to_string(),
            name: name.to_string(),
            description: "growth hacker".to_string(),
            background: "three failed startups and one exit".to_string(),
            role: vec!["Startup Founder".to_string(), "Growth Hacker".to_string()],
            picture: String::new(),
        }
    }

    fn answer(user_id: &str, member_id: &str, output: &str) -> NewHistory {
        NewHistory {
            user_id: user_id.to_string(),
            member_id: member_id.to_string(),
            user_input: "Should I raise a seed round?".to_string(),
            member_output: output.to_string(),
            chat: None,
        }
    }

    #[test]
    fn test_create_and_get_member() {
        let db = BoardDb::new_in_memory().unwrap();
        let created = db.create_member(&new_member("u1", "Connor Walsh")).unwrap();
        assert!(!created.id.is_empty());

        let fetched = db.get_member(&created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.role, vec!["Startup Founder", "Growth Hacker"]);
    }

    #[test]
    fn test_get_missing_member_is_none() {
        let db = BoardDb::new_in_memory().unwrap();
        assert!(db.get_member("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_members_is_scoped_and_ordered() {
        let db = BoardDb::new_in_memory().unwrap();
        let a = db.create_member(&new_member("u1", "A")).unwrap();
        db.create_member(&new_member("u2", "Other")).unwrap();
        let b = db.create_member(&new_member("u1", "B")).unwrap();

        let members = db.list_members("u1").unwrap();
        let ids: Vec<_> = members.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn test_update_member_applies_patch() {
        let db = BoardDb::new_in_memory().unwrap();
        let created = db.create_member(&new_member("u1", "Liang Chen")).unwrap();
        let patch = MemberPatch {
            description: Some("AI researcher".into()),
            role: Some(vec!["CTO".into()]),
            ..Default::default()
        };
        let updated = db.update_member(&created.id, patch).unwrap().unwrap();
        assert_eq!(updated.description, "AI researcher");
        assert_eq!(updated.role, vec!["CTO"]);
        assert_eq!(updated.name, "Liang Chen");

        let reloaded = db.get_member(&created.id).unwrap().unwrap();
        assert_eq!(reloaded, updated);
    }

    #[test]
    fn test_update_missing_member_is_none() {
        let db = BoardDb::new_in_memory().unwrap();
        let result = db
            .update_member("missing", MemberPatch::default())
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_delete_member_cascades_history() {
        let db = BoardDb::new_in_memory().unwrap();
        let member = db.create_member(&new_member("u1", "Tasha Bloom")).unwrap();
        db.insert_history(&answer("u1", &member.id, "Yes.")).unwrap();

        assert!(db.delete_member(&member.id).unwrap());
        assert!(!db.delete_member(&member.id).unwrap());
        assert!(db.list_history(&HistoryQuery::for_user("u1")).unwrap().is_empty());
    }

    #[test]
    fn test_history_requires_existing_member() {
        let db = BoardDb::new_in_memory().unwrap();
        let err = db.insert_history(&answer("u1", "ghost", "boo")).unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn test_history_chain_link_roundtrips_through_storage() {
        let db = BoardDb::new_in_memory().unwrap();
        let a = db.create_member(&new_member("u1", "A")).unwrap();
        let b = db.create_member(&new_member("u1", "B")).unwrap();
        let first = db.insert_history(&answer("u1", &a.id, "Raise now.")).unwrap();

        let mut reply = answer("u1", &b.id, "Too early.");
        reply.chat = Some(ChainLink {
            in_reply_to: first.id.clone(),
            source_member_id: a.id.clone(),
        });
        let stored = db.insert_history(&reply).unwrap();

        let fetched = db.get_history(&stored.id).unwrap().unwrap();
        assert_eq!(fetched.chat.unwrap().in_reply_to, first.id);
        assert!(db.get_history(&first.id).unwrap().unwrap().chat.is_none());
    }

    #[test]
    fn test_list_history_filters_and_limits_oldest_first() {
        let db = BoardDb::new_in_memory().unwrap();
        let a = db.create_member(&new_member("u1", "A")).unwrap();
        let b = db.create_member(&new_member("u1", "B")).unwrap();
        for i in 0..4 {
            db.insert_history(&answer("u1", &a.id, &format!("a{i}"))).unwrap();
            db.insert_history(&answer("u1", &b.id, &format!("b{i}"))).unwrap();
        }

        let only_a = db
            .list_history(&HistoryQuery::for_user("u1").with_member(a.id.clone()))
            .unwrap();
        let outputs: Vec<_> = only_a.iter().map(|h| h.member_output.as_str()).collect();
        assert_eq!(outputs, vec!["a0", "a1", "a2", "a3"]);

        let latest = db
            .list_history(&HistoryQuery::for_user("u1").with_limit(3))
            .unwrap();
        let outputs: Vec<_> = latest.iter().map(|h| h.member_output.as_str()).collect();
        assert_eq!(outputs, vec!["b2", "a3", "b3"]);

        assert!(db.list_history(&HistoryQuery::for_user("u2")).unwrap().is_empty());
    }

    #[test]
    fn test_pictures_in_insertion_order() {
        let db = BoardDb::new_in_memory().unwrap();
        db.insert_picture("https://cdn.test/one.png").unwrap();
        db.insert_picture("https://cdn.test/two.png").unwrap();
        let urls: Vec<_> = db
            .list_pictures()
            .unwrap()
            .into_iter()
            .map(|p| p.url)
            .collect();
        assert_eq!(urls, vec!["https://cdn.test/one.png", "https://cdn.test/two.png"]);
    }

    #[test]
    fn test_reopen_file_database_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.db");
        {
            let db = BoardDb::new(&path).unwrap();
            db.create_member(&new_member("u1", "Eleanor Hart")).unwrap();
        }
        let db = BoardDb::new(&path).unwrap();
        assert_eq!(db.list_members("u1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_trait_over_handle() {
        let store = SqliteStore::in_memory().unwrap();
        let created = store
            .create_member(new_member("u1", "Priya Desai"))
            .await
            .unwrap();
        let listed = store.list_members("u1").await.unwrap();
        assert_eq!(listed, vec![created.clone()]);

        store.insert_picture("https://cdn.test/p.png").await.unwrap();
        assert_eq!(store.list_pictures().await.unwrap().len(), 1);

        assert!(store.delete_member(&created.id).await.unwrap());
        assert!(store.get_member(&created.id).await.unwrap().is_none());
    }
}
