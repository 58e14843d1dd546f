//! Conversational memory: past exchanges stored per user and recalled by
//! keyword overlap with the new request.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Rows considered per search. Older history is not recalled.
const SEARCH_WINDOW: usize = 500;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "you", "your", "what", "whats", "how", "can", "could", "would", "should",
    "with", "this", "that", "have", "has", "had", "will", "about", "from", "there", "their", "they", "them",
    "any", "some", "into", "like", "just", "please", "tell", "give", "does", "did", "not", "but", "all", "get",
];

#[derive(Debug, Clone, PartialEq)]
pub enum MemoryError {
    Storage(String),
    Encoding(String),
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::Storage(e) => write!(f, "Memory storage error: {e}"),
            MemoryError::Encoding(e) => write!(f, "Memory encoding error: {e}"),
        }
    }
}

impl std::error::Error for MemoryError {}

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        MemoryError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        MemoryError::Encoding(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: Role,
    pub content: String,
}

impl MemoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// One stored exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub id: i64,
    pub messages: Vec<MemoryMessage>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Compact rendering for prompts: `user: ... | assistant: ...`.
    pub fn summary(&self) -> String {
        self.messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                format!("{}: {}", role, m.content)
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

pub trait MemoryStore: Send + Sync {
    /// Most relevant stored exchanges for `user_id`, best first.
    fn search<'a>(
        &'a self,
        query: &'a str,
        user_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<MemoryRecord>, MemoryError>>;

    fn add<'a>(
        &'a self,
        user_id: &'a str,
        messages: Vec<MemoryMessage>,
        metadata: Value,
    ) -> BoxFuture<'a, Result<(), MemoryError>>;
}

/// Lowercased words of three or more characters, minus stopwords.
fn terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Rank `candidates` against `query`. Records sharing no term are dropped;
/// ties go to the newer record. A query with no usable terms returns the
/// newest records.
fn rank(query: &str, candidates: Vec<(MemoryRecord, String)>, limit: usize) -> Vec<MemoryRecord> {
    let wanted = terms(query);
    let mut scored: Vec<(usize, MemoryRecord)> = candidates
        .into_iter()
        .filter_map(|(record, text)| {
            if wanted.is_empty() {
                return Some((0, record));
            }
            let have = terms(&text);
            let score = wanted.intersection(&have).count();
            (score > 0).then_some((score, record))
        })
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then(b.id.cmp(&a.id)));
    scored.into_iter().take(limit).map(|(_, record)| record).collect()
}

/// SQLite-backed memory store.
pub struct SqliteMemory {
    conn: Mutex<Connection>,
}

impl SqliteMemory {
    pub fn open(path: &Path) -> Result<Self, MemoryError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, MemoryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, MemoryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                messages TEXT NOT NULL,
                metadata TEXT NOT NULL,
                search_text TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_memories_user_id ON memories(user_id);
        "#,
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, MemoryError> {
        self.conn
            .lock()
            .map_err(|_| MemoryError::Storage("memory store lock poisoned".into()))
    }

    fn load_recent(&self, user_id: &str) -> Result<Vec<(MemoryRecord, String)>, MemoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, messages, metadata, search_text, created_at FROM memories
             WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, SEARCH_WINDOW as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, messages, metadata, search_text, created_at) = row?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| MemoryError::Encoding(e.to_string()))?;
            let record = MemoryRecord {
                id,
                messages: serde_json::from_str(&messages)?,
                metadata: serde_json::from_str(&metadata)?,
                created_at,
            };
            records.push((record, search_text));
        }
        Ok(records)
    }

    fn insert(&self, user_id: &str, messages: &[MemoryMessage], metadata: &Value) -> Result<(), MemoryError> {
        let search_text = messages
            .iter()
            .map(|m| m.content.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO memories (user_id, messages, metadata, search_text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                serde_json::to_string(messages)?,
                serde_json::to_string(metadata)?,
                search_text,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

impl MemoryStore for SqliteMemory {
    fn search<'a>(
        &'a self,
        query: &'a str,
        user_id: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<MemoryRecord>, MemoryError>> {
        Box::pin(async move {
            let candidates = self.load_recent(user_id)?;
            let found = rank(query, candidates, limit);
            debug!("🧠 {} memories recalled for user {}", found.len(), user_id);
            Ok(found)
        })
    }

    fn add<'a>(
        &'a self,
        user_id: &'a str,
        messages: Vec<MemoryMessage>,
        metadata: Value,
    ) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move {
            self.insert(user_id, &messages, &metadata)?;
            debug!("🧠 Stored exchange for user {}", user_id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store_exchange(store: &SqliteMemory, user: &str, question: &str, answer: &str) {
        store
            .add(
                user,
                vec![MemoryMessage::user(question), MemoryMessage::assistant(answer)],
                json!({ "specialist": "test" }),
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_terms_drop_short_words_and_stopwords() {
        let t = terms("What's the plan for my Marathon, ok?");
        assert!(t.contains("plan"));
        assert!(t.contains("marathon"));
        assert!(!t.contains("the"));
        assert!(!t.contains("ok"));
        assert!(!t.contains("what"));
    }

    #[tokio::test]
    async fn test_add_then_search_surfaces_exchange() {
        let store = SqliteMemory::in_memory().unwrap();
        store_exchange(&store, "1", "I am training for the Berlin marathon", "Great goal!").await;
        store_exchange(&store, "1", "Remind me to buy milk", "Noted.").await;

        let found = store.search("how is my marathon training going?", "1", 5).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].summary().contains("Berlin marathon"));
        assert_eq!(found[0].metadata["specialist"], "test");
    }

    #[tokio::test]
    async fn test_search_is_scoped_to_user() {
        let store = SqliteMemory::in_memory().unwrap();
        store_exchange(&store, "1", "My knee hurts after long runs", "Take it easy.").await;

        assert!(store.search("knee", "2", 5).await.unwrap().is_empty());
        assert_eq!(store.search("knee", "1", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ranking_prefers_overlap_then_recency() {
        let store = SqliteMemory::in_memory().unwrap();
        store_exchange(&store, "1", "tempo run on tuesday", "ok").await;
        store_exchange(&store, "1", "tempo workout", "ok").await;
        store_exchange(&store, "1", "tempo run pace targets", "ok").await;

        let found = store.search("tempo run", "1", 2).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].summary().contains("pace targets"));
        assert!(found[1].summary().contains("tuesday"));
    }

    #[tokio::test]
    async fn test_query_without_terms_returns_recent() {
        let store = SqliteMemory::in_memory().unwrap();
        store_exchange(&store, "1", "first question", "a").await;
        store_exchange(&store, "1", "second question", "b").await;

        let found = store.search("hi", "1", 1).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].summary().contains("second"));
    }

    #[tokio::test]
    async fn test_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        {
            let store = SqliteMemory::open(&path).unwrap();
            store_exchange(&store, "9", "favourite trail is Box Hill", "Nice.").await;
        }
        let store = SqliteMemory::open(&path).unwrap();
        assert_eq!(store.search("trail", "9", 5).await.unwrap().len(), 1);
    }
}
