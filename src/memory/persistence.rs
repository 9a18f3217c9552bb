//! 会话持久化
//!
//! SessionStore 按 session id 保存 / 加载整个 SessionMemory。每个 id 只能保存一次：
//! 审计日志一经落盘不再覆盖。加载时文档损坏或含未知推理模式一律报 Deserialization。

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::core::EngineError;
use crate::memory::session::SessionMemory;

/// 持久化后端
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 保存会话，返回存储位置；同一 id 第二次保存返回 Storage 错误
    async fn save(&self, session: &SessionMemory) -> Result<String, EngineError>;

    async fn load(&self, session_id: &str) -> Result<SessionMemory, EngineError>;

    /// 已保存的 session id，按字典序
    async fn list(&self) -> Result<Vec<String>, EngineError>;
}

/// id 会被拼进路径，只允许字母数字与 `_` / `-`
fn validate_id(session_id: &str) -> Result<(), EngineError> {
    let ok = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(EngineError::Storage(format!("invalid session id '{session_id}'")))
    }
}

fn decode(session_id: &str, document: &str) -> Result<SessionMemory, EngineError> {
    let session: SessionMemory = serde_json::from_str(document)?;
    if session.session_id() != session_id {
        return Err(EngineError::Deserialization(format!(
            "document for '{session_id}' carries session id '{}'",
            session.session_id()
        )));
    }
    Ok(session)
}

fn already_saved(session_id: &str) -> EngineError {
    EngineError::Storage(format!("session '{session_id}' has already been saved"))
}

// ---------------------------------------------------------------------------
// 文件存储
// ---------------------------------------------------------------------------

/// `<root>/sessions/<id>.json`
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    sessions_dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            sessions_dir: root.as_ref().join("sessions"),
        }
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.json"))
    }

    /// 删除修改时间早于 `days` 天前的会话文件，返回删除数量
    pub async fn prune_older_than(&self, days: u32) -> Result<usize, EngineError> {
        let max_age = Duration::from_secs(u64::from(days) * 24 * 60 * 60);
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut dir = match tokio::fs::read_dir(&self.sessions_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(storage_err(&self.sessions_dir, e)),
        };

        let mut removed = 0;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| storage_err(&self.sessions_dir, e))?
        {
            let path = item.path();
            // 连同中断保存遗留的临时文件一起清理
            if !matches!(path.extension().and_then(|e| e.to_str()), Some("json" | "tmp")) {
                continue;
            }
            let modified = match item.metadata().await.and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot read session file metadata");
                    continue;
                }
            };
            if modified < cutoff {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| storage_err(&path, e))?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, days, "pruned old sessions");
        }
        Ok(removed)
    }
}

async fn publish(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    // 目标已存在时 hard_link 失败，保持一次写入语义
    tokio::fs::hard_link(tmp, path).await
}

fn storage_err(path: &Path, err: std::io::Error) -> EngineError {
    EngineError::Storage(format!("{}: {err}", path.display()))
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &SessionMemory) -> Result<String, EngineError> {
        let id = session.session_id();
        validate_id(id)?;
        tokio::fs::create_dir_all(&self.sessions_dir)
            .await
            .map_err(|e| storage_err(&self.sessions_dir, e))?;

        let document = serde_json::to_string_pretty(session)
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        let path = self.path_for(id);
        // 先写临时文件再硬链接到最终名：中途失败或被取消都不会留下半截的 .json
        let tmp = self.sessions_dir.join(format!(
            ".{id}.{}.tmp",
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        ));
        let published = publish(&tmp, &path, document.as_bytes()).await;
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %tmp.display(), error = %e, "failed to remove temp session file");
            }
        }
        match published {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(already_saved(id)),
            Err(e) => return Err(storage_err(&path, e)),
        }

        tracing::info!(session_id = id, path = %path.display(), "session saved");
        Ok(path.display().to_string())
    }

    async fn load(&self, session_id: &str) -> Result<SessionMemory, EngineError> {
        validate_id(session_id)?;
        let path = self.path_for(session_id);
        let document = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EngineError::SessionNotFound(session_id.to_string()))
            }
            Err(e) => return Err(storage_err(&path, e)),
        };
        decode(session_id, &document)
    }

    async fn list(&self) -> Result<Vec<String>, EngineError> {
        let mut dir = match tokio::fs::read_dir(&self.sessions_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err(&self.sessions_dir, e)),
        };
        let mut ids = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| storage_err(&self.sessions_dir, e))?
        {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// 内存存储
// ---------------------------------------------------------------------------

/// 保存序列化后的文档，与文件存储走同一条编解码路径；用于测试与嵌入式场景
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    documents: RwLock<HashMap<String, String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接放入一份原始文档（不经过校验）
    pub async fn insert_raw(&self, session_id: impl Into<String>, document: impl Into<String>) {
        self.documents
            .write()
            .await
            .insert(session_id.into(), document.into());
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session: &SessionMemory) -> Result<String, EngineError> {
        let id = session.session_id();
        validate_id(id)?;
        let document =
            serde_json::to_string(session).map_err(|e| EngineError::Storage(e.to_string()))?;
        let mut documents = self.documents.write().await;
        if documents.contains_key(id) {
            return Err(already_saved(id));
        }
        documents.insert(id.to_string(), document);
        Ok(format!("memory://{id}"))
    }

    async fn load(&self, session_id: &str) -> Result<SessionMemory, EngineError> {
        let documents = self.documents.read().await;
        let document = documents
            .get(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        decode(session_id, document)
    }

    async fn list(&self) -> Result<Vec<String>, EngineError> {
        let mut ids: Vec<String> = self.documents.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// SQLite 存储（需要 `async-sqlite` feature）
// ---------------------------------------------------------------------------

#[cfg(feature = "async-sqlite")]
mod sqlite {
    use std::path::Path;

    use async_trait::async_trait;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
    use sqlx::Row;

    use super::{already_saved, decode, validate_id, SessionStore};
    use crate::core::EngineError;
    use crate::memory::session::SessionMemory;

    fn db_err(err: sqlx::Error) -> EngineError {
        EngineError::Storage(err.to_string())
    }

    /// 每个会话一行，document 列存完整 JSON 文档
    pub struct SqliteSessionStore {
        pool: SqlitePool,
    }

    impl SqliteSessionStore {
        pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, EngineError> {
            let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await
                .map_err(db_err)?;
            Self::from_pool(pool).await
        }

        pub async fn from_pool(pool: SqlitePool) -> Result<Self, EngineError> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS sessions (
                    id TEXT PRIMARY KEY,
                    created_at TEXT NOT NULL,
                    last_updated TEXT NOT NULL,
                    document TEXT NOT NULL
                )",
            )
            .execute(&pool)
            .await
            .map_err(db_err)?;
            Ok(Self { pool })
        }
    }

    #[async_trait]
    impl SessionStore for SqliteSessionStore {
        async fn save(&self, session: &SessionMemory) -> Result<String, EngineError> {
            let id = session.session_id();
            validate_id(id)?;
            let document =
                serde_json::to_string(session).map_err(|e| EngineError::Storage(e.to_string()))?;
            let result = sqlx::query(
                "INSERT INTO sessions (id, created_at, last_updated, document) VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(session.created_at().to_rfc3339())
            .bind(session.last_updated().to_rfc3339())
            .bind(&document)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(format!("sqlite://sessions/{id}")),
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(already_saved(id)),
                Err(e) => Err(db_err(e)),
            }
        }

        async fn load(&self, session_id: &str) -> Result<SessionMemory, EngineError> {
            let row = sqlx::query("SELECT document FROM sessions WHERE id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?
                .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
            let document: String = row.try_get("document").map_err(db_err)?;
            decode(session_id, &document)
        }

        async fn list(&self) -> Result<Vec<String>, EngineError> {
            let rows = sqlx::query("SELECT id FROM sessions ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
            rows.iter()
                .map(|row| row.try_get::<String, _>("id").map_err(db_err))
                .collect()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::memory::entry::{NewEntry, ReasoningPattern};
        use serde_json::json;

        #[tokio::test]
        async fn test_sqlite_round_trip_and_write_once() {
            let dir = tempfile::tempdir().unwrap();
            let store = SqliteSessionStore::new(dir.path().join("sessions.db")).await.unwrap();

            let mut session = SessionMemory::new();
            session.append(NewEntry::new("perception", json!({"intent": "unknown"}), ReasoningPattern::React));
            store.save(&session).await.unwrap();

            assert_eq!(store.load(session.session_id()).await.unwrap(), session);
            assert!(matches!(store.save(&session).await, Err(EngineError::Storage(_))));
            assert_eq!(store.list().await.unwrap(), vec![session.session_id().to_string()]);
        }
    }
}

#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteSessionStore;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::entry::{NewEntry, ReasoningPattern};
    use serde_json::json;

    fn sample_session() -> SessionMemory {
        let mut session = SessionMemory::new();
        session.append(
            NewEntry::new("perception", json!({"intent": "skill_gap_analysis"}), ReasoningPattern::React)
                .steps(ReasoningPattern::React.generic_steps())
                .confidence(1.0)
                .meta("status", "validated"),
        );
        session.append(
            NewEntry::new("decision", json!({"natural_language_summary": "Upskill Alice"}), ReasoningPattern::Tot)
                .confidence(0.6)
                .meta("status", "cleaned"),
        );
        session.update("current_step", "decision_complete");
        session
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let session = sample_session();

        let location = store.save(&session).await.unwrap();
        assert!(location.ends_with(&format!("{}.json", session.session_id())));

        let loaded = store.load(session.session_id()).await.unwrap();
        assert_eq!(loaded, session);
        assert_eq!(store.list().await.unwrap(), vec![session.session_id().to_string()]);
    }

    #[tokio::test]
    async fn test_file_store_is_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let session = sample_session();
        store.save(&session).await.unwrap();
        let err = store.save(&session).await.unwrap_err();
        assert!(matches!(err, EngineError::Storage(_)));

        // 失败的保存不留临时文件，原文档不受影响
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(store.sessions_dir()).await.unwrap();
        while let Some(item) = dir.next_entry().await.unwrap() {
            names.push(item.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec![format!("{}.json", session.session_id())]);
        assert_eq!(store.load(session.session_id()).await.unwrap(), session);
    }

    #[tokio::test]
    async fn test_file_store_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());

        let err = store.load("session_missing").await.unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(_)));

        tokio::fs::create_dir_all(store.sessions_dir()).await.unwrap();
        tokio::fs::write(store.sessions_dir().join("broken.json"), "{not json")
            .await
            .unwrap();
        let err = store.load("broken").await.unwrap_err();
        assert!(matches!(err, EngineError::Deserialization(_)));
    }

    #[tokio::test]
    async fn test_unknown_reasoning_pattern_is_rejected() {
        let store = InMemorySessionStore::new();
        let session = sample_session();
        let id = session.session_id().to_string();
        let document = serde_json::to_string(&session)
            .unwrap()
            .replace("\"tot\"", "\"telepathy\"");
        store.insert_raw(id.clone(), document).await;

        let err = store.load(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::Deserialization(_)));
    }

    #[tokio::test]
    async fn test_in_memory_store_round_trip() {
        let store = InMemorySessionStore::new();
        let session = sample_session();
        store.save(&session).await.unwrap();
        assert_eq!(store.load(session.session_id()).await.unwrap(), session);
        assert!(store.save(&session).await.is_err());
        assert!(matches!(
            store.load("nope").await,
            Err(EngineError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let err = store.load("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, EngineError::Storage(_)));
    }

    #[tokio::test]
    async fn test_prune_keeps_recent_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.save(&sample_session()).await.unwrap();

        assert_eq!(store.prune_older_than(30).await.unwrap(), 0);
        assert_eq!(store.list().await.unwrap().len(), 1);
        // days = 0 时 cutoff 为当前时刻，刚写入的文件同样会被清理
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.prune_older_than(0).await.unwrap(), 1);
        assert!(store.list().await.unwrap().is_empty());
    }
}
