use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::backend::{fold_terminal, Backend, SearchOrder, SearchParams, SearchResults};
use crate::core::{HashspaceError, Result};
use crate::literal::{Hash, Literal};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS literals (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        hash TEXT NOT NULL UNIQUE,
        class TEXT,
        body JSON NOT NULL
    );
    CREATE INDEX IF NOT EXISTS literals_class ON literals (class, seq);
    CREATE TABLE IF NOT EXISTS refs (
        path TEXT NOT NULL,
        target TEXT NOT NULL,
        class TEXT,
        seq INTEGER NOT NULL,
        hash TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS refs_target ON refs (path, target, seq);
    CREATE TABLE IF NOT EXISTS op_headers (
        op_hash TEXT PRIMARY KEY,
        body JSON NOT NULL
    );
    CREATE TABLE IF NOT EXISTS terminal_ops (
        target TEXT PRIMARY KEY,
        body JSON NOT NULL
    );
";

/// SQLite-backed persistence. Literal bodies are stored as JSON.
#[derive(Clone, Debug)]
pub struct SqliteBackend {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "opened sqlite store");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn decode_body(body: &str) -> Result<Literal> {
    serde_json::from_str(body).map_err(|e| HashspaceError::Storage(format!("corrupt literal: {e}")))
}

fn bounds(params: &SearchParams) -> (i64, i64) {
    let start = match (params.order, params.start) {
        (_, Some(start)) => i64::try_from(start).unwrap_or(i64::MAX),
        (SearchOrder::Asc, None) => 0,
        (SearchOrder::Desc, None) => i64::MAX,
    };
    let limit = params
        .limit
        .and_then(|limit| i64::try_from(limit).ok())
        .unwrap_or(-1);
    (start, limit)
}

fn collect(rows: Vec<(i64, String)>) -> Result<SearchResults> {
    let mut results = SearchResults::default();
    for (seq, body) in rows {
        let seq = u64::try_from(seq).map_err(|e| HashspaceError::Storage(e.to_string()))?;
        results.start.get_or_insert(seq);
        results.end = Some(seq);
        results.items.push(decode_body(&body)?);
    }
    Ok(results)
}

#[async_trait]
impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn store(&self, literal: &Literal) -> Result<bool> {
        let body = serde_json::to_string(literal)?;
        let class_name = literal.class_name();
        let hash = literal.hash.as_str();

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO literals (hash, class, body) VALUES (?1, ?2, ?3)",
            params![hash, class_name, body],
        )?;
        if inserted == 0 {
            return Ok(false);
        }
        let seq = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO refs (path, target, class, seq, hash) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for dependency in &literal.dependencies {
                stmt.execute(params![
                    dependency.path,
                    dependency.hash.as_str(),
                    class_name,
                    seq,
                    hash
                ])?;
            }
        }
        tx.commit()?;
        Ok(true)
    }

    async fn load(&self, hash: &Hash) -> Result<Option<Literal>> {
        let conn = self.conn.lock().await;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM literals WHERE hash = ?1",
                params![hash.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        body.as_deref().map(decode_body).transpose()
    }

    async fn search_by_class(
        &self,
        class_name: &str,
        params: &SearchParams,
    ) -> Result<SearchResults> {
        let (start, limit) = bounds(params);
        let sql = match params.order {
            SearchOrder::Asc => {
                "SELECT seq, body FROM literals WHERE class = ?1 AND seq > ?2 ORDER BY seq ASC LIMIT ?3"
            }
            SearchOrder::Desc => {
                "SELECT seq, body FROM literals WHERE class = ?1 AND seq < ?2 ORDER BY seq DESC LIMIT ?3"
            }
        };
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![class_name, start, limit], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        collect(rows)
    }

    async fn search_by_reference(
        &self,
        class_name: Option<&str>,
        path: &str,
        target: &Hash,
        params: &SearchParams,
    ) -> Result<SearchResults> {
        let (start, limit) = bounds(params);
        let sql = match params.order {
            SearchOrder::Asc => {
                "SELECT DISTINCT l.seq, l.body FROM refs r JOIN literals l ON l.seq = r.seq
                 WHERE r.path = ?1 AND r.target = ?2 AND (?3 IS NULL OR r.class = ?3) AND r.seq > ?4
                 ORDER BY l.seq ASC LIMIT ?5"
            }
            SearchOrder::Desc => {
                "SELECT DISTINCT l.seq, l.body FROM refs r JOIN literals l ON l.seq = r.seq
                 WHERE r.path = ?1 AND r.target = ?2 AND (?3 IS NULL OR r.class = ?3) AND r.seq < ?4
                 ORDER BY l.seq DESC LIMIT ?5"
            }
        };
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(
                params![path, target.as_str(), class_name, start, limit],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        collect(rows)
    }

    async fn store_op_header(&self, op_hash: &Hash, header: &Literal) -> Result<()> {
        let body = serde_json::to_string(header)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO op_headers (op_hash, body) VALUES (?1, ?2)",
            params![op_hash.as_str(), body],
        )?;
        Ok(())
    }

    async fn load_op_header(&self, op_hash: &Hash) -> Result<Option<Literal>> {
        let conn = self.conn.lock().await;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM op_headers WHERE op_hash = ?1",
                params![op_hash.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        body.as_deref().map(decode_body).transpose()
    }

    async fn load_terminal_ops(&self, target: &Hash) -> Result<BTreeSet<Hash>> {
        let conn = self.conn.lock().await;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM terminal_ops WHERE target = ?1",
                params![target.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(serde_json::from_str(&body)?),
            None => Ok(BTreeSet::new()),
        }
    }

    async fn record_terminal_op(&self, target: &Hash, op: &Hash, prev_ops: &[Hash]) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let has_successor: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM refs WHERE path = 'prevOps' AND target = ?1)",
            params![op.as_str()],
            |row| row.get(0),
        )?;
        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM terminal_ops WHERE target = ?1",
                params![target.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let before: BTreeSet<Hash> = match body {
            Some(body) => serde_json::from_str(&body)?,
            None => BTreeSet::new(),
        };
        let after = fold_terminal(before.clone(), op, prev_ops, has_successor);
        if after == before {
            return Ok(false);
        }
        tx.execute(
            "INSERT OR REPLACE INTO terminal_ops (target, body) VALUES (?1, ?2)",
            params![target.as_str(), serde_json::to_string(&after)?],
        )?;
        tx.commit()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::{Dependency, DependencyKind, Hashing, LiteralValue};
    use std::collections::BTreeMap;

    fn literal(class_name: &str, target: Option<&Hash>) -> Literal {
        let mut fields = BTreeMap::new();
        fields.insert("n".to_string(), LiteralValue::string(class_name));
        let value = LiteralValue::HashedObject {
            class_name: class_name.to_string(),
            id: Some(uuid::Uuid::new_v4().to_string()),
            author: None,
            fields,
        };
        let hash = Hashing::for_value(&value).unwrap();
        Literal {
            hash,
            value,
            signature: None,
            dependencies: target
                .map(|target| Dependency {
                    hash: target.clone(),
                    path: "target".into(),
                    class_name: "x".into(),
                    kind: DependencyKind::Reference,
                })
                .into_iter()
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_store_load_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::open(dir.path().join("db/hashspace.sqlite"))
            .await
            .unwrap();

        let target = literal("t/Target", None);
        assert!(backend.store(&target).await.unwrap());
        assert!(!backend.store(&target).await.unwrap());
        let a = literal("t/Op", Some(&target.hash));
        let b = literal("t/Op", Some(&target.hash));
        backend.store(&a).await.unwrap();
        backend.store(&b).await.unwrap();

        assert_eq!(backend.load(&a.hash).await.unwrap(), Some(a.clone()));
        let page = backend
            .search_by_reference(Some("t/Op"), "target", &target.hash, &SearchParams::limit(1))
            .await
            .unwrap();
        assert_eq!(page.items, vec![a.clone()]);
        let next = backend
            .search_by_reference(
                None,
                "target",
                &target.hash,
                &SearchParams::limit(5).after(page.end),
            )
            .await
            .unwrap();
        assert_eq!(next.items, vec![b]);

        let ops = backend
            .search_by_class("t/Op", &SearchParams::default())
            .await
            .unwrap();
        assert_eq!(ops.items.len(), 2);
    }

    #[tokio::test]
    async fn test_terminal_ops_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashspace.sqlite");
        let target = Hashing::for_str("target");
        let (a, b) = (Hashing::for_str("a"), Hashing::for_str("b"));
        {
            let backend = SqliteBackend::open(&path).await.unwrap();
            assert!(backend.record_terminal_op(&target, &a, &[]).await.unwrap());
            assert!(backend.record_terminal_op(&target, &b, &[]).await.unwrap());
            assert!(!backend.record_terminal_op(&target, &b, &[]).await.unwrap());
        }
        let backend = SqliteBackend::open(&path).await.unwrap();
        let ops: BTreeSet<Hash> = [a, b].into();
        assert_eq!(backend.load_terminal_ops(&target).await.unwrap(), ops);
    }
}
