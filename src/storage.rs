use crate::api::models::{Account, Batch};
use directories::ProjectDirs;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no data directory available")]
    NoDataDir,
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache database: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("cache encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub fn db_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "callops", "callops-console")?;
    Some(proj.data_dir().join("cache.sqlite"))
}

// Last-fetched account and batch lists, so views can draw before the
// network refresh lands.
pub struct LocalCache {
    conn: Connection,
}

impl LocalCache {
    pub fn open_default() -> Result<Self> {
        let path = db_path().ok_or(StorageError::NoDataDir)?;
        Self::open(&path)
    }

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let cache = Self {
            conn: Connection::open(path)?,
        };
        cache.init()?;
        Ok(cache)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                raw_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS batches (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                name TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                raw_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Replaces the cached account list with `accounts`, the full list the
    /// server just returned.
    pub fn replace_accounts(&mut self, accounts: &[Account]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM accounts", [])?;
        for a in accounts {
            tx.execute(
                r#"
                INSERT INTO accounts (id, name, updated_at, raw_json)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    name=excluded.name,
                    updated_at=excluded.updated_at,
                    raw_json=excluded.raw_json
                "#,
                params![a.id, a.name, now, serde_json::to_string(a)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Same as [`LocalCache::replace_accounts`], for the batch list.
    pub fn replace_batches(&mut self, batches: &[Batch]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM batches", [])?;
        for b in batches {
            tx.execute(
                r#"
                INSERT INTO batches (id, account_id, name, updated_at, raw_json)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    account_id=excluded.account_id,
                    name=excluded.name,
                    updated_at=excluded.updated_at,
                    raw_json=excluded.raw_json
                "#,
                params![b.id, b.account_id, b.name, now, serde_json::to_string(b)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn accounts(&self, limit: Option<usize>) -> Result<Vec<Account>> {
        self.load_rows(
            "SELECT raw_json FROM accounts ORDER BY updated_at DESC, name ASC LIMIT ?1",
            params![limit.unwrap_or(500) as i64],
        )
    }

    /// Batches of one account, or all of them.
    pub fn batches(&self, account_id: Option<&str>, limit: Option<usize>) -> Result<Vec<Batch>> {
        let lim = limit.unwrap_or(500) as i64;
        match account_id {
            Some(id) => self.load_rows(
                "SELECT raw_json FROM batches WHERE account_id = ?1 ORDER BY updated_at DESC, name ASC LIMIT ?2",
                params![id, lim],
            ),
            None => self.load_rows(
                "SELECT raw_json FROM batches ORDER BY updated_at DESC, name ASC LIMIT ?1",
                params![lim],
            ),
        }
    }

    pub fn remove_batch(&self, id: &str) -> Result<()> {
        self.conn.execute("DELETE FROM batches WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Drops everything, used on sign-out.
    pub fn clear(&self) -> Result<()> {
        self.conn.execute_batch("DELETE FROM accounts; DELETE FROM batches;")?;
        Ok(())
    }

    fn load_rows<T: DeserializeOwned>(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for raw in rows {
            match serde_json::from_str(&raw?) {
                Ok(item) => out.push(item),
                Err(e) => log::warn!("skipping unreadable cache row: {e}"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{AccountStatus, Balance, BatchStats, BatchStatus, PlanType};
    use std::collections::BTreeMap;

    fn account(id: &str, name: &str) -> Account {
        Account {
            id: id.into(),
            name: name.into(),
            status: AccountStatus::Active,
            balance: Balance {
                plan: PlanType::Credits,
                total: 100.0,
                spent: 40.0,
                remaining: 60.0,
            },
            features: BTreeMap::new(),
            created_at: None,
        }
    }

    fn batch(id: &str, account_id: &str) -> Batch {
        Batch {
            id: id.into(),
            account_id: account_id.into(),
            name: format!("batch {id}"),
            description: None,
            status: BatchStatus::Unknown("WARMING".into()),
            stats: BatchStats { total_contacts: 10, ..Default::default() },
            call_settings: serde_json::Value::Null,
            created_at: None,
        }
    }

    #[test]
    fn accounts_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("cache.sqlite");
        {
            let mut cache = LocalCache::open(&path).unwrap();
            cache.replace_accounts(&[account("a1", "Acme"), account("a2", "Beta")]).unwrap();
        }
        let cache = LocalCache::open(&path).unwrap();
        let mut names: Vec<String> = cache.accounts(None).unwrap().into_iter().map(|a| a.name).collect();
        names.sort();
        assert_eq!(names, vec!["Acme", "Beta"]);
    }

    #[test]
    fn newer_list_drops_records_the_server_no_longer_has() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = LocalCache::open(&dir.path().join("cache.sqlite")).unwrap();
        cache.replace_batches(&[batch("b1", "a1"), batch("b2", "a1")]).unwrap();
        cache.replace_batches(&[batch("b1", "a1")]).unwrap();
        let ids: Vec<String> = cache.batches(None, None).unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["b1"]);

        cache.replace_accounts(&[account("a1", "Acme"), account("a2", "Beta")]).unwrap();
        cache.replace_accounts(&[account("a1", "Acme SpA")]).unwrap();
        let names: Vec<String> = cache.accounts(None).unwrap().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["Acme SpA"]);
    }

    #[test]
    fn deleted_batch_leaves_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = LocalCache::open(&dir.path().join("cache.sqlite")).unwrap();
        cache.replace_batches(&[batch("b1", "a1"), batch("b2", "a1")]).unwrap();
        cache.remove_batch("b2").unwrap();
        cache.remove_batch("missing").unwrap();
        let ids: Vec<String> = cache.batches(None, None).unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["b1"]);
    }

    #[test]
    fn batches_filter_by_account() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = LocalCache::open(&dir.path().join("cache.sqlite")).unwrap();
        cache.replace_batches(&[batch("b1", "a1"), batch("b2", "a2"), batch("b3", "a1")]).unwrap();

        assert_eq!(cache.batches(None, None).unwrap().len(), 3);
        let only_a1 = cache.batches(Some("a1"), None).unwrap();
        assert_eq!(only_a1.len(), 2);
        assert!(only_a1.iter().all(|b| b.account_id == "a1"));
        assert_eq!(only_a1[0].status, BatchStatus::Unknown("WARMING".into()));

        cache.clear().unwrap();
        assert!(cache.batches(None, None).unwrap().is_empty());
    }
}
