//! Usage store: per-component launch counts plus the dock's sticky and
//! disabled flags.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::Database;
use crate::model::{ComponentKey, UsageRecord};

/// Counter ceiling; reaching it resets the record to zero instead of wrapping.
pub const MAX_USAGE: i64 = i64::MAX;

const SELECT_ONE: &str = "package_name = ?1 AND class_name = ?2";

pub struct UsageRepository<'a> {
    conn: &'a Connection,
}

impl<'a> UsageRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Remove every row for a key.
    pub fn delete(&self, key: &ComponentKey) -> Result<()> {
        self.conn
            .execute(
                &format!("DELETE FROM application_usage WHERE {SELECT_ONE}"),
                params![key.package, key.class],
            )
            .with_context(|| format!("failed to delete usage rows for {key}"))?;
        Ok(())
    }

    /// Increment the launch counter, inserting a fresh record on first use.
    /// At the ceiling the record resets to zero within the same transaction.
    pub fn add_usage(&self, key: &ComponentKey) -> Result<()> {
        if !key.is_valid() {
            return self.delete(key);
        }
        self.normalize_duplicates(key)?;

        match self.fetch_usage(key)? {
            Some(usage) if usage < MAX_USAGE => {
                self.conn
                    .execute(
                        &format!("UPDATE application_usage SET usage = ?3 WHERE {SELECT_ONE}"),
                        params![key.package, key.class, usage + 1],
                    )
                    .with_context(|| format!("failed to increment usage for {key}"))?;
            }
            Some(_) => self.write_usage(key, 0)?,
            None => self.insert(key, 1, false, false)?,
        }

        Ok(())
    }

    /// Set the launch counter to zero, leaving both flags untouched.
    pub fn reset_usage(&self, key: &ComponentKey) -> Result<()> {
        if !key.is_valid() {
            return self.delete(key);
        }
        self.normalize_duplicates(key)?;

        if self.fetch_usage(key)?.is_some() {
            self.write_usage(key, 0)
        } else {
            self.insert(key, 0, false, false)
        }
    }

    pub fn toggle_sticky(&self, key: &ComponentKey) -> Result<()> {
        self.toggle_flag(key, "sticky")
    }

    pub fn toggle_disabled(&self, key: &ComponentKey) -> Result<()> {
        self.toggle_flag(key, "disabled")
    }

    /// An invalid key is reported sticky = false after deleting its rows.
    pub fn is_sticky(&self, key: &ComponentKey) -> Result<bool> {
        self.probe_flag(key, "sticky", false)
    }

    /// An invalid key is reported disabled = true after deleting its rows; a
    /// component we cannot identify is never dock-eligible.
    pub fn is_disabled(&self, key: &ComponentKey) -> Result<bool> {
        self.probe_flag(key, "disabled", true)
    }

    /// Dock candidates: not disabled, used at least once or pinned. Ordered
    /// by sticky, usage, package and class, all descending; limited in SQL.
    pub fn most_used(&self, limit: usize) -> Result<Vec<UsageRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT package_name, class_name, usage, disabled, sticky
                 FROM application_usage
                 WHERE disabled = 0 AND (usage > 0 OR sticky > 0)
                 ORDER BY sticky DESC, usage DESC, package_name DESC, class_name DESC
                 LIMIT ?1",
            )
            .context("failed to prepare most-used query")?;

        let records = stmt
            .query_map(params![limit as i64], |row| {
                Ok(UsageRecord {
                    key: ComponentKey::new(
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                    ),
                    usage: row.get(2)?,
                    disabled: row.get(3)?,
                    sticky: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to read most-used rows")?;

        Ok(records)
    }

    fn toggle_flag(&self, key: &ComponentKey, column: &str) -> Result<()> {
        if !key.is_valid() {
            return self.delete(key);
        }
        self.normalize_duplicates(key)?;

        let current: Option<bool> = self
            .conn
            .query_row(
                &format!("SELECT {column} FROM application_usage WHERE {SELECT_ONE}"),
                params![key.package, key.class],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read {column} for {key}"))?;

        match current {
            Some(value) => {
                self.conn
                    .execute(
                        &format!(
                            "UPDATE application_usage SET {column} = ?3 WHERE {SELECT_ONE}"
                        ),
                        params![key.package, key.class, !value],
                    )
                    .with_context(|| format!("failed to toggle {column} for {key}"))?;
            }
            None => {
                self.insert(key, 0, column == "disabled", column == "sticky")?;
            }
        }

        Ok(())
    }

    fn probe_flag(&self, key: &ComponentKey, column: &str, invalid_default: bool) -> Result<bool> {
        if !key.is_valid() {
            self.delete(key)?;
            return Ok(invalid_default);
        }
        self.normalize_duplicates(key)?;

        let value: Option<bool> = self
            .conn
            .query_row(
                &format!("SELECT {column} FROM application_usage WHERE {SELECT_ONE}"),
                params![key.package, key.class],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to probe {column} for {key}"))?;

        Ok(value.unwrap_or(false))
    }

    /// More than one row for the same key is corruption; delete them all
    /// rather than guessing which is canonical.
    fn normalize_duplicates(&self, key: &ComponentKey) -> Result<()> {
        let count: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM application_usage WHERE {SELECT_ONE}"),
                params![key.package, key.class],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to count rows for {key}"))?;

        if count > 1 {
            log::warn!("found {count} usage rows for {key}, deleting all");
            self.delete(key)?;
        }

        Ok(())
    }

    fn fetch_usage(&self, key: &ComponentKey) -> Result<Option<i64>> {
        self.conn
            .query_row(
                &format!("SELECT usage FROM application_usage WHERE {SELECT_ONE}"),
                params![key.package, key.class],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read usage for {key}"))
    }

    fn write_usage(&self, key: &ComponentKey, usage: i64) -> Result<()> {
        self.conn
            .execute(
                &format!("UPDATE application_usage SET usage = ?3 WHERE {SELECT_ONE}"),
                params![key.package, key.class, usage],
            )
            .with_context(|| format!("failed to write usage for {key}"))?;
        Ok(())
    }

    fn insert(&self, key: &ComponentKey, usage: i64, disabled: bool, sticky: bool) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO application_usage (package_name, class_name, usage, disabled, sticky)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![key.package, key.class, usage, disabled, sticky],
            )
            .with_context(|| format!("failed to insert usage row for {key}"))?;
        Ok(())
    }
}

// Async wrappers running each operation inside one transaction on the
// database worker thread.
impl Database {
    pub async fn add_usage(&self, key: ComponentKey) -> Result<()> {
        self.in_transaction(move |repo| repo.add_usage(&key)).await
    }

    pub async fn reset_usage(&self, key: ComponentKey) -> Result<()> {
        self.in_transaction(move |repo| repo.reset_usage(&key)).await
    }

    pub async fn toggle_sticky(&self, key: ComponentKey) -> Result<()> {
        self.in_transaction(move |repo| repo.toggle_sticky(&key))
            .await
    }

    pub async fn toggle_disabled(&self, key: ComponentKey) -> Result<()> {
        self.in_transaction(move |repo| repo.toggle_disabled(&key))
            .await
    }

    pub async fn is_sticky(&self, key: ComponentKey) -> Result<bool> {
        self.in_transaction(move |repo| repo.is_sticky(&key)).await
    }

    pub async fn is_disabled(&self, key: ComponentKey) -> Result<bool> {
        self.in_transaction(move |repo| repo.is_disabled(&key))
            .await
    }

    pub async fn delete_usage(&self, key: ComponentKey) -> Result<()> {
        self.in_transaction(move |repo| repo.delete(&key)).await
    }

    pub async fn most_used(&self, limit: usize) -> Result<Vec<UsageRecord>> {
        self.execute(move |conn| UsageRepository::new(conn).most_used(limit))
            .await
    }

    async fn in_transaction<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&UsageRepository<'_>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open usage transaction")?;
            let result = task(&UsageRepository::new(&tx))?;
            tx.commit().context("failed to commit usage transaction")?;
            Ok(result)
        })
        .await
    }
}
