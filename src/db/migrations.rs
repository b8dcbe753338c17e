use anyhow::{Context, Result};
use log::warn;
use rusqlite::{Connection, Transaction};

pub const CURRENT_SCHEMA_VERSION: i32 = 3;

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    migrate_to(conn, CURRENT_SCHEMA_VERSION)
}

/// Bring the schema to `target`. A known single-version step is applied
/// additively; any larger or undefined jump drops and recreates the usage
/// table, losing its contents by design.
pub(crate) fn migrate_to(conn: &mut Connection, target: i32) -> Result<()> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version == target {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    if version == 0 {
        tx.execute_batch(include_str!("schemas/schema_current.sql"))
            .context("failed to create usage table")?;
    } else if target - version == 1 && version == 2 {
        tx.execute_batch(include_str!("schemas/migrate_v2_v3.sql"))
            .context("failed to apply v2 -> v3 migration")?;
    } else {
        warn!("unsupported schema jump {version} -> {target}, recreating usage table");
        recreate(&tx)?;
    }

    tx.pragma_update(None, "user_version", target)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

fn recreate(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch("DROP TABLE IF EXISTS application_usage;")
        .context("failed to drop usage table")?;
    tx.execute_batch(include_str!("schemas/schema_current.sql"))
        .context("failed to recreate usage table")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn open_v2(conn: &Connection) {
        conn.execute_batch(
            "CREATE TABLE application_usage (
                package_name TEXT,
                class_name TEXT,
                usage INTEGER NOT NULL DEFAULT 0,
                disabled INTEGER NOT NULL DEFAULT 0
            );",
        )
        .unwrap();
        conn.pragma_update(None, "user_version", 2).unwrap();
    }

    fn row_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM application_usage", [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn fresh_database_is_created_at_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
        assert_eq!(row_count(&conn), 0);
    }

    #[test]
    fn single_step_upgrade_keeps_rows_and_adds_sticky() {
        let mut conn = Connection::open_in_memory().unwrap();
        open_v2(&conn);
        conn.execute(
            "INSERT INTO application_usage (package_name, class_name, usage, disabled)
             VALUES (?1, ?2, 5, 0)",
            params!["pkg.a", "Main"],
        )
        .unwrap();

        migrate_to(&mut conn, 3).unwrap();

        assert_eq!(row_count(&conn), 1);
        let sticky: bool = conn
            .query_row(
                "SELECT sticky FROM application_usage WHERE package_name = 'pkg.a'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(!sticky);
    }

    #[test]
    fn larger_jump_drops_and_recreates() {
        let mut conn = Connection::open_in_memory().unwrap();
        open_v2(&conn);
        conn.execute(
            "INSERT INTO application_usage (package_name, class_name, usage, disabled)
             VALUES (?1, ?2, 5, 0)",
            params!["pkg.a", "Main"],
        )
        .unwrap();

        migrate_to(&mut conn, 4).unwrap();

        // Data loss on a major migration is accepted behavior.
        assert_eq!(row_count(&conn), 0);
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 4);
    }

    #[test]
    fn migration_is_a_no_op_at_target_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
        assert_eq!(row_count(&conn), 0);
    }
}
