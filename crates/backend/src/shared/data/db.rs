use once_cell::sync::OnceCell;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement};

static DB_CONN: OnceCell<DatabaseConnection> = OnceCell::new();

pub async fn initialize_database(db_path: Option<&str>) -> anyhow::Result<()> {
    let db_file = db_path.unwrap_or("target/db/app.db");
    if let Some(parent) = std::path::Path::new(db_file).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let absolute_path = if std::path::Path::new(db_file).is_absolute() {
        std::path::PathBuf::from(db_file)
    } else {
        std::env::current_dir()?.join(db_file)
    };
    // Normalize path separators and ensure proper URL form on Windows
    let normalized = absolute_path.to_string_lossy().replace('\\', "/");
    let needs_leading_slash = !normalized.starts_with('/') && normalized.contains(':');
    let prefix = if needs_leading_slash { "/" } else { "" };
    let db_url = format!("sqlite://{}{}?mode=rwc", prefix, normalized);
    let conn = Database::connect(&db_url).await?;

    // a001_sync_queue_item
    let check_queue_table = r#"
        SELECT name FROM sqlite_master WHERE type='table' AND name='a001_sync_queue_item';
    "#;
    let queue_table_exists = conn
        .query_all(Statement::from_string(
            DatabaseBackend::Sqlite,
            check_queue_table.to_string(),
        ))
        .await?;

    if queue_table_exists.is_empty() {
        tracing::info!("Creating a001_sync_queue_item table");
        let create_queue_table_sql = r#"
            CREATE TABLE a001_sync_queue_item (
                id TEXT PRIMARY KEY NOT NULL,
                code TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL,
                comment TEXT,
                inventory_item_id TEXT NOT NULL,
                asin TEXT NOT NULL,
                desired_price REAL NOT NULL,
                desired_quantity INTEGER NOT NULL DEFAULT 1,
                added_at TEXT NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                is_posted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT,
                updated_at TEXT,
                version INTEGER NOT NULL DEFAULT 0
            );
        "#;
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            create_queue_table_sql.to_string(),
        ))
        .await?;
    }

    // a002_sync_feed
    let check_feed_table = r#"
        SELECT name FROM sqlite_master WHERE type='table' AND name='a002_sync_feed';
    "#;
    let feed_table_exists = conn
        .query_all(Statement::from_string(
            DatabaseBackend::Sqlite,
            check_feed_table.to_string(),
        ))
        .await?;

    if feed_table_exists.is_empty() {
        tracing::info!("Creating a002_sync_feed table");
        let create_feed_table_sql = r#"
            CREATE TABLE a002_sync_feed (
                id TEXT PRIMARY KEY NOT NULL,
                code TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL,
                comment TEXT,
                mode TEXT NOT NULL DEFAULT 'two_phase',
                status TEXT NOT NULL,
                is_dry_run INTEGER NOT NULL DEFAULT 0,
                entries_json TEXT NOT NULL DEFAULT '[]',
                line_results_json TEXT NOT NULL DEFAULT '[]',
                price_feed_id TEXT,
                quantity_feed_id TEXT,
                poll_count INTEGER NOT NULL DEFAULT 0,
                transient_error_count INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                warning_count INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                dry_run_price_overrides_json TEXT NOT NULL DEFAULT '{}',
                dry_run_line_errors_json TEXT NOT NULL DEFAULT '{}',
                next_poll_at TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                is_posted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT,
                updated_at TEXT,
                version INTEGER NOT NULL DEFAULT 0
            );
        "#;
        conn.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            create_feed_table_sql.to_string(),
        ))
        .await?;
    } else {
        // Ensure transient_error_count column exists; add if missing
        let pragma = format!("PRAGMA table_info('{}');", "a002_sync_feed");
        let cols = conn
            .query_all(Statement::from_string(DatabaseBackend::Sqlite, pragma))
            .await?;
        let mut has_transient = false;
        for row in cols {
            let name: String = row.try_get("", "name").unwrap_or_default();
            if name == "transient_error_count" {
                has_transient = true;
            }
        }
        if !has_transient {
            tracing::info!("Adding transient_error_count column to a002_sync_feed");
            conn.execute(Statement::from_string(
                DatabaseBackend::Sqlite,
                "ALTER TABLE a002_sync_feed ADD COLUMN transient_error_count INTEGER NOT NULL DEFAULT 0;"
                    .to_string(),
            ))
            .await?;
        }
    }

    DB_CONN
        .set(conn)
        .map_err(|_| anyhow::anyhow!("Failed to set DB_CONN"))?;
    Ok(())
}

pub fn get_connection() -> &'static DatabaseConnection {
    DB_CONN
        .get()
        .expect("Database connection has not been initialized")
}
