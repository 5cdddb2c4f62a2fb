//! Database connection utilities.

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Pragmas applied to every SQLite connection.
///
/// WAL keeps readers (`ls`, `status`) from blocking a running sync, and the
/// busy timeout lets a worker wait out a concurrent writer instead of failing.
const SQLITE_PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode=WAL",
    "PRAGMA busy_timeout=5000",
    "PRAGMA synchronous=NORMAL",
];

fn is_sqlite(database_url: &str) -> bool {
    database_url.starts_with("sqlite:")
}

async fn configure_sqlite(db: &DatabaseConnection) -> Result<(), DbErr> {
    use sea_orm::{ConnectionTrait, Statement};

    for pragma in SQLITE_PRAGMAS {
        db.execute(Statement::from_string(
            db.get_database_backend(),
            (*pragma).to_string(),
        ))
        .await?;
    }

    Ok(())
}

async fn open(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options.sqlx_logging(false);
    // An in-memory SQLite database exists per connection, so the pool must
    // never open a second one.
    if database_url.contains(":memory:") {
        options.max_connections(1).min_connections(1);
    }

    let db = Database::connect(options).await?;
    if is_sqlite(database_url) {
        configure_sqlite(&db).await?;
    }
    Ok(db)
}

/// Establish a connection to the metadata store.
///
/// # Arguments
/// * `database_url` - e.g. `sqlite://binmirror.db?mode=rwc` or `postgres:///binmirror`
///
/// # Errors
/// Returns `DbErr` if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    open(database_url).await
}

/// Establish a connection and run all pending migrations.
///
/// # Example
/// ```ignore
/// let db = binmirror::connect_and_migrate("sqlite::memory:").await?;
/// ```
#[cfg(feature = "migrate")]
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    use sea_orm_migration::MigratorTrait;

    let db = open(database_url).await?;
    crate::migration::Migrator::up(&db, None).await?;
    Ok(db)
}
