//! Per-extension schema migrations.
//!
//! Each extension ships zero or more [`ExtensionMigration`]s tagged with the
//! extension version that introduced them. [`MigrationRunner`] orders them
//! by semver and runs the window the loader asks for. The index helpers
//! keep `up()` safe to re-run.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, Statement};
use sea_orm_migration::prelude::*;
use semver::Version;

use crate::error::ExtensionError;

#[async_trait]
pub trait ExtensionMigration: Send + Sync {
    /// Semver of the extension release this migration belongs to.
    fn version(&self) -> &str;

    /// Must tolerate being re-run against an already migrated store.
    async fn up(&self) -> Result<(), ExtensionError>;

    /// Must tolerate already-absent objects.
    async fn down(&self) -> Result<(), ExtensionError>;
}

/// A descriptor's migrations, sorted ascending by version.
pub struct MigrationRunner {
    namespace: String,
    migrations: Vec<(Version, Arc<dyn ExtensionMigration>)>,
}

impl MigrationRunner {
    /// Fails with `InvalidVersion` if any migration version is not semver.
    pub fn new(
        namespace: impl Into<String>,
        migrations: &[Arc<dyn ExtensionMigration>],
    ) -> Result<Self, ExtensionError> {
        let mut sorted = migrations
            .iter()
            .map(|m| Ok((Version::parse(m.version())?, Arc::clone(m))))
            .collect::<Result<Vec<_>, ExtensionError>>()?;
        // Stable: migrations sharing a version keep declaration order.
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(Self {
            namespace: namespace.into(),
            migrations: sorted,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Versions in execution order.
    pub fn versions(&self) -> Vec<&Version> {
        self.migrations.iter().map(|(v, _)| v).collect()
    }

    /// Run `up()` for every migration with `after < version <= up_to`
    /// (`after = None` means from the beginning). Stops at the first error.
    pub async fn run_up(
        &self,
        after: Option<&Version>,
        up_to: &Version,
    ) -> Result<usize, ExtensionError> {
        let mut applied = 0;
        for (version, migration) in self.window(after, up_to) {
            tracing::debug!(
                namespace = %self.namespace,
                version = %version,
                "running extension migration"
            );
            migration
                .up()
                .await
                .map_err(|e| ExtensionError::Migration {
                    version: version.to_string(),
                    source: Box::new(e),
                })?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Run `down()` in descending order for `after < version <= from`.
    pub async fn run_down(
        &self,
        after: Option<&Version>,
        from: &Version,
    ) -> Result<usize, ExtensionError> {
        let mut reverted = 0;
        for (version, migration) in self.window(after, from).rev() {
            tracing::debug!(
                namespace = %self.namespace,
                version = %version,
                "reverting extension migration"
            );
            migration
                .down()
                .await
                .map_err(|e| ExtensionError::Migration {
                    version: version.to_string(),
                    source: Box::new(e),
                })?;
            reverted += 1;
        }
        Ok(reverted)
    }

    fn window<'a>(
        &'a self,
        after: Option<&'a Version>,
        up_to: &'a Version,
    ) -> impl DoubleEndedIterator<Item = &'a (Version, Arc<dyn ExtensionMigration>)> + 'a {
        self.migrations
            .iter()
            .filter(move |(v, _)| after.map_or(true, |a| v > a) && v <= up_to)
    }
}

// ─── Index helpers ──────────────────────────────────────────────────────

/// Desired shape of a named index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
    pub unique: bool,
}

impl IndexSpec {
    /// Compare against the `CREATE INDEX` text reported by the database.
    ///
    /// Handles both the Postgres `pg_indexes.indexdef` form
    /// (`... ON public.t USING btree (a, b)`) and SQLite's stored SQL
    /// (`... ON "t" ("a", "b")`).
    pub fn matches_definition(&self, definition: &str) -> bool {
        let normalized = definition
            .replace(['"', '`'], "")
            .to_ascii_lowercase();

        let unique = normalized.contains("unique index");
        if unique != self.unique {
            return false;
        }

        let Some((_, after_on)) = normalized.split_once(" on ") else {
            return false;
        };
        let table = after_on
            .split_whitespace()
            .find(|token| *token != "only")
            .unwrap_or_default();
        let table = table.rsplit('.').next().unwrap_or(table);
        let table = table.split('(').next().unwrap_or(table);
        if table != self.table {
            return false;
        }

        let Some(open) = normalized.rfind('(') else {
            return false;
        };
        let close = normalized[open..]
            .find(')')
            .map(|i| open + i)
            .unwrap_or(normalized.len());
        let columns: Vec<&str> = normalized[open + 1..close]
            .split(',')
            .filter_map(|c| c.split_whitespace().next())
            .collect();

        columns.len() == self.columns.len()
            && columns.iter().zip(self.columns).all(|(a, b)| a == b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Created,
    Unchanged,
    Recreated,
    SkippedMissingTable,
}

/// The stored definition of index `name`, if one exists.
pub async fn existing_index_definition(
    manager: &SchemaManager<'_>,
    name: &str,
) -> Result<Option<String>, ExtensionError> {
    let backend = manager.get_database_backend();
    let statement = match backend {
        DatabaseBackend::Postgres => Statement::from_sql_and_values(
            backend,
            "SELECT indexdef AS def FROM pg_indexes WHERE indexname = $1",
            [name.into()],
        ),
        DatabaseBackend::Sqlite => Statement::from_sql_and_values(
            backend,
            "SELECT sql AS def FROM sqlite_master WHERE type = 'index' AND name = ?",
            [name.into()],
        ),
        DatabaseBackend::MySql => {
            return Err(ExtensionError::Store(DbErr::Custom(
                "index introspection is not supported on MySQL".into(),
            )))
        }
    };

    let row = manager.get_connection().query_one(statement).await?;
    match row {
        // Auto-created SQLite indexes have a NULL sql column.
        Some(row) => Ok(Some(
            row.try_get::<Option<String>>("", "def")?.unwrap_or_default(),
        )),
        None => Ok(None),
    }
}

/// Bring index `wanted` into existence with exactly the requested shape.
pub async fn ensure_index(
    manager: &SchemaManager<'_>,
    wanted: &IndexSpec,
) -> Result<IndexOutcome, ExtensionError> {
    if !manager.has_table(wanted.table).await? {
        tracing::info!(
            index = wanted.name,
            table = wanted.table,
            "table does not exist yet, skipping index"
        );
        return Ok(IndexOutcome::SkippedMissingTable);
    }

    let outcome = match existing_index_definition(manager, wanted.name).await? {
        Some(definition) if wanted.matches_definition(&definition) => {
            tracing::debug!(index = wanted.name, "index already present");
            return Ok(IndexOutcome::Unchanged);
        }
        Some(definition) => {
            tracing::info!(
                index = wanted.name,
                existing = %definition,
                "index definition conflicts, recreating"
            );
            manager
                .drop_index(
                    Index::drop()
                        .name(wanted.name)
                        .table(Alias::new(wanted.table))
                        .to_owned(),
                )
                .await?;
            IndexOutcome::Recreated
        }
        None => IndexOutcome::Created,
    };

    let mut create = Index::create();
    create.name(wanted.name).table(Alias::new(wanted.table));
    for column in wanted.columns {
        create.col(Alias::new(*column));
    }
    if wanted.unique {
        create.unique();
    }
    manager.create_index(create.to_owned()).await?;

    tracing::info!(index = wanted.name, table = wanted.table, "index created");
    Ok(outcome)
}

/// Drop index `wanted` if it exists. Returns whether anything was dropped.
pub async fn drop_index(
    manager: &SchemaManager<'_>,
    wanted: &IndexSpec,
) -> Result<bool, ExtensionError> {
    if existing_index_definition(manager, wanted.name).await?.is_none() {
        tracing::debug!(index = wanted.name, "index already absent");
        return Ok(false);
    }

    manager
        .drop_index(
            Index::drop()
                .name(wanted.name)
                .table(Alias::new(wanted.table))
                .to_owned(),
        )
        .await?;
    tracing::info!(index = wanted.name, "index dropped");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sqlite_db;
    use tokio::sync::Mutex;

    const SETTINGS_INDEX: IndexSpec = IndexSpec {
        name: "uq_extension_settings_namespace_key",
        table: "extension_settings",
        columns: &["namespace", "key"],
        unique: true,
    };

    struct Recorded {
        version: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl ExtensionMigration for Recorded {
        fn version(&self) -> &str {
            self.version
        }

        async fn up(&self) -> Result<(), ExtensionError> {
            if self.fail {
                return Err(ExtensionError::Validation("broken".into()));
            }
            self.log.lock().await.push(format!("up {}", self.version));
            Ok(())
        }

        async fn down(&self) -> Result<(), ExtensionError> {
            self.log.lock().await.push(format!("down {}", self.version));
            Ok(())
        }
    }

    fn recorded(
        versions: &[&'static str],
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Vec<Arc<dyn ExtensionMigration>> {
        versions
            .iter()
            .map(|v| {
                Arc::new(Recorded {
                    version: v,
                    log: Arc::clone(log),
                    fail: false,
                }) as Arc<dyn ExtensionMigration>
            })
            .collect()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_runner_orders_by_semver_not_text() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runner =
            MigrationRunner::new("blog", &recorded(&["1.10.0", "1.2.0", "1.9.1"], &log)).unwrap();

        let applied = runner.run_up(None, &v("2.0.0")).await.unwrap();
        assert_eq!(applied, 3);
        assert_eq!(
            *log.lock().await,
            vec!["up 1.2.0", "up 1.9.1", "up 1.10.0"]
        );
    }

    #[tokio::test]
    async fn test_runner_window() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runner =
            MigrationRunner::new("blog", &recorded(&["1.0.0", "1.1.0", "1.2.0", "2.0.0"], &log))
                .unwrap();

        let applied = runner
            .run_up(Some(&v("1.0.0")), &v("1.2.0"))
            .await
            .unwrap();
        assert_eq!(applied, 2);
        assert_eq!(*log.lock().await, vec!["up 1.1.0", "up 1.2.0"]);
    }

    #[tokio::test]
    async fn test_runner_down_descending() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let runner = MigrationRunner::new("blog", &recorded(&["1.0.0", "1.1.0"], &log)).unwrap();

        runner.run_down(None, &v("1.1.0")).await.unwrap();
        assert_eq!(*log.lock().await, vec!["down 1.1.0", "down 1.0.0"]);
    }

    #[test]
    fn test_runner_rejects_invalid_version() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let result = MigrationRunner::new("blog", &recorded(&["one"], &log));
        assert!(matches!(result, Err(ExtensionError::InvalidVersion(_))));
    }

    #[tokio::test]
    async fn test_runner_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut migrations = recorded(&["1.0.0"], &log);
        migrations.push(Arc::new(Recorded {
            version: "1.1.0",
            log: Arc::clone(&log),
            fail: true,
        }));
        migrations.extend(recorded(&["1.2.0"], &log));
        let runner = MigrationRunner::new("blog", &migrations).unwrap();

        let err = runner.run_up(None, &v("1.2.0")).await.unwrap_err();
        assert_eq!(err.to_string(), "migration 1.1.0 failed: validation error: broken");
        assert_eq!(*log.lock().await, vec!["up 1.0.0"]);
    }

    #[test]
    fn test_matches_postgres_definition() {
        let def = "CREATE UNIQUE INDEX uq_extension_settings_namespace_key \
                   ON public.extension_settings USING btree (namespace, key)";
        assert!(SETTINGS_INDEX.matches_definition(def));
    }

    #[test]
    fn test_matches_sqlite_definition() {
        let def = r#"CREATE UNIQUE INDEX "uq_extension_settings_namespace_key" ON "extension_settings" ("namespace", "key")"#;
        assert!(SETTINGS_INDEX.matches_definition(def));
    }

    #[test]
    fn test_mismatched_definitions() {
        let not_unique = "CREATE INDEX uq_extension_settings_namespace_key \
                          ON public.extension_settings USING btree (namespace, key)";
        let wrong_columns = "CREATE UNIQUE INDEX uq_extension_settings_namespace_key \
                             ON public.extension_settings USING btree (namespace)";
        let wrong_table = "CREATE UNIQUE INDEX uq_extension_settings_namespace_key \
                           ON public.plugin_settings USING btree (namespace, key)";
        assert!(!SETTINGS_INDEX.matches_definition(not_unique));
        assert!(!SETTINGS_INDEX.matches_definition(wrong_columns));
        assert!(!SETTINGS_INDEX.matches_definition(wrong_table));
        assert!(!SETTINGS_INDEX.matches_definition(""));
    }

    #[tokio::test]
    async fn test_ensure_index_twice() {
        let db = sqlite_db().await;
        let manager = SchemaManager::new(&db);

        assert_eq!(ensure_index(&manager, &SETTINGS_INDEX).await.unwrap(), IndexOutcome::Created);
        assert_eq!(ensure_index(&manager, &SETTINGS_INDEX).await.unwrap(), IndexOutcome::Unchanged);
        assert!(existing_index_definition(&manager, SETTINGS_INDEX.name)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_ensure_index_recreates_conflicting() {
        let db = sqlite_db().await;
        let manager = SchemaManager::new(&db);
        let conflicting = IndexSpec {
            columns: &["key"],
            unique: false,
            ..SETTINGS_INDEX
        };
        ensure_index(&manager, &conflicting).await.unwrap();

        assert_eq!(
            ensure_index(&manager, &SETTINGS_INDEX).await.unwrap(),
            IndexOutcome::Recreated
        );
        let def = existing_index_definition(&manager, SETTINGS_INDEX.name)
            .await
            .unwrap()
            .unwrap();
        assert!(SETTINGS_INDEX.matches_definition(&def));
    }

    #[tokio::test]
    async fn test_ensure_index_skips_missing_table() {
        let db = sqlite_db().await;
        let manager = SchemaManager::new(&db);
        let nowhere = IndexSpec {
            name: "idx_nowhere",
            table: "nowhere",
            columns: &["id"],
            unique: false,
        };
        assert_eq!(
            ensure_index(&manager, &nowhere).await.unwrap(),
            IndexOutcome::SkippedMissingTable
        );
    }

    #[tokio::test]
    async fn test_drop_index_tolerates_absence() {
        let db = sqlite_db().await;
        let manager = SchemaManager::new(&db);

        assert!(!drop_index(&manager, &SETTINGS_INDEX).await.unwrap());
        ensure_index(&manager, &SETTINGS_INDEX).await.unwrap();
        assert!(drop_index(&manager, &SETTINGS_INDEX).await.unwrap());
        assert!(!drop_index(&manager, &SETTINGS_INDEX).await.unwrap());
    }
}
