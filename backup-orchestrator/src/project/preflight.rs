//! Project preflight: turns one project file into a resolved
//! [`ProjectContext`] or reports the step that rejected it.
//!
//! Steps run strictly in order and the first failure stops the project.
//! Other projects are unaffected.

use crate::cadence::Cadence;
use crate::config::PathsConfig;
use crate::naming::{sanitize, sanitize_project_name};
use crate::project::file::ProjectFile;
use crate::project::model::{CloudTarget, Credentials, DbEngine, ProjectContext, StorageMode};
use crate::retention::{parse_ttl, RetentionPolicy, Ttl};
use crate::tools::{Dumper, ObjectStore};
use crate::utils::errors::{BackupError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use PreflightStep as Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightStep {
    Load,
    Identity,
    Paths,
    StorageMode,
    Engine,
    Credentials,
    CloudTarget,
    Provision,
    Retention,
}

impl fmt::Display for PreflightStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (n, name) = match self {
            PreflightStep::Load => (1, "load config"),
            PreflightStep::Identity => (2, "identity"),
            PreflightStep::Paths => (3, "paths"),
            PreflightStep::StorageMode => (4, "backup type"),
            PreflightStep::Engine => (5, "database type"),
            PreflightStep::Credentials => (6, "databases & credentials"),
            PreflightStep::CloudTarget => (7, "storage target"),
            PreflightStep::Provision => (8, "directories"),
            PreflightStep::Retention => (9, "retention"),
        };
        write!(f, "{n}/9 {name}")
    }
}

#[derive(Debug)]
pub struct PreflightFailure {
    pub step: PreflightStep,
    pub error: BackupError,
}

impl fmt::Display for PreflightFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.step, self.error)
    }
}

trait AtStep<T> {
    fn at(self, step: PreflightStep) -> std::result::Result<T, PreflightFailure>;
}

impl<T> AtStep<T> for Result<T> {
    fn at(self, step: PreflightStep) -> std::result::Result<T, PreflightFailure> {
        self.map_err(|error| PreflightFailure { step, error })
    }
}

fn invalid(msg: impl Into<String>) -> BackupError {
    BackupError::Validation(msg.into())
}

pub struct Preflight<'a, D, S> {
    paths: &'a PathsConfig,
    dumper: &'a D,
    store: &'a S,
}

impl<'a, D: Dumper, S: ObjectStore> Preflight<'a, D, S> {
    pub fn new(paths: &'a PathsConfig, dumper: &'a D, store: &'a S) -> Self {
        Self {
            paths,
            dumper,
            store,
        }
    }

    pub async fn run(&self, path: &Path) -> std::result::Result<ProjectContext, PreflightFailure> {
        let file = ProjectFile::load(path).at(Step::Load)?;

        let raw_name = file.get("PROJECT_NAME").unwrap_or_default().to_string();
        let name = sanitize_project_name(&raw_name).at(Step::Identity)?;
        if name != raw_name {
            info!(project = %name, raw = %raw_name, "Project name sanitized");
        }

        let (local_root, custom_local_root) =
            resolve_local_root(&self.paths.backup_base, &name, file.get("LOCAL_BACKUP_PATH"))
                .at(Step::Paths)?;
        if let Some(temp) = file.get("TEMP_PATH") {
            warn!(project = %name, value = temp, "TEMP_PATH is not configurable and is ignored");
        }
        let work_dir = work_dir_for(&self.paths.temp_base, &name);

        let storage = match file.get("BACKUP_TYPE") {
            Some(value) => value.parse::<StorageMode>().at(Step::StorageMode)?,
            None => {
                debug!(project = %name, "BACKUP_TYPE unset, using local");
                StorageMode::Local
            }
        };

        let engine = file
            .get("DB_TYPE")
            .ok_or_else(|| invalid("DB_TYPE is not set"))
            .and_then(|v| v.parse::<DbEngine>())
            .at(Step::Engine)?;
        self.dumper.check(engine).at(Step::Engine)?;

        let databases = resolve_databases(&file).at(Step::Credentials)?;
        let credentials = resolve_credentials(&file, engine).at(Step::Credentials)?;

        let cloud = if storage.includes_cloud() {
            let target = resolve_cloud_target(&file, &name).at(Step::CloudTarget)?;
            self.verify_cloud(&target).await.at(Step::CloudTarget)?;
            Some(target)
        } else {
            None
        };

        provision(&local_root, custom_local_root, &work_dir).at(Step::Provision)?;

        let retention = resolve_retention(&file).at(Step::Retention)?;

        info!(
            project = %name,
            engine = %engine,
            storage = %storage,
            databases = databases.len(),
            local_root = %local_root.display(),
            "Preflight passed"
        );

        Ok(ProjectContext {
            source: path.to_path_buf(),
            raw_name,
            name,
            engine,
            databases,
            credentials,
            storage,
            cloud,
            local_root,
            custom_local_root,
            work_dir,
            retention,
        })
    }

    /// Bucket reachable, then prefix writable.
    async fn verify_cloud(&self, target: &CloudTarget) -> Result<()> {
        self.store.check()?;
        self.store.bucket_exists(target).await?;
        self.store.verify_writable(target).await?;
        debug!(bucket = target.bucket(), prefix = target.prefix(), "Cloud target verified");
        Ok(())
    }
}

/// Working directory for a project. Never configurable.
pub fn work_dir_for(temp_base: &Path, name: &str) -> PathBuf {
    temp_base.join(format!("{name}_temp"))
}

/// Local backup root and whether it is a custom path outside the base.
fn resolve_local_root(base: &Path, name: &str, custom: Option<&str>) -> Result<(PathBuf, bool)> {
    let default = base.join(name);
    let Some(custom) = custom else {
        return Ok((default, false));
    };

    let custom_path = PathBuf::from(custom);
    if !custom_path.is_absolute() {
        return Err(invalid(format!("LOCAL_BACKUP_PATH '{custom}' must be absolute")));
    }
    if custom_path.starts_with(base) {
        debug!(project = %name, custom, "LOCAL_BACKUP_PATH is inside the global base, using default");
        return Ok((default, false));
    }
    Ok((custom_path, true))
}

/// Artifact names use the sanitized database name, so two databases that
/// sanitize alike would write the same file.
fn resolve_databases(file: &ProjectFile) -> Result<Vec<String>> {
    let mut databases: Vec<String> = Vec::new();
    for db in file.get_list("DBS_TO_BACKUP") {
        if databases.contains(&db) {
            warn!(database = %db, "Database listed twice, ignoring repeat");
            continue;
        }
        let key = sanitize(&db);
        if let Some(other) = databases.iter().find(|d| sanitize(d) == key) {
            return Err(invalid(format!(
                "databases '{other}' and '{db}' both produce artifacts named '{key}_*'"
            )));
        }
        databases.push(db);
    }
    if databases.is_empty() {
        return Err(invalid("DBS_TO_BACKUP is empty"));
    }
    Ok(databases)
}

fn resolve_credentials(file: &ProjectFile, engine: DbEngine) -> Result<Credentials> {
    let password = file.get("DB_PASSWORD").map(str::to_string);
    let user = match (file.get("DB_USER"), &password) {
        (Some(user), _) => user.to_string(),
        (None, None) if engine.allows_trust_auth() => engine
            .default_admin_user()
            .unwrap_or_default()
            .to_string(),
        (None, _) => return Err(invalid(format!("DB_USER is required for {engine}"))),
    };
    if password.is_none() && !engine.allows_trust_auth() {
        return Err(invalid(format!("DB_PASSWORD is required for {engine}")));
    }

    let port = match file.get("DB_PORT") {
        Some(p) => Some(
            p.parse::<u16>()
                .map_err(|_| invalid(format!("DB_PORT '{p}' is not a valid port")))?,
        ),
        None => None,
    };

    Ok(Credentials {
        user,
        password,
        host: file.get("DB_HOST").map(str::to_string),
        port,
    })
}

fn resolve_cloud_target(file: &ProjectFile, name: &str) -> Result<CloudTarget> {
    let provider = file
        .get("CLOUD_STORAGE_PROVIDER")
        .ok_or_else(|| invalid("CLOUD_STORAGE_PROVIDER is required for cloud backups"))?
        .to_ascii_lowercase();
    let bucket = file
        .get("CLOUD_BUCKET")
        .ok_or_else(|| invalid("CLOUD_BUCKET is required for cloud backups"))?
        .to_string();
    let prefix = file
        .get("CLOUD_PREFIX")
        .map(|p| p.trim_matches('/').to_string())
        .unwrap_or_else(|| name.to_string());
    let opt = |key: &str| file.get(key).map(str::to_string);

    match provider.as_str() {
        "s3" => Ok(CloudTarget::S3 {
            bucket,
            prefix,
            region: opt("S3_REGION"),
            profile: opt("S3_PROFILE"),
            endpoint_url: opt("S3_ENDPOINT_URL"),
        }),
        "r2" => Ok(CloudTarget::R2 {
            bucket,
            prefix,
            account_id: file
                .get("R2_ACCOUNT_ID")
                .ok_or_else(|| invalid("R2_ACCOUNT_ID is required for r2"))?
                .to_string(),
            profile: opt("R2_PROFILE"),
        }),
        "b2" => Err(invalid("cloud provider 'b2' is reserved and not supported")),
        other => Err(invalid(format!(
            "unknown CLOUD_STORAGE_PROVIDER '{other}' (expected s3 or r2)"
        ))),
    }
}

fn provision(local_root: &Path, custom: bool, work_dir: &Path) -> Result<()> {
    // The default base is provisioned by the installer.
    if custom {
        std::fs::create_dir_all(local_root).map_err(|e| {
            invalid(format!("cannot create {}: {e}", local_root.display()))
        })?;
    }
    std::fs::create_dir_all(work_dir)
        .map_err(|e| invalid(format!("cannot create {}: {e}", work_dir.display())))?;
    Ok(())
}

/// Every cadence's TTL must parse. Unset means unlimited.
fn resolve_retention(file: &ProjectFile) -> Result<RetentionPolicy> {
    let mut policy = RetentionPolicy::default();
    for cadence in Cadence::ALL {
        let key = cadence.ttl_key();
        let ttl = match file.get(&key) {
            Some(value) => {
                Ttl::from_minutes(parse_ttl(value).map_err(|e| invalid(format!("{key}: {e}")))?)
            }
            None => Ttl::UNLIMITED,
        };
        policy.set(cadence, ttl);
    }
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{RemoteObject, SyncMode};
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    struct FakeDumper {
        missing: Option<DbEngine>,
    }

    impl Dumper for FakeDumper {
        fn check(&self, engine: DbEngine) -> Result<()> {
            if self.missing == Some(engine) {
                return Err(BackupError::Dependency(format!("{engine} tool missing")));
            }
            Ok(())
        }

        async fn dump(&self, _: &ProjectContext, _: &str, _: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        bucket_missing: bool,
        read_only: bool,
        calls: RefCell<Vec<String>>,
    }

    impl ObjectStore for FakeStore {
        fn check(&self) -> Result<()> {
            Ok(())
        }

        async fn bucket_exists(&self, target: &CloudTarget) -> Result<()> {
            self.calls.borrow_mut().push(format!("head-bucket {}", target.bucket()));
            if self.bucket_missing {
                return Err(BackupError::Storage("no such bucket".into()));
            }
            Ok(())
        }

        async fn verify_writable(&self, target: &CloudTarget) -> Result<()> {
            self.calls.borrow_mut().push(format!("marker {}", target.prefix()));
            if self.read_only {
                return Err(BackupError::Storage("access denied".into()));
            }
            Ok(())
        }

        async fn sync(&self, _: &CloudTarget, _: &Path, _: &str, _: SyncMode) -> Result<()> {
            Ok(())
        }

        async fn list(&self, _: &CloudTarget, _: &str) -> Result<Vec<RemoteObject>> {
            Ok(Vec::new())
        }

        async fn delete(&self, _: &CloudTarget, _: &str) -> Result<()> {
            Ok(())
        }
    }

    struct Env {
        tmp: TempDir,
        paths: PathsConfig,
    }

    impl Env {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let paths = PathsConfig {
                manifest: tmp.path().join("manifest.conf"),
                backup_base: tmp.path().join("backups"),
                temp_base: tmp.path().join("tmp"),
                audit_dir: tmp.path().join("audit"),
                lock_dir: tmp.path().join("lock"),
            };
            Self { tmp, paths }
        }

        fn project(&self, name: &str, content: &str) -> PathBuf {
            let path = self.tmp.path().join(name);
            fs::write(&path, content).unwrap();
            path
        }
    }

    const BASIC: &str = "PROJECT_NAME=acme\nDB_TYPE=mysql\nDBS_TO_BACKUP=(orders users)\nDB_USER=backup\nDB_PASSWORD=secret\n";

    async fn check(env: &Env, content: &str) -> std::result::Result<ProjectContext, PreflightFailure> {
        check_with(env, content, &FakeDumper { missing: None }, &FakeStore::default()).await
    }

    async fn check_with(
        env: &Env,
        content: &str,
        dumper: &FakeDumper,
        store: &FakeStore,
    ) -> std::result::Result<ProjectContext, PreflightFailure> {
        let path = env.project("project.conf", content);
        Preflight::new(&env.paths, dumper, store).run(&path).await
    }

    #[tokio::test]
    async fn test_basic_local_project() {
        let env = Env::new();
        let ctx = check(&env, BASIC).await.unwrap();

        assert_eq!(ctx.name, "acme");
        assert_eq!(ctx.engine, DbEngine::Mysql);
        assert_eq!(ctx.databases, vec!["orders", "users"]);
        assert_eq!(ctx.storage, StorageMode::Local);
        assert_eq!(ctx.local_root, env.paths.backup_base.join("acme"));
        assert!(!ctx.custom_local_root);
        assert_eq!(ctx.work_dir, env.paths.temp_base.join("acme_temp"));
        assert!(ctx.work_dir.is_dir());
        // Default base is not provisioned by preflight.
        assert!(!env.paths.backup_base.exists());
    }

    #[tokio::test]
    async fn test_unset_ttl_defaults_to_unlimited() {
        let env = Env::new();
        let ctx = check(&env, &format!("{BASIC}TTL_HOURLY_BACKUP=2d\n")).await.unwrap();
        assert!(ctx.retention.ttl(Cadence::Daily).is_unlimited());
        assert_eq!(ctx.retention.ttl(Cadence::Hourly).minutes(), 2880);
    }

    #[tokio::test]
    async fn test_bad_ttl_fails_project() {
        let env = Env::new();
        let err = check(&env, &format!("{BASIC}TTL_WEEKLY_BACKUP=10x\n")).await.unwrap_err();
        assert_eq!(err.step, PreflightStep::Retention);
        assert!(err.to_string().contains("TTL_WEEKLY_BACKUP"));
    }

    #[tokio::test]
    async fn test_identity_rules() {
        let env = Env::new();
        let empty = check(&env, "DB_TYPE=mysql\n").await.unwrap_err();
        assert_eq!(empty.step, PreflightStep::Identity);

        let separators = check(&env, "PROJECT_NAME=\"***\"\n").await.unwrap_err();
        assert_eq!(separators.step, PreflightStep::Identity);

        let ctx = check(&env, &BASIC.replace("PROJECT_NAME=acme", "PROJECT_NAME=\"acme shop\""))
            .await
            .unwrap();
        assert_eq!(ctx.name, "acme_shop");
        assert_eq!(ctx.raw_name, "acme shop");
        assert_eq!(ctx.work_dir, env.paths.temp_base.join("acme_shop_temp"));
    }

    #[tokio::test]
    async fn test_custom_local_root() {
        let env = Env::new();
        let custom = env.tmp.path().join("elsewhere/acme");
        let ctx = check(&env, &format!("{BASIC}LOCAL_BACKUP_PATH={}\n", custom.display()))
            .await
            .unwrap();
        assert_eq!(ctx.local_root, custom);
        assert!(ctx.custom_local_root);
        assert!(custom.is_dir());

        let inside = env.paths.backup_base.join("other");
        let ctx = check(&env, &format!("{BASIC}LOCAL_BACKUP_PATH={}\n", inside.display()))
            .await
            .unwrap();
        assert_eq!(ctx.local_root, env.paths.backup_base.join("acme"));
        assert!(!ctx.custom_local_root);

        let err = check(&env, &format!("{BASIC}LOCAL_BACKUP_PATH=relative/dir\n"))
            .await
            .unwrap_err();
        assert_eq!(err.step, PreflightStep::Paths);
    }

    #[tokio::test]
    async fn test_temp_path_is_ignored() {
        let env = Env::new();
        let ctx = check(&env, &format!("{BASIC}TEMP_PATH=/tmp/shared\n")).await.unwrap();
        assert_eq!(ctx.work_dir, env.paths.temp_base.join("acme_temp"));
    }

    #[tokio::test]
    async fn test_storage_mode_and_engine_errors() {
        let env = Env::new();
        let err = check(&env, &format!("{BASIC}BACKUP_TYPE=tape\n")).await.unwrap_err();
        assert_eq!(err.step, PreflightStep::StorageMode);

        let err = check(&env, &BASIC.replace("DB_TYPE=mysql", "DB_TYPE=oracle"))
            .await
            .unwrap_err();
        assert_eq!(err.step, PreflightStep::Engine);
        assert!(matches!(err.error, BackupError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_dump_tool_is_dependency_error() {
        let env = Env::new();
        let dumper = FakeDumper {
            missing: Some(DbEngine::Mysql),
        };
        let err = check_with(&env, BASIC, &dumper, &FakeStore::default())
            .await
            .unwrap_err();
        assert_eq!(err.step, PreflightStep::Engine);
        assert!(err.error.is_fatal());
    }

    #[tokio::test]
    async fn test_credentials() {
        let env = Env::new();
        let err = check(&env, &BASIC.replace("DB_PASSWORD=secret\n", "")).await.unwrap_err();
        assert_eq!(err.step, PreflightStep::Credentials);

        let err = check(&env, &BASIC.replace("DBS_TO_BACKUP=(orders users)\n", "DBS_TO_BACKUP=()\n"))
            .await
            .unwrap_err();
        assert_eq!(err.step, PreflightStep::Credentials);

        let pg = "PROJECT_NAME=pg\nDB_TYPE=postgres\nDBS_TO_BACKUP=app\n";
        let ctx = check(&env, pg).await.unwrap();
        assert_eq!(ctx.credentials.user, "postgres");
        assert_eq!(ctx.credentials.password, None);

        let err = check(&env, &format!("{BASIC}DB_PORT=99999\n")).await.unwrap_err();
        assert_eq!(err.step, PreflightStep::Credentials);
    }

    #[tokio::test]
    async fn test_databases_must_have_distinct_artifact_names() {
        let env = Env::new();
        let ctx = check(&env, &BASIC.replace("(orders users)", "(orders users orders)"))
            .await
            .unwrap();
        assert_eq!(ctx.databases, vec!["orders", "users"]);

        let err = check(&env, &BASIC.replace("(orders users)", "(\"crm db\" crm_db)"))
            .await
            .unwrap_err();
        assert_eq!(err.step, PreflightStep::Credentials);
        assert!(matches!(err.error, BackupError::Validation(_)));
        assert!(err.to_string().contains("crm_db_*"));
    }

    #[tokio::test]
    async fn test_cloud_target_checks() {
        let env = Env::new();
        let cloud = format!(
            "{BASIC}BACKUP_TYPE=both\nCLOUD_STORAGE_PROVIDER=r2\nCLOUD_BUCKET=backups\nR2_ACCOUNT_ID=abc\nCLOUD_PREFIX=/clients/acme/\n"
        );

        let store = FakeStore::default();
        let ctx = check_with(&env, &cloud, &FakeDumper { missing: None }, &store)
            .await
            .unwrap();
        assert_eq!(ctx.cloud.as_ref().map(|c| c.prefix()), Some("clients/acme"));
        assert_eq!(
            *store.calls.borrow(),
            vec!["head-bucket backups".to_string(), "marker clients/acme".to_string()]
        );

        let missing = FakeStore {
            bucket_missing: true,
            ..FakeStore::default()
        };
        let err = check_with(&env, &cloud, &FakeDumper { missing: None }, &missing)
            .await
            .unwrap_err();
        assert_eq!(err.step, PreflightStep::CloudTarget);
        assert_eq!(missing.calls.borrow().len(), 1);

        let read_only = FakeStore {
            read_only: true,
            ..FakeStore::default()
        };
        let err = check_with(&env, &cloud, &FakeDumper { missing: None }, &read_only)
            .await
            .unwrap_err();
        assert!(matches!(err.error, BackupError::Storage(_)));
    }

    #[tokio::test]
    async fn test_cloud_provider_rules() {
        let env = Env::new();
        let base = format!("{BASIC}BACKUP_TYPE=cloud\nCLOUD_BUCKET=b\n");

        let err = check(&env, &format!("{base}CLOUD_STORAGE_PROVIDER=b2\n")).await.unwrap_err();
        assert_eq!(err.step, PreflightStep::CloudTarget);
        assert!(err.to_string().contains("not supported"));

        let err = check(&env, &format!("{base}CLOUD_STORAGE_PROVIDER=r2\n")).await.unwrap_err();
        assert!(err.to_string().contains("R2_ACCOUNT_ID"));

        let ctx = check(&env, &format!("{base}CLOUD_STORAGE_PROVIDER=S3\n")).await.unwrap();
        assert_eq!(ctx.cloud.as_ref().map(|c| c.provider()), Some("s3"));
        assert_eq!(ctx.cloud.as_ref().map(|c| c.prefix()), Some("acme"));
    }
}
