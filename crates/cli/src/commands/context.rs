//! Shared plumbing for commands that talk to a bucket
//!
//! A [`Session`] is opened per invocation: it loads the config, builds one
//! S3 client per alias the command touches, wires the relocation engine
//! (options from `[defaults]`, activity log when the first alias opts in)
//! and cancels the engine on Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;

use relo_core::config::Defaults;
use relo_core::kv::{self, KeyValueStore};
use relo_core::{
    ActivityLog, BatchReport, Config, ConfigManager, Container, EngineOptions, Error,
    FileKv, JsonlActivityLog, NoopActivityLog, ObjectRef, RelocationEngine, RemotePath, Result,
};
use relo_s3::S3Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::exit_code::ExitCode;
use crate::output::Formatter;

const ACTIVITY_FILE: &str = "activity.jsonl";
const SETTINGS_FILE: &str = "settings.json";

/// Where the activity log of this installation lives
pub fn activity_log_path(manager: &ConfigManager) -> PathBuf {
    manager.config_dir().join(ACTIVITY_FILE)
}

/// Where persisted UI state of this installation lives
pub fn settings_path(manager: &ConfigManager) -> PathBuf {
    manager.config_dir().join(SETTINGS_FILE)
}

/// Everything a bucket command needs
pub struct Session {
    pub config: Config,
    pub engine: Arc<RelocationEngine>,
    kv: FileKv,
}

impl Session {
    /// Open a session for the alias `alias_name`
    pub async fn open(alias_name: &str) -> Result<Self> {
        Self::open_for(&[alias_name]).await
    }

    /// Open a session reaching every alias in `aliases`
    ///
    /// The first alias decides about the activity log.
    pub async fn open_for(aliases: &[&str]) -> Result<Self> {
        let manager = ConfigManager::new()?;
        let config = manager.load()?;
        let find = |name: &str| {
            config
                .aliases
                .iter()
                .find(|a| a.name == name)
                .cloned()
                .ok_or_else(|| Error::AliasNotFound(name.to_string()))
        };
        let Some((&primary_name, others)) = aliases.split_first() else {
            return Err(Error::Precondition("no alias given".into()));
        };
        let primary = find(primary_name)?;
        let request_timeout = config.defaults.call_timeout();

        let client = S3Client::new(primary.clone())
            .await?
            .with_request_timeout(request_timeout);
        let mut engine = RelocationEngine::new(Arc::new(client));
        for &name in others {
            if name == primary.name {
                continue;
            }
            let client = S3Client::new(find(name)?)
                .await?
                .with_request_timeout(request_timeout);
            engine = engine.with_store(name, Arc::new(client));
        }

        let activity: Arc<dyn ActivityLog> = if primary.activity_log {
            Arc::new(JsonlActivityLog::new(activity_log_path(&manager)))
        } else {
            Arc::new(NoopActivityLog)
        };
        let engine = engine
            .with_activity_log(activity)
            .with_options(EngineOptions::from(&config.defaults))
            .with_cancellation(cancel_on_ctrl_c());

        tracing::debug!(alias = %primary.name, others = ?others, log = primary.activity_log, "session opened");
        Ok(Self {
            kv: FileKv::new(settings_path(&manager)),
            config,
            engine: Arc::new(engine),
        })
    }

    pub fn defaults(&self) -> &Defaults {
        &self.config.defaults
    }

    pub fn settings(&self) -> &dyn KeyValueStore {
        &self.kv
    }

    pub fn trash_enabled(&self, container: &Container) -> Result<bool> {
        kv::trash_enabled(&self.kv, container)
    }

    pub fn interrupted(&self) -> bool {
        self.engine.cancellation_token().is_cancelled()
    }

    /// Find the object or folder a path points at
    ///
    /// A key with a trailing slash is a folder. Without one, an exact object
    /// match wins, then a folder of that name.
    pub async fn resolve(&self, path: &RemotePath) -> Result<ObjectRef> {
        let key = path.key.trim_start_matches('/');
        if key.is_empty() {
            return Err(Error::InvalidPath(format!(
                "'{path}' names a bucket; give an object or folder inside it"
            )));
        }

        let container = path.container();
        let listing = self.engine.list(&container, key).await?;
        if key.ends_with('/') {
            if listing.is_empty() {
                return Err(Error::NotFound(path.to_string()));
            }
            return Ok(ObjectRef::folder(key));
        }

        if let Some(found) = listing.iter().find(|o| o.key == key) {
            return Ok(found.clone());
        }
        let folder = format!("{key}/");
        if listing.iter().any(|o| o.key.starts_with(&folder)) {
            return Ok(ObjectRef::folder(folder));
        }
        Err(Error::NotFound(path.to_string()))
    }

    /// Resolve several paths that must share one container
    pub async fn resolve_all(&self, paths: &[RemotePath]) -> Result<(Container, Vec<ObjectRef>)> {
        let Some(first) = paths.first() else {
            return Err(Error::Precondition("no items given".into()));
        };
        let container = first.container();
        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            if path.container() != container {
                return Err(Error::InvalidPath(format!(
                    "'{path}' is not in {container}; every source must share one bucket"
                )));
            }
            items.push(self.resolve(path).await?);
        }
        Ok((container, items))
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the running item");
            trigger.cancel();
        }
    });
    token
}

/// JSON shape of a finished batch
#[derive(Serialize)]
struct ReportOutput<'a> {
    action: &'a str,
    outcome: relo_core::BatchOutcome,
    #[serde(flatten)]
    report: &'a BatchReport,
}

/// Print a batch report and pick the exit code for it
pub fn print_report(formatter: &Formatter, action: &str, report: &BatchReport) -> ExitCode {
    if formatter.is_json() {
        formatter.json(&ReportOutput {
            action,
            outcome: report.outcome(),
            report,
        });
        return ExitCode::for_report(report);
    }

    for success in &report.succeeded {
        formatter.success(&format!("{action} {} -> {}", success.name, success.key));
    }
    for name in &report.reclassified {
        formatter.warning(&format!(
            "{name}: the store reported a delete error but the source is gone"
        ));
    }
    for name in &report.skipped {
        formatter.warning(&format!("skipped {name}"));
    }
    for failure in &report.failed {
        formatter.error(&format!("{}: {}", failure.name, failure.reason));
    }
    if report.succeeded.len() + report.failed.len() > 1 {
        formatter.println(&format!(
            "{} succeeded, {} failed, {} skipped",
            report.succeeded.len(),
            report.failed.len(),
            report.skipped.len()
        ));
    }
    ExitCode::for_report(report)
}
