//! Polling file watcher that reloads the configuration or restarts the
//! process when watched files change.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::error::{DotwebError, Result};
use crate::plugin::Plugin;
use crate::server::HttpServer;
use crate::shutdown::ShutdownSignal;

/// Environment variable set on a process started by a restart.
pub const RELOAD_ENV: &str = "DOTWEB_RELOAD";
/// Shortest accepted polling interval.
pub const MIN_NOTIFY_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    /// Re-read the server's config file and swap it in.
    Reload,
    /// Start a fresh copy of the executable and shut this one down.
    Restart,
}

pub struct NotifyPlugin {
    root: PathBuf,
    interval: Duration,
    suffixes: Vec<String>,
    mode: NotifyMode,
    restart_program: Option<PathBuf>,
}

impl NotifyPlugin {
    /// Watch every file below `root`, polling every `interval` (at least
    /// [`MIN_NOTIFY_INTERVAL`]).
    pub fn new(root: impl Into<PathBuf>, interval: Duration) -> Self {
        NotifyPlugin {
            root: root.into(),
            interval: interval.max(MIN_NOTIFY_INTERVAL),
            suffixes: Vec::new(),
            mode: NotifyMode::Reload,
            restart_program: None,
        }
    }

    /// Only watch files with these extensions (`"xml"` or `".xml"`).
    pub fn with_suffixes<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.suffixes = suffixes
            .into_iter()
            .map(|s| s.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn with_mode(mut self, mode: NotifyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Program started by [`NotifyMode::Restart`] instead of the current
    /// executable. It receives the same arguments.
    pub fn with_restart_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.restart_program = Some(program.into());
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn mode(&self) -> NotifyMode {
        self.mode
    }

    async fn snapshot(&self) -> Result<HashMap<PathBuf, SystemTime>> {
        let root = self.root.clone();
        let suffixes = self.suffixes.clone();
        tokio::task::spawn_blocking(move || scan(&root, &suffixes))
            .await
            .map_err(|e| DotwebError::Internal(format!("file scan task failed: {e}")))
    }
}

/// Modification times of the matching files below `root`.
pub fn scan(root: &Path, suffixes: &[String]) -> HashMap<PathBuf, SystemTime> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            suffixes.is_empty()
                || entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| suffixes.iter().any(|s| s.eq_ignore_ascii_case(e)))
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((entry.into_path(), modified))
        })
        .collect()
}

/// Files whose modification time moved forward between two scans.
pub fn changed_files(
    before: &HashMap<PathBuf, SystemTime>,
    after: &HashMap<PathBuf, SystemTime>,
) -> Vec<PathBuf> {
    let mut changed: Vec<PathBuf> = after
        .iter()
        .filter(|(path, modified)| before.get(*path).is_some_and(|old| *modified > old))
        .map(|(path, _)| path.clone())
        .collect();
    changed.sort();
    changed
}

fn restart_process(program: Option<&Path>) -> Result<()> {
    let exe = match program {
        Some(program) => program.to_path_buf(),
        None => std::env::current_exe()?,
    };
    let child = std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .env(RELOAD_ENV, "1")
        .spawn()?;
    tracing::info!(pid = child.id(), exe = %exe.display(), "started replacement process");
    Ok(())
}

#[async_trait]
impl Plugin for NotifyPlugin {
    fn name(&self) -> &str {
        "NotifyPlugin"
    }

    fn is_validate(&self) -> bool {
        self.root.is_dir()
    }

    async fn run(&self, server: Arc<HttpServer>, mut shutdown: ShutdownSignal) -> Result<()> {
        let mut known = self.snapshot().await?;
        tracing::info!(
            root = %self.root.display(),
            files = known.len(),
            interval_ms = self.interval.as_millis() as u64,
            "watching files"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                _ = ticker.tick() => {}
            }
            let current = self.snapshot().await?;
            let changed = changed_files(&known, &current);
            known = current;
            if changed.is_empty() {
                continue;
            }
            tracing::info!(files = ?changed, "watched files changed");
            match self.mode {
                NotifyMode::Reload => {
                    if let Err(err) = server.reload_config() {
                        tracing::error!(error = %err, "config reload failed, keeping current config");
                    }
                }
                NotifyMode::Restart => match restart_process(self.restart_program.as_deref()) {
                    Ok(()) => {
                        server.shutdown();
                        return Ok(());
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "restart failed, keeping the current process");
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_has_a_floor() {
        let plugin = NotifyPlugin::new(".", Duration::from_millis(10));
        assert_eq!(plugin.interval(), MIN_NOTIFY_INTERVAL);
    }

    #[test]
    fn only_advanced_files_count_as_changed() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let t1 = t0 + Duration::from_secs(1);
        let before = HashMap::from([
            (PathBuf::from("a.xml"), t0),
            (PathBuf::from("b.xml"), t0),
        ]);
        let after = HashMap::from([
            (PathBuf::from("a.xml"), t1),
            (PathBuf::from("b.xml"), t0),
            (PathBuf::from("new.xml"), t1),
        ]);
        assert_eq!(changed_files(&before, &after), vec![PathBuf::from("a.xml")]);
    }

    #[tokio::test]
    async fn failed_restart_keeps_watching() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.xml");
        let base = SystemTime::now() - Duration::from_secs(3600);
        std::fs::write(&file, "<config/>").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(base)
            .unwrap();

        let plugin = NotifyPlugin::new(dir.path(), MIN_NOTIFY_INTERVAL)
            .with_mode(NotifyMode::Restart)
            .with_restart_program(dir.path().join("no-such-binary"));
        let server = Arc::new(HttpServer::new());
        let shutdown = crate::shutdown::Shutdown::new();
        let signal = shutdown.subscribe();
        let watcher = tokio::spawn({
            let server = server.clone();
            async move { plugin.run(server, signal).await }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(base + Duration::from_secs(1))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert!(!watcher.is_finished());
        assert!(!server.is_shutdown());

        shutdown.trigger();
        let stopped = tokio::time::timeout(Duration::from_secs(2), watcher)
            .await
            .expect("watcher stops on shutdown")
            .unwrap();
        assert!(stopped.is_ok());
    }

    #[test]
    fn scan_filters_by_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.xml"), "<config/>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let files = scan(dir.path(), &["xml".to_string()]);
        assert_eq!(files.len(), 1);
        assert!(files.keys().all(|p| p.ends_with("app.xml")));
    }
}
