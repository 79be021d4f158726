// Author: Dustin Pilgrim
// License: MIT

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024; // 5 MiB
const DEFAULT_KEEP_BACKUPS: u32 = 5;

pub struct LogPolicy {
    pub max_bytes: u64,
    pub keep_backups: u32,
}

impl Default for LogPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            keep_backups: DEFAULT_KEEP_BACKUPS,
        }
    }
}

pub fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|p| p.join("ticktrack").join("ticktrack.log"))
}

/// Ensures the log file's directory exists and rotates the file if needed.
/// Returns whether to insert a blank line before the next run header.
pub fn prepare_log_file(path: &Path, policy: &LogPolicy) -> io::Result<bool> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    if meta.len() == 0 {
        return Ok(false);
    }

    if meta.len() >= policy.max_bytes {
        rotate(path, policy.keep_backups)?;
        return Ok(false);
    }

    Ok(true)
}

pub fn run_header() -> String {
    let pid = std::process::id();
    let started = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("==================== ticktrack daemon run start {started} (pid={pid}) ====================")
}

fn rotate(path: &Path, keep_backups: u32) -> io::Result<()> {
    if keep_backups == 0 {
        let _ = fs::remove_file(path);
        return Ok(());
    }

    for i in (1..keep_backups).rev() {
        let from = rotated_name(path, i);
        let to = rotated_name(path, i + 1);
        if from.exists() {
            let _ = fs::rename(from, to);
        }
    }

    fs::rename(path, rotated_name(path, 1))
}

fn rotated_name(base: &Path, n: u32) -> PathBuf {
    PathBuf::from(format!("{}.{}", base.display(), n))
}

/// Install the global subscriber: a file layer when `log_path` can be opened,
/// plus stderr when `verbose`. Debug level with `verbose`, info otherwise.
pub fn init(log_path: Option<&Path>, verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let file = log_path.and_then(|path| match open_for_run(path) {
        Ok(f) => Some(f),
        Err(e) => {
            eprintln!("ticktrack: file logging disabled ({}): {e}", path.display());
            None
        }
    });

    let file_layer = file.map(|f| {
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(f))
            .with_ansi(false)
            .with_target(false)
    });

    let console_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
    });

    let installed = tracing_subscriber::registry()
        .with(level)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    if installed.is_err() {
        eprintln!("ticktrack: a tracing subscriber was already installed");
    }

    if let Some(path) = log_path {
        tracing::debug!("file logging enabled: {}", path.display());
    }
}

fn open_for_run(path: &Path) -> io::Result<fs::File> {
    let needs_blank = prepare_log_file(path, &LogPolicy::default()).unwrap_or(false);

    let mut f = fs::OpenOptions::new().create(true).append(true).open(path)?;
    if needs_blank {
        f.write_all(b"\n")?;
    }
    f.write_all(run_header().as_bytes())?;
    f.write_all(b"\n")?;
    f.flush()?;
    Ok(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_shifts_backups() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("t.log");
        fs::write(&log, "0123456789").unwrap();
        fs::write(rotated_name(&log, 1), "older").unwrap();

        let policy = LogPolicy {
            max_bytes: 5,
            keep_backups: 3,
        };
        assert!(!prepare_log_file(&log, &policy).unwrap());

        assert!(!log.exists());
        assert_eq!(fs::read_to_string(rotated_name(&log, 1)).unwrap(), "0123456789");
        assert_eq!(fs::read_to_string(rotated_name(&log, 2)).unwrap(), "older");
    }

    #[test]
    fn small_log_asks_for_separator() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("nested").join("t.log");

        assert!(!prepare_log_file(&log, &LogPolicy::default()).unwrap());

        fs::write(&log, "line\n").unwrap();
        assert!(prepare_log_file(&log, &LogPolicy::default()).unwrap());
    }

    #[test]
    fn run_header_written_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("t.log");
        fs::write(&log, "previous run\n").unwrap();

        drop(open_for_run(&log).unwrap());

        let text = fs::read_to_string(&log).unwrap();
        assert!(text.starts_with("previous run\n\n===================="));
        assert!(text.contains("ticktrack daemon run start"));
    }
}
