//! Temp-file debug logging, enabled with the `FZPIPE_LOG` env var.
//!
//! The selector owns the terminal while a session runs, so diagnostics go to
//! a size-capped temp file instead of stderr. Preview payloads and candidate
//! lines are never logged, only lifecycle events.

use std::{
    env, fs,
    io::Write,
    path::PathBuf,
    sync::{Mutex, OnceLock},
    time::{SystemTime, UNIX_EPOCH},
};

const LOG_MAX_BYTES: u64 = 1024 * 1024;

static LOG_STATE: OnceLock<Mutex<Option<LogWriter>>> = OnceLock::new();

/// Path of the debug log file, honoring `FZPIPE_LOG=/some/path`.
pub fn log_file_path() -> PathBuf {
    match env::var("FZPIPE_LOG") {
        Ok(value) if !value.is_empty() && value != "1" => PathBuf::from(value),
        _ => env::temp_dir().join("fzpipe.log"),
    }
}

struct LogWriter {
    path: PathBuf,
    file: fs::File,
    bytes_written: u64,
}

impl LogWriter {
    fn new(path: PathBuf) -> Option<Self> {
        let mut bytes_written = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if bytes_written > LOG_MAX_BYTES {
            let _ = fs::remove_file(&path);
            bytes_written = 0;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;
        Some(Self {
            path,
            file,
            bytes_written,
        })
    }

    fn rotate_if_needed(&mut self, next_len: usize) {
        if self.bytes_written.saturating_add(next_len as u64) <= LOG_MAX_BYTES {
            return;
        }
        if let Ok(file) = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
        {
            self.file = file;
            self.bytes_written = 0;
        }
    }

    fn write_line(&mut self, line: &str) {
        self.rotate_if_needed(line.len());
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.bytes_written = self.bytes_written.saturating_add(line.len() as u64);
        }
    }
}

fn log_state() -> &'static Mutex<Option<LogWriter>> {
    LOG_STATE.get_or_init(|| {
        let writer = if env::var_os("FZPIPE_LOG").is_some() {
            LogWriter::new(log_file_path())
        } else {
            None
        };
        Mutex::new(writer)
    })
}

/// Write a debug message to the temp log file, if logging is enabled.
pub(crate) fn log_debug(msg: &str) {
    let mut state = log_state()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(writer) = state.as_mut() {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        writer.write_line(&format!("[{timestamp}] {msg}\n"));
    }
}
