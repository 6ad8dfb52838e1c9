use std::ffi::OsString;
use std::fs::{create_dir_all, read_to_string, write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Once, OnceLock};
use tklog::{Format, LEVEL, LOG};

const LOG_FILE_ENV: &str = "STICKIES_LOG_FILE";
const LOG_LEVEL_ENV: &str = "STICKIES_LOG_LEVEL";
const ENABLED_FLAG_FILE: &str = "logging_enabled";

/// Where the debug log goes and where the on/off choice is remembered.
#[derive(Debug, PartialEq)]
struct LogPaths {
    log_file: PathBuf,
    enabled_flag: PathBuf,
}

impl LogPaths {
    fn new(data_dir: &Path, override_file: Option<OsString>, home: Option<PathBuf>) -> Self {
        let log_file = override_file
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .or_else(|| home.map(|home| home.join("Library/Logs/Stickies/debug.log")))
            .unwrap_or_else(|| data_dir.join("logs").join("debug.log"));
        Self {
            log_file,
            enabled_flag: data_dir.join(ENABLED_FLAG_FILE),
        }
    }

    fn remembered_enabled(&self) -> bool {
        read_to_string(&self.enabled_flag).is_ok_and(|raw| raw.trim() == "1")
    }

    fn remember_enabled(&self, enabled: bool) {
        if let Some(parent) = self.enabled_flag.parent() {
            let _ = create_dir_all(parent);
        }
        let _ = write(&self.enabled_flag, if enabled { "1" } else { "0" });
    }
}

static PATHS: OnceLock<LogPaths> = OnceLock::new();
static FILE_SINK: Once = Once::new();
static FILE_LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

fn parse_level(raw: &str) -> Option<LEVEL> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LEVEL::Trace),
        "debug" => Some(LEVEL::Debug),
        "info" => Some(LEVEL::Info),
        "warn" | "warning" => Some(LEVEL::Warn),
        "error" => Some(LEVEL::Error),
        _ => None,
    }
}

/// `None` until [`initialize`] has run.
pub fn log_file_path() -> Option<PathBuf> {
    PATHS.get().map(|paths| paths.log_file.clone())
}

pub fn file_logging_enabled() -> bool {
    FILE_LOGGING_ENABLED.load(Ordering::Relaxed)
}

pub fn enable_file_logging() -> bool {
    if file_logging_enabled() {
        return true;
    }
    let Some(paths) = PATHS.get() else {
        eprintln!("[log] cannot enable file logging before initialization");
        return false;
    };

    if let Some(parent) = paths.log_file.parent()
        && let Err(err) = create_dir_all(parent)
    {
        eprintln!("[log] failed to create log dir: {} | {}", parent.display(), err);
        return false;
    }

    FILE_SINK.call_once(|| {
        let path = paths.log_file.to_string_lossy().to_string();
        // 10 MiB per file, five rotated files kept.
        LOG.set_cutmode_by_size(&path, 10 * 1024 * 1024, 5, true);
    });
    FILE_LOGGING_ENABLED.store(true, Ordering::Relaxed);
    paths.remember_enabled(true);
    true
}

pub fn disable_file_logging() {
    FILE_LOGGING_ENABLED.store(false, Ordering::Relaxed);
    if let Some(paths) = PATHS.get() {
        paths.remember_enabled(false);
    }
}

/// Sets up console output and restores the remembered file-logging choice,
/// which lives under `data_dir`.
pub fn initialize(data_dir: &Path) {
    let paths = PATHS.get_or_init(|| {
        LogPaths::new(
            data_dir,
            std::env::var_os(LOG_FILE_ENV),
            std::env::var_os("HOME").map(PathBuf::from),
        )
    });

    let level = std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|raw| parse_level(&raw))
        .unwrap_or(LEVEL::Debug);
    LOG.set_level(level)
        .set_console(true)
        .set_format(Format::LevelFlag | Format::Date | Format::Time | Format::ShortFileName)
        .set_formatter("{level}{time} {file}:{message}\n");

    if paths.remembered_enabled() {
        let _ = enable_file_logging();
    }
}

#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {{
        if $crate::logger::file_logging_enabled() {
            tklog::debug!(format!($($arg)*));
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_prefers_override_then_library_logs() {
        let data_dir = Path::new("/data/stickies");
        let home = || Some(PathBuf::from("/Users/ada"));

        let paths = LogPaths::new(data_dir, Some("/tmp/notes.log".into()), home());
        assert_eq!(paths.log_file, PathBuf::from("/tmp/notes.log"));
        assert_eq!(paths.enabled_flag, data_dir.join("logging_enabled"));

        let paths = LogPaths::new(data_dir, Some(OsString::new()), home());
        assert_eq!(
            paths.log_file,
            PathBuf::from("/Users/ada/Library/Logs/Stickies/debug.log")
        );

        let paths = LogPaths::new(data_dir, None, None);
        assert_eq!(paths.log_file, data_dir.join("logs/debug.log"));
    }

    #[test]
    fn enabled_choice_is_remembered_in_the_data_dir() {
        let data_dir = std::env::temp_dir().join(format!(
            "stickies-logger-{}",
            uuid::Uuid::new_v4().simple()
        ));
        let paths = LogPaths::new(&data_dir, None, None);
        assert!(!paths.remembered_enabled());

        paths.remember_enabled(true);
        assert!(paths.remembered_enabled());
        paths.remember_enabled(false);
        assert!(!paths.remembered_enabled());

        let _ = std::fs::remove_dir_all(&data_dir);
    }

    #[test]
    fn level_names() {
        assert!(matches!(parse_level("Info"), Some(LEVEL::Info)));
        assert!(matches!(parse_level("warning"), Some(LEVEL::Warn)));
        assert!(parse_level("loud").is_none());
    }
}
