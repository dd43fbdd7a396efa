use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

pub const DEBUG_ENV: &str = "SUBTUBE_DEBUG";
pub const DEBUG_LOG_ENV: &str = "SUBTUBE_DEBUG_LOG";

fn debug_enabled() -> bool {
    static FLAG: OnceCell<bool> = OnceCell::new();
    *FLAG.get_or_init(|| {
        std::env::var(DEBUG_ENV)
            .map(|val| is_truthy(&val))
            .unwrap_or(false)
    })
}

fn is_truthy(val: &str) -> bool {
    let trimmed = val.trim();
    !(trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("0")
        || trimmed.eq_ignore_ascii_case("false")
        || trimmed.eq_ignore_ascii_case("no")
        || trimmed.eq_ignore_ascii_case("off"))
}

/// `SUBTUBE_DEBUG_LOG` wins; otherwise the log sits next to the cache.
fn log_path(explicit: Option<String>, data_dir: Option<PathBuf>) -> Option<PathBuf> {
    match explicit.filter(|path| !path.trim().is_empty()) {
        Some(path) => Some(PathBuf::from(path)),
        None => data_dir.map(|dir| dir.join("subtube").join("debug.log")),
    }
}

fn open_log(path: PathBuf) -> Option<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

fn debug_writer() -> Option<&'static Mutex<File>> {
    static WRITER: OnceCell<Option<Mutex<File>>> = OnceCell::new();
    WRITER
        .get_or_init(|| {
            log_path(std::env::var(DEBUG_LOG_ENV).ok(), dirs::data_dir())
                .and_then(open_log)
                .map(Mutex::new)
        })
        .as_ref()
}

/// Appends a timestamped line to the debug log when `SUBTUBE_DEBUG` is set.
///
/// Lines go to stderr only when no log file can be opened.
pub fn debug_log(message: impl AsRef<str>) {
    if !debug_enabled() {
        return;
    }
    let line = format!(
        "{} {}",
        Local::now().format("%H:%M:%S%.3f"),
        message.as_ref()
    );
    if let Some(writer) = debug_writer() {
        let mut file = writer.lock();
        let _ = writeln!(file, "{line}");
        return;
    }
    eprintln!("{line}");
}
