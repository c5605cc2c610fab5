//! Log file location and rotation.
//!
//! Each run gets its own uniquely named file under the per-user log
//! directory for the application. Old runs are pruned so the directory
//! never holds more than [`MAX_LOG_FILES`] files.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::Local;

/// How many log files to keep around, counting the one about to be created.
pub const MAX_LOG_FILES: usize = 5;

/// Resolve a unique log file path for this run.
///
/// The directory is `<user log dir>/<appname>`; the file name is
/// `<appname>-<YYYYmmdd-HHMMSS.micros>.log`, unique per run so existing
/// files are never renamed. Files exceeding the rotation limit are removed
/// oldest-first (lexicographic order matches chronological order here).
pub fn log_filepath(appname: &str) -> io::Result<PathBuf> {
    let basedir = log_dir(appname);
    fs::create_dir_all(&basedir)?;

    let filename = format!("{appname}-{}.log", Local::now().format("%Y%m%d-%H%M%S%.6f"));

    // The limit includes the about-to-be-created file, hence the -1.
    let mut present: Vec<PathBuf> = fs::read_dir(&basedir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_run_log(path, appname))
        .collect();
    present.sort();
    let limit = MAX_LOG_FILES - 1;
    if present.len() > limit {
        let excess = present.len() - limit;
        for old in &present[..excess] {
            let _ = fs::remove_file(old);
        }
    }

    Ok(basedir.join(filename))
}

fn log_dir(appname: &str) -> PathBuf {
    // Per-user state directory where available (Linux), otherwise the
    // local data directory (macOS/Windows), otherwise the cwd as a last
    // resort for stripped-down environments.
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(appname)
        .join("log")
}

fn is_run_log(path: &std::path::Path, appname: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(&format!("{appname}-")) && name.ends_with(".log")
}
