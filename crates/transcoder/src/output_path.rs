//! Collision-free output file naming.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// The un-disambiguated output path: `<source dir>/<prefix><source name>`.
pub fn candidate_for(source: &Path, prefix: &str) -> PathBuf {
    let mut name = OsString::from(prefix);
    if let Some(file_name) = source.file_name() {
        name.push(file_name);
    }
    match source.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Return `candidate` if nothing exists there, else the first free
/// `<stem> (n).<ext>` for n = 1, 2, …
///
/// Only checks existence; a file created between this call and the encoder
/// opening its output is not detected.
pub fn resolve(candidate: &Path) -> PathBuf {
    if !candidate.exists() {
        return candidate.to_path_buf();
    }

    let dir = candidate.parent().unwrap_or_else(|| Path::new(""));
    let stem = candidate.file_stem().unwrap_or_default();
    let ext = candidate.extension();

    let mut n: u64 = 1;
    loop {
        let mut name = stem.to_os_string();
        name.push(format!(" ({n})"));
        if let Some(ext) = ext {
            name.push(".");
            name.push(ext);
        }
        let path = dir.join(name);
        if !path.exists() {
            return path;
        }
        n += 1;
    }
}
