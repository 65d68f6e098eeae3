//! Small filesystem helpers shared by the repository modules.

use gitmap_core::{GitMapError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(GitMapError::io(parent))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(GitMapError::io(parent))?;
    tmp.write_all(data).map_err(GitMapError::io(path))?;
    tmp.flush().map_err(GitMapError::io(path))?;
    tmp.persist(path)
        .map_err(|e| GitMapError::io(path)(e.error))?;
    Ok(())
}

/// Pretty-printed JSON, written atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Read and parse a JSON file. `what` names the file in the error.
pub fn read_json<T: DeserializeOwned>(path: &Path, what: &'static str) -> Result<T> {
    let raw = fs::read(path).map_err(GitMapError::io(path))?;
    serde_json::from_slice(&raw).map_err(|source| GitMapError::Corrupt {
        what,
        path: path.to_path_buf(),
        source,
    })
}

/// Contents of a ref file, trimmed. `None` when the file is missing or empty.
pub fn read_ref(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GitMapError::io(path)(e)),
    }
}

pub fn write_ref(path: &Path, value: Option<&str>) -> Result<()> {
    write_atomic(path, value.unwrap_or_default().as_bytes())
}

/// Names of every file under `dir`, relative and `/`-joined, sorted.
pub fn list_ref_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    if dir.is_dir() {
        collect(dir, dir, &mut names)?;
    }
    names.sort();
    Ok(names)
}

fn collect(base: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(GitMapError::io(dir))? {
        let path = entry.map_err(GitMapError::io(dir))?.path();
        if path.is_dir() {
            collect(base, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(base) {
            let name: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(name.join("/"));
        }
    }
    Ok(())
}

/// Remove a ref file and any directories it leaves empty, up to `stop`.
pub fn remove_ref(path: &Path, stop: &Path) -> Result<()> {
    fs::remove_file(path).map_err(GitMapError::io(path))?;
    let mut dir: Option<PathBuf> = path.parent().map(Path::to_path_buf);
    while let Some(d) = dir {
        if d == stop || !d.starts_with(stop) {
            break;
        }
        // Stops at the first non-empty directory.
        if fs::remove_dir(&d).is_err() {
            break;
        }
        dir = d.parent().map(Path::to_path_buf);
    }
    Ok(())
}
