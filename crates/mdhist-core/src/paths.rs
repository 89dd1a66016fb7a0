//! Mapping from (history root, logical path, snapshot id) to blob and
//! index locations
//!
//! Layout:
//! - `{root}/{dir}/{file}.{id}.md` for blobs
//! - `{root}/{dir}/{file}.index.json` for the per-file index

use std::path::{Path, PathBuf};

use crate::snapshot::is_valid_snapshot_id;
use crate::{Error, Result};

pub const INDEX_SUFFIX: &str = ".index.json";
pub const BLOB_EXTENSION: &str = "md";

/// Normalize a logical path to `/` separators without empty or `.` segments.
///
/// `..` segments and paths without a file name are rejected so that a
/// logical path always stays inside the history root.
pub fn normalize_logical_path(path: &str) -> Result<String> {
    let unified = path.replace('\\', "/");
    let mut segments = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(Error::InvalidPath(path.to_string())),
            s => segments.push(s),
        }
    }

    if segments.is_empty() || unified.ends_with('/') {
        return Err(Error::InvalidPath(path.to_string()));
    }

    Ok(segments.join("/"))
}

/// Split a logical path into its directory segments and file name
fn split_logical(path: &str) -> Result<(Vec<String>, String)> {
    let normalized = normalize_logical_path(path)?;
    let mut segments: Vec<String> = normalized.split('/').map(String::from).collect();
    let file_name = segments
        .pop()
        .ok_or_else(|| Error::InvalidPath(path.to_string()))?;
    Ok((segments, file_name))
}

fn join_under(root: &Path, dirs: &[String], leaf: String) -> PathBuf {
    let mut out = root.to_path_buf();
    for dir in dirs {
        out.push(dir);
    }
    out.push(leaf);
    out
}

pub fn build_snapshot_path(root: &Path, file_path: &str, snapshot_id: &str) -> Result<PathBuf> {
    if !is_valid_snapshot_id(snapshot_id) {
        return Err(Error::InvalidSnapshotId(snapshot_id.to_string()));
    }
    let (dirs, file_name) = split_logical(file_path)?;
    Ok(join_under(
        root,
        &dirs,
        format!("{}.{}.{}", file_name, snapshot_id, BLOB_EXTENSION),
    ))
}

pub fn build_index_path(root: &Path, file_path: &str) -> Result<PathBuf> {
    let (dirs, file_name) = split_logical(file_path)?;
    Ok(join_under(root, &dirs, format!("{}{}", file_name, INDEX_SUFFIX)))
}

pub fn is_index_file_name(name: &str) -> bool {
    name.len() > INDEX_SUFFIX.len() && name.ends_with(INDEX_SUFFIX)
}
