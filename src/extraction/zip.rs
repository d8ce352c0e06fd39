use crate::error::{Error, Result};
use crate::types::ExtractionTarget;
use std::collections::{BTreeSet, HashMap};
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// Archive extractor for in-memory ZIP bundles
pub struct ZipExtractor;

impl ZipExtractor {
    /// Unpack `bytes` into `target.directory`
    ///
    /// Entries are written in archive order. Each file lands through a temp file in
    /// its destination directory, so a failing entry never leaves a torn file behind;
    /// files written by earlier entries stay in place.
    pub fn extract(bytes: &[u8], target: &ExtractionTarget) -> Result<BTreeSet<PathBuf>> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
            Error::ExtractionFailed {
                path: target.directory.clone(),
                reason: format!("failed to read ZIP archive: {}", e),
            }
        })?;

        let selected = Self::select_entries(&mut archive, target)?;

        debug!(
            directory = ?target.directory,
            entries = selected.len(),
            overwrite = target.overwrite,
            "extracting ZIP bundle"
        );

        let root = std::fs::create_dir_all(&target.directory)
            .and_then(|()| std::fs::canonicalize(&target.directory))
            .map_err(|e| Error::ExtractionFailed {
                path: target.directory.clone(),
                reason: format!("failed to create destination: {}", e),
            })?;

        let mut written = BTreeSet::new();
        for index in selected {
            let file = archive.by_index(index).map_err(|e| Error::ExtractionFailed {
                path: target.directory.clone(),
                reason: format!("failed to read ZIP entry #{}: {}", index, e),
            })?;

            if let Some(relative) = Self::extract_entry(file, &root, target.overwrite)? {
                written.insert(target.directory.join(relative));
            }
        }

        info!(
            directory = ?target.directory,
            extracted_count = written.len(),
            "ZIP extraction successful"
        );

        Ok(written)
    }

    /// Indices of the entries to extract, in archive order
    fn select_entries(archive: &mut Archive<'_>, target: &ExtractionTarget) -> Result<Vec<usize>> {
        let Some(wanted) = &target.entries else {
            return Ok((0..archive.len()).collect());
        };

        let mut by_name = HashMap::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index).map_err(|e| Error::ExtractionFailed {
                path: target.directory.clone(),
                reason: format!("failed to read ZIP entry #{}: {}", index, e),
            })?;
            by_name.insert(entry.name().to_string(), index);
        }

        let mut indices = Vec::with_capacity(wanted.len());
        for name in wanted {
            match by_name.get(name.as_str()) {
                Some(&index) => indices.push(index),
                None => {
                    return Err(Error::ExtractionFailed {
                        path: PathBuf::from(name),
                        reason: "entry not found in archive".to_string(),
                    });
                }
            }
        }
        indices.sort_unstable();
        indices.dedup();
        Ok(indices)
    }

    /// Extract a single entry, returning its path relative to the root for files
    fn extract_entry(
        mut file: zip::read::ZipFile<'_>,
        root: &Path,
        overwrite: bool,
    ) -> Result<Option<PathBuf>> {
        let relative = match file.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                warn!(entry = file.name(), "rejecting entry with unsafe path");
                return Err(Error::ExtractionFailed {
                    path: PathBuf::from(file.name()),
                    reason: "entry path escapes the target directory".to_string(),
                });
            }
        };
        if relative.as_os_str().is_empty() {
            return Ok(None);
        }

        if file.is_dir() {
            create_dirs_within(root, &relative, &relative)?;
            return Ok(None);
        }

        let file_name = relative.file_name().ok_or_else(|| Error::ExtractionFailed {
            path: relative.clone(),
            reason: "entry has no file name".to_string(),
        })?;
        let parent = match relative.parent() {
            Some(dirs) => create_dirs_within(root, dirs, &relative)?,
            None => root.to_path_buf(),
        };
        let dest = parent.join(file_name);

        match std::fs::symlink_metadata(&dest) {
            Ok(meta) if meta.is_dir() => {
                return Err(Error::ExtractionFailed {
                    path: relative,
                    reason: "a directory already exists at this path".to_string(),
                });
            }
            Ok(_) if !overwrite => {
                return Err(Error::ExtractionFailed {
                    path: relative,
                    reason: "file already exists and overwrite is disabled".to_string(),
                });
            }
            Ok(_) => debug!(path = ?relative, "replacing existing file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(entry_io_error(&relative, "failed to inspect destination", e)),
        }

        let mut staged = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| entry_io_error(&relative, "failed to create staging file", e))?;
        std::io::copy(&mut file, staged.as_file_mut())
            .map_err(|e| entry_io_error(&relative, "failed to extract file", e))?;
        staged
            .persist(&dest)
            .map_err(|e| entry_io_error(&relative, "failed to move file into place", e.error))?;

        debug!(path = ?relative, "extracted file");
        Ok(Some(relative))
    }
}

/// Create `dirs` under `root` one level at a time, returning the resolved innermost
/// directory
///
/// Every level is checked before the next one is created, so a symlink pointing out
/// of `root` is rejected before anything is made on the far side of it.
fn create_dirs_within(root: &Path, dirs: &Path, entry: &Path) -> Result<PathBuf> {
    let mut current = root.to_path_buf();
    for component in dirs.components() {
        let Component::Normal(name) = component else {
            continue;
        };
        let next = current.join(name);

        match std::fs::symlink_metadata(&next) {
            Ok(meta) if meta.file_type().is_symlink() => {
                current = ensure_within(root, &next, entry)?;
                if !current.is_dir() {
                    return Err(not_a_directory(entry));
                }
            }
            Ok(meta) if meta.is_dir() => current = next,
            Ok(_) => return Err(not_a_directory(entry)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match std::fs::create_dir(&next) {
                    Ok(()) => {}
                    // Raced with another writer; re-check what is there now
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                    Err(e) => {
                        return Err(entry_io_error(entry, "failed to create directory", e));
                    }
                }
                current = ensure_within(root, &next, entry)?;
            }
            Err(e) => return Err(entry_io_error(entry, "failed to inspect directory", e)),
        }
    }
    Ok(current)
}

fn not_a_directory(entry: &Path) -> Error {
    Error::ExtractionFailed {
        path: entry.to_path_buf(),
        reason: "a file is in the way of a parent directory".to_string(),
    }
}

fn entry_io_error(entry: &Path, action: &str, e: std::io::Error) -> Error {
    Error::ExtractionFailed {
        path: entry.to_path_buf(),
        reason: format!("{}: {}", action, e),
    }
}

/// Resolve `path` and make sure it did not leave `root` through a symlink
fn ensure_within(root: &Path, path: &Path, entry: &Path) -> Result<PathBuf> {
    let resolved = std::fs::canonicalize(path)
        .map_err(|e| entry_io_error(entry, "failed to resolve path", e))?;
    if resolved.starts_with(root) {
        Ok(resolved)
    } else {
        warn!(entry = ?entry, resolved = ?resolved, "entry resolves outside the target directory");
        Err(Error::ExtractionFailed {
            path: entry.to_path_buf(),
            reason: "entry path escapes the target directory".to_string(),
        })
    }
}
