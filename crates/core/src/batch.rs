//! Long-running batch operations: importing a directory tree and rehashing
//! the whole catalog. Hashing runs in parallel; the database writes stay
//! per-item transactions so a cancellation or crash loses at most the item
//! in flight.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::info;
use walkdir::WalkDir;

use crate::domain::{self, MediaChange};
use crate::error::{Error, Result};
use crate::hash;
use crate::store::Store;

/// Progress callback events. Emitted between items, never mid-transaction.
pub enum BatchProgress {
    Start { total: usize },
    Imported { path: PathBuf },
    Skipped { path: PathBuf },
    Rehashed { path: PathBuf },
    Cancelled { done: usize },
    Complete { done: usize },
}

type ProgressFn<'a> = &'a mut dyn FnMut(BatchProgress);

/// Walk a directory tree and catalog every supported image or video file not
/// already in the store. The cancel flag is checked between items; items
/// already committed stay committed.
pub fn import_directory(
    store: &Store,
    dir: &std::path::Path,
    cancel: &AtomicBool,
    mut progress: Option<ProgressFn<'_>>,
) -> Result<usize> {
    if !dir.exists() {
        return Err(Error::MissingFile(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(Error::IllegalArgument(format!(
            "not a directory: {}",
            dir.display()
        )));
    }

    let mut candidates: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| domain::is_supported_image(path) || domain::is_video(path))
        .collect();
    candidates.sort();
    candidates.retain(|path| !matches!(store.media_by_path(path), Ok(Some(_))));

    if let Some(cb) = progress.as_mut() {
        cb(BatchProgress::Start {
            total: candidates.len(),
        });
    }

    // Hash everything up front in parallel; the insert loop below is pure
    // bookkeeping and stays cheap between cancellation checks.
    let hashed: Vec<(PathBuf, Option<hash::PerceptualHash>)> = candidates
        .into_par_iter()
        .map(|path| {
            let file_hash = hash::compute(&path);
            (path, file_hash)
        })
        .collect();

    let mut imported = 0usize;
    for (path, file_hash) in hashed {
        if cancel.load(Ordering::Relaxed) {
            if let Some(cb) = progress.as_mut() {
                cb(BatchProgress::Cancelled { done: imported });
            }
            info!(imported, "import cancelled");
            return Ok(imported);
        }
        let mut change = MediaChange::new(&path);
        change.hash = file_hash;
        match store.insert_media(change) {
            Ok(_) => {
                imported += 1;
                if let Some(cb) = progress.as_mut() {
                    cb(BatchProgress::Imported { path });
                }
            }
            // raced with another writer; the file is catalogued either way
            Err(Error::FileAlreadyExists(_)) => {
                if let Some(cb) = progress.as_mut() {
                    cb(BatchProgress::Skipped { path });
                }
            }
            Err(err) => return Err(err),
        }
    }

    if let Some(cb) = progress.as_mut() {
        cb(BatchProgress::Complete { done: imported });
    }
    info!(imported, dir = %dir.display(), "import complete");
    Ok(imported)
}

/// Recompute the hash of every stored item from its current file contents.
/// Files that are missing or no longer decodable end up unhashed.
pub fn rehash_all(
    store: &Store,
    cancel: &AtomicBool,
    mut progress: Option<ProgressFn<'_>>,
) -> Result<usize> {
    let records = store.all_media()?;
    if let Some(cb) = progress.as_mut() {
        cb(BatchProgress::Start {
            total: records.len(),
        });
    }

    let rehashed: Vec<(i64, PathBuf, Option<hash::PerceptualHash>)> = records
        .into_par_iter()
        .map(|record| {
            let file_hash = hash::compute(&record.path);
            (record.id, record.path, file_hash)
        })
        .collect();

    let mut done = 0usize;
    for (id, path, file_hash) in rehashed {
        if cancel.load(Ordering::Relaxed) {
            if let Some(cb) = progress.as_mut() {
                cb(BatchProgress::Cancelled { done });
            }
            info!(done, "rehash cancelled");
            return Ok(done);
        }
        store.update_media_hash(id, file_hash)?;
        done += 1;
        if let Some(cb) = progress.as_mut() {
            cb(BatchProgress::Rehashed { path });
        }
    }

    if let Some(cb) = progress.as_mut() {
        cb(BatchProgress::Complete { done });
    }
    info!(done, "rehash complete");
    Ok(done)
}
