// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bus compaction: archive the prefix every cursor has passed.
//!
//! Guarded by an exclusive lock file; a lock older than five minutes is
//! presumed abandoned and overwritten. Safe to call from any process.

use crate::cursor::Cursor;
use crate::{BusError, BusPaths};
use pilot_core::clock::Clock;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Locks older than this are stale and forcibly overwritten.
pub const LOCK_STALE_MS: u64 = 5 * 60 * 1000;

/// What one compaction pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactReport {
    pub archived_bytes: u64,
    pub remaining_bytes: u64,
    pub cursors_rebased: usize,
}

/// Exclusive compaction lock; removed on drop.
struct CompactLock {
    path: PathBuf,
}

impl CompactLock {
    fn acquire<C: Clock>(paths: &BusPaths, clock: &C) -> Result<Self, BusError> {
        let path = paths.compact_lock();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        for attempt in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{} {}", std::process::id(), clock.now_iso());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt == 0 && lock_is_stale(&path, clock) {
                        tracing::warn!("overwriting stale compaction lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    return Err(BusError::LockContention);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(BusError::LockContention)
    }
}

impl Drop for CompactLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn lock_is_stale<C: Clock>(path: &std::path::Path, clock: &C) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return true;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    let age = modified
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| clock.epoch_ms().saturating_sub(d.as_millis() as u64))
        .unwrap_or(0);
    age > LOCK_STALE_MS
}

/// Compact the bus: move the prefix `[0, min_offset)` — where `min_offset`
/// is the minimum cursor position — into a dated archive, rewrite the bus
/// with the suffix, and rebase every cursor.
pub fn compact<C: Clock>(paths: &BusPaths, clock: &C) -> Result<CompactReport, BusError> {
    let _lock = CompactLock::acquire(paths, clock)?;

    let bus_path = paths.bus_file();
    let mut file = match File::open(&bus_path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(CompactReport {
                archived_bytes: 0,
                remaining_bytes: 0,
                cursors_rebased: 0,
            });
        }
        Err(e) => return Err(e.into()),
    };
    let len = file.metadata()?.len();

    let cursors = Cursor::load_all(paths);
    if cursors.is_empty() {
        // No readers registered; nothing is provably consumed.
        return Ok(CompactReport {
            archived_bytes: 0,
            remaining_bytes: len,
            cursors_rebased: 0,
        });
    }
    let min_offset = cursors
        .iter()
        .map(|c| c.byte_offset.min(len))
        .min()
        .unwrap_or(0);
    if min_offset == 0 {
        return Ok(CompactReport {
            archived_bytes: 0,
            remaining_bytes: len,
            cursors_rebased: 0,
        });
    }

    // Archive the consumed prefix
    let mut prefix = vec![0u8; min_offset as usize];
    file.read_exact(&mut prefix)?;
    let archive_path = paths.archive_file(&clock.today());
    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut archive = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&archive_path)?;
    archive.write_all(&prefix)?;
    archive.sync_all()?;

    // Rewrite the bus from the suffix
    let tmp = bus_path.with_extension("tmp");
    let mut suffix = Vec::with_capacity((len - min_offset) as usize);
    file.read_to_end(&mut suffix)?;
    {
        let mut out = File::create(&tmp)?;
        out.write_all(&suffix)?;
        // Appends can land while we copy; carry them into the new file so
        // the rename loses nothing.
        let grown = fs::metadata(&bus_path)?.len();
        if grown > len {
            let mut reopened = File::open(&bus_path)?;
            reopened.seek(SeekFrom::Start(len))?;
            let mut extra = Vec::with_capacity((grown - len) as usize);
            reopened.read_to_end(&mut extra)?;
            out.write_all(&extra)?;
        }
        out.sync_all()?;
    }
    fs::rename(&tmp, &bus_path)?;

    // Rebase every cursor by the archived prefix
    let mut rebased = 0;
    for mut cursor in cursors {
        cursor.byte_offset = cursor.byte_offset.saturating_sub(min_offset);
        cursor.save(paths, clock)?;
        rebased += 1;
    }

    let remaining = fs::metadata(&bus_path)?.len();
    tracing::info!(
        archived = min_offset,
        remaining,
        cursors = rebased,
        "bus compacted"
    );

    Ok(CompactReport {
        archived_bytes: min_offset,
        remaining_bytes: remaining,
        cursors_rebased: rebased,
    })
}

#[cfg(test)]
#[path = "compact_tests.rs"]
mod tests;
