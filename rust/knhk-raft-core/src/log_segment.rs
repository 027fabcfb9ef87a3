//! Segmented, append-only, crash-safe log storage.
//!
//! A `LogSegment` owns one contiguous range of log indices backed by a pair
//! of files: a data file holding length-prefixed records and an index file
//! holding a fixed-width position index rebuilt into memory at `open()`.
//! Truncation is tombstone-based (`removeAfter`); reclaiming space is a
//! separate, crash-safe `compact` operation (see [`LogSegment::compact`]).

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, info, warn};

use crate::error::{LogError, LogResult};

/// Size in bytes of a data record's fixed header
/// (`stored_index: u64, status: u8, length: u32`).
pub const RECORD_HEADER_LEN: u64 = 13;

/// Size in bytes of a fixed-width index record
/// (`stored_index: u64, data_file_offset: u64, length: u32`).
pub const INDEX_RECORD_LEN: u64 = 20;

const STATUS_DELETED: u8 = 0;
const STATUS_ACTIVE: u8 = 1;

/// One entry in the in-memory position index, mirrored 1:1 on disk in the
/// `.index` file.
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    stored_index: u64,
    data_file_offset: u64,
    length: u32,
    active: bool,
}

struct SegmentPaths {
    data: PathBuf,
    index: PathBuf,
}

impl SegmentPaths {
    fn for_suffix(base: &Path, segment: u64, suffix: &str) -> Self {
        let stem = base
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = base.parent().unwrap_or_else(|| Path::new("."));
        Self {
            data: dir.join(format!("{stem}-{segment}{suffix}.log")),
            index: dir.join(format!("{stem}-{segment}{suffix}.index")),
        }
    }

    fn live(base: &Path, segment: u64) -> Self {
        Self::for_suffix(base, segment, "")
    }

    fn tmp(base: &Path, segment: u64) -> Self {
        Self::for_suffix(base, segment, ".tmp")
    }

    fn history(base: &Path, segment: u64) -> Self {
        Self::for_suffix(base, segment, ".history")
    }

    fn exists(&self) -> bool {
        self.data.exists() || self.index.exists()
    }
}

/// A single append-only log segment: a contiguous run of indices, two
/// on-disk files, and an in-memory index rebuilt at open time.
///
/// Single-threaded by contract (see the crate's concurrency model): no
/// internal locking guards the file handles or the in-memory index.
pub struct LogSegment {
    base: PathBuf,
    segment: u64,
    data_file: Option<File>,
    index_file: Option<File>,
    index: Vec<IndexEntry>,
    first_index: u64,
    last_index: Option<u64>,
    size: u64,
    flush_on_write: bool,
}

impl LogSegment {
    /// Construct a segment handle for parent log base `base` and segment
    /// number `segment`. Does not touch the filesystem; call [`Self::open`]
    /// to create or recover the underlying files.
    pub fn new(base: impl Into<PathBuf>, segment: u64, flush_on_write: bool) -> Self {
        Self {
            base: base.into(),
            segment,
            data_file: None,
            index_file: None,
            index: Vec::new(),
            first_index: segment,
            last_index: None,
            size: 0,
            flush_on_write,
        }
    }

    /// Open (creating if absent) the underlying data and index files,
    /// recovering from an interrupted compaction and rebuilding the
    /// in-memory index. Fails with `IllegalState` if already open.
    pub fn open(&mut self) -> LogResult<()> {
        if self.data_file.is_some() {
            return Err(LogError::IllegalState("segment is already open".into()));
        }

        let history = SegmentPaths::history(&self.base, self.segment);
        if history.exists() {
            warn!(segment = self.segment, "restoring from interrupted compaction");
            self.restore_history(&history)?;
        }

        let live = SegmentPaths::live(&self.base, self.segment);
        let data_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&live.data)?;
        let index_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&live.index)?;

        self.data_file = Some(data_file);
        self.index_file = Some(index_file);
        self.rebuild_index()?;
        info!(
            segment = self.segment,
            first_index = self.first_index,
            last_index = ?self.last_index,
            "segment opened"
        );
        Ok(())
    }

    fn restore_history(&self, history: &SegmentPaths) -> LogResult<()> {
        let live = SegmentPaths::live(&self.base, self.segment);
        fs::copy(&history.data, &live.data)?;
        fs::copy(&history.index, &live.index)?;
        fs::remove_file(&history.data)?;
        fs::remove_file(&history.index)?;
        Ok(())
    }

    fn rebuild_index(&mut self) -> LogResult<()> {
        self.index.clear();
        self.last_index = None;

        let index_file = self.index_file_mut()?;
        index_file.seek(SeekFrom::Start(0))?;
        let file_len = index_file.metadata()?.len();
        let mut read = 0u64;
        let mut entries = Vec::new();
        while read + INDEX_RECORD_LEN <= file_len {
            let stored_index = index_file.read_u64::<LittleEndian>()?;
            let data_file_offset = index_file.read_u64::<LittleEndian>()?;
            let length = index_file.read_u32::<LittleEndian>()?;
            entries.push((stored_index, data_file_offset, length));
            read += INDEX_RECORD_LEN;
        }

        if let Some((first, _, _)) = entries.first() {
            self.first_index = *first;
        }

        let data_file = self.data_file_mut()?;
        let mut size = 0u64;
        let mut positions: HashMap<u64, usize> = HashMap::new();
        for (stored_index, data_file_offset, length) in entries {
            data_file.seek(SeekFrom::Start(data_file_offset + 8))?;
            let status = data_file.read_u8()?;
            let entry = IndexEntry {
                stored_index,
                data_file_offset,
                length,
                active: status == STATUS_ACTIVE,
            };

            // A `stored_index` can appear more than once on disk: a
            // suffix truncation below `first_index` tombstones every
            // record and clears the in-memory index without erasing the
            // bytes, so a later append is free to reuse that same index
            // value at a new file offset. Keep only the last occurrence
            // (the most recently written one) so reads see current state
            // rather than the stale record it superseded.
            match positions.get(&stored_index) {
                Some(&pos) => self.index[pos] = entry,
                None => {
                    positions.insert(stored_index, self.index.len());
                    self.index.push(entry);
                }
            }
            size += u64::from(length) + RECORD_HEADER_LEN;
        }
        self.size = size;
        self.last_index = self.index.last().map(|e| e.stored_index);
        Ok(())
    }

    fn data_file_mut(&mut self) -> LogResult<&mut File> {
        self.data_file
            .as_mut()
            .ok_or_else(|| LogError::IllegalState("segment is not open".into()))
    }

    fn index_file_mut(&mut self) -> LogResult<&mut File> {
        self.index_file
            .as_mut()
            .ok_or_else(|| LogError::IllegalState("segment is not open".into()))
    }

    /// First index this segment currently holds.
    pub fn first_index(&self) -> u64 {
        self.first_index
    }

    /// Last index this segment currently holds, or `None` if empty.
    pub fn last_index(&self) -> Option<u64> {
        self.last_index
    }

    /// Total bytes of header + payload across every record this segment has
    /// ever written (active or tombstoned).
    pub fn size(&self) -> u64 {
        self.size
    }

    /// `true` iff this segment holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Append `payload` as a new ACTIVE record, returning its stored index.
    pub fn append(&mut self, payload: &[u8]) -> LogResult<u64> {
        let stored_index = match self.last_index {
            Some(last) => last + 1,
            None => self.first_index,
        };
        self.append_at(stored_index, payload)?;
        Ok(stored_index)
    }

    fn append_at(&mut self, stored_index: u64, payload: &[u8]) -> LogResult<()> {
        let length = payload.len() as u32;
        let data_file = self.data_file_mut()?;
        let data_file_offset = data_file.seek(SeekFrom::End(0))?;
        data_file.write_u64::<LittleEndian>(stored_index)?;
        data_file.write_u8(STATUS_ACTIVE)?;
        data_file.write_u32::<LittleEndian>(length)?;
        data_file.write_all(payload)?;

        let index_file = self.index_file_mut()?;
        index_file.seek(SeekFrom::End(0))?;
        index_file.write_u64::<LittleEndian>(stored_index)?;
        index_file.write_u64::<LittleEndian>(data_file_offset)?;
        index_file.write_u32::<LittleEndian>(length)?;

        if self.flush_on_write {
            self.flush(false)?;
        }

        self.index.push(IndexEntry {
            stored_index,
            data_file_offset,
            length,
            active: true,
        });
        self.last_index = Some(stored_index);
        self.size += u64::from(length) + RECORD_HEADER_LEN;
        debug!(stored_index, "appended record");
        Ok(())
    }

    /// Append each entry of `entries` in order. Atomic per-entry only: a
    /// mid-batch I/O failure leaves earlier entries durably written.
    pub fn append_batch(&mut self, entries: &[Vec<u8>]) -> LogResult<Vec<u64>> {
        let mut indices = Vec::with_capacity(entries.len());
        for entry in entries {
            indices.push(self.append(entry)?);
        }
        Ok(indices)
    }

    /// Read the record at `index`. Returns `Ok(None)` if the record was
    /// tombstoned by `remove_after`. Returns `MissingEntries` if the next
    /// stored index on or after `index` is strictly greater — a gap in
    /// the log.
    ///
    /// `self.index` stays sorted by `stored_index` (appends only grow it
    /// at the end, compaction rebuilds it in ascending order, and
    /// `rebuild_index` updates duplicate indices in place rather than
    /// inserting out of order), so a binary search finds the exact entry
    /// regardless of where compaction or a cleared prefix has shifted
    /// `first_index`. Position arithmetic (`index - first_index`) is not
    /// safe here: after `compact` rewrites the segment, array position
    /// `0` is `first_index` only for the entry actually written there,
    /// not for every later `index - first_index` offset, since the array
    /// no longer contains a dense run starting at `first_index`.
    pub fn get(&mut self, index: u64) -> LogResult<Option<Vec<u8>>> {
        match self.index.binary_search_by_key(&index, |e| e.stored_index) {
            Ok(pos) => {
                let entry = self.index[pos];
                if !entry.active {
                    return Ok(None);
                }
                self.read_payload(&entry)
            }
            Err(insertion_point) => {
                if let Some(entry) = self.index.get(insertion_point) {
                    if entry.stored_index > index {
                        return Err(LogError::MissingEntries {
                            sought: index,
                            found: entry.stored_index,
                        });
                    }
                }
                Ok(None)
            }
        }
    }

    fn read_payload(&mut self, entry: &IndexEntry) -> LogResult<Option<Vec<u8>>> {
        let data_file = self.data_file_mut()?;
        data_file.seek(SeekFrom::Start(entry.data_file_offset + RECORD_HEADER_LEN))?;
        let mut buf = vec![0u8; entry.length as usize];
        data_file.read_exact(&mut buf)?;
        Ok(Some(buf))
    }

    /// Collect every ACTIVE record with stored index in `[from, to]`,
    /// preserving index order and skipping tombstoned holes.
    pub fn get_range(&mut self, from: u64, to: u64) -> LogResult<Vec<Vec<u8>>> {
        let entries: Vec<IndexEntry> = self
            .index
            .iter()
            .copied()
            .filter(|e| e.active && e.stored_index >= from && e.stored_index <= to)
            .collect();

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(bytes) = self.read_payload(&entry)? {
                out.push(bytes);
            }
        }
        Ok(out)
    }

    /// Tombstone every record with stored index `> index`, and set
    /// `last_index` to `index`. If `index < first_index`, clears the
    /// segment entirely (no record survives).
    pub fn remove_after(&mut self, index: u64) -> LogResult<()> {
        if index < self.first_index {
            for entry in &mut self.index {
                entry.active = false;
            }
            self.rewrite_statuses()?;
            // Drop every in-memory entry; the next append starts a fresh
            // run at `first_index` again. The tombstoned bytes are left in
            // place on disk (no physical erasure), so a later append can
            // end up reusing a `stored_index` that is still physically
            // present earlier in the file as a DELETED record — harmless
            // in-memory (this vector no longer references it), and
            // `rebuild_index` resolves the on-disk duplicate by keeping
            // whichever occurrence was written last if the segment is
            // ever reopened.
            self.index.clear();
            self.last_index = None;
            debug!(index, "cleared segment, index below first_index");
            return Ok(());
        }

        let mut changed = false;
        for entry in &mut self.index {
            if entry.stored_index > index {
                entry.active = false;
                changed = true;
            }
        }
        if changed {
            self.rewrite_statuses()?;
        }
        self.last_index = Some(index);
        debug!(index, "removed entries after index");
        Ok(())
    }

    fn rewrite_statuses(&mut self) -> LogResult<()> {
        let updates: Vec<(u64, bool)> = self.index.iter().map(|e| (e.data_file_offset, e.active)).collect();
        let data_file = self.data_file_mut()?;
        for (offset, active) in updates {
            data_file.seek(SeekFrom::Start(offset + 8))?;
            data_file.write_u8(if active { STATUS_ACTIVE } else { STATUS_DELETED })?;
        }
        Ok(())
    }

    /// Reclaim the prefix `[first_index, index)`, optionally replacing the
    /// entry at `index` with `replacement`. Crash-safe: survives a failure
    /// at any step via the history-file recovery rule enforced in
    /// [`Self::open`].
    pub fn compact(&mut self, index: u64, replacement: Option<&[u8]>) -> LogResult<()> {
        let last = self.last_index.unwrap_or(self.first_index);
        if index < self.first_index || index > last {
            return Err(LogError::IllegalState(format!(
                "compact index {index} out of range [{}, {last}]",
                self.first_index
            )));
        }
        if index == self.first_index && replacement.is_none() {
            return Ok(());
        }

        let tmp = SegmentPaths::tmp(&self.base, self.segment);
        let mut tmp_data = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp.data)?;
        let mut tmp_index = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp.index)?;

        let mut new_entries = Vec::new();

        if let Some(payload) = replacement {
            let offset = Self::write_record(&mut tmp_data, index, payload)?;
            Self::write_index_record(&mut tmp_index, index, offset, payload.len() as u32)?;
            new_entries.push(IndexEntry {
                stored_index: index,
                data_file_offset: offset,
                length: payload.len() as u32,
                active: true,
            });
        }

        let carry: Vec<IndexEntry> = self
            .index
            .iter()
            .copied()
            .filter(|e| e.active && e.stored_index > index)
            .collect();
        for entry in carry {
            let bytes = self
                .read_payload(&entry)?
                .expect("active entry must have a readable payload");
            let offset = Self::write_record(&mut tmp_data, entry.stored_index, &bytes)?;
            Self::write_index_record(&mut tmp_index, entry.stored_index, offset, entry.length)?;
            new_entries.push(IndexEntry {
                stored_index: entry.stored_index,
                data_file_offset: offset,
                length: entry.length,
                active: true,
            });
        }
        tmp_data.sync_all()?;
        tmp_index.sync_all()?;

        self.data_file = None;
        self.index_file = None;

        let live = SegmentPaths::live(&self.base, self.segment);
        let history = SegmentPaths::history(&self.base, self.segment);
        fs::copy(&live.data, &history.data)?;
        fs::copy(&live.index, &history.index)?;

        fs::rename(&tmp.data, &live.data)?;
        fs::rename(&tmp.index, &live.index)?;

        fs::remove_file(&history.data)?;
        fs::remove_file(&history.index)?;

        let data_file = OpenOptions::new().read(true).write(true).open(&live.data)?;
        let index_file = OpenOptions::new().read(true).write(true).open(&live.index)?;
        self.data_file = Some(data_file);
        self.index_file = Some(index_file);

        self.first_index = index;
        self.index = new_entries;
        self.last_index = self.index.last().map(|e| e.stored_index);
        self.size = self
            .index
            .iter()
            .map(|e| u64::from(e.length) + RECORD_HEADER_LEN)
            .sum();
        info!(segment = self.segment, first_index = self.first_index, "compaction complete");
        Ok(())
    }

    fn write_record(file: &mut File, stored_index: u64, payload: &[u8]) -> LogResult<u64> {
        let offset = file.seek(SeekFrom::End(0))?;
        file.write_u64::<LittleEndian>(stored_index)?;
        file.write_u8(STATUS_ACTIVE)?;
        file.write_u32::<LittleEndian>(payload.len() as u32)?;
        file.write_all(payload)?;
        Ok(offset)
    }

    fn write_index_record(file: &mut File, stored_index: u64, offset: u64, length: u32) -> LogResult<()> {
        file.seek(SeekFrom::End(0))?;
        file.write_u64::<LittleEndian>(stored_index)?;
        file.write_u64::<LittleEndian>(offset)?;
        file.write_u32::<LittleEndian>(length)?;
        Ok(())
    }

    /// Flush the underlying file handles if `force` or this segment was
    /// constructed with `flush_on_write == true`.
    pub fn flush(&mut self, force: bool) -> LogResult<()> {
        if !force && !self.flush_on_write {
            return Ok(());
        }
        self.data_file_mut()?.flush()?;
        self.index_file_mut()?.flush()?;
        Ok(())
    }

    /// Close the underlying file handles. Idempotent.
    pub fn close(&mut self) -> LogResult<()> {
        if let Some(mut f) = self.data_file.take() {
            f.flush()?;
        }
        if let Some(mut f) = self.index_file.take() {
            f.flush()?;
        }
        Ok(())
    }

    /// Close (if open) and delete the underlying files from disk.
    pub fn delete(mut self) -> LogResult<()> {
        self.close()?;
        let live = SegmentPaths::live(&self.base, self.segment);
        if live.data.exists() {
            fs::remove_file(&live.data)?;
        }
        if live.index.exists() {
            fs::remove_file(&live.index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn opened(dir: &Path, segment: u64, flush_on_write: bool) -> LogSegment {
        let mut seg = LogSegment::new(dir.join("base"), segment, flush_on_write);
        seg.open().unwrap();
        seg
    }

    // Scenario D
    #[test]
    fn scenario_d_append_remove_after_reappend() {
        let dir = tempdir().unwrap();
        let mut seg = opened(dir.path(), 0, false);

        let indices = seg
            .append_batch(&[b"A".to_vec(), b"B".to_vec(), b"C".to_vec()])
            .unwrap();
        assert_eq!(indices, vec![0, 1, 2]);

        seg.remove_after(0).unwrap();
        assert_eq!(seg.get(1).unwrap(), None);
        assert_eq!(seg.get(0).unwrap(), Some(b"A".to_vec()));
        assert_eq!(seg.last_index(), Some(0));

        let next = seg.append(b"D").unwrap();
        assert_eq!(next, 1);
        assert_eq!(seg.get(1).unwrap(), Some(b"D".to_vec()));
    }

    // Scenario E
    #[test]
    fn scenario_e_compact_with_replacement() {
        let dir = tempdir().unwrap();
        let mut seg = LogSegment::new(dir.path().join("base"), 5, false);
        seg.open().unwrap();
        for b in [b"e5".to_vec(), b"e6".to_vec(), b"e7".to_vec(), b"e8".to_vec(), b"e9".to_vec(), b"e10".to_vec()] {
            seg.append(&b).unwrap();
        }
        assert_eq!(seg.first_index(), 5);
        assert_eq!(seg.last_index(), Some(10));

        seg.compact(7, Some(b"X")).unwrap();
        assert_eq!(seg.first_index(), 7);
        assert_eq!(seg.get(7).unwrap(), Some(b"X".to_vec()));
        assert_eq!(seg.get(8).unwrap(), Some(b"e8".to_vec()));
        assert_eq!(seg.get(9).unwrap(), Some(b"e9".to_vec()));
        assert_eq!(seg.get(10).unwrap(), Some(b"e10".to_vec()));
        assert_eq!(seg.get(6).unwrap(), None);
    }

    // Scenario F
    #[test]
    fn scenario_f_crash_between_history_and_rename_recovers() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base");
        {
            let mut seg = LogSegment::new(&base, 5, false);
            seg.open().unwrap();
            for b in [b"e5".to_vec(), b"e6".to_vec(), b"e7".to_vec(), b"e8".to_vec(), b"e9".to_vec(), b"e10".to_vec()] {
                seg.append(&b).unwrap();
            }
        }

        // Simulate "crash after history files are written but before temp
        // files are renamed": write history snapshots from the live files
        // and leave the live files untouched, as if step 6 ran and step 7
        // never did.
        let live = SegmentPaths::live(&base, 5);
        let history = SegmentPaths::history(&base, 5);
        fs::copy(&live.data, &history.data).unwrap();
        fs::copy(&live.index, &history.index).unwrap();

        let mut seg = LogSegment::new(&base, 5, false);
        seg.open().unwrap();
        assert!(!history.data.exists());
        assert!(!history.index.exists());
        assert_eq!(seg.first_index(), 5);
        assert_eq!(seg.get(7).unwrap(), Some(b"e7".to_vec()));
        assert_eq!(seg.get(10).unwrap(), Some(b"e10".to_vec()));
    }

    #[test]
    fn read_after_write_matches_byte_for_byte() {
        let dir = tempdir().unwrap();
        let mut seg = opened(dir.path(), 0, true);
        let idx = seg.append(b"hello world").unwrap();
        assert_eq!(seg.get(idx).unwrap(), Some(b"hello world".to_vec()));
    }

    #[test]
    fn get_range_preserves_order_over_a_span() {
        let dir = tempdir().unwrap();
        let mut seg = opened(dir.path(), 0, false);
        seg.append_batch(&[b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()])
            .unwrap();
        let range = seg.get_range(1, 2).unwrap();
        assert_eq!(range, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn get_range_excludes_entries_tombstoned_by_remove_after() {
        let dir = tempdir().unwrap();
        let mut seg = opened(dir.path(), 0, false);
        seg.append_batch(&[b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()])
            .unwrap();
        seg.remove_after(1).unwrap();
        let range = seg.get_range(0, 3).unwrap();
        assert_eq!(range, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn opening_an_open_segment_is_illegal_state() {
        let dir = tempdir().unwrap();
        let mut seg = LogSegment::new(dir.path().join("base"), 0, false);
        seg.open().unwrap();
        let err = seg.open().unwrap_err();
        assert!(matches!(err, LogError::IllegalState(_)));
    }

    #[test]
    fn recovers_first_and_last_index_on_reopen() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base");
        {
            let mut seg = LogSegment::new(&base, 3, false);
            seg.open().unwrap();
            seg.append_batch(&[b"x".to_vec(), b"y".to_vec()]).unwrap();
        }
        let mut seg = LogSegment::new(&base, 3, false);
        seg.open().unwrap();
        assert_eq!(seg.first_index(), 3);
        assert_eq!(seg.last_index(), Some(4));
        assert_eq!(seg.get(4).unwrap(), Some(b"y".to_vec()));
    }

    #[test]
    fn compact_without_replacement_preserves_reads_of_the_surviving_suffix() {
        let dir = tempdir().unwrap();
        let mut seg = LogSegment::new(dir.path().join("base"), 5, false);
        seg.open().unwrap();
        for b in [b"e5".to_vec(), b"e6".to_vec(), b"e7".to_vec(), b"e8".to_vec(), b"e9".to_vec(), b"e10".to_vec()] {
            seg.append(&b).unwrap();
        }

        seg.compact(7, None).unwrap();

        assert_eq!(seg.first_index(), 7);
        assert_eq!(seg.get(8).unwrap(), Some(b"e8".to_vec()));
        assert_eq!(seg.get(9).unwrap(), Some(b"e9".to_vec()));
        assert_eq!(seg.get(10).unwrap(), Some(b"e10".to_vec()));
    }

    #[test]
    fn reappending_an_index_cleared_by_remove_after_survives_a_reopen() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base");
        {
            let mut seg = LogSegment::new(&base, 5, false);
            seg.open().unwrap();
            seg.append_batch(&[b"e5".to_vec(), b"e6".to_vec(), b"e7".to_vec()])
                .unwrap();
            seg.remove_after(3).unwrap();
            let idx = seg.append(b"Z").unwrap();
            assert_eq!(idx, 5, "first append after a full clear reuses first_index");
        }

        let mut seg = LogSegment::new(&base, 5, false);
        seg.open().unwrap();
        assert_eq!(
            seg.get(5).unwrap(),
            Some(b"Z".to_vec()),
            "the newer record at a reused index must win over the stale tombstoned one"
        );
    }

    #[test]
    fn is_empty_reflects_zero_size() {
        let dir = tempdir().unwrap();
        let mut seg = opened(dir.path(), 0, false);
        assert!(seg.is_empty());
        seg.append(b"x").unwrap();
        assert!(!seg.is_empty());
    }

    #[test]
    fn compact_at_first_index_with_no_replacement_is_noop() {
        let dir = tempdir().unwrap();
        let mut seg = opened(dir.path(), 0, false);
        seg.append_batch(&[b"a".to_vec(), b"b".to_vec()]).unwrap();
        seg.compact(0, None).unwrap();
        assert_eq!(seg.first_index(), 0);
        assert_eq!(seg.get(0).unwrap(), Some(b"a".to_vec()));
    }
}
