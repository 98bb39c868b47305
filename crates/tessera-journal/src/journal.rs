use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tessera_types::{Chunk, Hash};
use tracing::{debug, info, warn};

use crate::error::{JournalError, Result};
use crate::index::{classify, IndexFile, IndexState, RecordLocation};
use crate::record::{read_frame, Frame, JournalRecord, RawRecord, RecordKind, RootRecord};

/// Journal file extension.
pub const JOURNAL_EXTENSION: &str = "jnl";

/// Journal index file extension.
pub const INDEX_EXTENSION: &str = "idx";

pub fn journal_file_name(identity: &Hash) -> String {
    format!("{identity}.{JOURNAL_EXTENSION}")
}

pub fn index_file_name(identity: &Hash) -> String {
    format!("{identity}.{INDEX_EXTENSION}")
}

/// Flush/sync strategy for appends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every record.
    EveryWrite,
    /// Flush to the OS on every record; `fsync` only on [`ChunkJournal::sync`].
    #[default]
    OnFlush,
}

/// Configuration for a [`ChunkJournal`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub sync_mode: SyncMode,
    /// Chunk records before the companion index is bootstrapped.
    pub index_threshold: u64,
    /// zstd level for chunk records.
    pub compression_level: i32,
    /// Root records kept in memory.
    pub reflog_limit: usize,
    /// Root records carried into a new journal when one is rotated.
    pub reflog_retention: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            index_threshold: 1024,
            compression_level: 1,
            reflog_limit: 100_000,
            reflog_retention: 128,
        }
    }
}

struct JournalInner {
    writer: BufWriter<File>,
    reader: File,
    /// Journal length in bytes.
    offset: u64,
    state: IndexState,
    /// Populated only while `state` is `Fresh`.
    chunks: HashMap<Hash, RecordLocation>,
    /// Every chunk hash in the journal, whatever the index state.
    known: HashSet<Hash>,
    chunk_count: u64,
    record_count: u64,
    roots: VecDeque<RootRecord>,
    /// Journal length covered by the index file on disk.
    persisted_len: Option<u64>,
    /// Set when a torn write could not be cut back off the file.
    unwritable: bool,
}

/// Append-only chunk journal.
///
/// Every `put` lands here first as a chunk record; root updates are root
/// records. Records are never rewritten. At open the journal is validated
/// front to back unless a fresh index covers it; a torn or invalid tail is
/// truncated back to the last good record.
pub struct ChunkJournal {
    identity: Hash,
    path: PathBuf,
    index_path: PathBuf,
    config: JournalConfig,
    inner: Mutex<JournalInner>,
    retired: AtomicBool,
}

/// Everything learned from one front-to-back pass.
struct ScanResult {
    valid_len: u64,
    chunks: HashMap<Hash, RecordLocation>,
    record_count: u64,
    roots: Vec<RootRecord>,
}

impl ChunkJournal {
    /// Open (or create) the journal named `identity` in `dir`.
    pub fn open(dir: &Path, identity: Hash, config: JournalConfig) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(journal_file_name(&identity));
        let index_path = dir.join(index_file_name(&identity));

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let reader = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let (state, loaded) = classify(&index_path, file_len);
        let mut inner = JournalInner {
            writer: BufWriter::new(file),
            reader,
            offset: file_len,
            state,
            chunks: HashMap::new(),
            known: HashSet::new(),
            chunk_count: 0,
            record_count: 0,
            roots: VecDeque::new(),
            persisted_len: None,
            unwritable: false,
        };

        match loaded {
            Some(index) => {
                inner.chunk_count = index.chunks.len() as u64;
                inner.record_count = index.record_count;
                inner.chunks = index.chunks.into_iter().collect();
                inner.known = inner.chunks.keys().copied().collect();
                inner.roots = index.roots.into_iter().collect();
                inner.persisted_len = Some(file_len);
                debug!(path = %path.display(), records = inner.record_count, "journal opened from fresh index");
            }
            None => {
                let scan = scan(&mut inner.reader, file_len)?;
                if scan.valid_len < file_len {
                    warn!(
                        path = %path.display(),
                        valid_len = scan.valid_len,
                        file_len,
                        "truncating invalid journal tail"
                    );
                    inner.writer.get_ref().set_len(scan.valid_len)?;
                    inner.offset = scan.valid_len;
                }
                inner.chunk_count = scan.chunks.len() as u64;
                inner.known = scan.chunks.keys().copied().collect();
                inner.record_count = scan.record_count;
                inner.roots = scan.roots.into_iter().collect();
                if inner.state == IndexState::Stale {
                    fs::remove_file(&index_path).or_else(ignore_not_found)?;
                    inner.state = IndexState::NoIndex;
                }
                if inner.chunk_count >= config.index_threshold {
                    inner.state = IndexState::Building;
                    inner.chunks = scan.chunks;
                    inner.state = IndexState::Fresh;
                    match persist_index(&index_path, &mut inner) {
                        Ok(()) => info!(path = %path.display(), chunks = inner.chunk_count, "journal index rebuilt"),
                        Err(e) => warn!(path = %path.display(), error = %e, "journal index rebuilt in memory only"),
                    }
                }
                debug!(path = %path.display(), records = inner.record_count, state = ?inner.state, "journal opened by scan");
            }
        }
        trim_roots(&mut inner.roots, config.reflog_limit);

        Ok(Self {
            identity,
            path,
            index_path,
            config,
            inner: Mutex::new(inner),
            retired: AtomicBool::new(false),
        })
    }

    pub fn identity(&self) -> Hash {
        self.identity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    pub fn state(&self) -> IndexState {
        self.lock().state
    }

    /// Journal length in bytes.
    pub fn len(&self) -> u64 {
        self.lock().offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn chunk_count(&self) -> u64 {
        self.lock().chunk_count
    }

    pub fn record_count(&self) -> u64 {
        self.lock().record_count
    }

    /// Append a chunk record. Returns `None` without writing if the journal
    /// already holds the chunk.
    pub fn append(&self, chunk: &Chunk) -> Result<Option<RecordLocation>> {
        if self.lock().known.contains(&chunk.hash()) {
            return Ok(None);
        }
        let frame = JournalRecord::Chunk(chunk.clone()).encode(self.config.compression_level)?;
        let mut inner = self.lock();
        if !inner.known.insert(chunk.hash()) {
            return Ok(None);
        }
        let location = match self.write_frame(&mut inner, &frame) {
            Ok(location) => location,
            Err(e) => {
                inner.known.remove(&chunk.hash());
                return Err(e);
            }
        };
        inner.chunk_count += 1;
        match inner.state {
            IndexState::Fresh => {
                inner.chunks.insert(chunk.hash(), location);
            }
            _ if inner.chunk_count >= self.config.index_threshold => {
                self.bootstrap_index(&mut inner);
            }
            _ => {}
        }
        debug!(hash = %chunk.hash(), offset = location.offset, len = location.len, "journal append");
        Ok(Some(location))
    }

    /// Append a root record.
    pub fn commit_root(&self, root: Hash) -> Result<RootRecord> {
        let record = RootRecord::now(root);
        self.append_root(record)?;
        Ok(record)
    }

    /// Append a root record with a given timestamp; used when carrying
    /// reflog entries into a rotated journal.
    pub fn append_root(&self, record: RootRecord) -> Result<()> {
        let frame = JournalRecord::Root(record).encode(self.config.compression_level)?;
        let mut inner = self.lock();
        self.write_frame(&mut inner, &frame)?;
        inner.roots.push_back(record);
        trim_roots(&mut inner.roots, self.config.reflog_limit);
        debug!(root = %record.root, "journal root");
        Ok(())
    }

    /// Read a chunk. Uses the index when fresh, otherwise scans.
    pub fn get(&self, hash: &Hash) -> Result<Option<Chunk>> {
        let mut inner = self.lock();
        if !inner.known.contains(hash) {
            return Ok(None);
        }
        let raw = match inner.state {
            IndexState::Fresh => match inner.chunks.get(hash).copied() {
                Some(location) => Some(read_at(&mut inner, location)?),
                None => None,
            },
            _ => find_by_scan(&mut inner, hash)?,
        };
        match raw.map(|r| r.decode()).transpose()? {
            Some(JournalRecord::Chunk(chunk)) => Ok(Some(chunk)),
            Some(JournalRecord::Root(_)) => Err(JournalError::Corrupt {
                offset: 0,
                reason: format!("index entry for {hash} points at a root record"),
            }),
            None => Ok(None),
        }
    }

    pub fn has(&self, hash: &Hash) -> bool {
        self.lock().known.contains(hash)
    }

    /// Every chunk hash in the journal, in append order.
    pub fn chunk_hashes(&self) -> Result<Vec<Hash>> {
        let mut inner = self.lock();
        if inner.state == IndexState::Fresh {
            let mut entries: Vec<(Hash, RecordLocation)> =
                inner.chunks.iter().map(|(h, l)| (*h, *l)).collect();
            entries.sort_by_key(|(_, l)| l.offset);
            return Ok(entries.into_iter().map(|(h, _)| h).collect());
        }
        let limit = inner.offset;
        let mut hashes = Vec::new();
        for_each_frame(&mut inner.reader, limit, |raw| {
            if let Some(h) = raw.chunk_hash() {
                hashes.push(h);
            }
            Ok(())
        })?;
        Ok(hashes)
    }

    /// Decode every chunk in append order in a single pass.
    pub fn visit_chunks(&self, mut visit: impl FnMut(Chunk)) -> Result<()> {
        let mut inner = self.lock();
        let limit = inner.offset;
        for_each_frame(&mut inner.reader, limit, |raw| {
            if raw.kind() == RecordKind::Chunk {
                if let JournalRecord::Chunk(chunk) = raw.decode()? {
                    visit(chunk);
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Root records in append order, newest last.
    pub fn roots(&self) -> Vec<RootRecord> {
        self.lock().roots.iter().copied().collect()
    }

    pub fn latest_root(&self) -> Option<RootRecord> {
        self.lock().roots.back().copied()
    }

    /// Flush and `fsync`, then bring the index file up to date.
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.writer.flush()?;
        inner.writer.get_ref().sync_all()?;
        if inner.state == IndexState::Fresh && inner.persisted_len != Some(inner.offset) {
            persist_index(&self.index_path, &mut inner)?;
        }
        Ok(())
    }

    /// Mark the journal as replaced. A retired journal no longer refreshes
    /// its index file on drop, so reclamation can remove both files.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JournalInner> {
        self.inner.lock().expect("journal mutex poisoned")
    }

    fn write_frame(&self, inner: &mut JournalInner, frame: &[u8]) -> Result<RecordLocation> {
        if inner.unwritable {
            return Err(JournalError::Unwritable(self.path.clone()));
        }
        let offset = inner.offset;
        if let Err(e) = write_synced(&mut inner.writer, frame, self.config.sync_mode) {
            self.roll_back(inner);
            return Err(e.into());
        }
        inner.offset += frame.len() as u64;
        inner.record_count += 1;
        Ok(RecordLocation {
            offset,
            len: frame.len() as u32,
        })
    }

    /// Drop a partly written frame: discard what is still buffered and cut
    /// the file back to the last whole record. If the file cannot be cut,
    /// later writes are refused.
    fn roll_back(&self, inner: &mut JournalInner) {
        let result = inner.writer.get_ref().try_clone().and_then(|file| {
            let torn = std::mem::replace(&mut inner.writer, BufWriter::new(file));
            let (file, _unwritten) = torn.into_parts();
            file.set_len(inner.offset)
        });
        match result {
            Ok(()) => warn!(path = %self.path.display(), offset = inner.offset, "rolled back torn journal write"),
            Err(e) => {
                inner.unwritable = true;
                warn!(path = %self.path.display(), error = %e, "journal rollback failed; refusing writes");
            }
        }
    }

    /// Build the in-memory index by scanning, then write it out. A failed
    /// scan leaves the journal unindexed and a failed write leaves the
    /// index in memory only; neither affects the records themselves.
    fn bootstrap_index(&self, inner: &mut JournalInner) {
        inner.state = IndexState::Building;
        let limit = inner.offset;
        match scan(&mut inner.reader, limit) {
            Ok(scan) => {
                inner.chunks = scan.chunks;
                inner.state = IndexState::Fresh;
                match persist_index(&self.index_path, inner) {
                    Ok(()) => info!(path = %self.path.display(), chunks = inner.chunk_count, "journal index bootstrapped"),
                    Err(e) => warn!(path = %self.path.display(), error = %e, "journal index kept in memory only"),
                }
            }
            Err(e) => {
                inner.chunks.clear();
                inner.state = IndexState::NoIndex;
                warn!(path = %self.path.display(), error = %e, "journal index bootstrap failed");
            }
        }
    }
}

impl Drop for ChunkJournal {
    fn drop(&mut self) {
        if self.is_retired() {
            return;
        }
        let Ok(inner) = self.inner.get_mut() else {
            return;
        };
        if let Err(e) = inner.writer.flush() {
            warn!(path = %self.path.display(), error = %e, "journal flush on drop failed");
            return;
        }
        if inner.state == IndexState::Fresh && inner.persisted_len != Some(inner.offset) {
            if let Err(e) = persist_index(&self.index_path, inner) {
                warn!(path = %self.path.display(), error = %e, "journal index persist on drop failed");
            }
        }
    }
}

impl fmt::Debug for ChunkJournal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkJournal")
            .field("identity", &self.identity)
            .field("path", &self.path)
            .finish()
    }
}

fn persist_index(path: &Path, inner: &mut JournalInner) -> Result<()> {
    IndexFile::new(
        inner.offset,
        inner.record_count,
        &inner.chunks,
        inner.roots.iter().copied(),
    )
    .persist(path)?;
    inner.persisted_len = Some(inner.offset);
    Ok(())
}

fn write_synced(writer: &mut BufWriter<File>, frame: &[u8], mode: SyncMode) -> std::io::Result<()> {
    writer.write_all(frame)?;
    writer.flush()?;
    if mode == SyncMode::EveryWrite {
        writer.get_ref().sync_all()?;
    }
    Ok(())
}

fn trim_roots(roots: &mut VecDeque<RootRecord>, limit: usize) {
    while roots.len() > limit {
        roots.pop_front();
    }
}

fn ignore_not_found(e: std::io::Error) -> std::io::Result<()> {
    if e.kind() == std::io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(e)
    }
}

fn read_at(inner: &mut JournalInner, location: RecordLocation) -> Result<RawRecord> {
    inner.reader.seek(SeekFrom::Start(location.offset))?;
    let limit = location.offset + location.len as u64;
    match read_frame(&mut inner.reader, location.offset, limit)? {
        Frame::Record(raw) => Ok(raw),
        Frame::End | Frame::Torn(_) | Frame::Invalid { .. } => Err(JournalError::Corrupt {
            offset: location.offset,
            reason: "indexed record is unreadable".into(),
        }),
    }
}

fn find_by_scan(inner: &mut JournalInner, hash: &Hash) -> Result<Option<RawRecord>> {
    let limit = inner.offset;
    let mut found = None;
    for_each_frame(&mut inner.reader, limit, |raw| {
        if found.is_none() && raw.chunk_hash().as_ref() == Some(hash) {
            found = Some(raw);
        }
        Ok(())
    })?;
    Ok(found)
}

/// Visit every valid frame up to `limit`, stopping at the first bad one.
/// Returns the offset just past the last valid frame.
pub(crate) fn for_each_frame(
    file: &mut File,
    limit: u64,
    mut visit: impl FnMut(RawRecord) -> Result<()>,
) -> Result<u64> {
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(file);
    let mut offset = 0u64;
    loop {
        match read_frame(&mut reader, offset, limit)? {
            Frame::Record(raw) => {
                offset += raw.len as u64;
                visit(raw)?;
            }
            Frame::End => break,
            Frame::Torn(reason) | Frame::Invalid { reason, .. } => {
                warn!(offset, reason, "journal scan stopped");
                break;
            }
        }
    }
    Ok(offset)
}

fn scan(file: &mut File, limit: u64) -> Result<ScanResult> {
    let mut chunks = HashMap::new();
    let mut roots = Vec::new();
    let mut record_count = 0u64;
    let valid_len = for_each_frame(file, limit, |raw| {
        record_count += 1;
        match raw.kind() {
            RecordKind::Chunk => {
                if let Some(hash) = raw.chunk_hash() {
                    chunks.entry(hash).or_insert(RecordLocation {
                        offset: raw.offset,
                        len: raw.len,
                    });
                }
            }
            RecordKind::Root => {
                if let JournalRecord::Root(root) = raw.decode()? {
                    roots.push(root);
                }
            }
        }
        Ok(())
    })?;
    Ok(ScanResult {
        valid_len,
        chunks,
        record_count,
        roots,
    })
}
