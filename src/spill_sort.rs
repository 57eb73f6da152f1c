//! Out-of-core sort for fixed-width records
//!
//! Records are buffered in memory up to a fixed count. Each full buffer is sorted and spilled to a
//! temporary chunk file. Once input is complete, all chunks and the final in-memory buffer are
//! combined in a k-way merge which streams records back in sorted order.
//!
//! Chunk files are deleted as soon as the merge has consumed them. All chunk files are kept in a
//! private temporary directory owned by the sorter, so any chunk left over from an abandoned or
//! failed merge is removed when the sorter or its merge iterator is dropped.
//!

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use camino::Utf8Path;
use log::{debug, info};
use simple_error::{SimpleError, SimpleResult, bail};
use tempfile::TempDir;

/// Buffer size for reading and writing chunk files
const CHUNK_BUFFER_SIZE: usize = 64 * 1024;

/// A record type which can be sorted by `ExternalSorter`
///
/// Every record is encoded to exactly `ENCODED_LEN` bytes in spill chunks, so the chunk files need
/// no framing.
///
pub trait SpillRecord: Sized {
    type Key: Ord;

    const ENCODED_LEN: usize;

    fn sort_key(&self) -> Self::Key;

    /// Write the record into `buf`, which is exactly `ENCODED_LEN` bytes
    fn encode(&self, buf: &mut [u8]);

    /// Read a record from `buf`, which is exactly `ENCODED_LEN` bytes
    fn decode(buf: &[u8]) -> Self;
}

#[derive(Clone, Debug, Default)]
pub struct SortStats {
    /// Total records added to the sorter
    pub total_records: u64,

    /// Number of chunk files spilled to disk
    pub chunks_written: usize,
}

/// Sort an unbounded record stream with bounded memory
///
/// Records are added with `add`, then `finish` closes the sorter and returns the sorted stream.
/// Records with equal keys are returned in the order they were added.
///
pub struct ExternalSorter<T: SpillRecord> {
    max_records_in_ram: usize,
    buffer: Vec<T>,
    spill_dir: TempDir,
    chunk_paths: Vec<PathBuf>,
    stats: SortStats,
}

impl<T: SpillRecord> ExternalSorter<T> {
    /// # Arguments
    /// * `max_records_in_ram` - Number of records buffered before a chunk is spilled to disk
    /// * `tmp_dir` - Parent directory of the private spill directory, the system temporary
    ///   directory is used if None
    ///
    pub fn new(max_records_in_ram: usize, tmp_dir: Option<&Utf8Path>) -> SimpleResult<Self> {
        if max_records_in_ram == 0 {
            bail!("Sorter must be able to hold at least one record in memory");
        }
        let spill_dir = create_spill_dir(tmp_dir)?;
        debug!("Created sort spill directory '{}'", spill_dir.path().display());
        Ok(Self {
            max_records_in_ram,
            buffer: Vec::new(),
            spill_dir,
            chunk_paths: Vec::new(),
            stats: SortStats::default(),
        })
    }

    pub fn add(&mut self, record: T) -> SimpleResult<()> {
        self.buffer.push(record);
        self.stats.total_records += 1;
        if self.buffer.len() >= self.max_records_in_ram {
            self.spill()?;
        }
        Ok(())
    }

    /// Sort the in-memory buffer and write it out as a new chunk file
    fn spill(&mut self) -> SimpleResult<()> {
        let chunk_path = self
            .spill_dir
            .path()
            .join(format!("chunk_{:06}.bin", self.chunk_paths.len()));

        self.buffer.sort_by_key(|x| x.sort_key());
        write_chunk(&chunk_path, &self.buffer)?;

        debug!(
            "Spilled {} records to sort chunk '{}'",
            self.buffer.len(),
            chunk_path.display()
        );

        self.buffer.clear();
        self.chunk_paths.push(chunk_path);
        self.stats.chunks_written += 1;
        Ok(())
    }

    /// Signal that no more records will be added, and return the fully sorted record stream
    ///
    pub fn finish(self) -> SimpleResult<SortedRecords<T>> {
        let Self {
            mut buffer,
            spill_dir,
            chunk_paths,
            stats,
            ..
        } = self;

        info!(
            "Merging {} sorted records from {} spilled chunks and {} buffered records",
            stats.total_records,
            chunk_paths.len(),
            buffer.len()
        );

        buffer.sort_by_key(|x| x.sort_key());

        // The in-memory buffer is the last merge source, so that it loses ties with every chunk
        // spilled before it.
        let mut sources = Vec::with_capacity(chunk_paths.len() + 1);
        for chunk_path in chunk_paths {
            sources.push(MergeSource::Chunk(ChunkReader::new(chunk_path)?));
        }
        sources.push(MergeSource::Buffer(buffer.into_iter()));

        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (source_index, source) in sources.iter_mut().enumerate() {
            if let Some(record) = source.next()? {
                heap.push(Reverse(HeapEntry::new(record, source_index)));
            }
        }

        Ok(SortedRecords {
            sources,
            heap,
            is_failed: false,
            stats,
            _spill_dir: spill_dir,
        })
    }
}

fn create_spill_dir(tmp_dir: Option<&Utf8Path>) -> SimpleResult<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(concat!(env!("CARGO_PKG_NAME"), "_sort_"));
    let result = match tmp_dir {
        Some(tmp_dir) => builder.tempdir_in(tmp_dir),
        None => builder.tempdir(),
    };
    result.map_err(|e| SimpleError::with("Failed to create temporary sort directory", e))
}

fn write_chunk<T: SpillRecord>(chunk_path: &Path, records: &[T]) -> SimpleResult<()> {
    let write_error = |e: io::Error| {
        SimpleError::with(
            &format!("Failed to write sort chunk file '{}'", chunk_path.display()),
            e,
        )
    };

    let file = File::create(chunk_path).map_err(write_error)?;
    let mut writer = BufWriter::with_capacity(CHUNK_BUFFER_SIZE, file);
    let mut buf = vec![0u8; T::ENCODED_LEN];
    for record in records {
        record.encode(&mut buf);
        writer.write_all(&buf).map_err(write_error)?;
    }
    writer.flush().map_err(write_error)?;
    Ok(())
}

/// Fill `buf` with the next encoded record
///
/// Returns false at a clean end of file. A partial record at the end of the file is an error.
///
fn read_record_bytes(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    if filled == 0 {
        Ok(false)
    } else if filled < buf.len() {
        Err(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("truncated record, read {filled} of {} bytes", buf.len()),
        ))
    } else {
        Ok(true)
    }
}

/// Reader for one sorted chunk file
///
/// The chunk file is closed and deleted as soon as its last record has been read.
///
struct ChunkReader<T> {
    chunk_path: PathBuf,
    reader: Option<BufReader<File>>,
    buf: Vec<u8>,
    _phantom: PhantomData<T>,
}

impl<T: SpillRecord> ChunkReader<T> {
    fn new(chunk_path: PathBuf) -> SimpleResult<Self> {
        let file = File::open(&chunk_path).map_err(|e| {
            SimpleError::with(
                &format!("Failed to open sort chunk file '{}'", chunk_path.display()),
                e,
            )
        })?;
        Ok(Self {
            chunk_path,
            reader: Some(BufReader::with_capacity(CHUNK_BUFFER_SIZE, file)),
            buf: vec![0u8; T::ENCODED_LEN],
            _phantom: PhantomData,
        })
    }

    fn next(&mut self) -> SimpleResult<Option<T>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let is_record = read_record_bytes(reader, &mut self.buf).map_err(|e| {
            SimpleError::with(
                &format!(
                    "Failed to read sort chunk file '{}'",
                    self.chunk_path.display()
                ),
                e,
            )
        })?;

        if is_record {
            Ok(Some(T::decode(&self.buf)))
        } else {
            self.reader = None;
            std::fs::remove_file(&self.chunk_path).map_err(|e| {
                SimpleError::with(
                    &format!(
                        "Failed to remove sort chunk file '{}'",
                        self.chunk_path.display()
                    ),
                    e,
                )
            })?;
            Ok(None)
        }
    }
}

enum MergeSource<T> {
    Chunk(ChunkReader<T>),
    Buffer(std::vec::IntoIter<T>),
}

impl<T: SpillRecord> MergeSource<T> {
    fn next(&mut self) -> SimpleResult<Option<T>> {
        match self {
            MergeSource::Chunk(x) => x.next(),
            MergeSource::Buffer(x) => Ok(x.next()),
        }
    }
}

/// Entry in the merge heap
///
/// Ties on the record key are broken by source index so that the merge is stable.
///
struct HeapEntry<T: SpillRecord> {
    key: T::Key,
    source_index: usize,
    record: T,
}

impl<T: SpillRecord> HeapEntry<T> {
    fn new(record: T, source_index: usize) -> Self {
        Self {
            key: record.sort_key(),
            source_index,
            record,
        }
    }
}

impl<T: SpillRecord> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: SpillRecord> Eq for HeapEntry<T> {}

impl<T: SpillRecord> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: SpillRecord> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then(self.source_index.cmp(&other.source_index))
    }
}

/// Globally sorted record stream produced by `ExternalSorter::finish`
///
/// Iteration stops after the first read error.
///
pub struct SortedRecords<T: SpillRecord> {
    sources: Vec<MergeSource<T>>,
    heap: BinaryHeap<Reverse<HeapEntry<T>>>,
    is_failed: bool,
    stats: SortStats,

    /// Held so that the spill directory is removed only after all chunk readers are closed
    _spill_dir: TempDir,
}

impl<T: SpillRecord> SortedRecords<T> {
    pub fn stats(&self) -> &SortStats {
        &self.stats
    }
}

impl<T: SpillRecord> Iterator for SortedRecords<T> {
    type Item = SimpleResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_failed {
            return None;
        }
        let Reverse(entry) = self.heap.pop()?;
        match self.sources[entry.source_index].next() {
            Ok(Some(record)) => {
                self.heap
                    .push(Reverse(HeapEntry::new(record, entry.source_index)));
            }
            Ok(None) => {}
            Err(e) => {
                self.is_failed = true;
                self.heap.clear();
                return Some(Err(e));
            }
        }
        Some(Ok(entry.record))
    }
}
