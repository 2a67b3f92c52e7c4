//! Natural merge sorter.

use log;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::record::Record;
use crate::tape::{Tape, TapeMode};

/// Block size used when the builder is not given one.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Working directory or working file creation error.
    WorkDir(io::Error),
    /// Tape I/O error.
    Io(io::Error),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            SortError::WorkDir(err) => err,
            SortError::Io(err) => err,
        })
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::WorkDir(err) => write!(f, "working files not created: {}", err),
            SortError::Io(err) => write!(f, "tape I/O operation failed: {}", err),
        }
    }
}

impl From<io::Error> for SortError {
    fn from(err: io::Error) -> Self {
        SortError::Io(err)
    }
}

/// Immutable summary of one completed sort.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortStats {
    /// Number of phases performed, counting the final distribution-only one.
    pub phases: u32,
    /// Physical block reads across all three tapes.
    pub physical_reads: u64,
    /// Physical block writes across all three tapes.
    pub physical_writes: u64,
    /// Wall time of the whole sort.
    pub elapsed: Duration,
}

/// Natural merge sorter builder. Provides methods for [`NaturalMergeSorter`]
/// initialization.
#[derive(Default)]
pub struct NaturalMergeSorterBuilder {
    /// Block size for every tape's buffers.
    block_size: Option<usize>,
    /// Directory to be used to store sorter-managed working tapes.
    work_dir: Option<Box<Path>>,
    /// Explicit paths for the two working tapes.
    work_paths: Option<(PathBuf, PathBuf)>,
}

impl NaturalMergeSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        NaturalMergeSorterBuilder::default()
    }

    /// Sets the block size used for every tape's read and write buffers.
    pub fn with_block_size(mut self, block_size: usize) -> NaturalMergeSorterBuilder {
        self.block_size = Some(block_size);
        return self;
    }

    /// Sets explicit paths for the two working tapes so that independent
    /// sorts can run against distinct file sets without collision.
    pub fn with_work_paths(
        mut self,
        left: impl Into<PathBuf>,
        right: impl Into<PathBuf>,
    ) -> NaturalMergeSorterBuilder {
        self.work_paths = Some((left.into(), right.into()));
        return self;
    }

    /// Sets the directory sorter-managed working tapes are created in.
    /// Ignored when explicit working paths are set.
    pub fn with_work_dir(mut self, path: &Path) -> NaturalMergeSorterBuilder {
        self.work_dir = Some(path.into());
        return self;
    }

    /// Builds a [`NaturalMergeSorter`] instance using provided configuration.
    ///
    /// Without explicit working paths the working tapes are placed in a
    /// temporary directory that lives as long as the sorter.
    pub fn build(self) -> Result<NaturalMergeSorter, SortError> {
        let block_size = self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE);

        let (work_paths, work_dir) = match self.work_paths {
            Some(paths) => (paths, None),
            None => {
                let tmp_dir = init_work_directory(self.work_dir.as_deref())?;
                let paths = (
                    tmp_dir.path().join("tape_b.bin"),
                    tmp_dir.path().join("tape_c.bin"),
                );
                (paths, Some(tmp_dir))
            }
        };

        return Ok(NaturalMergeSorter {
            block_size,
            work_paths,
            _work_dir: work_dir,
        });
    }
}

fn init_work_directory(work_dir: Option<&Path>) -> Result<tempfile::TempDir, SortError> {
    let tmp_dir = if let Some(work_dir) = work_dir {
        tempfile::tempdir_in(work_dir)
    } else {
        tempfile::tempdir()
    }
    .map_err(|err| SortError::WorkDir(err))?;

    log::info!("using {} for working tapes", tmp_dir.path().display());

    return Ok(tmp_dir);
}

/// Three-tape natural merge sorter.
///
/// Sorts a tape in place by alternating distribution and merge phases over
/// one primary and two working tapes until a single ascending run spans the
/// primary. Memory use is bounded by two block buffers per tape regardless
/// of how many records are processed.
pub struct NaturalMergeSorter {
    /// Block size for every tape's buffers.
    block_size: usize,
    /// Paths of the two working tapes.
    work_paths: (PathBuf, PathBuf),
    /// Keeps sorter-managed working files alive for the sorter's lifetime.
    _work_dir: Option<tempfile::TempDir>,
}

impl NaturalMergeSorter {
    /// Sorts the tape at `input` in place.
    ///
    /// Each phase distributes the primary tape's runs across the two working
    /// tapes and, unless at most one run remains, merges them back. Tapes are
    /// handed between phases only through the backing storage: every phase
    /// resets and closes them around its own pass.
    ///
    /// # Arguments
    /// * `input` - Path of the tape to be sorted (the primary tape)
    pub fn sort(&self, input: impl AsRef<Path>) -> Result<SortStats, SortError> {
        let input = input.as_ref();
        let start = Instant::now();

        log::info!("sorting {}", input.display());

        // role-indexed: 0 = primary, 1 = left working, 2 = right working
        let mut tapes = [
            Tape::new(input, self.block_size)?,
            Tape::new(&self.work_paths.0, self.block_size)?,
            Tape::new(&self.work_paths.1, self.block_size)?,
        ];

        let mut phases: u32 = 0;

        loop {
            phases += 1;

            log::debug!("phase {}: distribution", phases);

            let [primary, left, right] = &mut tapes;
            primary.reset(TapeMode::Read)?;
            left.reset(TapeMode::ReadWrite)?;
            right.reset(TapeMode::ReadWrite)?;
            left.truncate()?;
            right.truncate()?;

            let runs = distribute(primary, left, right)?;

            for tape in tapes.iter_mut() {
                tape.close()?;
            }

            log::debug!("distributed {} runs", runs);

            if runs <= 1 {
                break;
            }

            log::debug!("phase {}: merge", phases);

            let [primary, left, right] = &mut tapes;
            primary.reset(TapeMode::ReadWrite)?;
            primary.truncate()?;
            left.reset(TapeMode::Read)?;
            right.reset(TapeMode::Read)?;

            merge(primary, left, right)?;

            for tape in tapes.iter_mut() {
                tape.close()?;
            }
        }

        // the tape instances live across every phase, so their counters hold
        // the totals for the whole sort
        let stats = SortStats {
            phases,
            physical_reads: tapes.iter().map(|tape| tape.physical_reads()).sum(),
            physical_writes: tapes.iter().map(|tape| tape.physical_writes()).sum(),
            elapsed: start.elapsed(),
        };

        log::info!(
            "sorted {} in {} phases, {} physical reads, {} physical writes",
            input.display(),
            stats.phases,
            stats.physical_reads,
            stats.physical_writes
        );

        return Ok(stats);
    }
}

/// Distributes the input tape's runs alternately across the two output
/// tapes. Returns the number of runs encountered: 0 for an empty input,
/// otherwise one more than the number of descents.
fn distribute(input: &mut Tape, left: &mut Tape, right: &mut Tape) -> io::Result<u64> {
    let mut runs = 0;
    let mut last: Option<Record> = None;
    let mut to_left = true;

    while let Some(record) = input.read_record()? {
        // a key strictly below the previous one ends the current run
        if matches!(last, Some(prev) if record < prev) {
            to_left = !to_left;
            runs += 1;
        }

        let output = if to_left { &mut *left } else { &mut *right };
        output.write_record(&record)?;
        last = Some(record);
    }

    Ok(if last.is_none() { 0 } else { runs + 1 })
}

/// Merges two tapes of concatenated ascending runs into one fully ascending
/// output, one pair of corresponding runs at a time. Equal keys favor the
/// left input.
fn merge(output: &mut Tape, left: &mut Tape, right: &mut Tape) -> io::Result<()> {
    let mut r1 = left.read_record()?;
    let mut r2 = right.read_record()?;
    let mut last1: Option<Record> = None;
    let mut last2: Option<Record> = None;

    while r1.is_some() || r2.is_some() {
        // interleave while both current runs keep ascending
        while let (Some(a), Some(b)) = (r1, r2) {
            let run1_ended = matches!(last1, Some(prev) if a < prev);
            let run2_ended = matches!(last2, Some(prev) if b < prev);
            if run1_ended || run2_ended {
                break;
            }

            if a <= b {
                output.write_record(&a)?;
                last1 = Some(a);
                r1 = left.read_record()?;
            } else {
                output.write_record(&b)?;
                last2 = Some(b);
                r2 = right.read_record()?;
            }
        }

        // drain whichever input has not yet ended its current run
        while let Some(a) = r1 {
            if matches!(last1, Some(prev) if a < prev) {
                break;
            }
            output.write_record(&a)?;
            last1 = Some(a);
            r1 = left.read_record()?;
        }

        while let Some(b) = r2 {
            if matches!(last2, Some(prev) if b < prev) {
                break;
            }
            output.write_record(&b)?;
            last2 = Some(b);
            r2 = right.read_record()?;
        }

        last1 = None;
        last2 = None;
    }

    Ok(())
}
