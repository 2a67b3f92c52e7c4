//! `tape-sort` simulates external sorting of fixed-size records under a severe
//! memory constraint. Data lives on three sequential, block-buffered storage
//! streams ("tapes") that may only be rewound and scanned forward, and a
//! natural merge sort alternates distribution and merge phases over them until
//! a single ascending run spans the whole primary tape. Every physical block
//! transfer is counted, so the true I/O cost of the algorithm can be measured
//! independently of record granularity. For more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `tape-sort` models the following:
//!
//! * **Fixed-width records:**
//!   five signed 32-bit fields per record, 20 bytes on tape, ordered by a
//!   derived floating-point key that is recomputed on decode and never stored.
//! * **Tape semantics:**
//!   each tape owns one block-sized read buffer and one block-sized write
//!   buffer; rewinding is the only repositioning, and the physical-operation
//!   counters move only on actual block refills and flushes.
//! * **Natural merge:**
//!   pre-existing ascending runs are exploited rather than forcing fixed-size
//!   runs, so an already sorted tape costs a single distribution pass.
//! * **Bounded memory:**
//!   two block buffers per tape regardless of input size; that bound is the
//!   entire reason the sort is phrased as repeated passes over storage.
//!
//! # Example
//!
//! ```no_run
//! use tape_sort::{NaturalMergeSorterBuilder, SortError};
//!
//! fn main() -> Result<(), SortError> {
//!     let sorter = NaturalMergeSorterBuilder::new()
//!         .with_block_size(4096)
//!         .build()?;
//!
//!     let stats = sorter.sort("records.bin")?;
//!
//!     println!(
//!         "{} phases, {} physical reads, {} physical writes",
//!         stats.phases, stats.physical_reads, stats.physical_writes
//!     );
//!     Ok(())
//! }
//! ```

pub mod record;
pub mod sort;
pub mod tape;

pub use record::Record;
pub use sort::{
    NaturalMergeSorter, NaturalMergeSorterBuilder, SortError, SortStats, DEFAULT_BLOCK_SIZE,
};
pub use tape::{Tape, TapeMode};
