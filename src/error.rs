use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cache `{name}`: associativity must be at least 1")]
    NoWays { name: String },
    #[error("cache `{name}`: {total_blocks} blocks cannot be split into {ways}-way sets")]
    UnevenSets {
        name: String,
        total_blocks: usize,
        ways: usize,
    },
    #[error("cache `{name}`: set mask {mask:#x} is not a contiguous low-bit mask")]
    BadSetMask { name: String, mask: u64 },
    #[error(
        "cache `{name}`: set mask {mask:#x} reaches {sets} sets of {ways} ways, \
         but only {total_blocks} blocks are allocated"
    )]
    SetsOutOfRange {
        name: String,
        mask: u64,
        sets: u128,
        ways: usize,
        total_blocks: usize,
    },
    #[error("cache `{name}`: shift {shift} does not fit a 64-bit address")]
    ShiftTooWide { name: String, shift: u32 },
    #[error(
        "cache `{name}`: tag shift {tag_shift} leaves a gap above the index field \
         (bits {set_shift}..{index_top})"
    )]
    TagGap {
        name: String,
        tag_shift: u32,
        set_shift: u32,
        index_top: u32,
    },
    #[error("cache `{name}`: cannot allocate {total_blocks} blocks")]
    TooLarge { name: String, total_blocks: usize },
    #[error("no caches configured")]
    NoCaches,
    #[error("could not read config: {0}")]
    Io(#[from] io::Error),
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("trace i/o: {0}")]
    Io(#[from] io::Error),
    #[error("trace ends in a partial record ({0} trailing bytes)")]
    Truncated(usize),
    #[error("cannot buffer {0} records per block")]
    BufferTooLarge(usize),
    #[error("trace reader thread died before the end of the trace")]
    ReaderGone,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error("bad arguments: {0}")]
    Args(#[from] pico_args::Error),
    #[error("{0}")]
    Usage(&'static str),
    #[error("could not write stats: {0}")]
    Output(#[source] io::Error),
    #[error("could not encode stats: {0}")]
    Encode(#[source] serde_json::Error),
}
