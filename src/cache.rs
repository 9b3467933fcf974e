use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr {
    pub set: usize,
    pub tag: u64,
}

#[derive(Debug)]
struct BitSection {
    shift: u32,
    mask: u64,
}

impl BitSection {
    fn apply(&self, num: u64) -> u64 {
        (num >> self.shift) & self.mask
    }
}

/// How a raw address is carved into set index and tag, plus the array size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub ways: usize,
    pub total_blocks: usize,
    pub set_shift: u32,
    pub set_mask: u64,
    pub tag_shift: u32,
}

impl Default for Geometry {
    /// 32 KiB, 4-way, 32-byte lines.
    fn default() -> Self {
        Geometry {
            ways: 4,
            total_blocks: 1024,
            set_shift: 5,
            set_mask: (1 << 8) - 1,
            tag_shift: 13,
        }
    }
}

impl Geometry {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let owned = || name.to_owned();
        if self.ways == 0 {
            return Err(ConfigError::NoWays { name: owned() });
        }
        if self.total_blocks == 0 || self.total_blocks % self.ways != 0 {
            return Err(ConfigError::UnevenSets {
                name: owned(),
                total_blocks: self.total_blocks,
                ways: self.ways,
            });
        }
        for shift in [self.set_shift, self.tag_shift] {
            if shift >= u64::BITS {
                return Err(ConfigError::ShiftTooWide { name: owned(), shift });
            }
        }

        let sets = self.set_mask as u128 + 1;
        if !sets.is_power_of_two() {
            return Err(ConfigError::BadSetMask {
                name: owned(),
                mask: self.set_mask,
            });
        }
        if sets * self.ways as u128 > self.total_blocks as u128 {
            return Err(ConfigError::SetsOutOfRange {
                name: owned(),
                mask: self.set_mask,
                sets,
                ways: self.ways,
                total_blocks: self.total_blocks,
            });
        }

        // Bits between the index field and the tag would be dropped, aliasing lines.
        let index_top = self.set_shift + (u64::BITS - self.set_mask.leading_zeros());
        if self.tag_shift > index_top {
            return Err(ConfigError::TagGap {
                name: owned(),
                tag_shift: self.tag_shift,
                set_shift: self.set_shift,
                index_top,
            });
        }
        Ok(())
    }
}

/// When evicting a dirty victim is counted as a writeback.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritebackPolicy {
    /// Every dirty victim is flushed.
    #[default]
    DirtyVictim,
    /// Only an access that both reads and writes flushes its dirty victim.
    ReadWrite,
}

impl WritebackPolicy {
    /// Name as written in the config file.
    pub fn as_str(self) -> &'static str {
        match self {
            WritebackPolicy::DirtyVictim => "dirty_victim",
            WritebackPolicy::ReadWrite => "read_write",
        }
    }

    fn flushes(self, victim_dirty: bool, is_read: bool, is_write: bool) -> bool {
        victim_dirty
            && match self {
                WritebackPolicy::DirtyVictim => true,
                WritebackPolicy::ReadWrite => is_read && is_write,
            }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessResult {
    Hit,
    Miss { writeback: bool },
}

impl AccessResult {
    pub fn is_hit(self) -> bool {
        matches!(self, AccessResult::Hit)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub valid: bool,
    pub dirty: bool,
    pub tag: u64,
    pub last_access: u64,
}

impl Block {
    fn touch(&mut self, clock: u64, is_write: bool) {
        self.last_access = clock;
        self.dirty |= is_write;
    }

    fn fill(&mut self, tag: u64, clock: u64, is_write: bool) {
        *self = Block {
            valid: true,
            dirty: is_write,
            tag,
            last_access: clock,
        };
    }
}

/// Picks the least recently used way; the lowest way wins a tie.
fn lru_way(set: &[Block]) -> usize {
    set.iter()
        .enumerate()
        .min_by_key(|(_way, b)| b.last_access)
        .map_or(0, |(way, _b)| way)
}

#[derive(Debug)]
pub struct Cache {
    name: String,
    blocks: Vec<Block>,
    n_ways: usize,
    n_sets: usize,
    set_sec: BitSection,
    tag_sec: BitSection,
    writeback: WritebackPolicy,
    clock: u64,
    accesses: u64,
    hits: u64,
    misses: u64,
    writebacks: u64,
}

impl Cache {
    pub fn new(
        name: String,
        geometry: &Geometry,
        writeback: WritebackPolicy,
    ) -> Result<Self, ConfigError> {
        geometry.validate(&name)?;
        log::debug!(
            "cache `{}`: {} blocks, {}-way, set = (addr >> {}) & {:#x}, tag = addr >> {}",
            name,
            geometry.total_blocks,
            geometry.ways,
            geometry.set_shift,
            geometry.set_mask,
            geometry.tag_shift
        );

        let mut blocks = Vec::new();
        if blocks.try_reserve_exact(geometry.total_blocks).is_err() {
            return Err(ConfigError::TooLarge {
                name,
                total_blocks: geometry.total_blocks,
            });
        }
        blocks.resize(geometry.total_blocks, Block::default());

        Ok(Cache {
            name,
            blocks,
            n_ways: geometry.ways,
            n_sets: geometry.total_blocks / geometry.ways,
            set_sec: BitSection {
                shift: geometry.set_shift,
                mask: geometry.set_mask,
            },
            tag_sec: BitSection {
                shift: geometry.tag_shift,
                mask: u64::MAX,
            },
            writeback,
            clock: 0,
            accesses: 0,
            hits: 0,
            misses: 0,
            writebacks: 0,
        })
    }

    pub fn split_addr(&self, addr: u64) -> Addr {
        Addr {
            // Bounded by the mask, which validation keeps within `n_sets`.
            set: self.set_sec.apply(addr) as usize,
            tag: self.tag_sec.apply(addr),
        }
    }

    fn get_set(&self, set: usize) -> Range<usize> {
        set * self.n_ways..(set + 1) * self.n_ways
    }

    pub fn access(&mut self, addr: u64, is_read: bool, is_write: bool) -> AccessResult {
        self.clock += 1;
        self.accesses += 1;
        let clock = self.clock;
        let Addr { set, tag } = self.split_addr(addr);
        let set_range = self.get_set(set);
        let set_slice = &mut self.blocks[set_range];

        let mut matched = false;
        for block in set_slice
            .iter_mut()
            .filter(|b| b.valid && b.tag == tag)
        {
            block.touch(clock, is_write);
            matched = true;
        }
        if matched {
            self.hits += 1;
            return AccessResult::Hit;
        }

        self.misses += 1;
        let (way, writeback) = match set_slice.iter().position(|b| !b.valid) {
            Some(vacant_way) => (vacant_way, false),
            None => {
                let victim_way = lru_way(set_slice);
                let dirty = set_slice[victim_way].dirty;
                (victim_way, self.writeback.flushes(dirty, is_read, is_write))
            }
        };
        if writeback {
            self.writebacks += 1;
        }
        set_slice[way].fill(tag, clock, is_write);

        AccessResult::Miss { writeback }
    }

    /// Resets the counters; the tag array and the clock carry on.
    pub fn clear_stats(&mut self) {
        self.accesses = 0;
        self.hits = 0;
        self.misses = 0;
        self.writebacks = 0;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ways(&self) -> usize {
        self.n_ways
    }

    pub fn num_sets(&self) -> usize {
        self.n_sets
    }

    pub fn writeback_policy(&self) -> WritebackPolicy {
        self.writeback
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn accesses(&self) -> u64 {
        self.accesses
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn writebacks(&self) -> u64 {
        self.writebacks
    }

    pub fn set(&self, set: usize) -> &[Block] {
        &self.blocks[self.get_set(set)]
    }

    pub fn valid_blocks(&self, set: usize) -> usize {
        self.set(set).iter().filter(|b| b.valid).count()
    }
}
