use std::mem;

use serde::Deserialize;

use crate::{cache::Cache, cpu::Cpu, flags::OpFlags, trace::Step};

/// Which instruction's load/store class tags a fetch access.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagTiming {
    /// The instruction being fetched.
    #[default]
    Current,
    /// The instruction executed just before it.
    Previous,
}

/// Instruction mix seen so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub insts: u64,
    pub refs: u64,
    pub loads: u64,
    pub stores: u64,
}

/// Misses attributed to the class of the access that caused them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KindMisses {
    pub load_misses: u64,
    pub store_misses: u64,
}

/// Feeds every executed instruction to each configured cache, once per step.
pub struct Driver {
    caches: Vec<Cache>,
    kind_misses: Vec<KindMisses>,
    timing: FlagTiming,
    prev_flags: OpFlags,
    totals: Totals,
}

impl Driver {
    pub fn new(caches: Vec<Cache>, timing: FlagTiming) -> Self {
        let kind_misses = vec![KindMisses::default(); caches.len()];
        Driver {
            caches,
            kind_misses,
            timing,
            prev_flags: OpFlags::empty(),
            totals: Totals::default(),
        }
    }

    pub fn step(&mut self, cpu: &mut Cpu, step: &Step) {
        cpu.pc = step.pc;
        cpu.instr_idx += 1;
        self.totals.insts += 1;

        let flags = step.flags;
        if flags.contains(OpFlags::MEM) {
            self.totals.refs += 1;
            if flags.is_load() {
                self.totals.loads += 1;
            }
            if flags.is_store() {
                self.totals.stores += 1;
            }
        }

        let class = match self.timing {
            FlagTiming::Current => flags,
            FlagTiming::Previous => mem::replace(&mut self.prev_flags, flags),
        };
        let (is_read, is_write) = (class.is_load(), class.is_store());

        for (cache, kind) in self.caches.iter_mut().zip(&mut self.kind_misses) {
            let result = cache.access(cpu.pc, is_read, is_write);
            log::trace!(
                "{:>10} {} @ {:#010x} mem {:#010x} r={} w={}: {:?}",
                cpu.instr_idx,
                cache.name(),
                cpu.pc,
                step.mem_addr,
                is_read,
                is_write,
                result
            );
            if !result.is_hit() {
                if is_read {
                    kind.load_misses += 1;
                }
                if is_write {
                    kind.store_misses += 1;
                }
            }
        }
    }

    /// Executes `steps` in order, stopping once `cpu.instr_idx` reaches `until`.
    /// Returns how many steps were consumed.
    pub fn run(&mut self, cpu: &mut Cpu, steps: &[Step], until: Option<u64>) -> usize {
        for (done, step) in steps.iter().enumerate() {
            if until.is_some_and(|goal| cpu.instr_idx >= goal) {
                return done;
            }
            self.step(cpu, step);
        }
        steps.len()
    }

    pub fn clear_stats(&mut self) {
        self.totals = Totals::default();
        self.kind_misses.fill(KindMisses::default());
        self.caches.iter_mut().for_each(Cache::clear_stats);
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn caches(&self) -> &[Cache] {
        &self.caches
    }

    pub fn kind_misses(&self) -> &[KindMisses] {
        &self.kind_misses
    }
}
