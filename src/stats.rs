use std::{fmt, time::Duration};

use serde::Serialize;

use crate::{cache::WritebackPolicy, driver::Driver};

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub name: String,
    pub writeback_policy: WritebackPolicy,
    pub accesses: u64,
    pub hits: u64,
    pub misses: u64,
    pub writebacks: u64,
    pub load_misses: u64,
    pub store_misses: u64,
    pub miss_rate: f64,
    pub writeback_rate: f64,
    pub load_miss_rate: f64,
    pub store_miss_rate: f64,
    pub mpki: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SimStats {
    pub insts: u64,
    pub refs: u64,
    pub loads: u64,
    pub stores: u64,
    pub elapsed_secs: f64,
    /// Simulated instructions per host second.
    pub inst_rate: f64,
    pub caches: Vec<CacheStats>,
}

impl SimStats {
    pub fn collect(driver: &Driver, elapsed: Duration) -> SimStats {
        let totals = driver.totals();
        let elapsed_secs = elapsed.as_secs_f64();

        let caches = driver
            .caches()
            .iter()
            .zip(driver.kind_misses())
            .map(|(c, kind)| CacheStats {
                name: c.name().to_owned(),
                writeback_policy: c.writeback_policy(),
                accesses: c.accesses(),
                hits: c.hits(),
                misses: c.misses(),
                writebacks: c.writebacks(),
                load_misses: kind.load_misses,
                store_misses: kind.store_misses,
                miss_rate: ratio(c.misses(), c.accesses()),
                writeback_rate: ratio(c.writebacks(), totals.stores),
                load_miss_rate: ratio(kind.load_misses, totals.loads),
                store_miss_rate: ratio(kind.store_misses, totals.stores),
                mpki: 1000.0 * ratio(c.misses(), totals.insts),
            })
            .collect();

        SimStats {
            insts: totals.insts,
            refs: totals.refs,
            loads: totals.loads,
            stores: totals.stores,
            elapsed_secs,
            inst_rate: if elapsed_secs > 0.0 {
                totals.insts as f64 / elapsed_secs
            } else {
                0.0
            },
            caches,
        }
    }
}

impl fmt::Display for SimStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<24} {:>14}", "insts", self.insts)?;
        writeln!(f, "{:<24} {:>14}", "refs", self.refs)?;
        writeln!(f, "{:<24} {:>14}", "loads", self.loads)?;
        writeln!(f, "{:<24} {:>14}", "stores", self.stores)?;
        writeln!(f, "{:<24} {:>14.3}", "elapsed (s)", self.elapsed_secs)?;
        write!(f, "{:<24} {:>14.0}", "inst rate (/s)", self.inst_rate)?;
        for c in &self.caches {
            writeln!(f)?;
            writeln!(f, "-- {} --", c.name)?;
            writeln!(f, "{:<24} {:>14}", "writeback policy", c.writeback_policy.as_str())?;
            writeln!(f, "{:<24} {:>14}", "accesses", c.accesses)?;
            writeln!(f, "{:<24} {:>14}", "hits", c.hits)?;
            writeln!(f, "{:<24} {:>14}", "misses", c.misses)?;
            writeln!(f, "{:<24} {:>14}", "writebacks", c.writebacks)?;
            writeln!(f, "{:<24} {:>14}", "load misses", c.load_misses)?;
            writeln!(f, "{:<24} {:>14}", "store misses", c.store_misses)?;
            writeln!(f, "{:<24} {:>13.4}%", "miss rate", 100.0 * c.miss_rate)?;
            writeln!(f, "{:<24} {:>14.4}", "writeback rate", c.writeback_rate)?;
            writeln!(f, "{:<24} {:>14.4}", "load miss rate", c.load_miss_rate)?;
            writeln!(f, "{:<24} {:>14.4}", "store miss rate", c.store_miss_rate)?;
            write!(f, "{:<24} {:>14.3}", "mpki", c.mpki)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{Cache, Geometry, WritebackPolicy},
        cpu::Cpu,
        driver::FlagTiming,
        flags::OpFlags,
        trace::Step,
    };

    fn store_heavy_driver() -> Driver {
        let geometry = Geometry {
            ways: 1,
            total_blocks: 1,
            set_shift: 5,
            set_mask: 0,
            tag_shift: 5,
        };
        let cache = Cache::new("l1".into(), &geometry, WritebackPolicy::DirtyVictim).unwrap();
        let mut driver = Driver::new(vec![cache], FlagTiming::Current);

        let store = OpFlags::MEM | OpFlags::STORE;
        let steps = [
            Step { pc: 0x00, mem_addr: 0x800, flags: store },
            Step { pc: 0x04, mem_addr: 0, flags: OpFlags::empty() },
            Step { pc: 0x20, mem_addr: 0x900, flags: store },
            Step { pc: 0x40, mem_addr: 0, flags: OpFlags::empty() },
        ];
        driver.run(&mut Cpu::new(), &steps, None);
        driver
    }

    #[test]
    fn derives_rates() {
        let stats = SimStats::collect(&store_heavy_driver(), Duration::from_secs(2));
        assert_eq!((stats.insts, stats.refs, stats.stores, stats.loads), (4, 2, 2, 0));
        assert_eq!(stats.inst_rate, 2.0);

        let c = &stats.caches[0];
        assert_eq!((c.accesses, c.hits, c.misses, c.writebacks), (4, 1, 3, 2));
        assert_eq!(c.store_misses, 2);
        assert_eq!(c.miss_rate, 0.75);
        assert_eq!(c.writeback_rate, 1.0);
        assert_eq!(c.store_miss_rate, 1.0);
        assert_eq!(c.load_miss_rate, 0.0);
        assert_eq!(c.mpki, 750.0);
    }

    #[test]
    fn empty_run_has_zero_rates() {
        let cache = Cache::new("l1".into(), &Geometry::default(), WritebackPolicy::default())
            .unwrap();
        let driver = Driver::new(vec![cache], FlagTiming::Current);
        let stats = SimStats::collect(&driver, Duration::ZERO);
        assert_eq!(stats.inst_rate, 0.0);
        assert_eq!(stats.caches[0].miss_rate, 0.0);
        assert_eq!(stats.caches[0].writeback_rate, 0.0);
    }

    #[test]
    fn serializes_and_prints() {
        let stats = SimStats::collect(&store_heavy_driver(), Duration::from_secs(1));
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["caches"][0]["name"], "l1");
        assert_eq!(json["caches"][0]["writebacks"], 2);
        assert_eq!(json["caches"][0]["writeback_policy"], "dirty_victim");

        let text = stats.to_string();
        assert!(text.contains("-- l1 --"));
        assert!(text.contains("75.0000%"));
        assert!(text.contains("writeback policy") && text.contains("dirty_victim"));
    }
}
