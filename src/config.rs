use std::{fs, path::Path};

use serde::Deserialize;

use crate::{
    cache::{Cache, Geometry, WritebackPolicy},
    driver::FlagTiming,
    error::ConfigError,
};

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct CacheConfig {
    name: String,
    ways: usize,
    total_blocks: usize,
    set_shift: u32,
    set_mask: u64,
    tag_shift: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let geometry = Geometry::default();
        CacheConfig {
            name: "icache".to_owned(),
            ways: geometry.ways,
            total_blocks: geometry.total_blocks,
            set_shift: geometry.set_shift,
            set_mask: geometry.set_mask,
            tag_shift: geometry.tag_shift,
        }
    }
}

impl CacheConfig {
    fn geometry(&self) -> Geometry {
        Geometry {
            ways: self.ways,
            total_blocks: self.total_blocks,
            set_shift: self.set_shift,
            set_mask: self.set_mask,
            tag_shift: self.tag_shift,
        }
    }
}

fn default_caches() -> Vec<CacheConfig> {
    vec![CacheConfig::default()]
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub writeback: WritebackPolicy,
    #[serde(default)]
    pub flag_timing: FlagTiming,
    #[serde(default = "default_caches")]
    caches: Vec<CacheConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            writeback: WritebackPolicy::default(),
            flag_timing: FlagTiming::default(),
            caches: default_caches(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Config, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Config, ConfigError> {
        Config::from_json(&fs::read_to_string(path)?)
    }

    /// Builds every configured cache, failing on the first bad geometry.
    pub fn to_caches(&self) -> Result<Vec<Cache>, ConfigError> {
        if self.caches.is_empty() {
            return Err(ConfigError::NoCaches);
        }
        self.caches
            .iter()
            .map(|cc| Cache::new(cc.name.clone(), &cc.geometry(), self.writeback))
            .collect()
    }
}
