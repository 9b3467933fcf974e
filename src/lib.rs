//! Trace-driven model of a set-associative instruction cache.
//!
//! A functional simulator reports every executed instruction as a [`trace::Step`];
//! the [`driver::Driver`] classifies it and performs one [`cache::Cache::access`]
//! per configured cache, and [`stats::SimStats`] turns the counters into a report.

pub mod cache;
pub mod config;
pub mod cpu;
pub mod driver;
pub mod error;
pub mod flags;
pub mod stats;
pub mod trace;
