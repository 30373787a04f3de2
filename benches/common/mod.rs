//! Shared helpers for benchmarks.

#![allow(dead_code)]

pub mod workload;
