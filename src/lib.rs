//! cachesim: cache eviction policies and a trace-replay engine for
//! comparing them.
//!
//! Policies implement [`traits::EvictionPolicy`] and are usually built by
//! name through [`builder::CacheBuilder`]; [`simulator`] replays traces
//! against them. See `DESIGN.md` for internal architecture.

pub mod builder;
pub mod ds;
pub mod error;
pub mod params;
pub mod policy;
pub mod prelude;
pub mod request;
pub mod simulator;
pub mod stats;
pub mod store;
pub mod traits;
