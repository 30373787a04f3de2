//! Eviction policies.
//!
//! | Family                    | Modules                                                  |
//! |---------------------------|----------------------------------------------------------|
//! | single queue              | [`fifo`], [`lru`], [`two_q`]                             |
//! | CLOCK / reinsertion       | [`clock`], [`delay_clock`], [`age`], [`pred_clock`], [`bc`], [`delay_fr`] |
//! | delayed / probabilistic   | [`lru_delay`], [`lru_prob`], [`pred_delay`], [`delay_predict`] |
//! | segmented                 | [`frozen_hot`], [`hot_cache`]                            |
//! | sharded                   | [`sharded`]                                              |
//! | oracle                    | [`belady`], [`offline_fr`], [`random`] (`RandomBelady`)  |
//!
//! Most single-queue policies are built on [`core::QueueCore`]. Policies are
//! usually constructed through [`crate::builder::CacheBuilder`], which maps
//! names and parameter strings to these types.

pub mod age;
pub mod bc;
pub mod belady;
pub mod clock;
pub mod core;
pub mod delay_clock;
pub mod delay_fr;
pub mod delay_predict;
pub mod fifo;
pub mod frozen_hot;
pub mod hot_cache;
pub mod lru;
pub mod lru_delay;
pub mod lru_prob;
pub mod offline_fr;
pub mod pred_clock;
pub mod pred_delay;
pub mod random;
pub mod sharded;
pub mod two_q;

use crate::request::NEVER;

/// Requests an object is expected to wait between two accesses while it
/// stays resident: `capacity / miss_ratio`. A zero miss ratio means nothing
/// has been evicted for lack of reuse yet, so the distance is infinite.
pub(crate) fn expected_reuse_distance(capacity: u64, miss_ratio: f64) -> f64 {
    if miss_ratio <= 0.0 {
        f64::INFINITY
    } else {
        capacity as f64 / miss_ratio
    }
}

/// Requests from the current one to `next_access_vtime`.
///
/// `vtime` counts requests seen so far including the current one, while
/// trace positions are 0-based, so the current position is `vtime − 1`.
/// Returns [`NEVER`] for objects that are not requested again.
pub(crate) fn distance_to_next(next_access_vtime: i64, vtime: u64) -> i64 {
    if next_access_vtime == NEVER {
        return NEVER;
    }
    next_access_vtime - (vtime as i64 - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_miss_ratio_is_infinite_distance() {
        assert!(expected_reuse_distance(100, 0.0).is_infinite());
        assert_eq!(expected_reuse_distance(100, 0.5), 200.0);
    }

    #[test]
    fn distance_counts_from_current_position() {
        // current request is trace position 4
        assert_eq!(distance_to_next(9, 5), 5);
        assert_eq!(distance_to_next(NEVER, 5), NEVER);
    }
}
