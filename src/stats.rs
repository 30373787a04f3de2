//! Point-in-time counters of one policy instance.

use std::fmt;

use crate::traits::EvictionPolicy;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub name: &'static str,
    pub params: String,
    pub capacity: u64,
    pub version: u32,

    pub n_req: u64,
    pub n_req_byte: u64,
    pub n_miss: u64,
    pub n_miss_byte: u64,
    pub n_insert: u64,
    pub n_promotion: u64,

    // gauges captured at snapshot time
    pub n_obj: u64,
    pub occupied_bytes: u64,
}

impl CacheStats {
    /// Reads counters and gauges from `policy`.
    pub fn capture<P: EvictionPolicy + ?Sized>(policy: &P) -> Self {
        let state = policy.state();
        Self {
            name: policy.name(),
            params: policy.current_params(),
            capacity: state.capacity,
            version: state.version,
            n_req: state.n_req,
            n_req_byte: state.n_req_byte,
            n_miss: state.n_miss,
            n_miss_byte: state.n_miss_byte,
            n_insert: state.n_insert,
            n_promotion: state.n_promotion,
            n_obj: policy.n_obj(),
            occupied_bytes: policy.occupied_bytes(),
        }
    }

    #[inline]
    pub fn n_hit(&self) -> u64 {
        self.n_req - self.n_miss
    }

    pub fn miss_ratio(&self) -> f64 {
        ratio(self.n_miss, self.n_req)
    }

    pub fn byte_miss_ratio(&self) -> f64 {
        ratio(self.n_miss_byte, self.n_req_byte)
    }

    /// Promotions per request, a proxy for queue-reordering cost.
    pub fn promotion_ratio(&self) -> f64 {
        ratio(self.n_promotion, self.n_req)
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] cache size {}, {} req, miss ratio {:.4}, byte miss ratio {:.4}, {} promotions",
            self.name,
            self.params,
            self.capacity,
            self.n_req,
            self.miss_ratio(),
            self.byte_miss_ratio(),
            self.n_promotion
        )
    }
}
