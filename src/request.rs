//! Trace requests and references to resident objects.

/// Object identifier as found in traces.
pub type ObjId = u64;

/// Sentinel next-access time for objects that are never requested again.
pub const NEVER: i64 = i64::MAX;

/// One trace request.
///
/// `next_access_vtime` is the oracle field: the virtual time (request index)
/// of the next request for the same object, [`NEVER`] if there is none, or
/// `None` when the trace carries no future knowledge at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Request {
    pub obj_id: ObjId,
    pub obj_size: u64,
    pub next_access_vtime: Option<i64>,
}

impl Request {
    /// Request without oracle information.
    #[inline]
    pub fn new(obj_id: ObjId, obj_size: u64) -> Self {
        Self {
            obj_id,
            obj_size,
            next_access_vtime: None,
        }
    }

    /// Unit-size request, the common case in tests and count-based traces.
    #[inline]
    pub fn unit(obj_id: ObjId) -> Self {
        Self::new(obj_id, 1)
    }

    /// Attaches the oracle next-access time.
    #[inline]
    pub fn with_next_access(mut self, vtime: i64) -> Self {
        self.next_access_vtime = Some(vtime);
        self
    }

    /// Oracle next-access time; a missing annotation reads as "never".
    #[inline]
    pub fn next_access_or_never(&self) -> i64 {
        self.next_access_vtime.unwrap_or(NEVER)
    }
}

/// Identity and size of a resident object, returned by `find`, `insert`
/// and `to_evict` in place of a borrowed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub obj_id: ObjId,
    pub obj_size: u64,
}
