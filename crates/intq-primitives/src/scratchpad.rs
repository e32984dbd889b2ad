//! Scratchpad planning and call-scoped buffer management.
//!
//! Creation books named buffer requests through a [`Registrar`] into a
//! [`ScratchpadPlan`]; each execution call allocates (or reuses, if the
//! caller serializes) a [`Scratchpad`] matching the plan and resolves
//! buffers through a [`Grantor`]. Plans are pure functions of the
//! validated configuration, so the caller can allocate before the first
//! execution and share nothing across concurrent calls.

use intq_common::{DataType, IntqError, Result};
use std::fmt;

/// Stable buffer identity within a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKey {
    /// 32-bit integer accumulation buffer used when the destination
    /// cannot hold the raw accumulation.
    IntAccumulator,
    /// Combined requantization scales produced per call.
    PrecomputedScales,
}

impl fmt::Display for BufferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKey::IntAccumulator => write!(f, "int_accumulator"),
            BufferKey::PrecomputedScales => write!(f, "precomputed_scales"),
        }
    }
}

/// One booked buffer: key, element type, element count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRequest {
    pub key: BufferKey,
    pub dtype: DataType,
    pub count: usize,
}

impl BufferRequest {
    pub fn size_bytes(&self) -> usize {
        self.count * self.dtype.size_bytes()
    }
}

/// Ordered set of buffer requests, fully determined at creation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScratchpadPlan {
    requests: Vec<BufferRequest>,
}

impl ScratchpadPlan {
    pub fn new() -> Self {
        ScratchpadPlan::default()
    }

    /// Creation-time booking interface.
    pub fn registrar(&mut self) -> Registrar<'_> {
        Registrar { plan: self }
    }

    pub fn requests(&self) -> &[BufferRequest] {
        &self.requests
    }

    pub fn get(&self, key: BufferKey) -> Option<&BufferRequest> {
        self.requests.iter().find(|r| r.key == key)
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Total bytes a matching scratchpad will allocate.
    pub fn total_bytes(&self) -> usize {
        self.requests.iter().map(BufferRequest::size_bytes).sum()
    }
}

/// Records named buffer requests at creation time.
pub struct Registrar<'a> {
    plan: &'a mut ScratchpadPlan,
}

impl Registrar<'_> {
    /// Book `count` elements of `dtype` under `key`.
    ///
    /// Each key may be booked at most once per plan.
    pub fn book(&mut self, key: BufferKey, dtype: DataType, count: usize) {
        debug_assert!(self.plan.get(key).is_none(), "buffer {key} booked twice");
        self.plan.requests.push(BufferRequest { key, dtype, count });
    }
}

// ---------------------------------------------------------------------------
// Call-scoped allocation
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum TypedBuf {
    S32(Vec<i32>),
    F32(Vec<f32>),
}

#[derive(Debug)]
struct Entry {
    key: BufferKey,
    buf: TypedBuf,
}

/// A concrete allocation matching a [`ScratchpadPlan`].
///
/// Call-scoped: never share one instance across concurrent calls.
#[derive(Debug)]
pub struct Scratchpad {
    entries: Vec<Entry>,
}

impl Scratchpad {
    /// Allocate zero-initialized buffers for every request in the plan.
    pub fn allocate(plan: &ScratchpadPlan) -> Result<Self> {
        let mut entries = Vec::with_capacity(plan.requests().len());
        for req in plan.requests() {
            let buf = match req.dtype {
                DataType::S32 => TypedBuf::S32(alloc_zeroed::<i32>(req)?),
                DataType::F32 => TypedBuf::F32(alloc_zeroed::<f32>(req)?),
                other => {
                    return Err(IntqError::runtime(format!(
                        "scratchpad buffer {} has unsupported element type {other}",
                        req.key
                    )));
                }
            };
            entries.push(Entry { key: req.key, buf });
        }
        Ok(Scratchpad { entries })
    }

    /// Execution-time resolution interface.
    pub fn grantor(&mut self) -> Grantor<'_> {
        let mut int_accumulator = None;
        let mut precomputed_scales = None;
        for entry in &mut self.entries {
            match (entry.key, &mut entry.buf) {
                (BufferKey::IntAccumulator, TypedBuf::S32(v)) => {
                    int_accumulator = Some(v.as_mut_slice());
                }
                (BufferKey::PrecomputedScales, TypedBuf::F32(v)) => {
                    precomputed_scales = Some(v.as_mut_slice());
                }
                _ => {}
            }
        }
        Grantor { int_accumulator, precomputed_scales }
    }
}

fn alloc_zeroed<T: Default + Clone>(req: &BufferRequest) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(req.count)
        .map_err(|_| IntqError::OutOfMemory { requested: req.size_bytes() })?;
    v.resize(req.count, T::default());
    Ok(v)
}

/// Resolves plan keys to concrete regions for one execution call.
///
/// Buffers are moved out on first access so the accumulator and the
/// scale buffer can be held simultaneously.
pub struct Grantor<'a> {
    int_accumulator: Option<&'a mut [i32]>,
    precomputed_scales: Option<&'a mut [f32]>,
}

impl<'a> Grantor<'a> {
    pub fn take_int_accumulator(&mut self) -> Option<&'a mut [i32]> {
        self.int_accumulator.take()
    }

    pub fn take_precomputed_scales(&mut self) -> Option<&'a mut [f32]> {
        self.precomputed_scales.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> ScratchpadPlan {
        let mut plan = ScratchpadPlan::new();
        let mut registrar = plan.registrar();
        registrar.book(BufferKey::IntAccumulator, DataType::S32, 12);
        registrar.book(BufferKey::PrecomputedScales, DataType::F32, 16);
        plan
    }

    #[test]
    fn booking_preserves_order_and_sizes() {
        let plan = sample_plan();
        let reqs = plan.requests();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].key, BufferKey::IntAccumulator);
        assert_eq!(reqs[1].key, BufferKey::PrecomputedScales);
        assert_eq!(plan.total_bytes(), 12 * 4 + 16 * 4);
    }

    #[test]
    fn allocation_matches_plan() {
        let plan = sample_plan();
        let mut sp = Scratchpad::allocate(&plan).unwrap();
        let mut grantor = sp.grantor();
        let acc = grantor.take_int_accumulator().unwrap();
        let scales = grantor.take_precomputed_scales().unwrap();
        assert_eq!(acc.len(), 12);
        assert_eq!(scales.len(), 16);
        // Both regions are writable at the same time.
        acc[0] = 7;
        scales[0] = 0.5;
    }

    #[test]
    fn missing_buffers_resolve_to_none() {
        let plan = ScratchpadPlan::new();
        let mut sp = Scratchpad::allocate(&plan).unwrap();
        let mut grantor = sp.grantor();
        assert!(grantor.take_int_accumulator().is_none());
        assert!(grantor.take_precomputed_scales().is_none());
    }

    #[test]
    fn take_moves_out_once() {
        let plan = sample_plan();
        let mut sp = Scratchpad::allocate(&plan).unwrap();
        let mut grantor = sp.grantor();
        assert!(grantor.take_int_accumulator().is_some());
        assert!(grantor.take_int_accumulator().is_none());
    }

    #[test]
    fn key_display_names_are_stable() {
        assert_eq!(BufferKey::IntAccumulator.to_string(), "int_accumulator");
        assert_eq!(BufferKey::PrecomputedScales.to_string(), "precomputed_scales");
    }
}
