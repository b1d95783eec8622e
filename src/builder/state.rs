use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::primref::BuildRecord;
use super::BuildError;

/// Capacity of one per-thread work stack. A full stack makes the producer
/// recurse inline instead, bounding the stack memory of a build.
const WORK_STACK_SIZE: usize = 64;

struct HeapEntry(BuildRecord);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.size() == other.0.size()
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.size().cmp(&other.0.size())
    }
}

/// Shared priority queue of the top-level phase, largest range first so the
/// expansion balances work before workers fan out.
pub(crate) struct WorkHeap {
    inner: Mutex<BinaryHeap<HeapEntry>>,
}

impl WorkHeap {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(BinaryHeap::new()),
        }
    }

    pub(crate) fn reset(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub(crate) fn push(&self, record: BuildRecord) {
        self.inner.lock().unwrap().push(HeapEntry(record));
    }

    pub(crate) fn pop(&self) -> Option<BuildRecord> {
        self.inner.lock().unwrap().pop().map(|e| e.0)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

/// Bounded LIFO owned by one worker. Locked so idle workers can steal from
/// the bottom of someone else's queue; the owner takes the same lock, which
/// is uncontended unless a thief is active.
pub(crate) struct WorkStack {
    slots: Mutex<Vec<BuildRecord>>,
}

impl WorkStack {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::with_capacity(WORK_STACK_SIZE)),
        }
    }

    pub(crate) fn reset(&self) {
        self.slots.lock().unwrap().clear();
    }

    /// False when the stack is full; the caller then processes the record
    /// inline.
    pub(crate) fn push(&self, record: BuildRecord) -> bool {
        let mut slots = self.slots.lock().unwrap();
        if slots.len() == WORK_STACK_SIZE {
            return false;
        }
        slots.push(record);
        true
    }

    pub(crate) fn pop(&self) -> Option<BuildRecord> {
        self.slots.lock().unwrap().pop()
    }
}

/// State of one parallel build, created on the first parallel build and
/// reused by later ones: the top-level heap, one work stack per thread, and
/// the first failure observed by any worker.
pub(crate) struct BuildState {
    pub(crate) heap: WorkHeap,
    pub(crate) stacks: Vec<WorkStack>,
    failed: AtomicBool,
    failure: Mutex<Option<BuildError>>,
}

impl BuildState {
    pub(crate) fn new(thread_count: usize) -> Self {
        Self {
            heap: WorkHeap::new(),
            stacks: (0..thread_count).map(|_| WorkStack::new()).collect(),
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
        }
    }

    pub(crate) fn reset(&self) {
        self.heap.reset();
        for stack in &self.stacks {
            stack.reset();
        }
        self.failed.store(false, Ordering::Relaxed);
        *self.failure.lock().unwrap() = None;
    }

    /// Records the first failure; later ones are dropped.
    pub(crate) fn fail(&self, error: BuildError) {
        let mut slot = self.failure.lock().unwrap();
        if slot.is_none() {
            *slot = Some(error);
        }
        self.failed.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub(crate) fn take_failure(&self) -> Option<BuildError> {
        self.failure.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aabb::Aabb;
    use crate::builder::primref::{ParentSlot, PrimInfo, PrimRef};

    fn record(begin: usize, end: usize) -> BuildRecord {
        let mut info = PrimInfo::empty();
        for i in begin..end {
            let lo = glam::Vec3::new(i as f32, 0.0, 0.0);
            info.add(&PrimRef::new(Aabb::new(lo, lo + glam::Vec3::ONE), 0, i as u32));
        }
        BuildRecord::new(&info, begin, end, 1, ParentSlot::new(std::ptr::null_mut()))
    }

    #[test]
    fn heap_pops_largest_range_first() {
        let heap = WorkHeap::new();
        heap.push(record(0, 3));
        heap.push(record(3, 13));
        heap.push(record(13, 18));

        assert_eq!(heap.pop().unwrap().size(), 10);
        assert_eq!(heap.pop().unwrap().size(), 5);
        assert_eq!(heap.pop().unwrap().size(), 3);
        assert!(heap.pop().is_none());
    }

    #[test]
    fn stack_is_lifo_and_bounded() {
        let stack = WorkStack::new();
        for i in 0..WORK_STACK_SIZE {
            assert!(stack.push(record(i, i + 1)));
        }
        assert!(!stack.push(record(0, 1)), "overflow must be rejected");
        assert_eq!(stack.pop().unwrap().begin, WORK_STACK_SIZE - 1);
    }

    #[test]
    fn first_failure_wins() {
        let state = BuildState::new(2);
        assert!(!state.failed());
        state.fail(BuildError::OutOfMemory);
        state.fail(BuildError::DepthLimitExceeded);
        assert!(state.failed());
        assert!(matches!(state.take_failure(), Some(BuildError::OutOfMemory)));
    }
}
