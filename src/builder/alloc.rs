use std::alloc::{alloc, dealloc, Layout};
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::BuildError;

/// Granularity of arena grants. Thread-local allocators cache one block and
/// carve it without touching the shared counter.
pub(crate) const BLOCK_SIZE: usize = 4096;

/// Alignment of individual allocations.
const GRAIN: usize = 16;

#[inline]
fn round_up(n: usize, to: usize) -> usize {
    (n + to - 1) & !(to - 1)
}

/// Bump allocator over one reserved, never-relocating region.
///
/// The shared side hands out whole blocks through an atomic counter; callers
/// go through a [`LocalAllocator`] for small allocations. Offsets stay valid
/// until the allocator is dropped, so encoded byte offsets and raw pointers
/// into the region survive the whole build and the lifetime of the BVH that
/// ends up owning the arena.
pub struct BlockAllocator {
    data: NonNull<u8>,
    reserved: usize,
    next: AtomicUsize,
}

// Safety: the region is written through `&self` only at offsets handed out by
// the atomic bump counter, which never hands the same byte range out twice
// between resets.
unsafe impl Send for BlockAllocator {}
unsafe impl Sync for BlockAllocator {}

impl BlockAllocator {
    /// Reserves `bytes` (rounded up to whole blocks). The memory is not
    /// initialized.
    pub fn new(bytes: usize) -> Self {
        let reserved = round_up(bytes, BLOCK_SIZE);
        let data = if reserved == 0 {
            NonNull::dangling()
        } else {
            let layout = Layout::from_size_align(reserved, BLOCK_SIZE).expect("arena layout");
            // Safety: layout has non-zero size.
            let ptr = unsafe { alloc(layout) };
            NonNull::new(ptr).unwrap_or_else(|| std::alloc::handle_alloc_error(layout))
        };
        Self {
            data,
            reserved,
            next: AtomicUsize::new(0),
        }
    }

    /// Returns the arena to its pristine state. Previously granted offsets
    /// must no longer be used.
    pub fn reset(&mut self) {
        *self.next.get_mut() = 0;
    }

    /// Grants `bytes` rounded up to whole blocks, so every grant starts on a
    /// block boundary. Fails once the reservation is exhausted.
    pub(crate) fn grab(&self, bytes: usize) -> Result<usize, BuildError> {
        let bytes = round_up(bytes, BLOCK_SIZE);
        let ofs = self.next.fetch_add(bytes, Ordering::Relaxed);
        if ofs + bytes > self.reserved {
            return Err(BuildError::OutOfMemory);
        }
        Ok(ofs)
    }

    #[inline]
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Bytes granted so far, clamped to the reservation.
    #[inline]
    pub fn used(&self) -> usize {
        self.next.load(Ordering::Relaxed).min(self.reserved)
    }

    #[inline]
    pub(crate) fn base(&self) -> *mut u8 {
        self.data.as_ptr()
    }

    /// # Safety
    /// `ofs` must come from this arena's grants, be aligned for `T`, and the
    /// value there must have been fully written.
    #[inline]
    pub(crate) unsafe fn typed_ref<T>(&self, ofs: usize) -> &T {
        debug_assert!(ofs + std::mem::size_of::<T>() <= self.reserved);
        &*(self.base().add(ofs) as *const T)
    }

    /// # Safety
    /// Same as [`typed_ref`](Self::typed_ref), plus the caller must hold the
    /// only live reference into this range.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn typed_mut<T>(&self, ofs: usize) -> &mut T {
        debug_assert!(ofs + std::mem::size_of::<T>() <= self.reserved);
        &mut *(self.base().add(ofs) as *mut T)
    }

    /// # Safety
    /// `ofs..ofs + len * size_of::<T>()` must be a granted, `T`-aligned range
    /// whose elements have all been written.
    #[inline]
    pub(crate) unsafe fn typed_slice<T>(&self, ofs: usize, len: usize) -> &[T] {
        debug_assert!(ofs + len * std::mem::size_of::<T>() <= self.reserved);
        std::slice::from_raw_parts(self.base().add(ofs) as *const T, len)
    }

    /// Front of the arena viewed as a scratch slice of `len` values.
    ///
    /// # Safety
    /// No granted range overlapping the scratch may be live, and `T` must be
    /// valid for any bit pattern (the scratch starts out uninitialized).
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn scratch<T>(&self, len: usize) -> &mut [T] {
        debug_assert!(len * std::mem::size_of::<T>() <= self.reserved);
        std::slice::from_raw_parts_mut(self.base() as *mut T, len)
    }

    /// Uninitialized view of a freshly granted range, for leaf writers.
    ///
    /// # Safety
    /// The range must be a grant the caller has not shared with anyone else.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn typed_slice_uninit<T>(
        &self,
        ofs: usize,
        len: usize,
    ) -> &mut [MaybeUninit<T>] {
        debug_assert!(ofs + len * std::mem::size_of::<T>() <= self.reserved);
        std::slice::from_raw_parts_mut(self.base().add(ofs) as *mut MaybeUninit<T>, len)
    }
}

impl Drop for BlockAllocator {
    fn drop(&mut self) {
        if self.reserved != 0 {
            let layout = Layout::from_size_align(self.reserved, BLOCK_SIZE).expect("arena layout");
            // Safety: allocated in `new` with the same layout.
            unsafe { dealloc(self.data.as_ptr(), layout) };
        }
    }
}

/// Thread-local bump cursor over a cached block of the shared arena.
///
/// Small allocations bump the cursor; on exhaustion a fresh block is grabbed
/// from the parent. Requests larger than a block go straight to the parent.
pub struct LocalAllocator<'a> {
    arena: &'a BlockAllocator,
    cur: usize,
    end: usize,
}

impl<'a> LocalAllocator<'a> {
    pub fn new(arena: &'a BlockAllocator) -> Self {
        Self { arena, cur: 0, end: 0 }
    }

    /// Returns the byte offset of a fresh 16-aligned region of `bytes` bytes.
    pub fn alloc(&mut self, bytes: usize) -> Result<usize, BuildError> {
        let bytes = round_up(bytes, GRAIN);
        if self.end - self.cur >= bytes {
            let ofs = self.cur;
            self.cur += bytes;
            return Ok(ofs);
        }
        if bytes > BLOCK_SIZE {
            return self.arena.grab(bytes);
        }
        let ofs = self.arena.grab(BLOCK_SIZE)?;
        self.cur = ofs + bytes;
        self.end = ofs + BLOCK_SIZE;
        Ok(ofs)
    }

    #[inline]
    pub fn arena(&self) -> &'a BlockAllocator {
        self.arena
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_allocations_are_disjoint_and_aligned() {
        let arena = BlockAllocator::new(4 * BLOCK_SIZE);
        let mut local = LocalAllocator::new(&arena);

        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for bytes in [1usize, 24, 64, 128, 4000, 17, 4096] {
            let ofs = local.alloc(bytes).unwrap();
            assert_eq!(ofs % GRAIN, 0);
            for &(o, b) in &ranges {
                assert!(ofs + bytes <= o || o + b <= ofs, "overlapping grants");
            }
            ranges.push((ofs, bytes));
        }
    }

    #[test]
    fn exhaustion_reports_out_of_memory() {
        let arena = BlockAllocator::new(2 * BLOCK_SIZE);
        assert!(arena.grab(BLOCK_SIZE).is_ok());
        assert!(arena.grab(BLOCK_SIZE).is_ok());
        assert!(matches!(
            arena.grab(1),
            Err(BuildError::OutOfMemory)
        ));
    }

    #[test]
    fn reset_reclaims_the_region() {
        let mut arena = BlockAllocator::new(BLOCK_SIZE);
        assert_eq!(arena.grab(BLOCK_SIZE).unwrap(), 0);
        assert!(arena.grab(BLOCK_SIZE).is_err());
        arena.reset();
        assert_eq!(arena.grab(BLOCK_SIZE).unwrap(), 0);
    }

    #[test]
    fn concurrent_grabs_never_overlap() {
        use std::sync::Arc;

        let arena = Arc::new(BlockAllocator::new(64 * BLOCK_SIZE));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let arena = Arc::clone(&arena);
            handles.push(std::thread::spawn(move || {
                let mut got = Vec::new();
                while let Ok(ofs) = arena.grab(BLOCK_SIZE) {
                    got.push(ofs);
                }
                got
            }));
        }
        let mut all: Vec<usize> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all.len(), 64);
        all.dedup();
        assert_eq!(all.len(), 64, "duplicate block grant");
    }
}
