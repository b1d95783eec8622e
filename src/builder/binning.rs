use glam::Vec3;

use super::primref::{PrimInfo, PrimRef};
use crate::aabb::Aabb;

pub(crate) const NUM_BINS: usize = 16;

/// Affine map from centroid coordinates to bin indices, one scale per axis.
/// An axis with zero centroid extent cannot be split; its scale is zero and
/// every primitive lands in bin 0.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BinMapping {
    ofs: Vec3,
    scale: Vec3,
}

impl BinMapping {
    pub(crate) fn new(cent_bounds: &Aabb) -> Self {
        let extent = cent_bounds.extent();
        let scale = Vec3::new(
            if extent.x > 0.0 { NUM_BINS as f32 / extent.x } else { 0.0 },
            if extent.y > 0.0 { NUM_BINS as f32 / extent.y } else { 0.0 },
            if extent.z > 0.0 { NUM_BINS as f32 / extent.z } else { 0.0 },
        );
        Self {
            ofs: cent_bounds.min,
            scale,
        }
    }

    #[inline]
    pub(crate) fn splittable(&self, axis: usize) -> bool {
        self.scale[axis] > 0.0
    }

    #[inline]
    pub(crate) fn bin(&self, axis: usize, center: Vec3) -> usize {
        ((center[axis] - self.ofs[axis]) * self.scale[axis]).clamp(0.0, (NUM_BINS - 1) as f32)
            as usize
    }
}

/// Split candidate: cut the bins of `axis` before bin `pos`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ObjectSplit {
    pub sah: f32,
    pub axis: usize,
    pub pos: usize,
}

/// Per-axis, per-bin tallies of one binning pass.
#[derive(Clone)]
pub(crate) struct Bins {
    counts: [[u32; NUM_BINS]; 3],
    bounds: [[Aabb; NUM_BINS]; 3],
}

impl Bins {
    pub(crate) fn new() -> Self {
        Self {
            counts: [[0; NUM_BINS]; 3],
            bounds: [[Aabb::EMPTY; NUM_BINS]; 3],
        }
    }

    /// Tallies every primitive into all three axes in one pass.
    pub(crate) fn bin_all(&mut self, mapping: &BinMapping, prims: &[PrimRef]) {
        for prim in prims {
            let center = prim.center();
            let bounds = prim.bounds();
            for axis in 0..3 {
                let i = mapping.bin(axis, center);
                self.counts[axis][i] += 1;
                self.bounds[axis][i].grow(&bounds);
            }
        }
    }

    pub(crate) fn merge(&mut self, other: &Bins) {
        for axis in 0..3 {
            for i in 0..NUM_BINS {
                self.counts[axis][i] += other.counts[axis][i];
                self.bounds[axis][i].grow(&other.bounds[axis][i]);
            }
        }
    }

    /// Count of one chunk's primitives that fall left of `pos` on `axis`,
    /// used by the parallel partition to derive scatter offsets.
    pub(crate) fn count_left(&self, axis: usize, pos: usize) -> usize {
        self.counts[axis][..pos].iter().map(|&c| c as usize).sum()
    }

    /// Minimal-cost split over all splittable axes, ties resolved to the
    /// lower axis and then the lower position. `None` when no axis has
    /// extent or no cut leaves both sides populated.
    pub(crate) fn best_split(
        &self,
        mapping: &BinMapping,
        log_block_size: usize,
    ) -> Option<ObjectSplit> {
        let block = 1usize << log_block_size;
        let round_up = |n: u32| -> f32 { ((n as usize + block - 1) & !(block - 1)) as f32 };

        let mut best: Option<ObjectSplit> = None;
        for axis in 0..3 {
            if !mapping.splittable(axis) {
                continue;
            }

            // Suffix sweep: bounds and count of bins [pos, NUM_BINS).
            let mut right_bounds = [Aabb::EMPTY; NUM_BINS];
            let mut right_counts = [0u32; NUM_BINS];
            let mut acc = Aabb::EMPTY;
            let mut cnt = 0u32;
            for pos in (1..NUM_BINS).rev() {
                acc.grow(&self.bounds[axis][pos]);
                cnt += self.counts[axis][pos];
                right_bounds[pos] = acc;
                right_counts[pos] = cnt;
            }

            // Prefix sweep evaluating each cut.
            let mut left_bounds = Aabb::EMPTY;
            let mut left_count = 0u32;
            for pos in 1..NUM_BINS {
                left_bounds.grow(&self.bounds[axis][pos - 1]);
                left_count += self.counts[axis][pos - 1];
                if left_count == 0 || right_counts[pos] == 0 {
                    continue;
                }
                let sah = left_bounds.surface_area() * round_up(left_count)
                    + right_bounds[pos].surface_area() * round_up(right_counts[pos]);
                if best.map_or(true, |b| sah < b.sah) {
                    best = Some(ObjectSplit { sah, axis, pos });
                }
            }
        }
        best
    }
}

/// Bins a range and picks its best SAH split.
pub(crate) fn find(
    prims: &[PrimRef],
    cent_bounds: &Aabb,
    log_block_size: usize,
) -> (BinMapping, Option<ObjectSplit>) {
    let mapping = BinMapping::new(cent_bounds);
    let mut bins = Bins::new();
    bins.bin_all(&mapping, prims);
    let split = bins.best_split(&mapping, log_block_size);
    (mapping, split)
}

/// In-place partition by bin index. Both sides' aggregates are recomputed
/// from the primitives themselves while scanning; the pre-split union cannot
/// be reused because each side is tighter than its parent.
///
/// Returns `(left, right, mid)` with `mid` relative to the slice.
pub(crate) fn partition(
    prims: &mut [PrimRef],
    mapping: &BinMapping,
    split: &ObjectSplit,
) -> (PrimInfo, PrimInfo, usize) {
    let mut left = PrimInfo::empty();
    let mut right = PrimInfo::empty();
    let mut l = 0;
    let mut r = prims.len();

    loop {
        while l < r {
            let prim = prims[l];
            if mapping.bin(split.axis, prim.center()) >= split.pos {
                break;
            }
            left.add(&prim);
            l += 1;
        }
        while l < r {
            let prim = prims[r - 1];
            if mapping.bin(split.axis, prim.center()) < split.pos {
                break;
            }
            right.add(&prim);
            r -= 1;
        }
        if l >= r {
            break;
        }
        prims.swap(l, r - 1);
    }

    debug_assert_eq!(left.num + right.num, prims.len());
    (left, right, l)
}

/// Median split used when binning finds no valid cut: halve the range with
/// no regard to geometry and scan both halves for their aggregates.
pub(crate) fn split_fallback(prims: &[PrimRef]) -> (PrimInfo, PrimInfo, usize) {
    let mid = prims.len() / 2;
    let (a, b) = prims.split_at(mid);
    (PrimInfo::from_prims(a), PrimInfo::from_prims(b), mid)
}
