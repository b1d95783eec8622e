use glam::Vec3;

use crate::aabb::Aabb;
use crate::bvh::NodeRef;

/// Reference to one input triangle: its bounds and its packed identity.
/// Thirty-two bytes, stored densely; the build permutes these in place and
/// never grows the array.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(C)]
pub struct PrimRef {
    lower: Vec3,
    geom_id: u32,
    upper: Vec3,
    prim_id: u32,
}

impl PrimRef {
    #[inline]
    pub fn new(bounds: Aabb, geom_id: u32, prim_id: u32) -> Self {
        Self {
            lower: bounds.min,
            geom_id,
            upper: bounds.max,
            prim_id,
        }
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        Aabb::new(self.lower, self.upper)
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.lower + self.upper) * 0.5
    }

    #[inline]
    pub fn geom_id(&self) -> u32 {
        self.geom_id
    }

    #[inline]
    pub fn prim_id(&self) -> u32 {
        self.prim_id
    }
}

/// Aggregate over a primitive range: count, union of bounds, and bounds of
/// the centroids. The centroid bounds drive the binning; the geometry bounds
/// become node boxes.
#[derive(Clone, Copy, Debug)]
pub struct PrimInfo {
    pub num: usize,
    pub geom_bounds: Aabb,
    pub cent_bounds: Aabb,
}

impl PrimInfo {
    #[inline]
    pub fn empty() -> Self {
        Self {
            num: 0,
            geom_bounds: Aabb::EMPTY,
            cent_bounds: Aabb::EMPTY,
        }
    }

    #[inline]
    pub fn add(&mut self, prim: &PrimRef) {
        self.num += 1;
        self.geom_bounds.grow(&prim.bounds());
        self.cent_bounds.grow_point(prim.center());
    }

    #[inline]
    pub fn merge(&mut self, other: &PrimInfo) {
        self.num += other.num;
        self.geom_bounds.grow(&other.geom_bounds);
        self.cent_bounds.grow(&other.cent_bounds);
    }

    pub fn from_prims(prims: &[PrimRef]) -> Self {
        let mut info = Self::empty();
        for prim in prims {
            info.add(prim);
        }
        info
    }
}

/// Write-back slot for the encoded pointer of a finished subtree: either the
/// hierarchy root or one child slot of an already allocated node.
///
/// Raw pointer rather than an index pair because neither the node arena nor
/// the root location moves while a build is running.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ParentSlot(*mut NodeRef);

// Safety: each slot has exactly one live BuildRecord naming it, and records
// move between threads only through the locked heap and work stacks.
unsafe impl Send for ParentSlot {}

impl ParentSlot {
    #[inline]
    pub(crate) fn new(slot: *mut NodeRef) -> Self {
        Self(slot)
    }

    /// Publishes the encoded pointer of the finished subtree.
    ///
    /// # Safety
    /// The caller must own the record this slot came from; every slot is
    /// written at most once per build.
    #[inline]
    pub(crate) unsafe fn write(&self, r: NodeRef) {
        *self.0 = r;
    }
}

/// Unit of recursion: a contiguous primitive range, its aggregate bounds,
/// the depth of the node it will become, and where to publish that node.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BuildRecord {
    pub begin: usize,
    pub end: usize,
    pub geom_bounds: Aabb,
    pub cent_bounds: Aabb,
    pub depth: u32,
    pub parent: ParentSlot,
}

impl BuildRecord {
    pub(crate) fn new(
        info: &PrimInfo,
        begin: usize,
        end: usize,
        depth: u32,
        parent: ParentSlot,
    ) -> Self {
        debug_assert_eq!(info.num, end - begin);
        Self {
            begin,
            end,
            geom_bounds: info.geom_bounds,
            cent_bounds: info.cent_bounds,
            depth,
            parent,
        }
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.end - self.begin
    }

    #[inline]
    pub(crate) fn area(&self) -> f32 {
        self.geom_bounds.surface_area()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prim_ref_is_32_bytes() {
        assert_eq!(std::mem::size_of::<PrimRef>(), 32);
    }

    #[test]
    fn incremental_matches_merged() {
        let prims: Vec<PrimRef> = (0..10)
            .map(|i| {
                let lo = Vec3::new(i as f32, 0.0, 0.0);
                PrimRef::new(Aabb::new(lo, lo + Vec3::ONE), 0, i)
            })
            .collect();

        let whole = PrimInfo::from_prims(&prims);
        let mut halves = PrimInfo::from_prims(&prims[..5]);
        halves.merge(&PrimInfo::from_prims(&prims[5..]));

        assert_eq!(whole.num, halves.num);
        assert_eq!(whole.geom_bounds, halves.geom_bounds);
        assert_eq!(whole.cent_bounds, halves.cent_bounds);
        assert_eq!(whole.geom_bounds.min, Vec3::ZERO);
        assert_eq!(whole.geom_bounds.max, Vec3::new(10.0, 1.0, 1.0));
    }
}
