mod triangle1;
mod triangle4;
mod triangle4i;
mod triangle8;

pub use triangle1::{Triangle1, Triangle1v};
pub use triangle4::{Triangle4, Triangle4v};
pub use triangle4i::Triangle4i;
pub use triangle8::Triangle8;

use wide::{f32x4, f32x8};

use crate::builder::alloc::{BlockAllocator, LocalAllocator};
use crate::builder::primref::PrimRef;
use crate::builder::{BuildError, MeshSource};
use crate::bvh::NodeRef;

/// Three coordinate lanes of four triangles.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Vec3x4 {
    pub x: f32x4,
    pub y: f32x4,
    pub z: f32x4,
}

impl Vec3x4 {
    #[inline]
    pub fn from_arrays(x: [f32; 4], y: [f32; 4], z: [f32; 4]) -> Self {
        Self {
            x: f32x4::from(x),
            y: f32x4::from(y),
            z: f32x4::from(z),
        }
    }

    #[inline]
    pub fn sub(&self, other: &Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    #[inline]
    pub fn cross(&self, other: &Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }
}

/// Three coordinate lanes of eight triangles.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Vec3x8 {
    pub x: f32x8,
    pub y: f32x8,
    pub z: f32x8,
}

impl Vec3x8 {
    #[inline]
    pub fn from_arrays(x: [f32; 8], y: [f32; 8], z: [f32; 8]) -> Self {
        Self {
            x: f32x8::from(x),
            y: f32x8::from(y),
            z: f32x8::from(z),
        }
    }

    #[inline]
    pub fn sub(&self, other: &Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    #[inline]
    pub fn cross(&self, other: &Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }
}

/// Leaf record layout of a hierarchy, fixed at build time. Selects the leaf
/// writer and the block size the partitioner optimizes for; everything else
/// in the build is layout-independent.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TriangleLayout {
    /// One 64-byte record per triangle, geometric normal precomputed.
    Triangle1,
    /// Four triangles per record, vertex 0 / edges / normal in 4-wide lanes.
    Triangle4,
    /// Eight triangles per record, 8-wide lanes.
    Triangle8,
    /// One 48-byte record per triangle, plain vertices.
    Triangle1v,
    /// Four triangles per record, plain vertices in 4-wide lanes.
    Triangle4v,
    /// Four triangles per record, indexed: base vertex index plus relative
    /// index offsets. Smallest when meshes share vertices.
    Triangle4i,
}

impl TriangleLayout {
    /// log2 of the number of triangles a full leaf record carries; the SAH
    /// rounds counts up to this granularity.
    #[inline]
    pub fn log_block_size(&self) -> usize {
        match self {
            Self::Triangle1 | Self::Triangle1v => 0,
            Self::Triangle4 | Self::Triangle4v | Self::Triangle4i => 2,
            Self::Triangle8 => 3,
        }
    }

    /// Ranges at or below this size become leaves.
    #[inline]
    pub fn min_leaf_size(&self) -> usize {
        match self {
            Self::Triangle1 | Self::Triangle1v => 2,
            Self::Triangle4 | Self::Triangle4v | Self::Triangle4i => 4,
            Self::Triangle8 => 8,
        }
    }

    /// Upper bound on leaf size; no layout constrains it, splitting keeps
    /// leaves at or below [`min_leaf_size`](Self::min_leaf_size).
    #[inline]
    pub fn max_leaf_size(&self) -> usize {
        usize::MAX
    }

    /// Whether the produced hierarchy references mesh vertices indirectly
    /// and therefore records the input vertex count.
    #[inline]
    pub fn need_vertices(&self) -> bool {
        matches!(self, Self::Triangle4i)
    }

    /// Bytes of one leaf record, the unit of the primitive-arena sizing.
    #[inline]
    pub fn prim_bytes(&self) -> usize {
        match self {
            Self::Triangle1 => std::mem::size_of::<Triangle1>(),
            Self::Triangle4 => std::mem::size_of::<Triangle4>(),
            Self::Triangle8 => std::mem::size_of::<Triangle8>(),
            Self::Triangle1v => std::mem::size_of::<Triangle1v>(),
            Self::Triangle4v => std::mem::size_of::<Triangle4v>(),
            Self::Triangle4i => std::mem::size_of::<Triangle4i>(),
        }
    }

    /// Packs `prims` into leaf records and returns the encoded leaf.
    pub(crate) fn write_leaf(
        &self,
        source: &MeshSource<'_>,
        prims: &[PrimRef],
        alloc: &mut LocalAllocator<'_>,
    ) -> Result<NodeRef, BuildError> {
        match self {
            Self::Triangle1 => Triangle1::pack(source, prims, alloc),
            Self::Triangle4 => Triangle4::pack(source, prims, alloc),
            Self::Triangle8 => Triangle8::pack(source, prims, alloc),
            Self::Triangle1v => Triangle1v::pack(source, prims, alloc),
            Self::Triangle4v => Triangle4v::pack(source, prims, alloc),
            Self::Triangle4i => Triangle4i::pack(source, prims, alloc),
        }
    }

    /// Decodes the `(geom_id, prim_id)` pairs of a leaf, skipping sentinel
    /// lanes.
    pub(crate) fn leaf_triangles(
        &self,
        arena: &BlockAllocator,
        r: NodeRef,
    ) -> Vec<(u32, u32)> {
        // Safety (all arms): `r` was encoded by `write_leaf` with this same
        // layout, so the range holds `r.items()` fully written records.
        match self {
            Self::Triangle1 => {
                let recs = unsafe { arena.typed_slice::<Triangle1>(r.offset(), r.items()) };
                recs.iter().map(|t| (t.geom_id, t.prim_id)).collect()
            }
            Self::Triangle1v => {
                let recs = unsafe { arena.typed_slice::<Triangle1v>(r.offset(), r.items()) };
                recs.iter().map(|t| (t.geom_id, t.prim_id)).collect()
            }
            Self::Triangle4 => {
                let recs = unsafe { arena.typed_slice::<Triangle4>(r.offset(), r.items()) };
                recs.iter().flat_map(|t| t.triangles()).collect()
            }
            Self::Triangle4v => {
                let recs = unsafe { arena.typed_slice::<Triangle4v>(r.offset(), r.items()) };
                recs.iter().flat_map(|t| t.triangles()).collect()
            }
            Self::Triangle8 => {
                let recs = unsafe { arena.typed_slice::<Triangle8>(r.offset(), r.items()) };
                recs.iter().flat_map(|t| t.triangles()).collect()
            }
            Self::Triangle4i => {
                let recs = unsafe { arena.typed_slice::<Triangle4i>(r.offset(), r.items()) };
                recs.iter().flat_map(|t| t.triangles()).collect()
            }
        }
    }
}

/// Ids of the occupied lanes of one packet.
pub(crate) fn lane_ids(geom_id: &[u32], prim_id: &[u32]) -> Vec<(u32, u32)> {
    geom_id
        .iter()
        .zip(prim_id)
        .filter(|(g, _)| **g != u32::MAX)
        .map(|(g, p)| (*g, *p))
        .collect()
}
