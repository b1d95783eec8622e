use wide::u32x8;

use super::triangle4::Lanes;
use super::{lane_ids, Vec3x8};
use crate::builder::alloc::LocalAllocator;
use crate::builder::primref::PrimRef;
use crate::builder::{BuildError, MeshSource};
use crate::bvh::NodeRef;

/// Eight-wide variant of [`Triangle4`](super::Triangle4). The lane types
/// compile to AVX where available and to paired 128-bit operations elsewhere.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Triangle8 {
    pub v0: Vec3x8,
    pub e1: Vec3x8,
    pub e2: Vec3x8,
    pub ng: Vec3x8,
    pub geom_id: u32x8,
    pub prim_id: u32x8,
    pub mask: u32x8,
}

impl Triangle8 {
    pub(crate) fn new(lanes: &Lanes<8>) -> Self {
        let v0 = Vec3x8::from_arrays(lanes.v0[0], lanes.v0[1], lanes.v0[2]);
        let v1 = Vec3x8::from_arrays(lanes.v1[0], lanes.v1[1], lanes.v1[2]);
        let v2 = Vec3x8::from_arrays(lanes.v2[0], lanes.v2[1], lanes.v2[2]);
        let e1 = v0.sub(&v1);
        let e2 = v2.sub(&v0);
        let ng = e1.cross(&e2);
        Triangle8 {
            v0,
            e1,
            e2,
            ng,
            geom_id: u32x8::from(lanes.geom_id),
            prim_id: u32x8::from(lanes.prim_id),
            mask: u32x8::from(lanes.mask),
        }
    }

    pub fn triangles(&self) -> Vec<(u32, u32)> {
        lane_ids(&self.geom_id.to_array(), &self.prim_id.to_array())
    }

    pub(crate) fn pack(
        source: &MeshSource<'_>,
        prims: &[PrimRef],
        alloc: &mut LocalAllocator<'_>,
    ) -> Result<NodeRef, BuildError> {
        debug_assert!(prims.len() <= 8);
        let ofs = alloc.alloc(std::mem::size_of::<Triangle8>())?;
        let packet = Triangle8::new(&Lanes::gather(source, prims));
        // Safety: freshly granted range, exclusive to this call.
        unsafe { *alloc.arena().typed_mut::<Triangle8>(ofs) = packet };
        Ok(NodeRef::leaf(ofs, 1))
    }
}
