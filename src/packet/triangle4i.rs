use wide::{i32x4, u32x4};

use super::lane_ids;
use crate::builder::alloc::LocalAllocator;
use crate::builder::primref::PrimRef;
use crate::builder::{BuildError, MeshSource};
use crate::bvh::NodeRef;

/// Up to four triangles stored by reference: the index of vertex 0 in its
/// mesh plus 32-bit offsets relative to it for the other two vertices.
/// Unused lanes repeat lane 0 with zero offsets, so dereferencing them is
/// always valid; their ids are `u32::MAX`.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Triangle4i {
    pub v0: u32x4,
    pub v1: i32x4,
    pub v2: i32x4,
    pub geom_id: u32x4,
    pub prim_id: u32x4,
}

impl Triangle4i {
    pub(crate) fn pack(
        source: &MeshSource<'_>,
        prims: &[PrimRef],
        alloc: &mut LocalAllocator<'_>,
    ) -> Result<NodeRef, BuildError> {
        debug_assert!(!prims.is_empty() && prims.len() <= 4);

        let mut v0 = [0u32; 4];
        let mut v1 = [0i32; 4];
        let mut v2 = [0i32; 4];
        let mut geom_id = [u32::MAX; 4];
        let mut prim_id = [u32::MAX; 4];

        for (lane, prim) in prims.iter().enumerate() {
            let mesh = source.mesh(prim.geom_id());
            let tri = mesh.triangle(prim.prim_id() as usize);
            v0[lane] = tri[0];
            v1[lane] = tri[1] as i32 - tri[0] as i32;
            v2[lane] = tri[2] as i32 - tri[0] as i32;
            geom_id[lane] = prim.geom_id();
            prim_id[lane] = prim.prim_id();
        }
        for lane in prims.len()..4 {
            v0[lane] = v0[0];
        }

        let packet = Triangle4i {
            v0: u32x4::from(v0),
            v1: i32x4::from(v1),
            v2: i32x4::from(v2),
            geom_id: u32x4::from(geom_id),
            prim_id: u32x4::from(prim_id),
        };

        let ofs = alloc.alloc(std::mem::size_of::<Triangle4i>())?;
        // Safety: freshly granted range, exclusive to this call.
        unsafe { *alloc.arena().typed_mut::<Triangle4i>(ofs) = packet };
        Ok(NodeRef::leaf(ofs, 1))
    }

    pub fn triangles(&self) -> Vec<(u32, u32)> {
        lane_ids(&self.geom_id.to_array(), &self.prim_id.to_array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_compact() {
        assert_eq!(std::mem::size_of::<Triangle4i>(), 80);
    }
}
