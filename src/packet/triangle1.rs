use glam::Vec3;

use crate::builder::alloc::LocalAllocator;
use crate::builder::primref::PrimRef;
use crate::builder::{BuildError, MeshSource};
use crate::bvh::NodeRef;

/// One triangle per 64-byte record. The fourth lane of each vertex carries
/// the ids and the mesh mask; the geometric normal is precomputed so the
/// intersector never re-derives it.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Triangle1 {
    pub v0: Vec3,
    pub prim_id: u32,
    pub v1: Vec3,
    pub geom_id: u32,
    pub v2: Vec3,
    pub mask: u32,
    pub ng: Vec3,
    _pad: u32,
}

impl Triangle1 {
    pub(crate) fn pack(
        source: &MeshSource<'_>,
        prims: &[PrimRef],
        alloc: &mut LocalAllocator<'_>,
    ) -> Result<NodeRef, BuildError> {
        let items = prims.len();
        let ofs = alloc.alloc(items * std::mem::size_of::<Triangle1>())?;
        // Safety: freshly granted range, exclusive to this call.
        let dst = unsafe { alloc.arena().typed_slice_uninit::<Triangle1>(ofs, items) };
        for (slot, prim) in prims.iter().enumerate() {
            let mesh = source.mesh(prim.geom_id());
            let tri = mesh.triangle(prim.prim_id() as usize);
            let v0 = mesh.vertex(tri[0] as usize);
            let v1 = mesh.vertex(tri[1] as usize);
            let v2 = mesh.vertex(tri[2] as usize);
            let ng = (v0 - v1).cross(v2 - v0);
            dst[slot].write(Triangle1 {
                v0,
                prim_id: prim.prim_id(),
                v1,
                geom_id: prim.geom_id(),
                v2,
                mask: mesh.mask(),
                ng,
                _pad: 0,
            });
        }
        Ok(NodeRef::leaf(ofs, items))
    }
}

/// One triangle per 48-byte record, vertices only.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Triangle1v {
    pub v0: Vec3,
    pub prim_id: u32,
    pub v1: Vec3,
    pub geom_id: u32,
    pub v2: Vec3,
    pub mask: u32,
}

impl Triangle1v {
    pub(crate) fn pack(
        source: &MeshSource<'_>,
        prims: &[PrimRef],
        alloc: &mut LocalAllocator<'_>,
    ) -> Result<NodeRef, BuildError> {
        let items = prims.len();
        let ofs = alloc.alloc(items * std::mem::size_of::<Triangle1v>())?;
        // Safety: freshly granted range, exclusive to this call.
        let dst = unsafe { alloc.arena().typed_slice_uninit::<Triangle1v>(ofs, items) };
        for (slot, prim) in prims.iter().enumerate() {
            let mesh = source.mesh(prim.geom_id());
            let tri = mesh.triangle(prim.prim_id() as usize);
            dst[slot].write(Triangle1v {
                v0: mesh.vertex(tri[0] as usize),
                prim_id: prim.prim_id(),
                v1: mesh.vertex(tri[1] as usize),
                geom_id: prim.geom_id(),
                v2: mesh.vertex(tri[2] as usize),
                mask: mesh.mask(),
            });
        }
        Ok(NodeRef::leaf(ofs, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes() {
        assert_eq!(std::mem::size_of::<Triangle1>(), 64);
        assert_eq!(std::mem::size_of::<Triangle1v>(), 48);
    }
}
