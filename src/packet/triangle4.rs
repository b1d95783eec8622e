use wide::u32x4;

use super::{lane_ids, Vec3x4};
use crate::builder::alloc::LocalAllocator;
use crate::builder::primref::PrimRef;
use crate::builder::{BuildError, MeshSource};
use crate::bvh::NodeRef;

/// Up to four triangles in one record: vertex 0, the two edges and the
/// geometric normal, one coordinate lane per triangle. Unused lanes carry
/// zero vertices and `u32::MAX` ids so an intersector reports no hit there.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Triangle4 {
    pub v0: Vec3x4,
    pub e1: Vec3x4,
    pub e2: Vec3x4,
    pub ng: Vec3x4,
    pub geom_id: u32x4,
    pub prim_id: u32x4,
    pub mask: u32x4,
}

/// Gathered lane arrays for one packet of at most `L` triangles.
pub(crate) struct Lanes<const L: usize> {
    pub v0: [[f32; L]; 3],
    pub v1: [[f32; L]; 3],
    pub v2: [[f32; L]; 3],
    pub geom_id: [u32; L],
    pub prim_id: [u32; L],
    pub mask: [u32; L],
}

impl<const L: usize> Lanes<L> {
    pub(crate) fn gather(source: &MeshSource<'_>, prims: &[PrimRef]) -> Self {
        debug_assert!(prims.len() <= L);
        let mut lanes = Lanes {
            v0: [[0.0; L]; 3],
            v1: [[0.0; L]; 3],
            v2: [[0.0; L]; 3],
            geom_id: [u32::MAX; L],
            prim_id: [u32::MAX; L],
            mask: [u32::MAX; L],
        };
        for (lane, prim) in prims.iter().enumerate() {
            let mesh = source.mesh(prim.geom_id());
            let tri = mesh.triangle(prim.prim_id() as usize);
            let p0 = mesh.vertex(tri[0] as usize);
            let p1 = mesh.vertex(tri[1] as usize);
            let p2 = mesh.vertex(tri[2] as usize);
            for (axis, (a, b, c)) in [(p0.x, p1.x, p2.x), (p0.y, p1.y, p2.y), (p0.z, p1.z, p2.z)]
                .into_iter()
                .enumerate()
            {
                lanes.v0[axis][lane] = a;
                lanes.v1[axis][lane] = b;
                lanes.v2[axis][lane] = c;
            }
            lanes.geom_id[lane] = prim.geom_id();
            lanes.prim_id[lane] = prim.prim_id();
            lanes.mask[lane] = mesh.mask();
        }
        lanes
    }
}

impl Triangle4 {
    pub(crate) fn new(lanes: &Lanes<4>) -> Self {
        let v0 = Vec3x4::from_arrays(lanes.v0[0], lanes.v0[1], lanes.v0[2]);
        let v1 = Vec3x4::from_arrays(lanes.v1[0], lanes.v1[1], lanes.v1[2]);
        let v2 = Vec3x4::from_arrays(lanes.v2[0], lanes.v2[1], lanes.v2[2]);
        let e1 = v0.sub(&v1);
        let e2 = v2.sub(&v0);
        let ng = e1.cross(&e2);
        Triangle4 {
            v0,
            e1,
            e2,
            ng,
            geom_id: u32x4::from(lanes.geom_id),
            prim_id: u32x4::from(lanes.prim_id),
            mask: u32x4::from(lanes.mask),
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
        debug_assert!(prims.len() <= 4);
        let ofs = alloc.alloc(std::mem::size_of::<Triangle4>())?;
        let packet = Triangle4::new(&Lanes::gather(source, prims));
        // Safety: freshly granted range, exclusive to this call.
        unsafe { *alloc.arena().typed_mut::<Triangle4>(ofs) = packet };
        Ok(NodeRef::leaf(ofs, 1))
    }
}

/// Up to four triangles with their plain vertices in 4-wide lanes.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct Triangle4v {
    pub v0: Vec3x4,
    pub v1: Vec3x4,
    pub v2: Vec3x4,
    pub geom_id: u32x4,
    pub prim_id: u32x4,
    pub mask: u32x4,
}

impl Triangle4v {
    pub(crate) fn new(lanes: &Lanes<4>) -> Self {
        Triangle4v {
            v0: Vec3x4::from_arrays(lanes.v0[0], lanes.v0[1], lanes.v0[2]),
            v1: Vec3x4::from_arrays(lanes.v1[0], lanes.v1[1], lanes.v1[2]),
            v2: Vec3x4::from_arrays(lanes.v2[0], lanes.v2[1], lanes.v2[2]),
            geom_id: u32x4::from(lanes.geom_id),
            prim_id: u32x4::from(lanes.prim_id),
            mask: u32x4::from(lanes.mask),
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
        debug_assert!(prims.len() <= 4);
        let ofs = alloc.alloc(std::mem::size_of::<Triangle4v>())?;
        let packet = Triangle4v::new(&Lanes::gather(source, prims));
        // Safety: freshly granted range, exclusive to this call.
        unsafe { *alloc.arena().typed_mut::<Triangle4v>(ofs) = packet };
        Ok(NodeRef::leaf(ofs, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_lanes_are_skipped() {
        let packet = Triangle4 {
            v0: Vec3x4::from_arrays([0.0; 4], [0.0; 4], [0.0; 4]),
            e1: Vec3x4::from_arrays([0.0; 4], [0.0; 4], [0.0; 4]),
            e2: Vec3x4::from_arrays([0.0; 4], [0.0; 4], [0.0; 4]),
            ng: Vec3x4::from_arrays([0.0; 4], [0.0; 4], [0.0; 4]),
            geom_id: u32x4::from([0, 0, u32::MAX, u32::MAX]),
            prim_id: u32x4::from([7, 9, u32::MAX, u32::MAX]),
            mask: u32x4::from([u32::MAX; 4]),
        };
        assert_eq!(packet.triangles(), vec![(0, 7), (0, 9)]);
    }
}
