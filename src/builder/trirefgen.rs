use rayon::prelude::*;

use super::primref::{PrimInfo, PrimRef};
use super::MeshSource;

/// Triangles per parallel generation task. Small enough to balance uneven
/// meshes, large enough to amortize the scheduling.
const GEN_CHUNK: usize = 4096;

/// Emits one PrimRef per eligible triangle into `prims`, in scene order, and
/// returns the aggregate over all of them. `prims` must hold exactly
/// [`MeshSource::num_primitives`] entries.
pub(crate) fn generate_sequential(source: &MeshSource<'_>, prims: &mut [PrimRef]) -> PrimInfo {
    let mut info = PrimInfo::empty();
    let mut out = 0;
    for (geom_id, mesh) in source.meshes() {
        for prim_id in 0..mesh.num_triangles() {
            let prim = PrimRef::new(mesh.triangle_bounds(prim_id), geom_id, prim_id as u32);
            info.add(&prim);
            prims[out] = prim;
            out += 1;
        }
    }
    debug_assert_eq!(out, prims.len());
    info
}

/// Parallel form of [`generate_sequential`]. The flattened triangle index
/// space is cut into contiguous chunks, each task fills its own disjoint
/// slice of `prims`, and the partial aggregates reduce into one. The output
/// array is identical to the sequential one.
pub(crate) fn generate_parallel(source: &MeshSource<'_>, prims: &mut [PrimRef]) -> PrimInfo {
    struct GenTask<'a> {
        geom_id: u32,
        mesh: &'a crate::scene::TriangleMesh,
        first_prim: usize,
        out: &'a mut [PrimRef],
    }

    let mut tasks = Vec::new();
    let mut rest = prims;
    for (geom_id, mesh) in source.meshes() {
        let mut first = 0;
        while first < mesh.num_triangles() {
            let len = (mesh.num_triangles() - first).min(GEN_CHUNK);
            let (out, tail) = std::mem::take(&mut rest).split_at_mut(len);
            rest = tail;
            tasks.push(GenTask {
                geom_id,
                mesh,
                first_prim: first,
                out,
            });
            first += len;
        }
    }
    debug_assert!(rest.is_empty());

    tasks
        .into_par_iter()
        .map(|task| {
            let mut info = PrimInfo::empty();
            for (slot, out) in task.out.iter_mut().enumerate() {
                let prim_id = task.first_prim + slot;
                let prim = PrimRef::new(
                    task.mesh.triangle_bounds(prim_id),
                    task.geom_id,
                    prim_id as u32,
                );
                info.add(&prim);
                *out = prim;
            }
            info
        })
        .reduce(PrimInfo::empty, |mut a, b| {
            a.merge(&b);
            a
        })
}

#[cfg(test)]
mod tests {
    use glam::{Vec3, Vec3A};

    use super::*;
    use crate::builder::MeshSource;
    use crate::scene::{Geometry, Scene, TriangleMesh};

    fn strip_mesh(n: usize, x0: f32) -> TriangleMesh {
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();
        for i in 0..n {
            let base = vertices.len() as u32;
            let x = x0 + i as f32;
            vertices.push(Vec3A::new(x, 0.0, 0.0));
            vertices.push(Vec3A::new(x + 1.0, 0.0, 0.0));
            vertices.push(Vec3A::new(x, 1.0, 0.0));
            triangles.push([base, base + 1, base + 2]);
        }
        TriangleMesh::new(vertices, triangles)
    }

    #[test]
    fn sequential_emits_in_scene_order() {
        let mut scene = Scene::new();
        scene.add_mesh(strip_mesh(3, 0.0));
        scene.add(Geometry::Unsupported);
        scene.add_mesh(strip_mesh(2, 100.0).with_time_steps(3));
        scene.add_mesh(strip_mesh(2, 10.0));

        let source = MeshSource::Scene(&scene);
        assert_eq!(source.num_primitives(), 5);

        let mut prims = vec![PrimRef::new(crate::aabb::Aabb::EMPTY, 0, 0); 5];
        let info = generate_sequential(&source, &mut prims);

        assert_eq!(info.num, 5);
        let ids: Vec<(u32, u32)> = prims.iter().map(|p| (p.geom_id(), p.prim_id())).collect();
        assert_eq!(ids, vec![(0, 0), (0, 1), (0, 2), (3, 0), (3, 1)]);
        assert_eq!(info.geom_bounds.min, Vec3::ZERO);
        assert_eq!(info.geom_bounds.max, Vec3::new(12.0, 1.0, 0.0));
    }

    #[test]
    fn parallel_matches_sequential() {
        let mut scene = Scene::new();
        scene.add_mesh(strip_mesh(1000, 0.0));
        scene.add_mesh(strip_mesh(37, -500.0));
        let source = MeshSource::Scene(&scene);

        let n = source.num_primitives();
        let mut seq = vec![PrimRef::new(crate::aabb::Aabb::EMPTY, 0, 0); n];
        let mut par = seq.clone();

        let seq_info = generate_sequential(&source, &mut seq);
        let par_info = generate_parallel(&source, &mut par);

        assert_eq!(seq, par);
        assert_eq!(seq_info.num, par_info.num);
        assert_eq!(seq_info.geom_bounds, par_info.geom_bounds);
        assert_eq!(seq_info.cent_bounds, par_info.cent_bounds);
    }
}
