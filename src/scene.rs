use glam::{Vec3, Vec3A};

use crate::aabb::Aabb;

/// Triangle mesh input: positions plus index triples. Vertices are stored as
/// `Vec3A` so each one occupies a full 16-byte lane.
pub struct TriangleMesh {
    vertices: Vec<Vec3A>,
    triangles: Vec<[u32; 3]>,
    time_steps: u32,
    mask: u32,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<Vec3A>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            triangles,
            time_steps: 1,
            mask: u32::MAX,
        }
    }

    /// Meshes with more than one time step describe motion blur and are
    /// skipped by the builder.
    pub fn with_time_steps(mut self, time_steps: u32) -> Self {
        self.time_steps = time_steps;
        self
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn num_time_steps(&self) -> u32 {
        self.time_steps
    }

    #[inline]
    pub fn mask(&self) -> u32 {
        self.mask
    }

    #[inline]
    pub fn triangle(&self, i: usize) -> [u32; 3] {
        self.triangles[i]
    }

    #[inline]
    pub fn vertex(&self, i: usize) -> Vec3 {
        Vec3::from(self.vertices[i])
    }

    /// World bounds of one triangle.
    #[inline]
    pub fn triangle_bounds(&self, i: usize) -> Aabb {
        let tri = self.triangles[i];
        let mut aabb = Aabb::from_point(self.vertex(tri[0] as usize));
        aabb.grow_point(self.vertex(tri[1] as usize));
        aabb.grow_point(self.vertex(tri[2] as usize));
        aabb
    }
}

/// Geometry kinds a scene can hold. The builder only consumes triangle
/// meshes; other kinds keep their slot (and geometry id) but contribute no
/// primitives.
pub enum Geometry {
    Triangles(TriangleMesh),
    Unsupported,
}

/// Ordered collection of geometries. The position of a geometry in the scene
/// is its `geom_id`; triangle indices within a mesh are `prim_id`s.
#[derive(Default)]
pub struct Scene {
    geometries: Vec<Geometry>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a geometry and returns its id.
    pub fn add(&mut self, geometry: Geometry) -> u32 {
        self.geometries.push(geometry);
        (self.geometries.len() - 1) as u32
    }

    pub fn add_mesh(&mut self, mesh: TriangleMesh) -> u32 {
        self.add(Geometry::Triangles(mesh))
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.geometries.len()
    }

    #[inline]
    pub fn get(&self, geom_id: u32) -> &Geometry {
        &self.geometries[geom_id as usize]
    }

    /// The mesh behind `geom_id`. Panics on ids that do not name a triangle
    /// mesh; the builder only stores ids it discovered during the scan.
    #[inline]
    pub fn triangle_mesh(&self, geom_id: u32) -> &TriangleMesh {
        match &self.geometries[geom_id as usize] {
            Geometry::Triangles(mesh) => mesh,
            Geometry::Unsupported => panic!("geometry {geom_id} is not a triangle mesh"),
        }
    }

    /// Iterator over `(geom_id, mesh)` for every mesh the builder consumes:
    /// triangle meshes with exactly one time step.
    pub fn build_meshes(&self) -> impl Iterator<Item = (u32, &TriangleMesh)> {
        self.geometries.iter().enumerate().filter_map(|(id, g)| match g {
            Geometry::Triangles(mesh) if mesh.num_time_steps() == 1 => Some((id as u32, mesh)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_mesh() -> TriangleMesh {
        let vertices = vec![
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(1.0, 0.0, 0.0),
            Vec3A::new(1.0, 1.0, 0.0),
            Vec3A::new(0.0, 1.0, 0.0),
        ];
        TriangleMesh::new(vertices, vec![[0, 1, 2], [0, 2, 3]])
    }

    #[test]
    fn triangle_bounds() {
        let mesh = quad_mesh();
        let b = mesh.triangle_bounds(0);
        assert_eq!(b.min, Vec3::ZERO);
        assert_eq!(b.max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn build_meshes_skips_motion_and_unsupported() {
        let mut scene = Scene::new();
        scene.add_mesh(quad_mesh());
        scene.add(Geometry::Unsupported);
        scene.add_mesh(quad_mesh().with_time_steps(2));
        let ids: Vec<u32> = scene.build_meshes().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![0]);
    }
}
