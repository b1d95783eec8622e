//! Binned-SAH builder for 4-wide bounding volume hierarchies (BVH4) over
//! triangle meshes.
//!
//! The builder bins primitive centroids into 16 buckets per axis, partitions
//! ranges in place by the surface-area heuristic, and packs leaves into one of
//! several SIMD-friendly triangle layouts. Large scenes build in two parallel
//! phases: a shared work heap expands the top of the tree, then per-thread
//! stacks with work stealing finish the subtrees.

pub mod aabb;
pub mod builder;
pub mod bvh;
pub mod packet;
pub mod scene;

pub use aabb::Aabb;
pub use builder::{BuildError, Bvh4Builder};
pub use bvh::{Bvh4, Node, NodeRef};
pub use packet::TriangleLayout;
pub use scene::{Geometry, Scene, TriangleMesh};
