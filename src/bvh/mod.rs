mod node;

pub use node::{Node, NodeRef};

use crate::aabb::Aabb;
use crate::builder::alloc::BlockAllocator;
use crate::packet::TriangleLayout;

/// Four-wide bounding volume hierarchy over triangle meshes.
///
/// Nodes and leaf records live in two bump arenas owned by the hierarchy;
/// [`NodeRef`]s are byte offsets into them and stay valid for the lifetime of
/// this value. Produced by [`Bvh4Builder`](crate::builder::Bvh4Builder).
pub struct Bvh4 {
    layout: TriangleLayout,
    root: NodeRef,
    bounds: Aabb,
    num_primitives: usize,
    num_vertices: usize,
    pub(crate) nodes: BlockAllocator,
    pub(crate) primitives: BlockAllocator,
}

impl Bvh4 {
    /// Depth at which the regular recursion stops splitting.
    pub const MAX_BUILD_DEPTH: u32 = 32;
    /// Hard bound on any root-to-leaf path; the deep-leaf fallback may add
    /// levels beyond [`MAX_BUILD_DEPTH`](Self::MAX_BUILD_DEPTH).
    pub const MAX_BUILD_DEPTH_LEAF: u32 = 48;

    pub(crate) fn new(
        layout: TriangleLayout,
        root: NodeRef,
        bounds: Aabb,
        num_primitives: usize,
        num_vertices: usize,
        nodes: BlockAllocator,
        primitives: BlockAllocator,
    ) -> Self {
        Self {
            layout,
            root,
            bounds,
            num_primitives,
            num_vertices,
            nodes,
            primitives,
        }
    }

    #[inline]
    pub fn layout(&self) -> TriangleLayout {
        self.layout
    }

    #[inline]
    pub fn root(&self) -> NodeRef {
        self.root
    }

    /// Bounds of all input primitives.
    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    #[inline]
    pub fn num_primitives(&self) -> usize {
        self.num_primitives
    }

    /// Vertex count of the input, recorded only for layouts that reference
    /// vertices indirectly (`Triangle4i`); zero otherwise.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Bytes reserved for interior nodes.
    #[inline]
    pub fn bytes_nodes(&self) -> usize {
        self.nodes.reserved()
    }

    /// Bytes reserved for leaf records.
    #[inline]
    pub fn bytes_primitives(&self) -> usize {
        self.primitives.reserved()
    }

    /// Bytes of node memory actually in use.
    #[inline]
    pub fn bytes_nodes_used(&self) -> usize {
        self.nodes.used()
    }

    /// Bytes of leaf memory actually in use.
    #[inline]
    pub fn bytes_primitives_used(&self) -> usize {
        self.primitives.used()
    }

    /// Resolves an interior reference.
    pub fn node(&self, r: NodeRef) -> &Node {
        assert!(r.is_node(), "leaf reference passed to node()");
        assert!(r.offset() + std::mem::size_of::<Node>() <= self.nodes.used());
        // Safety: the builder only encodes node refs for fully written nodes
        // inside the used part of the node arena, checked above.
        unsafe { self.nodes.typed_ref::<Node>(r.offset()) }
    }

    /// The `(geom_id, prim_id)` pairs stored in a leaf, in record order.
    pub fn leaf_triangles(&self, r: NodeRef) -> Vec<(u32, u32)> {
        assert!(r.is_leaf() && !r.is_empty(), "not a leaf reference");
        self.layout.leaf_triangles(&self.primitives, r)
    }
}
