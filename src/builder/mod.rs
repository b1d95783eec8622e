pub(crate) mod alloc;
pub(crate) mod binning;
pub(crate) mod parallel;
pub(crate) mod primref;
pub(crate) mod state;
pub(crate) mod trirefgen;

use std::cell::UnsafeCell;
use std::sync::OnceLock;

use self::alloc::{BlockAllocator, LocalAllocator, BLOCK_SIZE};
use self::parallel::ParallelBinner;
use self::primref::{BuildRecord, ParentSlot, PrimInfo, PrimRef};
use self::state::BuildState;

use crate::aabb::Aabb;
use crate::bvh::{Bvh4, Node, NodeRef};
use crate::packet::TriangleLayout;
use crate::scene::{Scene, TriangleMesh};

/// Subtree-phase children above this size go onto the worker's stack;
/// smaller ones recurse inline.
const THRESHOLD_FOR_SUBTREE_RECURSION: usize = 128;

/// Single-mesh builds below this size are not worth the parallel machinery.
const PARALLEL_MESH_THRESHOLD: usize = 50_000;

/// Ways a build can fail. Splitting failures are recovered internally by the
/// median fallback and never surface here.
#[derive(Debug)]
pub enum BuildError {
    /// An arena ran past its reservation.
    OutOfMemory,
    /// A leaf was requested deeper than the hard depth bound.
    DepthLimitExceeded,
    /// The worker pool could not be brought up.
    Scheduler(rayon::ThreadPoolBuildError),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::OutOfMemory => write!(f, "arena reservation exhausted"),
            BuildError::DepthLimitExceeded => write!(f, "build depth limit reached"),
            BuildError::Scheduler(e) => write!(f, "scheduler error: {}", e),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<rayon::ThreadPoolBuildError> for BuildError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        BuildError::Scheduler(e)
    }
}

/// Where the input triangles come from: a whole scene or one mesh that keeps
/// its id from the scene it belongs to.
pub(crate) enum MeshSource<'a> {
    Scene(&'a Scene),
    Mesh { mesh: &'a TriangleMesh, geom_id: u32 },
}

impl<'a> MeshSource<'a> {
    pub(crate) fn meshes(&self) -> Vec<(u32, &'a TriangleMesh)> {
        match self {
            MeshSource::Scene(scene) => scene.build_meshes().collect(),
            MeshSource::Mesh { mesh, geom_id } => vec![(*geom_id, *mesh)],
        }
    }

    pub(crate) fn mesh(&self, geom_id: u32) -> &'a TriangleMesh {
        match self {
            MeshSource::Scene(scene) => scene.triangle_mesh(geom_id),
            MeshSource::Mesh { mesh, .. } => *mesh,
        }
    }

    pub(crate) fn num_primitives(&self) -> usize {
        self.meshes().iter().map(|(_, m)| m.num_triangles()).sum()
    }

    pub(crate) fn num_vertices(&self) -> usize {
        self.meshes().iter().map(|(_, m)| m.num_vertices()).sum()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Mode {
    /// Heap expansion: children go back onto the shared heap, leaves are
    /// never produced.
    TopLevel,
    /// Subtree phase: large children go onto the worker's stack.
    RecurseParallel,
    /// Plain depth-first recursion.
    RecurseSequential,
}

/// Shared view of the PrimRef array for the subtree phase.
///
/// Disjoint subranges are owned by exactly one live BuildRecord at a time,
/// so handing each owner a mutable slice of its range cannot alias.
struct SharedPrims {
    ptr: *mut PrimRef,
    len: usize,
}

// Safety: see type comment; records only travel between threads through the
// locked heap and work stacks, which order the accesses.
unsafe impl Send for SharedPrims {}
unsafe impl Sync for SharedPrims {}

impl SharedPrims {
    fn new(prims: &mut [PrimRef]) -> Self {
        Self {
            ptr: prims.as_mut_ptr(),
            len: prims.len(),
        }
    }

    /// # Safety
    /// The caller must hold the BuildRecord owning `[begin, end)`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    unsafe fn range_mut(&self, begin: usize, end: usize) -> &mut [PrimRef] {
        debug_assert!(begin <= end && end <= self.len);
        std::slice::from_raw_parts_mut(self.ptr.add(begin), end - begin)
    }
}

/// Builds [`Bvh4`] hierarchies over a scene or a single mesh.
///
/// One builder can run many builds (the parallel build state is created once
/// and reused), but builds must not overlap in time.
pub struct Bvh4Builder<'a> {
    source: MeshSource<'a>,
    layout: TriangleLayout,
    state: OnceLock<BuildState>,
}

impl<'a> Bvh4Builder<'a> {
    pub fn new(scene: &'a Scene, layout: TriangleLayout) -> Self {
        Self {
            source: MeshSource::Scene(scene),
            layout,
            state: OnceLock::new(),
        }
    }

    /// Builds over one mesh, tagging leaves with the mesh's scene id.
    pub fn for_mesh(mesh: &'a TriangleMesh, geom_id: u32, layout: TriangleLayout) -> Self {
        Self {
            source: MeshSource::Mesh { mesh, geom_id },
            layout,
            state: OnceLock::new(),
        }
    }

    /// Runs a build on up to `thread_count` threads and returns the finished
    /// hierarchy.
    pub fn build(&mut self, thread_count: usize) -> Result<Bvh4, BuildError> {
        let num_primitives = self.source.num_primitives();
        let num_vertices = if self.layout.need_vertices() {
            self.source.num_vertices()
        } else {
            0
        };

        if num_primitives == 0 {
            return Ok(Bvh4::new(
                self.layout,
                NodeRef::EMPTY,
                Aabb::EMPTY,
                0,
                num_vertices,
                BlockAllocator::new(0),
                BlockAllocator::new(0),
            ));
        }

        let thread_count = thread_count.max(1);
        let parallel = thread_count > 1
            && match &self.source {
                MeshSource::Mesh { mesh, .. } => mesh.num_triangles() > PARALLEL_MESH_THRESHOLD,
                MeshSource::Scene(_) => true,
            };

        let (nodes, primitives) =
            self.make_arenas(num_primitives, if parallel { thread_count } else { 1 });
        let mut prims = vec![PrimRef::new(Aabb::EMPTY, 0, 0); num_primitives];
        let root_slot = UnsafeCell::new(NodeRef::EMPTY);

        let info = if parallel {
            self.build_parallel(&mut prims, &nodes, &primitives, &root_slot, thread_count)?
        } else {
            self.build_sequential(&mut prims, &nodes, &primitives, &root_slot)?
        };

        Ok(Bvh4::new(
            self.layout,
            root_slot.into_inner(),
            info.geom_bounds,
            num_primitives,
            num_vertices,
            nodes,
            primitives,
        ))
    }

    /// Sizes the two arenas. 64-bit hosts reserve generously (the pages are
    /// only touched as the bump pointers advance); elsewhere 1.5x of the
    /// expected usage. The primitive reservation is lower-bounded by the
    /// PrimRef array size because the parallel partition borrows that arena
    /// as scratch. One pad block per thread absorbs block fragmentation.
    fn make_arenas(
        &self,
        num_primitives: usize,
        additional_blocks: usize,
    ) -> (BlockAllocator, BlockAllocator) {
        let prim_bytes = self.layout.prim_bytes();
        let node_bytes = std::mem::size_of::<Node>();
        let bytes_prim_refs = num_primitives * std::mem::size_of::<PrimRef>();

        #[cfg(target_pointer_width = "64")]
        let (reserved_nodes, reserved_prims) = (
            2 * num_primitives * node_bytes,
            2 * num_primitives * prim_bytes,
        );
        #[cfg(not(target_pointer_width = "64"))]
        let (reserved_nodes, reserved_prims) = {
            let block = 1usize << self.layout.log_block_size();
            let prim_blocks = (num_primitives + block - 1) / block;
            let est_nodes = (prim_blocks * 6 / 10).min(num_primitives) * node_bytes;
            let est_prims = (prim_blocks * 12 / 10).min(num_primitives) * prim_bytes;
            (est_nodes * 3 / 2, est_prims * 3 / 2)
        };

        let pad = additional_blocks * BLOCK_SIZE;
        (
            BlockAllocator::new(reserved_nodes + pad),
            BlockAllocator::new(reserved_prims.max(bytes_prim_refs) + pad),
        )
    }

    fn build_sequential(
        &self,
        prims: &mut [PrimRef],
        nodes: &BlockAllocator,
        leafs: &BlockAllocator,
        root_slot: &UnsafeCell<NodeRef>,
    ) -> Result<PrimInfo, BuildError> {
        let info = trirefgen::generate_sequential(&self.source, prims);
        let record = BuildRecord::new(&info, 0, prims.len(), 1, ParentSlot::new(root_slot.get()));

        let run = Run {
            source: &self.source,
            layout: self.layout,
            min_leaf_size: self.layout.min_leaf_size(),
            log_block_size: self.layout.log_block_size(),
            prims: SharedPrims::new(prims),
            nodes,
            leafs,
            state: None,
            num_threads: 1,
        };

        let mut node_alloc = LocalAllocator::new(nodes);
        let mut leaf_alloc = LocalAllocator::new(leafs);
        run.recurse(
            record,
            &mut node_alloc,
            &mut leaf_alloc,
            Mode::RecurseSequential,
            0,
        )?;
        Ok(info)
    }

    fn build_parallel(
        &self,
        prims: &mut [PrimRef],
        nodes: &BlockAllocator,
        leafs: &BlockAllocator,
        root_slot: &UnsafeCell<NodeRef>,
        thread_count: usize,
    ) -> Result<PrimInfo, BuildError> {
        let state = self.state.get_or_init(|| BuildState::new(thread_count));
        // The state keeps the stack count of its first build.
        let num_threads = thread_count.min(state.stacks.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?;

        state.reset();
        let info = pool.install(|| trirefgen::generate_parallel(&self.source, &mut *prims));

        let run = Run {
            source: &self.source,
            layout: self.layout,
            min_leaf_size: self.layout.min_leaf_size(),
            log_block_size: self.layout.log_block_size(),
            prims: SharedPrims::new(prims),
            nodes,
            leafs,
            state: Some(state),
            num_threads,
        };

        state.heap.push(BuildRecord::new(
            &info,
            0,
            run.prims.len,
            1,
            ParentSlot::new(root_slot.get()),
        ));

        // Phase A: expand the largest record until there is a subtree per
        // thread. Every child re-enters the heap; a top record at leaf size
        // means everything left is small, so hand it all to phase B.
        pool.install(|| -> Result<(), BuildError> {
            let mut node_alloc = LocalAllocator::new(nodes);
            let mut leaf_alloc = LocalAllocator::new(leafs);
            while state.heap.len() < num_threads {
                let Some(record) = state.heap.pop() else { break };
                if record.size() <= run.min_leaf_size {
                    state.heap.push(record);
                    break;
                }
                run.recurse(record, &mut node_alloc, &mut leaf_alloc, Mode::TopLevel, 0)?;
            }
            Ok(())
        })?;

        // Phase B: every worker drains the heap, then steals.
        pool.broadcast(|ctx| run.build_subtrees(ctx.index()));

        match state.take_failure() {
            Some(error) => Err(error),
            None => Ok(info),
        }
    }
}

/// Borrowed context of one running build, shared by all of its workers.
struct Run<'b> {
    source: &'b MeshSource<'b>,
    layout: TriangleLayout,
    min_leaf_size: usize,
    log_block_size: usize,
    prims: SharedPrims,
    nodes: &'b BlockAllocator,
    leafs: &'b BlockAllocator,
    state: Option<&'b BuildState>,
    num_threads: usize,
}

impl Run<'_> {
    /// Splits `cur` and returns the two aggregates and the global mid index.
    fn split(&self, cur: &BuildRecord, mode: Mode) -> (PrimInfo, usize, PrimInfo) {
        if mode == Mode::TopLevel {
            self.split_parallel(cur)
        } else {
            self.split_sequential(cur)
        }
    }

    fn split_sequential(&self, cur: &BuildRecord) -> (PrimInfo, usize, PrimInfo) {
        // Safety: the caller owns `cur`, hence its range.
        let slice = unsafe { self.prims.range_mut(cur.begin, cur.end) };
        let (mapping, split) = binning::find(slice, &cur.cent_bounds, self.log_block_size);
        let (left, right, mid) = match split {
            Some(split) => binning::partition(slice, &mapping, &split),
            None => binning::split_fallback(slice),
        };
        (left, cur.begin + mid, right)
    }

    fn split_parallel(&self, cur: &BuildRecord) -> (PrimInfo, usize, PrimInfo) {
        // Safety: the caller owns `cur`, hence its range.
        let slice = unsafe { self.prims.range_mut(cur.begin, cur.end) };
        // Safety: top-level splits all finish before the first leaf is
        // written, so the front of the primitive arena is unclaimed; PrimRef
        // is plain data, every bit pattern of it is valid.
        let scratch = unsafe { self.leafs.scratch::<PrimRef>(self.prims.len) };
        let tmp = &mut scratch[cur.begin..cur.end];

        let (binner, split) =
            ParallelBinner::find(slice, tmp, &cur.cent_bounds, self.log_block_size, self.num_threads);
        let (left, right, mid) = match split {
            Some(split) => binner.partition(&split, tmp, slice),
            None => binning::split_fallback(slice),
        };
        (left, cur.begin + mid, right)
    }

    /// Expands `cur` into up to four children, always splitting the child
    /// with the largest bounds that can still be split, then recurses.
    fn recurse(
        &self,
        cur: BuildRecord,
        node_alloc: &mut LocalAllocator<'_>,
        leaf_alloc: &mut LocalAllocator<'_>,
        mode: Mode,
        thread_id: usize,
    ) -> Result<(), BuildError> {
        if cur.depth >= Bvh4::MAX_BUILD_DEPTH || cur.size() <= self.min_leaf_size {
            debug_assert!(mode != Mode::TopLevel);
            return self.create_leaf(cur, node_alloc, leaf_alloc);
        }

        let mut children = [cur; Node::N];
        let mut num_children = 1;
        while num_children < Node::N {
            let mut best = None;
            let mut best_area = f32::NEG_INFINITY;
            for (i, child) in children[..num_children].iter().enumerate() {
                if child.size() <= self.min_leaf_size {
                    continue;
                }
                if child.area() > best_area {
                    best_area = child.area();
                    best = Some(i);
                }
            }
            let Some(best) = best else { break };

            let target = children[best];
            let (left, mid, right) = self.split(&target, mode);
            let depth = cur.depth + 1;
            let null = ParentSlot::new(std::ptr::null_mut());
            children[best] = children[num_children - 1];
            children[num_children - 1] =
                BuildRecord::new(&left, target.begin, mid, depth, null);
            children[num_children] = BuildRecord::new(&right, mid, target.end, depth, null);
            num_children += 1;
        }

        if num_children == 1 {
            debug_assert!(mode != Mode::TopLevel);
            return self.create_leaf(cur, node_alloc, leaf_alloc);
        }

        let node_ofs = node_alloc.alloc(std::mem::size_of::<Node>())?;
        // Safety: fresh grant, exclusive to this call.
        let node = unsafe { self.nodes.typed_mut::<Node>(node_ofs) };
        *node = Node::cleared();
        // Safety: we own `cur`; the slot is written exactly once.
        unsafe { cur.parent.write(NodeRef::node(node_ofs)) };

        for (slot, child) in children[..num_children].iter().enumerate() {
            node.set_bounds(slot, &child.geom_bounds);
        }
        // Shared from here on: child slots are interior-mutable and may be
        // written by whichever worker ends up with the record.
        let node = &*node;
        for (slot, child) in children[..num_children].iter_mut().enumerate() {
            child.parent = ParentSlot::new(node.child_slot(slot));
        }
        for child in children[..num_children].iter() {
            self.recurse_continue(*child, node_alloc, leaf_alloc, mode, thread_id)?;
        }
        Ok(())
    }

    fn recurse_continue(
        &self,
        record: BuildRecord,
        node_alloc: &mut LocalAllocator<'_>,
        leaf_alloc: &mut LocalAllocator<'_>,
        mode: Mode,
        thread_id: usize,
    ) -> Result<(), BuildError> {
        match mode {
            Mode::TopLevel => {
                self.state.expect("top level runs with state").heap.push(record);
                Ok(())
            }
            Mode::RecurseParallel if record.size() > THRESHOLD_FOR_SUBTREE_RECURSION => {
                let state = self.state.expect("parallel recursion runs with state");
                if state.stacks[thread_id].push(record) {
                    Ok(())
                } else {
                    // Stack full: finish this subtree depth-first instead.
                    self.recurse(
                        record,
                        node_alloc,
                        leaf_alloc,
                        Mode::RecurseSequential,
                        thread_id,
                    )
                }
            }
            _ => self.recurse(record, node_alloc, leaf_alloc, mode, thread_id),
        }
    }

    /// Emits a leaf for `cur`. Ranges still above the leaf size at this
    /// point ran out of depth; they are chopped by two levels of median
    /// splits until the pieces fit, within the hard depth bound.
    fn create_leaf(
        &self,
        cur: BuildRecord,
        node_alloc: &mut LocalAllocator<'_>,
        leaf_alloc: &mut LocalAllocator<'_>,
    ) -> Result<(), BuildError> {
        if cur.depth > Bvh4::MAX_BUILD_DEPTH_LEAF {
            return Err(BuildError::DepthLimitExceeded);
        }

        if cur.size() <= self.min_leaf_size {
            // Safety: we own `cur`; the writer only reads the slice.
            let slice = unsafe { self.prims.range_mut(cur.begin, cur.end) };
            let leaf = self.layout.write_leaf(self.source, slice, leaf_alloc)?;
            // Safety: we own `cur`; the slot is written exactly once.
            unsafe { cur.parent.write(leaf) };
            return Ok(());
        }

        // Two median levels give up to four children; single-primitive
        // pieces are not split further.
        let mut children: Vec<(PrimInfo, usize, usize)> = Vec::with_capacity(Node::N);
        let (l, mid, r) = self.fallback_split(cur.begin, cur.end);
        for (info, begin, end) in [(l, cur.begin, mid), (r, mid, cur.end)] {
            if end - begin >= 2 {
                let (cl, cmid, cr) = self.fallback_split(begin, end);
                children.push((cl, begin, cmid));
                children.push((cr, cmid, end));
            } else {
                children.push((info, begin, end));
            }
        }

        let node_ofs = node_alloc.alloc(std::mem::size_of::<Node>())?;
        // Safety: fresh grant, exclusive to this call.
        let node = unsafe { self.nodes.typed_mut::<Node>(node_ofs) };
        *node = Node::cleared();
        // Safety: we own `cur`; the slot is written exactly once.
        unsafe { cur.parent.write(NodeRef::node(node_ofs)) };

        for (slot, (info, _, _)) in children.iter().enumerate() {
            node.set_bounds(slot, &info.geom_bounds);
        }
        for (slot, (info, begin, end)) in children.iter().enumerate() {
            let record = BuildRecord::new(
                info,
                *begin,
                *end,
                cur.depth + 1,
                ParentSlot::new(node.child_slot(slot)),
            );
            self.create_leaf(record, node_alloc, leaf_alloc)?;
        }
        node.compact();
        Ok(())
    }

    fn fallback_split(&self, begin: usize, end: usize) -> (PrimInfo, usize, PrimInfo) {
        // Safety: called only on subranges of a record the caller owns.
        let slice = unsafe { self.prims.range_mut(begin, end) };
        let (left, right, mid) = binning::split_fallback(slice);
        (left, begin + mid, right)
    }

    /// Phase B worker: drain the heap, then sweep the other workers' stacks
    /// for something to steal; between records, drain the own stack.
    fn build_subtrees(&self, thread_id: usize) {
        let state = self.state.expect("subtree phase runs with state");
        let mut node_alloc = LocalAllocator::new(self.nodes);
        let mut leaf_alloc = LocalAllocator::new(self.leafs);

        loop {
            if state.failed() {
                return;
            }
            let record = state.heap.pop().or_else(|| {
                (1..self.num_threads)
                    .find_map(|i| state.stacks[(thread_id + i) % self.num_threads].pop())
            });
            let Some(record) = record else { return };

            if let Err(error) = self.recurse(
                record,
                &mut node_alloc,
                &mut leaf_alloc,
                Mode::RecurseParallel,
                thread_id,
            ) {
                state.fail(error);
                return;
            }
            while let Some(record) = state.stacks[thread_id].pop() {
                if state.failed() {
                    return;
                }
                if let Err(error) = self.recurse(
                    record,
                    &mut node_alloc,
                    &mut leaf_alloc,
                    Mode::RecurseParallel,
                    thread_id,
                ) {
                    state.fail(error);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3A;

    use super::*;

    fn strip_scene(n: usize) -> Scene {
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();
        for i in 0..n {
            let base = (i * 3) as u32;
            let x = i as f32;
            vertices.push(Vec3A::new(x, 0.0, 0.0));
            vertices.push(Vec3A::new(x + 1.0, 0.0, 0.0));
            vertices.push(Vec3A::new(x, 1.0, 0.0));
            triangles.push([base, base + 1, base + 2]);
        }
        let mut scene = Scene::new();
        scene.add_mesh(TriangleMesh::new(vertices, triangles));
        scene
    }

    fn leaf_depths(bvh: &Bvh4, r: NodeRef, depth: u32, out: &mut Vec<(u32, usize)>) {
        if r.is_leaf() {
            out.push((depth, bvh.leaf_triangles(r).len()));
            return;
        }
        let node = bvh.node(r);
        for slot in 0..node.num_children() {
            leaf_depths(bvh, node.child(slot), depth + 1, out);
        }
    }

    #[test]
    fn depth_capped_ranges_fall_back_to_median_leaves() {
        let scene = strip_scene(16);
        let source = MeshSource::Scene(&scene);
        let layout = TriangleLayout::Triangle1;
        let nodes = BlockAllocator::new(1 << 16);
        let leafs = BlockAllocator::new(1 << 16);

        let mut prims = vec![PrimRef::new(Aabb::EMPTY, 0, 0); 16];
        let info = trirefgen::generate_sequential(&source, &mut prims);
        let root_slot = UnsafeCell::new(NodeRef::EMPTY);

        let run = Run {
            source: &source,
            layout,
            min_leaf_size: layout.min_leaf_size(),
            log_block_size: layout.log_block_size(),
            prims: SharedPrims::new(&mut prims),
            nodes: &nodes,
            leafs: &leafs,
            state: None,
            num_threads: 1,
        };
        let record = BuildRecord::new(
            &info,
            0,
            16,
            Bvh4::MAX_BUILD_DEPTH + 1,
            ParentSlot::new(root_slot.get()),
        );
        let mut node_alloc = LocalAllocator::new(&nodes);
        let mut leaf_alloc = LocalAllocator::new(&leafs);
        run.create_leaf(record, &mut node_alloc, &mut leaf_alloc)
            .unwrap();

        let bvh = Bvh4::new(
            layout,
            root_slot.into_inner(),
            info.geom_bounds,
            16,
            0,
            nodes,
            leafs,
        );
        let mut leaves = Vec::new();
        leaf_depths(&bvh, bvh.root(), Bvh4::MAX_BUILD_DEPTH + 1, &mut leaves);

        assert_eq!(leaves.iter().map(|&(_, n)| n).sum::<usize>(), 16);
        for &(depth, items) in &leaves {
            assert!(items >= 1 && items <= layout.min_leaf_size());
            assert!(depth > Bvh4::MAX_BUILD_DEPTH);
            assert!(depth <= Bvh4::MAX_BUILD_DEPTH_LEAF);
        }
    }

    #[test]
    fn leaves_past_the_hard_depth_bound_fail() {
        let scene = strip_scene(2);
        let source = MeshSource::Scene(&scene);
        let layout = TriangleLayout::Triangle1;
        let nodes = BlockAllocator::new(1 << 14);
        let leafs = BlockAllocator::new(1 << 14);

        let mut prims = vec![PrimRef::new(Aabb::EMPTY, 0, 0); 2];
        let info = trirefgen::generate_sequential(&source, &mut prims);
        let root_slot = UnsafeCell::new(NodeRef::EMPTY);

        let run = Run {
            source: &source,
            layout,
            min_leaf_size: layout.min_leaf_size(),
            log_block_size: layout.log_block_size(),
            prims: SharedPrims::new(&mut prims),
            nodes: &nodes,
            leafs: &leafs,
            state: None,
            num_threads: 1,
        };
        let record = BuildRecord::new(
            &info,
            0,
            2,
            Bvh4::MAX_BUILD_DEPTH_LEAF + 1,
            ParentSlot::new(root_slot.get()),
        );
        let mut node_alloc = LocalAllocator::new(&nodes);
        let mut leaf_alloc = LocalAllocator::new(&leafs);
        let result = run.create_leaf(record, &mut node_alloc, &mut leaf_alloc);
        assert!(matches!(result, Err(BuildError::DepthLimitExceeded)));
    }
}
