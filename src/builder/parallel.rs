use rayon::prelude::*;

use super::binning::{BinMapping, Bins, ObjectSplit};
use super::primref::{PrimInfo, PrimRef};
use crate::aabb::Aabb;

/// Distributed binner for top-level splits.
///
/// `find` cuts the range into one contiguous chunk per task, copies each
/// chunk into the scratch while histogramming it, and reduces the histograms
/// to choose the split. `partition` reuses those histograms to compute each
/// task's destination windows and scatters the scratch back into the range,
/// keeping the chunk-relative order stable.
pub(crate) struct ParallelBinner {
    mapping: BinMapping,
    chunk: usize,
    bins: Vec<Bins>,
}

impl ParallelBinner {
    pub(crate) fn find(
        prims: &[PrimRef],
        tmp: &mut [PrimRef],
        cent_bounds: &Aabb,
        log_block_size: usize,
        num_tasks: usize,
    ) -> (Self, Option<ObjectSplit>) {
        debug_assert_eq!(prims.len(), tmp.len());
        let chunk = prims.len().div_ceil(num_tasks.max(1)).max(1);
        let mapping = BinMapping::new(cent_bounds);

        let bins: Vec<Bins> = prims
            .par_chunks(chunk)
            .zip(tmp.par_chunks_mut(chunk))
            .map(|(src, dst)| {
                dst.copy_from_slice(src);
                let mut bins = Bins::new();
                bins.bin_all(&mapping, src);
                bins
            })
            .collect();

        let mut total = Bins::new();
        for b in &bins {
            total.merge(b);
        }
        let split = total.best_split(&mapping, log_block_size);

        (
            Self {
                mapping,
                chunk,
                bins,
            },
            split,
        )
    }

    /// Scatters `tmp` back into `prims` around `split`. Returns the two
    /// aggregates and the index of the first right-side primitive.
    pub(crate) fn partition(
        &self,
        split: &ObjectSplit,
        tmp: &[PrimRef],
        prims: &mut [PrimRef],
    ) -> (PrimInfo, PrimInfo, usize) {
        debug_assert_eq!(prims.len(), tmp.len());

        // Per-task left counts come straight from the bin histograms; the
        // prefix sum turns them into scatter windows.
        let left_counts: Vec<usize> = self
            .bins
            .iter()
            .map(|b| b.count_left(split.axis, split.pos))
            .collect();
        let total_left: usize = left_counts.iter().sum();

        let (mut left_rest, mut right_rest) = prims.split_at_mut(total_left);
        let mut windows = Vec::with_capacity(self.bins.len());
        for (task, src) in tmp.chunks(self.chunk).enumerate() {
            let left_len = left_counts[task];
            let (left_win, tail) = std::mem::take(&mut left_rest).split_at_mut(left_len);
            left_rest = tail;
            let (right_win, tail) =
                std::mem::take(&mut right_rest).split_at_mut(src.len() - left_len);
            right_rest = tail;
            windows.push((src, left_win, right_win));
        }
        debug_assert!(left_rest.is_empty() && right_rest.is_empty());

        let mapping = self.mapping;
        let (left, right) = windows
            .into_par_iter()
            .map(|(src, left_win, right_win)| {
                let mut linfo = PrimInfo::empty();
                let mut rinfo = PrimInfo::empty();
                let mut li = 0;
                let mut ri = 0;
                for prim in src {
                    if mapping.bin(split.axis, prim.center()) < split.pos {
                        linfo.add(prim);
                        left_win[li] = *prim;
                        li += 1;
                    } else {
                        rinfo.add(prim);
                        right_win[ri] = *prim;
                        ri += 1;
                    }
                }
                debug_assert_eq!(li, left_win.len());
                debug_assert_eq!(ri, right_win.len());
                (linfo, rinfo)
            })
            .reduce(
                || (PrimInfo::empty(), PrimInfo::empty()),
                |(mut la, mut ra), (lb, rb)| {
                    la.merge(&lb);
                    ra.merge(&rb);
                    (la, ra)
                },
            );

        debug_assert_eq!(left.num, total_left);
        (left, right, total_left)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::builder::binning;

    struct Rng(u64);

    impl Rng {
        fn next(&mut self) -> f32 {
            self.0 ^= self.0 >> 12;
            self.0 ^= self.0 << 25;
            self.0 ^= self.0 >> 27;
            let bits = self.0.wrapping_mul(0x2545F4914F6CDD1D);
            (bits >> 40) as f32 / (1u64 << 24) as f32
        }
    }

    fn random_prims(n: usize, seed: u64) -> Vec<PrimRef> {
        let mut rng = Rng(seed);
        (0..n)
            .map(|i| {
                let lo = Vec3::new(
                    rng.next() * 100.0,
                    rng.next() * 100.0,
                    rng.next() * 100.0,
                );
                PrimRef::new(Aabb::new(lo, lo + Vec3::ONE), 0, i as u32)
            })
            .collect()
    }

    fn ids(prims: &[PrimRef]) -> Vec<u32> {
        let mut ids: Vec<u32> = prims.iter().map(|p| p.prim_id()).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn agrees_with_the_sequential_binner() {
        let prims = random_prims(5000, 7);
        let info = PrimInfo::from_prims(&prims);

        let (_, seq_split) = binning::find(&prims, &info.cent_bounds, 2);
        let mut tmp = prims.clone();
        let (binner, par_split) =
            ParallelBinner::find(&prims, &mut tmp, &info.cent_bounds, 2, 8);
        assert_eq!(seq_split, par_split, "same histograms, same split");
        let split = par_split.unwrap();

        let mut seq_prims = prims.clone();
        let mapping = BinMapping::new(&info.cent_bounds);
        let (seq_left, seq_right, seq_mid) =
            binning::partition(&mut seq_prims, &mapping, &split);

        let mut par_prims = prims.clone();
        let (par_left, par_right, par_mid) = binner.partition(&split, &tmp, &mut par_prims);

        assert_eq!(seq_mid, par_mid);
        assert_eq!(seq_left.num, par_left.num);
        assert_eq!(seq_right.num, par_right.num);
        assert_eq!(seq_left.geom_bounds, par_left.geom_bounds);
        assert_eq!(seq_right.geom_bounds, par_right.geom_bounds);
        assert_eq!(seq_left.cent_bounds, par_left.cent_bounds);
        assert_eq!(seq_right.cent_bounds, par_right.cent_bounds);

        // Same primitives on each side, independent of scatter order.
        assert_eq!(ids(&seq_prims[..seq_mid]), ids(&par_prims[..par_mid]));
        assert_eq!(ids(&seq_prims[seq_mid..]), ids(&par_prims[par_mid..]));
    }

    #[test]
    fn scatter_is_stable_within_each_side() {
        let prims = random_prims(1000, 99);
        let info = PrimInfo::from_prims(&prims);
        let mut tmp = prims.clone();
        let (binner, split) = ParallelBinner::find(&prims, &mut tmp, &info.cent_bounds, 0, 4);
        let split = split.unwrap();

        let mut out = prims.clone();
        let (_, _, mid) = binner.partition(&split, &tmp, &mut out);

        // Chunk layout preserved: ids ascend within each side because the
        // input was a single run of ascending ids.
        assert!(out[..mid].windows(2).all(|w| w[0].prim_id() < w[1].prim_id()));
        assert!(out[mid..].windows(2).all(|w| w[0].prim_id() < w[1].prim_id()));
    }

    #[test]
    fn degenerate_range_reports_no_split() {
        let prims = vec![random_prims(1, 3)[0]; 64];
        let info = PrimInfo::from_prims(&prims);
        let mut tmp = prims.clone();
        let (_, split) = ParallelBinner::find(&prims, &mut tmp, &info.cent_bounds, 0, 4);
        assert!(split.is_none());
    }
}
