//! Compressed sub-matrix maps.
//!
//! A sorted shell subset induces contiguous runs of AO indices in a parent
//! numbering. The map stores (parent offset, sub offset, length) triples
//! and supports block extraction and scatter-add, in symmetric
//! (rows = cols) and asymmetric (row map ≠ col map) forms.

extern crate nalgebra as na;

use basis::BasisSetMap;
use na::DMatrix;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmatCut {
    pub full_off: usize,
    pub sub_off: usize,
    pub len: usize,
}

#[derive(Debug, Clone)]
pub struct SubmatMap {
    cuts: Vec<SubmatCut>,
    nbe: usize,
}

impl SubmatMap {
    /// Map from a sorted shell subset into the full-basis AO numbering.
    pub fn new(shell_list: &[usize], map: &BasisSetMap) -> Self {
        Self::build(shell_list.iter().map(|&s| {
            (map.shell_to_first_ao(s), map.shell_size(s))
        }))
    }

    /// Map from a sorted shell subset into the AO numbering of a sorted
    /// parent subset (the union list of a shell-batched sub-problem).
    /// Every element of `shell_list` must appear in `parent_list`.
    pub fn new_relative(shell_list: &[usize], parent_list: &[usize], map: &BasisSetMap) -> Self {
        // AO offset of each parent shell within the parent numbering
        let mut parent_off = Vec::with_capacity(parent_list.len());
        let mut off = 0;
        for &s in parent_list {
            parent_off.push(off);
            off += map.shell_size(s);
        }
        Self::build(shell_list.iter().map(|&s| {
            let pos = parent_list
                .binary_search(&s)
                .expect("shell list not a subset of parent list");
            (parent_off[pos], map.shell_size(s))
        }))
    }

    fn build(runs: impl Iterator<Item = (usize, usize)>) -> Self {
        let mut cuts: Vec<SubmatCut> = Vec::new();
        let mut nbe = 0;
        for (full_off, len) in runs {
            match cuts.last_mut() {
                Some(last) if last.full_off + last.len == full_off => last.len += len,
                _ => cuts.push(SubmatCut {
                    full_off,
                    sub_off: nbe,
                    len,
                }),
            }
            nbe += len;
        }
        SubmatMap { cuts, nbe }
    }

    pub fn nbe(&self) -> usize {
        self.nbe
    }

    /// Number of maximal contiguous AO runs.
    pub fn ncut(&self) -> usize {
        self.cuts.len()
    }

    pub fn cuts(&self) -> &[SubmatCut] {
        &self.cuts
    }

    /// Parent AO offset of the single run, when the subset is contiguous.
    pub fn ibf_begin(&self) -> Option<usize> {
        if self.cuts.len() == 1 {
            Some(self.cuts[0].full_off)
        } else {
            None
        }
    }

    /// `sub ← full|_S` for the symmetric (row = col) map.
    pub fn extract(&self, full: &DMatrix<f64>, sub: &mut DMatrix<f64>) {
        extract_blocks(&self.cuts, &self.cuts, full, sub);
    }

    /// `full|_S ← full|_S + sub` for the symmetric map.
    pub fn scatter_add(&self, sub: &DMatrix<f64>, full: &mut DMatrix<f64>) {
        scatter_blocks(&self.cuts, &self.cuts, sub, full);
    }

    /// Asymmetric extraction: rows from `self`, columns from `col_map`.
    pub fn extract_asym(&self, col_map: &SubmatMap, full: &DMatrix<f64>, sub: &mut DMatrix<f64>) {
        extract_blocks(&self.cuts, &col_map.cuts, full, sub);
    }

    /// Asymmetric scatter-add: rows from `self`, columns from `col_map`.
    pub fn scatter_add_asym(
        &self,
        col_map: &SubmatMap,
        sub: &DMatrix<f64>,
        full: &mut DMatrix<f64>,
    ) {
        scatter_blocks(&self.cuts, &col_map.cuts, sub, full);
    }
}

fn extract_blocks(
    row_cuts: &[SubmatCut],
    col_cuts: &[SubmatCut],
    full: &DMatrix<f64>,
    sub: &mut DMatrix<f64>,
) {
    for rc in row_cuts {
        for cc in col_cuts {
            for j in 0..cc.len {
                for i in 0..rc.len {
                    sub[(rc.sub_off + i, cc.sub_off + j)] =
                        full[(rc.full_off + i, cc.full_off + j)];
                }
            }
        }
    }
}

fn scatter_blocks(
    row_cuts: &[SubmatCut],
    col_cuts: &[SubmatCut],
    sub: &DMatrix<f64>,
    full: &mut DMatrix<f64>,
) {
    for rc in row_cuts {
        for cc in col_cuts {
            for j in 0..cc.len {
                for i in 0..rc.len {
                    full[(rc.full_off + i, cc.full_off + j)] +=
                        sub[(rc.sub_off + i, cc.sub_off + j)];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basis::{BasisSet, Shell};
    use na::Vector3;

    // shells: s(1 AO), p(3), s(1), d(6), s(1) → AO offsets 0,1,4,5,11
    fn toy_map() -> BasisSetMap {
        let shells = vec![
            Shell::new(0, vec![1.0], vec![1.0], Vector3::zeros(), 0),
            Shell::new(1, vec![1.0], vec![1.0], Vector3::zeros(), 0),
            Shell::new(0, vec![0.5], vec![1.0], Vector3::zeros(), 0),
            Shell::new(2, vec![0.5], vec![1.0], Vector3::zeros(), 1),
            Shell::new(0, vec![0.3], vec![1.0], Vector3::zeros(), 1),
        ];
        BasisSetMap::new(&BasisSet::new(shells))
    }

    #[test]
    fn contiguous_runs_are_merged() {
        let map = toy_map();
        let sm = SubmatMap::new(&[0, 1, 3], &map);
        assert_eq!(sm.nbe(), 10);
        assert_eq!(sm.ncut(), 2);
        assert_eq!(sm.cuts()[0], SubmatCut { full_off: 0, sub_off: 0, len: 4 });
        assert_eq!(sm.cuts()[1], SubmatCut { full_off: 5, sub_off: 4, len: 6 });
        assert!(sm.ibf_begin().is_none());

        let single = SubmatMap::new(&[1, 2], &map);
        assert_eq!(single.ncut(), 1);
        assert_eq!(single.ibf_begin(), Some(1));
    }

    #[test]
    fn extract_scatter_round_trip() {
        let map = toy_map();
        let nbf = 12;
        let full = DMatrix::from_fn(nbf, nbf, |i, j| (i * nbf + j) as f64);
        let sm = SubmatMap::new(&[0, 2, 3], &map);
        let mut sub = DMatrix::zeros(sm.nbe(), sm.nbe());
        sm.extract(&full, &mut sub);

        // scatter back onto zero must reproduce the restriction of `full`
        let mut back = DMatrix::zeros(nbf, nbf);
        sm.scatter_add(&sub, &mut back);
        let sel = [0usize, 4, 5, 6, 7, 8, 9, 10];
        for &i in &sel {
            for &j in &sel {
                assert_eq!(back[(i, j)], full[(i, j)]);
            }
        }
        // everything outside the sub-support stays zero
        assert_eq!(back[(1, 1)], 0.0);
        assert_eq!(back[(0, 2)], 0.0);
        assert_eq!(back.sum(), sub.sum());
    }

    #[test]
    fn scatter_add_accumulates() {
        let map = toy_map();
        let sm = SubmatMap::new(&[2], &map);
        let sub = DMatrix::from_element(1, 1, 2.5);
        let mut full = DMatrix::zeros(12, 12);
        sm.scatter_add(&sub, &mut full);
        sm.scatter_add(&sub, &mut full);
        assert_eq!(full[(4, 4)], 5.0);
    }

    #[test]
    fn relative_map_against_union() {
        let map = toy_map();
        // union {0,1,3}: AO offsets within union: shell0→0, shell1→1, shell3→4
        let rel = SubmatMap::new_relative(&[0, 3], &[0, 1, 3], &map);
        assert_eq!(rel.nbe(), 7);
        assert_eq!(rel.cuts()[0], SubmatCut { full_off: 0, sub_off: 0, len: 1 });
        assert_eq!(rel.cuts()[1], SubmatCut { full_off: 4, sub_off: 1, len: 6 });
    }

    #[test]
    fn asym_round_trip() {
        let map = toy_map();
        let rows = SubmatMap::new(&[0, 1], &map);
        let cols = SubmatMap::new(&[3, 4], &map);
        let full = DMatrix::from_fn(12, 12, |i, j| (i + 100 * j) as f64);
        let mut sub = DMatrix::zeros(rows.nbe(), cols.nbe());
        rows.extract_asym(&cols, &full, &mut sub);
        assert_eq!(sub[(0, 0)], full[(0, 5)]);
        assert_eq!(sub[(3, 6)], full[(3, 11)]);

        let mut back = DMatrix::zeros(12, 12);
        rows.scatter_add_asym(&cols, &sub, &mut back);
        assert_eq!(back[(2, 6)], full[(2, 6)]);
        assert_eq!(back[(5, 5)], 0.0);
    }
}
