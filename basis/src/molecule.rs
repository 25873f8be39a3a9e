//! Molecule and pairwise geometry metadata.

extern crate nalgebra as na;

use na::{DMatrix, Vector3};
use periodic_table_on_an_enum::Element;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atom {
    pub element: String,
    pub coords: [f64; 3],
}

impl Atom {
    pub fn new(symbol: &str, coords: Vector3<f64>) -> Self {
        Atom {
            element: symbol.to_string(),
            coords: [coords.x, coords.y, coords.z],
        }
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.coords[0], self.coords[1], self.coords[2])
    }

    pub fn atomic_number(&self) -> u32 {
        Element::from_symbol(&self.element)
            .map(|e| e.get_atomic_number() as u32)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct Molecule {
    pub atoms: Vec<Atom>,
}

impl Molecule {
    pub fn new(atoms: Vec<Atom>) -> Self {
        Molecule { atoms }
    }

    pub fn natoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.atoms.iter().map(|a| a.position()).collect()
    }
}

/// Derived pairwise geometry: interatomic distances and, per atom, the
/// distance to its nearest neighbour (consumed by the weight partitioner).
#[derive(Debug, Clone)]
pub struct MolMeta {
    pub rab: DMatrix<f64>,
    pub dist_nearest: Vec<f64>,
}

impl MolMeta {
    pub fn new(mol: &Molecule) -> Self {
        let n = mol.natoms();
        let pos = mol.positions();
        let mut rab = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                rab[(i, j)] = (pos[i] - pos[j]).norm();
            }
        }
        let dist_nearest = (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| j != i)
                    .map(|j| rab[(i, j)])
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        MolMeta { rab, dist_nearest }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_distances() {
        let mol = Molecule::new(vec![
            Atom::new("H", Vector3::new(0.0, 0.0, 0.0)),
            Atom::new("H", Vector3::new(0.0, 0.0, 1.4)),
            Atom::new("O", Vector3::new(0.0, 3.0, 0.0)),
        ]);
        let meta = MolMeta::new(&mol);
        assert_eq!(meta.rab[(0, 1)], 1.4);
        assert_eq!(meta.dist_nearest[0], 1.4);
        assert!(meta.dist_nearest[2] > 3.0 - 1e-12);
        assert_eq!(mol.atoms[2].atomic_number(), 8);
    }
}
