//! Compression of the atomic index space of force constants, using lattice
//! translations, permutations of the tensor slots and an optional cutoff
//! distance.
//!
//! A full atomic tuple `(i, j[, k])` is translated so that its first atom is
//! the independent atom of its translation class. The resulting
//! independent-first tuples `(p, j[, k])` which are not excluded by the cutoff
//! are numbered in `p`-major, then `j`, then `k` order: this is the compact
//! tuple index. Compact vector indexes are `tuple · 3^r + cartesian`.
use log::info;

use crate::Error;
use crate::math::sparse::{self, SparseMatrix};
use crate::symmetry::{SymmetryContext, TranslationPermutations};

mod order;
pub use self::order::FcOrder;

const EXCLUDED: usize = usize::MAX;

/// Compact numbering of the force constants entries of a given order
#[derive(Debug, Clone)]
pub struct IndexCompressor {
    order: FcOrder,
    cutoff: Option<f64>,
    translations: TranslationPermutations,
    /// compact tuple index for each uncut independent-first tuple, flattened
    /// as `(p · N + j) · N + k`, or `EXCLUDED`
    tuple_index: Vec<usize>,
    /// flattened uncut independent-first tuple for each compact tuple
    tuples: Vec<usize>,
}

impl IndexCompressor {
    /// Build the compact numbering of force constants of the given `order`
    /// for the supercell in `ctx`. If `cutoff` is given, all tuples where two
    /// atoms are farther apart than the cutoff are excluded.
    #[time_graph::instrument(name = "IndexCompressor::new")]
    pub fn new(ctx: &SymmetryContext<'_>, order: FcOrder, cutoff: Option<f64>) -> Result<IndexCompressor, Error> {
        if let Some(cutoff) = cutoff {
            if !(cutoff > 0.0) {
                return Err(Error::InvalidParameter(format!(
                    "cutoff must be positive, got {}", cutoff
                )));
            }
        }

        let supercell = ctx.supercell();
        let translations = ctx.translations().clone();
        let n_atoms = translations.n_atoms();
        let n_independent = translations.n_independent();

        let distances = cutoff.map(|_| {
            let mut distances = vec![0.0; n_atoms * n_atoms];
            for i in 0..n_atoms {
                for j in (i + 1)..n_atoms {
                    let distance = supercell.distance(i, j);
                    distances[i * n_atoms + j] = distance;
                    distances[j * n_atoms + i] = distance;
                }
            }
            distances
        });

        let is_retained = |atoms: &[usize]| -> bool {
            match (&distances, cutoff) {
                (Some(distances), Some(cutoff)) => {
                    for (position, &first) in atoms.iter().enumerate() {
                        for &second in &atoms[(position + 1)..] {
                            if distances[first * n_atoms + second] > cutoff {
                                return false;
                            }
                        }
                    }
                    true
                }
                _ => true,
            }
        };

        let n_uncut = n_independent * n_atoms.pow(order.rank() as u32 - 1);
        let mut tuple_index = vec![EXCLUDED; n_uncut];
        let mut tuples = Vec::new();
        for (flat, index) in tuple_index.iter_mut().enumerate() {
            let atoms = decode(flat, order, n_atoms, translations.independent_atoms());
            if is_retained(&atoms[..order.rank()]) {
                *index = tuples.len();
                tuples.push(flat);
            }
        }

        info!(
            "{} compression: {} independent atoms, {} of {} atomic tuples retained",
            order, n_independent, tuples.len(), n_uncut
        );

        return Ok(IndexCompressor {
            order,
            cutoff,
            translations,
            tuple_index,
            tuples,
        });
    }

    /// Order of the force constants
    pub fn order(&self) -> FcOrder {
        self.order
    }

    /// Cutoff distance used to exclude tuples, if any
    pub fn cutoff(&self) -> Option<f64> {
        self.cutoff
    }

    /// Number of atoms in the supercell
    pub fn n_atoms(&self) -> usize {
        self.translations.n_atoms()
    }

    /// Number of lattice translations
    pub fn n_lp(&self) -> usize {
        self.translations.n_lp()
    }

    /// Independent atoms, one per translation class
    pub fn independent_atoms(&self) -> &[usize] {
        self.translations.independent_atoms()
    }

    /// Lattice translations used for the compression
    pub fn translations(&self) -> &TranslationPermutations {
        &self.translations
    }

    /// Number of retained compact atomic tuples
    pub fn n_tuples(&self) -> usize {
        self.tuples.len()
    }

    /// Number of uncut independent-first tuples, `n_a · N^(r-1)`
    pub fn n_uncut_tuples(&self) -> usize {
        self.tuple_index.len()
    }

    /// Dimension of the compact space, `n_tuples · 3^r`
    pub fn dimension(&self) -> usize {
        self.n_tuples() * self.order.cartesian_size()
    }

    /// Get the compact tuple index of the full atomic tuple `atoms`, or
    /// `None` if the tuple is excluded by the cutoff
    pub fn compact_tuple(&self, atoms: &[usize]) -> Option<usize> {
        debug_assert_eq!(atoms.len(), self.order.rank());
        let n_atoms = self.n_atoms();

        let (p, l) = self.translations.origin(atoms[0]);
        let inverse = self.translations.inverse(l);
        let flat = atoms[1..].iter().fold(p, |acc, &atom| acc * n_atoms + inverse[atom]);

        match self.tuple_index[flat] {
            EXCLUDED => None,
            tuple => Some(tuple),
        }
    }

    /// Get the compact vector index of the full atomic tuple `atoms` with
    /// flattened Cartesian index `cartesian`
    pub fn compact_index(&self, atoms: &[usize], cartesian: usize) -> Option<usize> {
        self.compact_tuple(atoms).map(|tuple| tuple * self.order.cartesian_size() + cartesian)
    }

    /// Get the independent-first atomic tuple corresponding to the compact
    /// tuple `tuple`. Only the first `rank` entries are meaningful.
    pub fn tuple_atoms(&self, tuple: usize) -> [usize; 3] {
        decode(self.tuples[tuple], self.order, self.n_atoms(), self.independent_atoms())
    }

    /// Get the position of the compact tuple `tuple` in the uncut
    /// `(n_a, N^(r-1))` layout
    pub fn uncut_position(&self, tuple: usize) -> usize {
        self.tuples[tuple]
    }

    /// Get the compact tuple of every full atomic tuple, flattened as
    /// `(i · N + j) · N + k`
    pub fn decompression_indices(&self) -> Vec<Option<usize>> {
        let n_atoms = self.n_atoms();
        let rank = self.order.rank();
        let n_full = n_atoms.pow(rank as u32);

        let mut atoms = [0; 3];
        (0..n_full).map(|flat| {
            let mut remaining = flat;
            for slot in (0..rank).rev() {
                atoms[slot] = remaining % n_atoms;
                remaining /= n_atoms;
            }
            self.compact_tuple(&atoms[..rank])
        }).collect()
    }

    /// Get the sparse matrix mapping the compact space to the full space of
    /// dimension `N^r · 3^r`. Columns are orthonormal, with entries
    /// `1/√n_lp`.
    pub fn translation_compression_matrix(&self) -> SparseMatrix {
        let size = self.order.cartesian_size();
        let n_full = self.n_atoms().pow(self.order.rank() as u32);
        let value = 1.0 / (self.n_lp() as f64).sqrt();

        let mut entries = Vec::new();
        for (flat, tuple) in self.decompression_indices().into_iter().enumerate() {
            if let Some(tuple) = tuple {
                for cartesian in 0..size {
                    entries.push((flat * size + cartesian, tuple * size + cartesian, value));
                }
            }
        }

        return sparse::from_triplets((n_full * size, self.dimension()), entries);
    }

    /// Get the orbits of the compact indexes under permutations of the
    /// (atom, Cartesian) slots of the tensor. Each orbit is sorted, and
    /// orbits are sorted by their smallest element.
    pub fn permutation_orbits(&self) -> Vec<Vec<usize>> {
        let size = self.order.cartesian_size();
        let rank = self.order.rank();
        let dimension = self.dimension();

        let mut assigned = vec![false; dimension];
        let mut orbits = Vec::new();
        for index in 0..dimension {
            if assigned[index] {
                continue;
            }

            let atoms = self.tuple_atoms(index / size);
            let digits = self.order.cartesian_digits(index % size);

            let mut members = Vec::with_capacity(self.order.slot_permutations().len());
            for permutation in self.order.slot_permutations() {
                let mut permuted_atoms = [0; 3];
                let mut permuted_digits = [0; 3];
                for slot in 0..rank {
                    permuted_atoms[slot] = atoms[permutation[slot]];
                    permuted_digits[slot] = digits[permutation[slot]];
                }

                // the cutoff criterion is symmetric, so permuted tuples are
                // always retained
                let cartesian = self.order.cartesian_index(&permuted_digits);
                if let Some(member) = self.compact_index(&permuted_atoms[..rank], cartesian) {
                    members.push(member);
                }
            }
            members.sort_unstable();
            members.dedup();

            for &member in &members {
                assigned[member] = true;
            }
            orbits.push(members);
        }

        return orbits;
    }

    /// Get the sparse matrix (compact × orbits) with orthonormal columns
    /// spanning the permutation-symmetric compact vectors. Column `o` has
    /// entries `1/√|o|` on the members of orbit `o`.
    #[time_graph::instrument(name = "IndexCompressor::permutation_compression_matrix")]
    pub fn permutation_compression_matrix(&self) -> SparseMatrix {
        let orbits = self.permutation_orbits();
        let mut entries = Vec::with_capacity(self.dimension());
        for (o, members) in orbits.iter().enumerate() {
            let value = 1.0 / (members.len() as f64).sqrt();
            for &member in members {
                entries.push((member, o, value));
            }
        }

        return sparse::from_triplets((self.dimension(), orbits.len()), entries);
    }
}

/// Decode a flattened independent-first tuple into atom indexes
fn decode(flat: usize, order: FcOrder, n_atoms: usize, independent_atoms: &[usize]) -> [usize; 3] {
    let rank = order.rank();
    let mut atoms = [0; 3];
    let mut remaining = flat;
    for slot in (1..rank).rev() {
        atoms[slot] = remaining % n_atoms;
        remaining /= n_atoms;
    }
    atoms[0] = independent_atoms[remaining];
    return atoms;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    use crate::{Supercell, UnitCell, Vector3D};
    use crate::symmetry::DEFAULT_SYMPREC;

    fn bcc() -> Supercell {
        Supercell::new(
            UnitCell::cubic(3.0).unwrap(),
            vec![Vector3D::zero(), Vector3D::new(0.5, 0.5, 0.5)],
            vec![26, 26],
        ).unwrap()
    }

    fn simple_cubic_chain() -> Supercell {
        // 4 atoms along x in a long cell, n_lp = 4
        let cell = UnitCell::orthorhombic(8.0, 2.0, 2.0).unwrap();
        let positions = (0..4).map(|i| Vector3D::new(i as f64 / 4.0, 0.0, 0.0)).collect();
        Supercell::new(cell, positions, vec![1; 4]).unwrap()
    }

    #[test]
    fn compact_numbering() {
        let supercell = bcc();
        let ctx = SymmetryContext::new(&supercell, None, DEFAULT_SYMPREC).unwrap();

        let fc2 = IndexCompressor::new(&ctx, FcOrder::Second, None).unwrap();
        assert_eq!(fc2.n_lp(), 2);
        assert_eq!(fc2.n_tuples(), 2);
        assert_eq!(fc2.dimension(), 18);
        // (1, 0) is the translation of (0, 1)
        assert_eq!(fc2.compact_tuple(&[1, 0]), fc2.compact_tuple(&[0, 1]));
        assert_eq!(fc2.compact_tuple(&[1, 1]), Some(0));

        let fc3 = IndexCompressor::new(&ctx, FcOrder::Third, None).unwrap();
        assert_eq!(fc3.n_tuples(), 4);
        assert_eq!(fc3.tuple_atoms(3), [0, 1, 1]);
    }

    #[test]
    fn translation_compression_round_trip() {
        let supercell = simple_cubic_chain();
        let ctx = SymmetryContext::new(&supercell, None, DEFAULT_SYMPREC).unwrap();
        let compressor = IndexCompressor::new(&ctx, FcOrder::Second, None).unwrap();
        assert_eq!(compressor.n_lp(), 4);

        let matrix = compressor.translation_compression_matrix();
        assert_eq!(matrix.shape(), (16 * 9, compressor.dimension()));

        // Cᵀ C = I
        let gram = sparse::to_dense(&sparse::gram(&matrix));
        assert_relative_eq!(gram, Array2::<f64>::eye(compressor.dimension()), epsilon = 1e-12);

        // every full tuple maps to a compact tuple, and translated tuples
        // (here (1, 2) and (0, 1)) share the same compact tuple
        let indices = compressor.decompression_indices();
        assert!(indices.iter().all(Option::is_some));
        assert_eq!(indices[6], indices[1]);
    }

    #[test]
    fn cutoff() {
        let supercell = simple_cubic_chain();
        let ctx = SymmetryContext::new(&supercell, None, DEFAULT_SYMPREC).unwrap();

        // neighbors are 2.0 apart, second neighbors 4.0
        let compressor = IndexCompressor::new(&ctx, FcOrder::Third, Some(2.5)).unwrap();
        assert_eq!(compressor.n_uncut_tuples(), 16);
        // (0, j, k) with j, k in {3, 0, 1} and |j - k| <= 1 (periodic)
        assert_eq!(compressor.n_tuples(), 7);
        assert_eq!(compressor.compact_tuple(&[0, 2, 2]), None);
        assert_eq!(compressor.compact_tuple(&[1, 2, 2]), compressor.compact_tuple(&[0, 1, 1]));

        assert!(IndexCompressor::new(&ctx, FcOrder::Third, Some(-1.0)).is_err());
    }

    #[test]
    fn permutation_orbits() {
        let supercell = bcc();
        let ctx = SymmetryContext::new(&supercell, None, DEFAULT_SYMPREC).unwrap();
        let compressor = IndexCompressor::new(&ctx, FcOrder::Second, None).unwrap();

        let orbits = compressor.permutation_orbits();
        // on each of the two tuples, symmetric 3x3 matrices have 6 entries
        assert_eq!(orbits.len(), 12);
        let total = orbits.iter().map(Vec::len).sum::<usize>();
        assert_eq!(total, compressor.dimension());

        let matrix = compressor.permutation_compression_matrix();
        let gram = sparse::to_dense(&sparse::gram(&matrix));
        assert_relative_eq!(gram, Array2::<f64>::eye(12), epsilon = 1e-12);
    }
}
