use crate::Error;

/// Atomic permutations induced by the pure lattice translations of a
/// supercell.
///
/// The translations split the atoms in classes of `n_lp` equivalent atoms.
/// The lowest numbered atom of each class is the class's independent atom,
/// and every atom is the image of exactly one independent atom by exactly one
/// translation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationPermutations {
    /// `permutations[l][i]` is the image of atom `i` by translation `l`
    permutations: Vec<Vec<usize>>,
    /// `inverse[l][j] = i` when `permutations[l][i] = j`
    inverse: Vec<Vec<usize>>,
    /// independent atoms, sorted
    independent_atoms: Vec<usize>,
    /// for every atom, `(p, l)` such that translation `l` maps
    /// `independent_atoms[p]` onto this atom
    origins: Vec<(usize, usize)>,
}

impl TranslationPermutations {
    /// Build the translation permutations from the permutations of all pure
    /// translations. The first permutation must be the identity. `operations`
    /// gives the index of each translation in the operation table, for error
    /// reporting.
    pub fn new(permutations: Vec<Vec<usize>>, operations: &[usize]) -> Result<TranslationPermutations, Error> {
        debug_assert_eq!(permutations.len(), operations.len());
        let n_lp = permutations.len();
        if n_lp == 0 {
            return Err(Error::SymmetryInconsistency {
                operation: 0,
                atom: None,
                message: "the operations do not contain the identity".into(),
            });
        }

        let n_atoms = permutations[0].len();
        if permutations[0].iter().enumerate().any(|(i, &j)| i != j) {
            return Err(Error::SymmetryInconsistency {
                operation: operations[0],
                atom: None,
                message: "the first pure translation must be the identity".into(),
            });
        }

        let mut inverse = Vec::with_capacity(n_lp);
        for (l, permutation) in permutations.iter().enumerate() {
            let mut inverse_l = vec![usize::MAX; n_atoms];
            for (i, &j) in permutation.iter().enumerate() {
                if j >= n_atoms || inverse_l[j] != usize::MAX {
                    return Err(Error::SymmetryInconsistency {
                        operation: operations[l],
                        atom: Some(i),
                        message: "translation permutation is not a bijection".into(),
                    });
                }
                inverse_l[j] = i;
            }
            inverse.push(inverse_l);
        }

        if n_atoms % n_lp != 0 {
            return Err(Error::SymmetryInconsistency {
                operation: operations[n_lp - 1],
                atom: None,
                message: format!(
                    "the number of pure translations ({}) does not divide the number of atoms ({})",
                    n_lp, n_atoms
                ),
            });
        }

        let mut independent_atoms = Vec::with_capacity(n_atoms / n_lp);
        let mut origins = vec![(usize::MAX, usize::MAX); n_atoms];
        for atom in 0..n_atoms {
            if origins[atom].0 != usize::MAX {
                continue;
            }

            let p = independent_atoms.len();
            independent_atoms.push(atom);
            for (l, permutation) in permutations.iter().enumerate() {
                let image = permutation[atom];
                if origins[image].0 != usize::MAX {
                    return Err(Error::SymmetryInconsistency {
                        operation: operations[l],
                        atom: Some(atom),
                        message: format!(
                            "atom {} is reached by more than one translation of atom {}",
                            image, atom
                        ),
                    });
                }
                origins[image] = (p, l);
            }
        }

        return Ok(TranslationPermutations {
            permutations,
            inverse,
            independent_atoms,
            origins,
        });
    }

    /// Number of pure lattice translations
    pub fn n_lp(&self) -> usize {
        self.permutations.len()
    }

    /// Number of atoms in the supercell
    pub fn n_atoms(&self) -> usize {
        self.origins.len()
    }

    /// Independent atoms, one per translation class, sorted
    pub fn independent_atoms(&self) -> &[usize] {
        &self.independent_atoms
    }

    /// Number of independent atoms
    pub fn n_independent(&self) -> usize {
        self.independent_atoms.len()
    }

    /// Permutation of the atoms by translation `l`
    pub fn permutation(&self, l: usize) -> &[usize] {
        &self.permutations[l]
    }

    /// Inverse of the permutation of the atoms by translation `l`
    pub fn inverse(&self, l: usize) -> &[usize] {
        &self.inverse[l]
    }

    /// Get `(p, l)` such that translation `l` maps the `p`-th independent
    /// atom onto `atom`
    pub fn origin(&self, atom: usize) -> (usize, usize) {
        self.origins[atom]
    }
}
