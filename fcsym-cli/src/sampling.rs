use ndarray::Array3;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

/// Generate `n_samples` random displacements of all `n_atoms` atoms, with
/// shape `(n_samples, 3, n_atoms)`. Each atom is displaced by exactly
/// `magnitude` in a direction uniformly distributed on the sphere.
///
/// With `plus_minus`, every sample is followed by the opposite
/// displacement, which cancels the even order terms when fitting and gives
/// `2 n_samples` samples in total.
pub fn random_displacements(n_samples: usize, n_atoms: usize, magnitude: f64, plus_minus: bool, seed: u64) -> Array3<f64> {
    let mut rng = StdRng::seed_from_u64(seed);

    let total = if plus_minus { 2 * n_samples } else { n_samples };
    let mut displacements = Array3::zeros((total, 3, n_atoms));

    let mut sample = 0;
    for _ in 0..n_samples {
        for atom in 0..n_atoms {
            let z: f64 = rng.gen_range(-1.0..=1.0);
            let phi: f64 = rng.gen_range(0.0..std::f64::consts::TAU);
            let radius = (1.0 - z * z).max(0.0).sqrt();

            let direction = [radius * phi.cos(), radius * phi.sin(), z];
            for (a, component) in direction.iter().enumerate() {
                displacements[[sample, a, atom]] = magnitude * component;
                if plus_minus {
                    displacements[[sample + 1, a, atom]] = -magnitude * component;
                }
            }
        }

        sample += if plus_minus { 2 } else { 1 };
    }

    return displacements;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn magnitude() {
        let displacements = random_displacements(5, 4, 0.02, false, 42);
        assert_eq!(displacements.shape(), [5, 3, 4]);
        for sample in displacements.outer_iter() {
            for atom in sample.axis_iter(ndarray::Axis(1)) {
                assert_relative_eq!(atom.dot(&atom).sqrt(), 0.02, epsilon = 1e-12);
            }
        }

        // the same seed gives the same displacements
        assert_eq!(displacements, random_displacements(5, 4, 0.02, false, 42));
    }

    #[test]
    fn plus_minus() {
        let displacements = random_displacements(2, 4, 0.01, true, 3);
        assert_eq!(displacements.shape(), [4, 3, 4]);
        let sum = &displacements.index_axis(ndarray::Axis(0), 2) + &displacements.index_axis(ndarray::Axis(0), 3);
        assert!(sum.iter().all(|&v| v == 0.0));
    }
}
