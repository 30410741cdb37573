//! The `UnitCell` type represents the periodic box of a crystal.
use crate::{Error, IntegerMatrix3, Matrix3, Vector3D};

/// An `UnitCell` defines the periodic lattice of a crystal.
///
/// The lattice vectors are the rows of the cell matrix, so that Cartesian
/// positions are obtained from fractional ones as `cartesian = Lᵀ · fractional`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct UnitCell {
    /// Unit cell matrix
    matrix: Matrix3,
    /// Transpose of the unit cell matrix, cached from matrix
    transpose: Matrix3,
    /// Inverse of the transpose of the unit cell matrix, cached from matrix
    inverse: Matrix3,
}

impl UnitCell {
    /// Create a new unit cell from the given matrix, containing the lattice
    /// vectors as rows. The matrix must be invertible, left-handed lattices
    /// are accepted.
    pub fn new(matrix: Matrix3) -> Result<UnitCell, Error> {
        let determinant = matrix.determinant();
        if !(determinant.abs() > 1e-6) {
            return Err(Error::InvalidParameter(format!(
                "the cell matrix must not be singular, got a determinant of {}", determinant
            )));
        }

        return Ok(UnitCell {
            matrix: matrix,
            transpose: matrix.transposed(),
            inverse: matrix.transposed().inverse(),
        });
    }

    /// Create an orthorhombic unit cell, with side lengths `a, b, c`.
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Result<UnitCell, Error> {
        if !(a > 0.0 && b > 0.0 && c > 0.0) {
            return Err(Error::InvalidParameter("cell lengths must be positive".into()));
        }

        return UnitCell::new(Matrix3::new([
            [a, 0.0, 0.0],
            [0.0, b, 0.0],
            [0.0, 0.0, c],
        ]));
    }

    /// Create a cubic unit cell, with side lengths `length, length, length`.
    pub fn cubic(length: f64) -> Result<UnitCell, Error> {
        UnitCell::orthorhombic(length, length, length)
    }

    /// Get the matricial representation of the unit cell
    pub fn matrix(&self) -> Matrix3 {
        self.matrix
    }

    /// Get the volume of the cell
    pub fn volume(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    /// Get the metric tensor `L · Lᵀ` of this cell
    pub fn metric(&self) -> Matrix3 {
        self.matrix * self.transpose
    }

    /// Get the fractional representation of the Cartesian `vector` in this
    /// cell
    pub fn fractional(&self, vector: Vector3D) -> Vector3D {
        return self.inverse * vector;
    }

    /// Get the Cartesian representation of the `fractional` vector in this
    /// cell
    pub fn cartesian(&self, fractional: Vector3D) -> Vector3D {
        return self.transpose * fractional;
    }

    /// Get the Cartesian representation `Lᵀ · R · L⁻ᵀ` of a rotation given in
    /// fractional coordinates
    pub fn cartesian_rotation(&self, rotation: &IntegerMatrix3) -> Matrix3 {
        return self.transpose * Matrix3::from(*rotation) * self.inverse;
    }

    /// Get the shortest Cartesian vector between the point at fractional
    /// position `u` and any periodic image of the point at fractional
    /// position `v`.
    ///
    /// This searches the 27 images around the rounded fractional difference,
    /// and is exact for reasonably reduced cells, including skewed ones.
    pub fn minimum_image_vector(&self, u: Vector3D, v: Vector3D) -> Vector3D {
        let difference = (v - u).rounded_difference();

        let mut best = self.cartesian(difference);
        let mut best_norm2 = best.norm2();
        for i in -1..=1 {
            for j in -1..=1 {
                for k in -1..=1 {
                    if i == 0 && j == 0 && k == 0 {
                        continue;
                    }
                    let shift = Vector3D::new(f64::from(i), f64::from(j), f64::from(k));
                    let candidate = self.cartesian(difference + shift);
                    let norm2 = candidate.norm2();
                    if norm2 < best_norm2 {
                        best = candidate;
                        best_norm2 = norm2;
                    }
                }
            }
        }

        return best;
    }

    /// Periodic boundary conditions distance between the points at
    /// fractional positions `u` and `v`
    pub fn distance(&self, u: Vector3D, v: Vector3D) -> f64 {
        self.minimum_image_vector(u, v).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_relative_eq, assert_ulps_eq};

    #[test]
    fn invalid_cells() {
        assert!(UnitCell::cubic(-4.0).is_err());
        assert!(UnitCell::orthorhombic(3.0, 0.0, 5.0).is_err());

        let singular = Matrix3::new([[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        assert!(UnitCell::new(singular).is_err());

        let degenerate = Matrix3::new([[1e-4, 0.0, 0.0], [0.0, 1e-4, 0.0], [0.0, 0.0, 1.0]]);
        assert!(UnitCell::new(degenerate).is_err());
    }

    #[test]
    fn left_handed() {
        let cell = UnitCell::new(Matrix3::new([
            [0.0, 3.0, 0.0],
            [2.0, 0.0, 0.0],
            [0.0, 0.0, 4.0],
        ])).unwrap();
        assert_ulps_eq!(cell.volume(), 24.0);

        let fractional = Vector3D::new(0.5, 0.25, 0.5);
        let cartesian = cell.cartesian(fractional);
        assert_relative_eq!(cartesian[0], 0.5);
        assert_relative_eq!(cartesian[1], 1.5);
        assert_relative_eq!(cartesian[2], 2.0);
        assert!((cell.fractional(cartesian) - fractional).max_abs() < 1e-14);

        assert_relative_eq!(cell.distance(Vector3D::zero(), Vector3D::new(0.9, 0.0, 0.0)), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn conversions() {
        let cell = UnitCell::new(Matrix3::new([
            [4.0, 0.0, 0.0],
            [2.0, 3.0, 0.0],
            [0.0, 1.0, 5.0],
        ])).unwrap();

        assert_ulps_eq!(cell.volume(), 60.0);

        let fractional = Vector3D::new(0.5, 0.25, 0.5);
        let cartesian = cell.cartesian(fractional);
        assert_relative_eq!(cartesian[0], 2.5);
        assert_relative_eq!(cartesian[1], 1.25);
        assert_relative_eq!(cartesian[2], 2.5);

        let back = cell.fractional(cartesian);
        assert!((back - fractional).max_abs() < 1e-14);
    }

    #[test]
    fn minimum_image() {
        let cell = UnitCell::cubic(10.0).unwrap();
        let u = Vector3D::new(0.05, 0.0, 0.0);
        let v = Vector3D::new(0.95, 0.0, 0.0);
        assert_relative_eq!(cell.distance(u, v), 1.0, epsilon = 1e-12);

        // in a skewed cell, rounding the fractional difference is not enough
        let skewed = UnitCell::new(Matrix3::new([
            [1.0, 0.0, 0.0],
            [0.9, 0.5, 0.0],
            [0.0, 0.0, 1.0],
        ])).unwrap();
        let u = Vector3D::zero();
        let v = Vector3D::new(0.4, 0.4, 0.0);
        // fractional difference (0.4, 0.4) gives (0.76, 0.2), the image at
        // (-0.6, 0.4) gives (-0.24, 0.2)
        let expected = f64::hypot(0.24, 0.2);
        assert_relative_eq!(skewed.distance(u, v), expected, epsilon = 1e-12);
    }

    #[test]
    fn rotations() {
        let cell = UnitCell::cubic(3.0).unwrap();
        let rotation = IntegerMatrix3::new([[0, -1, 0], [1, 0, 0], [0, 0, 1]]);
        let cartesian = cell.cartesian_rotation(&rotation);
        assert!(cartesian.max_abs_difference(&Matrix3::from(rotation)) < 1e-14);
    }
}
