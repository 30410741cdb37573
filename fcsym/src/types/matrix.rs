//! 3x3 matrix types, for lattice matrices and rotations
use std::ops::{Add, Sub, Mul, Index, IndexMut};

use super::Vector3D;

/// A 3x3 real matrix, stored row-major. `matrix[i][j]` is the element at row
/// `i` and column `j`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Matrix3([[f64; 3]; 3]);

impl Matrix3 {
    /// Create a new `Matrix3` from the given rows
    pub fn new(data: [[f64; 3]; 3]) -> Matrix3 {
        Matrix3(data)
    }

    /// Create a new `Matrix3` with all elements set to 0
    pub fn zero() -> Matrix3 {
        Matrix3([[0.0; 3]; 3])
    }

    /// Create the identity matrix
    pub fn one() -> Matrix3 {
        Matrix3([
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ])
    }

    /// Get the transposed matrix
    #[must_use]
    pub fn transposed(&self) -> Matrix3 {
        let m = &self.0;
        Matrix3([
            [m[0][0], m[1][0], m[2][0]],
            [m[0][1], m[1][1], m[2][1]],
            [m[0][2], m[1][2], m[2][2]],
        ])
    }

    /// Get the determinant of this matrix
    pub fn determinant(&self) -> f64 {
        let m = &self.0;
        m[0][0] * (m[1][1] * m[2][2] - m[2][1] * m[1][2])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Get the inverse of this matrix. The matrix must be invertible.
    #[must_use]
    pub fn inverse(&self) -> Matrix3 {
        let determinant = self.determinant();
        debug_assert!(determinant.abs() > f64::EPSILON, "matrix is not invertible");

        let m = &self.0;
        let inv_det = 1.0 / determinant;
        Matrix3([
            [
                (m[1][1] * m[2][2] - m[2][1] * m[1][2]) * inv_det,
                (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
                (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
            ],
            [
                (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
                (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
                (m[1][0] * m[0][2] - m[0][0] * m[1][2]) * inv_det,
            ],
            [
                (m[1][0] * m[2][1] - m[2][0] * m[1][1]) * inv_det,
                (m[2][0] * m[0][1] - m[0][0] * m[2][1]) * inv_det,
                (m[0][0] * m[1][1] - m[1][0] * m[0][1]) * inv_det,
            ],
        ])
    }

    /// Get the largest absolute difference between the elements of `self`
    /// and `other`
    pub fn max_abs_difference(&self, other: &Matrix3) -> f64 {
        let mut max = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                max = f64::max(max, f64::abs(self[i][j] - other[i][j]));
            }
        }
        return max;
    }
}

impl From<[[f64; 3]; 3]> for Matrix3 {
    fn from(data: [[f64; 3]; 3]) -> Matrix3 {
        Matrix3(data)
    }
}

impl From<IntegerMatrix3> for Matrix3 {
    fn from(matrix: IntegerMatrix3) -> Matrix3 {
        let mut result = Matrix3::zero();
        for i in 0..3 {
            for j in 0..3 {
                result[i][j] = f64::from(matrix[i][j]);
            }
        }
        return result;
    }
}

impl Index<usize> for Matrix3 {
    type Output = [f64; 3];
    #[inline]
    fn index(&self, index: usize) -> &[f64; 3] {
        &self.0[index]
    }
}

impl IndexMut<usize> for Matrix3 {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut [f64; 3] {
        &mut self.0[index]
    }
}

impl_arithmetic!(
    Matrix3, Matrix3, Add, add, Matrix3,
    self, other,
    {
        let mut result = Matrix3::zero();
        for i in 0..3 {
            for j in 0..3 {
                result[i][j] = self[i][j] + other[i][j];
            }
        }
        result
    }
);

impl_arithmetic!(
    Matrix3, Matrix3, Sub, sub, Matrix3,
    self, other,
    {
        let mut result = Matrix3::zero();
        for i in 0..3 {
            for j in 0..3 {
                result[i][j] = self[i][j] - other[i][j];
            }
        }
        result
    }
);

impl_arithmetic!(
    Matrix3, Matrix3, Mul, mul, Matrix3,
    self, other,
    {
        let mut result = Matrix3::zero();
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    result[i][j] += self[i][k] * other[k][j];
                }
            }
        }
        result
    }
);

impl_arithmetic!(
    Matrix3, Vector3D, Mul, mul, Vector3D,
    self, vector,
    {
        let x = self[0][0] * vector[0] + self[0][1] * vector[1] + self[0][2] * vector[2];
        let y = self[1][0] * vector[0] + self[1][1] * vector[1] + self[1][2] * vector[2];
        let z = self[2][0] * vector[0] + self[2][1] * vector[1] + self[2][2] * vector[2];
        Vector3D::new(x, y, z)
    }
);

/// A 3x3 integer matrix, used for rotations in fractional coordinates and
/// supercell expansion matrices.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct IntegerMatrix3([[i32; 3]; 3]);

impl IntegerMatrix3 {
    /// Create a new `IntegerMatrix3` from the given rows
    pub fn new(data: [[i32; 3]; 3]) -> IntegerMatrix3 {
        IntegerMatrix3(data)
    }

    /// Create the identity matrix
    pub fn one() -> IntegerMatrix3 {
        IntegerMatrix3([[1, 0, 0], [0, 1, 0], [0, 0, 1]])
    }

    /// Check if this matrix is the identity
    pub fn is_identity(&self) -> bool {
        *self == IntegerMatrix3::one()
    }

    /// Get the determinant of this matrix
    pub fn determinant(&self) -> i32 {
        let m = &self.0;
        m[0][0] * (m[1][1] * m[2][2] - m[2][1] * m[1][2])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Get the rows of this matrix
    pub fn rows(&self) -> [[i32; 3]; 3] {
        self.0
    }
}

impl From<[[i32; 3]; 3]> for IntegerMatrix3 {
    fn from(data: [[i32; 3]; 3]) -> IntegerMatrix3 {
        IntegerMatrix3(data)
    }
}

impl Index<usize> for IntegerMatrix3 {
    type Output = [i32; 3];
    #[inline]
    fn index(&self, index: usize) -> &[i32; 3] {
        &self.0[index]
    }
}

impl Mul<Vector3D> for &IntegerMatrix3 {
    type Output = Vector3D;
    fn mul(self, vector: Vector3D) -> Vector3D {
        let mut result = Vector3D::zero();
        for i in 0..3 {
            for j in 0..3 {
                result[i] += f64::from(self[i][j]) * vector[j];
            }
        }
        result
    }
}
