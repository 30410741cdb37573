//! 3-dimensional vector type
use std::ops::{Add, Sub, Mul, Div, Neg, Index, IndexMut};
use std::ops::{AddAssign, SubAssign};

/// A 3D vector, used for positions and displacements, in either fractional or
/// Cartesian coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Vector3D([f64; 3]);

impl Vector3D {
    /// Create a new `Vector3D` with components `x`, `y`, `z`
    pub fn new(x: f64, y: f64, z: f64) -> Vector3D {
        Vector3D([x, y, z])
    }

    /// Create a new `Vector3D` with all components set to 0
    pub fn zero() -> Vector3D {
        Vector3D([0.0; 3])
    }

    /// Get the squared euclidean norm of the vector
    pub fn norm2(&self) -> f64 {
        self * self
    }

    /// Get the euclidean norm of the vector
    pub fn norm(&self) -> f64 {
        f64::sqrt(self.norm2())
    }

    /// Apply `function` to every component of this vector
    #[must_use]
    pub fn map(&self, function: impl Fn(f64) -> f64) -> Vector3D {
        Vector3D([function(self[0]), function(self[1]), function(self[2])])
    }

    /// Get the vector with components in `[-0.5, 0.5]`, i.e. the shortest
    /// representative of a fractional difference
    #[must_use]
    pub fn rounded_difference(&self) -> Vector3D {
        self.map(|x| x - f64::round(x))
    }

    /// Get the vector with components in `[0, 1)`, i.e. a fractional position
    /// wrapped inside the cell
    #[must_use]
    pub fn wrapped(&self) -> Vector3D {
        self.map(|x| {
            let wrapped = x - f64::floor(x);
            // floating point rounding can produce exactly 1.0
            if wrapped >= 1.0 { 0.0 } else { wrapped }
        })
    }

    /// Get the largest absolute value of the components
    pub fn max_abs(&self) -> f64 {
        self.0.iter().fold(0.0, |acc, x| f64::max(acc, x.abs()))
    }
}

impl From<[f64; 3]> for Vector3D {
    fn from(array: [f64; 3]) -> Vector3D {
        Vector3D(array)
    }
}

impl From<Vector3D> for [f64; 3] {
    fn from(vector: Vector3D) -> [f64; 3] {
        vector.0
    }
}

impl Index<usize> for Vector3D {
    type Output = f64;
    #[inline]
    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl IndexMut<usize> for Vector3D {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.0[index]
    }
}

impl_arithmetic!(
    Vector3D, Vector3D, Add, add, Vector3D,
    self, other,
    Vector3D::new(self[0] + other[0], self[1] + other[1], self[2] + other[2])
);

impl_arithmetic!(
    Vector3D, Vector3D, Sub, sub, Vector3D,
    self, other,
    Vector3D::new(self[0] - other[0], self[1] - other[1], self[2] - other[2])
);

// Dot product
impl_arithmetic!(
    Vector3D, Vector3D, Mul, mul, f64,
    self, other,
    self[0] * other[0] + self[1] * other[1] + self[2] * other[2]
);

impl_inplace_arithmetic!(
    Vector3D, Vector3D, AddAssign, add_assign,
    self, other,
    {
        self[0] += other[0];
        self[1] += other[1];
        self[2] += other[2];
    }
);

impl_inplace_arithmetic!(
    Vector3D, Vector3D, SubAssign, sub_assign,
    self, other,
    {
        self[0] -= other[0];
        self[1] -= other[1];
        self[2] -= other[2];
    }
);

lsh_scal_arithmetic!(
    Vector3D, Mul, mul, Vector3D,
    self, other,
    Vector3D::new(self[0] * other, self[1] * other, self[2] * other)
);

lsh_scal_arithmetic!(
    Vector3D, Div, div, Vector3D,
    self, other,
    Vector3D::new(self[0] / other, self[1] / other, self[2] / other)
);

impl Neg for Vector3D {
    type Output = Vector3D;
    #[inline]
    fn neg(self) -> Vector3D {
        Vector3D::new(-self[0], -self[1], -self[2])
    }
}
