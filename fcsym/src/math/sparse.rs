//! Helpers around `sprs` compressed sparse row matrices. All matrices handled
//! here are stored in CSR format.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use sprs::{CsMat, TriMat};

/// Sparse matrix type used everywhere in this crate
pub type SparseMatrix = CsMat<f64>;

/// Build a CSR matrix from `(row, column, value)` triplets. Duplicated
/// entries are summed.
pub fn from_triplets<I>(shape: (usize, usize), triplets: I) -> SparseMatrix
    where I: IntoIterator<Item = (usize, usize, f64)>
{
    let mut matrix = TriMat::new(shape);
    for (row, column, value) in triplets {
        debug_assert!(row < shape.0 && column < shape.1);
        matrix.add_triplet(row, column, value);
    }
    return matrix.to_csr();
}

/// Iterate over the non-zero entries of `matrix` as `(row, column, value)`
pub fn triplets(matrix: &SparseMatrix) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
    matrix.iter().map(|(&value, (row, column))| (row, column, value))
}

/// Identity matrix of size `n`
pub fn identity(n: usize) -> SparseMatrix {
    CsMat::eye(n)
}

/// Get the transpose of `matrix`, in CSR storage
pub fn transpose(matrix: &SparseMatrix) -> SparseMatrix {
    let (rows, columns) = matrix.shape();
    from_triplets((columns, rows), triplets(matrix).map(|(i, j, value)| (j, i, value)))
}

/// Compute `matrix · dense`
pub fn mul_dense(matrix: &SparseMatrix, dense: ArrayView2<'_, f64>) -> Array2<f64> {
    assert_eq!(matrix.cols(), dense.nrows());
    let mut result = Array2::zeros((matrix.rows(), dense.ncols()));
    for (i, j, value) in triplets(matrix) {
        result.row_mut(i).scaled_add(value, &dense.row(j));
    }
    return result;
}

/// Compute `matrixᵀ · dense`
pub fn transpose_mul_dense(matrix: &SparseMatrix, dense: ArrayView2<'_, f64>) -> Array2<f64> {
    assert_eq!(matrix.rows(), dense.nrows());
    let mut result = Array2::zeros((matrix.cols(), dense.ncols()));
    for (i, j, value) in triplets(matrix) {
        result.row_mut(j).scaled_add(value, &dense.row(i));
    }
    return result;
}

/// Compute `matrix · vector`
pub fn mul_vector(matrix: &SparseMatrix, vector: ArrayView1<'_, f64>) -> Array1<f64> {
    assert_eq!(matrix.cols(), vector.len());
    let mut result = Array1::zeros(matrix.rows());
    for (i, j, value) in triplets(matrix) {
        result[i] += value * vector[j];
    }
    return result;
}

/// Compute `left · right`
pub fn mul(left: &SparseMatrix, right: &SparseMatrix) -> SparseMatrix {
    assert_eq!(left.cols(), right.rows());
    return left * right;
}

/// Compute `matrixᵀ · matrix`
pub fn gram(matrix: &SparseMatrix) -> SparseMatrix {
    return &transpose(matrix) * matrix;
}

/// Compute `leftᵀ · middle · left`
pub fn congruence(left: &SparseMatrix, middle: &SparseMatrix) -> SparseMatrix {
    assert_eq!(middle.rows(), middle.cols());
    let product = middle * left;
    return &transpose(left) * &product;
}

/// Multiply all the entries of `matrix` by `factor`
pub fn scale(matrix: &mut SparseMatrix, factor: f64) {
    matrix.map_inplace(|&value| value * factor);
}

/// Sum of the diagonal entries of `matrix`
pub fn trace(matrix: &SparseMatrix) -> f64 {
    triplets(matrix).filter(|&(i, j, _)| i == j).map(|(_, _, value)| value).sum()
}

/// Convert a sparse matrix to a dense one
pub fn to_dense(matrix: &SparseMatrix) -> Array2<f64> {
    let mut result = Array2::zeros(matrix.shape());
    for (i, j, value) in triplets(matrix) {
        result[[i, j]] += value;
    }
    return result;
}

/// Convert a dense matrix to a sparse one, dropping all entries smaller than
/// `threshold` in absolute value
pub fn from_dense(dense: ArrayView2<'_, f64>, threshold: f64) -> SparseMatrix {
    let entries = dense.indexed_iter()
        .filter(|(_, value)| value.abs() >= threshold)
        .map(|((i, j), &value)| (i, j, value));
    return from_triplets(dense.dim(), entries);
}

/// Extract the dense square sub-matrix of `matrix` corresponding to the rows
/// and columns in `indices`. `position` must map a global index to its
/// position in `indices`.
pub fn dense_block(matrix: &SparseMatrix, indices: &[usize], position: &[usize]) -> Array2<f64> {
    let mut block = Array2::zeros((indices.len(), indices.len()));
    for (local_i, &i) in indices.iter().enumerate() {
        if let Some(row) = matrix.outer_view(i) {
            for (j, &value) in row.iter() {
                block[[local_i, position[j]]] += value;
            }
        }
    }
    return block;
}

/// Extract the sparse square sub-matrix of `matrix` corresponding to the rows
/// and columns in `indices`, see `dense_block` for `position`.
pub fn sparse_block(matrix: &SparseMatrix, indices: &[usize], position: &[usize]) -> SparseMatrix {
    let mut entries = Vec::new();
    for (local_i, &i) in indices.iter().enumerate() {
        if let Some(row) = matrix.outer_view(i) {
            for (j, &value) in row.iter() {
                entries.push((local_i, position[j], value));
            }
        }
    }
    return from_triplets((indices.len(), indices.len()), entries);
}

/// Split the indices of a square matrix into the connected components of its
/// sparsity graph. Each component is sorted, and components are sorted by
/// their smallest index.
pub fn connected_components(matrix: &SparseMatrix) -> Vec<Vec<usize>> {
    assert_eq!(matrix.rows(), matrix.cols());
    let n = matrix.rows();

    let mut parent = (0..n).collect::<Vec<_>>();
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        return i;
    }

    for (i, j, _) in triplets(matrix) {
        let root_i = find(&mut parent, i);
        let root_j = find(&mut parent, j);
        if root_i != root_j {
            // keep the smallest index as root
            let (small, large) = if root_i < root_j { (root_i, root_j) } else { (root_j, root_i) };
            parent[large] = small;
        }
    }

    let mut component_of_root = vec![usize::MAX; n];
    let mut components: Vec<Vec<usize>> = Vec::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        if component_of_root[root] == usize::MAX {
            component_of_root[root] = components.len();
            components.push(Vec::new());
        }
        components[component_of_root[root]].push(i);
    }

    return components;
}

/// Largest absolute value of the entries of `left - right`
pub fn max_abs_difference(left: &SparseMatrix, right: &SparseMatrix) -> f64 {
    assert_eq!(left.shape(), right.shape());
    let mut difference = left.clone();
    scale(&mut difference, -1.0);
    let difference = &difference + right;
    return triplets(&difference).fold(0.0, |acc, (_, _, value)| f64::max(acc, value.abs()));
}
