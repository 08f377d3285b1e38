pub mod common_io; // gzip-aware readers and writers
pub mod dmatrix_io; // delimited text i/o for dense matrices
pub mod dmatrix_linalg; // Cholesky-based inverses, covariance estimators
pub mod dmatrix_util; // sampling, row-wise softmax/normalization, safe log
pub mod mtx_io; // MatrixMarket triplets
pub mod sparse_util; // CSR products that only visit stored entries
pub mod traits;

pub use nalgebra::{DMatrix, DVector};
pub use nalgebra_sparse::CsrMatrix;
