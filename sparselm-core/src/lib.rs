//! sparselm-core
//!
//! Sparse and structured-sparse linear regression. Estimators minimize a
//! least-squares loss plus a sparsity-inducing penalty, solved either by a
//! native ADMM solver or by exact search over candidate supports.
//!
//! # Functionality
//!
//! - Ordinary least squares and the Lasso
//! - Group, overlapping group, sparse group and ridged group Lasso
//! - Adaptive (iteratively reweighted) variants of the Lasso family
//! - Best subset selection and mixed L1/L0 and L2/L0 penalties, with group and hierarchy constraints
//! - Stepwise composition of estimators over disjoint feature blocks
//! - Grid and line search cross validation
//! - Synthetic problem generation, memory-mapped data files and model storage
//! - Timing and logging
//!
//! # Features
//!
//! - `rayon` - Evaluate candidate supports, folds and generated columns in parallel
//! - `linfa` - Cross-check Lasso solutions against `linfa-elasticnet`
//! - `accelerate` - Use the `accelerate` backend for matrix operations
//! - `netlib` - Use the `netlib` backend for matrix operations
//! - `openblas` - Use the `openblas` backend for matrix operations
//!
//! # Example
//!
//! ```rust
//! # extern crate nalgebra as na;
//! # use sparselm_core::{dataset::Dataset, model::{Lasso, Regressor}};
//!
//! let x = na::DMatrix::from_fn(20, 3, |i, j| ((i * (j + 1)) % 7) as f64);
//! let y = &x * na::DVector::from_vec(vec![1.0, 0.0, -2.0]);
//! let mut lasso = Lasso::new(0.01);
//! lasso.fit(&Dataset::new(x, y).unwrap()).unwrap();
//! assert_eq!(lasso.coef().unwrap().len(), 3);
//! ```

/// Memory-mapped binary matrix files
pub mod datafile;

/// Training data and preprocessing
pub mod dataset;

/// Error types
pub mod error;

/// Regression estimators
pub mod model;

/// Cross validation and hyperparameter search
pub mod model_selection;

/// Proximal operators
pub mod ops;

/// Penalty terms and group structures
pub mod penalty;

/// ADMM problem formulation and solving
pub mod problem;

/// Persistence of fitted models
pub mod storage;

/// Synthetic regression problems
pub mod synthetic;

/// Timing and logging utilities
pub mod timing;

/// Linear algebra helpers
pub mod utils;
