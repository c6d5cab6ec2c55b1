#![cfg_attr(docsrs, feature(doc_cfg))]
//! # ghosted-vector
//!
//! ghosted-vector provides a distributed numeric vector for parallel
//! finite-element style computations: a fixed-size array of scalars
//! partitioned across cooperating ranks, optionally augmented with *ghost*
//! entries that mirror values owned by neighbouring ranks for fast local reads.
//!
//! ## Features
//! - Serial, Parallel and Ghosted storage with automatic type resolution
//! - Global/local index translation for owned and ghost entries
//! - Lazily fetched, lock-guarded array views for concurrent element reads
//! - Two-phase assembly of off-process writes and ghost synchronization
//! - Collective reductions, localization, subvectors and sparse mat-vec
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! ghosted-vector = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon", "strict-invariants"]
//! ```
//!
//! ## Checks
//!
//! Configuration errors are always reported as [`VectorError`]. Precondition
//! and index checks form an assertion layer that is active in debug builds
//! and under the `strict-invariants` / `check-invariants` features; see
//! [`debug_invariants`].
//!
//! ## Collectives
//!
//! Parallel and ghosted initialization, [`close`](vector::Vector::close),
//! reductions, localization, subvector extraction and the global dumps are
//! collective: every rank sharing the vector must call them in the same
//! order. Every message carries the operation kind and a per-vector sequence
//! number, so out-of-order calls surface as
//! [`VectorError::CollectiveMismatch`] instead of mixing data.

pub mod algs;
pub mod backend;
pub mod debug_invariants;
pub mod partition;
pub mod scalar;
pub mod vector;
pub mod vector_error;

pub use debug_invariants::DebugInvariants;
pub use vector_error::VectorError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{
        CommTag, Communicator, NoComm, RayonComm, VectorCommTags, Wait,
    };
    pub use crate::backend::{CsrMatrix, InsertMode, RawVec};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::partition::{ParallelType, Partition, StorageType};
    pub use crate::scalar::Scalar;
    pub use crate::vector::{GhostMap, StorageOwnership, Vector, VectorState};
    pub use crate::vector_error::VectorError;
}
