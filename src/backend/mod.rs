//! Distributed storage engine underneath [`Vector`](crate::vector::Vector).
//!
//! The engine exposes exactly what the vector layer consumes: creation
//! (serial, parallel, ghosted), duplication and destruction, element
//! insert/add with an off-process stash, two-phase assembly, two-phase ghost
//! update, collective reductions and gathers, pointwise kernels and raw array
//! guards.

pub mod assembly;
pub mod csr;
pub mod layout;
pub mod raw_vec;
pub mod reduce;

pub use assembly::{PendingAssembly, PendingGhostUpdate};
pub use csr::CsrMatrix;
pub use layout::{GhostScatter, Layout};
pub use raw_vec::{ArrayGuard, InsertMode, RawVec};
