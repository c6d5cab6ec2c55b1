//! VectorError: Unified error type for ghosted-vector public APIs
//!
//! Configuration problems are always reported through this type. Index and
//! precondition violations are reported by the assertion layer in
//! [`debug_invariants`](crate::debug_invariants) and only surface here through
//! the explicitly checked `try_*` entry points.

use thiserror::Error;

/// Boxed, clonable error source used by communication failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommSource(pub String);

impl std::fmt::Display for CommSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for CommSource {}

impl From<String> for CommSource {
    fn from(s: String) -> Self {
        CommSource(s)
    }
}

impl From<&str> for CommSource {
    fn from(s: &str) -> Self {
        CommSource(s.to_owned())
    }
}

/// Unified error type for distributed vector operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VectorError {
    // ----- configuration -------------------------------------------------
    /// Serial storage was requested with a local size different from the global size.
    #[error("serial vector requires n_local == N (got n_local = {n_local}, N = {global})")]
    SerialSizeMismatch { global: usize, n_local: usize },
    /// A rank asked for more local entries than the vector has globally.
    #[error("local size {n_local} exceeds global size {global}")]
    LocalExceedsGlobal { global: usize, n_local: usize },
    /// Local sizes of all ranks do not add up to the requested global size.
    #[error("local sizes sum to {sum}, but global size {global} was requested")]
    GlobalSizeMismatch { global: usize, sum: usize },
    /// Ranks asked for different global sizes in one collective construction.
    #[error("global size {global} requested here, but rank {rank} requested {theirs}")]
    InconsistentGlobalSize {
        rank: usize,
        global: usize,
        theirs: usize,
    },
    /// Ghosted storage was requested through an entry point without a ghost list.
    #[error("ghosted storage requires an explicit ghost index list")]
    GhostedWithoutGhosts,
    /// A ghost list was supplied together with a Serial or Parallel request.
    #[error("ghost indices supplied for non-ghosted storage type {0}")]
    GhostsOnNonGhosted(&'static str),
    /// A ghost index is not a valid global index.
    #[error("ghost index {index} is out of range for global size {global}")]
    GhostOutOfRange { index: usize, global: usize },
    /// A ghost index lies inside the locally owned range.
    #[error("ghost index {index} lies in the owned range [{first}, {last})")]
    GhostInOwnedRange { index: usize, first: usize, last: usize },
    /// The same global index appears twice in the ghost list.
    #[error("ghost index {index} listed more than once (positions {first_pos} and {second_pos})")]
    DuplicateGhost {
        index: usize,
        first_pos: usize,
        second_pos: usize,
    },
    /// Another rank rejected its part of a collective construction.
    #[error("rank {rank} rejected the vector configuration")]
    PeerConfiguration { rank: usize },
    /// Two vectors combined in one operation have different layouts.
    #[error("layout mismatch: {0}")]
    LayoutMismatch(String),

    // ----- indexing / preconditions -------------------------------------
    /// A global index is neither owned locally nor a declared ghost.
    #[error(
        "No index {index} in ghosted vector.\nVector contains [{first},{last})\n{}",
        describe_ghosts(.ghosts)
    )]
    IndexNotLocal {
        index: usize,
        first: usize,
        last: usize,
        ghosts: Vec<usize>,
    },
    /// An operation was invoked in the wrong lifecycle state or cache mode.
    #[error("precondition violated: {0}")]
    Precondition(&'static str),
    /// The vector has no backend storage yet.
    #[error("vector is not initialized")]
    Uninitialized,

    // ----- backend / communication --------------------------------------
    /// Storage behind this handle has been destroyed by its owner.
    #[error("backend storage has been destroyed")]
    StorageDestroyed,
    /// Communication error with a neighbor rank.
    #[error("Communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: CommSource,
    },
    /// Buffer size mismatch during data exchange.
    #[error("Buffer size mismatch with rank {neighbor}: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// Ranks issued different collectives, the same collective out of order,
    /// or the same collective on different vectors.
    #[error(
        "collective mismatch with rank {neighbor}: expected vector {expected_vector} kind {expected_kind} #{expected_seq}, got vector {got_vector} kind {got_kind} #{got_seq}"
    )]
    CollectiveMismatch {
        neighbor: usize,
        expected_vector: u32,
        expected_kind: u16,
        expected_seq: u32,
        got_vector: u32,
        got_kind: u16,
        got_seq: u32,
    },
    /// Wire header carried an unknown version.
    #[error("unsupported wire version {got} from rank {neighbor}")]
    WireVersion { neighbor: usize, got: u16 },

    // ----- output ---------------------------------------------------------
    /// Writing a textual dump failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for VectorError {
    fn from(e: std::io::Error) -> Self {
        VectorError::Io(e.to_string())
    }
}

impl VectorError {
    /// True for the configuration class of errors reported by `init`.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            VectorError::SerialSizeMismatch { .. }
                | VectorError::LocalExceedsGlobal { .. }
                | VectorError::GlobalSizeMismatch { .. }
                | VectorError::InconsistentGlobalSize { .. }
                | VectorError::GhostedWithoutGhosts
                | VectorError::GhostsOnNonGhosted(_)
                | VectorError::GhostOutOfRange { .. }
                | VectorError::GhostInOwnedRange { .. }
                | VectorError::DuplicateGhost { .. }
                | VectorError::PeerConfiguration { .. }
                | VectorError::LayoutMismatch(_)
        )
    }

    /// True for failures raised by the engine or the communicator.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            VectorError::StorageDestroyed
                | VectorError::CommError { .. }
                | VectorError::BufferSizeMismatch { .. }
                | VectorError::CollectiveMismatch { .. }
                | VectorError::WireVersion { .. }
        )
    }
}

fn describe_ghosts(ghosts: &[usize]) -> String {
    use itertools::Itertools;
    if ghosts.is_empty() {
        "And empty ghost array.".to_owned()
    } else {
        format!("And ghost array {{{}}}", ghosts.iter().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_error_names_ranges_and_ghosts() {
        let e = VectorError::IndexNotLocal {
            index: 7,
            first: 0,
            last: 2,
            ghosts: vec![2, 5],
        };
        let msg = e.to_string();
        assert!(msg.contains("No index 7"));
        assert!(msg.contains("[0,2)"));
        assert!(msg.contains("{2,5}"));
    }

    #[test]
    fn empty_ghost_array_is_spelled_out() {
        let e = VectorError::IndexNotLocal {
            index: 3,
            first: 0,
            last: 3,
            ghosts: vec![],
        };
        assert!(e.to_string().contains("empty ghost array"));
    }

    #[test]
    fn classification() {
        assert!(VectorError::GhostedWithoutGhosts.is_configuration());
        assert!(!VectorError::GhostedWithoutGhosts.is_backend());
        assert!(VectorError::StorageDestroyed.is_backend());
    }
}
