//! Build-toggleable assertion layer.
//!
//! Precondition and index checks are active in debug builds and whenever the
//! `strict-invariants` or `check-invariants` feature is enabled. In plain
//! release builds they compile to nothing and violating them is a silent
//! correctness bug, not a reported error.

use crate::vector_error::VectorError;

/// `true` when the assertion layer is compiled in.
pub const CHECKS_ENABLED: bool = cfg!(any(
    debug_assertions,
    feature = "strict-invariants",
    feature = "check-invariants"
));

/// Trait for validating data structure invariants.
pub trait DebugInvariants {
    /// Assert invariants in debug builds or when invariant checking is enabled.
    fn debug_assert_invariants(&self);
    /// Validate invariants and return the first error encountered.
    fn validate_invariants(&self) -> Result<(), VectorError>;
}

/// Helper macro to run a fallible check and panic on error when invariant
/// checking is enabled.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants", feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}

/// Precondition check that panics with a [`VectorError::Precondition`]
/// message when the assertion layer is enabled.
#[macro_export]
macro_rules! vector_precondition {
    ($cond:expr, $msg:literal) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants", feature = "check-invariants"))]
        if !($cond) {
            panic!("{}", $crate::vector_error::VectorError::Precondition($msg));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysBad;

    impl DebugInvariants for AlwaysBad {
        fn debug_assert_invariants(&self) {
            crate::debug_invariants!(self.validate_invariants(), "AlwaysBad");
        }
        fn validate_invariants(&self) -> Result<(), VectorError> {
            Err(VectorError::Precondition("always bad"))
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "[invariants] AlwaysBad")]
    fn macro_panics_when_enabled() {
        AlwaysBad.debug_assert_invariants();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "precondition violated: must hold")]
    fn precondition_macro_panics() {
        crate::vector_precondition!(1 + 1 == 3, "must hold");
    }

    #[test]
    fn checks_flag_tracks_debug_assertions() {
        if cfg!(debug_assertions) {
            assert!(CHECKS_ENABLED);
        }
    }
}
