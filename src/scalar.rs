//! Scalar types storable in a distributed vector.

use core::fmt::Debug;

use bytemuck::Pod;
use num_traits::{Float, NumAssign};

/// Element type of a [`Vector`](crate::vector::Vector).
///
/// Values travel over the wire as raw bytes, hence the [`Pod`] bound. Real
/// types implement `conj` as the identity; a complex scalar type plugs in by
/// implementing this trait with a genuine conjugate.
pub trait Scalar: Pod + NumAssign + Default + Debug + PartialEq + Send + Sync + 'static {
    /// Real type returned by norms and by `min`/`max`.
    type Real: Float + Pod + Default + Debug + Send + Sync + 'static;

    /// Complex conjugate.
    fn conj(self) -> Self;
    /// Modulus.
    fn modulus(self) -> Self::Real;
    /// Real part.
    fn real_part(self) -> Self::Real;
    /// Embed a real value.
    fn from_real(r: Self::Real) -> Self;
}

macro_rules! impl_real_scalar {
    ($($t:ty),*) => {$(
        impl Scalar for $t {
            type Real = $t;
            #[inline]
            fn conj(self) -> Self { self }
            #[inline]
            fn modulus(self) -> Self::Real { self.abs() }
            #[inline]
            fn real_part(self) -> Self::Real { self }
            #[inline]
            fn from_real(r: Self::Real) -> Self { r }
        }
    )*};
}

impl_real_scalar!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_scalars_are_self_conjugate() {
        assert_eq!(Scalar::conj(-2.5f64), -2.5);
        assert_eq!((-2.5f32).modulus(), 2.5);
        assert_eq!(<f64 as Scalar>::from_real(1.5).real_part(), 1.5);
    }
}
