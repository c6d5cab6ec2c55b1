//! Collective reductions and gathers over owned entries.
//!
//! Every rank computes a partial over its owned block, the partials are
//! all-gathered, and each rank folds them in rank order. All ranks therefore
//! return bit-identical results.

use bytemuck::Pod;
use num_traits::{Float, Zero};

use crate::algs::communicator::Communicator;
use crate::algs::exchange::{all_gather, gather_to_root};
use crate::algs::wire::{WireReader, kind, put};
use crate::backend::raw_vec::RawVec;
use crate::scalar::Scalar;
use crate::vector_error::VectorError;

impl<T: Scalar, C: Communicator> RawVec<T, C> {
    /// All-gather one partial per rank (a single local partial for serial storage).
    fn reduce_partials<P: Pod>(&self, partial: P) -> Result<Vec<P>, VectorError> {
        if !self.layout().is_distributed() {
            return Ok(vec![partial]);
        }
        let hdr = self.next_header(kind::REDUCE);
        let all = all_gather(self.comm(), self.tags(), hdr, bytemuck::bytes_of(&partial))?;
        all.iter()
            .enumerate()
            .map(|(r, buf)| Ok(WireReader::new(buf, r).take::<P>(1)?[0]))
            .collect()
    }

    /// Collective: `n` summed over all ranks sharing this storage.
    pub(crate) fn sum_counts(&self, n: usize) -> Result<usize, VectorError> {
        Ok(self
            .reduce_partials((n as u64).to_le())?
            .into_iter()
            .map(|c| u64::from_le(c) as usize)
            .sum())
    }

    /// Minimum real part over all entries (`+inf` for an empty vector).
    pub fn min(&self) -> Result<T::Real, VectorError> {
        let local = self.with_owned(|o| {
            o.iter()
                .map(|x| x.real_part())
                .fold(T::Real::infinity(), Float::min)
        })?;
        Ok(self
            .reduce_partials(local)?
            .into_iter()
            .fold(T::Real::infinity(), Float::min))
    }

    /// Maximum real part over all entries (`-inf` for an empty vector).
    pub fn max(&self) -> Result<T::Real, VectorError> {
        let local = self.with_owned(|o| {
            o.iter()
                .map(|x| x.real_part())
                .fold(T::Real::neg_infinity(), Float::max)
        })?;
        Ok(self
            .reduce_partials(local)?
            .into_iter()
            .fold(T::Real::neg_infinity(), Float::max))
    }

    pub fn sum(&self) -> Result<T, VectorError> {
        let local = self.with_owned(|o| o.iter().fold(T::zero(), |acc, &x| acc + x))?;
        Ok(self
            .reduce_partials(local)?
            .into_iter()
            .fold(T::zero(), |acc, x| acc + x))
    }

    pub fn l1_norm(&self) -> Result<T::Real, VectorError> {
        let local = self.with_owned(|o| {
            o.iter()
                .fold(T::Real::zero(), |acc, &x| acc + x.modulus())
        })?;
        Ok(self
            .reduce_partials(local)?
            .into_iter()
            .fold(T::Real::zero(), |acc, x| acc + x))
    }

    pub fn l2_norm(&self) -> Result<T::Real, VectorError> {
        let local = self.with_owned(|o| {
            o.iter().fold(T::Real::zero(), |acc, &x| {
                let m = x.modulus();
                acc + m * m
            })
        })?;
        Ok(self
            .reduce_partials(local)?
            .into_iter()
            .fold(T::Real::zero(), |acc, x| acc + x)
            .sqrt())
    }

    pub fn linfty_norm(&self) -> Result<T::Real, VectorError> {
        let local = self.with_owned(|o| {
            o.iter()
                .fold(T::Real::zero(), |acc, &x| acc.max(x.modulus()))
        })?;
        Ok(self
            .reduce_partials(local)?
            .into_iter()
            .fold(T::Real::zero(), Float::max))
    }

    /// `Σ self_i · conj(other_i)` when `conjugate`, else `Σ self_i · other_i`.
    pub fn dot(&self, other: &Self, conjugate: bool) -> Result<T, VectorError> {
        self.expect_compatible(other)?;
        let theirs = other.with_owned(|o| o.to_vec())?;
        let local = self.with_owned(|mine| {
            mine.iter().zip(&theirs).fold(T::zero(), |acc, (&a, &b)| {
                acc + a * if conjugate { b.conj() } else { b }
            })
        })?;
        Ok(self
            .reduce_partials(local)?
            .into_iter()
            .fold(T::zero(), |acc, x| acc + x))
    }

    /// Collective: every rank receives all `N` entries in global order.
    pub fn gather_all(&self) -> Result<Vec<T>, VectorError> {
        let owned = self.with_owned(|o| o.to_vec())?;
        if !self.layout().is_distributed() {
            return Ok(owned);
        }
        let mut buf = Vec::with_capacity(owned.len() * size_of::<T>());
        put(&mut buf, &owned);
        let hdr = self.next_header(kind::GATHER);
        let all = all_gather(self.comm(), self.tags(), hdr, &buf)?;
        self.concat_blocks(&all)
    }

    /// Collective: rank `root` receives all `N` entries, other ranks `None`.
    pub fn gather_to_one(&self, root: usize) -> Result<Option<Vec<T>>, VectorError> {
        let owned = self.with_owned(|o| o.to_vec())?;
        if !self.layout().is_distributed() {
            return Ok((self.comm().rank() == root).then_some(owned));
        }
        let mut buf = Vec::with_capacity(owned.len() * size_of::<T>());
        put(&mut buf, &owned);
        let hdr = self.next_header(kind::GATHER);
        match gather_to_root(self.comm(), self.tags(), hdr, &buf, root)? {
            Some(all) => Ok(Some(self.concat_blocks(&all)?)),
            None => Ok(None),
        }
    }

    fn concat_blocks(&self, blocks: &[Vec<u8>]) -> Result<Vec<T>, VectorError> {
        let partition = self.layout().partition();
        let mut out = Vec::with_capacity(partition.global_size());
        for (r, buf) in blocks.iter().enumerate() {
            let n = partition.range_of(r).len();
            out.extend(WireReader::new(buf, r).take::<T>(n)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::algs::communicator::{NoComm, VectorCommTags};
    use crate::backend::raw_vec::{InsertMode, RawVec};

    #[test]
    fn serial_reductions() {
        let v = RawVec::<f64, _>::create_serial(NoComm, VectorCommTags::default(), 4);
        v.set_values(&[0, 1, 2, 3], &[3.0, -4.0, 0.0, 1.0], InsertMode::Insert)
            .unwrap();
        assert_eq!(v.min().unwrap(), -4.0);
        assert_eq!(v.max().unwrap(), 3.0);
        assert_eq!(v.sum().unwrap(), 0.0);
        assert_eq!(v.l1_norm().unwrap(), 8.0);
        assert!((v.l2_norm().unwrap() - 26.0f64.sqrt()).abs() < 1e-12);
        assert_eq!(v.linfty_norm().unwrap(), 4.0);
        assert_eq!(v.dot(&v.handle(), true).unwrap(), 26.0);
        assert_eq!(v.gather_all().unwrap(), vec![3.0, -4.0, 0.0, 1.0]);
        assert_eq!(v.gather_to_one(1).unwrap(), None);
    }

    #[test]
    fn empty_vector_extrema() {
        let v = RawVec::<f64, _>::create_serial(NoComm, VectorCommTags::default(), 0);
        assert_eq!(v.min().unwrap(), f64::INFINITY);
        assert_eq!(v.max().unwrap(), f64::NEG_INFINITY);
        assert_eq!(v.l2_norm().unwrap(), 0.0);
    }
}
