//! Element access, arithmetic, reductions and matrix-vector accumulation.
//!
//! Reads go through the array cache. Every mutating call releases the
//! automatic view first and leaves the vector Open; whole-vector reads
//! (reductions, operands) release it too, so the backend storage is never
//! locked by a stale view.

use crate::algs::communicator::Communicator;
use crate::backend::csr::CsrMatrix;
use crate::backend::raw_vec::InsertMode;
use crate::scalar::Scalar;
use crate::vector::{Vector, VectorState};
use crate::vector_error::VectorError;

impl<T: Scalar, C: Communicator> Vector<T, C> {
    // ----- element reads ---------------------------------------------------

    /// Value at global index `i`, which must be owned or a declared ghost.
    pub fn get(&self, i: usize) -> Result<T, VectorError> {
        let raw = self.raw_ref()?;
        self.cache
            .with_view(raw, |view| view.as_slice()[self.offset_in_view(view, i)])
    }

    /// Values at several global indices, in the order given.
    pub fn get_many(&self, indices: &[usize]) -> Result<Vec<T>, VectorError> {
        let raw = self.raw_ref()?;
        self.cache.with_view(raw, |view| {
            let values = view.as_slice();
            indices
                .iter()
                .map(|&i| values[self.offset_in_view(view, i)])
                .collect()
        })
    }

    /// Like [`get_many`](Self::get_many), writing into `out`.
    pub fn get_into(&self, indices: &[usize], out: &mut [T]) -> Result<(), VectorError> {
        crate::vector_precondition!(
            indices.len() == out.len(),
            "get_into() needs one output slot per index"
        );
        let raw = self.raw_ref()?;
        self.cache.with_view(raw, |view| {
            let values = view.as_slice();
            for (o, &i) in out.iter_mut().zip(indices) {
                *o = values[self.offset_in_view(view, i)];
            }
        })
    }

    // ----- element writes --------------------------------------------------

    /// Overwrite entry `i`. Entries owned by another rank take effect at the
    /// next [`close`](Self::close).
    pub fn set(&mut self, i: usize, value: T) -> Result<(), VectorError> {
        self.begin_mutation()?.set_value(i, value, InsertMode::Insert)?;
        self.state = VectorState::Open;
        Ok(())
    }

    /// Add `value` to entry `i`.
    pub fn add(&mut self, i: usize, value: T) -> Result<(), VectorError> {
        self.begin_mutation()?.set_value(i, value, InsertMode::Add)?;
        self.state = VectorState::Open;
        Ok(())
    }

    /// `self[indices[k]] += values[k]`.
    pub fn add_values(&mut self, indices: &[usize], values: &[T]) -> Result<(), VectorError> {
        self.begin_mutation()?
            .set_values(indices, values, InsertMode::Add)?;
        self.state = VectorState::Open;
        Ok(())
    }

    /// Same as [`add_values`](Self::add_values), values first.
    pub fn add_vector_values(&mut self, values: &[T], indices: &[usize]) -> Result<(), VectorError> {
        self.add_values(indices, values)
    }

    /// `self[indices[k]] = values[k]`.
    pub fn insert(&mut self, indices: &[usize], values: &[T]) -> Result<(), VectorError> {
        self.begin_mutation()?
            .set_values(indices, values, InsertMode::Insert)?;
        self.state = VectorState::Open;
        Ok(())
    }

    // ----- whole-vector assignment ---------------------------------------

    /// Set every entry, ghosts included, to `value`.
    pub fn assign_scalar(&mut self, value: T) -> Result<(), VectorError> {
        self.begin_mutation()?.fill_local_form(value)?;
        self.state = VectorState::Open;
        Ok(())
    }

    /// Copy the local form of `other`, which must have the same layout.
    pub fn assign(&mut self, other: &Self) -> Result<(), VectorError> {
        let src = other.closed_operand()?;
        self.begin_mutation()?.copy_from(src)?;
        self.state = VectorState::Open;
        Ok(())
    }

    /// Copy owned entries from a slice holding either just the owned block
    /// (`local_size` values) or the whole vector (`size` values).
    pub fn assign_from_slice(&mut self, values: &[T]) -> Result<(), VectorError> {
        let (n, n_local, first) = (self.size(), self.local_size(), self.first_local_index());
        let block = if values.len() == n_local {
            values
        } else if values.len() == n {
            &values[first..first + n_local]
        } else {
            return Err(VectorError::LayoutMismatch(format!(
                "slice of {} values for a vector of {n} ({n_local} local)",
                values.len()
            )));
        };
        self.begin_mutation()?
            .with_local_form_mut(|v| v[..n_local].copy_from_slice(block))?;
        self.state = VectorState::Open;
        Ok(())
    }

    // ----- arithmetic ------------------------------------------------------

    /// `self *= a`.
    pub fn scale(&mut self, a: T) -> Result<(), VectorError> {
        self.map_entries(move |x| x * a)
    }

    /// `self += a` for every entry.
    pub fn add_scalar(&mut self, a: T) -> Result<(), VectorError> {
        self.map_entries(move |x| x + a)
    }

    /// `self += v`.
    pub fn add_vec(&mut self, v: &Self) -> Result<(), VectorError> {
        self.zip_entries(v, |x, y| x + y)
    }

    /// `self += a * v`.
    pub fn add_scaled(&mut self, a: T, v: &Self) -> Result<(), VectorError> {
        self.zip_entries(v, move |x, y| x + a * y)
    }

    /// `self -= v`.
    pub fn sub_vec(&mut self, v: &Self) -> Result<(), VectorError> {
        self.zip_entries(v, |x, y| x - y)
    }

    /// `self[i] = 1 / self[i]`.
    pub fn reciprocal(&mut self) -> Result<(), VectorError> {
        self.map_entries(|x| T::one() / x)
    }

    /// Replace every entry by its complex conjugate.
    pub fn conjugate(&mut self) -> Result<(), VectorError> {
        self.map_entries(|x| x.conj())
    }

    /// Replace every entry by its modulus.
    pub fn abs(&mut self) -> Result<(), VectorError> {
        self.map_entries(|x| T::from_real(x.modulus()))
    }

    /// `self[i] = a[i] * b[i]`.
    pub fn pointwise_mult(&mut self, a: &Self, b: &Self) -> Result<(), VectorError> {
        self.zip2_entries(a, b, |x, y| x * y)
    }

    /// `self[i] = a[i] / b[i]`.
    pub fn pointwise_divide(&mut self, a: &Self, b: &Self) -> Result<(), VectorError> {
        self.zip2_entries(a, b, |x, y| x / y)
    }

    fn map_entries<F>(&mut self, f: F) -> Result<(), VectorError>
    where
        F: Fn(T) -> T + Send + Sync,
    {
        self.begin_mutation()?.map_in_place(f)?;
        self.state = VectorState::Open;
        Ok(())
    }

    fn zip_entries<F>(&mut self, other: &Self, f: F) -> Result<(), VectorError>
    where
        F: Fn(T, T) -> T + Send + Sync,
    {
        let theirs = other.closed_operand()?;
        self.begin_mutation()?.zip_in_place(theirs, f)?;
        self.state = VectorState::Open;
        Ok(())
    }

    fn zip2_entries<F>(&mut self, a: &Self, b: &Self, f: F) -> Result<(), VectorError>
    where
        F: Fn(T, T) -> T + Send + Sync,
    {
        let (a, b) = (a.closed_operand()?, b.closed_operand()?);
        self.begin_mutation()?.zip2_into(a, b, f)?;
        self.state = VectorState::Open;
        Ok(())
    }

    // ----- reductions (collective) ---------------------------------------

    /// Smallest real part over all entries.
    pub fn min(&self) -> Result<T::Real, VectorError> {
        self.closed_operand()?.min()
    }

    /// Largest real part over all entries.
    pub fn max(&self) -> Result<T::Real, VectorError> {
        self.closed_operand()?.max()
    }

    pub fn sum(&self) -> Result<T, VectorError> {
        self.closed_operand()?.sum()
    }

    pub fn l1_norm(&self) -> Result<T::Real, VectorError> {
        self.closed_operand()?.l1_norm()
    }

    pub fn l2_norm(&self) -> Result<T::Real, VectorError> {
        self.closed_operand()?.l2_norm()
    }

    pub fn linfty_norm(&self) -> Result<T::Real, VectorError> {
        self.closed_operand()?.linfty_norm()
    }

    /// `Σ self[i] · conj(v[i])`.
    pub fn dot(&self, v: &Self) -> Result<T, VectorError> {
        self.closed_operand()?.dot(v.closed_operand()?, true)
    }

    /// `Σ self[i] · v[i]`, without conjugation.
    pub fn indefinite_dot(&self, v: &Self) -> Result<T, VectorError> {
        self.closed_operand()?.dot(v.closed_operand()?, false)
    }

    // ----- matrix-vector accumulation ------------------------------------

    /// Collective: `self += A · v`.
    ///
    /// `a` holds the rows this rank owns in `self` and has `v.size()` columns.
    pub fn add_vector(&mut self, v: &Self, a: &CsrMatrix<T>) -> Result<(), VectorError> {
        let x = v.closed_operand()?.gather_all()?;
        let range = self.first_local_index()..self.last_local_index();
        if a.local_rows() != range || a.n_cols() != x.len() {
            return Err(VectorError::LayoutMismatch(format!(
                "matrix rows {:?} x {} cols against owned rows {range:?} and {} input entries",
                a.local_rows(),
                a.n_cols(),
                x.len()
            )));
        }
        let n_local = range.len();
        self.begin_mutation()?
            .with_local_form_mut(|y| a.mult_add(&x, &mut y[..n_local]))?;
        self.state = VectorState::Open;
        Ok(())
    }

    /// `self += Aᵀ · v`. Contributions to entries owned elsewhere arrive at
    /// the next [`close`](Self::close).
    ///
    /// `a` holds the rows this rank owns in `v` and has `self.size()` columns.
    pub fn add_vector_transpose(&mut self, v: &Self, a: &CsrMatrix<T>) -> Result<(), VectorError> {
        self.add_transpose_product(v, a, false)
    }

    /// `self += Aᴴ · v`.
    pub fn add_vector_conjugate_transpose(
        &mut self,
        v: &Self,
        a: &CsrMatrix<T>,
    ) -> Result<(), VectorError> {
        self.add_transpose_product(v, a, true)
    }

    fn add_transpose_product(
        &mut self,
        v: &Self,
        a: &CsrMatrix<T>,
        conjugate: bool,
    ) -> Result<(), VectorError> {
        let src = v.closed_operand()?;
        let (first, last) = src.ownership_range();
        if a.local_rows() != (first..last) || a.n_cols() != self.size() {
            return Err(VectorError::LayoutMismatch(format!(
                "matrix rows {:?} x {} cols against input rows [{first}, {last}) and {} output entries",
                a.local_rows(),
                a.n_cols(),
                self.size()
            )));
        }
        let x = src.with_owned(|o| o.to_vec())?;
        let contributions = a.transpose_contributions(&x, conjugate);
        let raw = self.begin_mutation()?;
        for (col, value) in contributions {
            raw.set_value(col, value, InsertMode::Add)?;
        }
        self.state = VectorState::Open;
        Ok(())
    }

    // ----- manual array access -------------------------------------------

    /// Read-write access to the local form. Must be followed by
    /// [`restore_array`](Self::restore_array) before the vector is used
    /// otherwise.
    pub fn get_array(&mut self) -> Result<&mut [T], VectorError> {
        let raw = self.raw_ref()?;
        self.cache.acquire(raw, false)?;
        self.cache.set_manual(true);
        self.state = VectorState::Open;
        self.cache
            .view_mut()
            .and_then(|v| v.as_mut_slice())
            .ok_or(VectorError::Precondition("array is held read-only"))
    }

    /// Read-only access to the local form. Must be followed by
    /// [`restore_array`](Self::restore_array).
    pub fn get_array_read(&mut self) -> Result<&[T], VectorError> {
        let raw = self.raw_ref()?;
        self.cache.acquire(raw, true)?;
        self.cache.set_manual(true);
        self.cache
            .view_mut()
            .map(|v| v.as_slice())
            .ok_or(VectorError::Precondition("array is not present"))
    }

    /// Return an array obtained through `get_array`/`get_array_read`.
    pub fn restore_array(&mut self) {
        crate::vector_precondition!(
            self.cache.is_manually_retrieved(),
            "restore_array() without a prior get_array()"
        );
        self.cache.set_manual(false);
        self.cache.release_mut();
    }
}
