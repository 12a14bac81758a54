//! Representation bases and their excitation/index codecs.

use std::fmt;

use itertools::Itertools;
use ndarray::{Array2, ArrayView2};

use crate::error::StateSpaceError;


// =================
// Trait definitions
// =================

/// Trait defining the behaviours a basis must provide to the state-space machinery.
///
/// A basis owns the bijection between excitation tuples (one non-negative quantum number per
/// mode) and single integer indices. State spaces never invent their own numbering: every
/// conversion goes through [`Self::ravel_state_inds`] and [`Self::unravel_state_inds`].
///
/// Both conversions are total on the basis domain, *i.e.* on the excitations accepted by
/// [`Self::contains_excitation`] and on the indices accepted by [`Self::contains_index`].
/// Implementors may panic when handed anything outside that domain; state spaces check their
/// inputs with [`Self::check_excitations`] and [`Self::check_indices`] on construction.
pub trait RepresentationBasis: fmt::Debug + fmt::Display + PartialEq + Sync {
    /// The number of modes, *i.e.* the length of every excitation tuple.
    fn ndim(&self) -> usize;

    /// The total number of states in the basis.
    fn size(&self) -> usize;

    /// Returns `true` if the excitation tuple names a state of this basis.
    fn contains_excitation(&self, excitation: &[usize]) -> bool;

    /// Returns `true` if the index names a state of this basis.
    fn contains_index(&self, index: usize) -> bool {
        index < self.size()
    }

    /// Converts excitation tuples into indices.
    ///
    /// # Arguments
    ///
    /// * `excitations` - A view of shape `[n, ndim]`, one excitation tuple per row.
    ///
    /// # Returns
    ///
    /// The `n` indices, in row order.
    fn ravel_state_inds(&self, excitations: ArrayView2<usize>) -> Vec<usize>;

    /// Converts indices into excitation tuples.
    ///
    /// # Arguments
    ///
    /// * `indices` - The indices to convert.
    ///
    /// # Returns
    ///
    /// An array of shape `[n, ndim]`, one excitation tuple per index, in input order.
    fn unravel_state_inds(&self, indices: &[usize]) -> Array2<usize>;

    /// Checks that every row of `excitations` is a state of this basis.
    fn check_excitations(&self, excitations: ArrayView2<usize>) -> Result<(), StateSpaceError> {
        if excitations.ncols() != self.ndim() {
            return Err(StateSpaceError::ShapeMismatch {
                shape: excitations.shape().to_vec(),
                ndim: self.ndim(),
            });
        }
        match excitations
            .rows()
            .into_iter()
            .find(|row| !self.contains_excitation(&row.to_vec()))
        {
            Some(row) => Err(StateSpaceError::ExcitationOutOfBasis {
                excitation: row.to_vec(),
            }),
            None => Ok(()),
        }
    }

    /// Checks that every entry of `indices` is a state of this basis.
    fn check_indices(&self, indices: &[usize]) -> Result<(), StateSpaceError> {
        match indices.iter().find(|&&index| !self.contains_index(index)) {
            Some(&index) => Err(StateSpaceError::IndexOutOfBasis {
                index,
                size: self.size(),
            }),
            None => Ok(()),
        }
    }
}

// ======================
// Struct implementations
// ======================

/// A direct-product basis of one-mode bases, each truncated at a fixed number of quanta.
///
/// Mode `j` admits quantum numbers `0..quanta[j]`. Indices are assigned in row-major
/// (C) order, so the last mode varies fastest, matching NumPy's `ravel_multi_index`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimpleProductBasis {
    /// The number of quanta admitted by each mode.
    quanta: Vec<usize>,

    /// Row-major stride of each mode.
    strides: Vec<usize>,

    /// Total number of product states.
    size: usize,
}

impl SimpleProductBasis {
    /// Constructs a product basis from the number of quanta in each mode.
    ///
    /// # Errors
    ///
    /// Errors if there are no modes, if any mode admits no quanta, or if the number of product
    /// states does not fit in a `usize`.
    pub fn new(quanta: &[usize]) -> Result<Self, StateSpaceError> {
        if quanta.is_empty() || quanta.contains(&0) {
            return Err(StateSpaceError::EmptyBasis {
                quanta: quanta.to_vec(),
            });
        }
        let mut strides = vec![1usize; quanta.len()];
        for j in (0..quanta.len() - 1).rev() {
            strides[j] = strides[j + 1]
                .checked_mul(quanta[j + 1])
                .ok_or_else(|| StateSpaceError::BasisTooLarge {
                    quanta: quanta.to_vec(),
                })?;
        }
        let size = strides[0]
            .checked_mul(quanta[0])
            .ok_or_else(|| StateSpaceError::BasisTooLarge {
                quanta: quanta.to_vec(),
            })?;
        Ok(Self {
            quanta: quanta.to_vec(),
            strides,
            size,
        })
    }

    /// Constructs a product basis of `ndim` modes sharing the same number of quanta.
    pub fn uniform(ndim: usize, quanta: usize) -> Result<Self, StateSpaceError> {
        Self::new(&vec![quanta; ndim])
    }

    /// The number of quanta admitted by each mode.
    pub fn quanta(&self) -> &[usize] {
        &self.quanta
    }
}

impl RepresentationBasis for SimpleProductBasis {
    fn ndim(&self) -> usize {
        self.quanta.len()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn contains_excitation(&self, excitation: &[usize]) -> bool {
        excitation.len() == self.quanta.len()
            && excitation.iter().zip(self.quanta.iter()).all(|(n, q)| n < q)
    }

    fn ravel_state_inds(&self, excitations: ArrayView2<usize>) -> Vec<usize> {
        assert_eq!(
            excitations.ncols(),
            self.ndim(),
            "Excitations with {} modes cannot be ravelled in a {}-mode basis.",
            excitations.ncols(),
            self.ndim()
        );
        excitations
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(self.quanta.iter())
                    .zip(self.strides.iter())
                    .map(|((&n, &q), &stride)| {
                        assert!(n < q, "Quantum number {n} exceeds the {q} quanta of its mode.");
                        n * stride
                    })
                    .sum()
            })
            .collect()
    }

    fn unravel_state_inds(&self, indices: &[usize]) -> Array2<usize> {
        let ndim = self.ndim();
        let mut excitations = Array2::<usize>::zeros((indices.len(), ndim));
        for (mut row, &index) in excitations.rows_mut().into_iter().zip(indices.iter()) {
            assert!(
                index < self.size,
                "Index {index} lies outside a basis of {} states.",
                self.size
            );
            let mut rem = index;
            for (j, &stride) in self.strides.iter().enumerate() {
                row[j] = rem / stride;
                rem %= stride;
            }
        }
        excitations
    }
}

impl fmt::Display for SimpleProductBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SimpleProductBasis(quanta=({}))",
            self.quanta.iter().map(|q| q.to_string()).join(", ")
        )
    }
}
