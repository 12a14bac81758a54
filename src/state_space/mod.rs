//! Sets of basis states, their index bookkeeping, and the pairs of states they couple.
//!
//! A [`BasisStateSpace`] is an immutable set of states of a [`RepresentationBasis`], supplied
//! either as excitation tuples or as indices. Its canonical views (deduplicated excitations,
//! deduplicated indices and the permutation sorting the indices) are computed on first access
//! and memoised for the lifetime of the space.
//!
//! Applying selection rules to a space yields a [`SelectionRuleStateSpace`], a
//! [`BasisMultiStateSpace`] holding one child space per base state. Index pairs extracted from
//! either drive the construction of sparse operator matrices, and a [`BraKetSpace`] filters
//! paired bra/ket states before matrix elements are evaluated.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use indexmap::IndexSet;
use itertools::Itertools;
use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};

use crate::basis::RepresentationBasis;
use crate::error::StateSpaceError;

pub mod braket;
pub mod multi_state_space;
pub mod selection_rules;

pub use braket::{BraKetSpace, PairSelection};
pub use multi_state_space::BasisMultiStateSpace;
pub use selection_rules::{DeltaStorage, SelectionRule, SelectionRuleStateSpace};


// ==================
// Enum definitions
// ==================

/// An enumerated type for the ways in which states can be supplied to a [`BasisStateSpace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateSpaceSpec {
    /// Each state is an excitation tuple with one quantum number per mode.
    Excitations,

    /// Each state is a single index under the basis's raveling scheme.
    Indices,
}

impl StateSpaceSpec {
    /// Guesses how a raw state array was meant to be read.
    ///
    /// The array is taken to hold excitations if its trailing dimension equals the number of
    /// modes, and indices otherwise. This is a compatibility heuristic only: for a one-mode basis
    /// a column of indices is indistinguishable from a column of excitations, and is read as
    /// excitations. Prefer stating the mode explicitly.
    pub fn infer(shape: &[usize], ndim: usize) -> Self {
        if shape.last() == Some(&ndim) {
            StateSpaceSpec::Excitations
        } else {
            StateSpaceSpec::Indices
        }
    }
}

impl fmt::Display for StateSpaceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateSpaceSpec::Excitations => write!(f, "excitations"),
            StateSpaceSpec::Indices => write!(f, "indices"),
        }
    }
}

// ==========
// IndexPairs
// ==========

/// A deduplicated set of `(row, column)` index pairs, stored as two parallel arrays sorted
/// lexicographically by pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPairs {
    rows: Vec<usize>,
    cols: Vec<usize>,
}

impl IndexPairs {
    /// Collects pairs, discarding duplicates and ordering the result.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let (rows, cols) = pairs.into_iter().collect::<BTreeSet<_>>().into_iter().unzip();
        Self { rows, cols }
    }

    /// The row indices.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// The column indices.
    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates over the pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows.iter().copied().zip(self.cols.iter().copied())
    }

    /// The deduplicated union of two pair sets.
    pub fn union(&self, other: &Self) -> Self {
        Self::from_pairs(self.iter().chain(other.iter()))
    }
}

impl FromIterator<(usize, usize)> for IndexPairs {
    fn from_iter<I: IntoIterator<Item = (usize, usize)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl fmt::Display for IndexPairs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, col) in self.iter() {
            writeln!(f, "({row}, {col})")?;
        }
        Ok(())
    }
}

// ===============
// BasisStateSpace
// ===============

/// The states exactly as supplied on construction.
#[derive(Clone, Debug)]
enum InitStates {
    Excitations(Array2<usize>),
    Indices(Vec<usize>),
}

/// An immutable subspace of states of a representation basis.
///
/// The basis is borrowed, not owned. The canonical excitations and indices are two views of the
/// same deduplicated set, in the order each state was first supplied: row `k` of
/// [`Self::excitations`] is the state whose index is entry `k` of [`Self::indices`].
pub struct BasisStateSpace<'b, B: RepresentationBasis> {
    basis: &'b B,
    init_states: InitStates,
    excitations: OnceLock<Array2<usize>>,
    indices: OnceLock<Vec<usize>>,
    indexer: OnceLock<Vec<usize>>,
}

impl<'b, B: RepresentationBasis> BasisStateSpace<'b, B> {
    /// Constructs a state space from a raw state array read in the given mode.
    ///
    /// # Arguments
    ///
    /// * `basis` - The basis the states belong to.
    /// * `states` - The raw states. In [`StateSpaceSpec::Excitations`] mode the array is read as
    /// consecutive excitation tuples, so its total length must be a multiple of the number of
    /// modes. In [`StateSpaceSpec::Indices`] mode it is flattened into a list of indices.
    /// * `mode` - How `states` is to be read.
    ///
    /// # Errors
    ///
    /// Errors if the array cannot be reshaped into excitation tuples, or if any state lies
    /// outside the basis.
    pub fn new(
        basis: &'b B,
        states: ArrayD<usize>,
        mode: StateSpaceSpec,
    ) -> Result<Self, StateSpaceError> {
        let ndim = basis.ndim();
        match mode {
            StateSpaceSpec::Excitations => {
                if states.ndim() == 0 || states.len() % ndim != 0 {
                    return Err(StateSpaceError::ShapeMismatch {
                        shape: states.shape().to_vec(),
                        ndim,
                    });
                }
                let n = states.len() / ndim;
                let flat = states.iter().copied().collect_vec();
                let excitations = Array2::from_shape_vec((n, ndim), flat).map_err(|_| {
                    StateSpaceError::ShapeMismatch {
                        shape: states.shape().to_vec(),
                        ndim,
                    }
                })?;
                Self::from_excitations(basis, excitations)
            }
            StateSpaceSpec::Indices => {
                Self::from_indices(basis, states.iter().copied().collect_vec())
            }
        }
    }

    /// Constructs a state space from a raw state array, guessing its mode with
    /// [`StateSpaceSpec::infer`].
    pub fn new_inferred(basis: &'b B, states: ArrayD<usize>) -> Result<Self, StateSpaceError> {
        let mode = StateSpaceSpec::infer(states.shape(), basis.ndim());
        log::debug!("Reading a state array of shape {:?} as {mode}.", states.shape());
        Self::new(basis, states, mode)
    }

    /// Constructs a state space from excitation tuples, one per row.
    pub fn from_excitations(
        basis: &'b B,
        excitations: Array2<usize>,
    ) -> Result<Self, StateSpaceError> {
        basis.check_excitations(excitations.view())?;
        Ok(Self::from_init(basis, InitStates::Excitations(excitations)))
    }

    /// Constructs a state space from basis indices.
    pub fn from_indices(basis: &'b B, indices: Vec<usize>) -> Result<Self, StateSpaceError> {
        basis.check_indices(&indices)?;
        Ok(Self::from_init(basis, InitStates::Indices(indices)))
    }

    /// Constructs a state space from excitations already known to lie in the basis.
    pub(crate) fn from_checked_excitations(basis: &'b B, excitations: Array2<usize>) -> Self {
        Self::from_init(basis, InitStates::Excitations(excitations))
    }

    /// Constructs a state space from indices already known to lie in the basis.
    pub(crate) fn from_checked_indices(basis: &'b B, indices: Vec<usize>) -> Self {
        Self::from_init(basis, InitStates::Indices(indices))
    }

    fn from_init(basis: &'b B, init_states: InitStates) -> Self {
        Self {
            basis,
            init_states,
            excitations: OnceLock::new(),
            indices: OnceLock::new(),
            indexer: OnceLock::new(),
        }
    }

    /// The basis the states belong to.
    pub fn basis(&self) -> &'b B {
        self.basis
    }

    /// The number of modes.
    pub fn ndim(&self) -> usize {
        self.basis.ndim()
    }

    /// The mode in which the states were supplied.
    pub fn mode(&self) -> StateSpaceSpec {
        match self.init_states {
            InitStates::Excitations(_) => StateSpaceSpec::Excitations,
            InitStates::Indices(_) => StateSpaceSpec::Indices,
        }
    }

    /// The number of distinct states.
    pub fn len(&self) -> usize {
        self.indices().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The distinct states as excitation tuples, shape `[len, ndim]`.
    pub fn excitations(&self) -> &Array2<usize> {
        self.excitations.get_or_init(|| match &self.init_states {
            InitStates::Excitations(excitations) => {
                let unique = excitations
                    .rows()
                    .into_iter()
                    .map(|row| row.to_vec())
                    .collect::<IndexSet<_>>();
                let n = unique.len();
                Array2::from_shape_vec((n, self.ndim()), unique.into_iter().flatten().collect())
                    .unwrap_or_else(|_| {
                        panic!("Unable to reshape {n} unique excitations into an array.")
                    })
            }
            InitStates::Indices(_) => self.basis.unravel_state_inds(self.indices()),
        })
    }

    /// The distinct states as basis indices.
    pub fn indices(&self) -> &[usize] {
        self.indices.get_or_init(|| match &self.init_states {
            InitStates::Excitations(_) => self.basis.ravel_state_inds(self.excitations().view()),
            InitStates::Indices(indices) => indices.iter().copied().unique().collect(),
        })
    }

    /// The permutation that sorts [`Self::indices`] in ascending order.
    pub fn indexer(&self) -> &[usize] {
        self.indexer.get_or_init(|| {
            let indices = self.indices();
            (0..indices.len())
                .sorted_by_key(|&i| indices[i])
                .collect()
        })
    }

    /// The states in the order they were supplied, duplicates included, as excitation tuples.
    pub fn supplied_excitations(&self) -> Array2<usize> {
        match &self.init_states {
            InitStates::Excitations(excitations) => excitations.clone(),
            InitStates::Indices(indices) => self.basis.unravel_state_inds(indices),
        }
    }

    /// Locates indices within this space by binary search over the sorted index order.
    ///
    /// # Arguments
    ///
    /// * `to_search` - The indices to locate.
    ///
    /// # Returns
    ///
    /// For each index present in the space, its position within [`Self::indices`]. For an index
    /// that is absent, the position at which it would be inserted to keep the ascending order;
    /// use [`Self::contains`] when membership is not already known.
    pub fn find(&self, to_search: &[usize]) -> Vec<usize> {
        let indices = self.indices();
        let indexer = self.indexer();
        to_search
            .iter()
            .map(|target| {
                match indexer.binary_search_by_key(target, |&i| indices[i]) {
                    Ok(pos) => indexer[pos],
                    Err(pos) => pos,
                }
            })
            .collect()
    }

    /// Returns `true` if the index is one of the states of this space.
    pub fn contains(&self, index: usize) -> bool {
        let indices = self.indices();
        self.indexer()
            .binary_search_by_key(&index, |&i| indices[i])
            .is_ok()
    }

    /// Builds a new space from the states at the given positions of [`Self::indices`].
    ///
    /// # Errors
    ///
    /// Errors if a position is out of range.
    pub fn take_subspace(&self, positions: &[usize]) -> Result<Self, StateSpaceError> {
        let indices = self.indices();
        let selected = positions
            .iter()
            .map(|&position| {
                indices
                    .get(position)
                    .copied()
                    .ok_or(StateSpaceError::PositionOutOfRange {
                        position,
                        len: indices.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_checked_indices(self.basis, selected))
    }

    /// Generates the states reachable from each state of this space under a set of selection
    /// rules.
    ///
    /// See [`SelectionRuleStateSpace::from_rules`].
    pub fn apply_selection_rules(
        &self,
        selection_rules: &[SelectionRule],
        filter_space: Option<&BasisStateSpace<'b, B>>,
        iterations: usize,
    ) -> Result<SelectionRuleStateSpace<'b, B>, StateSpaceError> {
        SelectionRuleStateSpace::from_rules(self, selection_rules, filter_space, iterations)
    }

    /// Generates the index pairs of the matrix elements that connect this space to another.
    ///
    /// # Arguments
    ///
    /// * `other` - The space of column states. If `None`, this space is used.
    /// * `selection_rules` - If `None`, every pair in the Cartesian product of the two spaces is
    /// returned. Otherwise the rules are applied to this space, bounded by `other`, and only the
    /// reachable pairs are returned.
    /// * `freq_threshold` - Frequency-difference threshold. Not supported; must be `None`.
    ///
    /// # Returns
    ///
    /// The deduplicated `(row, column)` index pairs.
    ///
    /// # Errors
    ///
    /// Errors if a frequency threshold is given or if the two spaces have different numbers of
    /// modes.
    pub fn get_representation_indices(
        &self,
        other: Option<&BasisStateSpace<'b, B>>,
        selection_rules: Option<&[SelectionRule]>,
        freq_threshold: Option<f64>,
    ) -> Result<IndexPairs, StateSpaceError> {
        if freq_threshold.is_some() {
            return Err(StateSpaceError::Unimplemented(
                "frequency-threshold filtering of representation indices".to_string(),
            ));
        }
        let other = other.unwrap_or(self);
        if other.ndim() != self.ndim() {
            return Err(StateSpaceError::DimensionMismatch {
                expected: self.ndim(),
                found: other.ndim(),
            });
        }
        match selection_rules {
            None => Ok(self
                .indices()
                .iter()
                .copied()
                .cartesian_product(other.indices().iter().copied())
                .collect()),
            Some(rules) => self
                .apply_selection_rules(rules, Some(other), 1)?
                .get_representation_indices(None),
        }
    }
}

impl<'b, B: RepresentationBasis> Clone for BasisStateSpace<'b, B> {
    fn clone(&self) -> Self {
        Self {
            basis: self.basis,
            init_states: self.init_states.clone(),
            excitations: self.excitations.clone(),
            indices: self.indices.clone(),
            indexer: self.indexer.clone(),
        }
    }
}

impl<'b, B: RepresentationBasis> fmt::Debug for BasisStateSpace<'b, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasisStateSpace")
            .field("basis", self.basis)
            .field("init_states", &self.init_states)
            .finish()
    }
}

impl<'b, B: RepresentationBasis> fmt::Display for BasisStateSpace<'b, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BasisStateSpace(nstates={}, basis={})",
            self.len(),
            self.basis
        )
    }
}
