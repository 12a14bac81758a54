//! Collections of state spaces sharing one basis.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use itertools::Itertools;
use ndarray::Array2;
use rayon::prelude::*;

use crate::basis::RepresentationBasis;
use crate::error::StateSpaceError;
use crate::state_space::{BasisStateSpace, IndexPairs};

#[cfg(test)]
#[path = "multi_state_space_tests.rs"]
mod multi_state_space_tests;

/// A grid of [`BasisStateSpace`]s over a common basis.
///
/// The spaces are held in row-major order together with a separate shape descriptor, so ragged
/// collections (spaces of different sizes) need no special treatment. Aggregate views are
/// deduplicated unions over every space in the grid, sorted by index, and are memoised.
pub struct BasisMultiStateSpace<'b, B: RepresentationBasis> {
    basis: &'b B,
    spaces: Vec<BasisStateSpace<'b, B>>,
    shape: Vec<usize>,
    indices: OnceLock<Vec<usize>>,
    excitations: OnceLock<Array2<usize>>,
}

impl<'b, B: RepresentationBasis> BasisMultiStateSpace<'b, B> {
    /// Constructs a multi-state space from spaces laid out in a row-major grid.
    ///
    /// # Arguments
    ///
    /// * `basis` - The basis shared by all spaces.
    /// * `spaces` - The spaces, in row-major order.
    /// * `shape` - The grid shape. Its product must equal the number of spaces.
    ///
    /// # Errors
    ///
    /// Errors if the shape does not match the number of spaces or if any space has a different
    /// number of modes from the basis.
    pub fn new(
        basis: &'b B,
        spaces: Vec<BasisStateSpace<'b, B>>,
        shape: Vec<usize>,
    ) -> Result<Self, StateSpaceError> {
        if shape.iter().product::<usize>() != spaces.len() {
            return Err(StateSpaceError::GridShapeMismatch {
                shape,
                n_spaces: spaces.len(),
            });
        }
        if let Some(space) = spaces.iter().find(|space| space.ndim() != basis.ndim()) {
            return Err(StateSpaceError::DimensionMismatch {
                expected: basis.ndim(),
                found: space.ndim(),
            });
        }
        Ok(Self {
            basis,
            spaces,
            shape,
            indices: OnceLock::new(),
            excitations: OnceLock::new(),
        })
    }

    /// Constructs a one-dimensional multi-state space, taking the basis from the first space.
    ///
    /// # Errors
    ///
    /// Errors if `spaces` is empty or the spaces disagree on the number of modes.
    pub fn from_spaces(spaces: Vec<BasisStateSpace<'b, B>>) -> Result<Self, StateSpaceError> {
        let basis = spaces
            .first()
            .ok_or(StateSpaceError::EmptyMultiSpace)?
            .basis();
        let shape = vec![spaces.len()];
        Self::new(basis, spaces, shape)
    }

    pub fn basis(&self) -> &'b B {
        self.basis
    }

    pub fn ndim(&self) -> usize {
        self.basis.ndim()
    }

    /// The grid shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The number of spaces in the grid.
    pub fn nstates(&self) -> usize {
        self.spaces.len()
    }

    /// The first space of the grid, if any.
    pub fn representative_space(&self) -> Option<&BasisStateSpace<'b, B>> {
        self.spaces.first()
    }

    /// The number of distinct states across all spaces.
    pub fn len(&self) -> usize {
        self.indices().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The spaces in row-major order.
    pub fn spaces(&self) -> &[BasisStateSpace<'b, B>] {
        &self.spaces
    }

    /// Iterates over the spaces in row-major order.
    pub fn iter(&self) -> std::slice::Iter<'_, BasisStateSpace<'b, B>> {
        self.spaces.iter()
    }

    /// The space at a flat position.
    pub fn get(&self, position: usize) -> Option<&BasisStateSpace<'b, B>> {
        self.spaces.get(position)
    }

    /// The space at a grid coordinate.
    pub fn get_nd(&self, coordinate: &[usize]) -> Option<&BasisStateSpace<'b, B>> {
        if coordinate.len() != self.shape.len()
            || coordinate.iter().zip(self.shape.iter()).any(|(c, s)| c >= s)
        {
            return None;
        }
        let position = coordinate
            .iter()
            .zip(self.shape.iter())
            .fold(0, |acc, (c, s)| acc * s + c);
        self.spaces.get(position)
    }

    /// Selects sub-grids along the first axis of the grid.
    ///
    /// # Errors
    ///
    /// Errors if a position exceeds the extent of the first axis.
    pub fn take(&self, positions: &[usize]) -> Result<Self, StateSpaceError> {
        let first = self.shape.first().copied().unwrap_or(0);
        let block = self.shape.iter().skip(1).product::<usize>();
        let spaces = positions
            .iter()
            .map(|&position| {
                if position >= first {
                    Err(StateSpaceError::PositionOutOfRange {
                        position,
                        len: first,
                    })
                } else {
                    Ok(self.spaces[position * block..(position + 1) * block].to_vec())
                }
            })
            .collect::<Result<Vec<_>, _>>()?
            .concat();
        let shape = [positions.len()]
            .into_iter()
            .chain(self.shape.iter().skip(1).copied())
            .collect_vec();
        Self::new(self.basis, spaces, shape)
    }

    /// All distinct indices across the grid, in ascending order.
    pub fn indices(&self) -> &[usize] {
        self.indices.get_or_init(|| {
            self.spaces
                .iter()
                .flat_map(|space| space.indices().iter().copied())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
    }

    /// All distinct states across the grid as excitation tuples, row `k` matching entry `k` of
    /// [`Self::indices`].
    pub fn excitations(&self) -> &Array2<usize> {
        self.excitations
            .get_or_init(|| self.basis.unravel_state_inds(self.indices()))
    }

    /// The permutation sorting [`Self::indices`], which are kept sorted already.
    pub fn indexer(&self) -> Vec<usize> {
        (0..self.len()).collect()
    }

    /// Locates indices within the union of the grid.
    ///
    /// Present indices map to their position within [`Self::indices`]; absent ones to their
    /// insertion point.
    pub fn find(&self, to_search: &[usize]) -> Vec<usize> {
        let indices = self.indices();
        to_search
            .iter()
            .map(|target| match indices.binary_search(target) {
                Ok(pos) | Err(pos) => pos,
            })
            .collect()
    }

    /// Takes the union of every space's full pairwise index set.
    ///
    /// Selection rules were already consumed in building the grid, so no filtering happens here.
    ///
    /// # Errors
    ///
    /// Errors if a frequency threshold is given, which is not supported.
    pub fn get_representation_indices(
        &self,
        freq_threshold: Option<f64>,
    ) -> Result<IndexPairs, StateSpaceError> {
        if freq_threshold.is_some() {
            return Err(StateSpaceError::Unimplemented(
                "frequency-threshold filtering of representation indices".to_string(),
            ));
        }
        let per_space = self
            .spaces
            .par_iter()
            .map(|space| space.get_representation_indices(None, None, None))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(per_space
            .iter()
            .flat_map(|pairs| pairs.iter())
            .collect())
    }

    /// Collapses the grid into a single space holding the union of its indices.
    pub fn to_single(&self) -> BasisStateSpace<'b, B> {
        BasisStateSpace::from_checked_indices(self.basis, self.indices().to_vec())
    }
}

impl<'b, B: RepresentationBasis> Clone for BasisMultiStateSpace<'b, B> {
    fn clone(&self) -> Self {
        Self {
            basis: self.basis,
            spaces: self.spaces.clone(),
            shape: self.shape.clone(),
            indices: self.indices.clone(),
            excitations: self.excitations.clone(),
        }
    }
}

impl<'b, B: RepresentationBasis> fmt::Debug for BasisMultiStateSpace<'b, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasisMultiStateSpace")
            .field("basis", self.basis)
            .field("shape", &self.shape)
            .field("spaces", &self.spaces)
            .finish()
    }
}

impl<'b, B: RepresentationBasis> fmt::Display for BasisMultiStateSpace<'b, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BasisMultiStateSpace(nstates={}, shape=({}), basis={})",
            self.len(),
            self.shape.iter().map(|s| s.to_string()).join(", "),
            self.basis
        )
    }
}

impl<'a, 'b, B: RepresentationBasis> IntoIterator for &'a BasisMultiStateSpace<'b, B> {
    type Item = &'a BasisStateSpace<'b, B>;
    type IntoIter = std::slice::Iter<'a, BasisStateSpace<'b, B>>;

    fn into_iter(self) -> Self::IntoIter {
        self.spaces.iter()
    }
}
