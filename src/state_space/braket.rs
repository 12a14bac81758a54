//! Paired bra/ket states and the per-pair queries used to skip vanishing matrix elements.

use std::fmt;
use std::sync::OnceLock;

use itertools::Itertools;
use ndarray::{Array2, Axis};

use crate::basis::RepresentationBasis;
use crate::error::StateSpaceError;
use crate::state_space::BasisStateSpace;

#[cfg(test)]
#[path = "braket_tests.rs"]
mod braket_tests;

/// A selection of bra/ket pairs.
#[derive(Clone, Copy, Debug)]
pub enum PairSelection<'a> {
    /// One flag per pair; pairs flagged `true` are kept.
    Mask(&'a [bool]),

    /// Positions of the pairs to keep, in the order given.
    Positions(&'a [usize]),
}

/// Two equal-length sequences of states read position by position as `(bra, ket)` pairs.
///
/// This is a paired list, not a product: pair `i` is bra `i` with ket `i`. States are kept in the
/// order they were supplied, duplicates included, so that repeated bras or kets stay aligned with
/// their partners.
pub struct BraKetSpace<'b, B: RepresentationBasis> {
    basis: &'b B,

    /// Bra excitations, shape `[npairs, ndim]`.
    bras: Array2<usize>,

    /// Ket excitations, shape `[npairs, ndim]`.
    kets: Array2<usize>,

    /// Per-mode equality of bra and ket, shape `[ndim, npairs]`.
    orthogs: OnceLock<Array2<bool>>,
}

impl<'b, B: RepresentationBasis> BraKetSpace<'b, B> {
    /// Pairs the states of two spaces position by position.
    ///
    /// # Errors
    ///
    /// Errors if the spaces hold different numbers of states or belong to different bases.
    pub fn new(
        bra_space: &BasisStateSpace<'b, B>,
        ket_space: &BasisStateSpace<'b, B>,
    ) -> Result<Self, StateSpaceError> {
        if bra_space.ndim() != ket_space.ndim() {
            return Err(StateSpaceError::DimensionMismatch {
                expected: bra_space.ndim(),
                found: ket_space.ndim(),
            });
        }
        if bra_space.basis() != ket_space.basis() {
            return Err(StateSpaceError::BasisMismatch {
                expected: bra_space.basis().to_string(),
                found: ket_space.basis().to_string(),
            });
        }
        Self::from_checked(
            bra_space.basis(),
            bra_space.supplied_excitations(),
            ket_space.supplied_excitations(),
        )
    }

    /// Pairs bra and ket excitation tuples row by row.
    ///
    /// # Errors
    ///
    /// Errors if either array holds a state outside the basis or the two differ in length.
    pub fn from_excitations(
        basis: &'b B,
        bras: Array2<usize>,
        kets: Array2<usize>,
    ) -> Result<Self, StateSpaceError> {
        basis.check_excitations(bras.view())?;
        basis.check_excitations(kets.view())?;
        Self::from_checked(basis, bras, kets)
    }

    /// Pairs bra and ket indices position by position.
    ///
    /// # Errors
    ///
    /// Errors if either list holds an index outside the basis or the two differ in length.
    pub fn from_indices(
        basis: &'b B,
        bra_inds: &[usize],
        ket_inds: &[usize],
    ) -> Result<Self, StateSpaceError> {
        basis.check_indices(bra_inds)?;
        basis.check_indices(ket_inds)?;
        Self::from_checked(
            basis,
            basis.unravel_state_inds(bra_inds),
            basis.unravel_state_inds(ket_inds),
        )
    }

    fn from_checked(
        basis: &'b B,
        bras: Array2<usize>,
        kets: Array2<usize>,
    ) -> Result<Self, StateSpaceError> {
        if bras.nrows() != kets.nrows() {
            return Err(StateSpaceError::PairCountMismatch {
                bras: bras.nrows(),
                kets: kets.nrows(),
            });
        }
        Ok(Self {
            basis,
            bras,
            kets,
            orthogs: OnceLock::new(),
        })
    }

    pub fn basis(&self) -> &'b B {
        self.basis
    }

    pub fn ndim(&self) -> usize {
        self.basis.ndim()
    }

    /// The number of pairs.
    pub fn len(&self) -> usize {
        self.bras.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bra excitations, one pair per row.
    pub fn bras(&self) -> &Array2<usize> {
        &self.bras
    }

    /// The ket excitations, one pair per row.
    pub fn kets(&self) -> &Array2<usize> {
        &self.kets
    }

    /// The bra and ket quantum numbers arranged mode-major, each of shape `[ndim, npairs]`.
    pub fn state_pairs(&self) -> (Array2<usize>, Array2<usize>) {
        (
            self.bras.t().as_standard_layout().into_owned(),
            self.kets.t().as_standard_layout().into_owned(),
        )
    }

    /// The bras as a state space, in supplied order.
    pub fn bra_space(&self) -> BasisStateSpace<'b, B> {
        BasisStateSpace::from_checked_excitations(self.basis, self.bras.clone())
    }

    /// The kets as a state space, in supplied order.
    pub fn ket_space(&self) -> BasisStateSpace<'b, B> {
        BasisStateSpace::from_checked_excitations(self.basis, self.kets.clone())
    }

    /// The per-mode equality mask of shape `[ndim, npairs]`, computed once.
    pub fn orthogs(&self) -> &Array2<bool> {
        self.orthogs.get_or_init(|| {
            log::debug!("Comparing {} bra/ket pairs mode by mode...", self.len());
            let (bras, kets) = self.state_pairs();
            let orthogs = ndarray::Zip::from(&bras)
                .and(&kets)
                .map_collect(|b, k| b == k);
            log::debug!("Comparing {} bra/ket pairs mode by mode... Done.", self.len());
            orthogs
        })
    }

    /// Determines, for each selected pair, whether bra and ket agree in every mode.
    ///
    /// # Arguments
    ///
    /// * `positions` - The pairs to query. Unless `assume_unique` is set, they are deduplicated
    /// and sorted first.
    /// * `assume_unique` - Set when `positions` is already free of duplicates; its order is then
    /// kept as given.
    ///
    /// # Returns
    ///
    /// One flag per queried position: `true` if the pair is equal in all modes, so that any
    /// operator acting on no mode at all can couple it.
    ///
    /// # Errors
    ///
    /// Errors if a position is out of range.
    pub fn get_non_orthog(
        &self,
        positions: &[usize],
        assume_unique: bool,
    ) -> Result<Vec<bool>, StateSpaceError> {
        let positions = self.normalise_positions(positions, assume_unique)?;
        let orthogs = self.orthogs();
        Ok(positions
            .iter()
            .map(|&i| orthogs.column(i).iter().all(|&eq| eq))
            .collect())
    }

    /// Determines, for every pair, whether bra and ket agree in all of the given modes.
    ///
    /// This is the test a matrix-element evaluator applies when an operator acts on every mode
    /// except `modes`: those modes must be left unchanged for the element to be nonzero.
    ///
    /// # Errors
    ///
    /// Errors if a mode is out of range.
    pub fn get_non_orthog_in_modes(&self, modes: &[usize]) -> Result<Vec<bool>, StateSpaceError> {
        if let Some(&mode) = modes.iter().find(|&&mode| mode >= self.ndim()) {
            return Err(StateSpaceError::PositionOutOfRange {
                position: mode,
                len: self.ndim(),
            });
        }
        let orthogs = self.orthogs();
        let modes = modes.iter().copied().unique().collect_vec();
        Ok((0..self.len())
            .map(|i| modes.iter().all(|&j| orthogs[(j, i)]))
            .collect())
    }

    /// Tests every pair against per-mode lists of allowed quantum-number changes.
    ///
    /// # Arguments
    ///
    /// * `rules` - One list per mode of the permitted values of `ket - bra` in that mode.
    ///
    /// # Returns
    ///
    /// One flag per pair: `true` if the change in every mode is one of that mode's permitted
    /// values.
    ///
    /// # Errors
    ///
    /// Errors if the number of per-mode lists differs from the number of modes.
    pub fn get_sel_rule_filter(&self, rules: &[Vec<i64>]) -> Result<Vec<bool>, StateSpaceError> {
        if rules.len() != self.ndim() {
            return Err(StateSpaceError::PerModeRuleCount {
                expected: self.ndim(),
                found: rules.len(),
            });
        }
        Ok(self
            .bras
            .axis_iter(Axis(0))
            .zip(self.kets.axis_iter(Axis(0)))
            .map(|(bra, ket)| {
                bra.iter()
                    .zip(ket.iter())
                    .zip(rules.iter())
                    .all(|((&b, &k), allowed)| allowed.contains(&(k as i64 - b as i64)))
            })
            .collect())
    }

    /// Restricts the selected pairs to those equal in every mode.
    ///
    /// # Returns
    ///
    /// The surviving pairs, and the flags of [`Self::get_non_orthog`] over the (normalised)
    /// selected positions.
    pub fn apply_non_orthogonality(
        &self,
        positions: &[usize],
        assume_unique: bool,
    ) -> Result<(Self, Vec<bool>), StateSpaceError> {
        let positions = self.normalise_positions(positions, assume_unique)?;
        let non_orthog = self.get_non_orthog(&positions, true)?;
        let kept = positions
            .iter()
            .zip(non_orthog.iter())
            .filter_map(|(&i, &keep)| keep.then_some(i))
            .collect_vec();
        Ok((self.take_subspace(PairSelection::Positions(&kept))?, non_orthog))
    }

    /// Restricts the pairs to those passing [`Self::get_sel_rule_filter`].
    ///
    /// # Returns
    ///
    /// The surviving pairs, and the mask over all pairs.
    pub fn apply_sel_rules(&self, rules: &[Vec<i64>]) -> Result<(Self, Vec<bool>), StateSpaceError> {
        let sels = self.get_sel_rule_filter(rules)?;
        Ok((self.take_subspace(PairSelection::Mask(&sels))?, sels))
    }

    /// Builds a new bra-ket space over the selected pairs, keeping bras and kets aligned.
    ///
    /// # Errors
    ///
    /// Errors if a mask does not have one flag per pair or a position is out of range.
    pub fn take_subspace(&self, selection: PairSelection) -> Result<Self, StateSpaceError> {
        let positions = match selection {
            PairSelection::Mask(mask) => {
                if mask.len() != self.len() {
                    return Err(StateSpaceError::MaskLengthMismatch {
                        expected: self.len(),
                        found: mask.len(),
                    });
                }
                mask.iter().positions(|&keep| keep).collect_vec()
            }
            PairSelection::Positions(positions) => {
                self.check_positions(positions)?;
                positions.to_vec()
            }
        };
        Ok(Self {
            basis: self.basis,
            bras: self.bras.select(Axis(0), &positions),
            kets: self.kets.select(Axis(0), &positions),
            orthogs: OnceLock::new(),
        })
    }

    fn check_positions(&self, positions: &[usize]) -> Result<(), StateSpaceError> {
        match positions.iter().find(|&&i| i >= self.len()) {
            Some(&position) => Err(StateSpaceError::PositionOutOfRange {
                position,
                len: self.len(),
            }),
            None => Ok(()),
        }
    }

    fn normalise_positions(
        &self,
        positions: &[usize],
        assume_unique: bool,
    ) -> Result<Vec<usize>, StateSpaceError> {
        self.check_positions(positions)?;
        Ok(if assume_unique {
            positions.to_vec()
        } else {
            positions.iter().copied().sorted().dedup().collect()
        })
    }
}

impl<'b, B: RepresentationBasis> Clone for BraKetSpace<'b, B> {
    fn clone(&self) -> Self {
        Self {
            basis: self.basis,
            bras: self.bras.clone(),
            kets: self.kets.clone(),
            orthogs: self.orthogs.clone(),
        }
    }
}

impl<'b, B: RepresentationBasis> fmt::Debug for BraKetSpace<'b, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BraKetSpace")
            .field("basis", self.basis)
            .field("bras", &self.bras)
            .field("kets", &self.kets)
            .finish()
    }
}

impl<'b, B: RepresentationBasis> fmt::Display for BraKetSpace<'b, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BraKetSpace(npairs={}, basis={})",
            self.len(),
            self.basis
        )
    }
}
