//! Selection rules and the state spaces generated by applying them.
//!
//! A selection rule is a short vector of quantum-number changes, *e.g.* `[1, -1]`, meaning "add
//! `+1` to one mode and `-1` to another, distinct mode". Applying a set of rules to a base space
//! generates, for every base state, every state reachable by placing any one rule onto any
//! choice of distinct modes. The result keeps one child space per base state, which is what lets
//! coupling pairs be extracted without forming the full product of the base space with itself.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;

use indexmap::IndexMap;
use itertools::Itertools;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::basis::RepresentationBasis;
use crate::error::StateSpaceError;
use crate::state_space::{BasisMultiStateSpace, BasisStateSpace, IndexPairs};

#[cfg(test)]
#[path = "selection_rules_tests.rs"]
mod selection_rules_tests;

// =============
// SelectionRule
// =============

/// A class of allowed transitions, given as the quantum-number change applied to each of the
/// modes it touches.
///
/// The rule does not say which modes it touches: every assignment of its entries to distinct
/// modes is allowed. The empty rule is the identity transition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionRule(Vec<i64>);

impl SelectionRule {
    pub fn new(deltas: &[i64]) -> Self {
        Self(deltas.to_vec())
    }

    /// The identity rule, which leaves every state unchanged.
    pub fn identity() -> Self {
        Self(vec![])
    }

    /// The per-mode changes.
    pub fn deltas(&self) -> &[i64] {
        &self.0
    }

    /// The number of modes the rule touches simultaneously.
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn is_identity(&self) -> bool {
        self.0.is_empty()
    }

    /// The total number of quanta changed by the rule.
    pub fn total_change(&self) -> usize {
        self.0.iter().map(|d| d.unsigned_abs() as usize).sum()
    }
}

impl From<Vec<i64>> for SelectionRule {
    fn from(deltas: Vec<i64>) -> Self {
        Self(deltas)
    }
}

impl From<&[i64]> for SelectionRule {
    fn from(deltas: &[i64]) -> Self {
        Self::new(deltas)
    }
}

impl<const N: usize> From<[i64; N]> for SelectionRule {
    fn from(deltas: [i64; N]) -> Self {
        Self(deltas.to_vec())
    }
}

impl fmt::Display for SelectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]",
            self.0.iter().map(|d| format!("{d:+}")).join(", ")
        )
    }
}

// ============
// Permutations
// ============

/// An enumerated type for the storage of the per-mode deltas generated from selection rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaStorage {
    /// Chooses sparse storage when there are more than six modes and every rule leaves the
    /// majority of modes untouched, and dense storage otherwise.
    #[default]
    Auto,

    /// One full-length delta vector per permutation.
    Dense,

    /// Only the touched modes of each permutation.
    Sparse,
}

impl DeltaStorage {
    fn resolve(self, ndim: usize, rules: &[SelectionRule]) -> Self {
        match self {
            DeltaStorage::Auto => {
                let max_arity = rules.iter().map(SelectionRule::arity).max().unwrap_or(0);
                if ndim > 6 && max_arity < ndim / 2 {
                    DeltaStorage::Sparse
                } else {
                    DeltaStorage::Dense
                }
            }
            storage => storage,
        }
    }
}

impl fmt::Display for DeltaStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaStorage::Auto => write!(f, "auto"),
            DeltaStorage::Dense => write!(f, "dense"),
            DeltaStorage::Sparse => write!(f, "sparse"),
        }
    }
}

/// Places every rule onto every ordered choice of modes.
///
/// Rules are grouped by arity, groups being visited in order of first appearance. Within a group,
/// the placements of `k` modes are enumerated in lexicographic order over all `ndim^k` mode
/// tuples, and every tuple emits one permutation per rule of the group. A tuple that reuses a
/// mode emits empty (identity) permutations in its slot, as does an arity-0 rule.
///
/// # Returns
///
/// One entry per permutation, listing the `(mode, delta)` pairs it touches.
fn rule_placements(ndim: usize, selection_rules: &[SelectionRule]) -> Vec<Vec<(usize, i64)>> {
    let mut groups: IndexMap<usize, Vec<&SelectionRule>> = IndexMap::new();
    for rule in selection_rules {
        groups.entry(rule.arity()).or_default().push(rule);
    }
    let n_permutations = groups
        .iter()
        .map(|(&k, group)| {
            u32::try_from(k)
                .ok()
                .and_then(|k| ndim.checked_pow(k))
                .and_then(|n| n.checked_mul(group.len()))
                .unwrap_or(usize::MAX)
        })
        .fold(0usize, usize::saturating_add);
    log::debug!(
        "Placing {} selection rules in {} arity groups onto {ndim} modes ({n_permutations} permutations)...",
        selection_rules.len(),
        groups.len()
    );

    let mut placements = Vec::new();
    for (&k, group) in groups.iter() {
        if k == 0 {
            placements.extend(group.iter().map(|_| Vec::new()));
            continue;
        }
        for modes in itertools::repeat_n(0..ndim, k).multi_cartesian_product() {
            if !modes.iter().all_unique() {
                placements.extend(group.iter().map(|_| Vec::new()));
                continue;
            }
            for rule in group {
                placements.push(
                    modes
                        .iter()
                        .copied()
                        .zip(rule.deltas().iter().copied())
                        .collect(),
                );
            }
        }
    }
    log::debug!(
        "Placing {} selection rules in {} arity groups onto {ndim} modes... Done.",
        selection_rules.len(),
        groups.len()
    );
    placements
}

/// Generates the full-length delta vector of every placement of every selection rule.
///
/// # Arguments
///
/// * `ndim` - The number of modes.
/// * `selection_rules` - The rules to place.
///
/// # Returns
///
/// An array of shape `[n_permutations, ndim]`, zero except at the modes each permutation
/// touches. `n_permutations` is the sum over arities `k` of the number of rules of arity `k` times
/// `ndim^k`; placements that reuse a mode are left as all-zero rows.
pub fn generate_selection_rule_permutations(
    ndim: usize,
    selection_rules: &[SelectionRule],
) -> Array2<i64> {
    DenseDeltas::new(ndim, rule_placements(ndim, selection_rules)).deltas
}

/// Behaviour of a set of per-mode deltas that can be added onto states.
trait DeltaApplication: Sync {
    /// The number of deltas held.
    fn n_deltas(&self) -> usize;

    /// Writes `origin` plus delta `i` into `out`.
    fn apply(&self, i: usize, origin: &[usize], out: &mut [i64]);
}

/// Deltas stored as full-length vectors.
struct DenseDeltas {
    deltas: Array2<i64>,
}

impl DenseDeltas {
    fn new(ndim: usize, placements: Vec<Vec<(usize, i64)>>) -> Self {
        let mut deltas = Array2::<i64>::zeros((placements.len(), ndim));
        for (mut row, placement) in deltas.rows_mut().into_iter().zip(placements) {
            for (mode, delta) in placement {
                row[mode] = delta;
            }
        }
        Self { deltas }
    }
}

impl DeltaApplication for DenseDeltas {
    fn n_deltas(&self) -> usize {
        self.deltas.nrows()
    }

    fn apply(&self, i: usize, origin: &[usize], out: &mut [i64]) {
        for ((o, &n), &d) in out.iter_mut().zip(origin).zip(self.deltas.row(i)) {
            *o = n as i64 + d;
        }
    }
}

/// Deltas stored as the touched modes only.
struct SparseDeltas {
    deltas: Vec<Vec<(usize, i64)>>,
}

impl DeltaApplication for SparseDeltas {
    fn n_deltas(&self) -> usize {
        self.deltas.len()
    }

    fn apply(&self, i: usize, origin: &[usize], out: &mut [i64]) {
        for (o, &n) in out.iter_mut().zip(origin) {
            *o = n as i64;
        }
        for &(mode, delta) in &self.deltas[i] {
            out[mode] += delta;
        }
    }
}

// =========
// Expansion
// =========

/// Bounds a generated state must satisfy to be kept.
struct ExpansionBounds<'a, 'b, B: RepresentationBasis> {
    basis: &'b B,
    filter: Option<FilterBounds<'a, 'b, B>>,
}

/// The cheap scalar bounds and the exact membership test of a filter space.
struct FilterBounds<'a, 'b, B: RepresentationBasis> {
    space: &'a BasisStateSpace<'b, B>,
    min: i64,
    max: i64,
}

impl<'a, 'b, B: RepresentationBasis> ExpansionBounds<'a, 'b, B> {
    fn new(basis: &'b B, filter_space: Option<&'a BasisStateSpace<'b, B>>) -> Self {
        let filter = filter_space.map(|space| {
            let excitations = space.excitations();
            FilterBounds {
                space,
                min: excitations.iter().min().map_or(0, |&n| n as i64),
                max: excitations.iter().max().map_or(-1, |&n| n as i64),
            }
        });
        Self { basis, filter }
    }

    /// Applies every delta to every origin and keeps the admissible candidates.
    ///
    /// Candidates with a quantum number below the lower bound (zero, or the smallest quantum
    /// number of the filter space) or outside the basis are dropped, as are candidates with a
    /// quantum number above the largest of the filter space. Survivors are deduplicated; when a
    /// filter space is present they are converted to indices and kept only if the filter space
    /// contains them.
    fn expand<D: DeltaApplication>(
        &self,
        origins: ArrayView2<usize>,
        deltas: &D,
    ) -> BasisStateSpace<'b, B> {
        let ndim = self.basis.ndim();
        let lower = self.filter.as_ref().map_or(0, |filter| filter.min);
        let mut candidate = vec![0i64; ndim];
        let mut kept = BTreeSet::<Vec<usize>>::new();
        for origin in origins.rows() {
            let origin = origin.to_vec();
            for i in 0..deltas.n_deltas() {
                deltas.apply(i, &origin, &mut candidate);
                if candidate.iter().any(|&n| n < lower) {
                    continue;
                }
                if let Some(filter) = self.filter.as_ref() {
                    if candidate.iter().any(|&n| n > filter.max) {
                        continue;
                    }
                }
                let state = candidate.iter().map(|&n| n as usize).collect_vec();
                if self.basis.contains_excitation(&state) {
                    kept.insert(state);
                }
            }
        }

        let n = kept.len();
        let excitations = Array2::from_shape_vec((n, ndim), kept.into_iter().flatten().collect())
            .unwrap_or_else(|_| panic!("Unable to reshape {n} generated states into an array."));
        match self.filter.as_ref() {
            None => BasisStateSpace::from_checked_excitations(self.basis, excitations),
            Some(filter) => {
                let inds = self
                    .basis
                    .ravel_state_inds(excitations.view())
                    .into_iter()
                    .filter(|&index| filter.space.contains(index))
                    .sorted()
                    .collect_vec();
                BasisStateSpace::from_checked_indices(self.basis, inds)
            }
        }
    }

    /// Expands each base state into its own child space.
    fn expand_each<D: DeltaApplication>(
        &self,
        base_space: &BasisStateSpace<'b, B>,
        deltas: &D,
    ) -> Vec<BasisStateSpace<'b, B>> {
        let base_excitations = base_space.excitations();
        (0..base_excitations.nrows())
            .into_par_iter()
            .map(|i| {
                let origin = base_excitations.slice(ndarray::s![i..i + 1, ..]);
                self.expand(origin, deltas)
            })
            .collect()
    }

    /// Applies the deltas `iterations` times. Every pass after the first takes the union of the
    /// previous pass's children as its base space.
    ///
    /// # Returns
    ///
    /// The base space of the last pass and its child spaces. Zero iterations make every base
    /// state its own only child.
    fn expand_all<D: DeltaApplication>(
        &self,
        base_space: &BasisStateSpace<'b, B>,
        deltas: &D,
        iterations: usize,
    ) -> Result<(BasisStateSpace<'b, B>, Vec<BasisStateSpace<'b, B>>), StateSpaceError> {
        if iterations == 0 {
            let children = base_space
                .indices()
                .iter()
                .map(|&index| BasisStateSpace::from_checked_indices(self.basis, vec![index]))
                .collect();
            return Ok((base_space.clone(), children));
        }
        let mut base = base_space.clone();
        let mut children = self.expand_each(&base, deltas);
        for pass in 1..iterations {
            log::debug!("Selection-rule pass {} of {iterations}...", pass + 1);
            let n = children.len();
            base = BasisMultiStateSpace::new(self.basis, children, vec![n])?.to_single();
            children = self.expand_each(&base, deltas);
        }
        Ok((base, children))
    }
}

// ========================
// SelectionRuleStateSpace
// ========================

/// A [`BasisMultiStateSpace`] generated by applying selection rules to a base space.
///
/// Child space `i` holds the states reachable from state `i` of the base space (in the order of
/// [`BasisStateSpace::indices`]). No state of one child is generated from any other base state,
/// so the coupling pairs are exactly the base index of each child paired with the child's own
/// indices.
pub struct SelectionRuleStateSpace<'b, B: RepresentationBasis> {
    spaces: BasisMultiStateSpace<'b, B>,
    base_space: BasisStateSpace<'b, B>,
    selection_rules: Vec<SelectionRule>,
}

impl<'b, B: RepresentationBasis> SelectionRuleStateSpace<'b, B> {
    /// Applies selection rules to a space, choosing the delta storage automatically.
    ///
    /// See [`Self::from_rules_with_storage`].
    pub fn from_rules(
        space: &BasisStateSpace<'b, B>,
        selection_rules: &[SelectionRule],
        filter_space: Option<&BasisStateSpace<'b, B>>,
        iterations: usize,
    ) -> Result<Self, StateSpaceError> {
        Self::from_rules_with_storage(
            space,
            selection_rules,
            filter_space,
            iterations,
            DeltaStorage::Auto,
        )
    }

    /// Applies selection rules to a space.
    ///
    /// # Arguments
    ///
    /// * `space` - The base space.
    /// * `selection_rules` - The allowed transitions.
    /// * `filter_space` - If given, every generated state must be a member of this space.
    /// * `iterations` - The number of times the rules are applied. Each pass after the first
    /// takes the union of the previous pass's children as its base space, so the returned base
    /// space is that of the last pass. Zero makes every base state its own only child.
    /// * `storage` - How the generated per-mode deltas are held.
    ///
    /// # Errors
    ///
    /// Errors if the filter space has a different number of modes from the base space.
    pub fn from_rules_with_storage(
        space: &BasisStateSpace<'b, B>,
        selection_rules: &[SelectionRule],
        filter_space: Option<&BasisStateSpace<'b, B>>,
        iterations: usize,
        storage: DeltaStorage,
    ) -> Result<Self, StateSpaceError> {
        let basis = space.basis();
        let ndim = space.ndim();
        if let Some(filter) = filter_space {
            if filter.ndim() != ndim {
                return Err(StateSpaceError::DimensionMismatch {
                    expected: ndim,
                    found: filter.ndim(),
                });
            }
            if filter.basis() != basis {
                return Err(StateSpaceError::BasisMismatch {
                    expected: basis.to_string(),
                    found: filter.basis().to_string(),
                });
            }
        }

        let storage = storage.resolve(ndim, selection_rules);
        log::debug!(
            "Applying {} selection rules to {} base states ({iterations} iterations, {storage} deltas)...",
            selection_rules.len(),
            space.len()
        );
        let placements = rule_placements(ndim, selection_rules);
        let bounds = ExpansionBounds::new(basis, filter_space);
        let (base_space, children) = match storage {
            DeltaStorage::Sparse => {
                let deltas = SparseDeltas { deltas: placements };
                bounds.expand_all(space, &deltas, iterations)?
            }
            DeltaStorage::Dense | DeltaStorage::Auto => {
                let deltas = DenseDeltas::new(ndim, placements);
                bounds.expand_all(space, &deltas, iterations)?
            }
        };
        log::debug!(
            "Applying {} selection rules to {} base states ({iterations} iterations, {storage} deltas)... Done.",
            selection_rules.len(),
            space.len()
        );

        let shape = vec![children.len()];
        Ok(Self {
            spaces: BasisMultiStateSpace::new(basis, children, shape)?,
            base_space,
            selection_rules: selection_rules.to_vec(),
        })
    }

    /// The space the last selection-rule pass was applied to.
    pub fn base_space(&self) -> &BasisStateSpace<'b, B> {
        &self.base_space
    }

    /// The rules that generated the child spaces.
    pub fn selection_rules(&self) -> &[SelectionRule] {
        &self.selection_rules
    }

    /// The child spaces as a plain multi-state space.
    pub fn as_multi_space(&self) -> &BasisMultiStateSpace<'b, B> {
        &self.spaces
    }

    /// Pairs every base index with the indices of its own child space.
    ///
    /// # Returns
    ///
    /// The deduplicated `(base, child)` index pairs.
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
                "frequency-threshold filtering of selection-rule couplings".to_string(),
            ));
        }
        log::debug!("Extracting couplings from {} child spaces...", self.spaces.nstates());
        let pairs = self
            .base_space
            .indices()
            .iter()
            .zip(self.spaces.iter())
            .flat_map(|(&i, child)| child.indices().iter().map(move |&j| (i, j)))
            .collect::<IndexPairs>();
        log::debug!("Extracting couplings from {} child spaces... Done.", self.spaces.nstates());
        Ok(pairs)
    }

    /// Keeps the index pairs whose total quantum-number change is one of the given values.
    ///
    /// # Arguments
    ///
    /// * `ind_pairs` - The pairs to filter.
    /// * `q_changes` - The allowed values of the summed absolute per-mode change between the two
    /// states of a pair.
    ///
    /// # Errors
    ///
    /// Errors if an index lies outside the basis.
    pub fn filter_representation_inds(
        &self,
        ind_pairs: &IndexPairs,
        q_changes: &[usize],
    ) -> Result<IndexPairs, StateSpaceError> {
        let basis = self.base_space.basis();
        basis.check_indices(ind_pairs.rows())?;
        basis.check_indices(ind_pairs.cols())?;
        let e1 = basis.unravel_state_inds(ind_pairs.rows());
        let e2 = basis.unravel_state_inds(ind_pairs.cols());
        Ok(ind_pairs
            .iter()
            .zip(e1.rows().into_iter().zip(e2.rows()))
            .filter(|(_, (r1, r2))| {
                let diff = r1
                    .iter()
                    .zip(r2.iter())
                    .map(|(&a, &b)| a.abs_diff(b))
                    .sum::<usize>();
                q_changes.contains(&diff)
            })
            .map(|(pair, _)| pair)
            .collect())
    }

    /// Selects base states and their child spaces by position, keeping the correspondence.
    ///
    /// # Errors
    ///
    /// Errors if a position is out of range.
    pub fn take(&self, positions: &[usize]) -> Result<Self, StateSpaceError> {
        let positions = positions.iter().copied().unique().collect_vec();
        Ok(Self {
            spaces: self.spaces.take(&positions)?,
            base_space: self.base_space.take_subspace(&positions)?,
            selection_rules: self.selection_rules.clone(),
        })
    }
}

impl<'b, B: RepresentationBasis> Deref for SelectionRuleStateSpace<'b, B> {
    type Target = BasisMultiStateSpace<'b, B>;

    fn deref(&self) -> &Self::Target {
        &self.spaces
    }
}

impl<'b, B: RepresentationBasis> Clone for SelectionRuleStateSpace<'b, B> {
    fn clone(&self) -> Self {
        Self {
            spaces: self.spaces.clone(),
            base_space: self.base_space.clone(),
            selection_rules: self.selection_rules.clone(),
        }
    }
}

impl<'b, B: RepresentationBasis> fmt::Debug for SelectionRuleStateSpace<'b, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionRuleStateSpace")
            .field("base_space", &self.base_space)
            .field("selection_rules", &self.selection_rules)
            .field("spaces", &self.spaces)
            .finish()
    }
}

impl<'b, B: RepresentationBasis> fmt::Display for SelectionRuleStateSpace<'b, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SelectionRuleStateSpace(nstates={}, nbase={}, rules=[{}], basis={})",
            self.spaces.len(),
            self.base_space.len(),
            self.selection_rules.iter().map(|r| r.to_string()).join(", "),
            self.spaces.basis()
        )
    }
}
