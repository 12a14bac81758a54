use std::collections::BTreeSet;

use itertools::Itertools;
use ndarray::{array, Array2};
use proptest::prelude::*;

use crate::basis::SimpleProductBasis;
use crate::error::StateSpaceError;
use crate::state_space::selection_rules::generate_selection_rule_permutations;
use crate::state_space::{BasisStateSpace, DeltaStorage, SelectionRule, SelectionRuleStateSpace};

fn rules(raw: &[&[i64]]) -> Vec<SelectionRule> {
    raw.iter().map(|&r| SelectionRule::from(r)).collect()
}

fn child_excitations(
    sel_space: &SelectionRuleStateSpace<'_, SimpleProductBasis>,
    i: usize,
) -> Array2<usize> {
    sel_space.get(i).unwrap().excitations().clone()
}

#[test]
fn test_selection_rule_properties() {
    let rule = SelectionRule::from([1, -1]);
    assert_eq!(rule.arity(), 2);
    assert_eq!(rule.deltas(), &[1, -1]);
    assert_eq!(rule.total_change(), 2);
    assert!(!rule.is_identity());
    assert!(SelectionRule::identity().is_identity());
    assert_eq!(rule.to_string(), "[+1, -1]");

    let parsed: SelectionRule = serde_yaml::from_str("[1, -1]").unwrap();
    assert_eq!(parsed, rule);
    let storage: DeltaStorage = serde_yaml::from_str("Sparse").unwrap();
    assert_eq!(storage, DeltaStorage::Sparse);
}

#[test]
fn test_selection_rule_permutations_single_mode_rules() {
    let perms = generate_selection_rule_permutations(3, &rules(&[&[1]]));
    assert_eq!(perms, array![[1, 0, 0], [0, 1, 0], [0, 0, 1]]);
}

#[test]
fn test_selection_rule_permutations_collisions_leave_zero_rows() {
    let perms = generate_selection_rule_permutations(3, &rules(&[&[1, -1]]));
    assert_eq!(
        perms,
        array![
            [0, 0, 0],
            [1, -1, 0],
            [1, 0, -1],
            [-1, 1, 0],
            [0, 0, 0],
            [0, 1, -1],
            [-1, 0, 1],
            [0, -1, 1],
            [0, 0, 0]
        ]
    );
}

#[test]
fn test_selection_rule_collisions_couple_state_to_itself() {
    let basis = SimpleProductBasis::uniform(2, 3).unwrap();
    let space = BasisStateSpace::from_excitations(&basis, array![[1, 1]]).unwrap();
    let sel_space = space
        .apply_selection_rules(&rules(&[&[1, -1]]), None, 1)
        .unwrap();
    assert_eq!(
        child_excitations(&sel_space, 0),
        array![[0, 2], [1, 1], [2, 0]]
    );
    assert_eq!(
        sel_space
            .get_representation_indices(None)
            .unwrap()
            .iter()
            .collect_vec(),
        vec![(4, 2), (4, 4), (4, 6)]
    );

    // A rule touching more modes than exist can only act as the identity.
    let single = SimpleProductBasis::uniform(1, 3).unwrap();
    let space = BasisStateSpace::from_excitations(&single, array![[1]]).unwrap();
    let sel_space = space
        .apply_selection_rules(&rules(&[&[1, -1]]), None, 1)
        .unwrap();
    assert_eq!(child_excitations(&sel_space, 0), array![[1]]);
}

#[test]
fn test_selection_rule_permutations_grouped_by_arity() {
    let perms = generate_selection_rule_permutations(2, &rules(&[&[1], &[], &[-1], &[2, 0]]));
    assert_eq!(
        perms,
        array![
            [1, 0],
            [-1, 0],
            [0, 1],
            [0, -1],
            [0, 0],
            [0, 0],
            [2, 0],
            [0, 2],
            [0, 0]
        ]
    );

    let perms = generate_selection_rule_permutations(2, &rules(&[&[1, 1, 1]]));
    assert_eq!(perms, Array2::<i64>::zeros((8, 2)));
}

#[test]
fn test_selection_rule_single_mode_reachability() {
    let basis = SimpleProductBasis::uniform(1, 5).unwrap();
    let space = BasisStateSpace::from_excitations(&basis, array![[2]]).unwrap();

    let raising = space.apply_selection_rules(&rules(&[&[1]]), None, 1).unwrap();
    assert_eq!(raising.nstates(), 1);
    assert_eq!(child_excitations(&raising, 0), array![[3]]);

    let both = space
        .apply_selection_rules(&rules(&[&[1], &[-1]]), None, 1)
        .unwrap();
    assert_eq!(child_excitations(&both, 0), array![[1], [3]]);
}

#[test]
fn test_selection_rule_drops_invalid_states() {
    let basis = SimpleProductBasis::uniform(1, 5).unwrap();

    let ground = BasisStateSpace::from_excitations(&basis, array![[0]]).unwrap();
    let lowered = ground
        .apply_selection_rules(&rules(&[&[-1]]), None, 1)
        .unwrap();
    assert_eq!(lowered.nstates(), 1);
    assert!(lowered.get(0).unwrap().is_empty());

    let top = BasisStateSpace::from_excitations(&basis, array![[4]]).unwrap();
    let raised = top.apply_selection_rules(&rules(&[&[1]]), None, 1).unwrap();
    assert!(raised.get(0).unwrap().is_empty());
    assert!(raised.is_empty());
}

#[test]
fn test_selection_rule_filter_space() {
    let basis = SimpleProductBasis::uniform(2, 4).unwrap();
    let space = BasisStateSpace::from_excitations(&basis, array![[1, 1]]).unwrap();
    let filter =
        BasisStateSpace::from_excitations(&basis, array![[0, 1], [2, 1], [2, 0], [3, 3]]).unwrap();
    let sel_space = space
        .apply_selection_rules(&rules(&[&[1], &[-1], &[1, -1]]), Some(&filter), 1)
        .unwrap();
    assert_eq!(sel_space.get(0).unwrap().indices(), &[1, 8, 9]);
    assert!(sel_space.indices().iter().all(|&i| filter.contains(i)));

    let other_basis = SimpleProductBasis::uniform(3, 4).unwrap();
    let other = BasisStateSpace::from_indices(&other_basis, vec![0]).unwrap();
    assert_eq!(
        space
            .apply_selection_rules(&rules(&[&[1]]), Some(&other), 1)
            .unwrap_err(),
        StateSpaceError::DimensionMismatch {
            expected: 2,
            found: 3
        }
    );

    let wider_basis = SimpleProductBasis::uniform(2, 5).unwrap();
    let wider = BasisStateSpace::from_indices(&wider_basis, vec![0, 1]).unwrap();
    assert!(matches!(
        space.apply_selection_rules(&rules(&[&[1]]), Some(&wider), 1),
        Err(StateSpaceError::BasisMismatch { .. })
    ));
}

#[test]
fn test_selection_rule_coupling_pairs() {
    let basis = SimpleProductBasis::uniform(1, 3).unwrap();
    let space = BasisStateSpace::from_excitations(&basis, array![[0], [1]]).unwrap();
    let sel_space = space.apply_selection_rules(&rules(&[&[1]]), None, 1).unwrap();
    let pairs = sel_space.get_representation_indices(None).unwrap();
    assert_eq!(pairs.iter().collect_vec(), vec![(0, 1), (1, 2)]);
    assert!(matches!(
        sel_space.get_representation_indices(Some(1.0)),
        Err(StateSpaceError::Unimplemented(_))
    ));
}

#[test]
fn test_selection_rule_identity() {
    let basis = SimpleProductBasis::uniform(1, 3).unwrap();
    let space = BasisStateSpace::from_excitations(&basis, array![[0], [2]]).unwrap();

    let same = space
        .apply_selection_rules(&[SelectionRule::identity()], None, 1)
        .unwrap();
    assert_eq!(child_excitations(&same, 0), array![[0]]);
    assert_eq!(child_excitations(&same, 1), array![[2]]);

    let with_raise = space
        .apply_selection_rules(&rules(&[&[], &[1]]), None, 1)
        .unwrap();
    assert_eq!(child_excitations(&with_raise, 0), array![[0], [1]]);
    assert_eq!(child_excitations(&with_raise, 1), array![[2]]);
}

#[test]
fn test_selection_rule_iterations() {
    let basis = SimpleProductBasis::uniform(1, 5).unwrap();
    let ground = BasisStateSpace::from_excitations(&basis, array![[0]]).unwrap();

    let twice = ground.apply_selection_rules(&rules(&[&[1]]), None, 2).unwrap();
    assert_eq!(twice.base_space().indices(), &[1]);
    assert_eq!(child_excitations(&twice, 0), array![[2]]);
    assert_eq!(
        twice
            .get_representation_indices(None)
            .unwrap()
            .iter()
            .collect_vec(),
        vec![(1, 2)]
    );

    let none = ground.apply_selection_rules(&rules(&[&[1]]), None, 0).unwrap();
    assert_eq!(child_excitations(&none, 0), array![[0]]);

    let first = BasisStateSpace::from_excitations(&basis, array![[1]]).unwrap();
    let up_down = first
        .apply_selection_rules(&rules(&[&[1], &[-1]]), None, 2)
        .unwrap();
    assert_eq!(up_down.base_space().indices(), &[0, 2]);
    assert_eq!(up_down.nstates(), 2);
    assert_eq!(child_excitations(&up_down, 0), array![[1]]);
    assert_eq!(child_excitations(&up_down, 1), array![[1], [3]]);

    // Every pair of every pass is a single rule application.
    let three = ground
        .apply_selection_rules(&rules(&[&[1], &[-1]]), None, 3)
        .unwrap();
    assert_eq!(three.base_space().indices(), &[0, 2]);
    let pairs = three.get_representation_indices(None).unwrap();
    assert_eq!(pairs.iter().collect_vec(), vec![(0, 1), (2, 1), (2, 3)]);
    assert!(pairs.iter().all(|(i, j)| i.abs_diff(j) == 1));
}

#[test]
fn test_selection_rule_delta_storage() {
    assert_eq!(
        DeltaStorage::Auto.resolve(8, &rules(&[&[1], &[1, -1]])),
        DeltaStorage::Sparse
    );
    assert_eq!(
        DeltaStorage::Auto.resolve(3, &rules(&[&[1]])),
        DeltaStorage::Dense
    );
    assert_eq!(
        DeltaStorage::Auto.resolve(8, &rules(&[&[1, 1, 1, 1]])),
        DeltaStorage::Dense
    );
    assert_eq!(
        DeltaStorage::Dense.resolve(8, &rules(&[&[1]])),
        DeltaStorage::Dense
    );

    let basis = SimpleProductBasis::uniform(8, 3).unwrap();
    let space = BasisStateSpace::from_indices(&basis, vec![0, 1, 100, 4000]).unwrap();
    let sel_rules = rules(&[&[1], &[-1], &[1, -1], &[2, 1]]);
    let dense = SelectionRuleStateSpace::from_rules_with_storage(
        &space,
        &sel_rules,
        None,
        1,
        DeltaStorage::Dense,
    )
    .unwrap();
    let sparse = SelectionRuleStateSpace::from_rules_with_storage(
        &space,
        &sel_rules,
        None,
        1,
        DeltaStorage::Sparse,
    )
    .unwrap();
    assert_eq!(dense.nstates(), sparse.nstates());
    for (d, s) in dense.iter().zip(sparse.iter()) {
        assert_eq!(d.indices(), s.indices());
    }
}

#[test]
fn test_selection_rule_filter_representation_inds() {
    let basis = SimpleProductBasis::uniform(2, 3).unwrap();
    let space = BasisStateSpace::from_excitations(&basis, array![[0, 0]]).unwrap();
    let sel_space = space
        .apply_selection_rules(&rules(&[&[1], &[2], &[1, 1]]), None, 1)
        .unwrap();
    let pairs = sel_space.get_representation_indices(None).unwrap();
    assert_eq!(
        pairs.iter().collect_vec(),
        vec![(0, 0), (0, 1), (0, 2), (0, 3), (0, 4), (0, 6)]
    );

    let diagonal = sel_space.filter_representation_inds(&pairs, &[0]).unwrap();
    assert_eq!(diagonal.iter().collect_vec(), vec![(0, 0)]);
    let single = sel_space.filter_representation_inds(&pairs, &[1]).unwrap();
    assert_eq!(single.iter().collect_vec(), vec![(0, 1), (0, 3)]);
    let double = sel_space.filter_representation_inds(&pairs, &[2]).unwrap();
    assert_eq!(double.iter().collect_vec(), vec![(0, 2), (0, 4), (0, 6)]);
    assert!(sel_space
        .filter_representation_inds(&pairs, &[3])
        .unwrap()
        .is_empty());
}

#[test]
fn test_selection_rule_take() {
    let basis = SimpleProductBasis::uniform(1, 4).unwrap();
    let space = BasisStateSpace::from_excitations(&basis, array![[0], [1], [2]]).unwrap();
    let sel_space = space.apply_selection_rules(&rules(&[&[1]]), None, 1).unwrap();
    let sub = sel_space.take(&[2, 0, 2]).unwrap();
    assert_eq!(sub.base_space().indices(), &[2, 0]);
    assert_eq!(sub.nstates(), 2);
    assert_eq!(
        sub.get_representation_indices(None)
            .unwrap()
            .iter()
            .collect_vec(),
        vec![(0, 1), (2, 3)]
    );
    assert_eq!(sub.selection_rules(), sel_space.selection_rules());
    assert!(matches!(
        sel_space.take(&[3]),
        Err(StateSpaceError::PositionOutOfRange { position: 3, .. })
    ));
}

#[test]
fn test_selection_rule_state_space_display() {
    let basis = SimpleProductBasis::uniform(1, 3).unwrap();
    let space = BasisStateSpace::from_excitations(&basis, array![[0], [1]]).unwrap();
    let sel_space = space.apply_selection_rules(&rules(&[&[1]]), None, 1).unwrap();
    assert_eq!(
        sel_space.to_string(),
        "SelectionRuleStateSpace(nstates=2, nbase=2, rules=[[+1]], basis=SimpleProductBasis(quanta=(3)))"
    );
}

proptest! {
    #[test]
    fn test_selection_rule_filter_containment(
        base in prop::collection::vec(0usize..64, 1..6),
        filter in prop::collection::vec(0usize..64, 0..24),
    ) {
        let basis = SimpleProductBasis::uniform(3, 4).unwrap();
        let space = BasisStateSpace::from_indices(&basis, base).unwrap();
        let filter_space = BasisStateSpace::from_indices(&basis, filter).unwrap();
        let sel_rules = rules(&[&[1], &[-1], &[1, -1], &[2]]);
        let sel_space = space.apply_selection_rules(&sel_rules, Some(&filter_space), 1).unwrap();
        let allowed = filter_space.indices().iter().copied().collect::<BTreeSet<_>>();
        prop_assert_eq!(sel_space.nstates(), space.len());
        for child in sel_space.iter() {
            prop_assert!(child.indices().iter().all(|i| allowed.contains(i)));
        }

        let unfiltered = space.apply_selection_rules(&sel_rules, None, 1).unwrap();
        for (bounded, free) in sel_space.iter().zip(unfiltered.iter()) {
            let free = free.indices().iter().copied().collect::<BTreeSet<_>>();
            let expected = free.intersection(&allowed).copied().collect_vec();
            prop_assert_eq!(bounded.indices().to_vec(), expected);
        }
    }
}
