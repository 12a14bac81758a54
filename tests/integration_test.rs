use itertools::Itertools;
use ndarray::array;

use vibspace::basis::{RepresentationBasis, SimpleProductBasis};
use vibspace::drivers::coupling_generation::{
    CouplingGenerationDriver, CouplingGenerationParams,
};
use vibspace::drivers::VibspaceDriver;
use vibspace::io::read_vibspace_yaml;
use vibspace::state_space::{BasisStateSpace, BraKetSpace, SelectionRule};

const ROOT: &str = env!("CARGO_MANIFEST_DIR");

fn read_params(name: &str) -> CouplingGenerationParams {
    let _ = env_logger::builder().is_test(true).try_init();
    read_vibspace_yaml(format!("{ROOT}/tests/input/{name}")).unwrap()
}

#[test]
fn test_integration_single_mode_raising() {
    let params = read_params("single_mode_raising.yml");
    let basis = SimpleProductBasis::uniform(1, 3).unwrap();
    let space = BasisStateSpace::from_excitations(&basis, array![[0], [1]]).unwrap();
    let mut cg_driver = CouplingGenerationDriver::builder()
        .parameters(&params)
        .space(&space)
        .build()
        .unwrap();
    cg_driver.run().unwrap();
    let cg_res = cg_driver.result().unwrap();
    assert_eq!(cg_res.pairs.rows(), &[0, 1]);
    assert_eq!(cg_res.pairs.cols(), &[1, 2]);
}

#[test]
fn test_integration_two_mode_quantum_changes() {
    let params = read_params("two_mode_quantum_changes.yml");
    assert!(params.write_pairs);
    let basis = SimpleProductBasis::uniform(2, 3).unwrap();
    let space = BasisStateSpace::from_excitations(&basis, array![[0, 0]]).unwrap();
    let mut cg_driver = CouplingGenerationDriver::builder()
        .parameters(&params)
        .space(&space)
        .build()
        .unwrap();
    cg_driver.run().unwrap();
    let cg_res = cg_driver.result().unwrap();
    assert_eq!(
        cg_res.pairs.iter().collect_vec(),
        vec![(0, 2), (0, 4), (0, 6)]
    );
}

#[test]
fn test_integration_iterated_up_down() {
    let params = read_params("iterated_up_down.yml");
    let basis = SimpleProductBasis::uniform(1, 5).unwrap();
    let space = BasisStateSpace::from_excitations(&basis, array![[1], [2]]).unwrap();
    let mut cg_driver = CouplingGenerationDriver::builder()
        .parameters(&params)
        .space(&space)
        .build()
        .unwrap();
    cg_driver.run().unwrap();
    let cg_res = cg_driver.result().unwrap();
    // The second pass starts from everything the first pass reached.
    assert_eq!(cg_res.n_base_states, 4);
    assert_eq!(
        cg_res.pairs.iter().collect_vec(),
        vec![(0, 1), (1, 0), (1, 2), (2, 1), (2, 3), (3, 2), (3, 4)]
    );
}

#[test]
fn test_integration_frequency_threshold_rejected() {
    let params = read_params("frequency_threshold.yml");
    let basis = SimpleProductBasis::uniform(1, 3).unwrap();
    let space = BasisStateSpace::from_excitations(&basis, array![[0]]).unwrap();
    let mut cg_driver = CouplingGenerationDriver::builder()
        .parameters(&params)
        .space(&space)
        .build()
        .unwrap();
    assert!(cg_driver.run().is_err());
}

#[test]
fn test_integration_three_mode_second_order_manifold() {
    let basis = SimpleProductBasis::uniform(3, 3).unwrap();
    let ground = BasisStateSpace::from_excitations(&basis, array![[0, 0, 0]]).unwrap();
    let rules = [vec![1], vec![-1], vec![1, -1]]
        .into_iter()
        .map(SelectionRule::from)
        .collect_vec();
    let sel_space = ground.apply_selection_rules(&rules, None, 2).unwrap();

    // Two passes from the ground state reach every state with at most two quanta in total.
    let reached = sel_space.excitations();
    assert_eq!(reached.nrows(), 10);
    assert!(reached.rows().into_iter().all(|row| row.sum() <= 2));

    // The second pass is applied to the ground state and the three singly excited states.
    let base = basis.ravel_state_inds(array![[0, 0, 0], [0, 0, 1], [0, 1, 0], [1, 0, 0]].view());
    assert_eq!(sel_space.base_space().indices(), base.as_slice());
    let pairs = sel_space.get_representation_indices(None).unwrap();
    assert_eq!(pairs.len(), 25);
    assert_eq!(pairs.rows().iter().copied().dedup().collect_vec(), base);

    // Matrix elements of an operator acting on mode 0 alone vanish unless modes 1 and 2 agree.
    let bras = BasisStateSpace::from_indices(&basis, pairs.rows().to_vec()).unwrap();
    let kets = BasisStateSpace::from_indices(&basis, pairs.cols().to_vec()).unwrap();
    let braket = BraKetSpace::new(&bras, &kets).unwrap();
    let mode_0_only = braket.get_non_orthog_in_modes(&[1, 2]).unwrap();
    let surviving = pairs
        .iter()
        .zip(mode_0_only.iter())
        .filter_map(|(pair, &keep)| keep.then_some(pair))
        .collect_vec();
    assert_eq!(
        surviving,
        vec![
            (0, 0),
            (0, 9),
            (1, 1),
            (1, 10),
            (3, 3),
            (3, 12),
            (9, 0),
            (9, 9),
            (9, 18)
        ]
    );
}
