//! # vibspace: State Spaces for Multi-Mode Vibrational Bases
//!
//! vibspace manages *which* states of a multi-mode oscillator basis take part in a calculation,
//! *how* they are indexed, and *which* pairs of them are coupled. Its capabilities are:
//! - bijective conversion between excitation tuples and single basis indices,
//! - deduplicated state spaces with memoised index bookkeeping and binary-search lookup,
//! - generation of coupled states under selection rules, with optional bounding by a filter
//!   space and iterated application,
//! - extraction of the deduplicated index pairs that drive the construction of sparse operator
//!   matrices, and
//! - paired bra/ket spaces answering orthogonality and per-mode selection-rule queries.
//!
//! Numerical diagonalisation, physical units, and basis-function evaluation are out of scope:
//! consumers supply a [`basis::RepresentationBasis`] and evaluate matrix elements themselves.
//!
//! ## Getting started
//!
//! The core API lives in [`state_space`]. A basis implements the index codec; a
//! [`state_space::BasisStateSpace`] borrows it:
//!
//! ```
//! use ndarray::array;
//! use vibspace::basis::SimpleProductBasis;
//! use vibspace::state_space::{BasisStateSpace, SelectionRule};
//!
//! let basis = SimpleProductBasis::uniform(1, 3).unwrap();
//! let space = BasisStateSpace::from_excitations(&basis, array![[0], [1]]).unwrap();
//! let pairs = space
//!     .apply_selection_rules(&[SelectionRule::from([1])], None, 1)
//!     .unwrap()
//!     .get_representation_indices(None)
//!     .unwrap();
//! assert_eq!(pairs.iter().collect::<Vec<_>>(), vec![(0, 1), (1, 2)]);
//! ```
//!
//! For configuration-file driven runs, see [`drivers::coupling_generation`].
//!
//! ## Logging
//!
//! vibspace logs progress of expensive steps at `debug` level, and human-readable run output at
//! `info` level to the `vibspace-output` target. No logger is installed by the library.
//!
//! ## License
//!
//! GNU Lesser General Public License v3.0.

pub mod basis;
pub mod drivers;
pub mod error;
pub mod io;
pub mod state_space;
