//! Errors raised by the state-space core.

use thiserror::Error;

/// Error cases arising when building or querying state spaces.
///
/// Contract violations (malformed shapes, states outside the basis, mismatched dimensions) are
/// reported as soon as the offending input is seen. Features that exist in the interface but have
/// not been implemented are reported through [`StateSpaceError::Unimplemented`] rather than being
/// silently ignored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateSpaceError {
    #[error("state array with shape {shape:?} cannot be read as states of a {ndim}-mode basis")]
    ShapeMismatch { shape: Vec<usize>, ndim: usize },

    #[error("excitation {excitation:?} lies outside the basis")]
    ExcitationOutOfBasis { excitation: Vec<usize> },

    #[error("index {index} lies outside a basis of {size} states")]
    IndexOutOfBasis { index: usize, size: usize },

    #[error("expected {expected} modes but found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("states of basis {found} cannot be combined with states of basis {expected}")]
    BasisMismatch { expected: String, found: String },

    #[error("bra space holds {bras} states but ket space holds {kets}")]
    PairCountMismatch { bras: usize, kets: usize },

    #[error("selection mask has length {found} but {expected} entries are available")]
    MaskLengthMismatch { expected: usize, found: usize },

    #[error("position {position} is out of range for a collection of length {len}")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("per-mode rules were given for {found} modes but the states have {expected}")]
    PerModeRuleCount { expected: usize, found: usize },

    #[error("a basis needs at least one mode and at least one quantum per mode, got {quanta:?}")]
    EmptyBasis { quanta: Vec<usize> },

    #[error("a product basis with quanta {quanta:?} has more states than can be indexed")]
    BasisTooLarge { quanta: Vec<usize> },

    #[error("a multi-state space needs at least one state space")]
    EmptyMultiSpace,

    #[error("grid shape {shape:?} does not hold {n_spaces} spaces")]
    GridShapeMismatch { shape: Vec<usize>, n_spaces: usize },

    #[error("not implemented: {0}")]
    Unimplemented(String),
}
