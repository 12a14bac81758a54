//! Driver for the generation of coupled state pairs under selection rules.

use std::fmt;

use anyhow::{bail, format_err};
use derive_builder::Builder;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::basis::RepresentationBasis;
use crate::drivers::VibspaceDriver;
use crate::io::format::{
    log_subtitle, log_title, vibspace_error, vibspace_output, vibspace_warn, yes_no, LogLines,
};
use crate::state_space::{
    BasisStateSpace, DeltaStorage, IndexPairs, SelectionRule, SelectionRuleStateSpace,
};


// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

fn default_iterations() -> usize {
    1
}

/// A structure containing control parameters for coupling generation.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct CouplingGenerationParams {
    /// The selection rules, each a list of per-mode quantum-number changes placed onto every
    /// choice of distinct modes.
    #[builder(setter(custom))]
    pub selection_rules: Vec<SelectionRule>,

    /// The number of times the selection rules are composed.
    #[builder(default = "1")]
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// If given, only pairs whose total quantum-number change is one of these values are kept.
    #[builder(default = "None")]
    #[serde(default)]
    pub quantum_changes: Option<Vec<usize>>,

    /// The storage of the generated per-mode deltas.
    #[builder(default)]
    #[serde(default)]
    pub delta_storage: DeltaStorage,

    /// Frequency-difference threshold for discarding couplings. Not supported; any value makes
    /// the driver fail.
    #[builder(default = "None")]
    #[serde(default)]
    pub freq_threshold: Option<f64>,

    /// Boolean indicating if every generated pair is to be written to the output.
    #[builder(default = "false")]
    #[serde(default)]
    pub write_pairs: bool,
}

impl CouplingGenerationParams {
    /// Returns a builder to construct a [`CouplingGenerationParams`] structure.
    pub fn builder() -> CouplingGenerationParamsBuilder {
        CouplingGenerationParamsBuilder::default()
    }
}

impl CouplingGenerationParamsBuilder {
    pub fn selection_rules(&mut self, rules: &[Vec<i64>]) -> &mut Self {
        self.selection_rules = Some(rules.iter().cloned().map(SelectionRule::from).collect());
        self
    }
}

impl fmt::Display for CouplingGenerationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Selection rules: {}",
            if self.selection_rules.is_empty() {
                "--".to_string()
            } else {
                self.selection_rules.iter().map(|r| r.to_string()).join(", ")
            }
        )?;
        writeln!(f, "Iterations: {}", self.iterations)?;
        writeln!(
            f,
            "Allowed total quantum changes: {}",
            self.quantum_changes
                .as_ref()
                .map(|qs| qs.iter().map(|q| q.to_string()).join(", "))
                .unwrap_or_else(|| "all".to_string())
        )?;
        writeln!(f, "Delta storage: {}", self.delta_storage)?;
        if let Some(thresh) = self.freq_threshold {
            writeln!(f, "Frequency threshold: {thresh:.3e}")?;
        }
        writeln!(f, "Write coupled pairs: {}", yes_no(self.write_pairs))?;
        Ok(())
    }
}

// ------
// Result
// ------

/// A structure to contain coupling generation results.
#[derive(Clone, Builder, Debug)]
pub struct CouplingGenerationResult {
    /// The control parameters used to obtain this set of results.
    pub parameters: CouplingGenerationParams,

    /// The number of distinct states the final selection-rule pass was applied to.
    pub n_base_states: usize,

    /// The number of distinct states generated across all child spaces.
    pub n_generated_states: usize,

    /// The number of pairs before any quantum-change filtering.
    pub n_unfiltered_pairs: usize,

    /// The coupled `(base, generated)` index pairs.
    pub pairs: IndexPairs,
}

impl CouplingGenerationResult {
    fn builder() -> CouplingGenerationResultBuilder {
        CouplingGenerationResultBuilder::default()
    }
}

impl fmt::Display for CouplingGenerationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Base states: {}", self.n_base_states)?;
        writeln!(f, "Generated states: {}", self.n_generated_states)?;
        writeln!(f, "Coupled pairs: {}", self.pairs.len())?;
        if self.parameters.quantum_changes.is_some() {
            writeln!(
                f,
                "Pairs removed by quantum-change filter: {}",
                self.n_unfiltered_pairs - self.pairs.len()
            )?;
        }
        Ok(())
    }
}

// ------
// Driver
// ------

/// A driver for the generation of coupled state pairs.
#[derive(Clone, Builder)]
pub struct CouplingGenerationDriver<'a, 'b, B: RepresentationBasis + Clone> {
    /// The control parameters for coupling generation.
    parameters: &'a CouplingGenerationParams,

    /// The space the selection rules are applied to.
    space: &'a BasisStateSpace<'b, B>,

    /// An optional space every generated state must belong to.
    #[builder(default = "None")]
    filter_space: Option<&'a BasisStateSpace<'b, B>>,

    /// The result of the coupling generation.
    #[builder(setter(skip), default = "None")]
    result: Option<CouplingGenerationResult>,
}

impl<'a, 'b, B: RepresentationBasis + Clone> CouplingGenerationDriver<'a, 'b, B> {
    /// Returns a builder to construct a [`CouplingGenerationDriver`] structure.
    pub fn builder() -> CouplingGenerationDriverBuilder<'a, 'b, B> {
        CouplingGenerationDriverBuilder::default()
    }

    /// Executes coupling generation.
    fn generate_couplings(&mut self) -> Result<(), anyhow::Error> {
        log_title("Selection-Rule Coupling Generation");
        vibspace_output!("");
        let params = self.parameters;
        params.log_lines();
        vibspace_output!("");

        if params.freq_threshold.is_some() {
            bail!("Frequency-threshold filtering of couplings is not supported.");
        }
        if let Some(filter_space) = self.filter_space {
            if filter_space.ndim() != self.space.ndim() {
                bail!(
                    "The filter space has {} modes but the base space has {}.",
                    filter_space.ndim(),
                    self.space.ndim()
                );
            }
        }

        log_subtitle("State spaces");
        vibspace_output!("");
        vibspace_output!("Base space: {}", self.space);
        if let Some(filter_space) = self.filter_space {
            vibspace_output!("Filter space: {filter_space}");
        } else {
            vibspace_output!("Filter space: --");
        }
        vibspace_output!("");

        let sel_space = SelectionRuleStateSpace::from_rules_with_storage(
            self.space,
            &params.selection_rules,
            self.filter_space,
            params.iterations,
            params.delta_storage,
        )?;
        let unfiltered_pairs = sel_space.get_representation_indices(params.freq_threshold)?;
        let n_unfiltered_pairs = unfiltered_pairs.len();
        let pairs = match params.quantum_changes.as_ref() {
            Some(q_changes) => sel_space.filter_representation_inds(&unfiltered_pairs, q_changes)?,
            None => unfiltered_pairs,
        };
        if pairs.is_empty() {
            vibspace_warn!("No coupled pairs have been generated.");
        }

        self.result = Some(
            CouplingGenerationResult::builder()
                .parameters(params.clone())
                .n_base_states(sel_space.base_space().len())
                .n_generated_states(sel_space.len())
                .n_unfiltered_pairs(n_unfiltered_pairs)
                .pairs(pairs)
                .build()
                .map_err(|err| format_err!(err))?,
        );

        if let Some(cg_res) = self.result.as_ref() {
            log_subtitle("Coupling summary");
            vibspace_output!("");
            cg_res.log_lines();
            if params.write_pairs {
                vibspace_output!("");
                log_subtitle("Coupled index pairs");
                vibspace_output!("");
                cg_res.pairs.log_lines();
            }
            vibspace_output!("");
        }

        Ok(())
    }
}

impl<'a, 'b, B: RepresentationBasis + Clone> VibspaceDriver
    for CouplingGenerationDriver<'a, 'b, B>
{
    type Params = CouplingGenerationParams;

    type Outcome = CouplingGenerationResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No coupling generation results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.generate_couplings().map_err(|err| {
            vibspace_error!("Coupling generation has failed with error:");
            vibspace_error!("  {err:#}");
            err
        })
    }
}
