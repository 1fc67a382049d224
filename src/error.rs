//! Error taxonomy (§7).
//!
//! Three tiers: programmer errors panic (they are contract violations, never
//! caught inside the core); compiler/builder input errors are typed values
//! returned from `Result`; verification/simulation *outcomes* are plain data
//! living on `ValidationResult` / `SimulationResult`, never in an `Err`.

use crate::petri_net::{PlaceId, TransitionId};
use thiserror::Error;

/// Tier 2 — the net failed a structural invariant while being frozen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FreezeError {
    #[error("net has no places")]
    NoPlaces,
    #[error("initial marking is empty")]
    EmptyInitialMarking,
    #[error("arc references unknown place id {0:?}")]
    UnknownPlace(PlaceId),
    #[error("arc references unknown transition id {0:?}")]
    UnknownTransition(TransitionId),
    #[error("place id {0:?} has non-positive capacity")]
    NonPositiveCapacity(PlaceId),
    #[error("arc has non-positive weight")]
    NonPositiveWeight,
    #[error("duplicate place id {0:?}")]
    DuplicatePlaceId(String),
    #[error("duplicate transition id {0:?}")]
    DuplicateTransitionId(String),
    #[error("initial marking references undeclared place id {0:?}")]
    InitialMarkingUnknownPlace(String),
}

/// Tier 2 — the grammar compiler rejected an `IntentSpec`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("step {step} depends on unknown step {dep}")]
    UnknownDependency { step: String, dep: String },
    #[error("dependency graph contains a cycle through step {step}")]
    CyclicDependency { step: String },
    #[error("duplicate step id {step}")]
    DuplicateStepId { step: String },
    #[error("step {step} is missing a required field: {field}")]
    MissingField { step: String, field: String },
    #[error("compiled net failed a structural invariant: {description}")]
    CompilationInvariantViolation { description: String },
}

impl From<FreezeError> for CompileError {
    fn from(err: FreezeError) -> Self {
        CompileError::CompilationInvariantViolation {
            description: err.to_string(),
        }
    }
}

/// Tier 2 — the DAG projector could not emit an acyclic graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("projection is cyclic through transitions {0:?}")]
    CyclicProjection(Vec<TransitionId>),
}

/// Tier 1 — contract violations. These are programmer errors: they are
/// never expected to occur and are not meant to be recovered from. The core
/// signals them by panicking, per §7's propagation policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("transition {0:?} is not enabled in the given marking")]
    TransitionNotEnabled(TransitionId),
    #[error("validator invoked with a config field out of range: {0}")]
    InvalidConfig(String),
}
