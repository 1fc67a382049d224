//! `IntentSpec`: the front-end-agnostic declarative workflow description
//! consumed by the grammar compiler (§3, §4.2). Produced once by an
//! external parser (YAML/webhook/natural-language front ends are out of
//! scope, §1) and immutable thereafter.

use crate::petri_net::{GuardExpr, Metadata};
use crate::error::CompileError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One branch of a `Choice` or `NestedConditional` step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceBranch {
    pub id: String,
    pub guard: Option<GuardExpr>,
}

/// A declared compensation action, fired in parallel with its siblings when
/// a `Compensation` step runs, or referenced by a step's generic
/// `compensation` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationAction {
    pub id: String,
    pub description: String,
}

/// Opaque retry policy, carried but not interpreted by the core beyond
/// presence/absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

/// A tagged variant per step type (Design Notes, §9): each carries exactly
/// the fields its fragment needs, rather than a single struct with a pile
/// of `Option`s most of which are unused for any given step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StepKind {
    Action,
    Sequence,
    Choice { branches: Vec<ChoiceBranch> },
    Parallel { branches: Vec<String> },
    Sync,
    NestedConditional { branches: Vec<ChoiceBranch> },
    Loop { condition: GuardExpr },
    EventTrigger { event_name: String },
    ErrorHandler,
    Compensation { actions: Vec<CompensationAction> },
    CircuitBreaker,
    FanOutFanIn { branches: Vec<String> },
    PipelineStage,
    ResourceConstrained { resource_type: String, capacity: u32 },
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Action => "Action",
            StepKind::Sequence => "Sequence",
            StepKind::Choice { .. } => "Choice",
            StepKind::Parallel { .. } => "Parallel",
            StepKind::Sync => "Sync",
            StepKind::NestedConditional { .. } => "NestedConditional",
            StepKind::Loop { .. } => "Loop",
            StepKind::EventTrigger { .. } => "EventTrigger",
            StepKind::ErrorHandler => "ErrorHandler",
            StepKind::Compensation { .. } => "Compensation",
            StepKind::CircuitBreaker => "CircuitBreaker",
            StepKind::FanOutFanIn { .. } => "FanOutFanIn",
            StepKind::PipelineStage => "PipelineStage",
            StepKind::ResourceConstrained { .. } => "ResourceConstrained",
        }
    }
}

/// A single declared step of an `IntentSpec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentStep {
    pub id: String,
    pub kind: StepKind,
    pub description: String,
    #[serde(default)]
    pub needs: Vec<String>,
    #[serde(default)]
    pub guard: Option<GuardExpr>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub compensation: Vec<CompensationAction>,
    #[serde(default)]
    pub resource_constraints: HashMap<String, u32>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A named, ordered list of steps: the input to the grammar compiler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentSpec {
    pub name: String,
    pub steps: Vec<IntentStep>,
}

impl IntentSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(&self, id: &str) -> Option<&IntentStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Rejects the spec before compilation if any `needs` id is
    /// undeclared, any step id is duplicated, or the dependency graph
    /// contains a cycle (§3).
    pub fn validate_structure(&self) -> Result<(), CompileError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(CompileError::DuplicateStepId {
                    step: step.id.clone(),
                });
            }
        }
        for step in &self.steps {
            for dep in &step.needs {
                if self.step(dep).is_none() {
                    return Err(CompileError::UnknownDependency {
                        step: step.id.clone(),
                        dep: dep.clone(),
                    });
                }
            }
        }
        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<(), CompileError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = self
            .steps
            .iter()
            .map(|s| (s.id.as_str(), Mark::Unvisited))
            .collect();

        fn visit<'a>(
            spec: &'a IntentSpec,
            id: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), CompileError> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::InProgress) => {
                    return Err(CompileError::CyclicDependency { step: id.to_string() })
                }
                _ => {}
            }
            marks.insert(id, Mark::InProgress);
            if let Some(step) = spec.step(id) {
                for dep in &step.needs {
                    visit(spec, dep, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        for step in &self.steps {
            visit(self, &step.id, &mut marks)?;
        }
        Ok(())
    }
}
