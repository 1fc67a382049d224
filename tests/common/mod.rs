use workflow_verifier_core::intent::{ChoiceBranch, CompensationAction, IntentSpec, IntentStep, StepKind};
use workflow_verifier_core::petri_net::{GuardExpr, Metadata};

pub fn action(id: &str, needs: &[&str]) -> IntentStep {
    IntentStep {
        id: id.to_string(),
        kind: StepKind::Action,
        description: id.to_string(),
        needs: needs.iter().map(|s| s.to_string()).collect(),
        guard: None,
        timeout_ms: None,
        retry_policy: None,
        compensation: Vec::new(),
        resource_constraints: std::collections::HashMap::new(),
        metadata: Metadata::new(),
    }
}

pub fn sequence(id: &str, needs: &[&str]) -> IntentStep {
    IntentStep {
        kind: StepKind::Sequence,
        ..action(id, needs)
    }
}

pub fn sync(id: &str, needs: &[&str]) -> IntentStep {
    IntentStep {
        kind: StepKind::Sync,
        ..action(id, needs)
    }
}

fn branch(id: &str) -> ChoiceBranch {
    ChoiceBranch {
        id: id.to_string(),
        guard: Some(GuardExpr(id.to_string())),
    }
}

pub fn parallel(id: &str, needs: &[&str], branches: &[&str]) -> IntentStep {
    IntentStep {
        kind: StepKind::Parallel {
            branches: branches.iter().map(|s| s.to_string()).collect(),
        },
        ..action(id, needs)
    }
}

pub fn fan_out_fan_in(id: &str, needs: &[&str], branches: &[&str]) -> IntentStep {
    IntentStep {
        kind: StepKind::FanOutFanIn {
            branches: branches.iter().map(|s| s.to_string()).collect(),
        },
        ..action(id, needs)
    }
}

pub fn choice(id: &str, needs: &[&str], branch_ids: &[&str]) -> IntentStep {
    IntentStep {
        kind: StepKind::Choice {
            branches: branch_ids.iter().map(|b| branch(b)).collect(),
        },
        ..action(id, needs)
    }
}

pub fn nested_conditional(id: &str, needs: &[&str], branch_ids: &[&str]) -> IntentStep {
    IntentStep {
        kind: StepKind::NestedConditional {
            branches: branch_ids.iter().map(|b| branch(b)).collect(),
        },
        ..action(id, needs)
    }
}

pub fn loop_step(id: &str, needs: &[&str], condition: &str) -> IntentStep {
    IntentStep {
        kind: StepKind::Loop {
            condition: GuardExpr(condition.to_string()),
        },
        ..action(id, needs)
    }
}

pub fn event_trigger(id: &str, needs: &[&str], event_name: &str) -> IntentStep {
    IntentStep {
        kind: StepKind::EventTrigger {
            event_name: event_name.to_string(),
        },
        ..action(id, needs)
    }
}

pub fn error_handler(id: &str, needs: &[&str]) -> IntentStep {
    IntentStep {
        kind: StepKind::ErrorHandler,
        ..action(id, needs)
    }
}

pub fn compensation(id: &str, needs: &[&str], action_ids: &[&str]) -> IntentStep {
    IntentStep {
        kind: StepKind::Compensation {
            actions: action_ids
                .iter()
                .map(|a| CompensationAction {
                    id: a.to_string(),
                    description: a.to_string(),
                })
                .collect(),
        },
        ..action(id, needs)
    }
}

pub fn circuit_breaker(id: &str, needs: &[&str]) -> IntentStep {
    IntentStep {
        kind: StepKind::CircuitBreaker,
        ..action(id, needs)
    }
}

pub fn pipeline_stage(id: &str, needs: &[&str]) -> IntentStep {
    IntentStep {
        kind: StepKind::PipelineStage,
        ..action(id, needs)
    }
}

pub fn resource_constrained(id: &str, needs: &[&str], resource_type: &str, capacity: u32) -> IntentStep {
    IntentStep {
        kind: StepKind::ResourceConstrained {
            resource_type: resource_type.to_string(),
            capacity,
        },
        ..action(id, needs)
    }
}

/// An `Action` step carrying a `timeout_ms`, so it trips the rule engine's
/// `needs_timeout_manager` decision (§4.3 rule 7).
pub fn action_with_timeout(id: &str, needs: &[&str], timeout_ms: u64) -> IntentStep {
    IntentStep {
        timeout_ms: Some(timeout_ms),
        ..action(id, needs)
    }
}

pub fn spec(name: &str, steps: Vec<IntentStep>) -> IntentSpec {
    let mut s = IntentSpec::new(name);
    s.steps = steps;
    s
}
