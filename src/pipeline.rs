//! Glues the grammar compiler (§4.2) and the rule engine (§4.3) into the
//! single entry point external callers use to turn an `IntentSpec` into a
//! frozen [`PetriNet`].

use crate::compiler;
use crate::error::CompileError;
use crate::intent::IntentSpec;
use crate::petri_net::PetriNet;
use crate::rules;

/// Compiles `spec`, applies every rule-engine rewrite, and freezes the
/// result. This is the only path production callers should use; the
/// `compiler` and `rules` modules are exposed separately mainly for testing
/// individual fragments.
pub fn build_net(spec: &IntentSpec) -> Result<PetriNet, CompileError> {
    tracing::debug!(steps = spec.steps.len(), name = %spec.name, "compiling intent spec");
    let decisions = rules::analyze(spec);
    let (mut builder, exits, entries) = compiler::compile(spec, &decisions)?;
    if let Err(e) = rules::apply_post_compile(&mut builder, spec, &decisions, &exits, &entries) {
        tracing::warn!(error = %e, "post-compile rule engine failed");
        return Err(e);
    }
    match builder.freeze() {
        Ok(net) => {
            tracing::info!(
                places = net.places().len(),
                transitions = net.transitions().len(),
                "intent spec compiled to net"
            );
            Ok(net)
        }
        Err(e) => {
            tracing::warn!(error = %e, "freezing compiled net failed");
            Err(CompileError::from(e))
        }
    }
}
