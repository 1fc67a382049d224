//! Formal verification and simulation core of a workflow validator.
//!
//! A declarative [`intent::IntentSpec`] is compiled ([`compiler`]) into a
//! Petri net ([`petri_net`]), rewritten by a fixed set of idempotent rules
//! ([`rules`]), and then either exhaustively explored within a time/state
//! budget ([`explorer`], surfaced through [`validator`]), replayed step by
//! step ([`simulator`]), or projected down to an acyclic dependency graph
//! ([`dag`]). [`pipeline::build_net`] is the single entry point gluing
//! compilation and rewriting together; everything downstream only ever
//! borrows the resulting frozen [`petri_net::PetriNet`].

pub mod compiler;
pub mod dag;
pub mod error;
pub mod explorer;
pub mod intent;
pub mod petri_net;
pub mod pipeline;
pub mod rules;
pub mod simulator;
pub mod validator;

pub use error::{CompileError, ContractViolation, FreezeError, ProjectionError};
pub use intent::{IntentSpec, IntentStep, StepKind};
pub use petri_net::{Marking, PetriNet, PlaceId, Tokens, TransitionId};
pub use pipeline::build_net;
