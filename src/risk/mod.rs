// Risk synthesis: components, weighting, consensus and the final verdict
pub mod components;
pub mod consensus;
pub mod engine;
pub mod errors;
pub mod findings;
pub mod insights;
pub mod weights;

pub use components::{default_component, score_components, weighted_score, UnitOutputs};
pub use consensus::{assess_consensus, describe_consensus, NEUTRAL_CONSENSUS, NO_CONSENSUS};
pub use engine::{SynthesisEngine, MIN_SUCCESSFUL_UNITS};
pub use errors::RiskError;
pub use findings::{extract_findings, Findings};
pub use weights::WeightSet;
