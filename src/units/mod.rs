pub mod confidence;
pub mod data_hunter;
pub mod executor;
pub mod market_intelligence;
pub mod memory;
pub mod protocol_analyst;
pub mod risk_synthesizer;
pub mod traits;

pub use confidence::{compute_confidence, ConfidenceInputs};
pub use data_hunter::DataHunter;
pub use executor::{ExecutorConfig, UnitExecutor, CANCELLED_ERROR, TIMEOUT_ERROR};
pub use market_intelligence::{assess_market, MarketIntelligence};
pub use memory::{UnitMemory, UnitStats};
pub use protocol_analyst::{assess_security, ProtocolAnalyst, SecurityEvidence};
pub use risk_synthesizer::RiskSynthesizer;
pub use traits::{AnalysisUnit, UnitAnalysis, UnitError};
