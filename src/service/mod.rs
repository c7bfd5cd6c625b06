mod audit;
mod entitlement;
mod genai;

pub use audit::AuditLogger;
pub use entitlement::{BatchGuard, EntitlementEngine, RateDecision, RedeemOutcome};
pub use genai::GenAiClient;
