//! Message transformation module
//!
//! Turns inbound topic messages into write records based on configured
//! rules, and renders records as InfluxDB line protocol.

pub mod engine;
pub mod formatter;
pub mod payload;
pub mod record;
pub mod rules;

pub use engine::{DispatchReport, Dispatched, RuleEngine, WriteOutcome, WriteSummary};
pub use formatter::LineProtocolFormatter;
pub use payload::{PayloadConverter, PayloadType};
pub use record::{FieldValue, WriteRecord};
pub use rules::{ExtractConfig, PayloadConfig, Rule, RuleError, RuleGroup, RuleSet, TokenConfig};
