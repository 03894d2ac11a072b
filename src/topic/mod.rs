//! Topic handling module
//!
//! Pattern compilation and capture extraction for rule topics, and
//! subscription-filter matching used to select candidate rules.

pub mod filter;
pub mod pattern;

pub use filter::{is_valid_filter, matches_subscription};
pub use pattern::{Captures, Token, TokenValidator, TokenValue, TopicPattern};
