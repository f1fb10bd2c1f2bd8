//! Learning - Transit Refinement & Suggestions
//!
//! ## Responsibilities
//!
//! - Fold observed transits into connection time envelopes (EMA)
//! - Turn recurring unexplained movements into connection suggestions
//! - Hold discovery suggestions with one-shot accept/reject

mod suggestions;
mod transit;

pub use suggestions::{
    Suggestion, SuggestionKind, SuggestionPayload, SuggestionStatus, SuggestionStore,
};
pub use transit::TransitTimeLearner;
