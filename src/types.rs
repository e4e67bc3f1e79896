pub mod labels;

// Re-export types for convenience.
pub use crate::types::labels::LabelIndex;
