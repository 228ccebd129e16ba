pub mod farewell_analysis;
pub mod phrase_matcher;

pub use phrase_matcher::PhraseMatcher;
