// Data processing: receipt field extraction and record merging

pub mod extract;
pub mod merge;

pub use extract::{analysis_target, AnalysisStrategy, ExtractionOutcome, FieldExtractor, SkipReason};
pub use merge::merge_record;
