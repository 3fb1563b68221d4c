pub mod extraction;
pub mod tag_index;

pub use extraction::{Allowance, AnnotationExtractor};
pub use tag_index::TagIndex;
