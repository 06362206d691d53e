//! Content packages (updates and DLC) and their title metadata.

pub mod extractor;
pub mod scan;
