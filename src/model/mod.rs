//! Data model: title and save-directory identifiers, content metadata.

pub mod content;
pub mod title;
