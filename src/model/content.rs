//! Metadata of a content package, as reported by the extractor.

use serde::Serialize;

use super::title::TitleId;

/// What a content package contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContentCategory {
    /// A base game.
    Application,
    /// An update.
    Patch,
    /// Downloadable content.
    AddOnContent,
}

/// Title metadata for one content package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentMeta {
    /// Title id of the packaged content.
    pub title_id: TitleId,

    /// Release version code (`v<N>` in the listing).
    pub version_code: u32,

    /// Package kind.
    pub category: ContentCategory,

    /// 32 hex digits naming the main content archive inside the package.
    pub content_id: Option<String>,

    /// Owning application, when the listing names it explicitly.
    pub application_id: Option<TitleId>,
}

impl ContentMeta {
    /// The base game this content belongs to.
    pub fn owning_application(&self) -> TitleId {
        match self.category {
            ContentCategory::Application => self.title_id,
            ContentCategory::Patch => self.title_id.patch_application_id(),
            ContentCategory::AddOnContent => self
                .application_id
                .unwrap_or_else(|| self.title_id.addon_application_id()),
        }
    }
}
