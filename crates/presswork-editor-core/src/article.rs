//! Saving articles.

use std::future::Future;

use chrono::{DateTime, Utc};
use smol_str::SmolStr;

use crate::error::SaveError;

/// An article as handed to a store: title plus serialized content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDraft {
    /// Set when updating an existing article.
    pub id: Option<SmolStr>,
    pub title: String,
    /// Canonical markup of the document.
    pub content: String,
}

/// What the store reports back after a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pub id: SmolStr,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persists articles. The title is already validated when `save` is called.
pub trait ArticleStore {
    fn save(
        &self,
        draft: ArticleDraft,
    ) -> impl Future<Output = Result<ArticleRecord, SaveError>> + Send;
}
