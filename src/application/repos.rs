//! Repository traits describing the content store.
//!
//! Every method maps to exactly one store round trip. Resolver code counts on
//! that when it bounds the number of queries per request.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{
    FieldRecord, ItemBundle, ItemDataRecord, ItemTemplateRecord, LinkedItemRow, PageRecord,
    PageSectionJoin, ProjectRecord, SectionDataRecord, SectionJoin, SectionTemplateRecord,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Active projects only, as for [`ContentRepo::find_project_by_slug`].
    async fn find_project_by_id(&self, id: Uuid) -> Result<Option<ProjectRecord>, RepoError>;

    async fn find_project_by_slug(&self, slug: &str) -> Result<Option<ProjectRecord>, RepoError>;

    async fn find_page_by_id(&self, id: Uuid) -> Result<Option<PageRecord>, RepoError>;

    /// Published page with the given slug in the earliest of `languages` that has one.
    async fn find_published_page(
        &self,
        project_id: Uuid,
        slug: &str,
        languages: &[String],
    ) -> Result<Option<PageRecord>, RepoError>;

    /// Published pages of a project in `language`, in navigation order.
    async fn list_published_pages(
        &self,
        project_id: Uuid,
        language: &str,
    ) -> Result<Vec<PageRecord>, RepoError>;

    /// Page sections with their sections, templates and fields, ordered by position.
    async fn list_page_sections(&self, page_id: Uuid) -> Result<Vec<PageSectionJoin>, RepoError>;

    async fn find_section(&self, section_id: Uuid) -> Result<Option<SectionJoin>, RepoError>;

    /// Data rows of `section_ids` whose language is in `languages` or unset.
    async fn list_section_data(
        &self,
        section_ids: &[Uuid],
        languages: &[String],
    ) -> Result<Vec<SectionDataRecord>, RepoError>;

    /// Junction rows for items attached to `section_ids`, with item, template and data.
    async fn list_linked_items(&self, section_ids: &[Uuid]) -> Result<Vec<LinkedItemRow>, RepoError>;

    /// Members of the given item families (base items and their translations)
    /// whose language is in `languages`.
    async fn list_item_family(
        &self,
        family_ids: &[Uuid],
        languages: &[String],
    ) -> Result<Vec<ItemBundle>, RepoError>;

    async fn list_item_data(&self, item_ids: &[Uuid]) -> Result<Vec<ItemDataRecord>, RepoError>;

    async fn find_item_by_id(&self, id: Uuid) -> Result<Option<ItemBundle>, RepoError>;

    /// Item with the given slug in the earliest of `languages` that has one.
    async fn find_item_by_slug(
        &self,
        project_id: Uuid,
        slug: &str,
        languages: &[String],
    ) -> Result<Option<ItemBundle>, RepoError>;

    /// Items of a template whose language is in `languages` or unset.
    async fn list_items(
        &self,
        template_id: Uuid,
        languages: &[String],
    ) -> Result<Vec<ItemBundle>, RepoError>;

    /// Templates shared across languages plus those bound to `language`.
    async fn list_section_templates(
        &self,
        language: Option<&str>,
    ) -> Result<Vec<SectionTemplateRecord>, RepoError>;

    async fn list_fields(&self, template_id: Uuid) -> Result<Vec<FieldRecord>, RepoError>;

    async fn list_item_templates(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ItemTemplateRecord>, RepoError>;
}
