//! Postgres-backed content store.
//!
//! Queries use runtime-checked SQL. Nested collections (template fields, item
//! data) come back as JSON aggregates so every trait method stays one round trip.

mod items;
mod pages;
mod projects;
mod sections;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};
use uuid::Uuid;

use crate::application::repos::{ContentRepo, RepoError};
use crate::domain::entities::{
    FieldRecord, ItemBundle, ItemDataRecord, ItemTemplateRecord, LinkedItemRow, PageRecord,
    PageSectionJoin, ProjectRecord, SectionDataRecord, SectionJoin, SectionTemplateRecord,
};
use crate::domain::types::FieldType;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}

/// Field definition as it appears inside a JSON aggregate.
#[derive(Debug, Deserialize)]
struct FieldJson {
    id: Uuid,
    template_id: Uuid,
    key: String,
    field_type: String,
    #[serde(default)]
    is_required: bool,
    #[serde(default = "default_translatable")]
    is_translatable: bool,
    #[serde(default)]
    order_index: i32,
}

fn default_translatable() -> bool {
    true
}

impl From<FieldJson> for FieldRecord {
    fn from(field: FieldJson) -> Self {
        Self {
            id: field.id,
            template_id: field.template_id,
            key: field.key,
            field_type: FieldType::parse(&field.field_type),
            is_required: field.is_required,
            is_translatable: field.is_translatable,
            order_index: field.order_index,
        }
    }
}

/// Correlated subquery aggregating the fields of template `template` from `table`.
fn fields_aggregate(table: &str, template: &str) -> String {
    format!(
        "(SELECT COALESCE(jsonb_agg(jsonb_build_object(\
         'id', f.id, 'template_id', f.template_id, 'key', f.key, \
         'field_type', f.field_type, 'is_required', f.is_required, \
         'is_translatable', f.is_translatable, 'order_index', f.order_index) \
         ORDER BY f.order_index), '[]'::jsonb) \
         FROM {table} f WHERE f.template_id = {template}.id)"
    )
}

/// Language codes compare case-insensitively; the SQL side lowers the column.
fn lowered(languages: &[String]) -> Vec<String> {
    languages.iter().map(|language| language.to_lowercase()).collect()
}

fn decode_fields(value: serde_json::Value) -> Result<Vec<FieldRecord>, RepoError> {
    let mut fields: Vec<FieldRecord> = util::decode_aggregate::<FieldJson>("fields", value)?
        .into_iter()
        .map(FieldRecord::from)
        .collect();
    fields.sort_by_key(|field| field.order_index);
    Ok(fields)
}

#[async_trait]
impl ContentRepo for PostgresRepositories {
    async fn find_project_by_id(&self, id: Uuid) -> Result<Option<ProjectRecord>, RepoError> {
        self.project_by_id(id).await
    }

    async fn find_project_by_slug(&self, slug: &str) -> Result<Option<ProjectRecord>, RepoError> {
        self.project_by_slug(slug).await
    }

    async fn find_page_by_id(&self, id: Uuid) -> Result<Option<PageRecord>, RepoError> {
        self.page_by_id(id).await
    }

    async fn find_published_page(
        &self,
        project_id: Uuid,
        slug: &str,
        languages: &[String],
    ) -> Result<Option<PageRecord>, RepoError> {
        self.published_page(project_id, slug, languages).await
    }

    async fn list_published_pages(
        &self,
        project_id: Uuid,
        language: &str,
    ) -> Result<Vec<PageRecord>, RepoError> {
        self.published_pages(project_id, language).await
    }

    async fn list_page_sections(&self, page_id: Uuid) -> Result<Vec<PageSectionJoin>, RepoError> {
        self.page_sections(page_id).await
    }

    async fn find_section(&self, section_id: Uuid) -> Result<Option<SectionJoin>, RepoError> {
        self.section_with_template(section_id).await
    }

    async fn list_section_data(
        &self,
        section_ids: &[Uuid],
        languages: &[String],
    ) -> Result<Vec<SectionDataRecord>, RepoError> {
        self.section_data(section_ids, languages).await
    }

    async fn list_linked_items(&self, section_ids: &[Uuid]) -> Result<Vec<LinkedItemRow>, RepoError> {
        self.linked_items(section_ids).await
    }

    async fn list_item_family(
        &self,
        family_ids: &[Uuid],
        languages: &[String],
    ) -> Result<Vec<ItemBundle>, RepoError> {
        self.item_family(family_ids, languages).await
    }

    async fn list_item_data(&self, item_ids: &[Uuid]) -> Result<Vec<ItemDataRecord>, RepoError> {
        self.item_data(item_ids).await
    }

    async fn find_item_by_id(&self, id: Uuid) -> Result<Option<ItemBundle>, RepoError> {
        self.item_by_id(id).await
    }

    async fn find_item_by_slug(
        &self,
        project_id: Uuid,
        slug: &str,
        languages: &[String],
    ) -> Result<Option<ItemBundle>, RepoError> {
        self.item_by_slug(project_id, slug, languages).await
    }

    async fn list_items(
        &self,
        template_id: Uuid,
        languages: &[String],
    ) -> Result<Vec<ItemBundle>, RepoError> {
        self.items_of_template(template_id, languages).await
    }

    async fn list_section_templates(
        &self,
        language: Option<&str>,
    ) -> Result<Vec<SectionTemplateRecord>, RepoError> {
        self.section_templates(language).await
    }

    async fn list_fields(&self, template_id: Uuid) -> Result<Vec<FieldRecord>, RepoError> {
        self.template_fields(template_id).await
    }

    async fn list_item_templates(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ItemTemplateRecord>, RepoError> {
        self.item_templates(project_id).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn fields_decode_sorted_with_defaults() {
        let template = Uuid::new_v4();
        let value = json!([
            { "id": Uuid::new_v4(), "template_id": template, "key": "body", "field_type": "richtext", "order_index": 2 },
            { "id": Uuid::new_v4(), "template_id": template, "key": "tags", "field_type": "LIST", "order_index": 1, "is_translatable": false },
        ]);

        let fields = decode_fields(value).expect("fields decode");
        assert_eq!(fields[0].key, "tags");
        assert_eq!(fields[0].field_type, FieldType::List);
        assert!(!fields[0].is_translatable);
        assert_eq!(fields[1].field_type, FieldType::Richtext);
        assert!(fields[1].is_translatable);
    }

    #[test]
    fn fields_aggregate_targets_the_given_table() {
        let sql = fields_aggregate("item_fields", "it");
        assert!(sql.contains("FROM item_fields f WHERE f.template_id = it.id"));
        assert!(sql.starts_with("(SELECT COALESCE(jsonb_agg("));
    }
}
