use once_cell::sync::Lazy;
use serde_json::Value;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::entities::{
    FieldRecord, PageSectionJoin, PageSectionRecord, SectionDataRecord, SectionJoin,
    SectionRecord, SectionTemplateRecord,
};
use crate::domain::types::FieldType;

use super::{PostgresRepositories, decode_fields, fields_aggregate, lowered, map_sqlx_error};

static PAGE_SECTIONS_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "SELECT ps.id, ps.page_id, ps.section_id, ps.template_id, \
         COALESCE(ps.order_index, 0) AS order_index, ps.display_name, \
         s.id AS s_id, s.template_id AS s_template_id, s.name AS s_name, \
         s.slug AS s_slug, s.language_code AS s_language_code, \
         t.id AS t_id, t.slug AS t_slug, t.component_type AS t_component_type, \
         t.is_reusable AS t_is_reusable, t.language_code AS t_language_code, \
         {fields} AS t_fields \
         FROM page_sections ps \
         LEFT JOIN sections s ON s.id = ps.section_id \
         LEFT JOIN section_templates t ON t.id = COALESCE(ps.template_id, s.template_id) \
         WHERE ps.page_id = $1 \
         ORDER BY ps.order_index, ps.id",
        fields = fields_aggregate("fields", "t"),
    )
});

static SECTION_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "SELECT s.id AS s_id, s.template_id AS s_template_id, s.name AS s_name, \
         s.slug AS s_slug, s.language_code AS s_language_code, \
         t.id AS t_id, t.slug AS t_slug, t.component_type AS t_component_type, \
         t.is_reusable AS t_is_reusable, t.language_code AS t_language_code, \
         {fields} AS t_fields \
         FROM sections s \
         LEFT JOIN section_templates t ON t.id = s.template_id \
         WHERE s.id = $1",
        fields = fields_aggregate("fields", "t"),
    )
});

static SECTION_TEMPLATES_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "SELECT t.id AS t_id, t.slug AS t_slug, t.component_type AS t_component_type, \
         t.is_reusable AS t_is_reusable, t.language_code AS t_language_code, \
         {fields} AS t_fields \
         FROM section_templates t \
         WHERE $1::text IS NULL OR t.language_code IS NULL \
            OR lower(t.language_code) = lower($1) \
         ORDER BY t.slug, t.id",
        fields = fields_aggregate("fields", "t"),
    )
});

const SECTION_DATA_SQL: &str = "SELECT section_id, field_key, language_code, value \
     FROM section_data \
     WHERE section_id = ANY($1) \
       AND (language_code IS NULL OR lower(language_code) = ANY($2))";

const FIELDS_SQL: &str = "SELECT id, template_id, key, field_type, \
     COALESCE(is_required, FALSE) AS is_required, \
     COALESCE(is_translatable, TRUE) AS is_translatable, \
     COALESCE(order_index, 0) AS order_index \
     FROM fields WHERE template_id = $1 ORDER BY order_index, key";

/// Section columns of a join, all nullable because the reference may dangle.
#[derive(sqlx::FromRow)]
struct SectionColumns {
    s_id: Option<Uuid>,
    s_template_id: Option<Uuid>,
    s_name: Option<String>,
    s_slug: Option<String>,
    s_language_code: Option<String>,
}

impl SectionColumns {
    fn into_record(self) -> Option<SectionRecord> {
        Some(SectionRecord {
            id: self.s_id?,
            template_id: self.s_template_id?,
            name: self.s_name,
            slug: self.s_slug,
            language_code: self.s_language_code,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TemplateColumns {
    t_id: Option<Uuid>,
    t_slug: Option<String>,
    t_component_type: Option<String>,
    t_is_reusable: Option<bool>,
    t_language_code: Option<String>,
    t_fields: Option<Value>,
}

impl TemplateColumns {
    fn into_record(self) -> Result<Option<SectionTemplateRecord>, RepoError> {
        let Some(id) = self.t_id else {
            return Ok(None);
        };
        Ok(Some(SectionTemplateRecord {
            id,
            slug: self.t_slug.unwrap_or_default(),
            component_type: self.t_component_type.unwrap_or_default(),
            is_reusable: self.t_is_reusable.unwrap_or(false),
            language_code: self.t_language_code,
            fields: decode_fields(self.t_fields.unwrap_or(Value::Null))?,
        }))
    }
}

#[derive(sqlx::FromRow)]
struct PageSectionRow {
    id: Uuid,
    page_id: Uuid,
    section_id: Uuid,
    template_id: Option<Uuid>,
    order_index: i32,
    display_name: Option<String>,
    #[sqlx(flatten)]
    section: SectionColumns,
    #[sqlx(flatten)]
    template: TemplateColumns,
}

impl PageSectionRow {
    fn into_join(self) -> Result<PageSectionJoin, RepoError> {
        Ok(PageSectionJoin {
            page_section: PageSectionRecord {
                id: self.id,
                page_id: self.page_id,
                section_id: self.section_id,
                template_id: self.template_id,
                order_index: self.order_index,
                display_name: self.display_name,
            },
            section: self.section.into_record(),
            template: self.template.into_record()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SectionRow {
    #[sqlx(flatten)]
    section: SectionColumns,
    #[sqlx(flatten)]
    template: TemplateColumns,
}

#[derive(sqlx::FromRow)]
struct SectionDataRow {
    section_id: Uuid,
    field_key: String,
    language_code: Option<String>,
    value: Option<Value>,
}

impl From<SectionDataRow> for SectionDataRecord {
    fn from(row: SectionDataRow) -> Self {
        Self {
            section_id: row.section_id,
            field_key: row.field_key,
            language_code: row.language_code,
            value: row.value.unwrap_or(Value::Null),
        }
    }
}

#[derive(sqlx::FromRow)]
struct FieldRow {
    id: Uuid,
    template_id: Uuid,
    key: String,
    field_type: String,
    is_required: bool,
    is_translatable: bool,
    order_index: i32,
}

impl From<FieldRow> for FieldRecord {
    fn from(row: FieldRow) -> Self {
        Self {
            id: row.id,
            template_id: row.template_id,
            key: row.key,
            field_type: FieldType::parse(&row.field_type),
            is_required: row.is_required,
            is_translatable: row.is_translatable,
            order_index: row.order_index,
        }
    }
}

impl PostgresRepositories {
    pub(super) async fn page_sections(&self, page_id: Uuid) -> Result<Vec<PageSectionJoin>, RepoError> {
        let rows = sqlx::query_as::<_, PageSectionRow>(PAGE_SECTIONS_SQL.as_str())
            .bind(page_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(PageSectionRow::into_join).collect()
    }

    pub(super) async fn section_with_template(
        &self,
        section_id: Uuid,
    ) -> Result<Option<SectionJoin>, RepoError> {
        let row = sqlx::query_as::<_, SectionRow>(SECTION_SQL.as_str())
            .bind(section_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let section = row.section.into_record();
        let template = row.template.into_record()?;
        match (section, template) {
            (Some(section), Some(template)) => Ok(Some(SectionJoin { section, template })),
            (Some(section), None) => {
                tracing::warn!(
                    target = "lectern::infra::db::sections",
                    section_id = %section.id,
                    template_id = %section.template_id,
                    "section references a missing template"
                );
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    pub(super) async fn section_data(
        &self,
        section_ids: &[Uuid],
        languages: &[String],
    ) -> Result<Vec<SectionDataRecord>, RepoError> {
        if section_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, SectionDataRow>(SECTION_DATA_SQL)
            .bind(section_ids)
            .bind(lowered(languages))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(SectionDataRecord::from).collect())
    }

    pub(super) async fn section_templates(
        &self,
        language: Option<&str>,
    ) -> Result<Vec<SectionTemplateRecord>, RepoError> {
        let rows = sqlx::query_as::<_, TemplateColumns>(SECTION_TEMPLATES_SQL.as_str())
            .bind(language)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        let mut templates = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(template) = row.into_record()? {
                templates.push(template);
            }
        }
        Ok(templates)
    }

    pub(super) async fn template_fields(&self, template_id: Uuid) -> Result<Vec<FieldRecord>, RepoError> {
        let rows = sqlx::query_as::<_, FieldRow>(FIELDS_SQL)
            .bind(template_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(FieldRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn template_columns(id: Option<Uuid>) -> TemplateColumns {
        TemplateColumns {
            t_id: id,
            t_slug: Some("hero".to_string()),
            t_component_type: Some("Hero".to_string()),
            t_is_reusable: None,
            t_language_code: None,
            t_fields: Some(json!([
                { "id": Uuid::new_v4(), "template_id": Uuid::nil(), "key": "title", "field_type": "text" }
            ])),
        }
    }

    #[test]
    fn dangling_section_columns_yield_none() {
        let columns = SectionColumns {
            s_id: None,
            s_template_id: None,
            s_name: None,
            s_slug: None,
            s_language_code: None,
        };
        assert!(columns.into_record().is_none());
        assert!(template_columns(None).into_record().unwrap().is_none());
    }

    #[test]
    fn template_columns_decode_fields() {
        let template = template_columns(Some(Uuid::new_v4()))
            .into_record()
            .unwrap()
            .expect("template present");
        assert_eq!(template.component_type, "Hero");
        assert!(!template.is_reusable);
        assert_eq!(template.fields.len(), 1);
        assert_eq!(template.fields[0].field_type, FieldType::Text);
    }
}
