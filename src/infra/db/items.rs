use once_cell::sync::Lazy;
use serde_json::Value;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::entities::{
    ItemBundle, ItemDataRecord, ItemRecord, ItemTemplateRecord, LinkedItemRow,
};

use super::{PostgresRepositories, decode_fields, fields_aggregate, lowered, map_sqlx_error};

/// Columns of an item with its template, template fields and own data.
static BUNDLE_COLUMNS: Lazy<String> = Lazy::new(|| {
    format!(
        "i.id, i.project_id, i.template_id, i.name, i.slug, i.language_code, i.base_item_id, \
         it.id AS tpl_id, it.project_id AS tpl_project_id, it.slug AS tpl_slug, \
         it.name AS tpl_name, {fields} AS tpl_fields, \
         (SELECT COALESCE(jsonb_agg(jsonb_build_object(\
            'item_id', d.item_id, 'field_key', d.field_key, 'value', d.value)), '[]'::jsonb) \
          FROM item_data d WHERE d.item_id = i.id) AS data",
        fields = fields_aggregate("item_fields", "it"),
    )
});

const BUNDLE_JOIN: &str = "FROM items i LEFT JOIN item_templates it ON it.id = i.template_id";

static LINKED_ITEMS_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "SELECT si.section_id AS link_section_id, si.field_id AS link_field_id, \
         COALESCE(si.order_index, 0) AS link_order, {columns} \
         FROM section_items si \
         JOIN items i ON i.id = si.item_id \
         LEFT JOIN item_templates it ON it.id = i.template_id \
         WHERE si.section_id = ANY($1) \
         ORDER BY si.section_id, si.field_id, si.order_index",
        columns = BUNDLE_COLUMNS.as_str(),
    )
});

static FAMILY_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "SELECT {columns} {BUNDLE_JOIN} \
         WHERE (i.id = ANY($1) OR i.base_item_id = ANY($1)) \
           AND (i.language_code IS NULL OR lower(i.language_code) = ANY($2))",
        columns = BUNDLE_COLUMNS.as_str(),
    )
});

static ITEM_BY_ID_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "SELECT {columns} {BUNDLE_JOIN} WHERE i.id = $1",
        columns = BUNDLE_COLUMNS.as_str(),
    )
});

static ITEM_BY_SLUG_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "SELECT {columns} {BUNDLE_JOIN} \
         WHERE i.project_id = $1 AND i.slug = $2 AND lower(i.language_code) = ANY($3) \
         ORDER BY array_position($3, lower(i.language_code)) \
         LIMIT 1",
        columns = BUNDLE_COLUMNS.as_str(),
    )
});

static ITEMS_OF_TEMPLATE_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "SELECT {columns} {BUNDLE_JOIN} \
         WHERE i.template_id = $1 \
           AND (i.language_code IS NULL OR lower(i.language_code) = ANY($2)) \
         ORDER BY i.name, i.id",
        columns = BUNDLE_COLUMNS.as_str(),
    )
});

static ITEM_TEMPLATES_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "SELECT it.id, it.project_id, it.slug, it.name, {fields} AS fields \
         FROM item_templates it WHERE it.project_id = $1 ORDER BY it.name, it.id",
        fields = fields_aggregate("item_fields", "it"),
    )
});

const ITEM_DATA_SQL: &str =
    "SELECT item_id, field_key, value FROM item_data WHERE item_id = ANY($1)";

#[derive(Debug, serde::Deserialize)]
struct ItemDataJson {
    item_id: Uuid,
    field_key: String,
    #[serde(default)]
    value: Value,
}

#[derive(sqlx::FromRow)]
struct ItemBundleRow {
    id: Uuid,
    project_id: Uuid,
    template_id: Uuid,
    name: String,
    slug: String,
    language_code: Option<String>,
    base_item_id: Option<Uuid>,
    tpl_id: Option<Uuid>,
    tpl_project_id: Option<Uuid>,
    tpl_slug: Option<String>,
    tpl_name: Option<String>,
    tpl_fields: Option<Value>,
    data: Option<Value>,
}

impl ItemBundleRow {
    fn into_bundle(self) -> Result<ItemBundle, RepoError> {
        let template = match self.tpl_id {
            Some(id) => Some(ItemTemplateRecord {
                id,
                project_id: self.tpl_project_id.unwrap_or(self.project_id),
                slug: self.tpl_slug.unwrap_or_default(),
                name: self.tpl_name.unwrap_or_default(),
                fields: decode_fields(self.tpl_fields.unwrap_or(Value::Null))?,
            }),
            None => None,
        };
        let data = super::util::decode_aggregate::<ItemDataJson>(
            "data",
            self.data.unwrap_or(Value::Null),
        )?
        .into_iter()
        .map(|row| ItemDataRecord {
            item_id: row.item_id,
            field_key: row.field_key,
            value: row.value,
        })
        .collect();

        Ok(ItemBundle {
            item: ItemRecord {
                id: self.id,
                project_id: self.project_id,
                template_id: self.template_id,
                name: self.name,
                slug: self.slug,
                language_code: self.language_code,
                base_item_id: self.base_item_id,
            },
            template,
            data,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LinkedItemDbRow {
    link_section_id: Uuid,
    link_field_id: Uuid,
    link_order: i32,
    #[sqlx(flatten)]
    bundle: ItemBundleRow,
}

#[derive(sqlx::FromRow)]
struct ItemDataRow {
    item_id: Uuid,
    field_key: String,
    value: Option<Value>,
}

#[derive(sqlx::FromRow)]
struct ItemTemplateRow {
    id: Uuid,
    project_id: Uuid,
    slug: String,
    name: String,
    fields: Option<Value>,
}

fn into_bundles(rows: Vec<ItemBundleRow>) -> Result<Vec<ItemBundle>, RepoError> {
    rows.into_iter().map(ItemBundleRow::into_bundle).collect()
}

impl PostgresRepositories {
    pub(super) async fn linked_items(&self, section_ids: &[Uuid]) -> Result<Vec<LinkedItemRow>, RepoError> {
        if section_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, LinkedItemDbRow>(LINKED_ITEMS_SQL.as_str())
            .bind(section_ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter()
            .map(|row| -> Result<LinkedItemRow, RepoError> {
                Ok(LinkedItemRow {
                    section_id: row.link_section_id,
                    field_id: row.link_field_id,
                    order_index: row.link_order,
                    bundle: row.bundle.into_bundle()?,
                })
            })
            .collect()
    }

    pub(super) async fn item_family(
        &self,
        family_ids: &[Uuid],
        languages: &[String],
    ) -> Result<Vec<ItemBundle>, RepoError> {
        if family_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ItemBundleRow>(FAMILY_SQL.as_str())
            .bind(family_ids)
            .bind(lowered(languages))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        into_bundles(rows)
    }

    pub(super) async fn item_data(&self, item_ids: &[Uuid]) -> Result<Vec<ItemDataRecord>, RepoError> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ItemDataRow>(ITEM_DATA_SQL)
            .bind(item_ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows
            .into_iter()
            .map(|row| ItemDataRecord {
                item_id: row.item_id,
                field_key: row.field_key,
                value: row.value.unwrap_or(Value::Null),
            })
            .collect())
    }

    pub(super) async fn item_by_id(&self, id: Uuid) -> Result<Option<ItemBundle>, RepoError> {
        let row = sqlx::query_as::<_, ItemBundleRow>(ITEM_BY_ID_SQL.as_str())
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(ItemBundleRow::into_bundle).transpose()
    }

    pub(super) async fn item_by_slug(
        &self,
        project_id: Uuid,
        slug: &str,
        languages: &[String],
    ) -> Result<Option<ItemBundle>, RepoError> {
        let row = sqlx::query_as::<_, ItemBundleRow>(ITEM_BY_SLUG_SQL.as_str())
            .bind(project_id)
            .bind(slug)
            .bind(lowered(languages))
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(ItemBundleRow::into_bundle).transpose()
    }

    pub(super) async fn items_of_template(
        &self,
        template_id: Uuid,
        languages: &[String],
    ) -> Result<Vec<ItemBundle>, RepoError> {
        let rows = sqlx::query_as::<_, ItemBundleRow>(ITEMS_OF_TEMPLATE_SQL.as_str())
            .bind(template_id)
            .bind(lowered(languages))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        into_bundles(rows)
    }

    pub(super) async fn item_templates(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ItemTemplateRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ItemTemplateRow>(ITEM_TEMPLATES_SQL.as_str())
            .bind(project_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        rows.into_iter()
            .map(|row| -> Result<ItemTemplateRecord, RepoError> {
                Ok(ItemTemplateRecord {
                    id: row.id,
                    project_id: row.project_id,
                    slug: row.slug,
                    name: row.name,
                    fields: decode_fields(row.fields.unwrap_or(Value::Null))?,
                })
            })
            .collect()
    }
}
