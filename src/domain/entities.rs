//! Read-model entities mirrored from the content store.
//!
//! Everything here is owned by the authoring system; this crate only reads it.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::types::FieldType;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub supported_languages: Vec<String>,
    pub default_language: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub language_code: String,
    pub slug: String,
    pub title: String,
    pub is_published: bool,
    pub show_in_navigation: bool,
    pub navigation_order: i32,
}

/// Join row attaching a section to a page at a given position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSectionRecord {
    pub id: Uuid,
    pub page_id: Uuid,
    pub section_id: Uuid,
    pub template_id: Option<Uuid>,
    pub order_index: i32,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRecord {
    pub id: Uuid,
    pub template_id: Uuid,
    pub key: String,
    pub field_type: FieldType,
    pub is_required: bool,
    pub is_translatable: bool,
    pub order_index: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionTemplateRecord {
    pub id: Uuid,
    pub slug: String,
    pub component_type: String,
    pub is_reusable: bool,
    /// `None` marks a template shared across languages.
    pub language_code: Option<String>,
    pub fields: Vec<FieldRecord>,
}

impl SectionTemplateRecord {
    pub fn field(&self, key: &str) -> Option<&FieldRecord> {
        self.fields.iter().find(|field| field.key == key)
    }

    pub fn has_linked_items(&self) -> bool {
        self.fields
            .iter()
            .any(|field| field.field_type.is_linked_items())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRecord {
    pub id: Uuid,
    pub template_id: Uuid,
    pub name: Option<String>,
    pub slug: Option<String>,
    /// `None` means the section's values are shared by every language.
    pub language_code: Option<String>,
}

/// A page section with its section, template and field definitions resolved in one pass.
///
/// `section` or `template` is `None` when the underlying reference dangles.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSectionJoin {
    pub page_section: PageSectionRecord,
    pub section: Option<SectionRecord>,
    pub template: Option<SectionTemplateRecord>,
}

/// A section together with its template, used when a section is requested on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionJoin {
    pub section: SectionRecord,
    pub template: SectionTemplateRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionDataRecord {
    pub section_id: Uuid,
    pub field_key: String,
    pub language_code: Option<String>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemTemplateRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub slug: String,
    pub name: String,
    pub fields: Vec<FieldRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    pub slug: String,
    pub language_code: Option<String>,
    /// Set on translations; always points at a base item, never at another translation.
    pub base_item_id: Option<Uuid>,
}

impl ItemRecord {
    /// Identifier of the base item this row belongs to (itself when it is a base item).
    pub fn family_id(&self) -> Uuid {
        self.base_item_id.unwrap_or(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDataRecord {
    pub item_id: Uuid,
    pub field_key: String,
    pub value: Value,
}

/// An item with its template and its own data rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemBundle {
    pub item: ItemRecord,
    pub template: Option<ItemTemplateRecord>,
    pub data: Vec<ItemDataRecord>,
}

/// Junction row linking an item to an items-typed field of a section.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedItemRow {
    pub section_id: Uuid,
    pub field_id: Uuid,
    pub order_index: i32,
    pub bundle: ItemBundle,
}
