//! Client-facing shapes produced by the resolver.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::entities::{PageRecord, SectionRecord, SectionTemplateRecord};
use crate::domain::fields::{FieldValue, LinkedItem};

pub type SectionContent = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSummary {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub language: String,
}

impl From<&PageRecord> for PageSummary {
    fn from(page: &PageRecord) -> Self {
        Self {
            id: page.id,
            title: page.title.clone(),
            slug: page.slug.clone(),
            language: page.language_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub template_slug: String,
    pub component_type: String,
}

impl SectionSummary {
    pub fn new(section: &SectionRecord, template: &SectionTemplateRecord) -> Self {
        Self {
            id: section.id,
            name: section.name.clone(),
            slug: section.slug.clone(),
            template_slug: template.slug.clone(),
            component_type: template.component_type.clone(),
        }
    }
}

/// One page section: position, optional display override and typed content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSection {
    pub id: Uuid,
    pub order: i32,
    /// Display-name override from the page section, falling back to the section name.
    pub name: Option<String>,
    pub section: SectionSummary,
    pub content: SectionContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPage {
    pub page: PageSummary,
    pub sections: Vec<ResolvedSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPageWithArticle {
    #[serde(flatten)]
    pub page: ResolvedPage,
    pub article: LinkedItem,
}

/// A section requested on its own, outside any page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandaloneSection {
    pub section: SectionSummary,
    pub language: String,
    pub content: SectionContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectLanguages {
    pub default_language: String,
    pub supported_languages: Vec<String>,
}
