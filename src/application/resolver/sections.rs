//! Section assembly: join filtering, data selection and typed merging.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use super::ContentResolver;
use super::shape::SectionContent;
use crate::application::error::ResolveError;
use crate::domain::entities::{
    PageRecord, PageSectionJoin, PageSectionRecord, SectionDataRecord, SectionRecord,
    SectionTemplateRecord,
};
use crate::domain::fields::{FieldValue, ItemEntry, LinkedItem, process_value};
use crate::domain::locale::LocaleChain;

/// A page section whose section and template both resolved.
#[derive(Debug)]
pub(super) struct PlacedSection {
    pub page_section: PageSectionRecord,
    pub section: SectionRecord,
    pub template: SectionTemplateRecord,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct SectionRef<'a> {
    pub section: &'a SectionRecord,
    pub template: &'a SectionTemplateRecord,
}

/// Drops joins whose section or template is missing, logging each one.
pub(super) fn retain_resolvable(page: &PageRecord, joins: Vec<PageSectionJoin>) -> Vec<PlacedSection> {
    let mut placed: Vec<PlacedSection> = joins
        .into_iter()
        .filter_map(|join| match (join.section, join.template) {
            (Some(section), Some(template)) => Some(PlacedSection {
                page_section: join.page_section,
                section,
                template,
            }),
            (section, _) => {
                warn!(
                    target = "lectern::application::resolver",
                    page_id = %page.id,
                    page_section_id = %join.page_section.id,
                    section_id = %join.page_section.section_id,
                    missing = if section.is_none() { "section" } else { "template" },
                    "dropping page section with a dangling reference"
                );
                None
            }
        })
        .collect();
    placed.sort_by_key(|placed| placed.page_section.order_index);
    placed
}

/// Best value per field key, with the rank of the language it came from.
type RankedValues = HashMap<String, (usize, Value)>;

/// Keeps, per (section, key), the row whose language ranks best in `chain`.
fn select_rows(rows: Vec<SectionDataRecord>, chain: &LocaleChain) -> HashMap<Uuid, RankedValues> {
    let mut selected: HashMap<Uuid, RankedValues> = HashMap::new();
    for row in rows {
        let Some(rank) = chain.rank(row.language_code.as_deref()) else {
            continue;
        };
        let values = selected.entry(row.section_id).or_default();
        match values.get(&row.field_key) {
            Some((current, _)) if *current <= rank => {}
            _ => {
                values.insert(row.field_key, (rank, row.value));
            }
        }
    }
    selected
}

impl ContentResolver {
    /// Loads and types the content of every referenced section.
    ///
    /// Section data and linked items are fetched concurrently: one query for the
    /// data of all sections, at most three for linked items.
    pub(super) async fn assemble_content(
        &self,
        sections: &[SectionRef<'_>],
        chain: &LocaleChain,
    ) -> Result<HashMap<Uuid, SectionContent>, ResolveError> {
        let mut seen = HashSet::new();
        let section_ids: Vec<Uuid> = sections
            .iter()
            .map(|entry| entry.section.id)
            .filter(|id| seen.insert(*id))
            .collect();
        if section_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let needs_items = sections
            .iter()
            .any(|entry| entry.template.has_linked_items());

        let data = async {
            self.repo
                .list_section_data(&section_ids, chain.languages())
                .await
                .map_err(ResolveError::from)
        };
        let linked = async {
            if needs_items {
                self.linked_items(&section_ids, chain).await
            } else {
                Ok(HashMap::new())
            }
        };
        let (rows, mut linked) = tokio::try_join!(data, linked)?;
        let mut selected = select_rows(rows, chain);

        let mut contents = HashMap::with_capacity(section_ids.len());
        for entry in sections {
            if contents.contains_key(&entry.section.id) {
                continue;
            }
            let values = selected.remove(&entry.section.id).unwrap_or_default();
            let content = self.merge_section(*entry, values, &mut linked);
            contents.insert(entry.section.id, content);
        }
        Ok(contents)
    }

    fn merge_section(
        &self,
        entry: SectionRef<'_>,
        values: RankedValues,
        linked: &mut HashMap<(Uuid, Uuid), Vec<LinkedItem>>,
    ) -> SectionContent {
        let policy = self.settings.boolean_policy;
        let mut content = SectionContent::new();

        for (key, (_, value)) in values {
            let Some(field) = entry.template.field(&key) else {
                warn!(
                    target = "lectern::application::resolver",
                    section_id = %entry.section.id,
                    template = %entry.template.slug,
                    field_key = %key,
                    "ignoring orphaned section data"
                );
                continue;
            };
            content.insert(key, process_value(&value, &field.field_type, policy));
        }

        for field in entry
            .template
            .fields
            .iter()
            .filter(|field| field.field_type.is_linked_items())
        {
            match linked.remove(&(entry.section.id, field.id)) {
                Some(items) => {
                    let entries = items.into_iter().map(ItemEntry::Resolved).collect();
                    content.insert(field.key.clone(), FieldValue::Items(entries));
                }
                None => {
                    content
                        .entry(field.key.clone())
                        .or_insert_with(FieldValue::empty_items);
                }
            }
        }

        content
    }
}
