//! Item resolution: translation selection, base-item inheritance and flattening.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{ContentResolver, EntityRef};
use crate::application::error::ResolveError;
use crate::domain::entities::{ItemBundle, ItemDataRecord, ProjectRecord};
use crate::domain::fields::{ItemSummary, LinkedItem, passthrough, process_value};
use crate::domain::locale::LocaleChain;

impl ContentResolver {
    /// Linked items of `section_ids`, grouped by (section id, field id) and ordered.
    ///
    /// Issues at most three queries: junction rows, translations, base data.
    pub(super) async fn linked_items(
        &self,
        section_ids: &[Uuid],
        chain: &LocaleChain,
    ) -> Result<HashMap<(Uuid, Uuid), Vec<LinkedItem>>, ResolveError> {
        let mut rows = self.repo.list_linked_items(section_ids).await?;
        if rows.is_empty() {
            return Ok(HashMap::new());
        }
        rows.sort_by_key(|row| row.order_index);

        let mut seen = HashSet::new();
        let families: Vec<Uuid> = rows
            .iter()
            .filter(|row| chain.rank(row.bundle.item.language_code.as_deref()) != Some(0))
            .map(|row| row.bundle.item.family_id())
            .filter(|id| seen.insert(*id))
            .collect();
        let translations = if families.is_empty() {
            Vec::new()
        } else {
            self.repo.list_item_family(&families, chain.languages()).await?
        };

        let mut slots = Vec::with_capacity(rows.len());
        let mut bundles = Vec::with_capacity(rows.len());
        for row in rows {
            let bundle = pick_translation(row.bundle, &translations, chain);
            slots.push((row.section_id, row.field_id));
            bundles.push(bundle);
        }

        let items = self.flatten_items(bundles).await?;
        let mut grouped: HashMap<(Uuid, Uuid), Vec<LinkedItem>> = HashMap::new();
        for (slot, item) in slots.into_iter().zip(items) {
            grouped.entry(slot).or_default().push(item);
        }
        Ok(grouped)
    }

    /// Finds an item by id or slug in the best language of `chain`.
    pub(super) async fn locate_item(
        &self,
        project: &ProjectRecord,
        item: &EntityRef,
        chain: &LocaleChain,
    ) -> Result<Option<LinkedItem>, ResolveError> {
        let bundle = match item {
            EntityRef::Id(id) => {
                let Some(bundle) = self.repo.find_item_by_id(*id).await? else {
                    return Ok(None);
                };
                if chain.rank(bundle.item.language_code.as_deref()) == Some(0) {
                    bundle
                } else {
                    let family = self
                        .repo
                        .list_item_family(&[bundle.item.family_id()], chain.languages())
                        .await?;
                    pick_translation(bundle, &family, chain)
                }
            }
            EntityRef::Slug(slug) => {
                let found = self
                    .repo
                    .find_item_by_slug(project.id, slug, chain.languages())
                    .await?;
                match found {
                    Some(bundle) => bundle,
                    None => return Ok(None),
                }
            }
        };

        let mut items = self.flatten_items(vec![bundle]).await?;
        Ok(items.pop())
    }

    /// Flattens bundles in order, splicing in base-item data for fields a
    /// translation does not define. Base data for all bundles is fetched in one query.
    pub(super) async fn flatten_items(
        &self,
        bundles: Vec<ItemBundle>,
    ) -> Result<Vec<LinkedItem>, ResolveError> {
        let mut seen = HashSet::new();
        let base_ids: Vec<Uuid> = bundles
            .iter()
            .filter(|bundle| needs_base_data(bundle))
            .filter_map(|bundle| bundle.item.base_item_id)
            .filter(|id| seen.insert(*id))
            .collect();

        let mut inherited: HashMap<Uuid, Vec<ItemDataRecord>> = HashMap::new();
        if !base_ids.is_empty() {
            for row in self.repo.list_item_data(&base_ids).await? {
                inherited.entry(row.item_id).or_default().push(row);
            }
        }

        Ok(bundles
            .into_iter()
            .map(|bundle| {
                let base = bundle
                    .item
                    .base_item_id
                    .and_then(|id| inherited.get(&id))
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                self.flatten(bundle, base)
            })
            .collect())
    }

    fn flatten(&self, bundle: ItemBundle, base: &[ItemDataRecord]) -> LinkedItem {
        let policy = self.settings.boolean_policy;
        let mut raw: BTreeMap<String, Value> = bundle
            .data
            .into_iter()
            .filter(|row| !row.value.is_null())
            .map(|row| (row.field_key, row.value))
            .collect();
        for row in base {
            if !raw.contains_key(&row.field_key) && !row.value.is_null() {
                raw.insert(row.field_key.clone(), row.value.clone());
            }
        }

        let template = bundle.template.as_ref();
        let mut data = BTreeMap::new();
        for (key, value) in raw {
            let processed = match template {
                Some(template) => match template.fields.iter().find(|field| field.key == key) {
                    Some(field) => process_value(&value, &field.field_type, policy),
                    None => {
                        debug!(
                            target = "lectern::application::resolver",
                            item_id = %bundle.item.id,
                            field_key = %key,
                            "ignoring item data for a key outside the item template"
                        );
                        continue;
                    }
                },
                None => passthrough(&value),
            };
            data.insert(key, processed);
        }

        LinkedItem {
            item: ItemSummary {
                id: bundle.item.id,
                name: bundle.item.name,
                slug: bundle.item.slug,
                language: bundle.item.language_code,
                template_slug: bundle.template.map(|template| template.slug),
                base_item_id: bundle.item.base_item_id,
            },
            data,
        }
    }
}

/// A translation needs its base item's data when it is missing any field.
fn needs_base_data(bundle: &ItemBundle) -> bool {
    if bundle.item.base_item_id.is_none() {
        return false;
    }
    let own: HashSet<&str> = bundle
        .data
        .iter()
        .filter(|row| !row.value.is_null())
        .map(|row| row.field_key.as_str())
        .collect();
    match &bundle.template {
        Some(template) if !own.is_empty() => template
            .fields
            .iter()
            .any(|field| !own.contains(field.key.as_str())),
        _ => true,
    }
}

/// Best member of `current`'s family in `chain`; `current` when nothing ranks.
fn pick_translation(current: ItemBundle, family: &[ItemBundle], chain: &LocaleChain) -> ItemBundle {
    let family_id = current.item.family_id();
    let candidates = std::iter::once(&current).chain(
        family
            .iter()
            .filter(|candidate| candidate.item.family_id() == family_id),
    );
    let best = chain
        .pick_best(candidates, |bundle| bundle.item.language_code.as_deref())
        .map(|best| best.item.id);
    match best {
        Some(id) if id != current.item.id => family
            .iter()
            .find(|candidate| candidate.item.id == id)
            .cloned()
            .unwrap_or(current),
        _ => current,
    }
}

/// Collapses a list of items to the best translation per family, keeping the
/// position of each family's first appearance.
pub(super) fn best_per_family(bundles: Vec<ItemBundle>, chain: &LocaleChain) -> Vec<ItemBundle> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut best: HashMap<Uuid, (usize, ItemBundle)> = HashMap::new();
    for bundle in bundles {
        let Some(rank) = chain.rank(bundle.item.language_code.as_deref()) else {
            continue;
        };
        let family = bundle.item.family_id();
        match best.get(&family) {
            Some((current, _)) if *current <= rank => {}
            Some(_) => {
                best.insert(family, (rank, bundle));
            }
            None => {
                order.push(family);
                best.insert(family, (rank, bundle));
            }
        }
    }
    order
        .into_iter()
        .filter_map(|family| best.remove(&family).map(|(_, bundle)| bundle))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::entities::{FieldRecord, ItemRecord, ItemTemplateRecord};
    use crate::domain::types::FieldType;

    fn bundle(id: Uuid, base: Option<Uuid>, language: &str, data: &[(&str, Value)]) -> ItemBundle {
        ItemBundle {
            item: ItemRecord {
                id,
                project_id: Uuid::nil(),
                template_id: Uuid::nil(),
                name: format!("item-{language}"),
                slug: "item".to_string(),
                language_code: Some(language.to_string()),
                base_item_id: base,
            },
            template: Some(ItemTemplateRecord {
                id: Uuid::nil(),
                project_id: Uuid::nil(),
                slug: "article".to_string(),
                name: "Article".to_string(),
                fields: vec![FieldRecord {
                    id: Uuid::new_v4(),
                    template_id: Uuid::nil(),
                    key: "title".to_string(),
                    field_type: FieldType::Text,
                    is_required: true,
                    is_translatable: true,
                    order_index: 0,
                }],
            }),
            data: data
                .iter()
                .map(|(key, value)| ItemDataRecord {
                    item_id: id,
                    field_key: key.to_string(),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    #[test]
    fn translation_without_data_needs_base() {
        let base = Uuid::new_v4();
        assert!(needs_base_data(&bundle(Uuid::new_v4(), Some(base), "fr", &[])));
        assert!(!needs_base_data(&bundle(
            Uuid::new_v4(),
            Some(base),
            "fr",
            &[("title", json!("Bonjour"))]
        )));
        assert!(!needs_base_data(&bundle(base, None, "en", &[])));
    }

    #[test]
    fn pick_translation_prefers_requested_language() {
        let base_id = Uuid::new_v4();
        let base = bundle(base_id, None, "en", &[("title", json!("Hello"))]);
        let fr = bundle(Uuid::new_v4(), Some(base_id), "fr", &[]);
        let de = bundle(Uuid::new_v4(), Some(base_id), "de", &[]);
        let chain = LocaleChain::new("fr", "en");

        let picked = pick_translation(base, &[de, fr.clone()], &chain);
        assert_eq!(picked.item.id, fr.item.id);
    }

    #[test]
    fn best_per_family_keeps_first_position() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let chain = LocaleChain::new("fr", "en");
        let rows = vec![
            bundle(a, None, "en", &[]),
            bundle(b, None, "en", &[]),
            bundle(Uuid::new_v4(), Some(a), "fr", &[]),
        ];

        let picked = best_per_family(rows, &chain);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].item.family_id(), a);
        assert_eq!(picked[0].item.language_code.as_deref(), Some("fr"));
        assert_eq!(picked[1].item.id, b);
    }
}
