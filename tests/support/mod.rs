//! In-memory content store for integration tests.
//!
//! Every trait call counts as one query so tests can assert the resolver's
//! round-trip budget.

#![allow(dead_code)]

use std::io;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use lectern::application::repos::{ContentRepo, RepoError};
use lectern::application::resolver::{ContentResolver, ResolverSettings};
use lectern::application::router::QueryRouter;
use lectern::domain::entities::{
    FieldRecord, ItemBundle, ItemDataRecord, ItemRecord, ItemTemplateRecord, LinkedItemRow,
    PageRecord, PageSectionJoin, PageSectionRecord, ProjectRecord, SectionDataRecord,
    SectionJoin, SectionRecord, SectionTemplateRecord,
};
use lectern::domain::types::FieldType;
use serde_json::Value;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Link {
    pub section_id: Uuid,
    pub field_id: Uuid,
    pub item_id: Uuid,
    pub order_index: i32,
}

/// Content rows backing [`InMemoryRepo`], with builders for common shapes.
#[derive(Debug, Default, Clone)]
pub struct Fixture {
    pub projects: Vec<ProjectRecord>,
    pub pages: Vec<PageRecord>,
    pub page_sections: Vec<PageSectionRecord>,
    pub sections: Vec<SectionRecord>,
    pub templates: Vec<SectionTemplateRecord>,
    pub section_data: Vec<SectionDataRecord>,
    pub item_templates: Vec<ItemTemplateRecord>,
    pub items: Vec<ItemRecord>,
    pub item_data: Vec<ItemDataRecord>,
    pub links: Vec<Link>,
}

fn fields(template_id: Uuid, specs: &[(&str, FieldType)]) -> Vec<FieldRecord> {
    specs
        .iter()
        .enumerate()
        .map(|(index, (key, field_type))| FieldRecord {
            id: Uuid::new_v4(),
            template_id,
            key: key.to_string(),
            field_type: field_type.clone(),
            is_required: false,
            is_translatable: true,
            order_index: index as i32,
        })
        .collect()
}

impl Fixture {
    /// Fixture with an active `default` project in English and French.
    pub fn with_default_project() -> (Self, ProjectRecord) {
        let mut fixture = Self::default();
        let project = fixture.project("default", "en", &["en", "fr"]);
        (fixture, project)
    }

    pub fn project(&mut self, slug: &str, default_language: &str, languages: &[&str]) -> ProjectRecord {
        let project = ProjectRecord {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            supported_languages: languages.iter().map(|l| l.to_string()).collect(),
            default_language: default_language.to_string(),
            is_active: true,
        };
        self.projects.push(project.clone());
        project
    }

    pub fn deactivate(&mut self, project: &ProjectRecord) {
        for stored in self.projects.iter_mut().filter(|p| p.id == project.id) {
            stored.is_active = false;
        }
    }

    pub fn page(&mut self, project: &ProjectRecord, slug: &str, language: &str) -> PageRecord {
        let page = PageRecord {
            id: Uuid::new_v4(),
            project_id: project.id,
            parent_id: None,
            language_code: language.to_string(),
            slug: slug.to_string(),
            title: format!("{slug} ({language})"),
            is_published: true,
            show_in_navigation: true,
            navigation_order: self.pages.len() as i32,
        };
        self.pages.push(page.clone());
        page
    }

    pub fn template(&mut self, slug: &str, specs: &[(&str, FieldType)]) -> SectionTemplateRecord {
        let id = Uuid::new_v4();
        let template = SectionTemplateRecord {
            id,
            slug: slug.to_string(),
            component_type: slug.to_string(),
            is_reusable: false,
            language_code: None,
            fields: fields(id, specs),
        };
        self.templates.push(template.clone());
        template
    }

    pub fn section(&mut self, template: &SectionTemplateRecord, name: &str) -> SectionRecord {
        let section = SectionRecord {
            id: Uuid::new_v4(),
            template_id: template.id,
            name: Some(name.to_string()),
            slug: Some(name.to_lowercase()),
            language_code: None,
        };
        self.sections.push(section.clone());
        section
    }

    /// Places `section_id` on `page` at `order`; the section need not exist.
    pub fn place(&mut self, page: &PageRecord, section_id: Uuid, order: i32) -> PageSectionRecord {
        let placed = PageSectionRecord {
            id: Uuid::new_v4(),
            page_id: page.id,
            section_id,
            template_id: None,
            order_index: order,
            display_name: None,
        };
        self.page_sections.push(placed.clone());
        placed
    }

    pub fn section_value(
        &mut self,
        section: &SectionRecord,
        key: &str,
        language: Option<&str>,
        value: Value,
    ) {
        self.section_data.push(SectionDataRecord {
            section_id: section.id,
            field_key: key.to_string(),
            language_code: language.map(str::to_string),
            value,
        });
    }

    pub fn item_template(
        &mut self,
        project: &ProjectRecord,
        slug: &str,
        specs: &[(&str, FieldType)],
    ) -> ItemTemplateRecord {
        let id = Uuid::new_v4();
        let template = ItemTemplateRecord {
            id,
            project_id: project.id,
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            fields: fields(id, specs),
        };
        self.item_templates.push(template.clone());
        template
    }

    pub fn item(
        &mut self,
        template: &ItemTemplateRecord,
        slug: &str,
        language: &str,
        base: Option<&ItemRecord>,
    ) -> ItemRecord {
        let item = ItemRecord {
            id: Uuid::new_v4(),
            project_id: template.project_id,
            template_id: template.id,
            name: format!("{slug} ({language})"),
            slug: slug.to_string(),
            language_code: Some(language.to_string()),
            base_item_id: base.map(|base| base.id),
        };
        self.items.push(item.clone());
        item
    }

    pub fn item_value(&mut self, item: &ItemRecord, key: &str, value: Value) {
        self.item_data.push(ItemDataRecord {
            item_id: item.id,
            field_key: key.to_string(),
            value,
        });
    }

    pub fn link(&mut self, section: &SectionRecord, field: &FieldRecord, item: &ItemRecord, order: i32) {
        self.links.push(Link {
            section_id: section.id,
            field_id: field.id,
            item_id: item.id,
            order_index: order,
        });
    }

    fn bundle(&self, item: &ItemRecord) -> ItemBundle {
        ItemBundle {
            item: item.clone(),
            template: self
                .item_templates
                .iter()
                .find(|template| template.id == item.template_id)
                .cloned(),
            data: self
                .item_data
                .iter()
                .filter(|row| row.item_id == item.id)
                .cloned()
                .collect(),
        }
    }
}

fn language_in(language: Option<&str>, languages: &[String]) -> bool {
    match language {
        None => true,
        Some(language) => languages
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(language)),
    }
}

pub struct InMemoryRepo {
    fixture: Fixture,
    queries: AtomicUsize,
}

impl InMemoryRepo {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.queries.store(0, Ordering::SeqCst);
    }

    fn count(&self) -> &Fixture {
        self.queries.fetch_add(1, Ordering::SeqCst);
        &self.fixture
    }
}

#[async_trait]
impl ContentRepo for InMemoryRepo {
    async fn find_project_by_id(&self, id: Uuid) -> Result<Option<ProjectRecord>, RepoError> {
        Ok(self
            .count()
            .projects
            .iter()
            .find(|p| p.id == id && p.is_active)
            .cloned())
    }

    async fn find_project_by_slug(&self, slug: &str) -> Result<Option<ProjectRecord>, RepoError> {
        Ok(self
            .count()
            .projects
            .iter()
            .find(|p| p.slug == slug && p.is_active)
            .cloned())
    }

    async fn find_page_by_id(&self, id: Uuid) -> Result<Option<PageRecord>, RepoError> {
        Ok(self.count().pages.iter().find(|p| p.id == id).cloned())
    }

    async fn find_published_page(
        &self,
        project_id: Uuid,
        slug: &str,
        languages: &[String],
    ) -> Result<Option<PageRecord>, RepoError> {
        let fixture = self.count();
        Ok(languages.iter().find_map(|language| {
            fixture
                .pages
                .iter()
                .find(|p| {
                    p.project_id == project_id
                        && p.slug == slug
                        && p.is_published
                        && p.language_code.eq_ignore_ascii_case(language)
                })
                .cloned()
        }))
    }

    async fn list_published_pages(
        &self,
        project_id: Uuid,
        language: &str,
    ) -> Result<Vec<PageRecord>, RepoError> {
        let mut pages: Vec<PageRecord> = self
            .count()
            .pages
            .iter()
            .filter(|p| {
                p.project_id == project_id
                    && p.is_published
                    && p.language_code.eq_ignore_ascii_case(language)
            })
            .cloned()
            .collect();
        pages.sort_by_key(|p| p.navigation_order);
        Ok(pages)
    }

    async fn list_page_sections(&self, page_id: Uuid) -> Result<Vec<PageSectionJoin>, RepoError> {
        let fixture = self.count();
        let mut joins: Vec<PageSectionJoin> = fixture
            .page_sections
            .iter()
            .filter(|ps| ps.page_id == page_id)
            .map(|ps| {
                let section = fixture.sections.iter().find(|s| s.id == ps.section_id).cloned();
                let template_id = ps
                    .template_id
                    .or_else(|| section.as_ref().map(|s| s.template_id));
                let template = template_id
                    .and_then(|id| fixture.templates.iter().find(|t| t.id == id))
                    .cloned();
                PageSectionJoin {
                    page_section: ps.clone(),
                    section,
                    template,
                }
            })
            .collect();
        joins.sort_by_key(|join| join.page_section.order_index);
        Ok(joins)
    }

    async fn find_section(&self, section_id: Uuid) -> Result<Option<SectionJoin>, RepoError> {
        let fixture = self.count();
        let Some(section) = fixture.sections.iter().find(|s| s.id == section_id) else {
            return Ok(None);
        };
        Ok(fixture
            .templates
            .iter()
            .find(|t| t.id == section.template_id)
            .map(|template| SectionJoin {
                section: section.clone(),
                template: template.clone(),
            }))
    }

    async fn list_section_data(
        &self,
        section_ids: &[Uuid],
        languages: &[String],
    ) -> Result<Vec<SectionDataRecord>, RepoError> {
        Ok(self
            .count()
            .section_data
            .iter()
            .filter(|row| {
                section_ids.contains(&row.section_id)
                    && language_in(row.language_code.as_deref(), languages)
            })
            .cloned()
            .collect())
    }

    async fn list_linked_items(&self, section_ids: &[Uuid]) -> Result<Vec<LinkedItemRow>, RepoError> {
        let fixture = self.count();
        Ok(fixture
            .links
            .iter()
            .filter(|link| section_ids.contains(&link.section_id))
            .filter_map(|link| {
                let item = fixture.items.iter().find(|item| item.id == link.item_id)?;
                Some(LinkedItemRow {
                    section_id: link.section_id,
                    field_id: link.field_id,
                    order_index: link.order_index,
                    bundle: fixture.bundle(item),
                })
            })
            .collect())
    }

    async fn list_item_family(
        &self,
        family_ids: &[Uuid],
        languages: &[String],
    ) -> Result<Vec<ItemBundle>, RepoError> {
        let fixture = self.count();
        Ok(fixture
            .items
            .iter()
            .filter(|item| {
                family_ids.contains(&item.family_id())
                    && language_in(item.language_code.as_deref(), languages)
            })
            .map(|item| fixture.bundle(item))
            .collect())
    }

    async fn list_item_data(&self, item_ids: &[Uuid]) -> Result<Vec<ItemDataRecord>, RepoError> {
        Ok(self
            .count()
            .item_data
            .iter()
            .filter(|row| item_ids.contains(&row.item_id))
            .cloned()
            .collect())
    }

    async fn find_item_by_id(&self, id: Uuid) -> Result<Option<ItemBundle>, RepoError> {
        let fixture = self.count();
        Ok(fixture
            .items
            .iter()
            .find(|item| item.id == id)
            .map(|item| fixture.bundle(item)))
    }

    async fn find_item_by_slug(
        &self,
        project_id: Uuid,
        slug: &str,
        languages: &[String],
    ) -> Result<Option<ItemBundle>, RepoError> {
        let fixture = self.count();
        Ok(languages.iter().find_map(|language| {
            fixture
                .items
                .iter()
                .find(|item| {
                    item.project_id == project_id
                        && item.slug == slug
                        && item
                            .language_code
                            .as_deref()
                            .is_some_and(|code| code.eq_ignore_ascii_case(language))
                })
                .map(|item| fixture.bundle(item))
        }))
    }

    async fn list_items(
        &self,
        template_id: Uuid,
        languages: &[String],
    ) -> Result<Vec<ItemBundle>, RepoError> {
        let fixture = self.count();
        Ok(fixture
            .items
            .iter()
            .filter(|item| {
                item.template_id == template_id
                    && language_in(item.language_code.as_deref(), languages)
            })
            .map(|item| fixture.bundle(item))
            .collect())
    }

    async fn list_section_templates(
        &self,
        language: Option<&str>,
    ) -> Result<Vec<SectionTemplateRecord>, RepoError> {
        Ok(self
            .count()
            .templates
            .iter()
            .filter(|t| match (language, t.language_code.as_deref()) {
                (Some(language), Some(code)) => code.eq_ignore_ascii_case(language),
                _ => true,
            })
            .cloned()
            .collect())
    }

    async fn list_fields(&self, template_id: Uuid) -> Result<Vec<FieldRecord>, RepoError> {
        Ok(self
            .count()
            .templates
            .iter()
            .find(|t| t.id == template_id)
            .map(|t| t.fields.clone())
            .unwrap_or_default())
    }

    async fn list_item_templates(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ItemTemplateRecord>, RepoError> {
        Ok(self
            .count()
            .item_templates
            .iter()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect())
    }
}

/// Router over `fixture` with default resolver settings, plus the repo for query counts.
pub fn router(fixture: Fixture) -> (QueryRouter, Arc<InMemoryRepo>) {
    let repo = Arc::new(InMemoryRepo::new(fixture));
    let resolver = ContentResolver::new(repo.clone(), ResolverSettings::default());
    (QueryRouter::new(resolver), repo)
}

/// Formatted `WARN` and above output of the current thread, kept for assertions.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Installs a thread-local subscriber writing into the capture until the guard drops.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_target(true)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        let buffer = self.0.lock().unwrap();
        String::from_utf8_lossy(&buffer)
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
