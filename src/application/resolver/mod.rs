//! Content resolver: assembles pages, sections and items from the content store.
//!
//! The resolver owns no state between calls. Each entry point issues a bounded
//! number of [`ContentRepo`] calls regardless of how many sections, fields or
//! linked items are involved, then runs every raw value through the field
//! processor exactly once.

mod items;
mod sections;
pub mod shape;

use std::sync::Arc;

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::application::error::ResolveError;
use crate::application::repos::ContentRepo;
use crate::domain::entities::{
    FieldRecord, ItemTemplateRecord, PageRecord, ProjectRecord, SectionTemplateRecord,
};
use crate::domain::fields::LinkedItem;
use crate::domain::locale::LocaleChain;
use crate::domain::types::BooleanPolicy;

pub use self::shape::{
    PageSummary, ProjectLanguages, ResolvedPage, ResolvedPageWithArticle, ResolvedSection,
    SectionContent, SectionSummary, StandaloneSection,
};
use self::sections::SectionRef;

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Project used when a request does not name one.
    pub default_project_slug: String,
    pub boolean_policy: BooleanPolicy,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            default_project_slug: "default".to_string(),
            boolean_policy: BooleanPolicy::default(),
        }
    }
}

/// Reference to a page, item or article given either by id or by slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Id(Uuid),
    Slug(String),
}

impl EntityRef {
    /// UUID-shaped identifiers are ids; anything else is a slug.
    pub fn parse(identifier: &str) -> Self {
        let identifier = identifier.trim();
        match Uuid::parse_str(identifier) {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Slug(identifier.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct ContentResolver {
    repo: Arc<dyn ContentRepo>,
    settings: ResolverSettings,
}

impl ContentResolver {
    pub fn new(repo: Arc<dyn ContentRepo>, settings: ResolverSettings) -> Self {
        Self { repo, settings }
    }

    /// Loads the named project, or the default project when none is given.
    pub async fn project(&self, project_id: Option<Uuid>) -> Result<ProjectRecord, ResolveError> {
        let project = match project_id {
            Some(id) => self.repo.find_project_by_id(id).await?,
            None => {
                self.repo
                    .find_project_by_slug(&self.settings.default_project_slug)
                    .await?
            }
        };

        project.ok_or_else(|| {
            warn!(
                target = "lectern::application::resolver",
                project_id = ?project_id,
                default_slug = %self.settings.default_project_slug,
                "project could not be resolved"
            );
            ResolveError::not_found("Project")
        })
    }

    pub async fn languages(&self, project_id: Option<Uuid>) -> Result<ProjectLanguages, ResolveError> {
        let project = self.project(project_id).await?;
        Ok(ProjectLanguages {
            default_language: project.default_language,
            supported_languages: project.supported_languages,
        })
    }

    pub async fn pages(
        &self,
        project_id: Option<Uuid>,
        language: Option<&str>,
    ) -> Result<Vec<PageRecord>, ResolveError> {
        let project = self.project(project_id).await?;
        let language = language.unwrap_or(&project.default_language);
        Ok(self.repo.list_published_pages(project.id, language).await?)
    }

    /// Page metadata without content.
    pub async fn page(
        &self,
        project_id: Option<Uuid>,
        identifier: &str,
        language: Option<&str>,
    ) -> Result<Option<PageRecord>, ResolveError> {
        let project = self.project(project_id).await?;
        let chain = chain_for(&project, language);
        Ok(self
            .locate_page(&project, identifier, &chain)
            .await?
            .map(|(page, _)| page))
    }

    #[instrument(skip_all, fields(page = %identifier, language = ?language))]
    pub async fn page_with_full_content(
        &self,
        project_id: Option<Uuid>,
        identifier: &str,
        language: Option<&str>,
    ) -> Result<Option<ResolvedPage>, ResolveError> {
        let project = self.project(project_id).await?;
        let chain = chain_for(&project, language);
        let Some((page, chain)) = self.locate_page(&project, identifier, &chain).await? else {
            return Ok(None);
        };
        self.assemble_page(page, &chain).await.map(Some)
    }

    /// Full page plus one article item resolved with the same language rules.
    #[instrument(skip_all, fields(page = %identifier, language = ?language))]
    pub async fn page_with_article(
        &self,
        project_id: Option<Uuid>,
        identifier: &str,
        article: &EntityRef,
        language: Option<&str>,
    ) -> Result<Option<ResolvedPageWithArticle>, ResolveError> {
        let project = self.project(project_id).await?;
        let chain = chain_for(&project, language);
        let Some((page, page_chain)) = self.locate_page(&project, identifier, &chain).await? else {
            return Ok(None);
        };

        let (page, article) = tokio::try_join!(
            self.assemble_page(page, &page_chain),
            self.locate_item(&project, article, &chain),
        )?;
        let article = article.ok_or_else(|| ResolveError::not_found("Article"))?;

        Ok(Some(ResolvedPageWithArticle { page, article }))
    }

    #[instrument(skip_all, fields(section_id = %section_id, language = ?language))]
    pub async fn section(
        &self,
        project_id: Option<Uuid>,
        section_id: Uuid,
        language: Option<&str>,
    ) -> Result<Option<StandaloneSection>, ResolveError> {
        let project = self.project(project_id).await?;
        let Some(join) = self.repo.find_section(section_id).await? else {
            return Ok(None);
        };

        let requested = language
            .or(join.section.language_code.as_deref())
            .unwrap_or(&project.default_language);
        let chain = LocaleChain::new(requested, &project.default_language);
        let refs = [SectionRef {
            section: &join.section,
            template: &join.template,
        }];
        let mut contents = self.assemble_content(&refs, &chain).await?;

        Ok(Some(StandaloneSection {
            section: SectionSummary::new(&join.section, &join.template),
            language: chain.requested().to_string(),
            content: contents.remove(&join.section.id).unwrap_or_default(),
        }))
    }

    pub async fn section_templates(
        &self,
        language: Option<&str>,
    ) -> Result<Vec<SectionTemplateRecord>, ResolveError> {
        Ok(self.repo.list_section_templates(language).await?)
    }

    pub async fn fields(&self, template_id: Uuid) -> Result<Vec<FieldRecord>, ResolveError> {
        Ok(self.repo.list_fields(template_id).await?)
    }

    pub async fn item(
        &self,
        project_id: Option<Uuid>,
        item: &EntityRef,
        language: Option<&str>,
    ) -> Result<Option<LinkedItem>, ResolveError> {
        let project = self.project(project_id).await?;
        let chain = chain_for(&project, language);
        self.locate_item(&project, item, &chain).await
    }

    pub async fn items(
        &self,
        project_id: Option<Uuid>,
        template_id: Uuid,
        language: Option<&str>,
    ) -> Result<Vec<LinkedItem>, ResolveError> {
        let project = self.project(project_id).await?;
        let chain = chain_for(&project, language);
        let bundles = self.repo.list_items(template_id, chain.languages()).await?;
        let bundles = items::best_per_family(bundles, &chain);
        self.flatten_items(bundles).await
    }

    pub async fn item_templates(
        &self,
        project_id: Option<Uuid>,
    ) -> Result<Vec<ItemTemplateRecord>, ResolveError> {
        let project = self.project(project_id).await?;
        Ok(self.repo.list_item_templates(project.id).await?)
    }

    /// Finds a page by id, or by slug in the best language of the locale chain. Returns the page with
    /// the chain its content should be read in.
    async fn locate_page(
        &self,
        project: &ProjectRecord,
        identifier: &str,
        chain: &LocaleChain,
    ) -> Result<Option<(PageRecord, LocaleChain)>, ResolveError> {
        match EntityRef::parse(identifier) {
            EntityRef::Id(id) => {
                let Some(page) = self.repo.find_page_by_id(id).await? else {
                    return Ok(None);
                };
                if page.project_id != project.id {
                    debug!(
                        target = "lectern::application::resolver",
                        page_id = %id,
                        project_id = %project.id,
                        "page belongs to another project"
                    );
                    return Ok(None);
                }
                let chain = LocaleChain::new(&page.language_code, &project.default_language);
                Ok(Some((page, chain)))
            }
            EntityRef::Slug(slug) => {
                let page = self
                    .repo
                    .find_published_page(project.id, &slug, chain.languages())
                    .await?;
                Ok(page.map(|page| (page, chain.clone())))
            }
        }
    }

    async fn assemble_page(
        &self,
        page: PageRecord,
        chain: &LocaleChain,
    ) -> Result<ResolvedPage, ResolveError> {
        let joins = self.repo.list_page_sections(page.id).await?;
        let placed = sections::retain_resolvable(&page, joins);
        let refs: Vec<SectionRef<'_>> = placed
            .iter()
            .map(|placed| SectionRef {
                section: &placed.section,
                template: &placed.template,
            })
            .collect();
        let contents = self.assemble_content(&refs, chain).await?;

        let sections = placed
            .iter()
            .map(|placed| ResolvedSection {
                id: placed.page_section.id,
                order: placed.page_section.order_index,
                name: placed
                    .page_section
                    .display_name
                    .clone()
                    .or_else(|| placed.section.name.clone()),
                section: SectionSummary::new(&placed.section, &placed.template),
                content: contents
                    .get(&placed.section.id)
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect();

        Ok(ResolvedPage {
            page: PageSummary::from(&page),
            sections,
        })
    }
}

fn chain_for(project: &ProjectRecord, language: Option<&str>) -> LocaleChain {
    let requested = language
        .map(str::trim)
        .filter(|language| !language.is_empty())
        .unwrap_or(&project.default_language);
    LocaleChain::new(requested, &project.default_language)
}
