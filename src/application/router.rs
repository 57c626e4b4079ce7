//! Query router: a fixed table from method name to typed handler.
//!
//! Handlers decode their params into a typed struct, call the resolver and encode
//! the result. Failures never escape [`QueryRouter::dispatch`]; they become a
//! body-level error in the response envelope.

use std::collections::HashMap;
use std::time::Instant;

use futures::future::BoxFuture;
use lectern_api_types::QueryResponse;
use metrics::histogram;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::error::ResolveError;
use crate::application::resolver::{ContentResolver, EntityRef};
use crate::domain::error::DomainError;

const SOURCE: &str = "lectern::application::router";
const METRIC_RESOLVE_MS: &str = "lectern_resolve_ms";

pub type HandlerFuture<'a> = BoxFuture<'a, Result<Value, ResolveError>>;
pub type Handler = for<'a> fn(&'a ContentResolver, Map<String, Value>) -> HandlerFuture<'a>;

fn routes() -> [(&'static str, Handler); 12] {
    [
        ("getProject", get_project),
        ("getLanguages", get_languages),
        ("getPages", get_pages),
        ("getPage", get_page),
        ("getPageWithFullContent", get_page_with_full_content),
        ("getPageWithArticle", get_page_with_article),
        ("getSection", get_section),
        ("getSectionTemplates", get_section_templates),
        ("getFields", get_fields),
        ("getItem", get_item),
        ("getItems", get_items),
        ("getItemTemplates", get_item_templates),
    ]
}

#[derive(Clone)]
pub struct QueryRouter {
    resolver: ContentResolver,
    handlers: HashMap<&'static str, Handler>,
}

impl QueryRouter {
    pub fn new(resolver: ContentResolver) -> Self {
        Self {
            resolver,
            handlers: routes().into_iter().collect(),
        }
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<&'static str> = self.handlers.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    pub async fn dispatch(&self, method: &str, params: Map<String, Value>) -> QueryResponse {
        let Some((&name, handler)) = self.handlers.get_key_value(method) else {
            warn!(target = SOURCE, method, "unknown query method");
            return QueryResponse::failure(format!("Unknown method: {method}"));
        };

        let started = Instant::now();
        let result = handler(&self.resolver, params).await;
        histogram!(METRIC_RESOLVE_MS, "method" => name)
            .record(started.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(data) => QueryResponse::success(data),
            Err(err) => {
                match &err {
                    ResolveError::Domain(DomainError::NotFound { .. }) => {
                        debug!(target = SOURCE, method = name, error = %err, "query resolved to nothing");
                    }
                    ResolveError::InvalidParams { .. } => {
                        info!(target = SOURCE, method = name, error = %err, "query rejected");
                    }
                    _ => {
                        error!(target = SOURCE, method = name, error = %err, "query resolution failed");
                    }
                }
                QueryResponse::failure(err.to_string())
            }
        }
    }
}

fn decode<T: DeserializeOwned>(method: &'static str, params: Map<String, Value>) -> Result<T, ResolveError> {
    serde_json::from_value(Value::Object(params))
        .map_err(|err| ResolveError::invalid_params(method, err.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ResolveError> {
    serde_json::to_value(value)
        .map_err(|err| DomainError::invariant(format!("result could not be encoded: {err}")).into())
}

/// Identifiers may arrive as numbers through the legacy query-string path.
fn identifier<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string identifier, got {other}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectParams {
    project_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LanguageParams {
    project_id: Option<Uuid>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageParams {
    #[serde(
        alias = "pageId",
        alias = "slug",
        alias = "pageSlug",
        deserialize_with = "identifier"
    )]
    page: String,
    project_id: Option<Uuid>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArticleParams {
    #[serde(
        alias = "pageId",
        alias = "slug",
        alias = "pageSlug",
        deserialize_with = "identifier"
    )]
    page: String,
    #[serde(
        alias = "articleId",
        alias = "articleSlug",
        deserialize_with = "identifier"
    )]
    article: String,
    project_id: Option<Uuid>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SectionParams {
    section_id: Uuid,
    project_id: Option<Uuid>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SectionTemplatesParams {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldsParams {
    template_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemParams {
    #[serde(
        alias = "itemId",
        alias = "slug",
        alias = "itemSlug",
        deserialize_with = "identifier"
    )]
    item: String,
    project_id: Option<Uuid>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemsParams {
    template_id: Uuid,
    project_id: Option<Uuid>,
    language: Option<String>,
}

fn get_project(resolver: &ContentResolver, params: Map<String, Value>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let params: ProjectParams = decode("getProject", params)?;
        encode(&resolver.project(params.project_id).await?)
    })
}

fn get_languages(resolver: &ContentResolver, params: Map<String, Value>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let params: ProjectParams = decode("getLanguages", params)?;
        encode(&resolver.languages(params.project_id).await?)
    })
}

fn get_pages(resolver: &ContentResolver, params: Map<String, Value>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let params: LanguageParams = decode("getPages", params)?;
        let pages = resolver
            .pages(params.project_id, params.language.as_deref())
            .await?;
        encode(&pages)
    })
}

fn get_page(resolver: &ContentResolver, params: Map<String, Value>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let params: PageParams = decode("getPage", params)?;
        let page = resolver
            .page(params.project_id, &params.page, params.language.as_deref())
            .await?
            .ok_or_else(|| ResolveError::not_found("Page"))?;
        encode(&page)
    })
}

fn get_page_with_full_content(
    resolver: &ContentResolver,
    params: Map<String, Value>,
) -> HandlerFuture<'_> {
    Box::pin(async move {
        let params: PageParams = decode("getPageWithFullContent", params)?;
        let page = resolver
            .page_with_full_content(params.project_id, &params.page, params.language.as_deref())
            .await?
            .ok_or_else(|| ResolveError::not_found("Page"))?;
        encode(&page)
    })
}

fn get_page_with_article(
    resolver: &ContentResolver,
    params: Map<String, Value>,
) -> HandlerFuture<'_> {
    Box::pin(async move {
        let params: ArticleParams = decode("getPageWithArticle", params)?;
        let article = EntityRef::parse(&params.article);
        let page = resolver
            .page_with_article(
                params.project_id,
                &params.page,
                &article,
                params.language.as_deref(),
            )
            .await?
            .ok_or_else(|| ResolveError::not_found("Page"))?;
        encode(&page)
    })
}

fn get_section(resolver: &ContentResolver, params: Map<String, Value>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let params: SectionParams = decode("getSection", params)?;
        let section = resolver
            .section(params.project_id, params.section_id, params.language.as_deref())
            .await?
            .ok_or_else(|| ResolveError::not_found("Section"))?;
        encode(&section)
    })
}

fn get_section_templates(
    resolver: &ContentResolver,
    params: Map<String, Value>,
) -> HandlerFuture<'_> {
    Box::pin(async move {
        let params: SectionTemplatesParams = decode("getSectionTemplates", params)?;
        encode(&resolver.section_templates(params.language.as_deref()).await?)
    })
}

fn get_fields(resolver: &ContentResolver, params: Map<String, Value>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let params: FieldsParams = decode("getFields", params)?;
        encode(&resolver.fields(params.template_id).await?)
    })
}

fn get_item(resolver: &ContentResolver, params: Map<String, Value>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let params: ItemParams = decode("getItem", params)?;
        let item = EntityRef::parse(&params.item);
        let item = resolver
            .item(params.project_id, &item, params.language.as_deref())
            .await?
            .ok_or_else(|| ResolveError::not_found("Item"))?;
        encode(&item)
    })
}

fn get_items(resolver: &ContentResolver, params: Map<String, Value>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let params: ItemsParams = decode("getItems", params)?;
        let items = resolver
            .items(params.project_id, params.template_id, params.language.as_deref())
            .await?;
        encode(&items)
    })
}

fn get_item_templates(resolver: &ContentResolver, params: Map<String, Value>) -> HandlerFuture<'_> {
    Box::pin(async move {
        let params: ProjectParams = decode("getItemTemplates", params)?;
        encode(&resolver.item_templates(params.project_id).await?)
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn routes_cover_every_method_once() {
        let names: Vec<&str> = routes().iter().map(|(name, _)| *name).collect();
        let mut unique = names.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), names.len());
        assert!(names.contains(&"getPageWithFullContent"));
        assert!(names.contains(&"getPageWithArticle"));
    }

    #[test]
    fn page_params_accept_aliases_and_numeric_slugs() {
        let params: PageParams = serde_json::from_value(json!({ "slug": 404, "language": "en" }))
            .expect("params decode");
        assert_eq!(params.page, "404");
        assert_eq!(params.language.as_deref(), Some("en"));

        let params: PageParams = serde_json::from_value(json!({ "pageId": "about" }))
            .expect("params decode");
        assert_eq!(params.page, "about");
        assert!(params.project_id.is_none());
    }

    #[test]
    fn missing_params_become_invalid_params() {
        let err = decode::<FieldsParams>("getFields", Map::new()).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidParams { method: "getFields", .. }));
        assert!(err.to_string().starts_with("Invalid params for getFields"));
    }
}
