use uuid::Uuid;

use crate::{application::repos::RepoError, domain::entities::PageRecord};

use super::{PostgresRepositories, lowered, map_sqlx_error};

const PAGE_COLUMNS: &str = "SELECT id, project_id, parent_id, language_code, slug, title, \
     is_published, show_in_navigation, COALESCE(navigation_order, 0) AS navigation_order \
     FROM pages";

#[derive(sqlx::FromRow)]
struct PageRow {
    id: Uuid,
    project_id: Uuid,
    parent_id: Option<Uuid>,
    language_code: String,
    slug: String,
    title: String,
    is_published: bool,
    show_in_navigation: bool,
    navigation_order: i32,
}

impl From<PageRow> for PageRecord {
    fn from(row: PageRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            parent_id: row.parent_id,
            language_code: row.language_code,
            slug: row.slug,
            title: row.title,
            is_published: row.is_published,
            show_in_navigation: row.show_in_navigation,
            navigation_order: row.navigation_order,
        }
    }
}

impl PostgresRepositories {
    pub(super) async fn page_by_id(&self, id: Uuid) -> Result<Option<PageRecord>, RepoError> {
        let sql = format!("{PAGE_COLUMNS} WHERE id = $1");
        let row = sqlx::query_as::<_, PageRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(PageRecord::from))
    }

    pub(super) async fn published_page(
        &self,
        project_id: Uuid,
        slug: &str,
        languages: &[String],
    ) -> Result<Option<PageRecord>, RepoError> {
        let sql = format!(
            "{PAGE_COLUMNS} WHERE project_id = $1 AND slug = $2 \
             AND lower(language_code) = ANY($3) AND is_published \
             ORDER BY array_position($3, lower(language_code)) \
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, PageRow>(&sql)
            .bind(project_id)
            .bind(slug)
            .bind(lowered(languages))
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(PageRecord::from))
    }

    pub(super) async fn published_pages(
        &self,
        project_id: Uuid,
        language: &str,
    ) -> Result<Vec<PageRecord>, RepoError> {
        let sql = format!(
            "{PAGE_COLUMNS} WHERE project_id = $1 AND lower(language_code) = lower($2) \
             AND is_published ORDER BY navigation_order, title, id"
        );
        let rows = sqlx::query_as::<_, PageRow>(&sql)
            .bind(project_id)
            .bind(language)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PageRecord::from).collect())
    }
}
