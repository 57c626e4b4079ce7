use uuid::Uuid;

use crate::{application::repos::RepoError, domain::entities::ProjectRecord};

use super::{PostgresRepositories, map_sqlx_error};

/// Inactive projects are invisible to every lookup.
const ACTIVE_PROJECTS: &str = "SELECT id, slug, name, \
     COALESCE(supported_languages, ARRAY[]::text[]) AS supported_languages, \
     default_language, is_active FROM projects WHERE is_active";

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    slug: String,
    name: String,
    supported_languages: Vec<String>,
    default_language: String,
    is_active: bool,
}

impl From<ProjectRow> for ProjectRecord {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
            supported_languages: row.supported_languages,
            default_language: row.default_language,
            is_active: row.is_active,
        }
    }
}

impl PostgresRepositories {
    pub(super) async fn project_by_id(&self, id: Uuid) -> Result<Option<ProjectRecord>, RepoError> {
        let sql = format!("{ACTIVE_PROJECTS} AND id = $1");
        let row = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ProjectRecord::from))
    }

    pub(super) async fn project_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<ProjectRecord>, RepoError> {
        let sql = format!("{ACTIVE_PROJECTS} AND slug = $1");
        let row = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(slug)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ProjectRecord::from))
    }
}
