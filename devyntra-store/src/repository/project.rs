//! Project Repository
//!
//! Reads and partially updates project records.

use async_trait::async_trait;
use devyntra_core::domain::{ProjectId, ProjectRecord, ProjectStatus, ProjectUpdate};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::error::{Result, StoreError};

/// Repository trait for project records
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Creates a project record in `analysis_pending`
    ///
    /// This is the producer side's write; the worker never calls it.
    async fn insert_pending(&self, id: &ProjectId, repo_url: &str) -> Result<ProjectRecord>;

    /// Fetches a project record
    async fn get(&self, id: &ProjectId) -> Result<Option<ProjectRecord>>;

    /// Writes the fields set on `update` and nothing else
    ///
    /// # Returns
    /// `StoreError::NotFound` when no record has the given id
    async fn update(&self, id: &ProjectId, update: &ProjectUpdate) -> Result<()>;
}

/// PostgreSQL implementation of ProjectStore
#[derive(Debug, Clone)]
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn insert_pending(&self, id: &ProjectId, repo_url: &str) -> Result<ProjectRecord> {
        let record = ProjectRecord::pending(id.clone(), repo_url);

        sqlx::query(
            r#"
            INSERT INTO projects (id, repo_url, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id.as_str())
        .bind(&record.repo_url)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get(&self, id: &ProjectId) -> Result<Option<ProjectRecord>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, repo_url, status, language, dockerfile_path, status_message,
                   created_at, updated_at
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProjectRecord::try_from).transpose()
    }

    async fn update(&self, id: &ProjectId, update: &ProjectUpdate) -> Result<()> {
        let result = build_update(id, update)
            .build()
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }

        tracing::debug!("Updated project {}: {:?}", id, update);
        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Builds `UPDATE projects SET ... WHERE id = ...` for the set fields only
fn build_update(id: &ProjectId, update: &ProjectUpdate) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("UPDATE projects SET ");

    let mut fields = builder.separated(", ");
    if let Some(status) = update.status {
        fields.push("status = ");
        fields.push_bind_unseparated(status.as_str());
    }
    if let Some(language) = &update.language {
        fields.push("language = ");
        fields.push_bind_unseparated(language.clone());
    }
    if let Some(path) = &update.dockerfile_path {
        fields.push("dockerfile_path = ");
        fields.push_bind_unseparated(path.clone());
    }
    if let Some(message) = &update.status_message {
        fields.push("status_message = ");
        fields.push_bind_unseparated(message.clone());
    }
    fields.push("updated_at = now()");

    builder.push(" WHERE id = ");
    builder.push_bind(id.as_str().to_string());
    builder
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    repo_url: String,
    status: String,
    language: Option<String>,
    dockerfile_path: Option<String>,
    status_message: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<ProjectRow> for ProjectRecord {
    type Error = StoreError;

    fn try_from(row: ProjectRow) -> Result<Self> {
        let status = row
            .status
            .parse::<ProjectStatus>()
            .map_err(StoreError::InvalidRecord)?;

        Ok(ProjectRecord {
            id: ProjectId::new(row.id),
            repo_url: row.repo_url,
            status,
            language: row.language,
            dockerfile_path: row.dockerfile_path,
            status_message: row.status_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
