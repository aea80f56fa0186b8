use chrono::{DateTime, Utc};
use replybot_core::error::AppError;
use replybot_core::models::{Category, NormalizedRecord, SourceKind, StoredPost};
use replybot_core::traits::RecordSink;
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

/// Append-only store of classified posts in PostgreSQL.
#[derive(Clone)]
pub struct PostRepository {
    pool: Pool<Postgres>,
}

impl PostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one record as an unanswered post. Returns the generated UUID.
    pub async fn append(&self, record: &NormalizedRecord) -> Result<Uuid, AppError> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO posts (post_id, url, category, content, source)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(record.id())
        .bind(record.canonical_url())
        .bind(record.category().as_str())
        .bind(record.content())
        .bind(record.source().as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tracing::debug!(id = %row.0, post_id = record.id(), "Post stored");
        Ok(row.0)
    }

    /// Most recent posts first, optionally limited to one category.
    pub async fn recent(
        &self,
        limit: usize,
        category: Option<Category>,
    ) -> Result<Vec<StoredPost>, AppError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, post_id, url, category, content, source, responded, created_at
            FROM posts
            WHERE $1::VARCHAR IS NULL OR category = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(category.map(|c| c.as_str()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(StoredPost::try_from).collect()
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    post_id: String,
    url: String,
    category: String,
    content: String,
    source: String,
    responded: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<PostRow> for StoredPost {
    type Error = AppError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        let category: Category = row.category.parse().map_err(AppError::DatabaseError)?;
        let source: SourceKind = row.source.parse().map_err(AppError::DatabaseError)?;
        Ok(StoredPost {
            id: row.id,
            post_id: row.post_id,
            url: row.url,
            category,
            content: row.content,
            source,
            responded: row.responded,
            created_at: row.created_at,
        })
    }
}

// -- Trait implementation --

impl RecordSink for PostRepository {
    async fn append(&self, record: &NormalizedRecord) -> Result<(), AppError> {
        PostRepository::append(self, record).await.map(|_| ())
    }
}
