use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use super::models::{Document, DocumentId, Element, NewSlide, Slide, SlideId};
use super::{Storage, StorageResult};
use crate::error::StorageError;

const SLIDE_COLUMNS: &str = "id, document_id, order_index, elements";
const DOCUMENT_COLUMNS: &str = "id, title, creator_id, created_at, slide_ids";

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    title: String,
    creator_id: String,
    created_at: DateTime<Utc>,
    slide_ids: Vec<Uuid>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            creator_id: row.creator_id,
            created_at: row.created_at,
            slides: row.slide_ids,
        }
    }
}

#[derive(Debug, FromRow)]
struct SlideRow {
    id: Uuid,
    document_id: Uuid,
    order_index: i32,
    elements: Json<Vec<Element>>,
}

impl From<SlideRow> for Slide {
    fn from(row: SlideRow) -> Self {
        Self {
            id: row.id,
            document_id: row.document_id,
            order_index: row.order_index,
            elements: row.elements.0,
        }
    }
}

fn slide_not_found(document_id: DocumentId, slide_id: SlideId) -> StorageError {
    StorageError::NotFound(format!("Slide {} in document {}", slide_id, document_id))
}

pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl Storage for PgStore {
    async fn create_document(
        &self,
        title: Option<String>,
        creator_id: Option<String>,
    ) -> StorageResult<Document> {
        let document = Document::new(title, creator_id);
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "INSERT INTO documents (id, title, creator_id, created_at, slide_ids) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            DOCUMENT_COLUMNS
        ))
        .bind(document.id)
        .bind(&document.title)
        .bind(&document.creator_id)
        .bind(document.created_at)
        .bind(&document.slides)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.into())
    }

    async fn get_document(&self, id: DocumentId) -> StorageResult<Document> {
        sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?
        .map(Document::from)
        .ok_or_else(|| StorageError::NotFound(format!("Document {}", id)))
    }

    async fn list_slides(&self, document_id: DocumentId) -> StorageResult<Vec<Slide>> {
        let rows = sqlx::query_as::<_, SlideRow>(&format!(
            "SELECT {} FROM slides WHERE document_id = $1 ORDER BY order_index, id",
            SLIDE_COLUMNS
        ))
        .bind(document_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(Slide::from).collect())
    }

    async fn count_slides(&self, document_id: DocumentId) -> StorageResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM slides WHERE document_id = $1")
            .bind(document_id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count as usize)
    }

    async fn create_slide(
        &self,
        document_id: DocumentId,
        order_index: i32,
        data: NewSlide,
    ) -> StorageResult<Slide> {
        let row = sqlx::query_as::<_, SlideRow>(&format!(
            "INSERT INTO slides (id, document_id, order_index, elements) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            SLIDE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(document_id)
        .bind(order_index)
        .bind(Json(data.elements))
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.into())
    }

    async fn append_slide_ref(&self, document_id: DocumentId, slide_id: SlideId) -> StorageResult<()> {
        let result = sqlx::query("UPDATE documents SET slide_ids = array_append(slide_ids, $2) WHERE id = $1")
            .bind(document_id)
            .bind(slide_id)
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("Document {}", document_id)));
        }
        Ok(())
    }

    async fn replace_slide_elements(
        &self,
        document_id: DocumentId,
        slide_id: SlideId,
        elements: Vec<Element>,
    ) -> StorageResult<Slide> {
        sqlx::query_as::<_, SlideRow>(&format!(
            "UPDATE slides SET elements = $3 WHERE id = $1 AND document_id = $2 RETURNING {}",
            SLIDE_COLUMNS
        ))
        .bind(slide_id)
        .bind(document_id)
        .bind(Json(elements))
        .fetch_optional(self.pool.as_ref())
        .await?
        .map(Slide::from)
        .ok_or_else(|| slide_not_found(document_id, slide_id))
    }

    async fn delete_slide(&self, document_id: DocumentId, slide_id: SlideId) -> StorageResult<Slide> {
        sqlx::query_as::<_, SlideRow>(&format!(
            "DELETE FROM slides WHERE id = $1 AND document_id = $2 RETURNING {}",
            SLIDE_COLUMNS
        ))
        .bind(slide_id)
        .bind(document_id)
        .fetch_optional(self.pool.as_ref())
        .await?
        .map(Slide::from)
        .ok_or_else(|| slide_not_found(document_id, slide_id))
    }

    async fn remove_slide_ref(&self, document_id: DocumentId, slide_id: SlideId) -> StorageResult<()> {
        let result = sqlx::query("UPDATE documents SET slide_ids = array_remove(slide_ids, $2) WHERE id = $1")
            .bind(document_id)
            .bind(slide_id)
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("Document {}", document_id)));
        }
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
