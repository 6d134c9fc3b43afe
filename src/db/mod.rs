//! Storage collaborator for documents and slides.
//!
//! Every call is atomic on its own; callers never compose them into
//! a transaction.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StorageError;

pub use memory::MemoryStore;
pub use models::{Document, DocumentId, Element, NewSlide, Slide, SlideElements, SlideId};
pub use postgres::PgStore;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_document(
        &self,
        title: Option<String>,
        creator_id: Option<String>,
    ) -> StorageResult<Document>;

    async fn get_document(&self, id: DocumentId) -> StorageResult<Document>;

    /// Slides of a document ordered by order index.
    async fn list_slides(&self, document_id: DocumentId) -> StorageResult<Vec<Slide>>;

    async fn count_slides(&self, document_id: DocumentId) -> StorageResult<usize>;

    async fn create_slide(
        &self,
        document_id: DocumentId,
        order_index: i32,
        data: NewSlide,
    ) -> StorageResult<Slide>;

    async fn append_slide_ref(&self, document_id: DocumentId, slide_id: SlideId) -> StorageResult<()>;

    /// Overwrites the whole element list of a slide of `document_id` and
    /// returns the stored slide. A slide of another document is `NotFound`.
    async fn replace_slide_elements(
        &self,
        document_id: DocumentId,
        slide_id: SlideId,
        elements: Vec<Element>,
    ) -> StorageResult<Slide>;

    /// Deletes a slide of `document_id`, whether or not the document
    /// still references it.
    async fn delete_slide(&self, document_id: DocumentId, slide_id: SlideId) -> StorageResult<Slide>;

    async fn remove_slide_ref(&self, document_id: DocumentId, slide_id: SlideId) -> StorageResult<()>;

    async fn close(&self) {}
}
