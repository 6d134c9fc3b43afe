use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::models::{Document, DocumentId, Element, NewSlide, Slide, SlideId};
use super::{Storage, StorageResult};
use crate::error::StorageError;

/// Process-local storage. Each record type sits behind its own lock,
/// so every operation is atomic per record and nothing more.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<DocumentId, Document>>,
    slides: RwLock<HashMap<SlideId, Slide>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn document_not_found(id: DocumentId) -> StorageError {
    StorageError::NotFound(format!("Document {}", id))
}

fn slide_not_found(document_id: DocumentId, slide_id: SlideId) -> StorageError {
    StorageError::NotFound(format!("Slide {} in document {}", slide_id, document_id))
}

#[async_trait]
impl Storage for MemoryStore {
    async fn create_document(
        &self,
        title: Option<String>,
        creator_id: Option<String>,
    ) -> StorageResult<Document> {
        let document = Document::new(title, creator_id);
        self.documents.write().await.insert(document.id, document.clone());
        debug!("Stored document {}", document.id);
        Ok(document)
    }

    async fn get_document(&self, id: DocumentId) -> StorageResult<Document> {
        self.documents
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| document_not_found(id))
    }

    async fn list_slides(&self, document_id: DocumentId) -> StorageResult<Vec<Slide>> {
        let mut slides: Vec<Slide> = self
            .slides
            .read()
            .await
            .values()
            .filter(|slide| slide.document_id == document_id)
            .cloned()
            .collect();
        // Stable order for slides sharing an index.
        slides.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.id.cmp(&b.id)));
        Ok(slides)
    }

    async fn count_slides(&self, document_id: DocumentId) -> StorageResult<usize> {
        Ok(self
            .slides
            .read()
            .await
            .values()
            .filter(|slide| slide.document_id == document_id)
            .count())
    }

    async fn create_slide(
        &self,
        document_id: DocumentId,
        order_index: i32,
        data: NewSlide,
    ) -> StorageResult<Slide> {
        let slide = Slide::new(document_id, order_index, data.elements);
        self.slides.write().await.insert(slide.id, slide.clone());
        Ok(slide)
    }

    async fn append_slide_ref(&self, document_id: DocumentId, slide_id: SlideId) -> StorageResult<()> {
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(&document_id)
            .ok_or_else(|| document_not_found(document_id))?;
        document.slides.push(slide_id);
        Ok(())
    }

    async fn replace_slide_elements(
        &self,
        document_id: DocumentId,
        slide_id: SlideId,
        elements: Vec<Element>,
    ) -> StorageResult<Slide> {
        let mut slides = self.slides.write().await;
        let slide = slides
            .get_mut(&slide_id)
            .filter(|slide| slide.document_id == document_id)
            .ok_or_else(|| slide_not_found(document_id, slide_id))?;
        slide.elements = elements;
        Ok(slide.clone())
    }

    async fn delete_slide(&self, document_id: DocumentId, slide_id: SlideId) -> StorageResult<Slide> {
        let mut slides = self.slides.write().await;
        match slides.get(&slide_id) {
            Some(slide) if slide.document_id == document_id => {}
            _ => return Err(slide_not_found(document_id, slide_id)),
        }
        slides.remove(&slide_id).ok_or_else(|| slide_not_found(document_id, slide_id))
    }

    async fn remove_slide_ref(&self, document_id: DocumentId, slide_id: SlideId) -> StorageResult<()> {
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(&document_id)
            .ok_or_else(|| document_not_found(document_id))?;
        document.slides.retain(|id| *id != slide_id);
        Ok(())
    }
}
