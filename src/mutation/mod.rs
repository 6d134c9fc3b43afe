//! Document mutations.
//!
//! Every mutation round-trips through storage and returns the state as
//! stored; nothing here caches document content. A storage failure aborts
//! the operation before anything is returned.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::db::{Document, DocumentId, Element, NewSlide, Slide, SlideId, Storage, StorageResult};
use crate::error::StorageError;

/// A document with its slides ordered by order index.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideList {
    pub document: Document,
    pub slides: Vec<Slide>,
}

pub struct StateMutator {
    storage: Arc<dyn Storage>,
}

impl StateMutator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Creates a document together with its first slide (order index 1).
    pub async fn create_document(
        &self,
        title: Option<String>,
        creator_id: Option<String>,
    ) -> StorageResult<SlideList> {
        let document = self.storage.create_document(title, creator_id).await?;
        let slide = self.storage.create_slide(document.id, 1, NewSlide::default()).await?;
        self.storage.append_slide_ref(document.id, slide.id).await?;
        info!("Created document {} with first slide {}", document.id, slide.id);
        self.slide_list(document.id).await
    }

    /// Overwrites the element list of a slide of `document_id`. Concurrent
    /// writers race at the storage layer; the last write wins, lists are
    /// never merged.
    pub async fn replace_slide_elements(
        &self,
        document_id: DocumentId,
        slide_id: SlideId,
        elements: Vec<Element>,
    ) -> StorageResult<Slide> {
        self.storage.replace_slide_elements(document_id, slide_id, elements).await
    }

    /// Appends a slide whose order index is the current slide count plus one.
    ///
    /// The count is read at call time, so two concurrent adds on the same
    /// document can be assigned the same index.
    pub async fn add_slide(&self, document_id: DocumentId, data: NewSlide) -> StorageResult<Slide> {
        self.storage.get_document(document_id).await?;
        let count = self.storage.count_slides(document_id).await?;
        let order_index = i32::try_from(count + 1)
            .map_err(|_| StorageError::QueryError(format!("slide count {} out of range", count)))?;

        let slide = self.storage.create_slide(document_id, order_index, data).await?;
        self.storage.append_slide_ref(document_id, slide.id).await?;
        info!("Added slide {} at index {} to document {}", slide.id, order_index, document_id);
        Ok(slide)
    }

    /// Deletes a slide of the document. Ownership is the slide's own
    /// `document_id`, so a slide that was never linked can still be removed.
    /// Other slides keep their index.
    pub async fn delete_slide(&self, document_id: DocumentId, slide_id: SlideId) -> StorageResult<Slide> {
        self.storage.get_document(document_id).await?;
        let slide = self.storage.delete_slide(document_id, slide_id).await?;
        self.storage.remove_slide_ref(document_id, slide_id).await?;
        info!("Deleted slide {} from document {}", slide_id, document_id);
        Ok(slide)
    }

    /// Canonical document state, as sent in full refreshes.
    pub async fn slide_list(&self, document_id: DocumentId) -> StorageResult<SlideList> {
        let document = self.storage.get_document(document_id).await?;
        let slides = self.storage.list_slides(document_id).await?;

        let mut seen = HashSet::new();
        for slide in &slides {
            if !seen.insert(slide.order_index) {
                warn!(
                    "Document {} has more than one slide at order index {}",
                    document_id, slide.order_index
                );
            }
        }

        Ok(SlideList { document, slides })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockStorage;
    use crate::db::MemoryStore;
    use mockall::predicate::eq;
    use serde_json::json;
    use uuid::Uuid;

    fn memory_mutator() -> StateMutator {
        StateMutator::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_create_document_has_first_slide() {
        let mutator = memory_mutator();
        let list = mutator.create_document(None, None).await.unwrap();

        assert_eq!(list.slides.len(), 1);
        assert_eq!(list.slides[0].order_index, 1);
        assert_eq!(list.document.slides, vec![list.slides[0].id]);
    }

    #[tokio::test]
    async fn test_add_slide_uses_count_plus_one() {
        let mutator = memory_mutator();
        let doc = mutator.create_document(None, None).await.unwrap().document;

        let second = mutator.add_slide(doc.id, NewSlide::default()).await.unwrap();
        let third = mutator.add_slide(doc.id, NewSlide::default()).await.unwrap();
        assert_eq!(second.order_index, 2);
        assert_eq!(third.order_index, 3);

        let list = mutator.slide_list(doc.id).await.unwrap();
        assert_eq!(list.document.slides.len(), 3);
        assert_eq!(list.slides.last().map(|s| s.id), Some(third.id));
    }

    #[tokio::test]
    async fn test_delete_slide_leaves_gap() {
        let mutator = memory_mutator();
        let doc = mutator.create_document(None, None).await.unwrap().document;
        let second = mutator.add_slide(doc.id, NewSlide::default()).await.unwrap();
        let third = mutator.add_slide(doc.id, NewSlide::default()).await.unwrap();

        mutator.delete_slide(doc.id, second.id).await.unwrap();

        let list = mutator.slide_list(doc.id).await.unwrap();
        let indices: Vec<i32> = list.slides.iter().map(|s| s.order_index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert!(!list.document.slides.contains(&second.id));
        assert!(list.document.slides.contains(&third.id));

        // Count-based assignment reuses index 3 after the gap.
        let fourth = mutator.add_slide(doc.id, NewSlide::default()).await.unwrap();
        assert_eq!(fourth.order_index, 3);
    }

    #[tokio::test]
    async fn test_delete_slide_of_other_document_is_not_found() {
        let mutator = memory_mutator();
        let first = mutator.create_document(None, None).await.unwrap();
        let second = mutator.create_document(None, None).await.unwrap();

        let result = mutator.delete_slide(first.document.id, second.slides[0].id).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert_eq!(mutator.slide_list(second.document.id).await.unwrap().slides.len(), 1);
    }

    #[tokio::test]
    async fn test_replace_returns_stored_slide() {
        let mutator = memory_mutator();
        let list = mutator.create_document(None, None).await.unwrap();
        let slide_id = list.slides[0].id;
        let elements: Vec<Element> = vec![json!({"id": "e1"}).into(), json!({"id": "e2"}).into()];

        let doc_id = list.document.id;
        let stored = mutator.replace_slide_elements(doc_id, slide_id, elements.clone()).await.unwrap();
        assert_eq!(stored.elements, elements);

        let stored = mutator.replace_slide_elements(doc_id, slide_id, vec![]).await.unwrap();
        assert!(stored.elements.is_empty());
    }

    #[tokio::test]
    async fn test_replace_rejects_slide_of_other_document() {
        let mutator = memory_mutator();
        let first = mutator.create_document(None, None).await.unwrap();
        let second = mutator.create_document(None, None).await.unwrap();
        let slide_id = second.slides[0].id;

        let result = mutator
            .replace_slide_elements(first.document.id, slide_id, vec![json!({"id": "e1"}).into()])
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));

        let untouched = mutator.slide_list(second.document.id).await.unwrap();
        assert!(untouched.slides[0].elements.is_empty());
    }

    #[tokio::test]
    async fn test_unlinked_slide_can_be_deleted() {
        let storage = Arc::new(MemoryStore::new());
        let mutator = StateMutator::new(storage.clone());
        let doc = mutator.create_document(None, None).await.unwrap().document;

        // Written but never linked, as when the link step of an add fails.
        let unlinked = storage.create_slide(doc.id, 2, NewSlide::default()).await.unwrap();
        let list = mutator.slide_list(doc.id).await.unwrap();
        assert_eq!(list.slides.len(), 2);
        assert_eq!(list.document.slides.len(), 1);

        mutator.delete_slide(doc.id, unlinked.id).await.unwrap();

        let list = mutator.slide_list(doc.id).await.unwrap();
        assert_eq!(list.slides.len(), 1);
        assert_eq!(list.document.slides, vec![list.slides[0].id]);
    }

    #[tokio::test]
    async fn test_duplicate_order_index_is_listed_by_id() {
        let storage = Arc::new(MemoryStore::new());
        let mutator = StateMutator::new(storage.clone());
        let doc = mutator.create_document(None, None).await.unwrap().document;

        // Both adds read a count of 1 before either wrote.
        let mut racers = Vec::new();
        for _ in 0..2 {
            let slide = storage.create_slide(doc.id, 2, NewSlide::default()).await.unwrap();
            storage.append_slide_ref(doc.id, slide.id).await.unwrap();
            racers.push(slide.id);
        }
        racers.sort();

        let list = mutator.slide_list(doc.id).await.unwrap();
        let indices: Vec<i32> = list.slides.iter().map(|s| s.order_index).collect();
        assert_eq!(indices, vec![1, 2, 2]);
        assert_eq!(vec![list.slides[1].id, list.slides[2].id], racers);
        assert_eq!(list.document.slides.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_adds_keep_every_slide() {
        let mutator = memory_mutator();
        let doc = mutator.create_document(None, None).await.unwrap().document;

        let (left, right) = tokio::join!(
            mutator.add_slide(doc.id, NewSlide::default()),
            mutator.add_slide(doc.id, NewSlide::default()),
        );
        let (left, right) = (left.unwrap(), right.unwrap());
        assert_ne!(left.id, right.id);

        let list = mutator.slide_list(doc.id).await.unwrap();
        assert_eq!(list.slides.len(), 3);
        assert!(list
            .slides
            .windows(2)
            .all(|pair| (pair[0].order_index, pair[0].id) <= (pair[1].order_index, pair[1].id)));
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_add_before_write() {
        let doc = Document::new(None, None);
        let doc_id = doc.id;
        let mut storage = MockStorage::new();
        storage
            .expect_get_document()
            .with(eq(doc_id))
            .returning(move |_| Ok(doc.clone()));
        storage
            .expect_count_slides()
            .returning(|_| Err(StorageError::ConnectionError("connection reset".into())));
        storage.expect_create_slide().never();
        storage.expect_append_slide_ref().never();

        let mutator = StateMutator::new(Arc::new(storage));
        let result = mutator.add_slide(doc_id, NewSlide::default()).await;
        assert!(matches!(result, Err(StorageError::ConnectionError(_))));
    }

    #[tokio::test]
    async fn test_missing_document_aborts_delete() {
        let mut storage = MockStorage::new();
        storage
            .expect_get_document()
            .returning(|id| Err(StorageError::NotFound(format!("Document {}", id))));
        storage.expect_delete_slide().never();
        storage.expect_remove_slide_ref().never();

        let mutator = StateMutator::new(Arc::new(storage));
        let result = mutator.delete_slide(Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }
}
