use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{Document, NewSlide, Slide};
use crate::error::AppError;
use crate::mutation::SlideList;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePresentationRequest {
    pub title: Option<String>,
    pub creator_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PresentationResponse {
    pub document: Document,
    pub slides: Vec<Slide>,
}

impl From<SlideList> for PresentationResponse {
    fn from(list: SlideList) -> Self {
        Self {
            document: list.document,
            slides: list.slides,
        }
    }
}

pub async fn create_presentation(
    req: Option<web::Json<CreatePresentationRequest>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.map(web::Json::into_inner).unwrap_or_default();
    info!("Received request to create presentation {:?}", req.title);

    match state.dispatcher.mutator().create_document(req.title, req.creator_id).await {
        Ok(list) => {
            info!("Created presentation {}", list.document.id);
            Ok(HttpResponse::Created().json(PresentationResponse::from(list)))
        }
        Err(e) => {
            error!("Failed to create presentation: {}", e);
            Err(e.into())
        }
    }
}

pub async fn get_presentation(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let list = state.dispatcher.mutator().slide_list(id).await?;
    Ok(HttpResponse::Ok().json(PresentationResponse::from(list)))
}

/// Appends a slide and refreshes every client in the presentation's channel.
pub async fn add_slide(
    path: web::Path<Uuid>,
    body: Option<web::Json<NewSlide>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let data: NewSlide = body.map(web::Json::into_inner).unwrap_or_default();
    if let Some(document_id) = data.document_id.filter(|document_id| *document_id != id) {
        warn!("Rejected slide for document {} posted to presentation {}", document_id, id);
        return Err(AppError::ValidationError(format!(
            "documentId {} does not match presentation {}",
            document_id, id
        )));
    }

    let slide = state.dispatcher.mutator().add_slide(id, data).await?;
    if let Err(e) = state.dispatcher.refresh_slide_list(id, id).await {
        warn!("Slide {} added but channel refresh failed: {}", slide.id, e);
    }

    Ok(HttpResponse::Created().json(slide))
}

pub async fn delete_slide(
    path: web::Path<(Uuid, Uuid)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (id, slide_id) = path.into_inner();

    state.dispatcher.mutator().delete_slide(id, slide_id).await?;
    if let Err(e) = state.dispatcher.refresh_slide_list(id, id).await {
        warn!("Slide {} deleted but channel refresh failed: {}", slide_id, e);
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Slide deleted successfully."
    })))
}
