//! REST endpoints for creating and loading presentations.

pub mod handlers;

pub use handlers::{add_slide, create_presentation, delete_slide, get_presentation};
