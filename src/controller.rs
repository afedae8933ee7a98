//! Per-session state machine behind the upload page.
//!
//! The lifecycle is a single [`Generation`] value: each variant owns exactly
//! what it may display, so a stale name next to a loading indicator cannot be
//! represented. The selected image owns its preview, and replacing or dropping
//! the image releases that preview.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    clipboard::{Clipboard, ClipboardError},
    models::{ImageUpload, ImageView, MediaType, MediaTypeError, RequestState, SessionView},
    naming::NamingService,
    preview::{PreviewHandle, PreviewStore},
};

/// How long the "copied" indicator stays on after a copy.
pub const COPY_CONFIRMATION: Duration = Duration::from_secs(2);

pub const NO_IMAGE_MESSAGE: &str = "Please upload an image first.";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("A name is already being generated for this image.")]
    Busy,
    #[error("There is no generated name to copy.")]
    NothingToCopy,
    #[error("The selected image is empty.")]
    EmptyImage,
    #[error(transparent)]
    Media(#[from] MediaTypeError),
    #[error(transparent)]
    Clipboard(#[from] ClipboardError),
}

#[derive(Debug)]
pub struct SelectedImage {
    pub file_name: String,
    pub media_type: MediaType,
    pub data: Bytes,
    pub selected_at: DateTime<Utc>,
    preview: PreviewHandle,
}

impl SelectedImage {
    pub fn preview_url(&self) -> String {
        self.preview.url()
    }

    fn view(&self) -> ImageView {
        ImageView {
            file_name: self.file_name.clone(),
            media_type: self.media_type.clone(),
            size_bytes: self.data.len(),
            preview_url: self.preview.url(),
            selected_at: self.selected_at,
        }
    }
}

#[derive(Debug)]
pub enum Generation {
    /// No image. `notice` holds the message shown after generating without one.
    Idle { notice: Option<String> },
    Ready { image: SelectedImage },
    Loading { image: SelectedImage, ticket: u64 },
    Succeeded { image: SelectedImage, name: String, generated_at: DateTime<Utc> },
    Failed { image: SelectedImage, message: String },
}

impl Generation {
    pub fn state(&self) -> RequestState {
        match self {
            Generation::Idle { .. } => RequestState::Idle,
            Generation::Ready { .. } => RequestState::Ready,
            Generation::Loading { .. } => RequestState::Loading,
            Generation::Succeeded { .. } => RequestState::Succeeded,
            Generation::Failed { .. } => RequestState::Failed,
        }
    }

    fn image(&self) -> Option<&SelectedImage> {
        match self {
            Generation::Idle { .. } => None,
            Generation::Ready { image }
            | Generation::Loading { image, .. }
            | Generation::Succeeded { image, .. }
            | Generation::Failed { image, .. } => Some(image),
        }
    }
}

/// Work handed to the naming service once the controller entered `Loading`.
struct Job {
    ticket: u64,
    data: Bytes,
    media_type: MediaType,
}

struct Inner {
    generation: Generation,
    next_ticket: u64,
    copied_at: Option<Instant>,
}

pub struct NamerController {
    id: Uuid,
    previews: PreviewStore,
    naming: Arc<dyn NamingService>,
    inner: Mutex<Inner>,
}

impl NamerController {
    pub fn new(previews: PreviewStore, naming: Arc<dyn NamingService>) -> Self {
        Self {
            id: Uuid::new_v4(),
            previews,
            naming,
            inner: Mutex::new(Inner {
                generation: Generation::Idle { notice: None },
                next_ticket: 0,
                copied_at: None,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RequestState {
        self.inner.lock().generation.state()
    }

    /// Replaces the current image. A rejected upload leaves the state as it was.
    pub fn select_image(&self, upload: ImageUpload) -> Result<SessionView, ControllerError> {
        if upload.data.is_empty() {
            return Err(ControllerError::EmptyImage);
        }
        let media_type = MediaType::resolve(upload.declared_type.as_deref(), &upload.data)?;
        let preview = self.previews.acquire(media_type.clone(), upload.data.clone());
        let image = SelectedImage {
            file_name: upload.file_name,
            media_type,
            data: upload.data,
            selected_at: Utc::now(),
            preview,
        };
        info!("🖼️ Session {} selected '{}' ({}, {} bytes)", self.id, image.file_name, image.media_type, image.data.len());

        let mut inner = self.inner.lock();
        // the previous image, and with it the old preview, is dropped here
        inner.generation = Generation::Ready { image };
        inner.copied_at = None;
        Ok(Self::view_of(self.id, &inner))
    }

    /// Runs one generation. Without an image this only records a notice.
    pub async fn generate(&self) -> Result<SessionView, ControllerError> {
        let Some(job) = self.begin()? else {
            return Ok(self.view());
        };

        let outcome = self.naming.generate_name(&job.data, &job.media_type).await;
        self.finish(job.ticket, outcome.map_err(|e| e.to_string()));
        Ok(self.view())
    }

    fn begin(&self) -> Result<Option<Job>, ControllerError> {
        let mut inner = self.inner.lock();
        let current = std::mem::replace(&mut inner.generation, Generation::Idle { notice: None });
        let image = match current {
            Generation::Loading { image, ticket } => {
                inner.generation = Generation::Loading { image, ticket };
                return Err(ControllerError::Busy);
            }
            Generation::Idle { .. } => {
                debug!("session {} asked to generate without an image", self.id);
                inner.generation = Generation::Idle { notice: Some(NO_IMAGE_MESSAGE.to_string()) };
                return Ok(None);
            }
            Generation::Ready { image }
            | Generation::Succeeded { image, .. }
            | Generation::Failed { image, .. } => image,
        };

        inner.next_ticket += 1;
        let ticket = inner.next_ticket;
        let job = Job { ticket, data: image.data.clone(), media_type: image.media_type.clone() };
        inner.generation = Generation::Loading { image, ticket };
        inner.copied_at = None;
        info!("⏳ Session {} generating (request #{})", self.id, ticket);
        Ok(Some(job))
    }

    fn finish(&self, ticket: u64, outcome: Result<String, String>) {
        let mut inner = self.inner.lock();
        let current = std::mem::replace(&mut inner.generation, Generation::Idle { notice: None });
        inner.generation = match current {
            Generation::Loading { image, ticket: active } if active == ticket => match outcome {
                Ok(name) => {
                    info!("✅ Session {} named '{}': {}", self.id, image.file_name, name);
                    Generation::Succeeded { image, name, generated_at: Utc::now() }
                }
                Err(message) => {
                    warn!("❌ Session {} generation failed: {}", self.id, message);
                    Generation::Failed { image, message }
                }
            },
            other => {
                debug!("session {} discarded stale result of request #{}", self.id, ticket);
                other
            }
        };
    }

    /// Writes the displayed name to `clipboard` and turns the copied indicator on.
    pub fn copy(&self, clipboard: &dyn Clipboard) -> Result<String, ControllerError> {
        let name = match &self.inner.lock().generation {
            Generation::Succeeded { name, .. } => name.clone(),
            _ => return Err(ControllerError::NothingToCopy),
        };
        clipboard.write_text(&name)?;

        let mut inner = self.inner.lock();
        if matches!(&inner.generation, Generation::Succeeded { name: shown, .. } if *shown == name) {
            inner.copied_at = Some(Instant::now());
        }
        Ok(name)
    }

    pub fn view(&self) -> SessionView {
        Self::view_of(self.id, &self.inner.lock())
    }

    fn view_of(id: Uuid, inner: &Inner) -> SessionView {
        let generation = &inner.generation;
        let (name, generated_at, error) = match generation {
            Generation::Idle { notice } => (None, None, notice.clone()),
            Generation::Succeeded { name, generated_at, .. } => (Some(name.clone()), Some(*generated_at), None),
            Generation::Failed { message, .. } => (None, None, Some(message.clone())),
            Generation::Ready { .. } | Generation::Loading { .. } => (None, None, None),
        };
        let copied = name.is_some()
            && inner.copied_at.is_some_and(|at| at.elapsed() < COPY_CONFIRMATION);

        SessionView {
            id,
            state: generation.state(),
            image: generation.image().map(SelectedImage::view),
            name,
            generated_at,
            error,
            copied,
            can_generate: generation.image().is_some() && !matches!(generation, Generation::Loading { .. }),
        }
    }
}
