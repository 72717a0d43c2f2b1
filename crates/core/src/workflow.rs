//! The upload → crop → restoring → result workflow.
//!
//! A [`Session`] holds one document's journey through the four steps. Each
//! [`Stage`] variant carries only what is valid in that step, so a restored
//! image can never exist next to an empty upload slot.
//!
//! ```text
//! Upload ──upload──▶ Crop ──begin_restore──▶ Restoring ──ok──▶ Result
//!                     ▲ ▲                        │               │
//!                     │ └─────────── err ────────┘               │
//!                     └──────────────── reprocess ───────────────┘
//! ```
//!
//! `reset` returns to `Upload` from anywhere.

use crate::encoding::{self, DisplaySize, EncodedImage};
use crate::error::{AppError, Result};
use crate::restore::{ImageEditor, RestorationClient};
use crate::selection::{Point, SelectionRect, SelectionTracker};
use image::ImageFormat;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Base name of the downloadable artifact.
pub const RESTORED_FILE_STEM: &str = "restored-exam";

/// Observable step of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Upload,
    Crop,
    Restoring,
    Result,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Upload => "upload",
            Step::Crop => "crop",
            Step::Restoring => "restoring",
            Step::Result => "result",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The uploaded image together with how it is shown and what is selected on it.
#[derive(Debug, Clone)]
pub struct Canvas {
    original: EncodedImage,
    display: DisplaySize,
    selection: SelectionTracker,
}

impl Canvas {
    fn new(original: EncodedImage, native: DisplaySize) -> Self {
        Self {
            original,
            display: native,
            selection: SelectionTracker::new(),
        }
    }

    pub fn original(&self) -> &EncodedImage {
        &self.original
    }

    pub fn selection(&self) -> SelectionRect {
        self.selection.rect()
    }
}

/// Per-step state. Fields exist only in the steps where they are meaningful.
#[derive(Debug, Clone, Default)]
pub enum Stage {
    #[default]
    Upload,
    Crop {
        canvas: Canvas,
    },
    Restoring {
        canvas: Canvas,
        cropped: Option<EncodedImage>,
        /// Id of the [`RestoreJob`] this step is waiting on.
        job: u64,
    },
    Result {
        canvas: Canvas,
        cropped: Option<EncodedImage>,
        restored: EncodedImage,
    },
}

impl Stage {
    pub fn step(&self) -> Step {
        match self {
            Stage::Upload => Step::Upload,
            Stage::Crop { .. } => Step::Crop,
            Stage::Restoring { .. } => Step::Restoring,
            Stage::Result { .. } => Step::Result,
        }
    }

    fn canvas(&self) -> Option<&Canvas> {
        match self {
            Stage::Upload => None,
            Stage::Crop { canvas }
            | Stage::Restoring { canvas, .. }
            | Stage::Result { canvas, .. } => Some(canvas),
        }
    }
}

/// The image handed to the restoration service for one request.
#[derive(Debug, Clone)]
pub struct RestoreJob {
    pub source: EncodedImage,
    /// True when `source` is an extracted region rather than the full upload.
    pub is_region: bool,
    id: u64,
}

impl RestoreJob {
    /// Unique within the session that issued it, across resets.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// The restored artifact, ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Name of the downloadable artifact for a given MIME type.
///
/// Unknown types fall back to `.png`.
pub fn restored_filename(mime_type: &str) -> String {
    let ext = ImageFormat::from_mime_type(mime_type)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("png");
    format!("{}.{}", RESTORED_FILE_STEM, ext)
}

/// One user attempt at restoring one document.
#[derive(Debug, Default)]
pub struct Session {
    stage: Stage,
    error: Option<String>,
    next_job: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> Step {
        self.stage.step()
    }

    /// The last user-facing error message, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn original(&self) -> Option<&EncodedImage> {
        self.stage.canvas().map(Canvas::original)
    }

    pub fn cropped(&self) -> Option<&EncodedImage> {
        match &self.stage {
            Stage::Restoring { cropped, .. } | Stage::Result { cropped, .. } => cropped.as_ref(),
            _ => None,
        }
    }

    pub fn restored(&self) -> Option<&EncodedImage> {
        match &self.stage {
            Stage::Result { restored, .. } => Some(restored),
            _ => None,
        }
    }

    /// The "before" image of a before/after comparison.
    pub fn before_image(&self) -> Option<&EncodedImage> {
        self.cropped().or_else(|| self.original())
    }

    pub fn selection(&self) -> Option<SelectionRect> {
        self.stage.canvas().map(Canvas::selection)
    }

    /// Reads and encodes `path` as the session's original image.
    ///
    /// On failure the session stays in `Upload` with the error recorded.
    pub fn upload_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.guard(Step::Upload, "upload an image")?;
        let loaded = encoding::encode_file(path);
        self.accept_upload(loaded)
    }

    /// Same as [`Session::upload_file`] for contents already in memory.
    pub fn upload_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.guard(Step::Upload, "upload an image")?;
        let loaded = encoding::encode_bytes(bytes);
        self.accept_upload(loaded)
    }

    fn accept_upload(&mut self, loaded: Result<EncodedImage>) -> Result<()> {
        let accepted = loaded.and_then(|image| {
            let native = encoding::native_size(&image)?;
            Ok((image, native))
        });

        match accepted {
            Ok((original, native)) => {
                info!(
                    mime_type = original.mime_type(),
                    width = native.width,
                    height = native.height,
                    "image uploaded"
                );
                self.stage = Stage::Crop { canvas: Canvas::new(original, native) };
                self.error = None;
                Ok(())
            }
            Err(e) => {
                warn!("upload failed: {}", e);
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Records the size the image is shown at. Selections are in this space.
    pub fn set_display_size(&mut self, size: DisplaySize) -> bool {
        match &mut self.stage {
            Stage::Crop { canvas } => {
                canvas.display = size;
                true
            }
            _ => false,
        }
    }

    /// Starts a drag at `pos`. Ignored outside the crop step.
    pub fn begin_selection(&mut self, pos: Point) -> bool {
        self.with_selection(|selection| {
            selection.begin(pos);
            true
        })
    }

    /// Extends the active drag to `pos`. Ignored unless dragging in the crop step.
    pub fn update_selection(&mut self, pos: Point) -> bool {
        self.with_selection(|selection| selection.update(pos))
    }

    /// Finishes the drag, keeping the rectangle.
    pub fn end_selection(&mut self) -> bool {
        self.with_selection(|selection| {
            selection.end();
            true
        })
    }

    fn with_selection(&mut self, f: impl FnOnce(&mut SelectionTracker) -> bool) -> bool {
        match &mut self.stage {
            Stage::Crop { canvas } => f(&mut canvas.selection),
            other => {
                debug!(step = %other.step(), "selection input ignored");
                false
            }
        }
    }

    /// Moves from `Crop` to `Restoring` and returns the image to send.
    ///
    /// A selection larger than the minimum on both axes is cut out of the
    /// original; otherwise the full original is used. If extraction still
    /// fails, the full original is used as well.
    ///
    /// # Errors
    ///
    /// [`AppError::InvalidTransition`] unless the session is in `Crop`. This
    /// is what keeps a second request from starting while one is in flight.
    pub fn begin_restore(&mut self) -> Result<RestoreJob> {
        let mut canvas = match std::mem::take(&mut self.stage) {
            Stage::Crop { canvas } => canvas,
            other => return Err(self.put_back(other, "start a restoration")),
        };

        // A drag still in progress ends here.
        canvas.selection.end();
        let rect = canvas.selection();
        let cropped = if rect.is_degenerate() {
            debug!(?rect, "no usable selection, restoring the full image");
            None
        } else {
            match encoding::extract_region(&canvas.original, canvas.display, rect) {
                Ok(region) => Some(region),
                Err(e) => {
                    warn!(?rect, "falling back to the full image: {}", e);
                    None
                }
            }
        };

        self.next_job += 1;
        let job = RestoreJob {
            source: cropped.clone().unwrap_or_else(|| canvas.original.clone()),
            is_region: cropped.is_some(),
            id: self.next_job,
        };
        debug!(job = job.id, is_region = job.is_region, "restoration started");

        self.stage = Stage::Restoring { canvas, cropped, job: job.id };
        self.error = None;
        Ok(job)
    }

    /// Applies the outcome of `job`, as returned by [`Session::begin_restore`].
    ///
    /// Success moves to `Result`. Any failure moves back to `Crop` with the
    /// message recorded; the upload and selection are kept for a retry.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidTransition`] unless the session is in `Restoring`
    /// - [`AppError::StaleRestore`] if the session is waiting on a different
    ///   job, e.g. because it was reset and restarted since `job` began. The
    ///   session is left untouched.
    pub fn complete_restore(
        &mut self,
        job: &RestoreJob,
        outcome: Result<EncodedImage>,
    ) -> Result<Step> {
        let (canvas, cropped) = match std::mem::take(&mut self.stage) {
            Stage::Restoring { canvas, cropped, job: current } if current == job.id => {
                (canvas, cropped)
            }
            stage @ Stage::Restoring { .. } => {
                debug!(job = job.id, "discarding outcome of a superseded restoration");
                self.stage = stage;
                return Err(AppError::StaleRestore);
            }
            other => return Err(self.put_back(other, "finish a restoration")),
        };

        match outcome {
            Ok(restored) => {
                info!(mime_type = restored.mime_type(), "restoration succeeded");
                self.stage = Stage::Result { canvas, cropped, restored };
            }
            Err(e) => {
                if e.is_unusable_response() {
                    info!("restoration returned no image: {}", e);
                } else {
                    warn!("restoration failed: {}", e);
                }
                self.error = Some(e.to_string());
                self.stage = Stage::Crop { canvas };
            }
        }

        Ok(self.step())
    }

    /// Runs one restoration end to end.
    ///
    /// Restoration failures do not surface as `Err`; they land in
    /// [`Session::error`] and the returned step is `Crop`.
    pub async fn restore<E: ImageEditor>(&mut self, client: &RestorationClient<E>) -> Result<Step> {
        let job = self.begin_restore()?;
        let outcome = client.restore(&job.source, job.source.mime_type()).await;
        self.complete_restore(&job, outcome)
    }

    /// Goes back from `Result` to `Crop` to process the same upload again.
    pub fn reprocess(&mut self) -> Result<()> {
        match std::mem::take(&mut self.stage) {
            Stage::Result { canvas, .. } => {
                self.stage = Stage::Crop { canvas };
                Ok(())
            }
            other => Err(self.put_back(other, "re-process")),
        }
    }

    /// Clears everything and returns to `Upload`.
    pub fn reset(&mut self) {
        debug!(from = %self.step(), "session reset");
        self.stage = Stage::Upload;
        self.error = None;
    }

    /// The restored image as a named file, available in `Result`.
    pub fn download(&self) -> Option<Result<Download>> {
        self.restored().map(|restored| -> Result<Download> {
            Ok(Download {
                filename: restored_filename(restored.mime_type()),
                bytes: restored.decode_bytes()?,
            })
        })
    }

    /// Writes the restored image into `dir` and returns its path.
    pub fn save_restored(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let download = self.download().ok_or(AppError::InvalidTransition {
            from: self.step().as_str(),
            action: "download a result",
        })??;

        let path = dir.as_ref().join(&download.filename);
        fs::write(&path, &download.bytes)?;
        info!(path = %path.display(), "restored image saved");
        Ok(path)
    }

    /// Restores a stage taken out for a transition that does not apply to it.
    fn put_back(&mut self, stage: Stage, action: &'static str) -> AppError {
        let from = stage.step().as_str();
        self.stage = stage;
        AppError::InvalidTransition { from, action }
    }

    fn guard(&self, expected: Step, action: &'static str) -> Result<()> {
        let from = self.step();
        if from == expected {
            Ok(())
        } else {
            Err(AppError::InvalidTransition { from: from.as_str(), action })
        }
    }
}
