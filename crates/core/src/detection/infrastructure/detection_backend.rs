use std::sync::{Mutex, OnceLock};

use crate::detection::domain::face_locator::{FaceLocator, LocatedFace};
use crate::error::DetectionError;
use crate::shared::frame::Frame;

/// Process-wide slot for the face detection backend.
///
/// Written exactly once at startup: either with a working locator or with
/// the reason none could be built. Every request consults the slot first,
/// so an unavailable backend fails fast with the recorded reason instead of
/// retrying the load per request.
pub struct DetectionBackend {
    slot: OnceLock<Result<Mutex<Box<dyn FaceLocator>>, String>>,
}

/// The backend used by the binary.
pub static FACE_BACKEND: DetectionBackend = DetectionBackend::new();

impl DetectionBackend {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// Installs a locator. Returns `false` if the slot was already set.
    pub fn install(&self, locator: Box<dyn FaceLocator>) -> bool {
        self.slot.set(Ok(Mutex::new(locator))).is_ok()
    }

    /// Records why no locator is available. Returns `false` if the slot was
    /// already set.
    pub fn mark_unavailable(&self, reason: impl Into<String>) -> bool {
        self.slot.set(Err(reason.into())).is_ok()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.slot.get(), Some(Ok(_)))
    }

    pub fn check_ready(&self) -> Result<(), DetectionError> {
        self.locator().map(|_| ())
    }

    pub fn locate_faces(&self, frame: &Frame) -> Result<Vec<LocatedFace>, DetectionError> {
        let mut locator = self
            .locator()?
            .lock()
            .map_err(|e| DetectionError::Locator(format!("Lock poisoned: {e}")))?;
        locator
            .locate_faces(frame)
            .map_err(|e| DetectionError::Locator(e.to_string()))
    }

    fn locator(&self) -> Result<&Mutex<Box<dyn FaceLocator>>, DetectionError> {
        match self.slot.get() {
            Some(Ok(locator)) => Ok(locator),
            Some(Err(reason)) => Err(DetectionError::BackendUnavailable(reason.clone())),
            None => Err(DetectionError::BackendUnavailable(
                "detection backend was not initialised".to_string(),
            )),
        }
    }
}

impl Default for DetectionBackend {
    fn default() -> Self {
        Self::new()
    }
}
