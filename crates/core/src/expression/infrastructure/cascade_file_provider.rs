use std::path::{Path, PathBuf};

use super::cascade_smile_detector::CascadeSmileDetector;
use super::haar_cascade::HaarCascade;
use crate::detection::infrastructure::model_resolver::model_cache_dir;
use crate::expression::domain::smile_detector::{SmileDetector, SmileDetectorSource};
use crate::shared::constants::{
    OPENCV_CASCADE_DIRS, SMILE_CASCADE_ENV, SMILE_CASCADE_FILENAME, SMILE_MIN_NEIGHBORS,
    SMILE_SCALE_FACTOR,
};

/// Loads the smile cascade from disk on every request.
///
/// Search order:
/// 1. Explicit path from configuration
/// 2. `FACEMOOD_SMILE_CASCADE` environment variable
/// 3. Configured extra directories
/// 4. Model cache directory
/// 5. Common OpenCV data directories
///
/// A missing cascade is not an error; the estimator falls back to its
/// brightness heuristic. A cascade that exists but does not parse is.
pub struct CascadeFileProvider {
    explicit: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
    system_dirs: bool,
    env_lookup: bool,
    scale_factor: f64,
    min_neighbors: usize,
}

impl CascadeFileProvider {
    pub fn new(explicit: Option<PathBuf>, search_dirs: Vec<PathBuf>) -> Self {
        Self {
            explicit,
            search_dirs,
            system_dirs: true,
            env_lookup: true,
            scale_factor: SMILE_SCALE_FACTOR,
            min_neighbors: SMILE_MIN_NEIGHBORS,
        }
    }

    /// Restricts the search to the explicit path and configured directories.
    pub fn without_system_dirs(mut self) -> Self {
        self.system_dirs = false;
        self
    }

    /// Ignores `FACEMOOD_SMILE_CASCADE`.
    pub fn without_env(mut self) -> Self {
        self.env_lookup = false;
        self
    }

    pub fn with_detection_params(mut self, scale_factor: f64, min_neighbors: usize) -> Self {
        self.scale_factor = scale_factor;
        self.min_neighbors = min_neighbors;
        self
    }

    /// First existing cascade file in search order.
    pub fn locate(&self) -> Option<PathBuf> {
        let from_env = self
            .env_lookup
            .then(|| std::env::var_os(SMILE_CASCADE_ENV))
            .flatten()
            .map(PathBuf::from);
        self.locate_with(from_env)
    }

    fn locate_with(&self, from_env: Option<PathBuf>) -> Option<PathBuf> {
        self.candidates(from_env).into_iter().find(|path| {
            let found = path.is_file();
            if !found {
                log::trace!("No smile cascade at {}", path.display());
            }
            found
        })
    }

    fn candidates(&self, from_env: Option<PathBuf>) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.explicit.iter().cloned().chain(from_env).collect();
        paths.extend(
            self.search_dirs
                .iter()
                .map(|dir| dir.join(SMILE_CASCADE_FILENAME)),
        );
        if self.system_dirs {
            if let Ok(dir) = model_cache_dir() {
                paths.push(dir.join(SMILE_CASCADE_FILENAME));
            }
            paths.extend(
                OPENCV_CASCADE_DIRS
                    .iter()
                    .map(|dir| Path::new(dir).join(SMILE_CASCADE_FILENAME)),
            );
        }
        paths
    }

    fn load_from(
        &self,
        path: Option<PathBuf>,
    ) -> Result<Option<Box<dyn SmileDetector>>, Box<dyn std::error::Error>> {
        let Some(path) = path else {
            log::debug!("Smile cascade not found; using brightness heuristic");
            return Ok(None);
        };
        let cascade = HaarCascade::from_file(&path)
            .map_err(|e| format!("failed to load {}: {e}", path.display()))?;
        let detector = CascadeSmileDetector::new(cascade, self.scale_factor, self.min_neighbors)?;
        Ok(Some(Box::new(detector)))
    }
}

impl SmileDetectorSource for CascadeFileProvider {
    fn load(&self) -> Result<Option<Box<dyn SmileDetector>>, Box<dyn std::error::Error>> {
        self.load_from(self.locate())
    }
}
