//! Locates the Haar cascade used for face detection, downloading the stock
//! OpenCV frontal-face cascade into the user cache on first use.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::{CASCADE_MODEL_NAME, CASCADE_MODEL_URL};

/// Marker every OpenCV FileStorage XML document carries near its start.
const STORAGE_MARKER: &str = "<opencv_storage>";

/// Bytes written between progress reports.
const PROGRESS_CHUNK: usize = 128 * 1024;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("model file not found: {0}")]
    Missing(PathBuf),
    #[error("could not determine cache directory")]
    NoCacheDir,
    #[error("failed to create cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download failed for {url}: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("{url} did not return an OpenCV model file")]
    NotAModel { url: String },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Finds the face detection cascade.
///
/// An explicit path is used as-is and must exist. Otherwise the stock
/// frontal-face cascade is looked up in the cache, then next to the
/// executable under `models/`, and downloaded into the cache on a miss.
pub fn resolve_cascade(
    explicit: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(ModelResolveError::Missing(path.to_path_buf()))
        };
    }
    let bundled = bundled_model_dir();
    resolve(
        CASCADE_MODEL_NAME,
        CASCADE_MODEL_URL,
        bundled.as_deref(),
        progress,
    )
}

/// Resolves `name` from the cache, then `bundled_dir`, then `url`.
pub fn resolve(
    name: &str,
    url: &str,
    bundled_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    resolve_in(&model_cache_dir()?, name, url, bundled_dir, progress)
}

fn resolve_in(
    cache_dir: &Path,
    name: &str,
    url: &str,
    bundled_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let candidates = std::iter::once(cache_dir).chain(bundled_dir);
    if let Some(found) = candidates.map(|dir| dir.join(name)).find(|p| p.is_file()) {
        log::debug!("Using model {}", found.display());
        return Ok(found);
    }

    fs::create_dir_all(cache_dir).map_err(|source| ModelResolveError::CacheDir {
        path: cache_dir.to_path_buf(),
        source,
    })?;
    log::info!("Downloading {name} from {url}");
    let dest = cache_dir.join(name);
    download(url, &dest, progress)?;
    Ok(dest)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/FaceWatch/models/`
/// - Linux: `$XDG_CACHE_HOME/FaceWatch/models/` or `~/.cache/FaceWatch/models/`
/// - Windows: `%LOCALAPPDATA%/FaceWatch/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    let base = if cfg!(target_os = "macos") {
        dirs::data_dir()
    } else {
        dirs::cache_dir()
    };
    base.map(|d| d.join("FaceWatch").join("models"))
        .ok_or(ModelResolveError::NoCacheDir)
}

fn bundled_model_dir() -> Option<PathBuf> {
    let exe = env::current_exe().ok()?;
    Some(exe.parent()?.join("models"))
}

/// Fetches `url` into `dest` through a `.part` file that is renamed only
/// once the body looks like an OpenCV model.
fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let response = reqwest::blocking::get(url).map_err(|source| ModelResolveError::Download {
        url: url.to_string(),
        source,
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(ModelResolveError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let total = response.content_length().unwrap_or(0);
    let body = response.bytes().map_err(|source| ModelResolveError::Download {
        url: url.to_string(),
        source,
    })?;
    if !looks_like_storage(&body) {
        return Err(ModelResolveError::NotAModel {
            url: url.to_string(),
        });
    }

    let part = dest.with_extension("part");
    let result = write_with_progress(&part, &body, total, progress.as_deref())
        .and_then(|()| fs::rename(&part, dest));
    result.map_err(|source| {
        let _ = fs::remove_file(&part);
        ModelResolveError::Write {
            path: dest.to_path_buf(),
            source,
        }
    })
}

fn write_with_progress(
    path: &Path,
    body: &[u8],
    total: u64,
    progress: Option<&(dyn Fn(u64, u64) + Send)>,
) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    let mut written = 0u64;
    for chunk in body.chunks(PROGRESS_CHUNK) {
        file.write_all(chunk)?;
        written += chunk.len() as u64;
        if let Some(report) = progress {
            report(written, total);
        }
    }
    file.sync_all()
}

fn looks_like_storage(body: &[u8]) -> bool {
    let head = &body[..body.len().min(4096)];
    String::from_utf8_lossy(head).contains(STORAGE_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const UNREACHABLE: &str = "http://invalid.nonexistent.example.com/cascade.xml";

    #[test]
    fn test_cached_model_wins_over_bundled() {
        let tmp = TempDir::new().unwrap();
        let (cache, bundled) = (tmp.path().join("cache"), tmp.path().join("bundled"));
        for dir in [&cache, &bundled] {
            fs::create_dir_all(dir).unwrap();
            fs::write(dir.join("cascade.xml"), b"<opencv_storage/>").unwrap();
        }

        let path = resolve_in(&cache, "cascade.xml", UNREACHABLE, Some(&bundled), None).unwrap();
        assert_eq!(path, cache.join("cascade.xml"));
    }

    #[test]
    fn test_bundled_model_used_when_cache_empty() {
        let tmp = TempDir::new().unwrap();
        let (cache, bundled) = (tmp.path().join("cache"), tmp.path().join("bundled"));
        fs::create_dir_all(&bundled).unwrap();
        fs::write(bundled.join("cascade.xml"), b"bundled").unwrap();

        let path = resolve_in(&cache, "cascade.xml", UNREACHABLE, Some(&bundled), None).unwrap();
        assert_eq!(path, bundled.join("cascade.xml"));
    }

    #[test]
    fn test_explicit_cascade_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.xml");
        fs::write(&path, b"x").unwrap();
        assert_eq!(resolve_cascade(Some(&path), None).unwrap(), path);
    }

    #[test]
    fn test_missing_explicit_cascade_is_an_error() {
        let result = resolve_cascade(Some(Path::new("/nonexistent/cascade.xml")), None);
        assert!(matches!(result, Err(ModelResolveError::Missing(_))));
    }

    #[test]
    fn test_explicit_directory_is_not_a_cascade() {
        let tmp = TempDir::new().unwrap();
        let result = resolve_cascade(Some(tmp.path()), None);
        assert!(matches!(result, Err(ModelResolveError::Missing(_))));
    }

    #[test]
    fn test_cache_dir_is_app_scoped() {
        let path = model_cache_dir().unwrap();
        assert!(path.ends_with("FaceWatch/models"));
    }

    #[test]
    fn test_failed_download_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("cascade.xml");
        assert!(download(UNREACHABLE, &dest, None).is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }

    #[test]
    fn test_storage_marker_detection() {
        assert!(looks_like_storage(
            b"<?xml version=\"1.0\"?>\n<opencv_storage>\n<cascade/>"
        ));
        assert!(!looks_like_storage(b"<!DOCTYPE html><html>captive portal</html>"));
        assert!(!looks_like_storage(b""));
    }

    #[test]
    fn test_write_reports_progress_per_chunk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("model.part");
        let body = vec![7u8; PROGRESS_CHUNK * 2 + 10];
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let report = move |done: u64, total: u64| sink.lock().unwrap().push((done, total));

        write_with_progress(&path, &body, body.len() as u64, Some(&report)).unwrap();

        let total = body.len() as u64;
        let chunk = PROGRESS_CHUNK as u64;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(chunk, total), (2 * chunk, total), (total, total)]
        );
        assert_eq!(fs::read(&path).unwrap().len(), body.len());
    }
}
