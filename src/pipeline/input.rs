//! Input resolution: a path, URL or byte buffer becomes a local PDF file.
//!
//! Both pdfium (rendering) and lopdf (outline writing) want the same file,
//! so every input is materialised on disk once. Downloads and in-memory
//! buffers live in a `TempDir` owned by [`ResolvedInput`]; dropping it
//! removes the file. The `%PDF` magic is checked up front so a stray HTML
//! error page fails here with [`Pdf2TocError::NotAPdf`] instead of deep in a
//! parser.

use crate::error::Pdf2TocError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// A PDF available on the local file system.
pub enum ResolvedInput {
    /// The caller's own file.
    Local(PathBuf),
    /// Fetched from a URL into a temp directory.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
    /// Spilled from an in-memory buffer into a temp directory.
    Spilled { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } | ResolvedInput::Spilled { path, .. } => path,
        }
    }

    /// File name used to derive the default output name.
    pub fn file_name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string())
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or HTTP(S) URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2TocError> {
    if input.trim().is_empty() {
        return Err(Pdf2TocError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input))
    }
}

/// Write `bytes` to a managed temp file named `name`.
pub fn spill_bytes(bytes: &[u8], name: &str) -> Result<ResolvedInput, Pdf2TocError> {
    let temp_dir = TempDir::new().map_err(|e| Pdf2TocError::Internal(format!("tempdir: {e}")))?;
    let path = temp_dir.path().join(sanitize_file_name(name));
    check_magic(&path, bytes)?;
    std::fs::write(&path, bytes)
        .map_err(|e| Pdf2TocError::Internal(format!("tempfile write: {e}")))?;
    debug!("Spilled {} bytes to {}", bytes.len(), path.display());
    Ok(ResolvedInput::Spilled {
        path,
        _temp_dir: temp_dir,
    })
}

fn resolve_local(path: &Path) -> Result<ResolvedInput, Pdf2TocError> {
    let path = path.to_path_buf();
    if !path.exists() {
        return Err(Pdf2TocError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2TocError::PermissionDenied { path });
        }
        Err(_) => return Err(Pdf2TocError::FileNotFound { path }),
    };

    let mut head = [0u8; 4];
    let read = file.read(&mut head).unwrap_or(0);
    check_magic(&path, &head[..read])?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

fn check_magic(path: &Path, bytes: &[u8]) -> Result<(), Pdf2TocError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(Pdf2TocError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, Pdf2TocError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| Pdf2TocError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2TocError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let temp_dir = TempDir::new().map_err(|e| Pdf2TocError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(filename_from_url(url));
    check_magic(&path, &bytes)?;
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| Pdf2TocError::Internal(format!("Failed to write temp file: {e}")))?;

    info!("Downloaded {} bytes to {}", bytes.len(), path.display());
    Ok(ResolvedInput::Downloaded {
        path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of `url` when it names a file, else `downloaded.pdf`.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .map(|last| sanitize_file_name(&last))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if base.is_empty() {
        "document.pdf".to_string()
    } else {
        base
    }
}
