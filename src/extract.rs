use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Extensions the extractor can turn into indexable text. Anything else is
/// an explicit [`ExtractError::UnsupportedType`], not a silent partial read.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: .{0}")]
    UnsupportedType(String),

    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to extract text from pdf {path}: {reason}")]
    Pdf { path: String, reason: String },
}

/// Lowercased extension without the dot; empty string when there is none.
pub fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_supported(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.contains(&file_extension(path).as_str())
}

/// Extract the text content of a document, keyed by file extension.
/// Plain-text formats are decoded as UTF-8 with lossy fallback; PDFs go
/// through the pure-Rust extractor on a blocking thread.
pub async fn extract_text(path: &Path) -> Result<String, ExtractError> {
    let extension = file_extension(path);
    match extension.as_str() {
        "txt" | "md" => {
            let bytes = tokio::fs::read(path).await.map_err(|source| ExtractError::Io {
                path: path.display().to_string(),
                source,
            })?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        "pdf" => extract_pdf_text(path.to_path_buf()).await,
        _ => Err(ExtractError::UnsupportedType(extension)),
    }
}

async fn extract_pdf_text(path: PathBuf) -> Result<String, ExtractError> {
    let path_display = path.display().to_string();
    debug!(path = %path_display, "extracting pdf text");
    let result = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path)).await;
    match result {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::Pdf {
            path: path_display,
            reason: e.to_string(),
        }),
        Err(e) => Err(ExtractError::Pdf {
            path: path_display,
            reason: format!("extraction task failed: {e}"),
        }),
    }
}
