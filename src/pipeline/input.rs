//! Input validation: make sure a local path is a readable PDF before pdfium sees it.
//!
//! Checking the `%PDF` magic bytes up front gives callers a meaningful
//! error instead of an opaque pdfium load failure.

use crate::error::ScribeError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` exists, is readable, and starts with the PDF magic bytes.
pub fn resolve_local(path: impl AsRef<Path>) -> Result<PathBuf, ScribeError> {
    let path = path.as_ref().to_path_buf();

    if !path.exists() {
        return Err(ScribeError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(ScribeError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ScribeError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(ScribeError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}

/// Display name for a path: its final component, or the whole path if it has none.
pub fn display_filename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file() {
        let err = resolve_local("/definitely/not/here.pdf").unwrap_err();
        assert!(matches!(err, ScribeError::FileNotFound { .. }));
    }

    #[test]
    fn wrong_magic_bytes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello world").unwrap();
        let err = resolve_local(tmp.path()).unwrap_err();
        match err {
            ScribeError::NotAPdf { magic, .. } => assert_eq!(&magic, b"hell"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pdf_magic_accepted() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.7\n").unwrap();
        let path = resolve_local(tmp.path()).unwrap();
        assert_eq!(path, tmp.path());
    }

    #[test]
    fn filename_from_path() {
        assert_eq!(display_filename(Path::new("/a/b/report.pdf")), "report.pdf");
    }
}
