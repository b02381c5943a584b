//! Trace output directory and file naming helpers

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::Result;

/// Ensure `<workspace>/trace` exists and return it.
pub fn ensure_trace_dir(workspace: &Path) -> Result<PathBuf> {
    let dir = workspace.join("trace");
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// `file://` URI for a new trace output file, timestamped to the second.
///
/// OpenOCD expects the destination as a URI, e.g.
/// `file:///work/trace/trace_1700000000.trace`.
pub fn trace_file_uri(trace_dir: &Path, prefix: &str, extension: &str) -> String {
    let stamp = Utc::now().timestamp();
    format!(
        "file://{}/{}_{}.{}",
        trace_dir.display(),
        prefix,
        stamp,
        extension
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_trace_dir_creates_and_reuses() {
        let ws = tempfile::tempdir().unwrap();
        let dir = ensure_trace_dir(ws.path()).unwrap();
        assert!(dir.ends_with("trace"));
        assert!(dir.is_dir());
        // second call is a no-op
        let again = ensure_trace_dir(ws.path()).unwrap();
        assert_eq!(dir, again);
    }

    #[test]
    fn test_trace_file_uri_shape() {
        let uri = trace_file_uri(Path::new("/work/trace"), "htrace", "svdat");
        assert!(uri.starts_with("file:///work/trace/htrace_"));
        assert!(uri.ends_with(".svdat"));
    }
}
