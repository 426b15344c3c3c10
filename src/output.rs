//! Output types: the generated fragment and the documents built from it.

use crate::error::Image2HtmlError;
use crate::pipeline::postprocess;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// An HTML snippet without `<html>`/`<head>`/`<body>` scaffolding.
///
/// Always fence-stripped and trimmed; see
/// [`crate::pipeline::postprocess::strip_code_fences`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HtmlFragment(String);

impl HtmlFragment {
    /// Normalise raw model output into a fragment.
    pub fn from_model_output(raw: &str) -> Self {
        Self(postprocess::strip_code_fences(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fragment text for the clipboard: blank lines removed.
    pub fn to_clipboard_text(&self) -> String {
        postprocess::strip_blank_lines(&self.0)
    }

    /// Standalone HTML document for download, with the blank-line-stripped
    /// fragment as body content.
    pub fn to_standalone_document(&self) -> String {
        format!(
            "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
<head>\n  \
<meta charset=\"UTF-8\">\n  \
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n  \
<title>Generated UI</title>\n\
</head>\n\
<body>\n\
{}\n\
</body>\n\
</html>",
            self.to_clipboard_text()
        )
    }

    /// Preview document: white page, padded container. Keeps fragments that
    /// assume a light background readable in dark viewers.
    pub fn to_preview_document(&self) -> String {
        format!(
            "<html>\n  <head>\n    <style>body {{ background-color: #ffffff; margin: 0; }}</style>\n  </head>\n  <body>\n    <div style=\"padding: 1rem;\">{}</div>\n  </body>\n</html>\n",
            self.0
        )
    }
}

impl fmt::Display for HtmlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HtmlFragment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Write the standalone document for `fragment` to `path`.
///
/// Uses atomic write (temp file in the same directory + rename) to prevent
/// partial files.
pub async fn save_document(fragment: &HtmlFragment, path: impl AsRef<Path>) -> Result<(), Image2HtmlError> {
    let path = path.as_ref().to_path_buf();
    let document = fragment.to_standalone_document();

    tokio::task::spawn_blocking(move || {
        let write_err = |source: std::io::Error| Image2HtmlError::OutputWriteFailed {
            path: path.clone(),
            source,
        };

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
        std::io::Write::write_all(&mut tmp, document.as_bytes()).map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| Image2HtmlError::Internal(format!("write task failed: {e}")))?
}
