use std::path::Path;

use crate::context::truncate_tail;
use crate::document::Annotation;

pub const NOTEBOOK_SEPARATOR: &str = "--- Notebook Content ---";

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Render annotations as `Highlight:` / `Note:` / `Chapter:` / `Page:` lines,
/// one blank line after each annotation.
pub fn format_annotations(annotations: &[Annotation]) -> String {
    let mut out = String::new();
    for annotation in annotations {
        if let Some(text) = present(&annotation.text) {
            out.push_str(&format!("Highlight: {text}\n"));
        }
        if let Some(note) = present(&annotation.note) {
            out.push_str(&format!("Note: {note}\n"));
        }
        if let Some(chapter) = present(&annotation.chapter) {
            out.push_str(&format!("Chapter: {chapter}\n"));
        }
        if let Some(page) = annotation.pageno {
            out.push_str(&format!("Page: {page}\n"));
        }
        out.push('\n');
    }
    out
}

/// Render notebook file contents. JSON objects and arrays are re-serialized
/// canonically; anything else is included raw. Blank input renders nothing.
pub fn render_notebook(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }
    let structured = serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
        .and_then(|v| serde_json::to_string_pretty(&v).ok());

    Some(match structured {
        Some(canonical) => format!("Notebook Data:\n{canonical}"),
        None => format!("Notebook Content (raw):\n{raw}"),
    })
}

/// Read and render the notebook. Any read failure means no notebook content.
pub async fn load_notebook(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => render_notebook(&raw),
        Err(e) => {
            tracing::debug!(path = %path.display(), "notebook not included: {e}");
            None
        }
    }
}

/// Highlights, notes and (optionally) the notebook as one prompt string,
/// tail-truncated to `max_text_length` characters.
pub async fn build_notes_context(
    annotations: &[Annotation],
    include_notebook: bool,
    notebook_path: Option<&Path>,
    max_text_length: usize,
) -> String {
    let mut context = format_annotations(annotations);

    let notebook = match (include_notebook, notebook_path) {
        (true, Some(path)) => load_notebook(path).await,
        _ => None,
    };

    if let Some(notebook) = notebook {
        if !context.trim().is_empty() {
            context.push_str(NOTEBOOK_SEPARATOR);
            context.push('\n');
        } else {
            context.clear();
        }
        context.push_str(&notebook);
    }

    truncate_tail(&context, max_text_length).to_string()
}
