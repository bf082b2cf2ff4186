use crate::config::ContextLimits;
use crate::document::{DocumentKind, DocumentView};

/// Keep at most the last `max_chars` characters of `text`, dropping from the
/// front so the most recently read material survives. Counts Unicode scalar
/// values and never splits one. Idempotent.
pub fn truncate_tail(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    match text.char_indices().rev().nth(max_chars - 1) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}

/// First page of the read-back window: `max(1, current - window)`.
pub fn window_start(current_page: u32, max_page_window: u32) -> u32 {
    current_page.saturating_sub(max_page_window).max(1)
}

/// Text the reader has gone through so far, bounded by `limits`.
///
/// Flowing documents: everything from the start up to the current position.
/// Paginated documents: the window of pages ending at the current page,
/// joined with newlines. Anything the document cannot supply yields less
/// text, never an error.
pub fn extract_document_text(doc: &dyn DocumentView, limits: ContextLimits) -> String {
    let text = match doc.kind() {
        DocumentKind::Flowing => flowing_text(doc),
        DocumentKind::Paginated => paginated_text(doc, limits.max_page_window),
    };
    truncate_tail(&text, limits.max_text_length).to_string()
}

fn flowing_text(doc: &dyn DocumentView) -> String {
    let (Some(start), Some(current)) = (doc.start_position(), doc.current_position()) else {
        tracing::debug!("document position unavailable, no text extracted");
        return String::new();
    };
    doc.text_in_range(&start, &current).unwrap_or_default()
}

fn paginated_text(doc: &dyn DocumentView, max_page_window: u32) -> String {
    let Some(current) = doc.current_page().filter(|p| *p > 0) else {
        tracing::debug!("current page unknown, no text extracted");
        return String::new();
    };

    (window_start(current, max_page_window)..=current)
        .filter_map(|page| doc.page_text(page))
        .map(|text| text.flatten())
        .collect::<Vec<_>>()
        .join("\n")
}
