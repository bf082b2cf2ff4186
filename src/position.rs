use crate::document::{DocumentKind, DocumentView};

/// Where a selection sits in the book. Every field is optional; unknown
/// values only shorten the rendered fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionInfo {
    pub page: Option<u32>,
    pub total_pages: Option<u32>,
    pub percent: Option<u32>,
    pub chapter: Option<String>,
}

impl PositionInfo {
    /// Paginated documents use the current page; flowing documents resolve
    /// the page from `selection_anchor`, or from the current position when
    /// no anchor is given.
    pub fn resolve(doc: &dyn DocumentView, selection_anchor: Option<&str>) -> Self {
        let page = match doc.kind() {
            DocumentKind::Paginated => doc.current_page(),
            DocumentKind::Flowing => selection_anchor
                .map(str::to_string)
                .or_else(|| doc.current_position())
                .and_then(|anchor| doc.page_of_position(&anchor)),
        }
        .filter(|p| *p > 0);

        let total_pages = doc.page_count().filter(|t| *t > 0);
        let chapter = page
            .and_then(|p| doc.chapter_title(p))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Self::new(page, total_pages, chapter)
    }

    pub fn new(page: Option<u32>, total_pages: Option<u32>, chapter: Option<String>) -> Self {
        let percent = match (page, total_pages) {
            (Some(p), Some(t)) if p > 0 && t > 0 => {
                Some((f64::from(p) / f64::from(t) * 100.0).round() as u32)
            }
            _ => None,
        };
        Self {
            page,
            total_pages,
            percent,
            chapter,
        }
    }

    /// `" (Page N - P%)"`, `" (Page N)"` or `""`, then `" - <chapter>"` when
    /// a chapter title is known.
    pub fn fragment(&self) -> String {
        let mut out = match (self.page, self.percent) {
            (Some(page), Some(percent)) => format!(" (Page {page} - {percent}%)"),
            (Some(page), None) => format!(" (Page {page})"),
            _ => String::new(),
        };
        if let Some(chapter) = &self.chapter {
            out.push_str(&format!(" - {chapter}"));
        }
        out
    }
}

/// Human-readable position fragment for a selection. Never fails.
pub fn format_position(doc: &dyn DocumentView, selection_anchor: Option<&str>) -> String {
    PositionInfo::resolve(doc, selection_anchor).fragment()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_and_total_render_percent() {
        let info = PositionInfo::new(Some(45), Some(180), None);
        assert_eq!(info.percent, Some(25));
        assert_eq!(info.fragment(), " (Page 45 - 25%)");
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(PositionInfo::new(Some(1), Some(8), None).percent, Some(13));
        assert_eq!(PositionInfo::new(Some(1), Some(3), None).percent, Some(33));
    }

    #[test]
    fn page_only() {
        assert_eq!(PositionInfo::new(Some(7), None, None).fragment(), " (Page 7)");
        assert_eq!(PositionInfo::new(Some(7), Some(0), None).fragment(), " (Page 7)");
    }

    #[test]
    fn nothing_known_is_empty() {
        assert_eq!(PositionInfo::new(None, Some(100), None).fragment(), "");
    }

    #[test]
    fn chapter_is_appended_to_every_branch() {
        let chapter = Some("The Beach".to_string());
        assert_eq!(
            PositionInfo::new(Some(45), Some(180), chapter.clone()).fragment(),
            " (Page 45 - 25%) - The Beach"
        );
        assert_eq!(
            PositionInfo::new(Some(45), None, chapter.clone()).fragment(),
            " (Page 45) - The Beach"
        );
        assert_eq!(PositionInfo::new(None, None, chapter).fragment(), " - The Beach");
    }
}
