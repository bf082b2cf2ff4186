//! Read-only accessors the host exposes for the open document.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Fixed pages (PDF, DjVu, comics).
    Paginated,
    /// Reflowable text addressed by opaque positions (EPUB, HTML, plain text).
    Flowing,
}

/// Text of one page as the renderer hands it over.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PageText {
    PlainText(String),
    /// Blocks of spans; a span may or may not carry a word.
    BlockSpans(Vec<Vec<Span>>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Span {
    #[serde(default)]
    pub word: Option<String>,
}

impl Span {
    pub fn word(word: impl Into<String>) -> Self {
        Self {
            word: Some(word.into()),
        }
    }
}

impl PageText {
    /// Plain text passes through; spans contribute their `word` in encounter
    /// order, joined by a single space.
    pub fn flatten(&self) -> String {
        match self {
            Self::PlainText(text) => text.clone(),
            Self::BlockSpans(blocks) => blocks
                .iter()
                .flatten()
                .filter_map(|span| span.word.as_deref())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// A highlight or note the reader made.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Annotation {
    pub text: Option<String>,
    pub note: Option<String>,
    pub chapter: Option<String>,
    pub pageno: Option<u32>,
}

/// Host document. Implementations must not panic; anything unknown is
/// reported as `None`.
pub trait DocumentView {
    fn kind(&self) -> DocumentKind;

    /// 1-based current page. Flowing documents may report a virtual page.
    fn current_page(&self) -> Option<u32>;

    fn page_count(&self) -> Option<u32>;

    fn page_text(&self, page: u32) -> Option<PageText>;

    /// Position of the first character (flowing documents).
    fn start_position(&self) -> Option<String>;

    /// Current reading position (flowing documents).
    fn current_position(&self) -> Option<String>;

    /// Text from `from` up to, not including, `to`.
    fn text_in_range(&self, from: &str, to: &str) -> Option<String>;

    /// Page containing `position`.
    fn page_of_position(&self, position: &str) -> Option<u32>;

    fn chapter_title(&self, _page: u32) -> Option<String> {
        None
    }

    fn file_path(&self) -> Option<&Path> {
        None
    }
}

/// Default virtual page size for [`TextDocument`], in characters.
pub const DEFAULT_CHARS_PER_PAGE: usize = 2000;

/// Flowing document over an in-memory string. Positions are character
/// offsets rendered as decimal strings; pages are fixed runs of characters.
#[derive(Debug, Clone)]
pub struct TextDocument {
    chars: Vec<char>,
    position: usize,
    chars_per_page: usize,
    path: Option<PathBuf>,
    chapters: Vec<(u32, String)>,
}

impl TextDocument {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            position: 0,
            chars_per_page: DEFAULT_CHARS_PER_PAGE,
            path: None,
            chapters: Vec::new(),
        }
    }

    pub fn open(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(&text).with_path(path.to_path_buf()))
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    /// Clamp to the end of the text.
    pub fn with_position(mut self, offset: usize) -> Self {
        self.position = offset.min(self.chars.len());
        self
    }

    pub fn with_chars_per_page(mut self, chars_per_page: usize) -> Self {
        self.chars_per_page = chars_per_page.max(1);
        self
    }

    /// Chapter starting at `page`; later entries override earlier pages.
    pub fn with_chapter(mut self, page: u32, title: impl Into<String>) -> Self {
        self.chapters.push((page, title.into()));
        self.chapters.sort_by_key(|(p, _)| *p);
        self
    }

    fn offset(&self, position: &str) -> Option<usize> {
        position
            .trim()
            .parse::<usize>()
            .ok()
            .map(|o| o.min(self.chars.len()))
    }

    fn page_at(&self, offset: usize) -> u32 {
        (offset / self.chars_per_page + 1) as u32
    }
}

impl DocumentView for TextDocument {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Flowing
    }

    fn current_page(&self) -> Option<u32> {
        Some(self.page_at(self.position))
    }

    fn page_count(&self) -> Option<u32> {
        let pages = self.chars.len().div_ceil(self.chars_per_page).max(1);
        Some(pages as u32)
    }

    fn page_text(&self, page: u32) -> Option<PageText> {
        let start = (page.checked_sub(1)? as usize).checked_mul(self.chars_per_page)?;
        if start >= self.chars.len() {
            return None;
        }
        let end = (start + self.chars_per_page).min(self.chars.len());
        Some(PageText::PlainText(self.chars[start..end].iter().collect()))
    }

    fn start_position(&self) -> Option<String> {
        Some("0".to_string())
    }

    fn current_position(&self) -> Option<String> {
        Some(self.position.to_string())
    }

    fn text_in_range(&self, from: &str, to: &str) -> Option<String> {
        let from = self.offset(from)?;
        let to = self.offset(to)?;
        if from >= to {
            return Some(String::new());
        }
        Some(self.chars[from..to].iter().collect())
    }

    fn page_of_position(&self, position: &str) -> Option<u32> {
        self.offset(position).map(|o| self.page_at(o))
    }

    fn chapter_title(&self, page: u32) -> Option<String> {
        self.chapters
            .iter()
            .rev()
            .find(|(start, _)| *start <= page)
            .map(|(_, title)| title.clone())
    }

    fn file_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
