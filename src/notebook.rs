use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::document::DocumentView;
use crate::error::NotebookError;

/// File stem used when neither the notebook nor the document has a name.
pub const FALLBACK_NOTEBOOK_STEM: &str = "notebook";

const MARKDOWN_EXTENSION: &str = "md";

/// Host storage for the notebook path choice.
pub trait NotebookSettings: Send + Sync {
    fn notebook_path(&self) -> Option<PathBuf>;
    fn save_notebook_path(&self, path: &Path) -> std::io::Result<()>;
}

/// Transient, auto-dismissing notice shown to the reader.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// In-process settings store.
#[derive(Debug, Default)]
pub struct MemorySettings {
    path: Mutex<Option<PathBuf>>,
}

impl MemorySettings {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: Mutex::new(path),
        }
    }
}

impl NotebookSettings for MemorySettings {
    fn notebook_path(&self) -> Option<PathBuf> {
        self.path.lock().ok().and_then(|p| p.clone())
    }

    fn save_notebook_path(&self, path: &Path) -> std::io::Result<()> {
        let mut guard = self
            .path
            .lock()
            .map_err(|_| std::io::Error::other("settings lock poisoned"))?;
        *guard = Some(path.to_path_buf());
        Ok(())
    }
}

/// Notices routed to the log, for hosts without a UI.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        tracing::info!("notice: {message}");
    }
}

/// Appends entries to the reader's markdown notebook.
///
/// Best effort: every failure is logged and shown as a notice, never
/// returned. Appends are serialized through an internal lock.
pub struct NotebookWriter {
    settings: Arc<dyn NotebookSettings>,
    notifier: Arc<dyn Notifier>,
    write_lock: tokio::sync::Mutex<()>,
}

impl NotebookWriter {
    pub fn new(settings: Arc<dyn NotebookSettings>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            settings,
            notifier,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Append `entry` to the notebook. Returns the file written, or `None`
    /// when the write was abandoned.
    ///
    /// The document is only asked for its path, before the returned future
    /// first runs, so the future stays `Send`.
    pub fn append_log<'a>(
        &'a self,
        entry: &'a str,
        config: &'a Config,
        doc: Option<&dyn DocumentView>,
    ) -> impl Future<Output = Option<PathBuf>> + Send + use<'a> {
        let doc_path = doc.and_then(|d| d.file_path()).map(Path::to_path_buf);
        self.append_at(entry, config, doc_path)
    }

    async fn append_at(
        &self,
        entry: &str,
        config: &Config,
        doc_path: Option<PathBuf>,
    ) -> Option<PathBuf> {
        let _lock = self.write_lock.lock().await;

        let path = match self.resolve_path(config, doc_path.as_deref()).await {
            Ok(path) => path,
            Err(e) => {
                self.degrade(&e);
                return None;
            }
        };

        match write_entry(&path, entry).await {
            Ok(()) => Some(path),
            Err(source) => {
                self.degrade(&NotebookError::PersistenceFailed { path, source });
                None
            }
        }
    }

    /// Saved path, else the document path as `.md`, else the fallback name
    /// in the log folder; then relocation under the log folder and
    /// extension normalization, each persisted when it changes the path.
    async fn resolve_path(
        &self,
        config: &Config,
        doc_path: Option<&Path>,
    ) -> Result<PathBuf, NotebookError> {
        let folder = config.log_folder();
        let mut path = self
            .settings
            .notebook_path()
            .or_else(|| doc_path.map(|p| p.with_extension(MARKDOWN_EXTENSION)))
            .or_else(|| folder.map(|f| f.join(notebook_file_name(Path::new(""), None))))
            .ok_or(NotebookError::NoTarget)?;

        if let Some(folder) = folder
            && !path.starts_with(folder)
        {
            if is_dir(folder).await {
                let relocated = folder.join(notebook_file_name(&path, doc_path));
                tracing::debug!(
                    from = %path.display(),
                    to = %relocated.display(),
                    "relocating notebook into log folder"
                );
                self.persist_choice(&relocated);
                path = relocated;
            } else {
                self.degrade(&NotebookError::FolderInaccessible(folder.to_path_buf()));
            }
        }

        if !has_markdown_extension(&path) {
            path.set_extension(MARKDOWN_EXTENSION);
            self.persist_choice(&path);
        }

        Ok(path)
    }

    fn persist_choice(&self, path: &Path) {
        if let Err(e) = self.settings.save_notebook_path(path) {
            tracing::warn!(path = %path.display(), "notebook: failed to save path choice: {e}");
        }
    }

    fn degrade(&self, error: &NotebookError) {
        tracing::warn!("notebook: {error}");
        let notice = match error {
            NotebookError::FolderInaccessible(_) => {
                "Log folder is not accessible. Saving next to the current notebook."
            }
            NotebookError::NoTarget | NotebookError::PersistenceFailed { .. } => {
                "Failed to save to notebook."
            }
        };
        self.notifier.notify(notice);
    }
}

/// `<stem>.md` from the current notebook, else the document, else the
/// fallback stem.
pub fn notebook_file_name(current: &Path, doc_path: Option<&Path>) -> String {
    let stem = current
        .file_stem()
        .or_else(|| doc_path.and_then(Path::file_stem))
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_NOTEBOOK_STEM.to_string());
    format!("{stem}.{MARKDOWN_EXTENSION}")
}

pub fn has_markdown_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MARKDOWN_EXTENSION))
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_dir())
}

/// The handle is dropped, and the file closed, on every return path.
async fn write_entry(path: &Path, entry: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(entry.as_bytes()).await?;
    file.flush().await
}

/// Markdown notebook entry stamped with the local time.
pub fn format_log_entry(title: &str, position: &str, question: Option<&str>, answer: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M");
    let mut entry = format!("## {timestamp} | {title}{position}\n\n");
    if let Some(question) = question.filter(|q| !q.trim().is_empty()) {
        entry.push_str(&format!("**Question:** {question}\n\n"));
    }
    entry.push_str(answer.trim_end());
    entry.push_str("\n\n---\n\n");
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_prefers_current_notebook() {
        assert_eq!(
            notebook_file_name(Path::new("/docs/book.txt"), Some(Path::new("/b/other.epub"))),
            "book.md"
        );
        assert_eq!(
            notebook_file_name(Path::new("/"), Some(Path::new("/b/other.epub"))),
            "other.md"
        );
        assert_eq!(notebook_file_name(Path::new("/"), None), "notebook.md");
    }

    #[test]
    fn markdown_extension_is_case_insensitive() {
        assert!(has_markdown_extension(Path::new("a/b.md")));
        assert!(has_markdown_extension(Path::new("a/b.MD")));
        assert!(!has_markdown_extension(Path::new("a/b.txt")));
        assert!(!has_markdown_extension(Path::new("a/b")));
    }

    #[test]
    fn entry_layout() {
        let entry = format_log_entry("Dune", " (Page 3)", Some("Who is Paul?"), "The heir.\n");
        assert!(entry.starts_with("## "));
        assert!(entry.contains("| Dune (Page 3)\n\n"));
        assert!(entry.contains("**Question:** Who is Paul?\n\n"));
        assert!(entry.ends_with("The heir.\n\n---\n\n"));

        let no_question = format_log_entry("Dune", "", None, "Recap.");
        assert!(!no_question.contains("**Question:**"));
    }

    #[test]
    fn memory_settings_round_trip() {
        let settings = MemorySettings::default();
        assert!(settings.notebook_path().is_none());
        settings.save_notebook_path(Path::new("/tmp/n.md")).unwrap();
        assert_eq!(settings.notebook_path(), Some(PathBuf::from("/tmp/n.md")));
    }
}
