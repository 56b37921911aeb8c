//! Static knowledge base appended to the assistant's system instruction.

use crate::config::Settings;
use di::{Ref, inject, injectable};
use log::{info, warn};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KnowledgeStats {
    pub files: usize,
    pub chars: usize,
}

pub struct KnowledgeBase {
    path: Option<PathBuf>,
    max_chars: usize,
    text: RwLock<String>,
}

#[injectable]
impl KnowledgeBase {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> KnowledgeBase {
        KnowledgeBase::new(settings.kb_path.clone(), settings.kb_max_chars)
    }
}

impl KnowledgeBase {
    pub fn new(path: Option<PathBuf>, max_chars: usize) -> Self {
        Self {
            path,
            max_chars,
            text: RwLock::new(String::new()),
        }
    }

    pub async fn text(&self) -> String {
        self.text.read().await.clone()
    }

    /// Re-reads the configured file or directory, replacing the current text.
    pub async fn reload(&self) -> KnowledgeStats {
        let Some(path) = self.path.clone() else {
            *self.text.write().await = String::new();
            return KnowledgeStats::default();
        };
        let max_chars = self.max_chars;

        let loaded = tokio::task::spawn_blocking(move || load(&path, max_chars)).await;
        let (text, stats) = match loaded {
            Ok(result) => result,
            Err(e) => {
                warn!("knowledge base loader panicked: {e}");
                (String::new(), KnowledgeStats::default())
            }
        };

        *self.text.write().await = text;
        stats
    }
}

/// Reads `.md`/`.txt` files under `path` (or `path` itself if it is a file)
/// and truncates the joined text to `max_chars` characters.
pub fn load(path: &Path, max_chars: usize) -> (String, KnowledgeStats) {
    let mut sections = Vec::new();

    if path.is_dir() {
        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|p| is_knowledge_file(p))
            .collect();
        files.sort();

        for file in files {
            let Some(content) = read_file(&file) else {
                continue;
            };
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            sections.push(format!("# {name}\n{content}"));
        }
    } else if path.is_file() {
        if let Some(content) = read_file(path) {
            sections.push(content);
        }
    } else {
        warn!("knowledge base path not found: {}", path.display());
        return (String::new(), KnowledgeStats::default());
    }

    let files = sections.len();
    let joined = sections.join("\n\n");
    let text: String = joined.chars().take(max_chars).collect();
    let stats = KnowledgeStats {
        files,
        chars: text.chars().count(),
    };

    info!(
        "knowledge base loaded: {} files, {} characters",
        stats.files, stats.chars
    );
    (text, stats)
}

fn is_knowledge_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("txt"))
}

fn read_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) if !content.is_empty() => Some(content),
        Ok(_) => None,
        Err(e) => {
            warn!("cannot read {}: {e}", path.display());
            None
        }
    }
}
