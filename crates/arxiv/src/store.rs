//! On-disk paper metadata, one `papers_info.json` per topic directory.

use crate::client::{Paper, PaperInfo};
use crate::error::ArxivError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const INFO_FILE: &str = "papers_info.json";

type TopicIndex = BTreeMap<String, PaperInfo>;

/// Result of looking a paper up across all topics
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(PaperInfo),
    NotFound,
    /// Nothing has been searched yet
    NoStore,
}

#[derive(Debug, Clone)]
pub struct PaperStore {
    root: PathBuf,
}

impl PaperStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<topic lowercased, spaces as underscores>`
    pub fn topic_dir(&self, topic: &str) -> PathBuf {
        self.root.join(topic_slug(topic))
    }

    /// Merge `papers` into the topic's index and return the index path
    pub async fn save(&self, topic: &str, papers: &[Paper]) -> Result<PathBuf, ArxivError> {
        let dir = self.topic_dir(topic);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(INFO_FILE);

        let mut index = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str::<TopicIndex>(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Discarding unreadable paper index");
                TopicIndex::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TopicIndex::new(),
            Err(e) => return Err(e.into()),
        };

        for paper in papers {
            index.insert(paper.short_id.clone(), paper.info.clone());
        }

        tokio::fs::write(&path, serde_json::to_string_pretty(&index)?).await?;
        debug!(path = %path.display(), saved = papers.len(), total = index.len(), "Saved paper index");
        Ok(path)
    }

    /// Search every topic's index for `paper_id`
    pub async fn find(&self, paper_id: &str) -> Result<Lookup, ArxivError> {
        let root = self.root.clone();
        let paper_id = paper_id.to_string();
        tokio::task::spawn_blocking(move || find_blocking(&root, &paper_id))
            .await
            .map_err(|e| ArxivError::Io(std::io::Error::other(e)))?
    }
}

fn find_blocking(root: &Path, paper_id: &str) -> Result<Lookup, ArxivError> {
    if !root.is_dir() {
        return Ok(Lookup::NoStore);
    }

    let indexes = WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == INFO_FILE);

    for entry in indexes {
        let index: TopicIndex = match std::fs::read_to_string(entry.path())
            .map_err(ArxivError::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(ArxivError::from))
        {
            Ok(index) => index,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping unreadable paper index");
                continue;
            }
        };
        if let Some(info) = index.get(paper_id) {
            return Ok(Lookup::Found(info.clone()));
        }
    }

    Ok(Lookup::NotFound)
}

/// Directory name for a topic; path separators never escape the store
pub fn topic_slug(topic: &str) -> String {
    let slug: String = topic
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    match slug.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => slug,
    }
}
