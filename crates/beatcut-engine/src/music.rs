//! Mood-categorized background music library.
//!
//! Layout: one sub-directory per mood category under the library root, each
//! holding `.mp3` or `.aac` tracks.
//!
//! ```text
//! music/
//!   happy/  upbeat_01.mp3  sunny.aac
//!   sad/    rain.mp3
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{error, info, warn};

use crate::error::AssemblyResult;
use crate::similarity::TextSimilarity;

const TRACK_EXTENSIONS: [&str; 2] = ["mp3", "aac"];

/// Tracks grouped by mood category.
#[derive(Debug, Clone, Default)]
pub struct MusicLibrary {
    categories: BTreeMap<String, Vec<PathBuf>>,
}

impl MusicLibrary {
    /// Scan `root`. A missing root gives an empty library.
    pub async fn scan(root: &Path) -> AssemblyResult<Self> {
        let mut library = Self::default();

        if !root.is_dir() {
            error!(root = %root.display(), "Music root not found");
            return Ok(library);
        }

        let mut entries = tokio::fs::read_dir(root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let folder = entry.path();
            if !folder.is_dir() {
                continue;
            }
            let Some(name) = folder.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };

            let tracks = list_tracks(&folder).await?;
            if tracks.is_empty() {
                continue;
            }
            info!(category = %name, tracks = tracks.len(), "Loaded music category");
            library.categories.insert(name, tracks);
        }

        if library.is_empty() {
            warn!(root = %root.display(), "No music categories found");
        }
        Ok(library)
    }

    /// Build from explicit categories.
    pub fn from_categories<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<PathBuf>)>,
        S: Into<String>,
    {
        Self {
            categories: categories
                .into_iter()
                .filter(|(_, tracks)| !tracks.is_empty())
                .map(|(name, tracks)| (name.into(), tracks))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Category names, sorted.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn tracks(&self, category: &str) -> &[PathBuf] {
        self.categories.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pick a random track from the category most similar to `summary`.
    ///
    /// Ties go to the first category in name order.
    pub async fn retrieve<R: Rng>(
        &self,
        summary: &str,
        scorer: &dyn TextSimilarity,
        rng: &mut R,
    ) -> AssemblyResult<Option<PathBuf>> {
        let mut best: Option<(&str, f64)> = None;
        for name in self.categories() {
            let score = scorer.similarity(summary, name).await?;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((name, score));
            }
        }

        let Some((category, score)) = best else {
            return Ok(None);
        };

        let track = self.tracks(category).choose(rng).cloned();
        info!(
            summary,
            category,
            score = format!("{:.4}", score),
            track = ?track,
            "Music retrieved"
        );
        Ok(track)
    }
}

async fn list_tracks(folder: &Path) -> AssemblyResult<Vec<PathBuf>> {
    let mut tracks = Vec::new();
    let mut entries = tokio::fs::read_dir(folder).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_track = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| TRACK_EXTENSIONS.iter().any(|t| e.eq_ignore_ascii_case(t)))
            .unwrap_or(false);
        if is_track && path.is_file() {
            tracks.push(path);
        }
    }
    tracks.sort();
    Ok(tracks)
}
