use crate::extract::{FileInfo, FileType};
use crate::tokenizer::tokenize;
use parking_lot::Mutex;
use regex::RegexBuilder;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Number of characters retained for result previews.
pub const PREVIEW_LEN: usize = 200;

/// Per-file record kept alongside the postings.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub file_type: FileType,
    pub size_mb: f64,
    pub indexed_time: OffsetDateTime,
    pub preview: String,
    pub content: String,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub path: PathBuf,
    pub filename: String,
    pub file_type: FileType,
    pub size_mb: f64,
    pub preview: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_files: usize,
    pub total_tokens: usize,
    pub file_types: HashMap<String, usize>,
}

#[derive(Default)]
struct IndexInner {
    /// token -> set of paths whose name or content contains the token.
    postings: HashMap<String, HashSet<PathBuf>>,
    files: HashMap<PathBuf, FileEntry>,
}

/// In-memory inverted index over extracted document text.
///
/// A single lock serializes every read and write; concurrent `add_file`
/// calls from the extraction workers are safe.
#[derive(Default)]
pub struct SearchIndex {
    inner: Mutex<IndexInner>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file. Any previous entry for the same path is
    /// removed first so no stale postings survive a re-index.
    pub fn add_file(&self, path: &Path, content: &str, info: &FileInfo) {
        let mut inner = self.inner.lock();
        remove_locked(&mut inner, path);

        inner.files.insert(
            path.to_path_buf(),
            FileEntry {
                file_type: info.file_type,
                size_mb: info.size_mb,
                indexed_time: OffsetDateTime::now_utc(),
                preview: content.chars().take(PREVIEW_LEN).collect(),
                content: content.to_string(),
            },
        );

        let combined = format!("{} {}", file_name_of(path), content);
        let distinct: HashSet<String> = tokenize(&combined).into_iter().collect();
        for token in distinct {
            inner
                .postings
                .entry(token)
                .or_default()
                .insert(path.to_path_buf());
        }
    }

    pub fn remove_file(&self, path: &Path) {
        let mut inner = self.inner.lock();
        remove_locked(&mut inner, path);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.inner.lock().files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone out every (path, entry) pair, for cache serialization.
    pub fn snapshot(&self) -> Vec<(PathBuf, FileEntry)> {
        let inner = self.inner.lock();
        inner
            .files
            .iter()
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.postings.clear();
        inner.files.clear();
    }

    /// Ranked query over the index.
    ///
    /// Per query token the candidate set is the exact postings plus the
    /// postings of any indexed token that starts with or contains it. The
    /// per-token sets are intersected (AND); when that leaves fewer than
    /// `max_results / 2` files the union of all candidates is appended after
    /// the AND matches. AND matches always rank above relaxed matches.
    pub fn search(&self, query: &str, max_results: usize) -> Vec<SearchHit> {
        let inner = self.inner.lock();
        if query.trim().is_empty() {
            return Vec::new();
        }
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut per_token: Vec<HashSet<PathBuf>> = Vec::with_capacity(query_tokens.len());
        for token in &query_tokens {
            let mut matching: HashSet<PathBuf> = HashSet::new();
            if let Some(paths) = inner.postings.get(token) {
                matching.extend(paths.iter().cloned());
            }
            for (indexed_token, paths) in &inner.postings {
                if indexed_token.starts_with(token.as_str())
                    || indexed_token.contains(token.as_str())
                {
                    matching.extend(paths.iter().cloned());
                }
            }
            per_token.push(matching);
        }

        let mut and_set = per_token[0].clone();
        for candidates in &per_token[1..] {
            and_set.retain(|p| candidates.contains(p));
        }

        let mut ordered: Vec<PathBuf> = and_set.iter().cloned().collect();
        if and_set.len() < max_results / 2 {
            let mut union: HashSet<PathBuf> = HashSet::new();
            for candidates in &per_token {
                union.extend(candidates.iter().cloned());
            }
            for path in union {
                if !and_set.contains(&path) {
                    ordered.push(path);
                }
            }
        }
        ordered.truncate(max_results);

        let mut hits: Vec<(bool, SearchHit)> = Vec::with_capacity(ordered.len());
        for path in ordered {
            let Some(entry) = inner.files.get(&path) else {
                continue;
            };
            let filename = file_name_of(&path);
            let score = relevance(&inner, &filename, &query_tokens);
            hits.push((
                and_set.contains(&path),
                SearchHit {
                    filename,
                    file_type: entry.file_type,
                    size_mb: entry.size_mb,
                    preview: highlight(&entry.preview, &query_tokens),
                    score,
                    path,
                },
            ));
        }

        hits.sort_by(|a, b| {
            b.0.cmp(&a.0).then(
                b.1.score
                    .partial_cmp(&a.1.score)
                    .unwrap_or(Ordering::Equal),
            )
        });
        hits.into_iter().map(|(_, hit)| hit).collect()
    }

    pub fn stats(&self) -> IndexStats {
        let inner = self.inner.lock();
        let mut file_types: HashMap<String, usize> = HashMap::new();
        for entry in inner.files.values() {
            *file_types.entry(entry.file_type.to_string()).or_insert(0) += 1;
        }
        IndexStats {
            total_files: inner.files.len(),
            total_tokens: inner.postings.len(),
            file_types,
        }
    }
}

fn remove_locked(inner: &mut IndexInner, path: &Path) {
    inner.files.remove(path);
    inner.postings.retain(|_, paths| {
        paths.remove(path);
        !paths.is_empty()
    });
}

/// Filename bonus plus an inverse-document-frequency contribution per token:
/// rare tokens are worth more than ones appearing in every file.
fn relevance(inner: &IndexInner, filename: &str, query_tokens: &[String]) -> f32 {
    let filename_lower = filename.to_lowercase();
    let mut score = 0.0f32;
    for token in query_tokens {
        if filename_lower.contains(token.as_str()) {
            score += 2.0;
        }
        if let Some(paths) = inner.postings.get(token) {
            if !paths.is_empty() {
                score += 1.0 / paths.len() as f32;
            }
        }
    }
    score
}

fn highlight(text: &str, query_tokens: &[String]) -> String {
    let mut out = text.to_string();
    for token in query_tokens {
        let Ok(pattern) = RegexBuilder::new(&regex::escape(token))
            .case_insensitive(true)
            .build()
        else {
            continue;
        };
        out = pattern
            .replace_all(&out, |caps: &regex::Captures| format!("**{}**", &caps[0]))
            .to_string();
    }
    out
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(file_type: FileType) -> FileInfo {
        FileInfo {
            file_type,
            size_mb: 0.1,
            supported: true,
        }
    }

    #[test]
    fn add_then_remove_leaves_no_postings() {
        let index = SearchIndex::new();
        let path = PathBuf::from("/docs/report.txt");
        index.add_file(&path, "quarterly revenue numbers", &info(FileType::Text));
        assert_eq!(index.len(), 1);

        index.remove_file(&path);
        assert!(index.is_empty());
        assert_eq!(index.stats().total_tokens, 0);
        assert!(index.search("revenue", 10).is_empty());
    }

    #[test]
    fn reindex_drops_stale_tokens() {
        let index = SearchIndex::new();
        let path = PathBuf::from("/docs/report.txt");
        index.add_file(&path, "apple banana", &info(FileType::Text));
        index.add_file(&path, "banana cherry", &info(FileType::Text));

        assert!(index.search("apple", 10).is_empty());
        assert_eq!(index.search("cherry", 10).len(), 1);
    }

    #[test]
    fn filename_match_outscores_content_match() {
        let index = SearchIndex::new();
        index.add_file(
            &PathBuf::from("/docs/budget.txt"),
            "nothing interesting",
            &info(FileType::Text),
        );
        index.add_file(
            &PathBuf::from("/docs/misc.txt"),
            "the budget went up",
            &info(FileType::Text),
        );

        let hits = index.search("budget", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].filename, "budget.txt");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn preview_is_highlighted() {
        let index = SearchIndex::new();
        index.add_file(
            &PathBuf::from("/docs/memo.txt"),
            "Budget review for the Budget committee",
            &info(FileType::Text),
        );
        let hits = index.search("budget", 10);
        assert!(hits[0].preview.contains("**Budget**"));
    }
}
