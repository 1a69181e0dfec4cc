use crate::extract::FileType;
use crate::index::{SearchHit, SearchIndex};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const CACHE_FILE_NAME: &str = ".file_index.json";
pub const METADATA_FILE_NAME: &str = ".index_metadata.json";
pub const INDEX_VERSION: &str = "1.0";

/// Locations of the cache artifacts inside an indexed directory.
#[derive(Debug, Clone)]
pub struct CachePaths {
    pub directory: PathBuf,
}

impl CachePaths {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn cache_file(&self) -> PathBuf {
        self.directory.join(CACHE_FILE_NAME)
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.directory.join(METADATA_FILE_NAME)
    }
}

/// One cached file entry. Keys in `CacheDocument::files` are paths relative
/// to the indexed directory; `full_path` is kept for direct reuse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedFile {
    pub content: String,
    pub title: String,
    pub size: f64,
    pub modified: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub file_hash: String,
    pub full_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDocument {
    pub files: BTreeMap<String, CachedFile>,
    pub last_indexed: String,
    pub total_files: usize,
    pub index_version: String,
}

/// Sidecar metadata written next to the cache file.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub cache_created: String,
    pub indexed_directory: PathBuf,
    pub total_files: usize,
    pub cache_file_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub available: bool,
    pub total_files: usize,
    pub size_mb: f64,
    pub modified: Option<String>,
    pub cache_file: PathBuf,
}

/// Change-detection fingerprint over `(mtime, size, path)`. No content
/// hashing: two same-size edits within the mtime granularity are
/// indistinguishable from an unchanged file.
pub fn compute_file_hash(path: &Path) -> Option<String> {
    let meta = fs::metadata(path).ok()?;
    let mtime = meta.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
    let mut hasher = Sha1::new();
    hasher.update(
        format!(
            "{}.{:09}_{}_{}",
            mtime.as_secs(),
            mtime.subsec_nanos(),
            meta.len(),
            path.display()
        )
        .as_bytes(),
    );
    Some(format!("{:x}", hasher.finalize()))
}

/// Write the full cache document and its sidecar metadata. Always a complete
/// rewrite; the write cost is linear in the number of indexed files.
pub fn save_cache(paths: &CachePaths, index: &SearchIndex) -> Result<()> {
    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    let mut files: BTreeMap<String, CachedFile> = BTreeMap::new();
    for (path, entry) in index.snapshot() {
        let relative = path
            .strip_prefix(&paths.directory)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        files.insert(
            relative,
            CachedFile {
                content: entry.content,
                title,
                size: entry.size_mb,
                modified: entry.indexed_time.format(&Rfc3339).unwrap_or_default(),
                file_type: entry.file_type,
                file_hash: compute_file_hash(&path).unwrap_or_default(),
                full_path: path,
            },
        );
    }

    let document = CacheDocument {
        total_files: files.len(),
        files,
        last_indexed: now.clone(),
        index_version: INDEX_VERSION.to_string(),
    };

    let cache_file = paths.cache_file();
    fs::write(&cache_file, serde_json::to_string_pretty(&document)?)
        .with_context(|| format!("writing cache: {}", cache_file.display()))?;

    let metadata = CacheMetadata {
        cache_created: now,
        indexed_directory: paths.directory.clone(),
        total_files: document.total_files,
        cache_file_size: fs::metadata(&cache_file).map(|m| m.len()).unwrap_or(0),
    };
    let metadata_file = paths.metadata_file();
    fs::write(&metadata_file, serde_json::to_string_pretty(&metadata)?)
        .with_context(|| format!("writing metadata: {}", metadata_file.display()))?;

    tracing::info!(
        files = document.total_files,
        cache = %cache_file.display(),
        "cache saved"
    );
    Ok(())
}

/// Read and validate the cache document. Any failure (missing file, bad
/// JSON, version mismatch) is an `Err`, which callers treat as a cache miss.
pub fn load_cache(paths: &CachePaths) -> Result<CacheDocument> {
    let cache_file = paths.cache_file();
    let raw = fs::read_to_string(&cache_file)
        .with_context(|| format!("reading cache: {}", cache_file.display()))?;
    let document: CacheDocument =
        serde_json::from_str(&raw).with_context(|| "cache file is not valid JSON")?;
    if document.index_version != INDEX_VERSION {
        bail!(
            "cache version {} does not match expected {}",
            document.index_version,
            INDEX_VERSION
        );
    }
    Ok(document)
}

/// Outcome of diffing a cache document against the live file set.
#[derive(Debug, Default)]
pub struct RefreshPlan {
    /// Cached entries whose fingerprint still matches; restorable without
    /// re-extraction.
    pub unchanged: Vec<PathBuf>,
    /// Cached entries whose fingerprint differs; must be re-extracted.
    pub changed: Vec<PathBuf>,
    /// On disk but not in the cache.
    pub new_files: Vec<PathBuf>,
    /// In the cache but gone from disk; evict immediately.
    pub deleted: Vec<PathBuf>,
}

/// Classify every cached entry and every live file into the four refresh
/// buckets. Pure over its inputs: the live file list and the fingerprint
/// function are injected, so the transition is testable without real I/O.
///
/// `directory`/`recursive` bound the deletion scope: with `recursive` off,
/// cached entries under subdirectories are out of scope and never reported
/// as deleted.
pub fn plan_refresh<F>(
    cache: &CacheDocument,
    live: &[PathBuf],
    directory: &Path,
    recursive: bool,
    hash_fn: F,
) -> RefreshPlan
where
    F: Fn(&Path) -> Option<String>,
{
    let mut plan = RefreshPlan::default();

    let live_by_norm: HashMap<String, PathBuf> = live
        .iter()
        .map(|p| (normalize_path(p), p.clone()))
        .collect();
    let directory_norm = normalize_path(directory);

    let mut cached_in_scope: HashSet<String> = HashSet::new();
    for entry in cache.files.values() {
        let norm = normalize_path(&entry.full_path);
        let in_scope = recursive
            || entry
                .full_path
                .parent()
                .map(|parent| normalize_path(parent) == directory_norm)
                .unwrap_or(false);
        if in_scope {
            cached_in_scope.insert(norm.clone());
            if !live_by_norm.contains_key(&norm) {
                plan.deleted.push(entry.full_path.clone());
            }
        }

        match hash_fn(&entry.full_path) {
            None => {} // vanished mid-scan; the deletion diff covers it
            Some(current) if current == entry.file_hash => {
                plan.unchanged.push(entry.full_path.clone());
            }
            Some(_) => plan.changed.push(entry.full_path.clone()),
        }
    }

    for (norm, original) in &live_by_norm {
        if !cached_in_scope.contains(norm) {
            plan.new_files.push(original.clone());
        }
    }

    plan
}

/// Normalized comparison form: symlink-resolved where possible, separators
/// unified, case folded. Avoids platform-specific false positives in the
/// new/deleted diff.
pub fn normalize_path(path: &Path) -> String {
    let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    resolved.to_string_lossy().replace('\\', "/").to_lowercase()
}

/// Search the cache file directly, without rebuilding the in-memory index.
/// Linear scan over entries, substring match in title or content.
pub fn search_cache(paths: &CachePaths, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
    let document = load_cache(paths)?;
    Ok(search_cache_doc(&document, query, max_results))
}

pub fn search_cache_doc(
    document: &CacheDocument,
    query: &str,
    max_results: usize,
) -> Vec<SearchHit> {
    let query_lower = query.trim().to_lowercase();
    if query_lower.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = Vec::new();
    for entry in document.files.values() {
        if !entry.full_path.exists() {
            continue;
        }
        let filename_match = entry.title.to_lowercase().contains(&query_lower);
        let content_match = entry.content.to_lowercase().contains(&query_lower);
        if !filename_match && !content_match {
            continue;
        }

        let mut score = 0.0f32;
        if filename_match {
            score += 2.0;
        }
        if content_match {
            score += 1.0;
        }

        hits.push(SearchHit {
            path: entry.full_path.clone(),
            filename: entry.title.clone(),
            file_type: entry.file_type,
            size_mb: entry.size,
            preview: extract_context(&entry.content, query, 150),
            score,
        });
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(max_results);
    hits
}

/// Filename-only fast path: skips content scanning entirely. Matches on the
/// file stem; a prefix match scores above a plain substring match.
pub fn search_cache_filenames(
    paths: &CachePaths,
    query: &str,
    max_results: usize,
) -> Result<Vec<SearchHit>> {
    let document = load_cache(paths)?;
    let query_lower = query.trim().to_lowercase();
    if query_lower.is_empty() {
        return Ok(Vec::new());
    }

    let mut hits: Vec<SearchHit> = Vec::new();
    for entry in document.files.values() {
        if !entry.full_path.exists() {
            continue;
        }
        let stem = Path::new(&entry.title)
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !stem.contains(&query_lower) {
            continue;
        }
        let score = if stem.starts_with(&query_lower) { 2.0 } else { 1.0 };
        hits.push(SearchHit {
            path: entry.full_path.clone(),
            filename: entry.title.clone(),
            file_type: entry.file_type,
            size_mb: entry.size,
            preview: format!("filename match: {}", entry.title),
            score,
        });
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(max_results);
    Ok(hits)
}

pub fn cache_stats(paths: &CachePaths) -> CacheStats {
    let cache_file = paths.cache_file();
    let mut stats = CacheStats {
        available: false,
        total_files: 0,
        size_mb: 0.0,
        modified: None,
        cache_file: cache_file.clone(),
    };
    if let Ok(meta) = fs::metadata(&cache_file) {
        stats.available = true;
        stats.size_mb = meta.len() as f64 / (1024.0 * 1024.0);
        stats.modified = meta
            .modified()
            .ok()
            .map(OffsetDateTime::from)
            .and_then(|t| t.format(&Rfc3339).ok());
        if let Ok(document) = load_cache(paths) {
            stats.total_files = document.total_files;
        }
    }
    stats
}

/// Snippet around the first match of `query` in `content`, with the match
/// wrapped in `**` markers and ellipses where the text is cut.
pub fn extract_context(content: &str, query: &str, context_length: usize) -> String {
    if content.is_empty() || query.is_empty() {
        return truncate_chars(content, context_length);
    }
    let content_lower = content.to_lowercase();
    let query_lower = query.to_lowercase();
    let Some(pos) = content_lower.find(&query_lower) else {
        return truncate_chars(content, context_length);
    };

    // Lowercasing may shift byte offsets for some scripts; clamp everything
    // to char boundaries of the original text.
    let pos = floor_boundary(content, pos);
    let match_end = ceil_boundary(content, pos + query.len());
    let start = floor_boundary(content, pos.saturating_sub(context_length / 2));
    let end = ceil_boundary(content, match_end + context_length / 2);

    let matched = &content[pos..match_end];
    let snippet = &content[start..end];
    let mut highlighted = snippet.replace(matched, &format!("**{matched}**"));
    if start > 0 {
        highlighted = format!("...{highlighted}");
    }
    if end < content.len() {
        highlighted.push_str("...");
    }
    highlighted
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_highlights_first_match() {
        let content = "alpha beta gamma delta";
        let snippet = extract_context(content, "gamma", 150);
        assert!(snippet.contains("**gamma**"));
        assert!(!snippet.starts_with("..."));
    }

    #[test]
    fn context_adds_ellipses_when_cut() {
        let padding = "x".repeat(400);
        let content = format!("{padding} needle {padding}");
        let snippet = extract_context(&content, "needle", 100);
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
        assert!(snippet.contains("**needle**"));
    }

    #[test]
    fn context_without_match_truncates() {
        let snippet = extract_context("short text", "absent", 150);
        assert_eq!(snippet, "short text");
    }

    #[test]
    fn context_is_char_boundary_safe() {
        let content = "한글 문서 내용 가나다라마바사 아자차카타파하".repeat(20);
        let snippet = extract_context(&content, "가나다", 30);
        assert!(snippet.contains("**가나다**"));
    }
}
