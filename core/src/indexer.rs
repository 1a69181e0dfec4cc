use crate::cache::{self, CachedFile, CachePaths, CacheStats, RefreshPlan};
use crate::extract::{FileInfo, FileType, TextExtractor};
use crate::index::{SearchHit, SearchIndex};
use anyhow::{ensure, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// Progress callback: `(path, percent_complete)`, invoked in completion
/// order after each worker finishes a file.
pub type ProgressFn<'a> = dyn Fn(&Path, f32) + Send + Sync + 'a;

/// Enumerates the files eligible for indexing under a directory.
///
/// Implementations apply the support filter and the spreadsheet exclusion,
/// so the orchestrator and the cache diff see the same candidate set.
pub trait DirectoryScan: Send + Sync {
    fn scan(&self, directory: &Path, recursive: bool) -> Vec<PathBuf>;
}

/// Walkdir-backed scanner used outside of tests.
pub struct WalkdirScanner {
    extractor: Arc<dyn TextExtractor>,
}

impl WalkdirScanner {
    pub fn new(extractor: Arc<dyn TextExtractor>) -> Self {
        Self { extractor }
    }
}

impl DirectoryScan for WalkdirScanner {
    fn scan(&self, directory: &Path, recursive: bool) -> Vec<PathBuf> {
        let mut walker = WalkDir::new(directory);
        if !recursive {
            walker = walker.max_depth(1);
        }
        let mut files = Vec::new();
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !self.extractor.is_supported(path) {
                continue;
            }
            // Spreadsheets are excluded from indexing by policy.
            if self.extractor.file_type(path) == FileType::Excel {
                continue;
            }
            files.push(path.to_path_buf());
        }
        files
    }
}

/// Aggregate counts for one indexing run.
#[derive(Debug, Default, Clone)]
pub struct IndexSummary {
    /// Files successfully extracted and (re)indexed this run.
    pub indexed: usize,
    /// Files restored from the cache without re-extraction.
    pub unchanged: usize,
    /// Cached files whose fingerprint changed.
    pub changed: usize,
    /// Files on disk that were not in the cache.
    pub new_files: usize,
    /// Cached files no longer on disk, evicted.
    pub deleted: usize,
    pub elapsed: Duration,
}

/// Coordinates full and incremental indexing passes over a directory and
/// manages the extraction worker pool. Owns one in-memory index per search
/// session; the extractor and scanner are injected.
pub struct SearchIndexer {
    index: SearchIndex,
    extractor: Arc<dyn TextExtractor>,
    scanner: Box<dyn DirectoryScan>,
    cache_paths: Option<CachePaths>,
    cancel: Arc<AtomicBool>,
}

impl SearchIndexer {
    pub fn new(extractor: Arc<dyn TextExtractor>) -> Self {
        let scanner = Box::new(WalkdirScanner::new(Arc::clone(&extractor)));
        Self::with_scanner(extractor, scanner)
    }

    pub fn with_scanner(extractor: Arc<dyn TextExtractor>, scanner: Box<dyn DirectoryScan>) -> Self {
        Self {
            index: SearchIndex::new(),
            extractor,
            scanner,
            cache_paths: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    pub fn cache_paths(&self) -> Option<&CachePaths> {
        self.cache_paths.as_ref()
    }

    /// Handle for cooperative cancellation. Setting it stops workers from
    /// taking new files; in-flight extraction runs to completion.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Run a full or incremental indexing pass over `directory`.
    ///
    /// Loads the cache, diffs it against the live file set, evicts deleted
    /// entries, restores unchanged ones, dispatches changed and new files to
    /// the worker pool, and rewrites the cache when anything was indexed or a
    /// cache already existed.
    pub fn index_directory(
        &mut self,
        directory: &Path,
        recursive: bool,
        progress: Option<&ProgressFn>,
    ) -> Result<IndexSummary> {
        ensure!(
            directory.is_dir(),
            "not a directory: {}",
            directory.display()
        );
        let start = Instant::now();
        self.cancel.store(false, Ordering::Relaxed);

        let paths = CachePaths::new(directory);
        self.cache_paths = Some(paths.clone());

        let live = self.scanner.scan(directory, recursive);
        let mut summary = IndexSummary::default();

        let (cache_loaded, files_to_index) = match cache::load_cache(&paths) {
            Ok(document) => {
                let plan = cache::plan_refresh(
                    &document,
                    &live,
                    directory,
                    recursive,
                    cache::compute_file_hash,
                );
                self.apply_plan(&document, &plan);
                summary.unchanged = plan.unchanged.len();
                summary.changed = plan.changed.len();
                summary.new_files = plan.new_files.len();
                summary.deleted = plan.deleted.len();
                tracing::info!(
                    unchanged = summary.unchanged,
                    changed = summary.changed,
                    new = summary.new_files,
                    deleted = summary.deleted,
                    "cache loaded, incremental pass"
                );
                let mut work = plan.changed;
                work.extend(plan.new_files);
                (true, work)
            }
            Err(err) => {
                tracing::debug!(%err, "no usable cache, full pass");
                summary.new_files = live.len();
                (false, live)
            }
        };

        summary.indexed = self.run_pool(&files_to_index, progress);

        if summary.indexed > 0 || cache_loaded {
            cache::save_cache(&paths, &self.index)?;
        }

        summary.elapsed = start.elapsed();
        tracing::info!(
            indexed = summary.indexed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "indexing pass finished"
        );
        Ok(summary)
    }

    /// Restore unchanged cache entries into the in-memory index and evict
    /// deleted ones.
    fn apply_plan(&self, document: &cache::CacheDocument, plan: &RefreshPlan) {
        let by_path: HashMap<&PathBuf, &CachedFile> = document
            .files
            .values()
            .map(|entry| (&entry.full_path, entry))
            .collect();
        for path in &plan.unchanged {
            if let Some(entry) = by_path.get(path) {
                let info = FileInfo {
                    file_type: entry.file_type,
                    size_mb: entry.size,
                    supported: true,
                };
                self.index.add_file(path, &entry.content, &info);
            }
        }
        for path in &plan.deleted {
            self.index.remove_file(path);
            tracing::debug!(path = %path.display(), "evicted deleted file");
        }
    }

    /// Dispatch extraction across a bounded worker pool and stream progress
    /// in completion order. Returns the number of successfully indexed files.
    fn run_pool(&self, files: &[PathBuf], progress: Option<&ProgressFn>) -> usize {
        let total = files.len();
        if total == 0 {
            return 0;
        }
        let workers = (total / 10).clamp(1, 4);
        tracing::info!(files = total, workers, "dispatching extraction");

        let queue: Mutex<VecDeque<PathBuf>> = Mutex::new(files.iter().cloned().collect());
        let (tx, rx) = mpsc::channel::<(PathBuf, bool)>();
        let mut indexed = 0usize;

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let index = &self.index;
                let extractor = Arc::clone(&self.extractor);
                let cancel = Arc::clone(&self.cancel);
                scope.spawn(move || {
                    loop {
                        if cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        let Some(path) = queue.lock().pop_front() else {
                            break;
                        };
                        let ok = index_single(extractor.as_ref(), index, &path);
                        if tx.send((path, ok)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut completed = 0usize;
            for (path, ok) in rx {
                completed += 1;
                if ok {
                    indexed += 1;
                }
                if let Some(callback) = progress {
                    callback(&path, completed as f32 / total as f32 * 100.0);
                }
            }
        });

        indexed
    }

    /// Index one file outside of a directory pass. Spreadsheets are refused
    /// here as well.
    pub fn add_file(&self, path: &Path) -> Result<bool> {
        if !self.extractor.is_supported(path) {
            return Ok(false);
        }
        if self.extractor.file_type(path) == FileType::Excel {
            tracing::debug!(path = %path.display(), "spreadsheet excluded from indexing");
            return Ok(false);
        }
        Ok(index_single(self.extractor.as_ref(), &self.index, path))
    }

    pub fn remove_file(&self, path: &Path) {
        self.index.remove_file(path);
    }

    /// Cache-first search: reads the JSON cache directly when present and
    /// falls back to the in-memory index.
    pub fn search_files(&self, query: &str, max_results: usize) -> Vec<SearchHit> {
        if let Some(paths) = &self.cache_paths {
            if paths.cache_file().exists() {
                match cache::search_cache(paths, query, max_results) {
                    Ok(hits) => return hits,
                    Err(err) => {
                        tracing::warn!(%err, "cache search failed, using memory index")
                    }
                }
            }
        }
        self.index.search(query, max_results)
    }

    /// Filename-only fast path over the cache. Empty when no cache exists.
    pub fn search_filenames(&self, query: &str, max_results: usize) -> Vec<SearchHit> {
        match &self.cache_paths {
            Some(paths) if paths.cache_file().exists() => {
                cache::search_cache_filenames(paths, query, max_results).unwrap_or_default()
            }
            _ => Vec::new(),
        }
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache_paths.as_ref().map(cache::cache_stats)
    }
}

/// Extract one file and add it to the index. Failures are logged and never
/// abort the batch; the file is simply left out of this pass.
fn index_single(extractor: &dyn TextExtractor, index: &SearchIndex, path: &Path) -> bool {
    let info = match extractor.file_info(path) {
        Ok(info) if info.supported => info,
        Ok(_) => return false,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "file info lookup failed");
            return false;
        }
    };
    match extractor.extract_text(path) {
        Ok(content) => {
            index.add_file(path, &content, &info);
            true
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "text extraction failed");
            false
        }
    }
}
