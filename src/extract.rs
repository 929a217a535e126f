use rayon::prelude::*;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::key::ImageKey;
use crate::parser::{self, ExifRecord};
use crate::scanner::ImageRef;

const MIN_WORKERS: usize = 2;

/// Extracted-metadata table, keyed by [`ImageKey`]. Stable iteration order so
/// the persisted CSV is deterministic for a given table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifTable {
    rows: BTreeMap<ImageKey, ExifRecord>,
}

impl ExifTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains_key(&self, key: &ImageKey) -> bool {
        self.rows.contains_key(key)
    }

    pub fn get(&self, key: &ImageKey) -> Option<&ExifRecord> {
        self.rows.get(key)
    }

    pub fn insert(&mut self, key: ImageKey, record: ExifRecord) {
        self.rows.insert(key, record);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ImageKey, &ExifRecord)> {
        self.rows.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ImageKey> {
        self.rows.keys()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&ImageKey) -> bool) {
        self.rows.retain(|key, _| keep(key));
    }
}

impl FromIterator<(ImageKey, ExifRecord)> for ExifTable {
    fn from_iter<T: IntoIterator<Item = (ImageKey, ExifRecord)>>(iter: T) -> Self {
        ExifTable {
            rows: iter.into_iter().collect(),
        }
    }
}

fn worker_count(configured: Option<usize>) -> usize {
    if let Some(workers) = configured {
        return workers.clamp(1, 64);
    }
    if let Ok(raw) = std::env::var("PROMPTVIEW_WORKERS") {
        if let Ok(parsed) = raw.parse::<usize>() {
            return parsed.clamp(1, 64);
        }
    }

    let cpu_count = std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(8);
    cpu_count.saturating_sub(1).max(MIN_WORKERS)
}

/// Extracts metadata for every reference over a bounded worker pool and
/// assembles the result table.
///
/// Synchronous from the caller's view: the call returns only after every
/// worker has finished (join-barrier, no partial results, no cancellation).
/// A failing image never aborts the batch; its row degrades to sentinels.
/// Completion order is irrelevant because each result stays paired with its
/// key through assembly.
pub fn extract_all(refs: &[ImageRef], workers: Option<usize>) -> ExifTable {
    let threads = worker_count(workers);
    log::info!(
        "extracting metadata for {} images on {} workers",
        refs.len(),
        threads
    );

    let pool = match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool,
        Err(error) => {
            // Pool construction failing is unusual; degrade to sequential.
            log::warn!("worker pool unavailable ({}), extracting sequentially", error);
            return refs.iter().map(|r| (r.key(), extract_one(r))).collect();
        }
    };

    let rows: Vec<(ImageKey, ExifRecord)> = pool.install(|| {
        refs.par_iter()
            .map(|reference| (reference.key(), extract_one(reference)))
            .collect()
    });

    rows.into_iter().collect()
}

fn extract_one(reference: &ImageRef) -> ExifRecord {
    match catch_unwind(AssertUnwindSafe(|| parser::parse_image(&reference.path))) {
        Ok(record) => record,
        Err(_) => {
            log::warn!(
                "metadata worker panicked on {}, recording placeholder",
                reference.relative
            );
            ExifRecord::not_found()
        }
    }
}
