use std::path::{Path, PathBuf};

use crate::annotations::{Annotation, AnnotationTable};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::extract::ExifTable;
use crate::filter::{self, FilterCriteria, FilterOutcome};
use crate::key::ImageKey;
use crate::parser::ExifRecord;
use crate::scanner::{self, ImageRef};
use crate::scorer::AestheticScorer;
use crate::store;
use crate::sync;
use crate::thumbnails;

/// Owned application context: the watched root, the active working set, and
/// both metadata tables.
///
/// Mutation is confined to the single thread owning this value; the only
/// fan-out (extraction) writes to a private table that is swapped in after
/// the join-barrier, so no locking is needed under this discipline. Callers
/// introducing multi-threaded request handling must wrap the catalog in
/// their own mutual exclusion.
pub struct Catalog {
    config: CatalogConfig,
    scorer: Option<Box<dyn AestheticScorer>>,
    root: PathBuf,
    state_dir: PathBuf,
    refs: Vec<ImageRef>,
    working_set: Vec<ImageRef>,
    exif: ExifTable,
    annotations: AnnotationTable,
}

impl Catalog {
    /// Opens a catalog over `root`: scans the tree, loads the persisted
    /// tables if consistent with the scan, and extracts otherwise. Both
    /// tables are flushed before this returns.
    pub fn open(root: impl Into<PathBuf>, config: CatalogConfig) -> Result<Self> {
        Self::open_with_scorer(root, config, None)
    }

    pub fn open_with_scorer(
        root: impl Into<PathBuf>,
        config: CatalogConfig,
        scorer: Option<Box<dyn AestheticScorer>>,
    ) -> Result<Self> {
        let root = root.into();
        let state_dir = store::root_state_dir(&config.metadata_dir, &root);
        let mut catalog = Catalog {
            config,
            scorer,
            root,
            state_dir,
            refs: Vec::new(),
            working_set: Vec::new(),
            exif: ExifTable::new(),
            annotations: AnnotationTable::new(),
        };
        catalog.load_or_build()?;
        Ok(catalog)
    }

    /// Switches the catalog to a different root: the current tables are
    /// flushed first, then the new root is loaded or built.
    pub fn change_directory(&mut self, root: impl Into<PathBuf>) -> Result<()> {
        self.save()?;
        self.root = root.into();
        self.state_dir = store::root_state_dir(&self.config.metadata_dir, &self.root);
        self.load_or_build()
    }

    fn load_or_build(&mut self) -> Result<()> {
        self.refs = scanner::scan(&self.root)?;
        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| CatalogError::io(&self.state_dir, e))?;

        let exif_path = self.exif_path();
        let persisted_exif = if exif_path.exists() {
            match store::load_exif(&exif_path) {
                Ok(table) => table,
                Err(error) => {
                    // Corrupt cache: recompute rather than use partial data.
                    log::warn!("discarding unreadable {}: {}", exif_path.display(), error);
                    ExifTable::new()
                }
            }
        } else {
            ExifTable::new()
        };
        self.exif = sync::reconcile_on_load(&self.refs, persisted_exif, self.config.worker_threads);

        let annotation_path = self.annotation_path();
        let persisted_annotations = if annotation_path.exists() {
            match store::load_annotations(&annotation_path) {
                Ok(table) => table,
                Err(error) => {
                    log::warn!(
                        "discarding unreadable {}: {}",
                        annotation_path.display(),
                        error
                    );
                    AnnotationTable::new()
                }
            }
        } else {
            AnnotationTable::new()
        };
        let scorer = if self.config.scoring_enabled {
            self.scorer.as_deref()
        } else {
            None
        };
        self.annotations = sync::reconcile_annotations(&self.refs, persisted_annotations, scorer);

        self.working_set = self.refs.clone();
        self.save()
    }

    /// Flushes both tables to the per-root state directory.
    pub fn save(&self) -> Result<()> {
        if self.refs.is_empty() && self.exif.is_empty() && self.annotations.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| CatalogError::io(&self.state_dir, e))?;
        store::save_exif(&self.exif, &self.exif_path())?;
        store::save_annotations(&self.annotations, &self.annotation_path())
    }

    fn exif_path(&self) -> PathBuf {
        self.state_dir.join(store::EXIF_FILE)
    }

    fn annotation_path(&self) -> PathBuf {
        self.state_dir.join(store::ANNOTATION_FILE)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full scan order, independent of any active filter.
    pub fn refs(&self) -> &[ImageRef] {
        &self.refs
    }

    /// The active, possibly filtered, ordered reference list.
    pub fn working_set(&self) -> &[ImageRef] {
        &self.working_set
    }

    pub fn exif_table(&self) -> &ExifTable {
        &self.exif
    }

    pub fn annotation_table(&self) -> &AnnotationTable {
        &self.annotations
    }

    /// Applies filter criteria and installs the outcome's reference list as
    /// the new working set. The outcome is returned so callers can tell a
    /// match from the empty-result reset.
    pub fn filter(&mut self, criteria: &FilterCriteria) -> FilterOutcome {
        let outcome = filter::apply(criteria, &self.refs, &self.annotations);
        self.working_set = outcome.working_set().to_vec();
        outcome
    }

    /// Detail view for one image: its extracted record and annotation row.
    /// Marks the annotation as reviewed. A missing extracted row degrades to
    /// the sentinel placeholder instead of an error.
    pub fn detail(&mut self, name: &str) -> Result<(ExifRecord, Annotation)> {
        let key = self.resolve(name)?;
        let record = match self.exif.get(&key) {
            Some(record) => record.clone(),
            None => {
                log::warn!("no extracted metadata for {}, serving placeholder", name);
                ExifRecord::not_found()
            }
        };
        self.annotations.mark_reviewed(&key);
        let annotation = self.annotations.get_or_default(&key).clone();
        Ok((record, annotation))
    }

    fn resolve(&self, name: &str) -> Result<ImageKey> {
        self.refs
            .iter()
            .find(|reference| reference.relative == name)
            .map(ImageRef::key)
            .ok_or_else(|| CatalogError::UnknownImage(name.to_string()))
    }

    pub fn toggle_favorite(&mut self, name: &str) -> Result<bool> {
        let key = self.resolve(name)?;
        Ok(self.annotations.toggle_favorite(&key))
    }

    pub fn set_rating(&mut self, name: &str, rating: u32) -> Result<()> {
        let key = self.resolve(name)?;
        self.annotations.set_rating(&key, rating);
        Ok(())
    }

    pub fn add_tags(&mut self, name: &str, tags: &[String]) -> Result<Vec<String>> {
        let key = self.resolve(name)?;
        self.annotations.add_tags(&key, tags)
    }

    pub fn remove_tags(&mut self, name: &str, tags: &[String]) -> Result<Vec<String>> {
        let key = self.resolve(name)?;
        self.annotations.remove_tags(&key, tags)
    }

    pub fn add_categories(&mut self, name: &str, categories: &[String]) -> Result<Vec<String>> {
        let key = self.resolve(name)?;
        self.annotations.add_categories(&key, categories)
    }

    pub fn remove_categories(&mut self, name: &str, categories: &[String]) -> Result<Vec<String>> {
        let key = self.resolve(name)?;
        self.annotations.remove_categories(&key, categories)
    }

    pub fn set_to_delete(&mut self, name: &str, to_delete: bool) -> Result<()> {
        let key = self.resolve(name)?;
        self.annotations.set_to_delete(&key, to_delete);
        Ok(())
    }

    /// Explicit cleanup: re-scans the root and drops rows for departed keys
    /// from both tables, then flushes. Returns (extracted, annotation)
    /// removal counts.
    pub fn prune(&mut self) -> Result<(usize, usize)> {
        self.refs = scanner::scan(&self.root)?;
        let removed_exif = sync::prune_exif(&mut self.exif, &self.refs);
        let removed_annotations = sync::prune_annotations(&mut self.annotations, &self.refs);
        self.working_set.retain(|r| self.refs.contains(r));
        log::info!(
            "pruned {} extracted and {} annotation rows",
            removed_exif,
            removed_annotations
        );
        self.save()?;
        Ok((removed_exif, removed_annotations))
    }

    /// Cached thumbnail for one image, generated on first request.
    pub fn thumbnail(&self, name: &str) -> Result<PathBuf> {
        let reference = self
            .refs
            .iter()
            .find(|reference| reference.relative == name)
            .ok_or_else(|| CatalogError::UnknownImage(name.to_string()))?;
        thumbnails::ensure_thumbnail(reference, &self.state_dir.join(store::THUMBNAIL_SUBDIR))
    }
}
