use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CatalogError, Result};
use crate::key::ImageKey;

/// User-editable per-image state.
///
/// Tags and categories are ordered lists; duplicates are permitted and order
/// is preserved through persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub favorite: bool,
    pub rating: u32,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub reviewed: bool,
    pub to_delete: bool,
    /// Produced by the external scorer, when enabled; never computed here.
    pub aesthetic_score: Option<f32>,
}

impl Default for Annotation {
    fn default() -> Self {
        Annotation {
            favorite: false,
            rating: 0,
            tags: Vec::new(),
            categories: Vec::new(),
            reviewed: false,
            to_delete: false,
            aesthetic_score: None,
        }
    }
}

/// Keyed table of annotations. `BTreeMap` keeps iteration (and therefore CSV
/// output) in stable key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationTable {
    rows: BTreeMap<ImageKey, Annotation>,
}

impl AnnotationTable {
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

    pub fn get(&self, key: &ImageKey) -> Option<&Annotation> {
        self.rows.get(key)
    }

    pub fn insert(&mut self, key: ImageKey, annotation: Annotation) {
        self.rows.insert(key, annotation);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ImageKey, &Annotation)> {
        self.rows.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ImageKey> {
        self.rows.keys()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&ImageKey) -> bool) {
        self.rows.retain(|key, _| keep(key));
    }

    /// Row for `key`, synthesizing a default record on first observation.
    /// A missing row is never an error for read paths.
    pub fn get_or_default(&mut self, key: &ImageKey) -> &Annotation {
        self.rows.entry(key.clone()).or_default()
    }

    fn row_mut(&mut self, key: &ImageKey) -> &mut Annotation {
        self.rows.entry(key.clone()).or_default()
    }

    /// Flips the favorite flag and returns the new value.
    pub fn toggle_favorite(&mut self, key: &ImageKey) -> bool {
        let row = self.row_mut(key);
        row.favorite = !row.favorite;
        row.favorite
    }

    pub fn set_rating(&mut self, key: &ImageKey, rating: u32) {
        self.row_mut(key).rating = rating;
    }

    /// Marks the row as seen in the detail view. Sticky once set.
    pub fn mark_reviewed(&mut self, key: &ImageKey) {
        self.row_mut(key).reviewed = true;
    }

    pub fn set_to_delete(&mut self, key: &ImageKey, to_delete: bool) {
        self.row_mut(key).to_delete = to_delete;
    }

    pub fn set_aesthetic_score(&mut self, key: &ImageKey, score: f32) {
        self.row_mut(key).aesthetic_score = Some(score);
    }

    /// Appends tags in request order. Duplicates are allowed; empty input is
    /// a request-rejection condition, not a silent no-op.
    pub fn add_tags(&mut self, key: &ImageKey, tags: &[String]) -> Result<Vec<String>> {
        validate_labels(tags, "tags")?;
        let row = self.row_mut(key);
        row.tags.extend(tags.iter().cloned());
        Ok(row.tags.clone())
    }

    /// Removes every occurrence of each listed tag.
    pub fn remove_tags(&mut self, key: &ImageKey, tags: &[String]) -> Result<Vec<String>> {
        validate_labels(tags, "tags")?;
        let row = self.row_mut(key);
        row.tags.retain(|existing| !tags.contains(existing));
        Ok(row.tags.clone())
    }

    pub fn add_categories(&mut self, key: &ImageKey, categories: &[String]) -> Result<Vec<String>> {
        validate_labels(categories, "categories")?;
        let row = self.row_mut(key);
        row.categories.extend(categories.iter().cloned());
        Ok(row.categories.clone())
    }

    pub fn remove_categories(
        &mut self,
        key: &ImageKey,
        categories: &[String],
    ) -> Result<Vec<String>> {
        validate_labels(categories, "categories")?;
        let row = self.row_mut(key);
        row.categories.retain(|existing| !categories.contains(existing));
        Ok(row.categories.clone())
    }
}

fn validate_labels(labels: &[String], what: &'static str) -> Result<()> {
    if labels.is_empty() || labels.iter().any(|label| label.trim().is_empty()) {
        return Err(CatalogError::EmptyField(what));
    }
    Ok(())
}

impl FromIterator<(ImageKey, Annotation)> for AnnotationTable {
    fn from_iter<T: IntoIterator<Item = (ImageKey, Annotation)>>(iter: T) -> Self {
        AnnotationTable {
            rows: iter.into_iter().collect(),
        }
    }
}
