use crate::annotations::{Annotation, AnnotationTable};
use crate::scanner::ImageRef;

/// Filter criteria over the annotation store. All supplied criteria are
/// conjunctive; `None` means "don't care".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    /// Substring match against the reference path text.
    pub search_query: Option<String>,
    pub favorites: Option<bool>,
    /// Inclusive lower bound.
    pub min_rating: Option<u32>,
    /// Substring containment against any tag.
    pub tags: Option<String>,
    /// Substring containment against any category.
    pub categories: Option<String>,
}

impl FilterCriteria {
    pub fn is_unconstrained(&self) -> bool {
        *self == FilterCriteria::default()
    }
}

/// Result of a filter evaluation.
///
/// An empty final set never becomes the active working set: the engine resets
/// to the full scan instead, and callers must be able to tell that apart from
/// a genuine match, so the reset is its own variant.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Matched(Vec<ImageRef>),
    /// No reference satisfied the criteria; the full unfiltered scan is the
    /// new working set.
    Reset(Vec<ImageRef>),
}

impl FilterOutcome {
    pub fn working_set(&self) -> &[ImageRef] {
        match self {
            FilterOutcome::Matched(refs) | FilterOutcome::Reset(refs) => refs,
        }
    }
}

/// Evaluates `criteria` over the scan order, reading annotation state per key.
/// References with no annotation row are judged against the default record.
pub fn apply(
    criteria: &FilterCriteria,
    refs: &[ImageRef],
    annotations: &AnnotationTable,
) -> FilterOutcome {
    // A search query that matches nothing short-circuits everything else.
    if let Some(query) = criteria.search_query.as_deref() {
        if !refs.iter().any(|r| r.relative.contains(query)) {
            log::debug!("search query {:?} matched no reference, resetting filter", query);
            return FilterOutcome::Reset(refs.to_vec());
        }
    }

    let default = Annotation::default();
    let matched: Vec<ImageRef> = refs
        .iter()
        .filter(|reference| {
            if let Some(query) = criteria.search_query.as_deref() {
                if !reference.relative.contains(query) {
                    return false;
                }
            }
            let row = annotations.get(&reference.key()).unwrap_or(&default);
            matches_annotation(criteria, row)
        })
        .cloned()
        .collect();

    if matched.is_empty() {
        log::debug!("filter produced an empty set, resetting to full scan");
        FilterOutcome::Reset(refs.to_vec())
    } else {
        FilterOutcome::Matched(matched)
    }
}

fn matches_annotation(criteria: &FilterCriteria, row: &Annotation) -> bool {
    if let Some(favorites) = criteria.favorites {
        if row.favorite != favorites {
            return false;
        }
    }
    if let Some(min_rating) = criteria.min_rating {
        if row.rating < min_rating {
            return false;
        }
    }
    if let Some(tag) = criteria.tags.as_deref() {
        if !row.tags.iter().any(|existing| existing.contains(tag)) {
            return false;
        }
    }
    if let Some(category) = criteria.categories.as_deref() {
        if !row
            .categories
            .iter()
            .any(|existing| existing.contains(category))
        {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn make_ref(name: &str) -> ImageRef {
        ImageRef {
            relative: name.to_string(),
            path: PathBuf::from(name),
        }
    }

    fn table_with(rows: Vec<(&ImageRef, Annotation)>) -> AnnotationTable {
        rows.into_iter()
            .map(|(reference, annotation)| (reference.key(), annotation))
            .collect()
    }

    #[test]
    fn test_conjunction_of_favorites_and_min_rating() {
        let a = make_ref("a.png");
        let b = make_ref("b.png");
        let table = table_with(vec![
            (
                &a,
                Annotation {
                    favorite: true,
                    rating: 3,
                    ..Annotation::default()
                },
            ),
            (
                &b,
                Annotation {
                    favorite: false,
                    rating: 5,
                    ..Annotation::default()
                },
            ),
        ]);
        let refs = vec![a.clone(), b.clone()];

        let criteria = FilterCriteria {
            favorites: Some(true),
            min_rating: Some(2),
            ..FilterCriteria::default()
        };
        assert_eq!(
            apply(&criteria, &refs, &table),
            FilterOutcome::Matched(vec![a])
        );
    }

    #[test]
    fn test_unsatisfiable_min_rating_triggers_reset() {
        let a = make_ref("a.png");
        let b = make_ref("b.png");
        let table = table_with(vec![
            (&a, Annotation { rating: 3, ..Annotation::default() }),
            (&b, Annotation { rating: 5, ..Annotation::default() }),
        ]);
        let refs = vec![a, b];

        let criteria = FilterCriteria {
            min_rating: Some(10),
            ..FilterCriteria::default()
        };
        assert_eq!(
            apply(&criteria, &refs, &table),
            FilterOutcome::Reset(refs.clone())
        );
    }

    #[test]
    fn test_search_query_miss_short_circuits_to_reset() {
        let a = make_ref("cat.png");
        let table = table_with(vec![(
            &a,
            Annotation {
                favorite: true,
                ..Annotation::default()
            },
        )]);
        let refs = vec![a];

        let criteria = FilterCriteria {
            search_query: Some("zebra".to_string()),
            favorites: Some(true),
            ..FilterCriteria::default()
        };
        assert_eq!(
            apply(&criteria, &refs, &table),
            FilterOutcome::Reset(refs.clone())
        );
    }

    #[test]
    fn test_search_query_narrows_by_reference_text() {
        let cat = make_ref("pets/cat.png");
        let dog = make_ref("pets/dog.png");
        let table = AnnotationTable::new();
        let refs = vec![cat.clone(), dog];

        let criteria = FilterCriteria {
            search_query: Some("cat".to_string()),
            ..FilterCriteria::default()
        };
        assert_eq!(
            apply(&criteria, &refs, &table),
            FilterOutcome::Matched(vec![cat])
        );
    }

    #[test]
    fn test_tag_and_category_containment() {
        let a = make_ref("a.png");
        let b = make_ref("b.png");
        let table = table_with(vec![
            (
                &a,
                Annotation {
                    tags: vec!["golden sunset".into()],
                    categories: vec!["landscape".into()],
                    ..Annotation::default()
                },
            ),
            (
                &b,
                Annotation {
                    tags: vec!["night".into()],
                    categories: vec!["portrait".into()],
                    ..Annotation::default()
                },
            ),
        ]);
        let refs = vec![a.clone(), b];

        let criteria = FilterCriteria {
            tags: Some("sunset".to_string()),
            categories: Some("land".to_string()),
            ..FilterCriteria::default()
        };
        assert_eq!(
            apply(&criteria, &refs, &table),
            FilterOutcome::Matched(vec![a])
        );
    }

    #[test]
    fn test_unannotated_reference_judged_against_defaults() {
        let a = make_ref("a.png");
        let refs = vec![a.clone()];
        let table = AnnotationTable::new();

        // Default records are not favorites, so this resets.
        let criteria = FilterCriteria {
            favorites: Some(true),
            ..FilterCriteria::default()
        };
        assert_eq!(
            apply(&criteria, &refs, &table),
            FilterOutcome::Reset(refs.clone())
        );

        // But favorites == false matches them.
        let criteria = FilterCriteria {
            favorites: Some(false),
            ..FilterCriteria::default()
        };
        assert_eq!(
            apply(&criteria, &refs, &table),
            FilterOutcome::Matched(refs)
        );
    }
}
