use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::annotations::{Annotation, AnnotationTable};
use crate::error::{CatalogError, Result};
use crate::extract::ExifTable;
use crate::key::ImageKey;
use crate::parser::{ExifRecord, FIXED_COLUMNS, NO_DATA};

/// File names inside a per-root metadata subdirectory.
pub const EXIF_FILE: &str = "exif_df.csv";
pub const ANNOTATION_FILE: &str = "imgview_metadata.csv";
pub const THUMBNAIL_SUBDIR: &str = "thumbnails";

const INDEX_COLUMN: &str = "sha256";

const ANNOTATION_COLUMNS: &[&str] = &[
    "Favorites",
    "Rating",
    "Tags",
    "Categorization",
    "Reviewed",
    "Todelete",
    "Aesthetic_score",
];

/// Per-root state directory: each watched root gets its own subdirectory
/// named after the root's final path component, isolating its tables and
/// thumbnail cache from other roots.
pub fn root_state_dir(metadata_dir: &Path, root: &Path) -> PathBuf {
    let name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    metadata_dir.join(name)
}

/// Writes the extracted-metadata table as CSV.
///
/// Header: `sha256`, the fixed schema columns, then the sorted union of every
/// extension-field name present in the table. Fields a row does not carry are
/// written as the sentinel, so a loaded row is indistinguishable from a
/// freshly parsed one.
pub fn save_exif(table: &ExifTable, path: &Path) -> Result<()> {
    let extension_columns: BTreeSet<&str> = table
        .iter()
        .flat_map(|(_, record)| record.extensions.keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_path(path).map_err(|e| CatalogError::csv(path, e))?;

    let mut header = vec![INDEX_COLUMN];
    header.extend_from_slice(FIXED_COLUMNS);
    header.extend(extension_columns.iter().copied());
    writer
        .write_record(&header)
        .map_err(|e| CatalogError::csv(path, e))?;

    for (key, record) in table.iter() {
        let mut row = vec![key.as_str()];
        for &column in FIXED_COLUMNS {
            row.push(record.field(column).unwrap_or(NO_DATA));
        }
        for &column in &extension_columns {
            row.push(record.field(column).unwrap_or(NO_DATA));
        }
        writer
            .write_record(&row)
            .map_err(|e| CatalogError::csv(path, e))?;
    }

    writer.flush().map_err(|e| CatalogError::io(path, e))?;
    log::debug!("saved {} extracted rows to {}", table.len(), path.display());
    Ok(())
}

/// Loads the extracted-metadata table. A missing or malformed file is an
/// error; the caller falls back to full re-extraction rather than using
/// partial data.
pub fn load_exif(path: &Path) -> Result<ExifTable> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| CatalogError::csv(path, e))?;
    let headers = reader
        .headers()
        .map_err(|e| CatalogError::csv(path, e))?
        .clone();
    expect_index_column(&headers, path)?;

    let mut table = ExifTable::new();
    for row in reader.records() {
        let row = row.map_err(|e| CatalogError::csv(path, e))?;
        let Some(digest) = row.get(0) else {
            continue;
        };
        let mut record = ExifRecord::not_found();
        for (column, value) in headers.iter().zip(row.iter()).skip(1) {
            record.set_field(column, value.to_string());
        }
        // Sentinel-valued extension cells are an artifact of the column
        // union, not data; drop them so round trips are exact.
        record.extensions.retain(|_, value| value != NO_DATA);
        table.insert(ImageKey::from_hex(digest), record);
    }

    log::debug!("loaded {} extracted rows from {}", table.len(), path.display());
    Ok(table)
}

/// Writes the annotation table as CSV.
///
/// List columns (`Tags`, `Categorization`) are JSON array strings — the
/// explicit round-trip contract for the file format. Booleans serialize as
/// `true`/`false`, the absent aesthetic score as an empty cell.
pub fn save_annotations(table: &AnnotationTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| CatalogError::csv(path, e))?;

    let mut header = vec![INDEX_COLUMN];
    header.extend_from_slice(ANNOTATION_COLUMNS);
    writer
        .write_record(&header)
        .map_err(|e| CatalogError::csv(path, e))?;

    for (key, row) in table.iter() {
        let rating = row.rating.to_string();
        let tags = encode_list(&row.tags, path)?;
        let categories = encode_list(&row.categories, path)?;
        let score = row
            .aesthetic_score
            .map(|score| score.to_string())
            .unwrap_or_default();
        writer
            .write_record([
                key.as_str(),
                if row.favorite { "true" } else { "false" },
                rating.as_str(),
                tags.as_str(),
                categories.as_str(),
                if row.reviewed { "true" } else { "false" },
                if row.to_delete { "true" } else { "false" },
                score.as_str(),
            ])
            .map_err(|e| CatalogError::csv(path, e))?;
    }

    writer.flush().map_err(|e| CatalogError::io(path, e))?;
    log::debug!("saved {} annotation rows to {}", table.len(), path.display());
    Ok(())
}

/// Loads the annotation table. The three trailing columns are optional for
/// compatibility with files written before they existed.
pub fn load_annotations(path: &Path) -> Result<AnnotationTable> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| CatalogError::csv(path, e))?;
    let headers = reader
        .headers()
        .map_err(|e| CatalogError::csv(path, e))?
        .clone();
    expect_index_column(&headers, path)?;

    let column = |name: &str| headers.iter().position(|header| header == name);
    let favorites_idx = column("Favorites");
    let rating_idx = column("Rating");
    let tags_idx = column("Tags");
    let categories_idx = column("Categorization");
    let reviewed_idx = column("Reviewed");
    let todelete_idx = column("Todelete");
    let score_idx = column("Aesthetic_score");

    let mut table = AnnotationTable::new();
    for row in reader.records() {
        let row = row.map_err(|e| CatalogError::csv(path, e))?;
        let Some(digest) = row.get(0) else {
            continue;
        };
        let cell = |idx: Option<usize>| idx.and_then(|idx| row.get(idx));

        let mut annotation = Annotation::default();
        if let Some(value) = cell(favorites_idx) {
            annotation.favorite = parse_bool(value);
        }
        if let Some(value) = cell(rating_idx) {
            annotation.rating = value.trim().parse().unwrap_or(0);
        }
        if let Some(value) = cell(tags_idx) {
            annotation.tags = decode_list(value, path)?;
        }
        if let Some(value) = cell(categories_idx) {
            annotation.categories = decode_list(value, path)?;
        }
        if let Some(value) = cell(reviewed_idx) {
            annotation.reviewed = parse_bool(value);
        }
        if let Some(value) = cell(todelete_idx) {
            annotation.to_delete = parse_bool(value);
        }
        if let Some(value) = cell(score_idx) {
            annotation.aesthetic_score = value.trim().parse().ok();
        }

        table.insert(ImageKey::from_hex(digest), annotation);
    }

    log::debug!(
        "loaded {} annotation rows from {}",
        table.len(),
        path.display()
    );
    Ok(table)
}

fn expect_index_column(headers: &csv::StringRecord, path: &Path) -> Result<()> {
    match headers.get(0) {
        Some(INDEX_COLUMN) => Ok(()),
        Some(other) => Err(CatalogError::MalformedTable {
            path: path.to_path_buf(),
            reason: format!("expected index column '{}', found '{}'", INDEX_COLUMN, other),
        }),
        None => Err(CatalogError::MalformedTable {
            path: path.to_path_buf(),
            reason: "empty header row".to_string(),
        }),
    }
}

fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn encode_list(items: &[String], path: &Path) -> Result<String> {
    serde_json::to_string(items).map_err(|e| CatalogError::MalformedTable {
        path: path.to_path_buf(),
        reason: format!("unencodable list column: {}", e),
    })
}

fn decode_list(raw: &str, path: &Path) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).map_err(|e| CatalogError::MalformedTable {
        path: path.to_path_buf(),
        reason: format!("bad list literal {:?}: {}", raw, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::key_for;
    use crate::scanner::test_support::unique_temp_dir;
    use std::fs;

    #[test]
    fn test_annotation_round_trip_preserves_every_field() {
        let dir = unique_temp_dir("store_ann");
        let path = dir.join(ANNOTATION_FILE);

        let mut table = AnnotationTable::new();
        let key_a = key_for("a.png");
        table.insert(
            key_a.clone(),
            Annotation {
                favorite: true,
                rating: 4,
                tags: vec!["sunset, with comma".into(), "beach".into(), "beach".into()],
                categories: vec!["land\"scape".into()],
                reviewed: true,
                to_delete: false,
                aesthetic_score: Some(6.25),
            },
        );
        table.insert(key_for("b.png"), Annotation::default());

        save_annotations(&table, &path).unwrap();
        let loaded = load_annotations(&path).unwrap();

        assert_eq!(loaded, table);
        assert_eq!(loaded.get(&key_a).unwrap().aesthetic_score, Some(6.25));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_exif_round_trip_with_extension_columns() {
        let dir = unique_temp_dir("store_exif");
        let path = dir.join(EXIF_FILE);

        let mut table = ExifTable::new();
        let mut first = ExifRecord::not_found();
        first.positive_prompt = "a cat".into();
        first.steps = "20".into();
        first.set_field("Hires upscale", "2".to_string());

        let mut second = ExifRecord::not_found();
        second.positive_prompt = "a dog".into();
        second.set_field("Version", "v1.7.0".to_string());

        table.insert(key_for("a.png"), first.clone());
        table.insert(key_for("b.png"), second.clone());

        save_exif(&table, &path).unwrap();
        let loaded = load_exif(&path).unwrap();

        assert_eq!(loaded, table);
        // The column union must not leak sentinel extension cells across rows.
        assert!(loaded
            .get(&key_for("b.png"))
            .unwrap()
            .extensions
            .get("Hires upscale")
            .is_none());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let dir = unique_temp_dir("store_missing");
        assert!(load_exif(&dir.join(EXIF_FILE)).is_err());
        assert!(load_annotations(&dir.join(ANNOTATION_FILE)).is_err());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_load_rejects_wrong_index_column() {
        let dir = unique_temp_dir("store_badheader");
        let path = dir.join(EXIF_FILE);
        fs::write(&path, "md5,Positive prompt\nabc,hello\n").unwrap();
        assert!(matches!(
            load_exif(&path),
            Err(CatalogError::MalformedTable { .. })
        ));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_annotations_without_optional_columns_get_defaults() {
        let dir = unique_temp_dir("store_legacy");
        let path = dir.join(ANNOTATION_FILE);
        let key = key_for("old.png");
        fs::write(
            &path,
            format!(
                "sha256,Favorites,Rating,Tags,Categorization\n{},true,3,\"[\"\"a\"\"]\",[]\n",
                key
            ),
        )
        .unwrap();

        let table = load_annotations(&path).unwrap();
        let row = table.get(&key).unwrap();
        assert!(row.favorite);
        assert_eq!(row.rating, 3);
        assert_eq!(row.tags, vec!["a"]);
        assert!(!row.reviewed);
        assert!(!row.to_delete);
        assert!(row.aesthetic_score.is_none());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_root_state_dir_uses_final_component() {
        let dir = root_state_dir(Path::new("/var/meta"), Path::new("/home/me/renders"));
        assert_eq!(dir, Path::new("/var/meta/renders"));
    }
}
