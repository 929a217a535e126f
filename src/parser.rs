use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::scanner;

/// Placeholder for fields that were absent or unparseable. Kept as a literal
/// string rather than `None` so downstream display never has to special-case
/// missing data.
pub const NO_DATA: &str = "No data found";

const NEGATIVE_MARKER: &str = "Negative prompt:";

/// Markers that must all be present before a line is treated as the
/// key-value settings line.
const SETTINGS_MARKERS: &[&str] = &[
    "Steps:",
    "Sampler:",
    "CFG scale:",
    "Seed:",
    "Size:",
    "Model",
];

/// Column order of the fixed schema as persisted, `sha256` index excluded.
pub const FIXED_COLUMNS: &[&str] = &[
    "Positive prompt",
    "Negative prompt",
    "Steps",
    "Sampler",
    "CFG scale",
    "Seed",
    "Size",
    "Model hash",
    "Model",
    "Postprocessing",
    "Extras",
];

/// One extracted-metadata row: the fixed generation fields plus an open map of
/// sampler-specific extension fields (hires-fix parameters, secondary-model
/// weights, version strings and whatever else the settings line carries).
///
/// Immutable after extraction except by full re-extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExifRecord {
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub steps: String,
    pub sampler: String,
    pub cfg_scale: String,
    pub seed: String,
    pub size: String,
    pub model_hash: String,
    pub model_name: String,
    pub postprocessing: String,
    pub extras: String,
    /// Settings-line keys outside the fixed schema, in stable name order.
    pub extensions: BTreeMap<String, String>,
}

impl Default for ExifRecord {
    fn default() -> Self {
        Self::not_found()
    }
}

impl ExifRecord {
    /// A record with every field at the sentinel; the guaranteed fallback for
    /// unreadable images and unknown keys.
    pub fn not_found() -> Self {
        ExifRecord {
            positive_prompt: NO_DATA.to_string(),
            negative_prompt: NO_DATA.to_string(),
            steps: NO_DATA.to_string(),
            sampler: NO_DATA.to_string(),
            cfg_scale: NO_DATA.to_string(),
            seed: NO_DATA.to_string(),
            size: NO_DATA.to_string(),
            model_hash: NO_DATA.to_string(),
            model_name: NO_DATA.to_string(),
            postprocessing: NO_DATA.to_string(),
            extras: NO_DATA.to_string(),
            extensions: BTreeMap::new(),
        }
    }

    /// Field value by persisted column name, extension fields included.
    pub fn field(&self, column: &str) -> Option<&str> {
        let value = match column {
            "Positive prompt" => &self.positive_prompt,
            "Negative prompt" => &self.negative_prompt,
            "Steps" => &self.steps,
            "Sampler" => &self.sampler,
            "CFG scale" => &self.cfg_scale,
            "Seed" => &self.seed,
            "Size" => &self.size,
            "Model hash" => &self.model_hash,
            "Model" => &self.model_name,
            "Postprocessing" => &self.postprocessing,
            "Extras" => &self.extras,
            other => return self.extensions.get(other).map(String::as_str),
        };
        Some(value.as_str())
    }

    /// Assigns a field by persisted column name; unrecognized names land in
    /// the open extension map (the schema is fixed-plus-open on purpose).
    pub fn set_field(&mut self, column: &str, value: String) {
        match column {
            "Positive prompt" => self.positive_prompt = value,
            "Negative prompt" => self.negative_prompt = value,
            "Steps" => self.steps = value,
            "Sampler" => self.sampler = value,
            "CFG scale" => self.cfg_scale = value,
            "Seed" => self.seed = value,
            "Size" => self.size = value,
            "Model hash" => self.model_hash = value,
            "Model" => self.model_name = value,
            "Postprocessing" => self.postprocessing = value,
            "Extras" => self.extras = value,
            other => {
                self.extensions.insert(other.to_string(), value);
            }
        }
    }
}

/// Extracts and parses the embedded metadata of one image file.
///
/// Never fails: absent or malformed metadata degrades to sentinel values
/// per-field, not per-record.
pub fn parse_image(path: &Path) -> ExifRecord {
    match scanner::embedded_text(path) {
        Some(chunks) => parse_text_dictionary(&chunks),
        None => ExifRecord::not_found(),
    }
}

/// Parses an already-extracted text dictionary (PNG text chunks).
pub fn parse_text_dictionary(chunks: &HashMap<String, String>) -> ExifRecord {
    let mut record = match chunks.get("parameters") {
        Some(parameters) => parse_parameters(parameters),
        None => ExifRecord::not_found(),
    };

    // Side-channel fields are copied verbatim when present.
    if let Some(postprocessing) = non_empty(chunks.get("postprocessing")) {
        record.postprocessing = postprocessing.to_string();
    }
    if let Some(extras) = non_empty(chunks.get("extras")) {
        record.extras = extras.to_string();
    }

    record
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).map(str::trim).filter(|v| !v.is_empty())
}

/// Parses the multi-line `parameters` block.
///
/// Line classification:
/// - a line carrying the negative-prompt marker sets the negative prompt
///   (marker prefix stripped; a later occurrence replaces an earlier one)
/// - a line carrying the full settings marker set is split into `key: value`
///   pairs; known keys fill the fixed schema, the rest go to the open map
/// - anything else feeds the positive prompt
pub fn parse_parameters(block: &str) -> ExifRecord {
    let mut record = ExifRecord::not_found();

    for line in block.lines() {
        if let Some(idx) = line.find(NEGATIVE_MARKER) {
            record.negative_prompt = line[idx + NEGATIVE_MARKER.len()..].trim().to_string();
        } else if is_settings_line(line) {
            for pair in split_parameter_pairs(line) {
                // Split on first colon only
                if let Some(colon_pos) = pair.find(':') {
                    let key = pair[..colon_pos].trim();
                    let value = pair[colon_pos + 1..].trim();
                    if !key.is_empty() {
                        record.set_field(key, value.to_string());
                    }
                }
            }
        } else if !line.trim().is_empty() {
            record.positive_prompt = line.trim().to_string();
        }
    }

    record
}

fn is_settings_line(line: &str) -> bool {
    SETTINGS_MARKERS.iter().all(|marker| line.contains(marker))
}

/// Splits the settings line on commas that look like true `Key: Value`
/// boundaries.
///
/// A comma only splits when followed by a key that starts with an uppercase
/// ASCII letter, has a valid key body, and ends in `:`. This keeps values
/// intact when they contain commas, dots, or parenthesized sub-values, e.g.
/// `Model: Foo (v2.1)` or `Lora hashes: "a: 111, b: 222"`.
fn split_parameter_pairs(block: &str) -> Vec<String> {
    let mut pairs = Vec::new();
    let mut start = 0usize;
    let mut in_quotes = false;

    for (idx, ch) in block.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes && is_key_boundary_after_comma(block, idx + 1) => {
                let segment = block[start..idx].trim();
                if !segment.is_empty() {
                    pairs.push(segment.to_string());
                }
                start = idx + 1;
            }
            _ => {}
        }
    }

    let tail = block[start..].trim();
    if !tail.is_empty() {
        pairs.push(tail.to_string());
    }

    pairs
}

fn is_key_boundary_after_comma(block: &str, from_idx: usize) -> bool {
    let bytes = block.as_bytes();
    let mut idx = from_idx;

    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx += 1;
    }
    if idx >= bytes.len() || !bytes[idx].is_ascii_uppercase() {
        return false;
    }

    let key_start = idx;
    while idx < bytes.len() {
        let b = bytes[idx];
        if b == b':' {
            return idx > key_start;
        }
        if b == b',' || b == b'\n' || b == b'\r' {
            return false;
        }

        let is_valid_key_char = b.is_ascii_alphanumeric()
            || matches!(b, b' ' | b'_' | b'-' | b'/' | b'.' | b'(' | b')');
        if !is_valid_key_char {
            return false;
        }
        idx += 1;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_BLOCK: &str = "masterpiece, best quality, 1girl, solo\n\
        Negative prompt: worst quality, low quality\n\
        Steps: 20, Sampler: DPM++ 2M Karras, CFG scale: 7, Seed: 12345, Size: 512x768, Model hash: abc123, Model: anything-v5";

    #[test]
    fn test_parse_full_block() {
        let record = parse_parameters(FULL_BLOCK);
        assert_eq!(record.positive_prompt, "masterpiece, best quality, 1girl, solo");
        assert_eq!(record.negative_prompt, "worst quality, low quality");
        assert_eq!(record.steps, "20");
        assert_eq!(record.sampler, "DPM++ 2M Karras");
        assert_eq!(record.cfg_scale, "7");
        assert_eq!(record.seed, "12345");
        assert_eq!(record.size, "512x768");
        assert_eq!(record.model_hash, "abc123");
        assert_eq!(record.model_name, "anything-v5");
    }

    #[test]
    fn test_two_line_block_without_negative_marker() {
        let block = "portrait of a cat\n\
            Steps: 15, Sampler: Euler, CFG scale: 7.5, Seed: 999, Size: 512x512, Model hash: ff00, Model: base";
        let record = parse_parameters(block);
        assert_eq!(record.positive_prompt, "portrait of a cat");
        assert_eq!(record.negative_prompt, NO_DATA);
        assert_eq!(record.steps, "15");
    }

    #[test]
    fn test_parenthesized_sub_value_is_not_truncated() {
        let block = "landscape\n\
            Steps: 30, Sampler: Euler a, CFG scale: 5, Seed: 42, Size: 896x1152, Model hash: 747bbe7d2d (pruned), Model: Dreamshaper (v8.1)";
        let record = parse_parameters(block);
        assert_eq!(record.model_hash, "747bbe7d2d (pruned)");
        assert_eq!(record.model_name, "Dreamshaper (v8.1)");
    }

    #[test]
    fn test_unrecognized_settings_keys_land_in_extension_map() {
        let block = "city at night\n\
            Steps: 25, Sampler: Euler, CFG scale: 6, Seed: 7, Size: 640x960, Model hash: aa, Model: bb, Hires upscale: 2, Hires steps: 12, Version: v1.7.0";
        let record = parse_parameters(block);
        assert_eq!(
            record.extensions.get("Hires upscale").map(String::as_str),
            Some("2")
        );
        assert_eq!(
            record.extensions.get("Hires steps").map(String::as_str),
            Some("12")
        );
        assert_eq!(
            record.extensions.get("Version").map(String::as_str),
            Some("v1.7.0")
        );
    }

    #[test]
    fn test_quoted_value_with_commas_stays_whole() {
        let block = "portrait\n\
            Steps: 20, Sampler: Euler a, Lora hashes: \"foo: 111, bar: 222\", CFG scale: 7, Seed: 42, Size: 512x512, Model hash: x, Model: y";
        let record = parse_parameters(block);
        assert_eq!(
            record.extensions.get("Lora hashes").map(String::as_str),
            Some("\"foo: 111, bar: 222\"")
        );
        assert_eq!(record.cfg_scale, "7");
    }

    #[test]
    fn test_later_negative_marker_replaces_earlier() {
        let block = "prompt\n\
            Negative prompt: first\n\
            Negative prompt: second\n\
            Steps: 1, Sampler: Euler, CFG scale: 1, Seed: 1, Size: 1x1, Model hash: a, Model: b";
        let record = parse_parameters(block);
        assert_eq!(record.negative_prompt, "second");
    }

    #[test]
    fn test_empty_block_keeps_every_sentinel() {
        let record = parse_parameters("");
        for &column in FIXED_COLUMNS {
            assert_eq!(record.field(column), Some(NO_DATA), "column {}", column);
        }
        assert!(record.extensions.is_empty());
    }

    #[test]
    fn test_side_channel_fields_copied_verbatim() {
        let mut chunks = HashMap::new();
        chunks.insert("parameters".to_string(), "a cat\nSteps: 1, Sampler: E, CFG scale: 1, Seed: 1, Size: 1x1, Model hash: a, Model: b".to_string());
        chunks.insert("postprocessing".to_string(), "GFPGAN".to_string());
        chunks.insert("extras".to_string(), "Upscale: 4x".to_string());

        let record = parse_text_dictionary(&chunks);
        assert_eq!(record.postprocessing, "GFPGAN");
        assert_eq!(record.extras, "Upscale: 4x");
        assert_eq!(record.positive_prompt, "a cat");
    }

    #[test]
    fn test_missing_parameters_chunk_degrades_to_sentinels() {
        let mut chunks = HashMap::new();
        chunks.insert("Software".to_string(), "something else".to_string());
        let record = parse_text_dictionary(&chunks);
        assert_eq!(record.positive_prompt, NO_DATA);
        assert_eq!(record.steps, NO_DATA);
    }

    #[test]
    fn test_field_accessor_covers_extensions() {
        let mut record = ExifRecord::not_found();
        record.set_field("Denoising strength", "0.35".to_string());
        assert_eq!(record.field("Denoising strength"), Some("0.35"));
        assert_eq!(record.field("Unknown column"), None);
    }
}
