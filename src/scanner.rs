use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{CatalogError, Result};
use crate::key::{key_for, ImageKey};

/// PNG file signature (first 8 bytes of any valid PNG)
const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];
const PNG_READER_CAPACITY: usize = 128 * 1024;

/// Recognized image extensions. The match is case-sensitive: `IMG.PNG` is not
/// picked up, mirroring the catalog's documented allow-list.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// One candidate image produced by a directory scan.
///
/// The root-relative path string is the identity text: it is what gets hashed
/// into the [`ImageKey`], so the same tree scanned from a different mount
/// point still yields the same keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Root-relative path, `/`-separated, used as the key text.
    pub relative: String,
    /// Absolute path used for file access.
    pub path: PathBuf,
}

impl ImageRef {
    pub fn key(&self) -> ImageKey {
        key_for(&self.relative)
    }

    /// Bare file name, used for thumbnail naming and display.
    pub fn file_name(&self) -> &str {
        self.relative
            .rsplit('/')
            .next()
            .unwrap_or(self.relative.as_str())
    }
}

fn has_image_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && IMAGE_EXTENSIONS.contains(&ext),
        None => false,
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Recursively enumerates `root` and returns the candidate image references,
/// grouped by containing directory and then lexicographic by file name.
///
/// The result is a finite snapshot, not a live view: callers re-invoke to
/// observe filesystem changes. Ordering is stable for an unchanged tree, which
/// matters because index-based navigation depends on it within a session.
pub fn scan(root: &Path) -> Result<Vec<ImageRef>> {
    if !root.is_dir() {
        return Err(CatalogError::NotADirectory(root.to_path_buf()));
    }

    let mut refs = Vec::new();
    for entry in walkdir::WalkDir::new(root)
        .follow_links(false)
        .max_open(32)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || entry
                    .file_name()
                    .to_str()
                    .map(|name| !is_hidden(name))
                    .unwrap_or(false)
        })
        .filter_map(std::result::Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !has_image_extension(name) {
            continue;
        }

        let path = entry.path().to_path_buf();
        let relative = match path.strip_prefix(root) {
            Ok(rel) => rel
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.to_string_lossy().into_owned(),
        };
        refs.push(ImageRef { relative, path });
    }

    refs.sort_by(|a, b| {
        let dir_a = a.relative.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let dir_b = b.relative.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        dir_a
            .cmp(dir_b)
            .then_with(|| a.file_name().cmp(b.file_name()))
    });
    Ok(refs)
}

/// Extracts all PNG text chunks as key/value pairs.
///
/// Pixel data (IDAT) is never decoded; only chunk headers and text payloads
/// are read, keeping per-image cost proportional to the metadata size.
pub fn read_text_chunks(path: &Path) -> std::io::Result<HashMap<String, String>> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(PNG_READER_CAPACITY, file);
    let mut text_chunks = HashMap::new();

    let mut sig = [0u8; 8];
    reader.read_exact(&mut sig)?;
    if sig != PNG_SIGNATURE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("not a valid PNG file: {}", path.display()),
        ));
    }

    loop {
        // Chunk length (4 bytes, big-endian); EOF here means a clean stop.
        let length = match reader.read_u32::<BigEndian>() {
            Ok(len) => len,
            Err(_) => break,
        };

        let mut chunk_type = [0u8; 4];
        if reader.read_exact(&mut chunk_type).is_err() {
            break;
        }

        match &chunk_type {
            b"tEXt" | b"zTXt" | b"iTXt" => {
                let mut data = vec![0u8; length as usize];
                reader.read_exact(&mut data)?;
                reader.seek(SeekFrom::Current(4))?; // Skip CRC

                let maybe_pair = match &chunk_type {
                    b"tEXt" => parse_text_chunk_pair(&data),
                    b"zTXt" => parse_ztxt_chunk_pair(&data),
                    b"iTXt" => parse_itxt_chunk_pair(&data),
                    _ => None,
                };

                if let Some((key, value)) = maybe_pair {
                    text_chunks.insert(key, value);
                }
            }
            b"IEND" => break,
            _ => {
                // Skip chunk data + CRC (4 bytes)
                reader.seek(SeekFrom::Current(length as i64 + 4))?;
            }
        }
    }

    Ok(text_chunks)
}

/// Embedded text metadata for one image, or `None` when the file carries no
/// readable text chunks. Decoding failures are demoted to `None` here so that
/// extraction callers never have to handle a per-image error.
pub fn embedded_text(path: &Path) -> Option<HashMap<String, String>> {
    if !is_png(path) {
        return None;
    }
    match read_text_chunks(path) {
        Ok(chunks) if !chunks.is_empty() => Some(chunks),
        Ok(_) => None,
        Err(error) => {
            log::warn!("unreadable text chunks in {}: {}", path.display(), error);
            None
        }
    }
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value == "png")
        .unwrap_or(false)
}

fn parse_text_chunk_pair(data: &[u8]) -> Option<(String, String)> {
    let null_pos = data.iter().position(|&b| b == 0)?;
    let keyword = String::from_utf8(data[..null_pos].to_vec()).ok()?;
    let value = String::from_utf8(data[null_pos + 1..].to_vec()).ok()?;
    Some((keyword, value))
}

fn parse_ztxt_chunk_pair(data: &[u8]) -> Option<(String, String)> {
    let null_pos = data.iter().position(|&b| b == 0)?;
    let keyword = String::from_utf8(data[..null_pos].to_vec()).ok()?;

    let mut cursor = null_pos + 1;
    if cursor >= data.len() {
        return None;
    }

    let compression_method = data[cursor];
    cursor += 1;
    if compression_method != 0 {
        return None;
    }

    // Some tools include an extra separator byte before payload; tolerate it.
    if cursor < data.len() && data[cursor] == 0 {
        cursor += 1;
    }

    let value = decompress_zlib_to_string(&data[cursor..])?;
    Some((keyword, value))
}

fn parse_itxt_chunk_pair(data: &[u8]) -> Option<(String, String)> {
    let null_pos = data.iter().position(|&b| b == 0)?;
    let keyword = String::from_utf8(data[..null_pos].to_vec()).ok()?;

    let rest = &data[null_pos + 1..];
    if rest.len() < 2 {
        return None;
    }

    let compression_flag = rest[0];
    let compression_method = rest[1];
    if compression_flag != 0 && compression_flag != 1 {
        return None;
    }

    let after_compression = &rest[2..];
    let lang_end = after_compression.iter().position(|&b| b == 0)?;
    let after_lang = &after_compression[lang_end + 1..];
    let translated_end = after_lang.iter().position(|&b| b == 0)?;
    let text = &after_lang[translated_end + 1..];

    if compression_flag == 1 {
        if compression_method != 0 {
            return None;
        }
        let value = decompress_zlib_to_string(text)?;
        return Some((keyword, value));
    }

    let value = String::from_utf8(text.to_vec()).ok()?;
    Some((keyword, value))
}

fn decompress_zlib_to_string(data: &[u8]) -> Option<String> {
    let mut decoder = ZlibDecoder::new(data);
    let mut output = String::new();
    decoder.read_to_string(&mut output).ok()?;
    Some(output)
}
