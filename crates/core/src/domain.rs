use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::hash::PerceptualHash;

/// Extensions the hash engine will try to decode.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp",
];

/// Extensions treated as video. Videos are catalogued but never hashed.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mkv", "webm", "mov", "avi", "wmv", "flv", "mpg", "mpeg",
];

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

pub fn is_supported_image(path: &Path) -> bool {
    extension_of(path).is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

pub fn is_video(path: &Path) -> bool {
    extension_of(path).is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
}

/// A category of tags. The symbol is a single glyph shown next to tags of
/// this type; the color is packed RGB (0xRRGGBB).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagType {
    pub id: i64,
    pub label: String,
    pub symbol: char,
    pub color: u32,
}

#[derive(Debug, Clone)]
pub struct NewTagType {
    pub label: String,
    pub symbol: char,
    pub color: u32,
}

/// A tag. A tag with a non-empty definition is a compound tag: it names a
/// stored query and can never be attached to media directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub label: String,
    pub type_id: Option<i64>,
    pub definition: Option<String>,
}

impl Tag {
    pub fn is_compound(&self) -> bool {
        self.definition.as_deref().is_some_and(|d| !d.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewTag {
    pub label: String,
    pub type_id: Option<i64>,
    pub definition: Option<String>,
}

impl NewTag {
    pub fn new(label: impl Into<String>) -> Self {
        NewTag {
            label: label.into(),
            type_id: None,
            definition: None,
        }
    }
}

/// One catalogued file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRecord {
    pub id: i64,
    pub path: PathBuf,
    pub hash: Option<PerceptualHash>,
    pub added_at: String,
}

/// Describes an insert or update of one media item. Tags are referenced by
/// label; unknown labels in `add_tags` are created on the fly.
#[derive(Debug, Clone)]
pub struct MediaChange {
    pub path: PathBuf,
    pub hash: Option<PerceptualHash>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
}

impl MediaChange {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MediaChange {
            path: path.into(),
            hash: None,
            add_tags: Vec::new(),
            remove_tags: Vec::new(),
        }
    }

    pub fn with_hash(mut self, hash: PerceptualHash) -> Self {
        self.hash = Some(hash);
        self
    }

    pub fn add_tag(mut self, label: impl Into<String>) -> Self {
        self.add_tags.push(label.into());
        self
    }

    pub fn remove_tag(mut self, label: impl Into<String>) -> Self {
        self.remove_tags.push(label.into());
        self
    }
}

/// Tag labels: non-empty, letters/digits/underscore only. Anything else
/// would collide with the query language's operators.
pub fn validate_tag_label(label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(Error::InvalidLabel("label is empty".into()));
    }
    if !label.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(Error::InvalidLabel(label.to_string()));
    }
    Ok(())
}

/// Tag-type labels: anything non-blank.
pub fn validate_type_label(label: &str) -> Result<()> {
    if label.trim().is_empty() {
        return Err(Error::InvalidLabel("tag type label is blank".into()));
    }
    Ok(())
}

/// Tag-type symbols: one visible glyph that cannot be confused with a label
/// character.
pub fn validate_type_symbol(symbol: char) -> Result<()> {
    if symbol.is_alphanumeric()
        || symbol.is_whitespace()
        || symbol.is_control()
        || symbol == '_'
    {
        return Err(Error::InvalidSymbol(symbol.to_string()));
    }
    Ok(())
}

/// Blank definitions are stored as NULL so `is_compound` has one source of
/// truth.
pub fn normalize_definition(definition: Option<String>) -> Option<String> {
    definition.filter(|d| !d.trim().is_empty())
}
