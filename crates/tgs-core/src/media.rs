//! Media descriptors, file-addressing tokens and classification.

use std::{any::Any, fmt, sync::Arc};

use serde::Serialize;

/// Everything needed to address a stored file on Telegram's side.
///
/// `file_reference` is short-lived: it is only valid for the lookup that
/// produced it and must never be cached.
#[derive(Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub dc_id: i32,
    pub id: i64,
    pub access_hash: i64,
    pub file_reference: Vec<u8>,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("dc_id", &self.dc_id)
            .field("id", &self.id)
            .field("file_reference_len", &self.file_reference.len())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhotoDescriptor {
    pub file: FileHandle,
    /// Size class of the largest rendition (`"y"`, `"x"`, ...).
    pub thumb_size: String,
    pub size: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DocumentDescriptor {
    pub file: FileHandle,
    pub mime_type: String,
    pub size: u64,
    pub attributes: Vec<FileAttribute>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FileAttribute {
    Video {
        duration_secs: f64,
        width: i32,
        height: i32,
    },
    ImageSize {
        width: i32,
        height: i32,
    },
    FileName(String),
    Animated,
}

/// The downloadable part of a story, decided once when the story is read.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaRef {
    Photo(PhotoDescriptor),
    Document(DocumentDescriptor),
}

impl MediaRef {
    pub fn file(&self) -> &FileHandle {
        match self {
            MediaRef::Photo(p) => &p.file,
            MediaRef::Document(d) => &d.file,
        }
    }

    /// Size announced by the server, if any.
    pub fn declared_size(&self) -> Option<u64> {
        match self {
            MediaRef::Photo(p) => p.size,
            MediaRef::Document(d) => Some(d.size).filter(|s| *s > 0),
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            MediaRef::Photo(_) => MediaType::Photo,
            MediaRef::Document(d) => {
                let mime = d.mime_type.to_ascii_lowercase();
                if mime.starts_with("video/") {
                    MediaType::Video
                } else if mime.starts_with("image/") {
                    MediaType::Image
                } else {
                    MediaType::Document
                }
            }
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            MediaRef::Photo(_) => PHOTO_MIME,
            MediaRef::Document(d) if d.mime_type.trim().is_empty() => DEFAULT_MIME,
            MediaRef::Document(d) => &d.mime_type,
        }
    }

    /// File name declared by the uploader, if any.
    pub fn file_name(&self) -> Option<&str> {
        let MediaRef::Document(d) = self else {
            return None;
        };
        d.attributes.iter().find_map(|a| match a {
            FileAttribute::FileName(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

/// Opaque adapter-owned media object (e.g. the raw MTProto `MessageMedia`).
///
/// The core never looks inside; it only hands it back to the adapter that
/// produced it when asking for the native download path.
#[derive(Clone)]
pub struct NativeMedia(Arc<dyn Any + Send + Sync>);

impl NativeMedia {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for NativeMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeMedia(..)")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileKind {
    Photo { thumb_size: String },
    Document,
}

/// Explicit file-addressing token (datacenter, object id, access hash,
/// file reference, media kind).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileLocation {
    pub file: FileHandle,
    pub kind: FileKind,
}

impl From<&MediaRef> for FileLocation {
    fn from(media: &MediaRef) -> Self {
        match media {
            MediaRef::Photo(p) => FileLocation {
                file: p.file.clone(),
                kind: FileKind::Photo {
                    thumb_size: p.thumb_size.clone(),
                },
            },
            MediaRef::Document(d) => FileLocation {
                file: d.file.clone(),
                kind: FileKind::Document,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Photo,
    Video,
    Image,
    Document,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Photo => "photo",
            MediaType::Video => "video",
            MediaType::Image => "image",
            MediaType::Document => "document",
        }
    }
}

pub const PHOTO_MIME: &str = "image/jpeg";
pub const DEFAULT_MIME: &str = "application/octet-stream";
pub const DEFAULT_EXTENSION: &str = "bin";

/// File extension for a mime type; `bin` when unmapped.
pub fn extension_for_mime(mime: &str) -> &'static str {
    let essence = mime.split(';').next().unwrap_or("").trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "video/x-matroska" => "mkv",
        "video/mpeg" => "mpeg",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        "audio/mp4" | "audio/m4a" => "m4a",
        "application/x-tgsticker" => "tgs",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "text/plain" => "txt",
        _ => DEFAULT_EXTENSION,
    }
}

/// Downloaded media with its classification.
#[derive(Clone)]
pub struct AcquiredMedia {
    pub bytes: Vec<u8>,
    pub media_type: MediaType,
    pub mime_type: String,
}

impl AcquiredMedia {
    pub fn classify(media: &MediaRef, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            media_type: media.media_type(),
            mime_type: media.mime_type().to_string(),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self.media_type {
            MediaType::Photo => "jpg",
            _ => extension_for_mime(&self.mime_type),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for AcquiredMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquiredMedia")
            .field("len", &self.bytes.len())
            .field("media_type", &self.media_type)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}
