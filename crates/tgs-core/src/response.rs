//! Caller-facing result shapes.
//!
//! Every JSON reply carries `success` and a `timestamp`; failures add a
//! machine-readable `error_kind` and a human message and never any bytes.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{Scope, StoryId, StoryItem},
    errors::{ErrorKind, FetchError, LocateError},
    media::{AcquiredMedia, MediaType},
};

/// Story dates are rendered in UTC with this pattern.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_date(at: &DateTime<Utc>) -> String {
    at.format(DATE_FORMAT).to_string()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Raw bytes as the response body.
    #[serde(alias = "file")]
    Inline,
    Base64,
    /// Metadata plus download links.
    #[default]
    #[serde(alias = "json")]
    Link,
}

/// A located and downloaded story, ready to be rendered.
#[derive(Clone, Debug)]
pub struct FetchedStory {
    /// The peer exactly as the caller named it.
    pub peer: String,
    pub item: StoryItem,
    pub media: AcquiredMedia,
}

impl FetchedStory {
    pub fn filename(&self) -> String {
        format!(
            "story_{}_{}.{}",
            self.peer,
            self.item.id,
            self.media.extension()
        )
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StoryMetadata {
    pub username: String,
    pub story_id: StoryId,
    pub date: String,
    pub found_in: Scope,
    pub media_type: MediaType,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl StoryMetadata {
    fn of(peer: &str, item: &StoryItem) -> Self {
        Self {
            username: peer.to_string(),
            story_id: item.id,
            date: format_date(&item.created_at),
            found_in: item.found_in,
            media_type: item.media.media_type(),
            mime_type: item.media.mime_type().to_string(),
            size: None,
            caption: item.caption.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Payload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_download: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StoryEnvelope {
    pub success: bool,
    #[serde(flatten)]
    pub meta: StoryMetadata,
    #[serde(flatten)]
    pub payload: Payload,
    pub timestamp: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckEnvelope {
    pub success: bool,
    pub exists: bool,
    pub has_media: bool,
    #[serde(flatten)]
    pub meta: StoryMetadata,
    pub timestamp: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    pub error_kind: ErrorKind,
    pub error: String,
    pub timestamp: String,
}

/// Raw bytes for the inline mode.
#[derive(Clone, Debug)]
pub struct InlineBody {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
pub enum Assembled {
    Inline(InlineBody),
    Json(StoryEnvelope),
}

#[derive(Clone, Debug, Default)]
pub struct ResponseAssembler {
    public_base_url: Option<String>,
}

impl ResponseAssembler {
    pub fn new(public_base_url: Option<String>) -> Self {
        Self {
            public_base_url: public_base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
        }
    }

    /// Render a fetched story. `file_url` is the file host link, if one was made.
    pub fn assemble(
        &self,
        fetched: FetchedStory,
        mode: OutputMode,
        file_url: Option<String>,
    ) -> Assembled {
        let mut meta = StoryMetadata::of(&fetched.peer, &fetched.item);
        meta.media_type = fetched.media.media_type;
        meta.mime_type = fetched.media.mime_type.clone();
        meta.size = Some(fetched.media.len());

        let payload = match mode {
            OutputMode::Inline => {
                return Assembled::Inline(InlineBody {
                    filename: fetched.filename(),
                    mime_type: fetched.media.mime_type,
                    bytes: fetched.media.bytes,
                })
            }
            OutputMode::Base64 => Payload {
                data: Some(base64::engine::general_purpose::STANDARD.encode(&fetched.media.bytes)),
                ..Payload::default()
            },
            OutputMode::Link => {
                let download_url = format!(
                    "/api/download?username={}&storyid={}",
                    fetched.peer, fetched.item.id
                );
                Payload {
                    direct_download: self
                        .public_base_url
                        .as_ref()
                        .map(|base| format!("{base}{download_url}")),
                    download_url: Some(download_url),
                    file_url,
                    ..Payload::default()
                }
            }
        };

        Assembled::Json(StoryEnvelope {
            success: true,
            meta,
            payload,
            timestamp: now(),
        })
    }

    pub fn check(&self, peer: &str, item: &StoryItem) -> CheckEnvelope {
        CheckEnvelope {
            success: true,
            exists: true,
            has_media: true,
            meta: StoryMetadata::of(peer, item),
            timestamp: now(),
        }
    }

    pub fn failure(&self, err: &FetchError) -> ErrorEnvelope {
        ErrorEnvelope {
            success: false,
            exists: None,
            error_kind: err.kind(),
            error: err.to_string(),
            timestamp: now(),
        }
    }

    /// Like [`failure`](Self::failure), plus whether the story exists at all.
    pub fn check_failure(&self, err: &FetchError) -> ErrorEnvelope {
        let exists = match err {
            FetchError::Locate(LocateError::NotFound { .. }) => Some(false),
            FetchError::Locate(LocateError::NoMedia { .. }) => Some(true),
            _ => None,
        };
        ErrorEnvelope {
            exists,
            ..self.failure(err)
        }
    }
}

/// RFC 3339 timestamp stamped on every envelope.
pub fn now() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{photo_story, video_story};
    use serde_json::json;

    fn fetched(peer: &str) -> FetchedStory {
        let item = video_story(42, 3).into_item(Scope::Pinned).unwrap();
        let media = AcquiredMedia::classify(&item.media, vec![1, 2, 3]);
        FetchedStory {
            peer: peer.to_string(),
            item,
            media,
        }
    }

    #[test]
    fn dates_use_fixed_utc_format() {
        let item = photo_story(1).into_item(Scope::Active).unwrap();
        assert_eq!(format_date(&item.created_at), "2023-11-14 22:13:20");
    }

    #[test]
    fn output_mode_accepts_legacy_names() {
        let mode: OutputMode = serde_json::from_value(json!("file")).unwrap();
        assert_eq!(mode, OutputMode::Inline);
        let mode: OutputMode = serde_json::from_value(json!("json")).unwrap();
        assert_eq!(mode, OutputMode::Link);
        let mode: OutputMode = serde_json::from_value(json!("base64")).unwrap();
        assert_eq!(mode, OutputMode::Base64);
        assert_eq!(OutputMode::default(), OutputMode::Link);
    }

    #[test]
    fn inline_carries_bytes_and_filename() {
        let Assembled::Inline(body) =
            ResponseAssembler::default().assemble(fetched("alice"), OutputMode::Inline, None)
        else {
            panic!("expected inline body");
        };
        assert_eq!(body.filename, "story_alice_42.mp4");
        assert_eq!(body.mime_type, "video/mp4");
        assert_eq!(body.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn base64_envelope() {
        let Assembled::Json(env) =
            ResponseAssembler::default().assemble(fetched("alice"), OutputMode::Base64, None)
        else {
            panic!("expected json");
        };
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["success"], json!(true));
        assert_eq!(v["data"], json!("AQID"));
        assert_eq!(v["size"], json!(3));
        assert_eq!(v["media_type"], json!("video"));
        assert_eq!(v["found_in"], json!("pinned"));
        assert!(v.get("download_url").is_none());
    }

    #[test]
    fn link_envelope_with_and_without_base_url() {
        let plain = ResponseAssembler::new(None);
        let Assembled::Json(env) = plain.assemble(fetched("alice"), OutputMode::Link, None) else {
            panic!("expected json");
        };
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["download_url"], json!("/api/download?username=alice&storyid=42"));
        assert!(v.get("direct_download").is_none());
        assert!(v.get("file_url").is_none());

        let public = ResponseAssembler::new(Some("https://stories.example/".into()));
        let Assembled::Json(env) = public.assemble(
            fetched("-1001234567890"),
            OutputMode::Link,
            Some("https://files.example/dl/x".into()),
        ) else {
            panic!("expected json");
        };
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(
            v["direct_download"],
            json!("https://stories.example/api/download?username=-1001234567890&storyid=42")
        );
        assert_eq!(v["file_url"], json!("https://files.example/dl/x"));
    }

    #[test]
    fn failures_carry_kind_and_message_only() {
        let err = FetchError::Locate(LocateError::NotFound {
            story_id: StoryId(9),
        });
        let a = ResponseAssembler::default();

        let v = serde_json::to_value(a.failure(&err)).unwrap();
        assert_eq!(v["success"], json!(false));
        assert_eq!(v["error_kind"], json!("not_found"));
        assert_eq!(v["error"], json!("story 9 not found"));
        assert!(v.get("exists").is_none());
        assert!(v.get("data").is_none());

        let v = serde_json::to_value(a.check_failure(&err)).unwrap();
        assert_eq!(v["exists"], json!(false));
    }

    #[test]
    fn check_reports_location() {
        let item = photo_story(3).into_item(Scope::Archived).unwrap();
        let v = serde_json::to_value(ResponseAssembler::default().check("bob_42", &item)).unwrap();
        assert_eq!(v["exists"], json!(true));
        assert_eq!(v["has_media"], json!(true));
        assert_eq!(v["found_in"], json!("archived"));
        assert_eq!(v["media_type"], json!("photo"));
        assert_eq!(v["caption"], json!("story 3"));
    }
}
