use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::media::{MediaRef, NativeMedia};

/// Telegram story id (numeric, unique per peer).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct StoryId(pub i64);

impl fmt::Display for StoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unresolved reference to a story owner, as written by a caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PeerRef {
    Username(String),
    /// Channel id in marked form (`-100` followed by the raw id).
    Channel(i64),
}

impl PeerRef {
    /// Offset applied to raw channel ids to produce the marked form.
    pub const CHANNEL_MARKER: i64 = 1_000_000_000_000;

    /// Build a channel reference from the raw id found in `t.me/c/<id>` links.
    pub fn channel(raw_id: i64) -> Option<Self> {
        let marked = Self::CHANNEL_MARKER.checked_add(raw_id)?;
        Some(Self::Channel(-marked))
    }

    /// Raw channel id for `Channel` references.
    pub fn channel_id(&self) -> Option<i64> {
        match self {
            PeerRef::Channel(marked) => Some(-marked - Self::CHANNEL_MARKER),
            PeerRef::Username(_) => None,
        }
    }

    /// Parse the explicit-peer form: `name`, `@name`, or a marked channel id.
    pub fn from_identifier(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(digits) = raw.strip_prefix("-100") {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                return digits.parse::<i64>().ok().and_then(Self::channel);
            }
            return None;
        }

        let name = raw.strip_prefix('@').unwrap_or(raw);
        if is_username(name) {
            Some(PeerRef::Username(name.to_string()))
        } else {
            None
        }
    }
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRef::Username(name) => f.write_str(name),
            PeerRef::Channel(marked) => write!(f, "{marked}"),
        }
    }
}

/// Telegram usernames: 4-32 chars of `[A-Za-z0-9_]`, starting with a letter.
pub(crate) fn is_username(s: &str) -> bool {
    let len = s.len();
    (4..=32).contains(&len)
        && s.starts_with(|c: char| c.is_ascii_alphabetic())
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    User,
    Channel,
    Group,
}

/// A resolved, addressable story owner.
///
/// Only the adapter that produced it interprets `id`/`access_hash`. Handles are
/// request-local: access hashes may rotate, so they are never cached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerHandle {
    pub kind: PeerKind,
    pub id: i64,
    pub access_hash: i64,
    pub label: String,
}

/// Where a story was found.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Direct,
    Active,
    Pinned,
    Archived,
}

impl Scope {
    /// Search order used by the locator; the first scope holding the id wins.
    pub const SEARCH_ORDER: [Scope; 4] = [Scope::Direct, Scope::Active, Scope::Pinned, Scope::Archived];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Direct => "direct",
            Scope::Active => "active",
            Scope::Pinned => "pinned",
            Scope::Archived => "archived",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A story as returned by a remote listing, before the locator claims it.
#[derive(Clone, Debug)]
pub struct RemoteStory {
    pub id: StoryId,
    /// Unix seconds.
    pub date: i64,
    pub caption: Option<String>,
    pub media: Option<MediaRef>,
    /// The adapter's own media object, handed back verbatim on download.
    pub native: Option<NativeMedia>,
}

impl RemoteStory {
    /// Claim this story for `scope`. Stories without downloadable media yield `None`.
    pub fn into_item(self, scope: Scope) -> Option<StoryItem> {
        let media = self.media?;
        Some(StoryItem {
            id: self.id,
            created_at: DateTime::from_timestamp(self.date, 0).unwrap_or_default(),
            caption: self.caption.filter(|c| !c.is_empty()),
            media,
            native: self.native,
            found_in: scope,
        })
    }
}

/// One entry of a story listing.
///
/// Active listings may contain `Skipped` placeholders (id only) that must be
/// fetched by id to obtain the media.
#[derive(Clone, Debug)]
pub enum ListedStory {
    Item(RemoteStory),
    Skipped(StoryId),
    Deleted(StoryId),
}

impl ListedStory {
    pub fn id(&self) -> StoryId {
        match self {
            ListedStory::Item(s) => s.id,
            ListedStory::Skipped(id) | ListedStory::Deleted(id) => *id,
        }
    }
}

/// A located story. Lives for one request and is never persisted.
#[derive(Clone, Debug)]
pub struct StoryItem {
    pub id: StoryId,
    pub created_at: DateTime<Utc>,
    pub caption: Option<String>,
    pub media: MediaRef,
    pub native: Option<NativeMedia>,
    pub found_in: Scope,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_marking_round_trips() {
        let peer = PeerRef::channel(1234567890).unwrap();
        assert_eq!(peer, PeerRef::Channel(-1001234567890));
        assert_eq!(peer.channel_id(), Some(1234567890));
        assert_eq!(peer.to_string(), "-1001234567890");
    }

    #[test]
    fn identifier_forms() {
        assert_eq!(
            PeerRef::from_identifier("@alice_01"),
            Some(PeerRef::Username("alice_01".into()))
        );
        assert_eq!(
            PeerRef::from_identifier("-1001234567890"),
            PeerRef::channel(1234567890)
        );
        assert_eq!(PeerRef::from_identifier("-100"), None);
        assert_eq!(PeerRef::from_identifier("-100abc"), None);
        assert_eq!(PeerRef::from_identifier("ab"), None);
        assert_eq!(PeerRef::from_identifier("1alice"), None);
        assert_eq!(PeerRef::from_identifier("al ice"), None);
    }

    #[test]
    fn story_without_media_is_not_claimed() {
        let story = RemoteStory {
            id: StoryId(3),
            date: 0,
            caption: None,
            media: None,
            native: None,
        };
        assert!(story.into_item(Scope::Active).is_none());
    }
}
