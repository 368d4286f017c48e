use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    domain::{ListedStory, PeerHandle, PeerRef, StoryId},
    errors::{ConnectionError, RemoteError, UploadError},
    media::{FileLocation, MediaRef, NativeMedia},
};

/// What to download, one variant per acquisition strategy.
#[derive(Clone, Copy, Debug)]
pub enum DownloadTarget<'a> {
    /// Hand the adapter's own media object back to it; fails without one.
    Native {
        media: &'a MediaRef,
        native: Option<&'a NativeMedia>,
    },
    /// Address the file explicitly by location token.
    Location(&'a FileLocation),
    /// Download through the story that carries the media.
    ParentStory { peer: &'a PeerHandle, story_id: StoryId },
}

/// Remote story operations, one method per MTProto call family.
///
/// Implementations must not retry internally; the core decides what happens
/// after a failure.
#[async_trait]
pub trait StoryService: Send + Sync {
    /// Look up a username or channel. `Ok(None)` means the peer does not exist.
    async fn resolve_peer(&self, peer: &PeerRef) -> Result<Option<PeerHandle>, RemoteError>;

    async fn stories_by_id(
        &self,
        peer: &PeerHandle,
        ids: &[StoryId],
    ) -> Result<Vec<ListedStory>, RemoteError>;

    async fn active_stories(&self, peer: &PeerHandle) -> Result<Vec<ListedStory>, RemoteError>;

    /// Pinned (profile) stories, newest first. `offset_id == 0` starts at the top.
    async fn pinned_stories(
        &self,
        peer: &PeerHandle,
        offset_id: StoryId,
        limit: u32,
    ) -> Result<Vec<ListedStory>, RemoteError>;

    /// Archived stories, newest first. Only visible for peers the account administers.
    async fn archived_stories(
        &self,
        peer: &PeerHandle,
        offset_id: StoryId,
        limit: u32,
    ) -> Result<Vec<ListedStory>, RemoteError>;

    /// Download a file. May stop early and return more than `max_bytes`
    /// bytes once the limit is crossed; the caller enforces the bound.
    async fn download(&self, target: DownloadTarget<'_>, max_bytes: u64)
        -> Result<Vec<u8>, RemoteError>;

    /// Display name of the logged-in account (health reporting).
    async fn account_name(&self) -> Result<String, RemoteError>;
}

/// A live client session.
#[async_trait]
pub trait Connection: StoryService {
    /// Cheap local liveness check. Must not perform network I/O.
    fn is_alive(&self) -> bool;

    /// Release the connection. Connections without a stop hook are just dropped.
    async fn stop(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Builds connections for the session handle.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Connection>, ConnectionError>;
}

/// Optional public file host used by the link output mode.
#[async_trait]
pub trait FileHost: Send + Sync {
    /// Upload bytes and return a public URL.
    async fn upload(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError>;
}
