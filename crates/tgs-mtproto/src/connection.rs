use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use grammers_client::{
    types::{
        media::{Document, Media, Photo},
        Downloadable,
    },
    Client, InvocationError,
};
use grammers_session::PackedType;
use grammers_tl_types as tl;
use tgs_core::{
    domain::{ListedStory, PeerHandle, PeerKind, PeerRef, StoryId},
    errors::RemoteError,
    media::FileLocation,
    ports::{Connection, DownloadTarget, StoryService},
};

use crate::{
    convert::{input_peer, is_missing_peer, listed_story},
    download::{get_file, DownloadRequest, RawMedia, CHUNK},
};

/// A logged-in grammers client.
///
/// Liveness is tracked locally: any transport-level failure marks the
/// connection dead so the session handle replaces it on the next request.
pub struct MtprotoConnection {
    client: Client,
    session_file: PathBuf,
    alive: AtomicBool,
}

impl MtprotoConnection {
    pub(crate) fn new(client: Client, session_file: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            client,
            session_file,
            alive: AtomicBool::new(true),
        })
    }

    fn remote(&self, e: InvocationError) -> RemoteError {
        match e {
            InvocationError::Rpc(rpc) => RemoteError::rpc(rpc.code, rpc.name),
            other => {
                self.alive.store(false, Ordering::SeqCst);
                RemoteError::ConnectionLost(other.to_string())
            }
        }
    }

    async fn call<R>(&self, request: &R) -> Result<R::Return, RemoteError>
    where
        R: tl::RemoteCall,
    {
        self.client.invoke(request).await.map_err(|e| self.remote(e))
    }

    fn story_id(id: StoryId) -> Result<i32, RemoteError> {
        i32::try_from(id.0).map_err(|_| RemoteError::other(format!("story id {id} out of range")))
    }

    async fn channel_by_id(&self, peer: &PeerRef) -> Result<Option<PeerHandle>, RemoteError> {
        let Some(channel_id) = peer.channel_id() else {
            return Ok(None);
        };
        let request = tl::functions::channels::GetChannels {
            id: vec![tl::enums::InputChannel::Channel(tl::types::InputChannel {
                channel_id,
                access_hash: 0,
            })],
        };
        let chats = match self.call(&request).await {
            Ok(tl::enums::messages::Chats::Chats(c)) => c.chats,
            Ok(tl::enums::messages::Chats::Slice(c)) => c.chats,
            Err(RemoteError::Rpc { name, .. }) if is_missing_peer(&name) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(chats.into_iter().find_map(|chat| match chat {
            tl::enums::Chat::Channel(c) if c.id == channel_id => Some(PeerHandle {
                kind: if c.broadcast {
                    PeerKind::Channel
                } else {
                    PeerKind::Group
                },
                id: c.id,
                access_hash: c.access_hash.unwrap_or(0),
                label: peer.to_string(),
            }),
            _ => None,
        }))
    }

    async fn fetch(&self, request: DownloadRequest, max_bytes: u64) -> Result<Vec<u8>, RemoteError> {
        match request {
            DownloadRequest::Media(raw) => self.fetch_media(raw, max_bytes).await,
            DownloadRequest::Location { dc_id, location } => {
                self.fetch_location(dc_id, &location, max_bytes).await
            }
        }
    }

    /// Drain the client's own download iterator for the listing's media.
    async fn fetch_media(&self, raw: RawMedia, max_bytes: u64) -> Result<Vec<u8>, RemoteError> {
        let media = match raw {
            RawMedia::Photo(m) => Media::Photo(Photo::from_raw_media(m)),
            RawMedia::Document(m) => Media::Document(Document::from_raw_media(m)),
        };
        let mut chunks = self.client.iter_download(&Downloadable::Media(media));
        let mut out = Vec::new();
        while let Some(chunk) = chunks.next().await.map_err(|e| self.remote(e))? {
            out.extend_from_slice(&chunk);
            if out.len() as u64 > max_bytes {
                break;
            }
        }
        Ok(out)
    }

    async fn fetch_location(
        &self,
        dc_id: i32,
        location: &tl::enums::InputFileLocation,
        max_bytes: u64,
    ) -> Result<Vec<u8>, RemoteError> {
        let mut out = Vec::new();
        let mut offset: i64 = 0;

        loop {
            let request = get_file(location, offset);
            let chunk = match self.client.invoke_in_dc(&request, dc_id).await {
                Ok(tl::enums::upload::File::File(f)) => f.bytes,
                Ok(tl::enums::upload::File::CdnRedirect(_)) => {
                    return Err(RemoteError::other("cdn redirect is not supported"));
                }
                Err(e) => return Err(self.remote(e)),
            };

            let len = chunk.len();
            out.extend_from_slice(&chunk);
            if len < CHUNK as usize || out.len() as u64 > max_bytes {
                break;
            }
            offset += i64::from(CHUNK);
        }
        Ok(out)
    }

    async fn story_page<R>(&self, request: &R) -> Result<Vec<ListedStory>, RemoteError>
    where
        R: tl::RemoteCall<Return = tl::enums::stories::Stories>,
    {
        let tl::enums::stories::Stories::Stories(page) = self.call(request).await?;
        Ok(page.stories.into_iter().map(listed_story).collect())
    }
}

#[async_trait]
impl StoryService for MtprotoConnection {
    async fn resolve_peer(&self, peer: &PeerRef) -> Result<Option<PeerHandle>, RemoteError> {
        let name = match peer {
            PeerRef::Username(name) => name,
            PeerRef::Channel(_) => return self.channel_by_id(peer).await,
        };

        let chat = match self.client.resolve_username(name).await {
            Ok(Some(chat)) => chat,
            Ok(None) => return Ok(None),
            Err(InvocationError::Rpc(rpc)) if is_missing_peer(&rpc.name) => return Ok(None),
            Err(e) => return Err(self.remote(e)),
        };

        let packed = chat.pack();
        let kind = match packed.ty {
            PackedType::User | PackedType::Bot => PeerKind::User,
            PackedType::Broadcast => PeerKind::Channel,
            _ => PeerKind::Group,
        };
        Ok(Some(PeerHandle {
            kind,
            id: packed.id,
            access_hash: packed.access_hash.unwrap_or(0),
            label: name.clone(),
        }))
    }

    async fn stories_by_id(
        &self,
        peer: &PeerHandle,
        ids: &[StoryId],
    ) -> Result<Vec<ListedStory>, RemoteError> {
        let id = ids
            .iter()
            .map(|i| Self::story_id(*i))
            .collect::<Result<Vec<_>, _>>()?;
        let request = tl::functions::stories::GetStoriesById {
            peer: input_peer(peer),
            id,
        };
        self.story_page(&request).await
    }

    async fn active_stories(&self, peer: &PeerHandle) -> Result<Vec<ListedStory>, RemoteError> {
        let request = tl::functions::stories::GetPeerStories {
            peer: input_peer(peer),
        };
        let tl::enums::stories::PeerStories::Stories(reply) = self.call(&request).await?;
        let tl::enums::PeerStories::Stories(stories) = reply.stories;
        Ok(stories.stories.into_iter().map(listed_story).collect())
    }

    async fn pinned_stories(
        &self,
        peer: &PeerHandle,
        offset_id: StoryId,
        limit: u32,
    ) -> Result<Vec<ListedStory>, RemoteError> {
        let request = tl::functions::stories::GetPinnedStories {
            peer: input_peer(peer),
            offset_id: Self::story_id(offset_id)?,
            limit: i32::try_from(limit).unwrap_or(i32::MAX),
        };
        self.story_page(&request).await
    }

    async fn archived_stories(
        &self,
        peer: &PeerHandle,
        offset_id: StoryId,
        limit: u32,
    ) -> Result<Vec<ListedStory>, RemoteError> {
        let request = tl::functions::stories::GetStoriesArchive {
            peer: input_peer(peer),
            offset_id: Self::story_id(offset_id)?,
            limit: i32::try_from(limit).unwrap_or(i32::MAX),
        };
        self.story_page(&request).await
    }

    async fn download(
        &self,
        target: DownloadTarget<'_>,
        max_bytes: u64,
    ) -> Result<Vec<u8>, RemoteError> {
        match target {
            DownloadTarget::Native { native, .. } => {
                let request = native
                    .and_then(DownloadRequest::native)
                    .ok_or_else(|| RemoteError::other("no native media object"))?;
                self.fetch(request, max_bytes).await
            }
            DownloadTarget::Location(loc) => {
                self.fetch(DownloadRequest::location(loc), max_bytes).await
            }
            DownloadTarget::ParentStory { peer, story_id } => {
                let fresh = self.stories_by_id(peer, &[story_id]).await?;
                let story = fresh
                    .into_iter()
                    .find_map(|entry| match entry {
                        ListedStory::Item(story) if story.id == story_id => Some(story),
                        _ => None,
                    })
                    .ok_or_else(|| RemoteError::other("parent story is gone"))?;
                let native = story.native.as_ref().and_then(DownloadRequest::native);
                let request = match (native, &story.media) {
                    (Some(request), _) => request,
                    (None, Some(media)) => DownloadRequest::location(&FileLocation::from(media)),
                    (None, None) => return Err(RemoteError::other("parent story has no media")),
                };
                self.fetch(request, max_bytes).await
            }
        }
    }

    async fn account_name(&self) -> Result<String, RemoteError> {
        let me = self.client.get_me().await.map_err(|e| self.remote(e))?;
        Ok(match me.username() {
            Some(name) => format!("@{name}"),
            None => me.full_name(),
        })
    }
}

#[async_trait]
impl Connection for MtprotoConnection {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn stop(&self) -> Result<(), RemoteError> {
        self.alive.store(false, Ordering::SeqCst);
        self.client
            .session()
            .save_to_file(&self.session_file)
            .map_err(|e| RemoteError::other(format!("failed to save session: {e}")))
    }
}
