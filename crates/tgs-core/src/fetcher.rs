use std::{future::Future, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    acquire::{AcquireConfig, MediaAcquirer},
    domain::{PeerRef, StoryId, StoryItem},
    errors::FetchError,
    locator::{LocatorConfig, StoryLocator},
    parser::parse_url,
    resolver::PeerResolver,
    response::FetchedStory,
    session::SessionHandle,
};

/// What the caller asked for: a story link or an explicit (peer, id) pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoryTarget {
    Url(String),
    Explicit { peer: String, story_id: i64 },
}

impl StoryTarget {
    /// Returns the peer (as it should be echoed back) and the story id.
    pub fn parse(&self) -> Result<(PeerRef, StoryId), FetchError> {
        match self {
            StoryTarget::Url(url) => parse_url(url).ok_or_else(|| {
                FetchError::InvalidInput(
                    "invalid story url, expected https://t.me/<username>/s/<id>".to_string(),
                )
            }),
            StoryTarget::Explicit { peer, story_id } => {
                if *story_id <= 0 {
                    return Err(FetchError::InvalidInput(format!(
                        "story id must be positive, got {story_id}"
                    )));
                }
                let peer = PeerRef::from_identifier(peer).ok_or_else(|| {
                    FetchError::InvalidInput(format!("invalid username or channel id: {peer}"))
                })?;
                Ok((peer, StoryId(*story_id)))
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FetchConfig {
    pub locator: LocatorConfig,
    pub acquire: AcquireConfig,
    /// Upper bound for one whole request.
    pub request_deadline: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            locator: LocatorConfig::default(),
            acquire: AcquireConfig::default(),
            request_deadline: Duration::from_secs(180),
        }
    }
}

/// The request pipeline: connect, resolve, locate, acquire.
///
/// Cancelling a request drops its in-flight calls but leaves the shared
/// connection alone.
pub struct StoryFetcher {
    session: Arc<SessionHandle>,
    cfg: FetchConfig,
}

impl StoryFetcher {
    pub fn new(session: Arc<SessionHandle>, cfg: FetchConfig) -> Self {
        Self { session, cfg }
    }

    pub fn session(&self) -> &Arc<SessionHandle> {
        &self.session
    }

    pub fn request_deadline(&self) -> Duration {
        self.cfg.request_deadline
    }

    pub async fn fetch(
        &self,
        target: &StoryTarget,
        cancel: &CancellationToken,
    ) -> Result<FetchedStory, FetchError> {
        let (peer, story_id) = target.parse()?;
        self.guarded(cancel, async {
            let conn = self.session.ensure_connected().await?;
            let handle = PeerResolver::new(&*conn).resolve(&peer).await?;
            let item = StoryLocator::new(&*conn, self.cfg.locator)
                .locate(&handle, story_id)
                .await?;
            let media = MediaAcquirer::new(&*conn, self.cfg.acquire)
                .acquire(&handle, &item)
                .await?;
            Ok::<_, FetchError>(FetchedStory {
                peer: peer.to_string(),
                item,
                media,
            })
        })
        .await
    }

    /// Locate without downloading.
    pub async fn check(
        &self,
        target: &StoryTarget,
        cancel: &CancellationToken,
    ) -> Result<(String, StoryItem), FetchError> {
        let (peer, story_id) = target.parse()?;
        self.guarded(cancel, async {
            let conn = self.session.ensure_connected().await?;
            let handle = PeerResolver::new(&*conn).resolve(&peer).await?;
            let item = StoryLocator::new(&*conn, self.cfg.locator)
                .locate(&handle, story_id)
                .await?;
            Ok::<_, FetchError>((peer.to_string(), item))
        })
        .await
    }

    async fn guarded<T>(
        &self,
        cancel: &CancellationToken,
        work: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        let deadline = self.cfg.request_deadline;
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            res = tokio::time::timeout(deadline, work) => {
                res.unwrap_or(Err(FetchError::DeadlineExceeded(deadline)))
            }
        };

        match &result {
            Ok(_) => tracing::debug!("story request completed"),
            Err(e) => tracing::info!(kind = e.kind().as_str(), error = %e, "story request failed"),
        }
        result
    }
}
