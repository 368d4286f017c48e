use std::time::Duration;

use crate::{
    domain::{ListedStory, PeerHandle, StoryItem},
    errors::{AcquisitionError, ConnectionError, RemoteError},
    media::{AcquiredMedia, FileLocation},
    ports::{DownloadTarget, StoryService},
};

/// Ways of addressing the same remote file, tried in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// The media object exactly as the listing returned it.
    NativeDescriptor,
    /// An explicit location token rebuilt from the descriptor fields.
    FileLocation,
    /// Download through the story itself.
    ParentItem,
}

impl Strategy {
    pub const CHAIN: [Strategy; 3] = [
        Strategy::NativeDescriptor,
        Strategy::FileLocation,
        Strategy::ParentItem,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::NativeDescriptor => "native_descriptor",
            Strategy::FileLocation => "file_location",
            Strategy::ParentItem => "parent_item",
        }
    }

    pub fn of(target: &DownloadTarget<'_>) -> Self {
        match target {
            DownloadTarget::Native { .. } => Strategy::NativeDescriptor,
            DownloadTarget::Location(_) => Strategy::FileLocation,
            DownloadTarget::ParentStory { .. } => Strategy::ParentItem,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AcquireConfig {
    pub max_bytes: u64,
    pub attempt_timeout: Duration,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            max_bytes: 50 * 1024 * 1024,
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

enum Attempt {
    Success(Vec<u8>),
    Failed(String),
    TimedOut,
    Stale(RemoteError),
}

#[derive(Default)]
struct Exhausted {
    attempts: Vec<String>,
    timed_out: bool,
    stale: bool,
}

/// Downloads a located story's media through an ordered strategy chain.
///
/// The first strategy that returns non-empty bytes wins; failed attempts never
/// leak partial data. Oversized media and a lost connection end the chain at
/// once. An expired file reference earns one refetch of the story and one
/// more pass over the chain.
pub struct MediaAcquirer<'a, S: StoryService + ?Sized> {
    service: &'a S,
    cfg: AcquireConfig,
    chain: Vec<Strategy>,
}

impl<'a, S: StoryService + ?Sized> MediaAcquirer<'a, S> {
    pub fn new(service: &'a S, cfg: AcquireConfig) -> Self {
        Self {
            service,
            cfg,
            chain: Strategy::CHAIN.to_vec(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_chain(mut self, chain: Vec<Strategy>) -> Self {
        self.chain = chain;
        self
    }

    pub async fn acquire(
        &self,
        peer: &PeerHandle,
        item: &StoryItem,
    ) -> Result<AcquiredMedia, AcquisitionError> {
        let mut exhausted = match self.run_chain(peer, item).await? {
            Ok(media) => return Ok(media),
            Err(exhausted) => exhausted,
        };

        if exhausted.stale {
            tracing::info!(story_id = %item.id, "file reference expired, refetching story");
            match self.refetch(peer, item).await? {
                Some(fresh) => match self.run_chain(peer, &fresh).await? {
                    Ok(media) => return Ok(media),
                    Err(again) => {
                        exhausted.attempts.extend(again.attempts);
                        exhausted.timed_out |= again.timed_out;
                    }
                },
                None => exhausted
                    .attempts
                    .push("refetch: story no longer available".to_string()),
            }
        }

        if exhausted.timed_out {
            Err(AcquisitionError::Timeout {
                waited: self.cfg.attempt_timeout,
            })
        } else {
            Err(AcquisitionError::AllMethodsFailed {
                attempts: exhausted.attempts,
            })
        }
    }

    async fn run_chain(
        &self,
        peer: &PeerHandle,
        item: &StoryItem,
    ) -> Result<Result<AcquiredMedia, Exhausted>, AcquisitionError> {
        let limit = self.cfg.max_bytes;
        if let Some(size) = item.media.declared_size() {
            if size > limit {
                return Err(AcquisitionError::TooLarge { size, limit });
            }
        }

        let location = FileLocation::from(&item.media);
        let mut exhausted = Exhausted::default();

        for &strategy in &self.chain {
            let target = match strategy {
                Strategy::NativeDescriptor => DownloadTarget::Native {
                    media: &item.media,
                    native: item.native.as_ref(),
                },
                Strategy::FileLocation => DownloadTarget::Location(&location),
                Strategy::ParentItem => DownloadTarget::ParentStory {
                    peer,
                    story_id: item.id,
                },
            };

            match self.attempt(target).await? {
                Attempt::Success(bytes) => {
                    tracing::info!(
                        story_id = %item.id,
                        strategy = strategy.as_str(),
                        bytes = bytes.len(),
                        "media downloaded"
                    );
                    return Ok(Ok(AcquiredMedia::classify(&item.media, bytes)));
                }
                Attempt::Failed(reason) => {
                    tracing::warn!(story_id = %item.id, strategy = strategy.as_str(), %reason, "download attempt failed");
                    exhausted
                        .attempts
                        .push(format!("{}: {reason}", strategy.as_str()));
                }
                Attempt::TimedOut => {
                    tracing::warn!(story_id = %item.id, strategy = strategy.as_str(), "download attempt timed out");
                    exhausted.timed_out = true;
                    exhausted.attempts.push(format!(
                        "{}: timed out after {}s",
                        strategy.as_str(),
                        self.cfg.attempt_timeout.as_secs()
                    ));
                }
                Attempt::Stale(e) => {
                    tracing::warn!(story_id = %item.id, strategy = strategy.as_str(), error = %e, "file reference expired");
                    exhausted.stale = true;
                    exhausted.attempts.push(format!("{}: {e}", strategy.as_str()));
                }
            }
        }

        Ok(Err(exhausted))
    }

    async fn attempt(&self, target: DownloadTarget<'_>) -> Result<Attempt, AcquisitionError> {
        let limit = self.cfg.max_bytes;
        let fut = self.service.download(target, limit);

        let outcome = match tokio::time::timeout(self.cfg.attempt_timeout, fut).await {
            Err(_) => Attempt::TimedOut,
            Ok(Err(e)) if e.is_connection_lost() => {
                return Err(AcquisitionError::Connection(ConnectionError::from(e)));
            }
            Ok(Err(e)) if e.is_file_reference_expired() => Attempt::Stale(e),
            Ok(Err(e)) => Attempt::Failed(e.to_string()),
            Ok(Ok(bytes)) if bytes.is_empty() => Attempt::Failed("empty download".to_string()),
            Ok(Ok(bytes)) if bytes.len() as u64 > limit => {
                return Err(AcquisitionError::TooLarge {
                    size: bytes.len() as u64,
                    limit,
                });
            }
            Ok(Ok(bytes)) => Attempt::Success(bytes),
        };
        Ok(outcome)
    }

    async fn refetch(
        &self,
        peer: &PeerHandle,
        item: &StoryItem,
    ) -> Result<Option<StoryItem>, AcquisitionError> {
        let entries = match self.service.stories_by_id(peer, &[item.id]).await {
            Ok(entries) => entries,
            Err(e) if e.is_connection_lost() => {
                return Err(AcquisitionError::Connection(ConnectionError::from(e)));
            }
            Err(e) => {
                tracing::warn!(story_id = %item.id, error = %e, "story refetch failed");
                return Ok(None);
            }
        };

        Ok(entries.into_iter().find_map(|e| match e {
            ListedStory::Item(story) if story.id == item.id => story.into_item(item.found_in),
            _ => None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RemoteStory, Scope};
    use crate::errors::RemoteError;
    use crate::media::MediaType;
    use crate::testing::{photo_story, user_handle, video_story, DownloadStep, FakeStoryService};

    fn item(story: RemoteStory) -> StoryItem {
        story.into_item(Scope::Active).unwrap()
    }

    async fn acquire(
        svc: &FakeStoryService,
        story: RemoteStory,
        cfg: AcquireConfig,
    ) -> Result<AcquiredMedia, AcquisitionError> {
        MediaAcquirer::new(svc, cfg)
            .acquire(&user_handle("alice"), &item(story))
            .await
    }

    #[tokio::test]
    async fn first_strategy_that_works_wins() {
        let svc = FakeStoryService::new()
            .with_download(Strategy::NativeDescriptor, vec![DownloadStep::Bytes(vec![1, 2, 3])]);

        let media = acquire(&svc, photo_story(5), AcquireConfig::default())
            .await
            .unwrap();

        assert_eq!(media.bytes, vec![1, 2, 3]);
        assert_eq!(media.media_type, MediaType::Photo);
        assert_eq!(media.mime_type, "image/jpeg");
        assert_eq!(svc.download_calls(), vec![Strategy::NativeDescriptor]);
    }

    #[tokio::test]
    async fn falls_through_failed_and_empty_attempts() {
        let svc = FakeStoryService::new()
            .with_download(
                Strategy::NativeDescriptor,
                vec![DownloadStep::Fail(RemoteError::rpc(400, "LOCATION_INVALID"))],
            )
            .with_download(Strategy::FileLocation, vec![DownloadStep::Empty])
            .with_download(Strategy::ParentItem, vec![DownloadStep::Bytes(vec![9; 16])]);

        let media = acquire(&svc, video_story(5, 16), AcquireConfig::default())
            .await
            .unwrap();

        assert_eq!(media.bytes, vec![9; 16]);
        assert_eq!(media.media_type, MediaType::Video);
        assert_eq!(media.extension(), "mp4");
        assert_eq!(svc.download_calls(), Strategy::CHAIN.to_vec());
    }

    #[tokio::test]
    async fn exhaustion_lists_every_attempt() {
        let svc = FakeStoryService::new();

        let err = acquire(&svc, photo_story(5), AcquireConfig::default())
            .await
            .unwrap_err();

        let AcquisitionError::AllMethodsFailed { attempts } = err else {
            panic!("expected AllMethodsFailed");
        };
        assert_eq!(attempts.len(), 3);
        assert!(attempts[0].starts_with("native_descriptor:"));
        assert!(attempts[2].starts_with("parent_item:"));
    }

    #[tokio::test]
    async fn declared_size_over_limit_skips_download() {
        let svc = FakeStoryService::new()
            .with_download(Strategy::NativeDescriptor, vec![DownloadStep::Bytes(vec![0; 8])]);
        let cfg = AcquireConfig {
            max_bytes: 1024,
            ..AcquireConfig::default()
        };

        let err = acquire(&svc, video_story(5, 4096), cfg).await.unwrap_err();

        assert!(matches!(err, AcquisitionError::TooLarge { size: 4096, limit: 1024 }));
        assert!(svc.download_calls().is_empty());
    }

    #[tokio::test]
    async fn oversized_download_is_rejected() {
        let svc = FakeStoryService::new()
            .with_download(Strategy::NativeDescriptor, vec![DownloadStep::Bytes(vec![0; 10])]);
        let cfg = AcquireConfig {
            max_bytes: 4,
            ..AcquireConfig::default()
        };

        let err = acquire(&svc, photo_story(5), cfg).await.unwrap_err();

        assert!(matches!(err, AcquisitionError::TooLarge { size: 10, limit: 4 }));
        assert_eq!(svc.download_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempt_reports_timeout() {
        let svc = FakeStoryService::new()
            .with_download(Strategy::NativeDescriptor, vec![DownloadStep::Hang]);
        let cfg = AcquireConfig {
            attempt_timeout: Duration::from_secs(5),
            ..AcquireConfig::default()
        };

        let err = acquire(&svc, photo_story(5), cfg).await.unwrap_err();

        assert!(matches!(err, AcquisitionError::Timeout { waited } if waited == Duration::from_secs(5)));
        assert_eq!(svc.download_calls().len(), 3);
    }

    #[tokio::test]
    async fn stale_reference_refetches_once() {
        let svc = FakeStoryService::new()
            .with_by_id(photo_story(5))
            .with_download(
                Strategy::NativeDescriptor,
                vec![
                    DownloadStep::Fail(RemoteError::rpc(400, "FILE_REFERENCE_EXPIRED")),
                    DownloadStep::Bytes(vec![7]),
                ],
            );

        let media = acquire(&svc, photo_story(5), AcquireConfig::default())
            .await
            .unwrap();

        assert_eq!(media.bytes, vec![7]);
        assert_eq!(svc.by_id_calls(), 1);
        assert_eq!(
            svc.download_calls(),
            vec![
                Strategy::NativeDescriptor,
                Strategy::FileLocation,
                Strategy::ParentItem,
                Strategy::NativeDescriptor,
            ]
        );
    }

    #[tokio::test]
    async fn stale_reference_is_retried_only_once() {
        let svc = FakeStoryService::new()
            .with_by_id(photo_story(5))
            .with_download(
                Strategy::NativeDescriptor,
                vec![DownloadStep::Fail(RemoteError::rpc(400, "FILE_REFERENCE_EXPIRED"))],
            );

        let err = acquire(&svc, photo_story(5), AcquireConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AcquisitionError::AllMethodsFailed { ref attempts } if attempts.len() == 6));
        assert_eq!(svc.by_id_calls(), 1);
    }

    #[tokio::test]
    async fn lost_connection_ends_the_chain() {
        let svc = FakeStoryService::new().with_download(
            Strategy::NativeDescriptor,
            vec![DownloadStep::Fail(RemoteError::ConnectionLost("reset".into()))],
        );

        let err = acquire(&svc, photo_story(5), AcquireConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AcquisitionError::Connection(_)));
        assert_eq!(svc.download_calls(), vec![Strategy::NativeDescriptor]);
    }

    #[tokio::test]
    async fn custom_chain_is_respected() {
        let svc = FakeStoryService::new()
            .with_download(Strategy::ParentItem, vec![DownloadStep::Bytes(vec![1])]);

        let media = MediaAcquirer::new(&svc, AcquireConfig::default())
            .with_chain(vec![Strategy::ParentItem])
            .acquire(&user_handle("alice"), &item(photo_story(5)))
            .await
            .unwrap();

        assert_eq!(media.bytes, vec![1]);
        assert_eq!(svc.download_calls(), vec![Strategy::ParentItem]);
    }
}
