use crate::{
    domain::{ListedStory, PeerHandle, RemoteStory, Scope, StoryId, StoryItem},
    errors::{ConnectionError, LocateError, RemoteError},
    ports::StoryService,
};

#[derive(Clone, Copy, Debug)]
pub struct LocatorConfig {
    pub page_size: u32,
    pub max_archive_pages: u32,
    pub max_pinned_pages: u32,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_archive_pages: 50,
            max_pinned_pages: 10,
        }
    }
}

/// Finds a story by id across the peer's scopes.
///
/// Scopes are tried in [`Scope::SEARCH_ORDER`] and the first hit wins. A scope
/// that fails is logged and skipped, except when the connection itself is
/// gone. Paged scopes walk newest-first with the last seen id as cursor and
/// stop on an empty or short page, a cursor that fails to decrease, or the
/// page cap.
pub struct StoryLocator<'a, S: StoryService + ?Sized> {
    service: &'a S,
    cfg: LocatorConfig,
}

impl<'a, S: StoryService + ?Sized> StoryLocator<'a, S> {
    pub fn new(service: &'a S, cfg: LocatorConfig) -> Self {
        Self { service, cfg }
    }

    pub async fn locate(
        &self,
        peer: &PeerHandle,
        story_id: StoryId,
    ) -> Result<StoryItem, LocateError> {
        for scope in Scope::SEARCH_ORDER {
            match self.search(scope, peer, story_id).await {
                Ok(Some(story)) => {
                    tracing::info!(peer = %peer.label, %story_id, %scope, "story located");
                    return story
                        .into_item(scope)
                        .ok_or(LocateError::NoMedia { story_id });
                }
                Ok(None) => {
                    tracing::debug!(peer = %peer.label, %story_id, %scope, "story not in scope");
                }
                Err(e) if e.is_connection_lost() => {
                    return Err(LocateError::Connection(ConnectionError::from(e)));
                }
                Err(e) => {
                    tracing::warn!(peer = %peer.label, %story_id, %scope, error = %e, "scope lookup failed");
                }
            }
        }
        Err(LocateError::NotFound { story_id })
    }

    async fn search(
        &self,
        scope: Scope,
        peer: &PeerHandle,
        story_id: StoryId,
    ) -> Result<Option<RemoteStory>, RemoteError> {
        match scope {
            Scope::Direct => {
                let entries = self.service.stories_by_id(peer, &[story_id]).await?;
                self.pick(entries, peer, story_id).await
            }
            Scope::Active => {
                let entries = self.service.active_stories(peer).await?;
                self.pick(entries, peer, story_id).await
            }
            Scope::Pinned => {
                self.paged(scope, peer, story_id, self.cfg.max_pinned_pages)
                    .await
            }
            Scope::Archived => {
                self.paged(scope, peer, story_id, self.cfg.max_archive_pages)
                    .await
            }
        }
    }

    async fn paged(
        &self,
        scope: Scope,
        peer: &PeerHandle,
        story_id: StoryId,
        max_pages: u32,
    ) -> Result<Option<RemoteStory>, RemoteError> {
        let limit = self.cfg.page_size.max(1);
        let mut cursor = StoryId(0);

        for page_no in 1..=max_pages {
            let page = if scope == Scope::Pinned {
                self.service.pinned_stories(peer, cursor, limit).await?
            } else {
                self.service.archived_stories(peer, cursor, limit).await?
            };

            let len = page.len();
            let Some(last) = page.last().map(ListedStory::id) else {
                return Ok(None);
            };
            if page.iter().any(|e| e.id() == story_id) {
                return self.pick(page, peer, story_id).await;
            }
            if len < limit as usize {
                return Ok(None);
            }
            if cursor.0 != 0 && last >= cursor {
                tracing::warn!(%scope, %cursor, %last, "cursor did not decrease, stopping");
                return Ok(None);
            }
            // Archive pages are id-descending; nothing older can match.
            if scope == Scope::Archived && last < story_id {
                return Ok(None);
            }
            if page_no == max_pages {
                tracing::debug!(%scope, pages = max_pages, "page cap reached");
            }
            cursor = last;
        }
        Ok(None)
    }

    /// Take the entry for `story_id`, refetching skipped placeholders by id.
    async fn pick(
        &self,
        entries: Vec<ListedStory>,
        peer: &PeerHandle,
        story_id: StoryId,
    ) -> Result<Option<RemoteStory>, RemoteError> {
        let Some(entry) = entries.into_iter().find(|e| e.id() == story_id) else {
            return Ok(None);
        };
        match entry {
            ListedStory::Item(story) => Ok(Some(story)),
            ListedStory::Deleted(_) => Ok(None),
            ListedStory::Skipped(_) => {
                let refetched = self.service.stories_by_id(peer, &[story_id]).await?;
                Ok(refetched.into_iter().find_map(|e| match e {
                    ListedStory::Item(s) if s.id == story_id => Some(s),
                    _ => None,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bare_story, photo_story, user_handle, FakeStoryService};

    fn small_pages() -> LocatorConfig {
        LocatorConfig {
            page_size: 100,
            max_archive_pages: 3,
            max_pinned_pages: 2,
        }
    }

    async fn locate(svc: &FakeStoryService, id: i64) -> Result<StoryItem, LocateError> {
        StoryLocator::new(svc, small_pages())
            .locate(&user_handle("alice"), StoryId(id))
            .await
    }

    #[tokio::test]
    async fn earlier_scope_wins() {
        let svc = FakeStoryService::new()
            .with_active(ListedStory::Item(photo_story(7)))
            .with_archived(ListedStory::Item(photo_story(7)));
        assert_eq!(locate(&svc, 7).await.unwrap().found_in, Scope::Active);

        let svc = FakeStoryService::new()
            .with_by_id(photo_story(7))
            .with_active(ListedStory::Item(photo_story(7)));
        assert_eq!(locate(&svc, 7).await.unwrap().found_in, Scope::Direct);
    }

    #[tokio::test]
    async fn archive_walk_stops_at_page_cap() {
        let svc = FakeStoryService::new().with_archived_range(1..=1000);

        let err = locate(&svc, 5).await.unwrap_err();

        assert!(matches!(err, LocateError::NotFound { story_id } if story_id == StoryId(5)));
        let archived: Vec<_> = svc
            .page_requests()
            .into_iter()
            .filter(|(s, _)| *s == Scope::Archived)
            .map(|(_, cursor)| cursor.0)
            .collect();
        assert_eq!(archived, vec![0, 901, 801]);
    }

    #[tokio::test]
    async fn archive_match_on_later_page() {
        let svc = FakeStoryService::new().with_archived_range(1..=250);

        let item = locate(&svc, 120).await.unwrap();

        assert_eq!(item.found_in, Scope::Archived);
        assert_eq!(item.id, StoryId(120));
        let archive_pages = svc
            .page_requests()
            .iter()
            .filter(|(s, _)| *s == Scope::Archived)
            .count();
        assert_eq!(archive_pages, 2);
    }

    fn cursors(svc: &FakeStoryService, scope: Scope) -> Vec<i64> {
        svc.page_requests()
            .into_iter()
            .filter(|(s, _)| *s == scope)
            .map(|(_, cursor)| cursor.0)
            .collect()
    }

    #[tokio::test]
    async fn pinned_match_on_second_page() {
        let svc = FakeStoryService::new().with_pinned_range(1..=150);

        let item = locate(&svc, 20).await.unwrap();

        assert_eq!(item.found_in, Scope::Pinned);
        assert_eq!(item.id, StoryId(20));
        assert_eq!(cursors(&svc, Scope::Pinned), vec![0, 51]);
        assert!(cursors(&svc, Scope::Archived).is_empty());
    }

    #[tokio::test]
    async fn pinned_walk_stops_at_its_own_cap() {
        let svc = FakeStoryService::new().with_pinned_range(1..=1000);

        let err = locate(&svc, 5).await.unwrap_err();

        assert!(matches!(err, LocateError::NotFound { .. }));
        assert_eq!(cursors(&svc, Scope::Pinned), vec![0, 901]);
        assert_eq!(cursors(&svc, Scope::Archived), vec![0]);
    }

    #[tokio::test]
    async fn full_archive_pages_end_on_the_empty_page() {
        let svc = FakeStoryService::new().with_archived_range(101..=300);

        let err = StoryLocator::new(&svc, LocatorConfig::default())
            .locate(&user_handle("alice"), StoryId(50))
            .await
            .unwrap_err();

        assert!(matches!(err, LocateError::NotFound { .. }));
        // 200 items at 100 per page: at most ceil(200 / 100) + 1 fetches.
        assert_eq!(cursors(&svc, Scope::Archived), vec![0, 201, 101]);
    }

    #[tokio::test]
    async fn short_page_ends_the_walk() {
        let svc = FakeStoryService::new()
            .with_pinned(ListedStory::Item(photo_story(3)))
            .with_archived_range(10..=40);

        assert!(locate(&svc, 999).await.is_err());
        assert_eq!(
            svc.page_requests(),
            vec![(Scope::Pinned, StoryId(0)), (Scope::Archived, StoryId(0))]
        );
    }

    #[tokio::test]
    async fn failing_scope_is_skipped() {
        let svc = FakeStoryService::new()
            .with_failing_scope(Scope::Direct, RemoteError::rpc(400, "PEER_ID_INVALID"))
            .with_failing_scope(Scope::Active, RemoteError::other("flaky"))
            .with_pinned(ListedStory::Item(photo_story(9)));

        assert_eq!(locate(&svc, 9).await.unwrap().found_in, Scope::Pinned);
    }

    #[tokio::test]
    async fn lost_connection_aborts_the_search() {
        let svc = FakeStoryService::new()
            .with_failing_scope(Scope::Active, RemoteError::ConnectionLost("reset".into()))
            .with_pinned(ListedStory::Item(photo_story(9)));

        let err = locate(&svc, 9).await.unwrap_err();

        assert!(matches!(err, LocateError::Connection(_)));
        assert!(svc.page_requests().is_empty());
    }

    #[tokio::test]
    async fn skipped_placeholder_is_refetched() {
        let svc = FakeStoryService::new()
            .with_by_id(photo_story(5))
            .with_by_id_misses(1)
            .with_active(ListedStory::Skipped(StoryId(5)));

        let item = locate(&svc, 5).await.unwrap();

        assert_eq!(item.found_in, Scope::Active);
        assert_eq!(svc.by_id_calls(), 2);
    }

    #[tokio::test]
    async fn story_without_media_is_reported() {
        let svc = FakeStoryService::new().with_by_id(bare_story(5));
        let err = locate(&svc, 5).await.unwrap_err();
        assert!(matches!(err, LocateError::NoMedia { .. }));
    }

    #[tokio::test]
    async fn deleted_entries_do_not_match() {
        let svc = FakeStoryService::new().with_active(ListedStory::Deleted(StoryId(5)));
        assert!(matches!(
            locate(&svc, 5).await.unwrap_err(),
            LocateError::NotFound { .. }
        ));
    }
}
