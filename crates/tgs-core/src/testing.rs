//! In-memory fakes of the remote ports.
//!
//! Compiled for this crate's tests and, behind the `testing` feature, for the
//! adapter crates' tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    acquire::Strategy,
    domain::{ListedStory, PeerHandle, PeerKind, PeerRef, RemoteStory, Scope, StoryId},
    errors::{ConnectionError, RemoteError, UploadError},
    media::{DocumentDescriptor, FileHandle, MediaRef, PhotoDescriptor},
    ports::{Connection, Connector, DownloadTarget, FileHost, StoryService},
};

pub fn user_handle(name: &str) -> PeerHandle {
    PeerHandle {
        kind: PeerKind::User,
        id: 1000,
        access_hash: 77,
        label: name.to_string(),
    }
}

pub fn channel_handle(peer: &PeerRef) -> PeerHandle {
    PeerHandle {
        kind: PeerKind::Channel,
        id: peer.channel_id().unwrap_or_default(),
        access_hash: 88,
        label: peer.to_string(),
    }
}

pub fn group_handle(name: &str) -> PeerHandle {
    PeerHandle {
        kind: PeerKind::Group,
        id: 2000,
        access_hash: 99,
        label: name.to_string(),
    }
}

fn file(id: i64) -> FileHandle {
    FileHandle {
        dc_id: 2,
        id,
        access_hash: id * 10,
        file_reference: vec![0xfe, 0xed],
    }
}

pub fn photo_story(id: i64) -> RemoteStory {
    RemoteStory {
        id: StoryId(id),
        date: 1_700_000_000,
        caption: Some(format!("story {id}")),
        media: Some(MediaRef::Photo(PhotoDescriptor {
            file: file(id),
            thumb_size: "y".into(),
            size: None,
        })),
        native: None,
    }
}

pub fn video_story(id: i64, size: u64) -> RemoteStory {
    RemoteStory {
        id: StoryId(id),
        date: 1_700_000_000,
        caption: None,
        media: Some(MediaRef::Document(DocumentDescriptor {
            file: file(id),
            mime_type: "video/mp4".into(),
            size,
            attributes: Vec::new(),
        })),
        native: None,
    }
}

pub fn bare_story(id: i64) -> RemoteStory {
    RemoteStory {
        id: StoryId(id),
        date: 1_700_000_000,
        caption: None,
        media: None,
        native: None,
    }
}

/// One scripted reply to a download call.
#[derive(Clone, Debug)]
pub enum DownloadStep {
    Bytes(Vec<u8>),
    Empty,
    Fail(RemoteError),
    /// Never completes; exercises the per-attempt timeout.
    Hang,
}

/// Scriptable [`StoryService`].
///
/// Listings are served newest first; `offset_id == 0` starts at the top and
/// any other offset returns ids strictly below it.
#[derive(Default)]
pub struct FakeStoryService {
    peers: HashMap<PeerRef, PeerHandle>,
    resolve_error: Option<RemoteError>,
    by_id: Vec<RemoteStory>,
    by_id_misses: AtomicUsize,
    active: Vec<ListedStory>,
    pinned: Vec<ListedStory>,
    archived: Vec<ListedStory>,
    failing: HashMap<Scope, RemoteError>,
    plans: Mutex<HashMap<Strategy, VecDeque<DownloadStep>>>,
    downloads: Mutex<Vec<Strategy>>,
    pages: Mutex<Vec<(Scope, StoryId)>>,
    by_id_calls: AtomicUsize,
}

impl FakeStoryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer(mut self, peer: PeerRef, handle: PeerHandle) -> Self {
        self.peers.insert(peer, handle);
        self
    }

    pub fn with_resolve_error(mut self, err: RemoteError) -> Self {
        self.resolve_error = Some(err);
        self
    }

    /// Stories the server still indexes by id.
    pub fn with_by_id(mut self, story: RemoteStory) -> Self {
        self.by_id.push(story);
        self
    }

    /// The first `n` by-id lookups come back empty.
    pub fn with_by_id_misses(self, n: usize) -> Self {
        self.by_id_misses.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_active(mut self, entry: ListedStory) -> Self {
        self.active.push(entry);
        self
    }

    pub fn with_pinned(mut self, entry: ListedStory) -> Self {
        self.pinned.push(entry);
        self
    }

    pub fn with_pinned_range(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.pinned
            .extend(ids.into_iter().map(|id| ListedStory::Item(photo_story(id))));
        self
    }

    pub fn with_archived(mut self, entry: ListedStory) -> Self {
        self.archived.push(entry);
        self
    }

    pub fn with_archived_range(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.archived
            .extend(ids.into_iter().map(|id| ListedStory::Item(photo_story(id))));
        self
    }

    pub fn with_failing_scope(mut self, scope: Scope, err: RemoteError) -> Self {
        self.failing.insert(scope, err);
        self
    }

    /// Queue replies for one strategy; the last reply repeats.
    pub fn with_download(self, strategy: Strategy, steps: Vec<DownloadStep>) -> Self {
        self.plans
            .lock()
            .unwrap()
            .insert(strategy, steps.into_iter().collect());
        self
    }

    pub fn download_calls(&self) -> Vec<Strategy> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn page_requests(&self) -> Vec<(Scope, StoryId)> {
        self.pages.lock().unwrap().clone()
    }

    pub fn by_id_calls(&self) -> usize {
        self.by_id_calls.load(Ordering::SeqCst)
    }

    fn fail_if(&self, scope: Scope) -> Result<(), RemoteError> {
        match self.failing.get(&scope) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn page(
        &self,
        scope: Scope,
        entries: &[ListedStory],
        offset_id: StoryId,
        limit: u32,
    ) -> Result<Vec<ListedStory>, RemoteError> {
        self.pages.lock().unwrap().push((scope, offset_id));
        self.fail_if(scope)?;
        let mut sorted: Vec<_> = entries.to_vec();
        sorted.sort_by_key(|e| std::cmp::Reverse(e.id()));
        Ok(sorted
            .into_iter()
            .filter(|e| offset_id.0 == 0 || e.id() < offset_id)
            .take(limit as usize)
            .collect())
    }

    fn next_step(&self, strategy: Strategy) -> DownloadStep {
        let mut plans = self.plans.lock().unwrap();
        let Some(queue) = plans.get_mut(&strategy) else {
            return DownloadStep::Fail(RemoteError::other("no download planned"));
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(DownloadStep::Empty)
        } else {
            queue.front().cloned().unwrap_or(DownloadStep::Empty)
        }
    }
}

#[async_trait]
impl StoryService for FakeStoryService {
    async fn resolve_peer(&self, peer: &PeerRef) -> Result<Option<PeerHandle>, RemoteError> {
        if let Some(err) = &self.resolve_error {
            return Err(err.clone());
        }
        Ok(self.peers.get(peer).cloned())
    }

    async fn stories_by_id(
        &self,
        _peer: &PeerHandle,
        ids: &[StoryId],
    ) -> Result<Vec<ListedStory>, RemoteError> {
        self.by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.fail_if(Scope::Direct)?;
        let missed = self
            .by_id_misses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if missed {
            return Ok(Vec::new());
        }
        Ok(self
            .by_id
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .map(ListedStory::Item)
            .collect())
    }

    async fn active_stories(&self, _peer: &PeerHandle) -> Result<Vec<ListedStory>, RemoteError> {
        self.fail_if(Scope::Active)?;
        Ok(self.active.clone())
    }

    async fn pinned_stories(
        &self,
        _peer: &PeerHandle,
        offset_id: StoryId,
        limit: u32,
    ) -> Result<Vec<ListedStory>, RemoteError> {
        self.page(Scope::Pinned, &self.pinned, offset_id, limit)
    }

    async fn archived_stories(
        &self,
        _peer: &PeerHandle,
        offset_id: StoryId,
        limit: u32,
    ) -> Result<Vec<ListedStory>, RemoteError> {
        self.page(Scope::Archived, &self.archived, offset_id, limit)
    }

    async fn download(
        &self,
        target: DownloadTarget<'_>,
        _max_bytes: u64,
    ) -> Result<Vec<u8>, RemoteError> {
        let strategy = Strategy::of(&target);
        self.downloads.lock().unwrap().push(strategy);
        match self.next_step(strategy) {
            DownloadStep::Bytes(b) => Ok(b),
            DownloadStep::Empty => Ok(Vec::new()),
            DownloadStep::Fail(e) => Err(e),
            DownloadStep::Hang => std::future::pending().await,
        }
    }

    async fn account_name(&self) -> Result<String, RemoteError> {
        Ok("fake_account".to_string())
    }
}

/// A connection over a shared [`FakeStoryService`].
pub struct FakeConnection {
    service: Arc<FakeStoryService>,
    alive: AtomicBool,
    stops: AtomicUsize,
}

impl FakeConnection {
    pub fn new(service: Arc<FakeStoryService>) -> Self {
        Self {
            service,
            alive: AtomicBool::new(true),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoryService for FakeConnection {
    async fn resolve_peer(&self, peer: &PeerRef) -> Result<Option<PeerHandle>, RemoteError> {
        self.service.resolve_peer(peer).await
    }

    async fn stories_by_id(
        &self,
        peer: &PeerHandle,
        ids: &[StoryId],
    ) -> Result<Vec<ListedStory>, RemoteError> {
        self.service.stories_by_id(peer, ids).await
    }

    async fn active_stories(&self, peer: &PeerHandle) -> Result<Vec<ListedStory>, RemoteError> {
        self.service.active_stories(peer).await
    }

    async fn pinned_stories(
        &self,
        peer: &PeerHandle,
        offset_id: StoryId,
        limit: u32,
    ) -> Result<Vec<ListedStory>, RemoteError> {
        self.service.pinned_stories(peer, offset_id, limit).await
    }

    async fn archived_stories(
        &self,
        peer: &PeerHandle,
        offset_id: StoryId,
        limit: u32,
    ) -> Result<Vec<ListedStory>, RemoteError> {
        self.service.archived_stories(peer, offset_id, limit).await
    }

    async fn download(
        &self,
        target: DownloadTarget<'_>,
        max_bytes: u64,
    ) -> Result<Vec<u8>, RemoteError> {
        self.service.download(target, max_bytes).await
    }

    async fn account_name(&self) -> Result<String, RemoteError> {
        self.service.account_name().await
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn stop(&self) -> Result<(), RemoteError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Counts constructions; can be slowed down or made to fail.
pub struct FakeConnector {
    service: Arc<FakeStoryService>,
    delay: Option<Duration>,
    failures: Mutex<HashSet<usize>>,
    fail_always: AtomicBool,
    connects: AtomicUsize,
    last: Mutex<Option<Arc<FakeConnection>>>,
}

impl FakeConnector {
    pub fn new(service: FakeStoryService) -> Self {
        Self {
            service: Arc::new(service),
            delay: None,
            failures: Mutex::new(HashSet::new()),
            fail_always: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the n-th construction attempt (1-based).
    pub fn failing_attempt(self, n: usize) -> Self {
        self.failures.lock().unwrap().insert(n);
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_connection(&self) -> Option<Arc<FakeConnection>> {
        self.last.lock().unwrap().clone()
    }

    pub fn service(&self) -> &FakeStoryService {
        &self.service
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn Connection>, ConnectionError> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_always.load(Ordering::SeqCst) || self.failures.lock().unwrap().contains(&attempt)
        {
            return Err(ConnectionError::new(format!("connect attempt {attempt} refused")));
        }
        let conn = Arc::new(FakeConnection::new(self.service.clone()));
        *self.last.lock().unwrap() = Some(conn.clone());
        Ok(conn as Arc<dyn Connection>)
    }
}

/// Records uploads and answers with a fixed URL (or an error).
#[derive(Default)]
pub struct FakeFileHost {
    fail: bool,
    uploads: Mutex<Vec<(String, String, usize)>>,
}

impl FakeFileHost {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<(String, String, usize)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileHost for FakeFileHost {
    async fn upload(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError> {
        self.uploads
            .lock()
            .unwrap()
            .push((filename.to_string(), mime_type.to_string(), bytes.len()));
        if self.fail {
            return Err(UploadError("host unavailable".into()));
        }
        Ok(format!("https://files.example/dl/{filename}"))
    }
}
