use crate::{
    domain::{PeerHandle, PeerKind, PeerRef},
    errors::{ConnectionError, ResolutionError},
    ports::StoryService,
};

/// Turns a [`PeerRef`] into an addressable [`PeerHandle`].
///
/// Only users and channels publish stories; groups are rejected. Nothing is
/// retried or cached here.
pub struct PeerResolver<'a, S: StoryService + ?Sized> {
    service: &'a S,
}

impl<'a, S: StoryService + ?Sized> PeerResolver<'a, S> {
    pub fn new(service: &'a S) -> Self {
        Self { service }
    }

    pub async fn resolve(&self, peer: &PeerRef) -> Result<PeerHandle, ResolutionError> {
        let label = peer.to_string();
        let handle = match self.service.resolve_peer(peer).await {
            Ok(Some(handle)) => handle,
            Ok(None) => return Err(ResolutionError::NotFound { peer: label }),
            Err(e) if e.is_connection_lost() => {
                return Err(ResolutionError::Connection(ConnectionError::from(e)))
            }
            Err(source) => {
                tracing::debug!(peer = %label, error = %source, "peer lookup failed");
                return Err(ResolutionError::Lookup { peer: label, source });
            }
        };

        match handle.kind {
            PeerKind::User | PeerKind::Channel => Ok(handle),
            PeerKind::Group => Err(ResolutionError::UnsupportedPeerKind { peer: label }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RemoteError;
    use crate::testing::{channel_handle, group_handle, user_handle, FakeStoryService};

    fn alice() -> PeerRef {
        PeerRef::Username("alice".into())
    }

    #[tokio::test]
    async fn users_and_channels_resolve() {
        let chan = PeerRef::channel(42).unwrap();
        let svc = FakeStoryService::new()
            .with_peer(alice(), user_handle("alice"))
            .with_peer(chan.clone(), channel_handle(&chan));
        let resolver = PeerResolver::new(&svc);

        assert_eq!(resolver.resolve(&alice()).await.unwrap().kind, PeerKind::User);
        let handle = resolver.resolve(&chan).await.unwrap();
        assert_eq!(handle.kind, PeerKind::Channel);
        assert_eq!(handle.id, 42);
    }

    #[tokio::test]
    async fn groups_are_rejected() {
        let svc = FakeStoryService::new().with_peer(alice(), group_handle("alice"));
        let err = PeerResolver::new(&svc).resolve(&alice()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::UnsupportedPeerKind { .. }));
    }

    #[tokio::test]
    async fn unknown_peer_is_not_found() {
        let svc = FakeStoryService::new();
        let err = PeerResolver::new(&svc).resolve(&alice()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound { ref peer } if peer == "alice"));
    }

    #[tokio::test]
    async fn lookup_errors_keep_their_cause() {
        let svc = FakeStoryService::new().with_resolve_error(RemoteError::rpc(400, "USERNAME_INVALID"));
        let err = PeerResolver::new(&svc).resolve(&alice()).await.unwrap_err();
        assert!(err.to_string().contains("USERNAME_INVALID"));

        let svc = FakeStoryService::new().with_resolve_error(RemoteError::ConnectionLost("eof".into()));
        let err = PeerResolver::new(&svc).resolve(&alice()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Connection(_)));
    }
}
