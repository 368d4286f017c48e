//! MTProto adapter: implements the core ports on top of a grammers client.

mod connection;
mod convert;
mod download;
pub mod login;

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use grammers_client::{Client, Config, InitParams};
use grammers_session::Session;
use tgs_core::{
    errors::ConnectionError,
    ports::{Connection, Connector},
};

pub use connection::MtprotoConnection;

/// Credentials and session storage for one Telegram account.
#[derive(Clone)]
pub struct MtprotoConnector {
    api_id: i32,
    api_hash: String,
    session_file: PathBuf,
}

impl MtprotoConnector {
    pub fn new(api_id: i32, api_hash: impl Into<String>, session_file: impl Into<PathBuf>) -> Self {
        Self {
            api_id,
            api_hash: api_hash.into(),
            session_file: session_file.into(),
        }
    }

    pub fn session_file(&self) -> &PathBuf {
        &self.session_file
    }

    /// Open a client without checking authorization.
    pub(crate) async fn open(&self) -> Result<Client, ConnectionError> {
        let session = Session::load_file_or_create(&self.session_file).map_err(|e| {
            ConnectionError::new(format!(
                "cannot open session file {}: {e}",
                self.session_file.display()
            ))
        })?;

        Client::connect(Config {
            session,
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| ConnectionError::new(e.to_string()))
    }
}

impl std::fmt::Debug for MtprotoConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MtprotoConnector")
            .field("api_id", &self.api_id)
            .field("session_file", &self.session_file)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for MtprotoConnector {
    async fn connect(&self) -> Result<Arc<dyn Connection>, ConnectionError> {
        tracing::info!(session = %self.session_file.display(), "connecting to telegram");
        let client = self.open().await?;

        let authorized = client
            .is_authorized()
            .await
            .map_err(|e| ConnectionError::new(e.to_string()))?;
        if !authorized {
            return Err(ConnectionError::new(
                "session is not authorized; run `tgs login` first",
            ));
        }

        let conn = MtprotoConnection::new(client, self.session_file.clone());
        Ok(conn as Arc<dyn Connection>)
    }
}
