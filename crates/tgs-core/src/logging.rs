use crate::{errors::Error, Result};

/// Install the global tracing subscriber.
///
/// Defaults to `info` for our crates and `warn` for dependencies; `RUST_LOG`
/// overrides it.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::External(format!("failed to install logger: {e}")))
}

fn default_directives(service_name: &str) -> String {
    let service = service_name.replace('-', "_");
    format!("warn,tgs=info,tgs_core=info,tgs_http=info,tgs_mtproto=info,tgs_filehost=info,{service}=info")
}
