use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    acquire::AcquireConfig, errors::Error, fetcher::FetchConfig, locator::LocatorConfig, Result,
};

/// Typed process configuration, read once at startup from the environment.
#[derive(Clone)]
pub struct Config {
    // Telegram API credentials
    pub api_id: i32,
    pub api_hash: String,
    pub session_file: PathBuf,

    // HTTP
    pub bind_addr: String,
    pub port: u16,
    pub public_base_url: Option<String>,

    // Pipeline limits
    pub max_media_bytes: u64,
    pub download_attempt_timeout: Duration,
    pub request_deadline: Duration,
    pub story_page_size: u32,
    pub max_archive_pages: u32,
    pub max_pinned_pages: u32,

    // Temporary file host
    pub file_host_enabled: bool,
    pub file_host_upload_url: String,
    pub file_host_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_id", &self.api_id)
            .field("api_hash", &"<redacted>")
            .field("session_file", &self.session_file)
            .field("bind_addr", &self.bind_addr)
            .field("port", &self.port)
            .field("public_base_url", &self.public_base_url)
            .field("max_media_bytes", &self.max_media_bytes)
            .field("request_deadline", &self.request_deadline)
            .field("file_host_enabled", &self.file_host_enabled)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load from the process environment, after applying `./.env` if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).and_then(non_empty);

        let api_id = get("API_ID")
            .ok_or_else(|| Error::Config("API_ID environment variable is required".to_string()))?;
        let api_id = api_id
            .parse::<i32>()
            .map_err(|_| Error::Config(format!("API_ID must be an integer, got {api_id:?}")))?;

        let api_hash = get("API_HASH").ok_or_else(|| {
            Error::Config("API_HASH environment variable is required".to_string())
        })?;

        let session_file = PathBuf::from(
            get("SESSION_FILE").unwrap_or_else(|| "telegram_stories.session".to_string()),
        );

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&get, "PORT", 8000u16)?;
        let public_base_url = get("PUBLIC_BASE_URL");

        let max_media_bytes = parse_or(&get, "MAX_MEDIA_BYTES", 50 * 1024 * 1024u64)?;
        let download_attempt_timeout =
            Duration::from_millis(parse_or(&get, "DOWNLOAD_ATTEMPT_TIMEOUT_MS", 60_000u64)?);
        let request_deadline =
            Duration::from_millis(parse_or(&get, "REQUEST_DEADLINE_MS", 180_000u64)?);
        let story_page_size = parse_or(&get, "STORY_PAGE_SIZE", 100u32)?.clamp(1, 100);
        let max_archive_pages = parse_or(&get, "MAX_ARCHIVE_PAGES", 50u32)?;
        let max_pinned_pages = parse_or(&get, "MAX_PINNED_PAGES", 10u32)?;

        let file_host_enabled = get("FILE_HOST_ENABLED").map(|s| parse_bool(&s)).unwrap_or(false);
        let file_host_upload_url = get("FILE_HOST_UPLOAD_URL")
            .unwrap_or_else(|| "https://tmpfiles.org/api/v1/upload".to_string());
        let file_host_timeout =
            Duration::from_millis(parse_or(&get, "FILE_HOST_TIMEOUT_MS", 30_000u64)?);

        Ok(Self {
            api_id,
            api_hash,
            session_file,
            bind_addr,
            port,
            public_base_url,
            max_media_bytes,
            download_attempt_timeout,
            request_deadline,
            story_page_size,
            max_archive_pages,
            max_pinned_pages,
            file_host_enabled,
            file_host_upload_url,
            file_host_timeout,
        })
    }

    pub fn locator(&self) -> LocatorConfig {
        LocatorConfig {
            page_size: self.story_page_size,
            max_archive_pages: self.max_archive_pages,
            max_pinned_pages: self.max_pinned_pages,
        }
    }

    pub fn acquire(&self) -> AcquireConfig {
        AcquireConfig {
            max_bytes: self.max_media_bytes,
            attempt_timeout: self.download_attempt_timeout,
        }
    }

    pub fn fetch(&self) -> FetchConfig {
        FetchConfig {
            locator: self.locator(),
            acquire: self.acquire(),
            request_deadline: self.request_deadline,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw:?}"))),
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }
        out.push((key.to_string(), val.to_string()));
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_only_credentials_are_set() {
        let cfg = from(&[("API_ID", "12345"), ("API_HASH", "abc")]).unwrap();
        assert_eq!(cfg.api_id, 12345);
        assert_eq!(cfg.session_file, PathBuf::from("telegram_stories.session"));
        assert_eq!(cfg.listen_addr(), "0.0.0.0:8000");
        assert_eq!(cfg.public_base_url, None);
        assert_eq!(cfg.max_media_bytes, 52_428_800);
        assert_eq!(cfg.download_attempt_timeout, Duration::from_secs(60));
        assert_eq!(cfg.request_deadline, Duration::from_secs(180));
        assert!(!cfg.file_host_enabled);
        assert_eq!(cfg.file_host_upload_url, "https://tmpfiles.org/api/v1/upload");

        let loc = cfg.locator();
        assert_eq!(
            (loc.page_size, loc.max_archive_pages, loc.max_pinned_pages),
            (100, 50, 10)
        );
    }

    #[test]
    fn missing_credentials_are_config_errors() {
        let err = from(&[("API_HASH", "abc")]).unwrap_err();
        assert!(err.to_string().contains("API_ID"));
        let err = from(&[("API_ID", "1"), ("API_HASH", "  ")]).unwrap_err();
        assert!(err.to_string().contains("API_HASH"));
        let err = from(&[("API_ID", "one"), ("API_HASH", "abc")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn overrides_flow_into_projections() {
        let cfg = from(&[
            ("API_ID", "1"),
            ("API_HASH", "abc"),
            ("PORT", "9001"),
            ("MAX_MEDIA_BYTES", "1024"),
            ("DOWNLOAD_ATTEMPT_TIMEOUT_MS", "1500"),
            ("REQUEST_DEADLINE_MS", "5000"),
            ("STORY_PAGE_SIZE", "500"),
            ("MAX_ARCHIVE_PAGES", "3"),
            ("FILE_HOST_ENABLED", "yes"),
            ("PUBLIC_BASE_URL", "https://stories.example"),
        ])
        .unwrap();

        assert_eq!(cfg.port, 9001);
        assert!(cfg.file_host_enabled);
        let fetch = cfg.fetch();
        assert_eq!(fetch.acquire.max_bytes, 1024);
        assert_eq!(fetch.acquire.attempt_timeout, Duration::from_millis(1500));
        assert_eq!(fetch.request_deadline, Duration::from_secs(5));
        assert_eq!(fetch.locator.page_size, 100);
        assert_eq!(fetch.locator.max_archive_pages, 3);
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = from(&[("API_ID", "1"), ("API_HASH", "x"), ("PORT", "http")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn dotenv_lines() {
        let parsed = parse_dotenv(
            "# comment\n\nAPI_ID=42\nexport API_HASH=\"secret\"\nBROKEN\n =x\nSESSION_FILE='a b'\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("API_ID".to_string(), "42".to_string()),
                ("API_HASH".to_string(), "secret".to_string()),
                ("SESSION_FILE".to_string(), "a b".to_string()),
            ]
        );
    }

    #[test]
    fn debug_hides_api_hash() {
        let cfg = from(&[("API_ID", "1"), ("API_HASH", "topsecret")]).unwrap();
        assert!(!format!("{cfg:?}").contains("topsecret"));
    }
}
