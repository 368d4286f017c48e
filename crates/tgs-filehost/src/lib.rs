//! Temporary file host adapter (tmpfiles.org compatible).
//!
//! Posts the media as multipart `file` and turns the page link from the reply
//! into a direct download link.

use std::time::Duration;

use async_trait::async_trait;
use tgs_core::{
    errors::{Error, UploadError},
    ports::FileHost,
    Result,
};

#[derive(Clone, Debug)]
pub struct TmpFilesHost {
    upload_url: String,
    http: reqwest::Client,
}

impl TmpFilesHost {
    pub fn new(upload_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("file host client build error: {e}")))?;
        Ok(Self {
            upload_url: upload_url.into(),
            http,
        })
    }
}

#[async_trait]
impl FileHost for TmpFilesHost {
    async fn upload(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> std::result::Result<String, UploadError> {
        let size = bytes.len();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| UploadError(format!("multipart error: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UploadError("file host timed out".to_string())
                } else {
                    UploadError(format!("file host request error: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError(format!(
                "file host returned {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| UploadError(format!("file host json error: {e}")))?;

        let url = link_from_reply(&v)?;
        tracing::info!(%filename, size, "uploaded story to file host");
        Ok(url)
    }
}

/// Pull `data.url` out of the reply and rewrite it to the direct `/dl/` form.
fn link_from_reply(v: &serde_json::Value) -> std::result::Result<String, UploadError> {
    if let Some(status) = v.get("status").and_then(|s| s.as_str()) {
        if status != "success" {
            return Err(UploadError(format!("file host rejected upload: {status}")));
        }
    }

    let url = v
        .get("data")
        .and_then(|d| d.get("url"))
        .and_then(|u| u.as_str())
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| UploadError("file host reply has no data.url".to_string()))?;

    Ok(direct_link(url))
}

fn direct_link(url: &str) -> String {
    let url = match url.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    };
    let Some((origin, path)) = url
        .strip_prefix("https://")
        .and_then(|rest| rest.split_once('/'))
    else {
        return url;
    };
    if path.starts_with("dl/") {
        return url;
    }
    format!("https://{origin}/dl/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_links_become_direct_links() {
        assert_eq!(
            direct_link("http://tmpfiles.org/123456/story_alice_42.jpg"),
            "https://tmpfiles.org/dl/123456/story_alice_42.jpg"
        );
        assert_eq!(
            direct_link("https://tmpfiles.org/dl/1/a.mp4"),
            "https://tmpfiles.org/dl/1/a.mp4"
        );
        assert_eq!(direct_link("https://tmpfiles.org"), "https://tmpfiles.org");
    }

    #[test]
    fn reply_parsing() {
        let ok = json!({"status": "success", "data": {"url": "http://tmpfiles.org/9/x.jpg"}});
        assert_eq!(
            link_from_reply(&ok).unwrap(),
            "https://tmpfiles.org/dl/9/x.jpg"
        );

        let rejected = json!({"status": "error", "data": {}});
        assert!(link_from_reply(&rejected)
            .unwrap_err()
            .0
            .contains("rejected"));

        let empty = json!({"data": {"url": ""}});
        assert!(link_from_reply(&empty).is_err());
    }

    #[tokio::test]
    async fn unreachable_host_is_an_upload_error() {
        let host = TmpFilesHost::new("http://127.0.0.1:9/upload", Duration::from_millis(500)).unwrap();
        let err = host
            .upload("story.jpg", "image/jpeg", vec![1, 2, 3])
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("upload failed:"));
    }
}
