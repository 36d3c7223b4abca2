use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde::Deserialize;
use tracing::debug;
use url::Url;
use crate::config::SyncConfig;
use crate::core::{
    ItemId,
    ItemRecord,
    NestedSnapshot,
    ProgressReporter,
    Result,
    SnapshotSource,
    SyncError,
    UploadReceipt,
    Uploader,
};
use super::progress_stream::{chunked, ProgressStream};

#[derive(Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    id: ItemId,
    url: String,
    #[serde(default)]
    uploaded_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP implementation of the remote: nested document GET, multipart
/// upload POST and per-file DELETE.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    snapshot_url: Url,
    upload_url: Url,
    files_url: Url,
    chunk_size: usize,
}

impl HttpRemote {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            snapshot_url: Url::parse(&config.snapshot_url)?,
            upload_url: Url::parse(&config.upload_url)?,
            files_url: Url::parse(&config.files_url)?,
            chunk_size: config.chunk_size,
        })
    }

    fn file_url(&self, id: &ItemId) -> Result<Url> {
        let mut url = self.files_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::internal_error(format!("{} can not be a base url", self.files_url)))?
            .pop_if_empty()
            .push(id.as_str());

        Ok(url)
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);

        Err(SyncError::server_error(status.as_u16(), message))
    }
}

#[async_trait]
impl SnapshotSource for HttpRemote {
    async fn fetch_snapshot(&self) -> Result<NestedSnapshot> {
        let response = self.client
            .get(self.snapshot_url.clone())
            .send()
            .await?;

        let snapshot = Self::check_status(response)
            .await?
            .json::<NestedSnapshot>()
            .await?;

        debug!(count = snapshot.count(), "fetched nested snapshot");
        Ok(snapshot)
    }
}

#[async_trait]
impl Uploader for HttpRemote {
    async fn upload(&self, item: &ItemRecord, progress: ProgressReporter) -> Result<UploadReceipt> {
        let payload = item.payload()
            .cloned()
            .ok_or_else(|| SyncError::MissingPayload(item.name.clone()))?;
        let total_bytes = payload.len() as u64;

        let stream = ProgressStream::new(chunked(payload, self.chunk_size), total_bytes, progress);
        let mut part = Part::stream_with_length(Body::wrap_stream(stream), total_bytes)
            .file_name(item.name.clone());
        if item.media_type.contains('/') {
            part = part.mime_str(&item.media_type)?;
        }

        let form = Form::new()
            .part("file", part)
            .text("filename", item.name.clone())
            .text("filetype", item.media_type.clone())
            .text("filesize", item.size.to_string());

        let response = self.client
            .post(self.upload_url.clone())
            .multipart(form)
            .send()
            .await?;

        let uploaded = Self::check_status(response)
            .await?
            .json::<UploadResponse>()
            .await?
            .file;

        Ok(UploadReceipt {
            id: uploaded.id,
            url: uploaded.url,
            uploaded_at: uploaded.uploaded_at,
        })
    }

    async fn delete(&self, id: &ItemId) -> Result<()> {
        let response = self.client
            .delete(self.file_url(id)?)
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }
}
