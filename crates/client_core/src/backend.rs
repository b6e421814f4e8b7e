use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::TaskId,
    error::ApiError,
    protocol::{
        Artifact, ArtifactsResponse, CutClipRequest, DownloadRequest, DownloadResponse,
        DuplicateReport, GenresResponse, StatusResponse,
    },
};
use url::Url;

use crate::{
    config::ClientSettings,
    error::{ClientError, Result},
};

/// Request/response surface of the backend task engine.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Returns authoritative ids positionally aligned with `request.urls`.
    async fn submit(&self, request: &DownloadRequest) -> Result<Vec<TaskId>>;
    async fn check_duplicates(&self, request: &DownloadRequest) -> Result<DuplicateReport>;
    async fn get_full_state(&self) -> Result<StatusResponse>;
    async fn list_genres(&self) -> Result<Vec<String>>;
    async fn list_artifacts(&self) -> Result<Vec<Artifact>>;
    async fn fetch_artifact_bytes(&self, path: &str) -> Result<Vec<u8>>;
    async fn cut_clip(&self, request: &CutClipRequest) -> Result<Vec<u8>>;
}

pub struct HttpTaskBackend {
    http: Client,
    base: Url,
}

impl HttpTaskBackend {
    pub fn new(server_url: &str) -> Result<Self> {
        Ok(Self {
            http: Client::new(),
            base: parse_server_url(server_url)?,
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base: parse_server_url(&settings.server_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidServerUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

pub(crate) fn parse_server_url(server_url: &str) -> Result<Url> {
    let url = Url::parse(server_url.trim())
        .map_err(|_| ClientError::InvalidServerUrl(server_url.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ClientError::InvalidServerUrl(server_url.to_string())),
    }
}

async fn ensure_success(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(ApiError::from_response_body(status.as_u16(), &body).into())
}

async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T> {
    let bytes = ensure_success(res).await?.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn read_bytes(res: Response) -> Result<Vec<u8>> {
    let bytes = ensure_success(res).await?.bytes().await?;
    Ok(bytes.to_vec())
}

#[async_trait]
impl TaskBackend for HttpTaskBackend {
    async fn submit(&self, request: &DownloadRequest) -> Result<Vec<TaskId>> {
        let res = self
            .http
            .post(self.endpoint(["download"])?)
            .json(request)
            .send()
            .await?;
        let body: DownloadResponse = read_json(res).await?;
        Ok(body.download_ids)
    }

    async fn check_duplicates(&self, request: &DownloadRequest) -> Result<DuplicateReport> {
        let res = self
            .http
            .post(self.endpoint(["check-duplicates"])?)
            .json(request)
            .send()
            .await?;
        read_json(res).await
    }

    async fn get_full_state(&self) -> Result<StatusResponse> {
        let res = self.http.get(self.endpoint(["status"])?).send().await?;
        read_json(res).await
    }

    async fn list_genres(&self) -> Result<Vec<String>> {
        let res = self.http.get(self.endpoint(["genres"])?).send().await?;
        let body: GenresResponse = read_json(res).await?;
        Ok(body.genres)
    }

    async fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        let res = self.http.get(self.endpoint(["audio-files"])?).send().await?;
        let body: ArtifactsResponse = read_json(res).await?;
        Ok(body.files)
    }

    async fn fetch_artifact_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let segments = std::iter::once("audio").chain(path.split('/').filter(|s| !s.is_empty()));
        let res = self.http.get(self.endpoint(segments)?).send().await?;
        read_bytes(res).await
    }

    async fn cut_clip(&self, request: &CutClipRequest) -> Result<Vec<u8>> {
        let res = self
            .http
            .post(self.endpoint(["cut-audio"])?)
            .json(request)
            .send()
            .await?;
        read_bytes(res).await
    }
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
