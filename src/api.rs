use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::errors::Error;

pub const DEFAULT_API_BASE: &str = "https://api.dropboxapi.com/2/files";
pub const DEFAULT_CONTENT_BASE: &str = "https://content.dropboxapi.com/2/files";

/// One row of a folder listing. Folders and files share the shape; the
/// `.tag` field discriminates.
#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(rename = ".tag")]
    #[allow(dead_code)]
    pub tag: String,
    pub name: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub path_lower: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub path_display: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct FolderListing {
    pub entries: Vec<Entry>,
    #[serde(default)]
    #[allow(dead_code)]
    pub cursor: String,
    #[serde(default)]
    pub has_more: bool,
}

/// Metadata the remote returns for a completed upload. Only logged, never
/// stored.
#[derive(Debug, Deserialize)]
pub struct FileMetadata {
    #[allow(dead_code)]
    pub name: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub path_lower: String,
    pub path_display: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub id: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub client_modified: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub server_modified: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub rev: String,
    pub size: u64,
    #[serde(default)]
    #[allow(dead_code)]
    pub content_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchPage {
    pub matches: Vec<SearchMatch>,
    #[serde(default)]
    pub more: bool,
    #[serde(default)]
    pub start: u64,
}

#[derive(Debug, Deserialize)]
pub struct SearchMatch {
    pub metadata: MatchMetadata,
}

#[derive(Debug, Deserialize)]
pub struct MatchMetadata {
    #[serde(default)]
    pub path_display: String,
}

#[derive(Serialize)]
struct PathArg<'a> {
    path: &'a str,
}

#[derive(Serialize)]
struct SearchArgs<'a> {
    path: &'a str,
    query: &'a str,
    start: u64,
    mode: SearchMode,
}

#[derive(Serialize)]
struct SearchMode {
    #[serde(rename = ".tag")]
    tag: &'static str,
}

/// Connection settings for [`DropboxClient`], assembled once at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: String,
    pub content_base: String,
    pub token: String,
    pub timeout_secs: u64,
    pub insecure: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            content_base: DEFAULT_CONTENT_BASE.to_string(),
            token: String::new(),
            timeout_secs: 10,
            insecure: false,
        }
    }
}

/// Thin client for the four remote calls. Holds one shared connection pool;
/// safe to use from concurrent tasks. Does not retry and does not log —
/// callers decide what a failure means.
pub struct DropboxClient {
    http: reqwest::Client,
    api_base: String,
    content_base: String,
    token: String,
}

impl DropboxClient {
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.clone(),
            content_base: config.content_base.clone(),
            token: config.token.clone(),
        })
    }

    /// List the immediate entries of a remote folder. Pass `""` for root.
    pub async fn list_folder(&self, path: &str) -> Result<FolderListing, Error> {
        let resp = self.rpc("list_folder", &PathArg { path }).await?;
        let body = Self::read_ok(resp).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Search for a file name below `path`. `start` selects the result page;
    /// pass the `start` of the previous page to continue when `more` is set.
    pub async fn search(&self, path: &str, query: &str, start: u64) -> Result<SearchPage, Error> {
        let args = SearchArgs {
            path,
            query,
            start,
            mode: SearchMode { tag: "filename" },
        };
        let resp = self.rpc("search", &args).await?;
        let body = Self::read_ok(resp).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Create a remote folder. A 409 conflict means the folder already
    /// exists and counts as success, which makes the call idempotent.
    pub async fn create_folder(&self, path: &str) -> Result<(), Error> {
        let resp = self.rpc("create_folder_v2", &PathArg { path }).await?;
        if resp.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        Self::read_ok(resp).await?;
        Ok(())
    }

    /// Upload raw bytes to `path` on the content endpoint. The target path
    /// travels in the `Dropbox-API-Arg` header, not the body.
    pub async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<FileMetadata, Error> {
        let arg = serde_json::to_string(&PathArg { path })?;
        let url = format!("{}/upload", self.content_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header("Dropbox-API-Arg", arg)
            .body(bytes)
            .send()
            .await?;
        let body = Self::read_ok(resp).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn rpc<B: Serialize>(&self, op: &str, body: &B) -> Result<Response, Error> {
        let url = format!("{}/{}", self.api_base, op);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Ok(resp)
    }

    async fn read_ok(resp: Response) -> Result<String, Error> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Remote { status, body });
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> DropboxClient {
        DropboxClient::new(&ClientConfig {
            api_base: server.uri(),
            content_base: server.uri(),
            token: "test-token".to_string(),
            timeout_secs: 5,
            insecure: false,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn list_folder_decodes_entries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/list_folder"))
            .and(body_partial_json(json!({"path": "/backups"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entries": [
                    {".tag": "folder", "name": "photos", "path_lower": "/backups/photos",
                     "path_display": "/backups/photos", "id": "id:f1"},
                    {".tag": "file", "name": "a.txt", "path_lower": "/backups/a.txt",
                     "path_display": "/backups/a.txt", "id": "id:f2"}
                ],
                "cursor": "cur1",
                "has_more": false
            })))
            .mount(&server)
            .await;

        let listing = test_client(&server).list_folder("/backups").await.unwrap();
        assert_eq!(listing.entries.len(), 2);
        assert_eq!(listing.entries[0].tag, "folder");
        assert_eq!(listing.entries[1].name, "a.txt");
        assert!(!listing.has_more);
    }

    #[tokio::test]
    async fn non_success_status_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/list_folder"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let err = test_client(&server).list_folder("").await.unwrap_err();
        match err {
            Error::Remote { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "invalid token");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_folder_accepts_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/create_folder_v2"))
            .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
            .mount(&server)
            .await;

        test_client(&server).create_folder("/backups").await.unwrap();
    }

    #[tokio::test]
    async fn upload_sends_octet_stream_with_path_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(wiremock::matchers::header(
                "Dropbox-API-Arg",
                "{\"path\":\"/a.txt\"}",
            ))
            .and(wiremock::matchers::header(
                "Content-Type",
                "application/octet-stream",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "a.txt",
                "path_lower": "/a.txt",
                "path_display": "/a.txt",
                "id": "id:x",
                "client_modified": "2024-05-01T10:00:00Z",
                "server_modified": "2024-05-01T10:00:01Z",
                "rev": "015",
                "size": 5,
                "content_hash": "4d2a0"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let metadata = test_client(&server)
            .upload("/a.txt", b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(metadata.path_display, "/a.txt");
        assert_eq!(metadata.size, 5);
    }
}
