//! Google Drive REST transport.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{header, Client, StatusCode};
use url::Url;
use uuid::Uuid;

use locallydrive_common::{DriveSettings, Error, Result};

use crate::credential::Credential;
use crate::progress::ProgressReporter;
use crate::transport::{DriveTransport, FileList, ListParams, NewFileMetadata, RemoteFile, UploadOutcome};

/// Characters escaped when an id is placed in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Initial download buffer size.
const DOWNLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// HTTP transport for the Drive v3 API.
pub struct DriveHttpTransport {
    http: Client,
    api_base: Url,
    upload_base: Url,
}

impl DriveHttpTransport {
    /// Create a transport using the endpoints and application name in `settings`.
    pub fn new(settings: &DriveSettings) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!(
                "{}/{}",
                settings.application_name,
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: settings.api_base_url()?,
            upload_base: settings.upload_base_url()?,
        })
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.api_base.as_str().trim_end_matches('/'))
    }

    fn file_url(&self, file_id: &str) -> String {
        format!(
            "{}/{}",
            self.files_url(),
            utf8_percent_encode(file_id, PATH_SEGMENT)
        )
    }

    fn upload_url(&self) -> String {
        format!("{}/files", self.upload_base.as_str().trim_end_matches('/'))
    }

    /// Handle API response with error checking.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::transfer("Completed", format!("Failed to parse response: {}", e)))
        } else if status == StatusCode::UNAUTHORIZED {
            Err(Error::Credential("Invalid or expired token".to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Error::transfer(http_status(status), body))
        }
    }
}

fn http_status(status: StatusCode) -> String {
    format!("HTTP {}", status.as_u16())
}

/// Build a `multipart/related` body: JSON metadata part, then media part.
fn multipart_body(boundary: &str, metadata_json: &str, mime_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + metadata_json.len() + 256);

    // Metadata part
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata_json.as_bytes());
    body.extend_from_slice(b"\r\n");

    // Media part
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}--", boundary).as_bytes());
    body
}

#[async_trait]
impl DriveTransport for DriveHttpTransport {
    async fn create_file(
        &self,
        credential: &Credential,
        metadata: &NewFileMetadata,
        mime_type: &str,
        content: Bytes,
        fields: &str,
    ) -> Result<UploadOutcome> {
        let metadata_json = match serde_json::to_string(metadata) {
            Ok(json) => json,
            Err(e) => {
                return Ok(UploadOutcome::failed(format!(
                    "Failed to serialize metadata: {}",
                    e
                )))
            }
        };

        let boundary = format!("locallydrive-{}", Uuid::new_v4().simple());
        let body = multipart_body(&boundary, &metadata_json, mime_type, &content);

        let response = match self
            .http
            .post(self.upload_url())
            .header(header::AUTHORIZATION, credential.bearer())
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .query(&[("uploadType", "multipart"), ("fields", fields)])
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(UploadOutcome::failed(format!("Failed to upload file: {}", e))),
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Credential("Invalid or expired token".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(UploadOutcome::failed(format!(
                "{} - {}",
                http_status(status),
                body
            )));
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return Ok(UploadOutcome::failed(format!(
                    "Failed to read upload response: {}",
                    e
                )))
            }
        };
        if text.trim().is_empty() {
            return Ok(UploadOutcome::completed(None));
        }

        Ok(match serde_json::from_str::<RemoteFile>(&text) {
            Ok(file) => UploadOutcome::completed(Some(file)),
            Err(e) => UploadOutcome {
                error: Some(format!("Failed to parse upload response: {}", e)),
                ..UploadOutcome::completed(None)
            },
        })
    }

    async fn list_files(&self, credential: &Credential, params: &ListParams) -> Result<FileList> {
        let response = self
            .http
            .get(self.files_url())
            .header(header::AUTHORIZATION, credential.bearer())
            .query(&params.query_pairs())
            .send()
            .await
            .map_err(|e| Error::transfer("Failed", format!("Failed to list files: {}", e)))?;

        self.handle_response(response).await
    }

    async fn download(
        &self,
        credential: &Credential,
        file_id: &str,
        progress: &ProgressReporter,
    ) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(self.file_url(file_id))
            .header(header::AUTHORIZATION, credential.bearer())
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| Error::transfer("Failed", format!("Failed to start download: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Credential("Invalid or expired token".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transfer(http_status(status), body));
        }

        // Content-Length is only a hint; never reserve more than one chunk up front
        let capacity = response
            .content_length()
            .map_or(DOWNLOAD_CHUNK_SIZE, |len| len.min(DOWNLOAD_CHUNK_SIZE as u64) as usize);
        let mut buffer = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| Error::transfer("Failed", format!("Stream read error: {}", e)))?;
            buffer.extend_from_slice(&chunk);
            progress.downloading(buffer.len() as u64);
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> DriveHttpTransport {
        let mut settings = DriveSettings::new("/tmp/key.json");
        settings.api_base = "http://localhost:9000/drive/v3/".to_string();
        settings.upload_base = "http://localhost:9000/upload/drive/v3".to_string();
        DriveHttpTransport::new(&settings).unwrap()
    }

    #[test]
    fn test_endpoint_urls() {
        let transport = transport();
        assert_eq!(transport.files_url(), "http://localhost:9000/drive/v3/files");
        assert_eq!(
            transport.upload_url(),
            "http://localhost:9000/upload/drive/v3/files"
        );
    }

    #[test]
    fn test_file_id_is_path_encoded() {
        let transport = transport();
        assert_eq!(
            transport.file_url("a/b c"),
            "http://localhost:9000/drive/v3/files/a%2Fb%20c"
        );
        assert_eq!(
            transport.file_url("1AbC-_x.y"),
            "http://localhost:9000/drive/v3/files/1AbC-_x.y"
        );
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = multipart_body("B", r#"{"name":"a.txt"}"#, "text/plain", b"abc");
        let text = String::from_utf8(body).unwrap();

        assert_eq!(
            text,
            "--B\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{\"name\":\"a.txt\"}\r\n\
             --B\r\nContent-Type: text/plain\r\n\r\nabc\r\n--B--"
        );
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let mut settings = DriveSettings::new("/tmp/key.json");
        settings.api_base = "::not a url::".to_string();
        assert!(DriveHttpTransport::new(&settings).is_err());
    }

    use crate::credential::DRIVE_SCOPE;
    use crate::gdrive::test_server::{Reply, TestServer};
    use crate::progress::{progress_channel, TransferProgress};
    use crate::transport::UploadStatus;
    use chrono::{Duration, Utc};
    use oauth2::{AccessToken, Scope};

    fn credential() -> Credential {
        Credential::new(
            Scope::new(DRIVE_SCOPE.to_string()),
            AccessToken::new("t0ken".to_string()),
            Utc::now() + Duration::hours(1),
        )
    }

    fn metadata() -> NewFileMetadata {
        NewFileMetadata {
            name: "a.txt".to_string(),
            parents: Some(vec!["folder-1".to_string()]),
        }
    }

    async fn upload_with(reply: Reply) -> (Result<UploadOutcome>, String) {
        let server = TestServer::start(vec![reply]).await;
        let transport = DriveHttpTransport::new(&server.drive_settings()).unwrap();

        let outcome = transport
            .create_file(
                &credential(),
                &metadata(),
                "text/plain",
                Bytes::from_static(b"abc"),
                "id,name",
            )
            .await;
        let request = server.requests().await.remove(0);
        (outcome, request)
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_request() {
        let (outcome, request) =
            upload_with(Reply::json(200, r#"{"id": "1", "name": "a.txt"}"#)).await;

        let outcome = outcome.unwrap();
        assert_eq!(outcome.status, UploadStatus::Completed);
        assert_eq!(outcome.response.unwrap().id.as_deref(), Some("1"));

        assert!(request
            .starts_with("POST /upload/drive/v3/files?uploadType=multipart&fields=id%2Cname "));
        let lower = request.to_ascii_lowercase();
        assert!(lower.contains("authorization: bearer t0ken"));
        assert!(lower.contains("content-type: multipart/related; boundary=locallydrive-"));
        assert!(request.contains(r#"{"name":"a.txt","parents":["folder-1"]}"#));
        assert!(request.contains("Content-Type: text/plain\r\n\r\nabc\r\n"));
    }

    #[tokio::test]
    async fn test_upload_empty_body_is_completed_without_response() {
        let (outcome, _) = upload_with(Reply::json(200, "")).await;

        let outcome = outcome.unwrap();
        assert_eq!(outcome.status, UploadStatus::Completed);
        assert!(outcome.response.is_none());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_upload_unparseable_body_keeps_cause() {
        let (outcome, _) = upload_with(Reply::with_body(200, "text/html", "<html>")).await;

        let outcome = outcome.unwrap();
        assert_eq!(outcome.status, UploadStatus::Completed);
        assert!(outcome.response.is_none());
        assert!(outcome.error.unwrap().contains("Failed to parse upload response"));
    }

    #[tokio::test]
    async fn test_upload_server_error_is_failed() {
        let (outcome, _) = upload_with(Reply::json(500, r#"{"error": "backend"}"#)).await;

        let outcome = outcome.unwrap();
        assert_eq!(outcome.status, UploadStatus::Failed);
        assert!(outcome.error.unwrap().starts_with("HTTP 500"));
    }

    #[tokio::test]
    async fn test_upload_unauthorized_is_credential_error() {
        let (outcome, _) = upload_with(Reply::json(401, r#"{"error": "invalid_token"}"#)).await;
        assert!(matches!(outcome, Err(Error::Credential(_))));
    }

    #[tokio::test]
    async fn test_list_sends_query_parameters() {
        let server = TestServer::start(vec![Reply::json(
            200,
            r#"{"files": [{"id": "1", "name": "a"}], "nextPageToken": "p2"}"#,
        )])
        .await;
        let transport = DriveHttpTransport::new(&server.drive_settings()).unwrap();
        let params = ListParams {
            page_size: 25,
            page_token: Some("p1".to_string()),
            order_by: "folder,name".to_string(),
            spaces: "drive".to_string(),
            fields: "nextPageToken,files(id)".to_string(),
            q: Some("(trashed = false)".to_string()),
        };

        let list = transport.list_files(&credential(), &params).await.unwrap();
        assert_eq!(list.files.len(), 1);
        assert_eq!(list.next_page_token.as_deref(), Some("p2"));

        let request = server.requests().await.remove(0);
        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("GET /drive/v3/files?"));
        for expected in [
            "pageSize=25",
            "pageToken=p1",
            "orderBy=folder%2Cname",
            "spaces=drive",
            "fields=nextPageToken%2Cfiles%28id%29",
            "q=%28trashed+%3D+false%29",
        ] {
            assert!(request_line.contains(expected), "missing {}", expected);
        }
    }

    #[tokio::test]
    async fn test_list_unauthorized_is_credential_error() {
        let server = TestServer::start(vec![Reply::json(401, "{}")]).await;
        let transport = DriveHttpTransport::new(&server.drive_settings()).unwrap();
        let params = ListParams {
            page_size: 1,
            page_token: None,
            order_by: "name".to_string(),
            spaces: "drive".to_string(),
            fields: "files(id)".to_string(),
            q: None,
        };

        let err = transport.list_files(&credential(), &params).await.unwrap_err();
        assert!(matches!(err, Error::Credential(_)));
    }

    #[tokio::test]
    async fn test_download_reports_each_chunk() {
        let server = TestServer::start(vec![Reply::chunked(&[b"hello ", b"drive"])]).await;
        let transport = DriveHttpTransport::new(&server.drive_settings()).unwrap();

        let (tx, mut rx) = progress_channel(16);
        let reporter = ProgressReporter::new("f 1", Some(tx));
        let data = transport.download(&credential(), "f 1", &reporter).await.unwrap();
        drop(reporter);

        assert_eq!(data, b"hello drive");

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                TransferProgress::Downloading { bytes } => received.push(bytes),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert!(received.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(received.last(), Some(&11));

        let request = server.requests().await.remove(0);
        assert!(request.starts_with("GET /drive/v3/files/f%201?alt=media "));
    }

    #[tokio::test]
    async fn test_download_inflated_content_length_is_transfer_error() {
        let server = TestServer::start(vec![Reply::raw(
            "HTTP/1.1 200 OK\r\nContent-Length: 100000000000000000\r\n",
            b"abc",
        )])
        .await;
        let transport = DriveHttpTransport::new(&server.drive_settings()).unwrap();

        let err = transport
            .download(&credential(), "f1", &ProgressReporter::new("f1", None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transfer { .. }));
    }

    #[tokio::test]
    async fn test_download_missing_file_carries_status() {
        let server = TestServer::start(vec![Reply::json(404, r#"{"error": "notFound"}"#)]).await;
        let transport = DriveHttpTransport::new(&server.drive_settings()).unwrap();

        let err = transport
            .download(&credential(), "gone", &ProgressReporter::new("gone", None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transfer { ref status, .. } if status == "HTTP 404"));
    }
}
