//! GitHub contents API transport.
//!
//! The journal lives as one file in a repository. Each write is a commit;
//! the blob SHA returned by `GET /contents` is the version token, and GitHub
//! itself rejects a `PUT` whose `sha` is no longer the file's current blob.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::transport::{DocumentTransport, RemoteDocument, TransportError, VersionToken};

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const USER_AGENT: &str = concat!("jalt/", env!("CARGO_PKG_VERSION"));

/// Characters left untouched inside a single path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone)]
pub struct GithubOptions {
    pub api_base_url: String,
    /// `owner/name`.
    pub repo: String,
    pub branch: String,
    pub token: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct GithubTransport {
    client: Client,
    options: GithubOptions,
}

impl GithubTransport {
    pub fn new(options: GithubOptions) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, options })
    }

    fn contents_url(&self, path: &str) -> String {
        contents_url(&self.options.api_base_url, &self.options.repo, path)
    }

    fn authorized(&self, request: RequestBuilder, accept: &str) -> RequestBuilder {
        let request = request
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        if self.options.token.trim().is_empty() {
            request
        } else {
            request.bearer_auth(self.options.token.trim())
        }
    }

    /// Files above 1 MB come back from `/contents` with `encoding: none`; the
    /// raw media type still serves them.
    async fn fetch_raw(&self, path: &str) -> Result<String, TransportError> {
        let request = self
            .client
            .get(self.contents_url(path))
            .query(&[("ref", self.options.branch.as_str())]);
        let response = self.authorized(request, RAW_MEDIA_TYPE).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, path, body));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl DocumentTransport for GithubTransport {
    async fn get(&self, path: &str) -> Result<Option<RemoteDocument>, TransportError> {
        let request = self
            .client
            .get(self.contents_url(path))
            .query(&[("ref", self.options.branch.as_str())]);
        let response = self.authorized(request, JSON_MEDIA_TYPE).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(path, repo = %self.options.repo, "journal document not found");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, path, body));
        }

        let payload: ContentsResponse = response
            .json()
            .await
            .map_err(|err| TransportError::Decode(err.to_string()))?;
        let text = match payload.encoding.as_deref() {
            Some("none") | Some("") => self.fetch_raw(path).await?,
            _ => decode_content(&payload)?,
        };
        Ok(Some(RemoteDocument {
            text,
            version: VersionToken::new(payload.sha),
        }))
    }

    async fn create(&self, path: &str, text: &str, message: &str) -> Result<(), TransportError> {
        self.put(path, text, None, message).await
    }

    async fn update(
        &self,
        path: &str,
        text: &str,
        expected: &VersionToken,
        message: &str,
    ) -> Result<(), TransportError> {
        self.put(path, text, Some(expected), message).await
    }

    fn locate(&self, path: &str) -> String {
        format!(
            "https://github.com/{}/blob/{}/{}",
            self.options.repo, self.options.branch, path
        )
    }
}

impl GithubTransport {
    async fn put(
        &self,
        path: &str,
        text: &str,
        sha: Option<&VersionToken>,
        message: &str,
    ) -> Result<(), TransportError> {
        let body = PutContentsRequest {
            message,
            content: BASE64.encode(text.as_bytes()),
            branch: &self.options.branch,
            sha: sha.map(VersionToken::as_str),
        };
        let request = self.client.put(self.contents_url(path)).json(&body);
        let response = self.authorized(request, JSON_MEDIA_TYPE).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, path, body));
        }
        info!(
            path,
            repo = %self.options.repo,
            created = sha.is_none(),
            "journal document committed"
        );
        Ok(())
    }
}

fn contents_url(api_base_url: &str, repo: &str, path: &str) -> String {
    let encoded = path
        .trim_matches('/')
        .split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");
    format!(
        "{}/repos/{}/contents/{encoded}",
        api_base_url.trim_end_matches('/'),
        repo.trim_matches('/')
    )
}

/// Stale SHAs surface as 409, or as a 422 naming `sha` when a create races an
/// existing file. Other 422s are validation errors (bad branch, bad path).
fn status_error(status: StatusCode, path: &str, body: String) -> TransportError {
    match status {
        StatusCode::CONFLICT => TransportError::Conflict {
            path: path.to_string(),
        },
        StatusCode::UNPROCESSABLE_ENTITY if body.contains("sha") => TransportError::Conflict {
            path: path.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Unauthorized(body),
        _ => TransportError::Http {
            status: status.as_u16(),
            body,
        },
    }
}

fn decode_content(payload: &ContentsResponse) -> Result<String, TransportError> {
    let raw = payload
        .content
        .as_deref()
        .ok_or_else(|| TransportError::Decode("response has no content field".to_string()))?;
    // GitHub wraps the base64 body at 60 columns.
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = BASE64
        .decode(compact)
        .map_err(|err| TransportError::Decode(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| TransportError::Decode(err.to_string()))
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Answers one connection per canned `(status, body)` and hands back the
    /// raw requests it saw.
    async fn serve(responses: Vec<(u16, String)>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                seen.push(read_request(&mut socket).await);
                let reply = format!(
                    "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
            seen
        });
        (base, handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if name.trim().eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn transport_at(base: &str) -> GithubTransport {
        GithubTransport::new(GithubOptions {
            api_base_url: base.to_string(),
            repo: "me/notes".to_string(),
            branch: "main".to_string(),
            token: "t0k".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn not_found_reads_as_absent() {
        let (base, server) = serve(vec![(404, r#"{"message":"Not Found"}"#.to_string())]).await;
        let doc = transport_at(&base).get("journal.md").await.unwrap();
        assert!(doc.is_none());

        let seen = server.await.unwrap();
        assert!(seen[0].starts_with("GET /repos/me/notes/contents/journal.md?ref=main "));
        assert!(seen[0].to_ascii_lowercase().contains("authorization: bearer t0k"));
    }

    #[tokio::test]
    async fn found_document_carries_text_and_sha() {
        let text = "# 📔 Personal Journal\n\n*Created on 2024-01-05*\n\n---\n";
        let encoded = BASE64.encode(text);
        let (a, b) = encoded.split_at(16);
        let body = serde_json::json!({
            "sha": "3d21ec53a331a6f037a91c368710b99387d012c1",
            "content": format!("{a}\n{b}\n"),
            "encoding": "base64",
        })
        .to_string();
        let (base, server) = serve(vec![(200, body)]).await;

        let doc = transport_at(&base).get("journal.md").await.unwrap().unwrap();
        assert_eq!(doc.text, text);
        assert_eq!(doc.version.as_str(), "3d21ec53a331a6f037a91c368710b99387d012c1");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn stale_sha_on_update_is_a_conflict() {
        let (base, server) = serve(vec![(
            409,
            r#"{"message":"journal.md does not match 3d21ec5"}"#.to_string(),
        )])
        .await;

        let err = transport_at(&base)
            .update("journal.md", "new text", &VersionToken::new("stale"), "msg")
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let seen = server.await.unwrap();
        assert!(seen[0].starts_with("PUT /repos/me/notes/contents/journal.md "));
        assert!(seen[0].contains(r#""sha":"stale""#));
        assert!(seen[0].contains(r#""branch":"main""#));
    }

    #[tokio::test]
    async fn create_sends_no_sha_and_server_errors_surface() {
        let (base, server) = serve(vec![
            (201, "{}".to_string()),
            (500, r#"{"message":"boom"}"#.to_string()),
        ])
        .await;
        let transport = transport_at(&base);

        transport.create("journal.md", "hello", "init").await.unwrap();
        let err = transport.get("journal.md").await.unwrap_err();
        assert!(matches!(err, TransportError::Http { status: 500, .. }));

        let seen = server.await.unwrap();
        assert!(!seen[0].contains(r#""sha""#));
        assert!(seen[0].contains(&BASE64.encode("hello")));
    }

    #[test]
    fn url_encodes_each_segment() {
        assert_eq!(
            contents_url("https://api.github.com/", "me/notes", "journal.md"),
            "https://api.github.com/repos/me/notes/contents/journal.md"
        );
        assert_eq!(
            contents_url("https://api.github.com", "me/notes", "/daily/my journal.md"),
            "https://api.github.com/repos/me/notes/contents/daily/my%20journal.md"
        );
    }

    #[test]
    fn decodes_wrapped_base64() {
        let text = "# 📔 Personal Journal\n\n*Created on 2024-01-05*\n\n---\n";
        let encoded = BASE64.encode(text);
        let (a, b) = encoded.split_at(20);
        let payload = ContentsResponse {
            sha: "abc".to_string(),
            content: Some(format!("{a}\n{b}\n")),
            encoding: Some("base64".to_string()),
        };
        assert_eq!(decode_content(&payload).unwrap(), text);
    }

    #[test]
    fn rejects_missing_or_corrupt_content() {
        let missing = ContentsResponse {
            sha: "abc".to_string(),
            content: None,
            encoding: Some("base64".to_string()),
        };
        assert!(matches!(decode_content(&missing), Err(TransportError::Decode(_))));

        let corrupt = ContentsResponse {
            sha: "abc".to_string(),
            content: Some("!!!not base64!!!".to_string()),
            encoding: Some("base64".to_string()),
        };
        assert!(matches!(decode_content(&corrupt), Err(TransportError::Decode(_))));
    }

    #[test]
    fn maps_statuses_to_errors() {
        assert!(status_error(StatusCode::CONFLICT, "j.md", String::new()).is_conflict());
        let missing_sha = r#"{"message":"Invalid request.\n\n\"sha\" wasn't supplied."}"#;
        assert!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, "j.md", missing_sha.to_string())
                .is_conflict()
        );
        assert!(matches!(
            status_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "j.md",
                r#"{"message":"Branch nope not found"}"#.to_string()
            ),
            TransportError::Http { status: 422, .. }
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "j.md", "nope".to_string()),
            TransportError::Unauthorized(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "j.md", String::new()),
            TransportError::Http { status: 502, .. }
        ));
    }

    #[test]
    fn create_request_omits_sha() {
        let body = PutContentsRequest {
            message: "m",
            content: "eA==".to_string(),
            branch: "main",
            sha: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("sha").is_none());
        assert_eq!(json["branch"], "main");
    }

    #[test]
    fn locate_points_at_blob_view() {
        let transport = GithubTransport::new(GithubOptions {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            repo: "me/notes".to_string(),
            branch: "main".to_string(),
            token: String::new(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        assert_eq!(
            transport.locate("journal.md"),
            "https://github.com/me/notes/blob/main/journal.md"
        );
    }
}
