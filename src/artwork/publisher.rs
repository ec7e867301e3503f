// Artwork publishing
// Re-hosts an image from the (possibly private) media server on a public image host

use attohttpc::header::CONTENT_TYPE;
use attohttpc::{MultipartBuilder, MultipartFile};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";
const UPLOAD_FILE_NAME: &str = "cover.jpg";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to fetch artwork: {0}")]
    Fetch(#[source] attohttpc::Error),

    #[error("artwork source answered with status {0}")]
    FetchStatus(u16),

    #[error("artwork source returned an empty image")]
    EmptyPayload,

    #[error("failed to upload artwork: {0}")]
    Upload(#[source] attohttpc::Error),

    #[error("image host rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Something that can turn a source image URL into a public one
pub trait ImagePublisher {
    fn publish(&self, source_url: &str) -> Result<String, PublishError>;
}

/// Uploads to a catbox-style host: multipart `reqtype=fileupload` plus a
/// `fileToUpload` file part, answered with the public URL as plain text.
#[derive(Debug, Clone)]
pub struct CatboxPublisher {
    upload_url: String,
    timeout: Duration,
}

impl CatboxPublisher {
    pub fn new(upload_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            upload_url: upload_url.into(),
            timeout,
        }
    }

    /// Download the source image, returning its bytes and content type
    fn fetch(&self, source_url: &str) -> Result<(Vec<u8>, String), PublishError> {
        let response = attohttpc::get(source_url)
            .timeout(self.timeout)
            .send()
            .map_err(PublishError::Fetch)?;

        if !response.is_success() {
            return Err(PublishError::FetchStatus(response.status().as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let bytes = response.bytes().map_err(PublishError::Fetch)?;
        Ok((bytes, content_type))
    }

    fn upload(&self, bytes: &[u8], content_type: &str) -> Result<String, PublishError> {
        let file = MultipartFile::new("fileToUpload", bytes)
            .with_type(content_type)
            .or_else(|_| {
                log::debug!(
                    "Unusable content type '{}', uploading as {}",
                    content_type,
                    DEFAULT_CONTENT_TYPE
                );
                MultipartFile::new("fileToUpload", bytes).with_type(DEFAULT_CONTENT_TYPE)
            })
            .map_err(PublishError::Upload)?
            .with_filename(UPLOAD_FILE_NAME);

        let form = MultipartBuilder::new()
            .with_text("reqtype", "fileupload")
            .with_file(file)
            .build()
            .map_err(PublishError::Upload)?;

        let response = attohttpc::post(&self.upload_url)
            .timeout(self.timeout)
            .body(form)
            .send()
            .map_err(PublishError::Upload)?;

        let status = response.status().as_u16();
        let success = response.is_success();
        let body = response.text().map_err(PublishError::Upload)?;
        let body = body.trim();

        if success && body.starts_with("http") {
            Ok(body.to_string())
        } else {
            Err(PublishError::Rejected {
                status,
                body: body.to_string(),
            })
        }
    }
}

impl ImagePublisher for CatboxPublisher {
    fn publish(&self, source_url: &str) -> Result<String, PublishError> {
        let (bytes, content_type) = self.fetch(source_url)?;

        if bytes.is_empty() {
            return Err(PublishError::EmptyPayload);
        }

        log::debug!(
            "Uploading {} bytes of {} from {}",
            bytes.len(),
            content_type,
            source_url
        );

        let url = self.upload(&bytes, &content_type)?;
        log::info!("Published artwork at {}", url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{ErrorKind, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    /// Reads one HTTP/1.1 request, headers and body, as lossy text
    fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];

        let header_end = loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                return String::from_utf8_lossy(&data).into_owned();
            }
            data.extend_from_slice(&buf[..n]);
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&data[..header_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok());
        let chunked = head.contains("transfer-encoding: chunked");

        loop {
            let body = &data[header_end..];
            let done = match content_length {
                Some(len) => body.len() >= len,
                None if chunked => body.ends_with(b"0\r\n\r\n"),
                None => true,
            };
            if done {
                break;
            }
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
        }

        String::from_utf8_lossy(&data).into_owned()
    }

    /// Serves a single canned response and hands back the request it saw
    fn serve_once(
        status: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());

        let mut response = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status).into_bytes();
        if let Some(content_type) = content_type {
            response.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        response.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
        response.extend_from_slice(body);

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            stream.write_all(&response).unwrap();
            let _ = tx.send(request);
        });

        (url, rx)
    }

    fn publisher(upload_url: &str) -> CatboxPublisher {
        CatboxPublisher::new(upload_url, Duration::from_secs(5))
    }

    #[test]
    fn empty_image_is_rejected_before_upload() {
        let (art_url, _art) = serve_once("200 OK", Some("image/jpeg"), b"");
        let upload = TcpListener::bind("127.0.0.1:0").unwrap();
        let upload_url = format!("http://{}/", upload.local_addr().unwrap());

        let result = publisher(&upload_url).publish(&art_url);

        assert!(matches!(result, Err(PublishError::EmptyPayload)));
        upload.set_nonblocking(true).unwrap();
        let err = upload.accept().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn successful_upload_returns_public_url() {
        let (art_url, _art) = serve_once("200 OK", Some("image/png"), b"\x89PNG fake");
        let (upload_url, upload) =
            serve_once("200 OK", Some("text/plain"), b"https://files.catbox.moe/abc123.png\n");

        let url = publisher(&upload_url).publish(&art_url).unwrap();
        assert_eq!(url, "https://files.catbox.moe/abc123.png");

        let request = upload.recv().unwrap();
        assert!(request.starts_with("POST "));
        assert!(request.contains("name=\"reqtype\""));
        assert!(request.contains("fileupload"));
        assert!(request.contains("name=\"fileToUpload\""));
        assert!(request.contains("filename=\"cover.jpg\""));
        assert!(request.contains("image/png"));
        assert!(request.contains("PNG fake"));
    }

    #[test]
    fn missing_content_type_defaults_to_jpeg() {
        let (art_url, _art) = serve_once("200 OK", None, b"jpeg bytes");
        let (upload_url, upload) = serve_once("200 OK", None, b"https://files.catbox.moe/x.jpg");

        publisher(&upload_url).publish(&art_url).unwrap();

        let request = upload.recv().unwrap();
        assert!(request.contains("image/jpeg"));
    }

    #[test]
    fn non_url_body_is_a_failure() {
        let (art_url, _art) = serve_once("200 OK", Some("image/jpeg"), b"bytes");
        let (upload_url, _upload) = serve_once("200 OK", None, b"Something went wrong");

        match publisher(&upload_url).publish(&art_url) {
            Err(PublishError::Rejected { status, body }) => {
                assert_eq!(status, 200);
                assert_eq!(body, "Something went wrong");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn error_status_is_a_failure() {
        let (art_url, _art) = serve_once("200 OK", Some("image/jpeg"), b"bytes");
        let (upload_url, _upload) =
            serve_once("412 Precondition Failed", None, b"https://looks.like/a/url");

        let result = publisher(&upload_url).publish(&art_url);
        assert!(matches!(result, Err(PublishError::Rejected { status: 412, .. })));
    }

    #[test]
    fn missing_source_image_is_a_failure() {
        let (art_url, _art) = serve_once("404 Not Found", None, b"");
        let result = publisher("http://127.0.0.1:9/").publish(&art_url);
        assert!(matches!(result, Err(PublishError::FetchStatus(404))));
    }

    #[test]
    fn unreachable_source_is_a_failure() {
        let closed = TcpListener::bind("127.0.0.1:0").unwrap();
        let art_url = format!("http://{}/", closed.local_addr().unwrap());
        drop(closed);

        let result = publisher("http://127.0.0.1:9/").publish(&art_url);
        assert!(matches!(result, Err(PublishError::Fetch(_))));
    }
}
