use anyhow::{anyhow, bail, Context};
use overlaycore::detection::wire::{error_message, file_name, upload_name};
use overlaycore::detection::{
    DeleteResponse, HistoryEntry, HistoryItemResponse, HistoryResponse, MediaKind, Recognition,
    RecognizeResponse,
};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// A validated recognition plus the raw result document it came from.
pub struct Recognized {
    pub recognition: Recognition,
    pub raw: Value,
}

/// HTTP client for the recognition, history and static asset endpoints.
#[derive(Clone)]
pub struct RecognitionClient {
    http: reqwest::Client,
    base_url: String,
}

impl RecognitionClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    /// URL of a processed output image, given the path the service stored.
    pub fn output_url(&self, stored_path: &str) -> String {
        format!("{}/output/{}", self.base_url, file_name(stored_path))
    }

    /// URL of a raw upload, given the path the service stored.
    pub fn upload_url(&self, stored_path: &str) -> String {
        format!("{}/uploads/{}", self.base_url, file_name(stored_path))
    }

    pub async fn recognize(
        &self,
        kind: MediaKind,
        file: &Path,
        prompt: &str,
    ) -> anyhow::Result<Recognized> {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        let form = Form::new()
            .part(
                kind.form_field(),
                Part::bytes(bytes).file_name(upload_name(file, kind)),
            )
            .text("prompt", prompt.to_string());

        let url = self.api_url(&format!("recognize/{}", kind.as_str()));
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;
        let envelope: RecognizeResponse = read_json(response).await?;
        let raw = envelope.result.clone().unwrap_or(Value::Null);
        let recognition = envelope
            .into_recognition(kind)
            .with_context(|| format!("{} recognition", kind.as_str()))?;
        Ok(Recognized { recognition, raw })
    }

    pub async fn history(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        let url = self.api_url("history");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        let body: HistoryResponse = read_json(response).await?;
        if !body.success {
            bail!(body.error.unwrap_or_else(|| "history request failed".into()));
        }
        Ok(body.history)
    }

    pub async fn history_item(&self, id: i64) -> anyhow::Result<HistoryEntry> {
        let url = self.api_url(&format!("history/{}", id));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        let body: HistoryItemResponse = read_json(response).await?;
        match body.item {
            Some(item) if body.success => Ok(item),
            _ => Err(anyhow!(body
                .error
                .unwrap_or_else(|| format!("history item {} not returned", id)))),
        }
    }

    pub async fn delete_history(&self, id: i64) -> anyhow::Result<()> {
        let url = self.api_url(&format!("history/{}", id));
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .with_context(|| format!("DELETE {}", url))?;
        let body: DeleteResponse = read_json(response).await?;
        if !body.success {
            bail!(body
                .error
                .unwrap_or_else(|| format!("history item {} was not deleted", id)));
        }
        Ok(())
    }
}

/// Decodes a JSON body, turning non-2xx statuses into errors that carry the
/// service's `error` message when it sent one.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> anyhow::Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        bail!("{}: {}", status, error_message(&text));
    }
    response
        .json::<T>()
        .await
        .context("decoding service response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::SocketAddr;
    use warp::http::StatusCode;
    use warp::hyper::body::Bytes;
    use warp::Filter;

    fn stored_entry() -> Value {
        json!({
            "id": 3,
            "type": "image",
            "prompt": "cats",
            "file_path": "uploads/cat.jpg",
            "result": "{\"boxes\": [{\"x1\": 1, \"y1\": 2, \"x2\": 3, \"y2\": 4, \"label\": \"cat\", \"confidence\": 0.9}]}",
            "timestamp": "2024-05-01 10:00:00"
        })
    }

    async fn stub_service() -> SocketAddr {
        let image = warp::path!("api" / "recognize" / "image")
            .and(warp::post())
            .and(warp::header::<String>("content-type"))
            .and(warp::body::bytes())
            .map(|content_type: String, body: Bytes| {
                let text = String::from_utf8_lossy(&body);
                let ok = content_type.starts_with("multipart/form-data")
                    && text.contains("name=\"image\"")
                    && text.contains("find the cat");
                let label = if ok { "cat" } else { "bad-request" };
                warp::reply::json(&json!({
                    "success": true,
                    "result": {
                        "boxes": [{"x1": 10, "y1": 10, "x2": 50, "y2": 50, "label": label, "confidence": 0.92}],
                        "output_path": "output/result_cat.png"
                    }
                }))
            });
        let video = warp::path!("api" / "recognize" / "video")
            .and(warp::post())
            .and(warp::body::bytes())
            .map(|_body: Bytes| {
                warp::reply::json(&json!({
                    "success": true,
                    "result": {"error": "Could not open video"}
                }))
            });
        let history = warp::path!("api" / "history")
            .and(warp::get())
            .map(|| warp::reply::json(&json!({"success": true, "history": [stored_entry()]})));
        let item = warp::path!("api" / "history" / i64)
            .and(warp::get())
            .map(|id: i64| {
                if id == 3 {
                    warp::reply::with_status(
                        warp::reply::json(&json!({"success": true, "item": stored_entry()})),
                        StatusCode::OK,
                    )
                } else {
                    warp::reply::with_status(
                        warp::reply::json(&json!({"error": "Item not found"})),
                        StatusCode::NOT_FOUND,
                    )
                }
            });
        let delete = warp::path!("api" / "history" / i64)
            .and(warp::delete())
            .map(|id: i64| {
                if id == 3 {
                    warp::reply::with_status(
                        warp::reply::json(&json!({"success": true, "message": "Item deleted successfully"})),
                        StatusCode::OK,
                    )
                } else {
                    warp::reply::with_status(
                        warp::reply::json(&json!({"error": "Item not found"})),
                        StatusCode::NOT_FOUND,
                    )
                }
            });

        let routes = image.or(video).or(history).or(item).or(delete);
        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }

    async fn client() -> RecognitionClient {
        let addr = stub_service().await;
        RecognitionClient::new(&format!("http://{}/", addr), Duration::from_secs(5)).unwrap()
    }

    fn upload_fixture() -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        std::fs::write(file.path(), b"jpeg bytes").unwrap();
        file
    }

    #[test]
    fn asset_urls_use_last_path_component() {
        let client = RecognitionClient::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.output_url("output/result_cat.jpg"),
            "http://localhost:5000/output/result_cat.jpg"
        );
        assert_eq!(
            client.upload_url("uploads\\clip.mp4"),
            "http://localhost:5000/uploads/clip.mp4"
        );
    }

    #[tokio::test]
    async fn image_recognition_uploads_multipart_and_validates() {
        let client = client().await;
        let upload = upload_fixture();
        let recognized = client
            .recognize(MediaKind::Image, upload.path(), "find the cat")
            .await
            .unwrap();
        match recognized.recognition {
            Recognition::Image(image) => {
                assert_eq!(image.boxes.len(), 1);
                assert_eq!(image.boxes[0].label, "cat");
                assert_eq!(image.output_path.as_deref(), Some("output/result_cat.png"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(recognized.raw.get("boxes").is_some());
    }

    #[tokio::test]
    async fn video_error_payload_is_a_failure() {
        let client = client().await;
        let upload = upload_fixture();
        let err = client
            .recognize(MediaKind::Video, upload.path(), "cars")
            .await
            .err()
            .unwrap();
        assert!(format!("{:#}", err).contains("Could not open video"));
    }

    #[tokio::test]
    async fn history_lists_and_fetches_entries() {
        let client = client().await;
        let entries = client.history().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].summary(), "1 objects");

        let item = client.history_item(3).await.unwrap();
        assert_eq!(item.kind, MediaKind::Image);
        let missing = client.history_item(99).await.err().unwrap();
        assert!(missing.to_string().contains("Item not found"));
    }

    #[tokio::test]
    async fn delete_reports_missing_items() {
        let client = client().await;
        assert!(client.delete_history(3).await.is_ok());
        let err = client.delete_history(4).await.err().unwrap();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn unreachable_service_is_an_error() {
        let client =
            RecognitionClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        assert!(client.history().await.is_err());
    }
}
