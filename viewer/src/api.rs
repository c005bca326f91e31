use overlaycore::detection::{
    DeleteResponse, HistoryEntry, HistoryResponse, MediaKind, Recognition, RecognizeResponse,
};
use overlaycore::detection::wire::{error_message, upload_name};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:5000";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Base URL of the recognition service, from `DETECT_SERVICE_URL` if set.
pub fn service_url() -> String {
    std::env::var("DETECT_SERVICE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SERVICE_URL.into())
        .trim_end_matches('/')
        .to_string()
}

fn client() -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| e.to_string())
}

pub async fn recognize(
    base_url: String,
    kind: MediaKind,
    file: PathBuf,
    prompt: String,
) -> Result<Recognition, String> {
    let bytes = tokio::fs::read(&file)
        .await
        .map_err(|e| format!("{}: {}", file.display(), e))?;
    let form = Form::new()
        .part(
            kind.form_field(),
            Part::bytes(bytes).file_name(upload_name(&file, kind)),
        )
        .text("prompt", prompt);

    let response = client()?
        .post(format!("{}/api/recognize/{}", base_url, kind.as_str()))
        .multipart(form)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let envelope: RecognizeResponse = read_json(response).await?;
    envelope.into_recognition(kind).map_err(|e| e.to_string())
}

pub async fn fetch_history(base_url: String) -> Result<Vec<HistoryEntry>, String> {
    let response = client()?
        .get(format!("{}/api/history", base_url))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let body: HistoryResponse = read_json(response).await?;
    if body.success {
        Ok(body.history)
    } else {
        Err(body.error.unwrap_or_else(|| "history request failed".into()))
    }
}

pub async fn delete_history(base_url: String, id: i64) -> Result<(), String> {
    let response = client()?
        .delete(format!("{}/api/history/{}", base_url, id))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let body: DeleteResponse = read_json(response).await?;
    if body.success {
        Ok(())
    } else {
        Err(body.error.unwrap_or_else(|| format!("record {} was not deleted", id)))
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, String> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(format!("{}: {}", status, error_message(&text)));
    }
    response.json::<T>().await.map_err(|e| e.to_string())
}
