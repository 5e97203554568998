//! Remote emotion-classifier adapter.

use crate::emotion::Emotion;
use crate::error::{Result, SpeechError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    async fn predict(&self, text: &str) -> Result<Emotion>;
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    label: u32,
}

/// Calls a sentiment-model service exposing `POST /predict` with
/// `{"text": ...}` and answering `{"label": <head index>}`.
pub struct HttpClassifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClassifier {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                SpeechError::Classifier(format!("Failed to build HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EmotionClassifier for HttpClassifier {
    async fn predict(&self, text: &str) -> Result<Emotion> {
        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(&PredictRequest { text })
            .send()
            .await
            .map_err(|err| SpeechError::Classifier(format!("Classifier request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::Classifier(format!(
                "Classifier returned status {status}"
            )));
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|err| SpeechError::Classifier(format!("Invalid classifier response: {err}")))?;

        Emotion::from_label_id(parsed.label).ok_or_else(|| {
            SpeechError::Classifier(format!("Unknown emotion label id {}", parsed.label))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn maps_label_id_to_emotion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .and(body_json(serde_json::json!({ "text": "我今天很开心" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "label": 2 })))
            .expect(1)
            .mount(&server)
            .await;

        let classifier =
            HttpClassifier::new(server.uri(), Duration::from_secs(5)).expect("client");
        let emotion = classifier.predict("我今天很开心").await.expect("predict");
        assert_eq!(emotion, Emotion::Happy);
    }

    #[tokio::test]
    async fn out_of_range_label_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "label": 42 })),
            )
            .mount(&server)
            .await;

        let classifier =
            HttpClassifier::new(server.uri(), Duration::from_secs(5)).expect("client");
        let err = classifier.predict("x").await.expect_err("bad label");
        assert!(matches!(err, SpeechError::Classifier(_)));
    }
}
