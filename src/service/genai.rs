use std::time::Duration;

use serde_json::{json, Value};

use crate::config::GenAiConfig;

/// Client for the OpenAI-compatible generative backend. Stateless; every
/// failure mode (transport, timeout, non-2xx, unexpected shape) collapses to
/// `None` so no raw upstream error ever reaches a command handler.
#[derive(Clone)]
pub struct GenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    image_model: String,
    chat_model: String,
}

impl GenAiClient {
    pub fn new(config: &GenAiConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            image_model: config.image_model.clone(),
            chat_model: config.chat_model.clone(),
        }
    }

    pub async fn generate_image(&self, prompt: &str) -> Option<String> {
        let body = json!({
            "model": self.image_model,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
        });

        let value = self.post("/v1/images/generations", &body).await?;

        match value["data"][0]["url"].as_str() {
            Some(url) => Some(url.to_string()),
            None => {
                error!("Image response missing data[0].url: {}", value);
                None
            }
        }
    }

    pub async fn ask_question(&self, question: &str) -> Option<String> {
        let body = json!({
            "model": self.chat_model,
            "messages": [{ "role": "user", "content": question }],
            "max_tokens": 4096,
        });

        let value = self.post("/v1/chat/completions", &body).await?;

        match value["choices"][0]["message"]["content"].as_str() {
            Some(content) => Some(content.trim().to_string()),
            None => {
                error!("Chat response missing choices[0].message.content: {}", value);
                None
            }
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Option<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = match self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Request to {} failed: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("Backend returned {} for {}: {}", status, url, text);
            return None;
        }

        match response.json::<Value>().await {
            Ok(value) => Some(value),
            Err(e) => {
                error!("Malformed JSON from {}: {}", url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String) -> GenAiClient {
        GenAiClient::new(&GenAiConfig {
            api_key: "test-key".to_string(),
            base_url,
            image_model: "dall-e-3".to_string(),
            chat_model: "gpt-4".to_string(),
        })
    }

    #[tokio::test]
    async fn generate_image_returns_first_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .and(body_partial_json(json!({ "prompt": "a sunset", "n": 1 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "url": "https://images.example/sunset.png" }]
            })))
            .mount(&server)
            .await;

        let url = client(server.uri()).generate_image("a sunset").await;
        assert_eq!(url.as_deref(), Some("https://images.example/sunset.png"));
    }

    #[tokio::test]
    async fn generate_image_maps_upstream_error_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        assert_eq!(client(server.uri()).generate_image("a sunset").await, None);
    }

    #[tokio::test]
    async fn ask_question_trims_answer_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "  42  " } }]
            })))
            .mount(&server)
            .await;

        let answer = client(server.uri()).ask_question("meaning of life?").await;
        assert_eq!(answer.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn malformed_payload_maps_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": true })))
            .mount(&server)
            .await;

        assert_eq!(client(server.uri()).ask_question("hi").await, None);
    }

    #[tokio::test]
    async fn unreachable_backend_maps_to_none() {
        // Nothing listens on this port.
        assert_eq!(
            client("http://127.0.0.1:9".to_string()).generate_image("x").await,
            None
        );
    }
}
