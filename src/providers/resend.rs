//! Resend transactional email send.

use serde::Deserialize;

use super::{error_for_response, send_with_retry, ProviderError, RetryPolicy};

const EMAILS_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

pub struct ResendClient {
    api_key: String,
    http: reqwest::Client,
}

impl ResendClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Send an email. Returns the provider message id.
    pub async fn send_email(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        html: &str,
    ) -> Result<String, ProviderError> {
        let response = send_with_retry(
            self.http
                .post(EMAILS_URL)
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({
                    "from": from,
                    "to": [to],
                    "subject": subject,
                    "html": html,
                })),
            &RetryPolicy::default(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let body: SendEmailResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;
        Ok(body.id)
    }
}
