//! Stripe: Checkout setup sessions and payment-method listing.
//!
//! Stripe's API is form-encoded on the way in, JSON on the way out.
//! Only the setup flow (saving ACH/card details for later charges) and
//! the method listing are exposed; charging happens elsewhere.

use serde::{Deserialize, Serialize};

use super::{error_for_response, send_with_retry, ProviderError, RetryPolicy};

const API_BASE: &str = "https://api.stripe.com/v1";

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// The redirect URL the caller sends the browser to.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodList {
    #[serde(default)]
    data: Vec<PaymentMethod>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethod {
    id: String,
    #[serde(default, rename = "type")]
    method_type: String,
    #[serde(default)]
    card: Option<CardDetails>,
    #[serde(default)]
    us_bank_account: Option<BankDetails>,
}

#[derive(Debug, Deserialize)]
struct CardDetails {
    #[serde(default)]
    brand: String,
    #[serde(default)]
    last4: String,
    #[serde(default)]
    exp_month: u32,
    #[serde(default)]
    exp_year: u32,
}

#[derive(Debug, Deserialize)]
struct BankDetails {
    #[serde(default)]
    bank_name: String,
    #[serde(default)]
    last4: String,
}

/// The provider-agnostic shape handed back to API callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodSummary {
    pub id: String,
    pub kind: String,
    pub label: String,
    pub last4: String,
    pub expires: Option<String>,
}

fn summarize(method: PaymentMethod) -> PaymentMethodSummary {
    if let Some(card) = method.card {
        return PaymentMethodSummary {
            id: method.id,
            kind: "card".to_string(),
            label: card.brand,
            last4: card.last4,
            expires: Some(format!("{:02}/{}", card.exp_month, card.exp_year)),
        };
    }
    if let Some(bank) = method.us_bank_account {
        return PaymentMethodSummary {
            id: method.id,
            kind: "us_bank_account".to_string(),
            label: bank.bank_name,
            last4: bank.last4,
            expires: None,
        };
    }
    PaymentMethodSummary {
        id: method.id,
        kind: method.method_type,
        label: String::new(),
        last4: String::new(),
        expires: None,
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct StripeClient {
    secret_key: String,
    http: reqwest::Client,
}

impl StripeClient {
    pub fn new(secret_key: &str) -> Self {
        Self {
            secret_key: secret_key.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Find a customer by email or create one.
    pub async fn find_or_create_customer(
        &self,
        email: &str,
        name: &str,
    ) -> Result<String, ProviderError> {
        #[derive(Debug, Deserialize)]
        struct CustomerList {
            #[serde(default)]
            data: Vec<StripeCustomer>,
        }

        let response = send_with_retry(
            self.http
                .get(format!("{}/customers", API_BASE))
                .bearer_auth(&self.secret_key)
                .query(&[("email", email), ("limit", "1")]),
            &RetryPolicy::default(),
        )
        .await?;

        if response.status().is_success() {
            let list: CustomerList = response
                .json()
                .await
                .map_err(|e| ProviderError::BadResponse(e.to_string()))?;
            if let Some(existing) = list.data.into_iter().next() {
                return Ok(existing.id);
            }
        }

        let response = send_with_retry(
            self.http
                .post(format!("{}/customers", API_BASE))
                .bearer_auth(&self.secret_key)
                .form(&[("email", email), ("name", name)]),
            &RetryPolicy::default(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        let customer: StripeCustomer = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;
        Ok(customer.id)
    }

    /// Create a Checkout session in setup mode for saving a card or ACH
    /// account. Returns the redirect URL.
    pub async fn create_setup_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        let success_url = format!("{}?setup=success", return_url);
        let cancel_url = format!("{}?setup=canceled", return_url);
        let response = send_with_retry(
            self.http
                .post(format!("{}/checkout/sessions", API_BASE))
                .bearer_auth(&self.secret_key)
                .form(&[
                    ("mode", "setup"),
                    ("customer", customer_id),
                    ("payment_method_types[0]", "card"),
                    ("payment_method_types[1]", "us_bank_account"),
                    ("success_url", &success_url),
                    ("cancel_url", &cancel_url),
                ]),
            &RetryPolicy::default(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))
    }

    /// List a customer's saved payment methods, normalized.
    pub async fn list_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethodSummary>, ProviderError> {
        let response = send_with_retry(
            self.http
                .get(format!("{}/customers/{}/payment_methods", API_BASE, customer_id))
                .bearer_auth(&self.secret_key),
            &RetryPolicy::default(),
        )
        .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }
        let list: PaymentMethodList = response
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;
        Ok(list.data.into_iter().map(summarize).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_card() {
        let json = r#"{
            "id": "pm_1",
            "type": "card",
            "card": { "brand": "visa", "last4": "4242", "exp_month": 4, "exp_year": 2028 }
        }"#;
        let method: PaymentMethod = serde_json::from_str(json).expect("parse");
        let summary = summarize(method);
        assert_eq!(summary.kind, "card");
        assert_eq!(summary.label, "visa");
        assert_eq!(summary.last4, "4242");
        assert_eq!(summary.expires.as_deref(), Some("04/2028"));
    }

    #[test]
    fn test_summarize_bank_account() {
        let json = r#"{
            "id": "pm_2",
            "type": "us_bank_account",
            "us_bank_account": { "bank_name": "STRIPE TEST BANK", "last4": "6789" }
        }"#;
        let method: PaymentMethod = serde_json::from_str(json).expect("parse");
        let summary = summarize(method);
        assert_eq!(summary.kind, "us_bank_account");
        assert_eq!(summary.label, "STRIPE TEST BANK");
        assert!(summary.expires.is_none());
    }

    #[test]
    fn test_checkout_session_shape() {
        let session: CheckoutSession = serde_json::from_str(
            r#"{"id":"cs_test_1","url":"https://checkout.stripe.com/c/pay/cs_test_1"}"#,
        )
        .expect("parse");
        assert!(session.url.expect("url").starts_with("https://checkout.stripe.com"));
    }
}
