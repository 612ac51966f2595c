use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::billing::plans::Plan;
use crate::config::BillingConfig;
use crate::db::User;
use crate::error::{AppError, UpstreamError};
use crate::Result;

const SERVICE: &str = "Payments";
const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// Minimal Stripe REST client: hosted checkout and subscription cancellation.
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
    success_url: String,
    cancel_url: String,
}

impl StripeClient {
    pub fn new(config: &BillingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build Stripe HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.stripe_secret_key.clone(),
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.secret_key.is_empty()
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(UpstreamError::Unavailable(SERVICE.into()).into())
        }
    }

    /// Form fields for a hosted checkout session. The user id and tier ride
    /// along as metadata so the webhook can apply the purchase.
    pub fn checkout_form(&self, user: &User, plan: &Plan) -> Vec<(String, String)> {
        let mode = if plan.is_recurring() { "subscription" } else { "payment" };
        let mut form = vec![
            ("mode".to_string(), mode.to_string()),
            ("success_url".to_string(), format!("{}?session_id={{CHECKOUT_SESSION_ID}}", self.success_url)),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            ("client_reference_id".to_string(), user.id.to_string()),
            ("metadata[user_id]".to_string(), user.id.to_string()),
            ("metadata[tier]".to_string(), plan.tier.as_str().to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("line_items[0][price_data][currency]".to_string(), plan.currency.to_string()),
            ("line_items[0][price_data][unit_amount]".to_string(), plan.price_cents.to_string()),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                format!("PMBlueprints {}", plan.name),
            ),
        ];

        if plan.is_recurring() {
            form.push(("line_items[0][price_data][recurring][interval]".to_string(), "month".to_string()));
            form.push(("subscription_data[metadata][user_id]".to_string(), user.id.to_string()));
            form.push(("subscription_data[metadata][tier]".to_string(), plan.tier.as_str().to_string()));
        }

        match &user.stripe_customer_id {
            Some(customer) => form.push(("customer".to_string(), customer.clone())),
            None => form.push(("customer_email".to_string(), user.email.clone())),
        }

        form
    }

    pub async fn create_checkout_session(&self, user: &User, plan: &Plan) -> Result<CheckoutSession> {
        self.ensure_configured()?;

        let res = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&self.checkout_form(user, plan))
            .send()
            .await?;

        let res = check_status(res).await?;
        let session: CheckoutSession = res.json().await.map_err(|e| {
            warn!(error = %e, "Unreadable checkout session response");
            UpstreamError::RequestFailed(e.to_string())
        })?;

        info!(user_id = %user.id, tier = %plan.tier, session_id = %session.id, "Checkout session created");
        Ok(session)
    }

    pub async fn cancel_subscription(&self, subscription_id: &str) -> Result<()> {
        self.ensure_configured()?;

        let res = self
            .http
            .delete(format!("{}/v1/subscriptions/{}", self.api_base, subscription_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        check_status(res).await?;
        info!(subscription_id, "Subscription cancelled with payment provider");
        Ok(())
    }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response> {
    let status = res.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!("Payment provider rate limited the request");
        return Err(UpstreamError::RateLimited(SERVICE.into()).into());
    }
    if !status.is_success() {
        let detail = res.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %detail, "Payment provider returned an error");
        return Err(UpstreamError::BadStatus { service: SERVICE.into(), status: status.as_u16() }.into());
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Tier;
    use crate::billing::plans::plan_for;
    use crate::config::Settings;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(api_base: &str, key: &str) -> StripeClient {
        let mut config = Settings::new_for_test().unwrap().billing;
        config.api_base = api_base.to_string();
        config.stripe_secret_key = key.to_string();
        StripeClient::new(&config).unwrap()
    }

    #[test]
    fn one_time_plans_use_payment_mode() {
        let stripe = client("http://localhost", "sk_test");
        let user = User::new("buyer@example.com".into(), None);

        let form = stripe.checkout_form(&user, &plan_for(Tier::Individual).unwrap());
        assert!(form.contains(&("mode".to_string(), "payment".to_string())));
        assert!(form.contains(&("customer_email".to_string(), "buyer@example.com".to_string())));
        assert!(!form.iter().any(|(k, _)| k.contains("recurring")));

        let form = stripe.checkout_form(&user, &plan_for(Tier::Enterprise).unwrap());
        assert!(form.contains(&("mode".to_string(), "subscription".to_string())));
        assert!(form.contains(&("line_items[0][price_data][unit_amount]".to_string(), "15000".to_string())));
    }

    #[tokio::test]
    async fn creates_checkout_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("authorization", "Bearer sk_test"))
            .and(body_string_contains("metadata%5Btier%5D=professional"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_test_1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let stripe = client(&server.uri(), "sk_test");
        let user = User::new("pro@example.com".into(), None);
        let session = stripe
            .create_checkout_session(&user, &plan_for(Tier::Professional).unwrap())
            .await
            .unwrap();

        assert_eq!(session.id, "cs_test_1");
        assert!(session.url.unwrap().contains("cs_test_1"));
    }

    #[tokio::test]
    async fn provider_errors_are_upstream_failures() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/subscriptions/sub_1"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"error\":{\"message\":\"No such subscription\"}}"))
            .mount(&server)
            .await;

        let stripe = client(&server.uri(), "sk_test");
        let err = stripe.cancel_subscription("sub_1").await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamError(UpstreamError::BadStatus { status: 404, .. })));
    }

    #[tokio::test]
    async fn missing_key_is_unavailable() {
        let stripe = client("http://localhost", "");
        let user = User::new("a@example.com".into(), None);
        let err = stripe
            .create_checkout_session(&user, &plan_for(Tier::Professional).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamError(UpstreamError::Unavailable(_))));
    }
}
