use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::Tier;
use crate::billing::plans::{plan_for, plans, Plan};
use crate::billing::stripe::{CheckoutSession, StripeClient};
use crate::billing::webhook::{
    verify_signature, CheckoutSessionObject, InvoiceObject, SubscriptionObject, WebhookEvent,
};
use crate::db::{Payment, PaymentStore, SubscriptionChange, SubscriptionStatus, User, UserStore};
use crate::error::AppError;
use crate::Result;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookOutcome {
    pub event_type: String,
    /// False for ignored, unmatched and replayed events.
    pub handled: bool,
}

impl WebhookOutcome {
    fn handled(event: &WebhookEvent) -> Self {
        Self { event_type: event.kind().to_string(), handled: true }
    }

    fn ignored(event: &WebhookEvent) -> Self {
        Self { event_type: event.kind().to_string(), handled: false }
    }
}

pub struct BillingService {
    users: Arc<dyn UserStore>,
    payments: Arc<dyn PaymentStore>,
    stripe: StripeClient,
    webhook_secret: String,
}

impl BillingService {
    pub fn new(
        users: Arc<dyn UserStore>,
        payments: Arc<dyn PaymentStore>,
        stripe: StripeClient,
        webhook_secret: String,
    ) -> Self {
        Self { users, payments, stripe, webhook_secret }
    }

    pub fn plans(&self) -> Vec<Plan> {
        plans()
    }

    pub async fn subscribe(&self, user: &User, tier: Tier) -> Result<CheckoutSession> {
        let plan = plan_for(tier)
            .ok_or_else(|| AppError::ValidationError("The free plan does not require checkout".into()))?;

        if user.tier() == tier && user.subscription_status == SubscriptionStatus::Active.as_str() {
            return Err(AppError::ValidationError(format!("Already subscribed to the {} plan", tier)));
        }

        self.stripe.create_checkout_session(user, &plan).await
    }

    /// Cancels the recurring subscription with the provider. The tier stays
    /// until the provider confirms the deletion through the webhook.
    pub async fn cancel(&self, user: &User) -> Result<()> {
        let subscription_id = user
            .stripe_subscription_id
            .as_deref()
            .filter(|_| user.tier().resets_monthly() && user.tier() != Tier::Free)
            .ok_or_else(|| AppError::ValidationError("No active recurring subscription".into()))?;

        self.stripe.cancel_subscription(subscription_id).await?;

        self.users
            .update_subscription(
                user.id,
                &SubscriptionChange {
                    tier: user.tier(),
                    status: SubscriptionStatus::Cancelled,
                    stripe_customer_id: None,
                    stripe_subscription_id: None,
                    reset_usage: false,
                },
            )
            .await?;

        info!(user_id = %user.id, tier = %user.tier(), "Subscription cancellation requested");
        Ok(())
    }

    pub async fn history(&self, user_id: Uuid) -> Result<Vec<Payment>> {
        self.payments.payments_for_user(user_id).await
    }

    /// Verifies (when a secret is configured), decodes and applies one event.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> Result<WebhookOutcome> {
        if !self.webhook_secret.is_empty() {
            let header = signature
                .ok_or_else(|| AppError::ValidationError("Missing webhook signature".into()))?;
            verify_signature(payload, header, &self.webhook_secret, now)?;
        }

        let event = WebhookEvent::parse(payload)?;
        let handled = match &event {
            WebhookEvent::CheckoutCompleted(session) => self.checkout_completed(session).await?,
            WebhookEvent::InvoicePaid(invoice) => self.invoice_paid(invoice).await?,
            WebhookEvent::SubscriptionDeleted(subscription) => self.subscription_deleted(subscription).await?,
            WebhookEvent::Other(kind) => {
                info!(event_type = %kind, "Ignoring webhook event");
                false
            }
        };

        Ok(if handled { WebhookOutcome::handled(&event) } else { WebhookOutcome::ignored(&event) })
    }

    /// Records the payment and applies `change` together. Returns false if
    /// the payment was already recorded.
    async fn apply(&self, payment: Payment, change: SubscriptionChange) -> Result<bool> {
        let fresh = self.payments.apply_payment(&payment, &change).await?;
        if !fresh {
            info!(payment_id = ?payment.stripe_payment_id, "Webhook payment already recorded");
        }
        Ok(fresh)
    }

    async fn checkout_completed(&self, session: &CheckoutSessionObject) -> Result<bool> {
        let user_id = session
            .metadata
            .get("user_id")
            .or(session.client_reference_id.as_ref())
            .and_then(|id| Uuid::parse_str(id).ok());
        let tier = session.metadata.get("tier").and_then(|t| Tier::parse(t));

        let (Some(user_id), Some(tier)) = (user_id, tier) else {
            warn!(session_id = %session.id, "Checkout session without user or tier metadata");
            return Ok(false);
        };
        let Some(user) = self.users.get_user_by_id(user_id).await? else {
            warn!(session_id = %session.id, %user_id, "Checkout session for unknown user");
            return Ok(false);
        };

        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: user.id,
            amount_cents: session.amount_total.unwrap_or_default(),
            currency: session.currency.clone().unwrap_or_else(|| "usd".into()),
            status: "succeeded".into(),
            stripe_payment_id: Some(session.id.clone()),
            stripe_invoice_id: None,
            subscription_tier: Some(tier.as_str().to_string()),
            description: Some(format!("{} plan checkout", tier)),
            created_at: Utc::now(),
        };
        let change = SubscriptionChange {
            tier,
            status: SubscriptionStatus::Active,
            stripe_customer_id: session.customer.clone(),
            stripe_subscription_id: session.subscription.clone(),
            reset_usage: true,
        };
        if !self.apply(payment, change).await? {
            return Ok(false);
        }

        info!(user_id = %user.id, from = %user.tier(), to = %tier, "Subscription activated");
        Ok(true)
    }

    async fn invoice_paid(&self, invoice: &InvoiceObject) -> Result<bool> {
        // The first invoice of a subscription is already covered by its
        // checkout session.
        if invoice.billing_reason.as_deref() == Some("subscription_create") {
            return Ok(false);
        }

        let Some(user) = self.user_for_customer(invoice.customer.as_deref()).await? else {
            warn!(invoice_id = %invoice.id, "Invoice for unknown customer");
            return Ok(false);
        };

        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: user.id,
            amount_cents: invoice.amount_paid,
            currency: invoice.currency.clone(),
            status: "succeeded".into(),
            stripe_payment_id: Some(invoice.payment_intent.clone().unwrap_or_else(|| invoice.id.clone())),
            stripe_invoice_id: Some(invoice.id.clone()),
            subscription_tier: Some(user.subscription_tier.clone()),
            description: Some(format!("{} plan renewal", user.tier())),
            created_at: Utc::now(),
        };
        let change = SubscriptionChange {
            tier: user.tier(),
            status: SubscriptionStatus::Active,
            stripe_customer_id: None,
            stripe_subscription_id: invoice.subscription.clone(),
            reset_usage: false,
        };
        if !self.apply(payment, change).await? {
            return Ok(false);
        }

        info!(user_id = %user.id, invoice_id = %invoice.id, "Invoice paid");
        Ok(true)
    }

    async fn subscription_deleted(&self, subscription: &SubscriptionObject) -> Result<bool> {
        let Some(user) = self.user_for_customer(subscription.customer.as_deref()).await? else {
            warn!(subscription_id = %subscription.id, "Subscription deletion for unknown customer");
            return Ok(false);
        };

        // A replaced subscription ending must not touch the current one.
        if user.stripe_subscription_id.as_deref() != Some(subscription.id.as_str()) {
            info!(
                user_id = %user.id,
                subscription_id = %subscription.id,
                current = ?user.stripe_subscription_id,
                "Ignoring deletion of a subscription the user no longer holds"
            );
            return Ok(false);
        }

        self.users
            .update_subscription(
                user.id,
                &SubscriptionChange {
                    tier: Tier::Free,
                    status: SubscriptionStatus::Cancelled,
                    stripe_customer_id: None,
                    stripe_subscription_id: None,
                    reset_usage: false,
                },
            )
            .await?;

        info!(user_id = %user.id, from = %user.tier(), "Subscription ended, downgraded to free");
        Ok(true)
    }

    async fn user_for_customer(&self, customer: Option<&str>) -> Result<Option<User>> {
        match customer {
            Some(customer) => self.users.get_user_by_stripe_customer(customer).await,
            None => Ok(None),
        }
    }
}
