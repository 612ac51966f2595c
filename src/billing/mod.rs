//! Pricing plans, Stripe checkout and the subscription webhook.

pub mod handlers;
mod plans;
mod service;
mod stripe;
mod webhook;

pub use plans::{plan_for, plans, BillingInterval, Plan};
pub use service::{BillingService, WebhookOutcome};
pub use stripe::{CheckoutSession, StripeClient};
pub use webhook::{signature_header, verify_signature, WebhookEvent, SIGNATURE_TOLERANCE_SECS};
