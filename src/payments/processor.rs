use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::config;
use crate::ledger::{
    CreditLedgerService, LedgerError, NewPaymentEvent, PricingTier, UnknownTier,
};

use super::events::{CheckoutSession, InvoicePayment, PaymentEvent, SubscriptionState};

#[derive(Debug, Error)]
pub enum PaymentEventError {
    #[error("event is missing required metadata: {0}")]
    MissingMetadata(&'static str),
    #[error(transparent)]
    UnknownTier(#[from] UnknownTier),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Discriminated outcome for a processed event. A redelivered duplicate is
/// success, not an error.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    Granted { user_id: String, credits: i32, balance: i32 },
    AlreadyProcessed,
    Ignored,
    SubscriptionSynced,
}

/// Turns verified payment notifications into ledger grants, exactly once per
/// distinct external payment reference.
pub struct PaymentEventProcessor {
    ledger: CreditLedgerService,
}

impl PaymentEventProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger: CreditLedgerService::new(pool),
        }
    }

    pub async fn process(&self, event: PaymentEvent) -> Result<ProcessOutcome, PaymentEventError> {
        match event {
            PaymentEvent::CheckoutCompleted(session) => self.checkout_completed(session).await,
            PaymentEvent::InvoicePaid(invoice) => self.invoice_paid(invoice).await,
            PaymentEvent::SubscriptionDeleted(state) => {
                self.subscription_deleted(state).await
            }
            PaymentEvent::SubscriptionUpdated(state) => {
                self.subscription_updated(state).await
            }
            PaymentEvent::Unknown(kind) => {
                info!(kind, "ignoring unhandled payment event kind");
                Ok(ProcessOutcome::Ignored)
            }
        }
    }

    async fn checkout_completed(
        &self,
        session: CheckoutSession,
    ) -> Result<ProcessOutcome, PaymentEventError> {
        let user_id = session
            .metadata
            .user_id
            .ok_or(PaymentEventError::MissingMetadata("userId"))?;
        let tier_label = session
            .metadata
            .tier
            .ok_or(PaymentEventError::MissingMetadata("tier"))?;
        // Entitlement resolution happens before the idempotency insert: a bad
        // tier must not leave a record behind, or a corrected redelivery could
        // never be applied.
        let tier = PricingTier::parse(&tier_label)?;
        let payment_ref = session
            .payment_ref
            .ok_or(PaymentEventError::MissingMetadata("payment reference"))?;

        let store = self.ledger.store();
        store.create_account(&user_id, *config::TRIAL_CREDITS).await?;
        if let Some(customer) = session.customer_ref.as_deref() {
            store.set_payment_customer_ref(&user_id, customer).await?;
        }

        let grant = self
            .apply_grant(
                &user_id,
                tier,
                &payment_ref,
                session.customer_ref.as_deref(),
                session.amount_cents,
                session.subscription_ref.as_deref(),
            )
            .await?;
        let Some(balance) = grant else {
            info!(%user_id, payment_ref, "checkout session already processed");
            return Ok(ProcessOutcome::AlreadyProcessed);
        };

        store.set_tier(&user_id, "paid").await?;
        if tier.is_recurring() {
            store
                .set_subscription_state(&user_id, "active", session.subscription_ref.as_deref())
                .await?;
        }

        info!(
            %user_id,
            tier = tier.as_str(),
            credits = tier.credits(),
            balance,
            "checkout completed; credits granted"
        );
        Ok(ProcessOutcome::Granted {
            user_id,
            credits: tier.credits(),
            balance,
        })
    }

    async fn invoice_paid(
        &self,
        invoice: InvoicePayment,
    ) -> Result<ProcessOutcome, PaymentEventError> {
        // The first invoice of a new subscription is covered by the
        // checkout-completed grant; only renewals grant again.
        if invoice.billing_reason.as_deref() == Some("subscription_create") {
            info!(invoice = invoice.invoice_id, "first subscription invoice; grant already covered by checkout");
            return Ok(ProcessOutcome::Ignored);
        }

        let user_id = invoice
            .metadata
            .user_id
            .ok_or(PaymentEventError::MissingMetadata("userId"))?;
        let tier = match invoice.metadata.tier.as_deref() {
            Some(label) => PricingTier::parse(label)?,
            None => PricingTier::ProMonthly,
        };
        let payment_ref = invoice
            .payment_ref
            .ok_or(PaymentEventError::MissingMetadata("payment reference"))?;

        let store = self.ledger.store();
        store.create_account(&user_id, *config::TRIAL_CREDITS).await?;

        let grant = self
            .apply_grant(
                &user_id,
                tier,
                &payment_ref,
                invoice.customer_ref.as_deref(),
                invoice.amount_cents,
                invoice.subscription_ref.as_deref(),
            )
            .await?;
        let Some(balance) = grant else {
            info!(%user_id, payment_ref, "renewal invoice already processed");
            return Ok(ProcessOutcome::AlreadyProcessed);
        };

        store
            .set_subscription_state(&user_id, "active", invoice.subscription_ref.as_deref())
            .await?;

        info!(%user_id, credits = tier.credits(), balance, "subscription renewal credited");
        Ok(ProcessOutcome::Granted {
            user_id,
            credits: tier.credits(),
            balance,
        })
    }

    async fn subscription_deleted(
        &self,
        state: SubscriptionState,
    ) -> Result<ProcessOutcome, PaymentEventError> {
        let Some(user_id) = state.metadata.user_id else {
            warn!(
                subscription = state.subscription_ref,
                "subscription deletion without userId metadata; skipping"
            );
            return Ok(ProcessOutcome::Ignored);
        };
        self.ledger
            .store()
            .set_subscription_state(&user_id, "cancelled", None)
            .await?;
        info!(%user_id, subscription = state.subscription_ref, "subscription cancelled");
        Ok(ProcessOutcome::SubscriptionSynced)
    }

    async fn subscription_updated(
        &self,
        state: SubscriptionState,
    ) -> Result<ProcessOutcome, PaymentEventError> {
        let Some(user_id) = state.metadata.user_id else {
            return Ok(ProcessOutcome::Ignored);
        };
        let status = match state.status.as_deref() {
            Some("canceled") => "cancelled",
            Some("unpaid") | Some("past_due") => "expired",
            _ => "active",
        };
        self.ledger
            .store()
            .set_subscription_state(&user_id, status, Some(state.subscription_ref.as_str()))
            .await?;
        info!(%user_id, status, subscription = state.subscription_ref, "subscription state synced");
        Ok(ProcessOutcome::SubscriptionSynced)
    }

    /// Idempotency gate plus grant, kept adjacent so the race window between
    /// the two is as small as possible. Returns the new balance, or `None`
    /// when the payment reference was already recorded.
    async fn apply_grant(
        &self,
        user_id: &str,
        tier: PricingTier,
        payment_ref: &str,
        customer_ref: Option<&str>,
        amount_cents: i32,
        subscription_ref: Option<&str>,
    ) -> Result<Option<i32>, PaymentEventError> {
        let inserted = self
            .ledger
            .store()
            .insert_payment_event_if_absent(&NewPaymentEvent {
                payment_ref: payment_ref.to_string(),
                customer_ref: customer_ref.map(|s| s.to_string()),
                tier: tier.as_str().to_string(),
                amount_cents,
                credits_granted: tier.credits(),
            })
            .await?;
        if !inserted {
            return Ok(None);
        }

        let balance = self
            .ledger
            .grant(
                user_id,
                tier.credits(),
                tier.grant_category(),
                Some(payment_ref),
                subscription_ref,
            )
            .await?;
        Ok(Some(balance))
    }
}
