use serde_json::Value;

/// Metadata we attach to checkout sessions and subscriptions at creation time
/// and read back from webhook payloads. Fields are optional here; the
/// processor decides which ones are required for which event kind.
#[derive(Debug, Clone, Default)]
pub struct EventMetadata {
    pub user_id: Option<String>,
    pub tier: Option<String>,
}

impl EventMetadata {
    fn from_value(value: &Value) -> Self {
        Self {
            user_id: string_field(value, "userId"),
            tier: string_field(value, "tier"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    /// Payment intent for one-time purchases, subscription id for new
    /// subscriptions. The unique external reference used as idempotency key.
    pub payment_ref: Option<String>,
    pub customer_ref: Option<String>,
    pub subscription_ref: Option<String>,
    pub amount_cents: i32,
    pub metadata: EventMetadata,
}

#[derive(Debug, Clone)]
pub struct InvoicePayment {
    pub invoice_id: String,
    pub payment_ref: Option<String>,
    pub customer_ref: Option<String>,
    pub subscription_ref: Option<String>,
    pub billing_reason: Option<String>,
    pub amount_cents: i32,
    pub metadata: EventMetadata,
}

#[derive(Debug, Clone)]
pub struct SubscriptionState {
    pub subscription_ref: String,
    pub status: Option<String>,
    pub metadata: EventMetadata,
}

/// Tagged view over the payment processor's webhook envelope. Parsing is
/// lenient (fields the processor requires are validated there); only the
/// event kind dispatch is decided here, with an explicit catch-all so new
/// provider event kinds are a forward-compatible no-op.
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    CheckoutCompleted(CheckoutSession),
    InvoicePaid(InvoicePayment),
    SubscriptionDeleted(SubscriptionState),
    SubscriptionUpdated(SubscriptionState),
    Unknown(String),
}

impl PaymentEvent {
    pub fn from_payload(payload: &Value) -> Self {
        let kind = payload
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let object = &payload["data"]["object"];

        match kind {
            "checkout.session.completed" => PaymentEvent::CheckoutCompleted(CheckoutSession {
                session_id: string_field(object, "id").unwrap_or_default(),
                payment_ref: string_field(object, "payment_intent")
                    .or_else(|| string_field(object, "subscription")),
                customer_ref: string_field(object, "customer"),
                subscription_ref: string_field(object, "subscription"),
                amount_cents: int_field(object, "amount_total"),
                metadata: EventMetadata::from_value(&object["metadata"]),
            }),
            "invoice.paid" => PaymentEvent::InvoicePaid(InvoicePayment {
                invoice_id: string_field(object, "id").unwrap_or_default(),
                payment_ref: string_field(object, "payment_intent"),
                customer_ref: string_field(object, "customer"),
                subscription_ref: string_field(object, "subscription"),
                billing_reason: string_field(object, "billing_reason"),
                amount_cents: int_field(object, "amount_paid"),
                // Renewal invoices carry the subscription's metadata under
                // subscription_details; fall back to invoice-level metadata.
                metadata: {
                    let details = EventMetadata::from_value(&object["subscription_details"]["metadata"]);
                    if details.user_id.is_some() {
                        details
                    } else {
                        EventMetadata::from_value(&object["metadata"])
                    }
                },
            }),
            "customer.subscription.deleted" => {
                PaymentEvent::SubscriptionDeleted(subscription_state(object))
            }
            "customer.subscription.updated" => {
                PaymentEvent::SubscriptionUpdated(subscription_state(object))
            }
            other => PaymentEvent::Unknown(other.to_string()),
        }
    }
}

fn subscription_state(object: &Value) -> SubscriptionState {
    SubscriptionState {
        subscription_ref: string_field(object, "id").unwrap_or_default(),
        status: string_field(object, "status"),
        metadata: EventMetadata::from_value(&object["metadata"]),
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn int_field(value: &Value, key: &str) -> i32 {
    value.get(key).and_then(|v| v.as_i64()).unwrap_or(0) as i32
}
