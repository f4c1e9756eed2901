pub mod api;
pub mod checkout;
pub mod events;
pub mod processor;
pub mod signature;

pub use checkout::PaymentProviderClient;
pub use events::{CheckoutSession, EventMetadata, InvoicePayment, PaymentEvent, SubscriptionState};
pub use processor::{PaymentEventError, PaymentEventProcessor, ProcessOutcome};
pub use signature::{verify_identity_signature, verify_payment_signature, SignatureError};
