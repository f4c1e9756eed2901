pub mod entitlement;
pub mod models;
pub mod service;
pub mod store;

pub use entitlement::{PricingTier, UnknownTier, TRIAL_GRANT_CATEGORY};
pub use models::{Account, CreditGrant, LedgerError, NewPaymentEvent, PaymentEventRecord};
pub use service::CreditLedgerService;
pub use store::LedgerStore;
