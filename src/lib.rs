pub mod accounts;
pub mod config;
pub mod emojis;
pub mod error;
pub mod extractor;
pub mod folders;
pub mod generation;
pub mod ledger;
pub mod likes;
pub mod payments;
pub mod routes;
pub mod webhooks;
