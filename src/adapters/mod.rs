pub mod api_errors;
pub mod auth;
pub mod checkout;
pub mod origin;
pub mod stripe_client;
pub mod stripe_webhook;
pub mod timeout;
pub mod verifier;
