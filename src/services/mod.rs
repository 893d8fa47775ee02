pub mod checkout;
pub mod customers;
pub mod dispatch;
pub mod documents;
pub mod hooks;
pub mod inbound;
pub mod locks;
pub mod orders;
pub mod retry;
