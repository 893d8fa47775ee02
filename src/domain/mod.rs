pub mod audit;
pub mod error;
pub mod event;
pub mod id;
pub mod money;
pub mod order;
pub mod outcome;
pub mod platform;
pub mod price;
pub mod product;
pub mod sync;
pub mod user;
