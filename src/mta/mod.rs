pub mod client;
pub mod feeds;
pub mod index;
pub mod proto;
pub mod reconcile;
