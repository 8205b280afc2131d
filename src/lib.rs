//! Client-side state synchronization for a social activity feed.
//!
//! A [`Dispatcher`] owns the canonical [`FeedState`]. User intents become an
//! optimistic transition plus background [`Gateway`] calls; each settlement
//! flows back through the pure [`reduce`](store::reduce) function.

pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod model;
pub mod notify;
pub mod storage;
pub mod store;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use gateway::{Gateway, GatewayError, HttpGateway};
pub use store::FeedState;
