//! Route handlers for the relay.
//!
//! `auth` and `proxy` talk to the gateway, `pages` sits behind the route guard,
//! and `health` reports service metadata.

pub mod auth;
pub mod health;
pub mod pages;
pub mod proxy;
pub mod types;
