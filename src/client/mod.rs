//! Client-side state for a front end talking to the relay.
//!
//! Nothing here runs inside the relay process. The types mirror what the
//! browser keeps: the signed-in profile, the cart, and a timer that refreshes
//! the session before the access token runs out.

pub mod cart;
pub mod keepalive;
pub mod session;
pub mod store;

pub use cart::{Cart, CartItem};
pub use session::{ClientError, Credentials, Profile, SessionClient};
pub use store::{JsonFilePersistence, MemoryPersistence, Persistence, Store, StoreError};
