//! Storage
//!
//! The shared in-memory store and its expiry machinery.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                    Store                      │
//! │              RwLock<Tables>                   │
//! │  strings │ expirations │ lists │ sets         │
//! └───────────────────────────────────────────────┘
//!        ▲                        ▲
//!        │ commands               │ fixed-interval sweep
//!  connection tasks          Sweeper (tokio task)
//! ```
//!
//! All keyed state lives behind one reader/writer lock; see [`store`] for
//! the locking discipline and [`expiry`] for the background sweep.

pub mod expiry;
pub mod store;

pub use expiry::{start_sweeper, SweepConfig, Sweeper};
pub use store::{Store, StoreError};
