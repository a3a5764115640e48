//! Single-flight memoization.
//!
//! A [`Promise`] runs its computation at most once at a time, shares the
//! outcome with every waiter, and forgets cancelled runs so the next caller
//! retries. A [`Store`] deduplicates promises by key while holding only weak
//! references: an entry lives exactly as long as some snapshot or caller
//! keeps its promise.

mod error;
mod promise;
mod store;

pub use error::PromiseError;
pub use promise::Promise;
pub use store::Store;
