//! WebDAV / CardDAV clients for Roster.
//!
//! [`CardDavClient`] implements [`roster_core::collection::RemoteCollection`]
//! for one address book; [`WebDavStorage`] implements
//! [`roster_core::storage::PictureStorage`] on a Nextcloud file tree. Both
//! bound their own concurrency and retry idempotent requests.

pub mod carddav;
pub mod error;
pub mod storage;
pub mod transport;
pub mod xml;

pub use carddav::{CardDavClient, CardDavConfig};
pub use error::{Error, Result};
pub use storage::{StorageConfig, WebDavStorage};
pub use transport::RetryPolicy;

#[cfg(test)]
mod tests;
