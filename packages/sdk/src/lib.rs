//! Client SDK for persisting files to a Cumulus store.
//!
//! A [`PersistedFile`] carries immutable content, a name and an optional owner.
//! It can be mirrored to local disk or uploaded to a [`FileStore`], either at
//! app scope or on behalf of a [`User`]. Uploads and removals return a
//! [`Ticket`] that resolves once the store answers.

pub mod client;
pub mod config;
pub mod error;
pub mod file;
pub mod filename;
pub mod ids;
pub mod membership;
pub mod ownership;
pub mod store;
pub mod ticket;
pub mod user;

pub use client::Client;
pub use config::SdkConfig;
pub use error::{Result, SdkError};
pub use file::{PersistedFile, WriteOptions};
pub use ids::{FileId, StoreId};
pub use membership::Membership;
pub use ownership::{OwnershipLevel, Scope};
pub use store::{FileStore, Store, StoredObject, UploadReceipt};
pub use ticket::Ticket;
pub use user::{User, UserId};
