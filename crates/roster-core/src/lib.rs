//! Core types and trait definitions for Roster.
//!
//! Nothing here speaks HTTP or spawns processes. The reconciliation engine
//! in `roster-sync` is written against the traits defined here;
//! `roster-dav` and `roster-crawl` provide the implementations.

// Generic seams use native `async fn` in traits; the ones used as trait
// objects go through `async_trait`.
#![allow(async_fn_in_trait)]

pub mod collection;
pub mod crawl;
pub mod entity;
pub mod error;
pub mod identity;
pub mod memory;
pub mod phone;
pub mod picture;
pub mod resource;
pub mod storage;

pub use error::{BoxError, Error, Result};
pub use phone::CanonicalPhone;
