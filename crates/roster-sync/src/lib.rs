//! The Roster reconciliation engine.
//!
//! - [`merger`] copies contacts from source address books into targets,
//!   writing only what changed.
//! - [`enricher`] adds extra numbers, emails and stored pictures to contacts
//!   on their way through the merger.
//! - [`injector`] puts crawled profile pictures into matching contacts.
//! - [`library`] and [`uploader`] maintain the content-addressed picture
//!   store and its index document.
//!
//! Everything here is written against the `roster-core` traits; concrete
//! clients live in `roster-dav` and `roster-crawl`.

pub mod enricher;
pub mod error;
pub mod injector;
pub mod library;
pub mod merger;
pub mod uploader;

pub use self::{
  enricher::{Enrich, Enricher},
  error::{Error, Result},
  injector::{InjectionMethod, InjectionReport, InjectionSummary, Injector},
  library::{PictureLibrary, UpdateReport},
  merger::{ComparisonMode, MergeReport, Merger},
  uploader::Uploader,
};
