//! Profile picture crawlers: a local directory, Signal Desktop avatars, and
//! Telegram contacts behind a pluggable session.

pub mod config;
pub mod directory;
pub mod error;
pub mod mime;
pub mod signal;
pub mod telegram;

pub use self::{
  config::CrawlerConfig,
  directory::{DirectoryCrawler, DirectoryCrawlerConfig},
  error::{Error, Result},
  signal::{SignalCrawler, SignalCrawlerConfig},
  telegram::{Download, TelegramContact, TelegramCrawler, TelegramSession},
};
