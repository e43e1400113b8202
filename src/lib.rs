//! Client-side catalog and media-session core for the Thelden streaming
//! app: session, catalog, saved lists, and the simulated download and
//! ingestion pipelines.

pub mod app;
pub mod chat;
pub mod config;
pub mod error;
pub mod library;
pub mod session;
pub mod transfer;

pub use app::App;
pub use error::{Error, Result};
