//! External catalog collaborator.
//!
//! The catalog resolves a (group, subgroup) selection into the concrete
//! files to download. Everything behind [`Catalog`] (scraping, caching,
//! upstream layout) belongs to the collaborator; the orchestrator only
//! consumes the enumeration contract and treats failures as per-subgroup
//! soft errors.

mod http;
mod types;

pub use http::HttpCatalog;
pub use types::{Catalog, CatalogError, CatalogFile};
