//! Crawl loop: discovery, filtering, dispatch, and fault handling
//!
//! The [`Harvester`] ties the primary session, the worker pool, and the
//! dedup index together and cycles through the [`CrawlPhase`] states until
//! shut down.

mod discovery;
mod fault;
mod harvester;
mod phase;

pub use discovery::{item_id_from_url, Item};
pub use fault::{classify, FaultKind};
pub use harvester::Harvester;
pub use phase::CrawlPhase;
