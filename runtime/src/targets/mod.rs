//! Target-list resolution: literal URLs plus sitemap locations, sorted and deduplicated.

pub mod resolver;
pub mod sitemap;

pub use resolver::{SitemapLocation, SitemapSource, TargetList, TargetResolver};
