//! Reference product catalog and its loader.

mod loader;
mod product_catalog;

pub use loader::load_catalog;
pub use product_catalog::Catalog;
