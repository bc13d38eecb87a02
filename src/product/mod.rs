//! Product/category resolution: keyword rules first, generative fallback last.

pub mod catalog;
pub mod resolver;

pub use catalog::{ProductCatalog, ProductEntry, DEFAULT_PRIORITY};
pub use resolver::ProductResolver;

use serde::Serialize;

pub const UNCATEGORIZED: &str = "Uncategorized";

/// How a [`ProductMatch`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedVia {
    Rule,
    Generative,
    #[serde(rename = "none")]
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductMatch {
    pub category: String,
    pub product: String,
    pub resolved_via: ResolvedVia,
}

impl ProductMatch {
    pub fn uncategorized() -> Self {
        Self {
            category: UNCATEGORIZED.to_string(),
            product: UNCATEGORIZED.to_string(),
            resolved_via: ResolvedVia::Unresolved,
        }
    }

    fn from_entry(entry: &ProductEntry) -> Self {
        Self {
            category: entry.category.clone(),
            product: entry.product.clone(),
            resolved_via: ResolvedVia::Rule,
        }
    }
}
