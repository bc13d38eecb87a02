use anyhow::{anyhow, Context, Result};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("../../config/products.toml");

/// Search order used when a catalog file has no `priority` list.
/// Narrow products come before the broad ones whose keywords they share.
pub const DEFAULT_PRIORITY: &[(&str, &str)] = &[
    ("Data Analytics", "BigQuery Migration"),
    ("Data Analytics", "BigQuery Data Transfer"),
    ("Data Analytics", "BigQuery Reservation"),
    ("Data Analytics", "BigQuery Connection"),
    ("Databases", "Cloud SQL"),
    ("Storage", "Storage Transfer Service"),
    ("Storage", "Storage Insights"),
    ("Storage", "Storage Control"),
    ("AI and Machine Learning", "Vertex AI Search"),
];

#[derive(Debug, Deserialize)]
struct CatalogFile {
    schema_version: u32,
    #[serde(default)]
    priority: Option<Vec<(String, String)>>,
    #[serde(default, rename = "category")]
    categories: Vec<CategorySpec>,
}

#[derive(Debug, Deserialize)]
struct CategorySpec {
    name: String,
    #[serde(default, rename = "product")]
    products: Vec<ProductSpec>,
}

#[derive(Debug, Deserialize)]
struct ProductSpec {
    name: String,
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Debug)]
enum KeywordMatcher {
    Pattern(Regex),
    /// Lower-cased literal for keywords that do not compile as a regex.
    Literal(String),
}

impl KeywordMatcher {
    fn compile(keyword: &str) -> Self {
        match RegexBuilder::new(keyword).case_insensitive(true).build() {
            Ok(re) => KeywordMatcher::Pattern(re),
            Err(err) => {
                tracing::debug!(
                    keyword,
                    error = %err,
                    "keyword is not a valid pattern; matching as text"
                );
                KeywordMatcher::Literal(keyword.to_lowercase())
            }
        }
    }

    fn is_match(&self, haystack: &str, haystack_lower: &str) -> bool {
        match self {
            KeywordMatcher::Pattern(re) => re.is_match(haystack),
            KeywordMatcher::Literal(text) => haystack_lower.contains(text.as_str()),
        }
    }
}

#[derive(Debug)]
pub struct ProductEntry {
    pub category: String,
    pub product: String,
    matchers: Vec<KeywordMatcher>,
}

impl ProductEntry {
    fn matches(&self, haystack: &str, haystack_lower: &str) -> bool {
        self.matchers
            .iter()
            .any(|m| m.is_match(haystack, haystack_lower))
    }
}

/// Immutable, search-ordered product table.
#[derive(Debug)]
pub struct ProductCatalog {
    entries: Vec<ProductEntry>,
}

impl ProductCatalog {
    /// The catalog shipped with the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CATALOG, "<builtin products.toml>")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read product catalog '{}'", path.display()))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Parse catalog TOML. `origin` names the source in error messages.
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)
            .with_context(|| format!("Failed to parse product catalog TOML '{}'", origin))?;
        file.validate()
            .with_context(|| format!("Invalid product catalog '{}'", origin))?;
        Ok(Self::build(file))
    }

    fn build(file: CatalogFile) -> Self {
        let mut pending: Vec<ProductEntry> = file
            .categories
            .into_iter()
            .flat_map(|category| {
                let category_name = category.name;
                category.products.into_iter().map(move |product| ProductEntry {
                    category: category_name.clone(),
                    product: product.name,
                    matchers: product
                        .keywords
                        .iter()
                        .filter(|k| !k.trim().is_empty())
                        .map(|k| KeywordMatcher::compile(k))
                        .collect(),
                })
            })
            .collect();

        let priority: Vec<(String, String)> = file.priority.unwrap_or_else(|| {
            DEFAULT_PRIORITY
                .iter()
                .map(|(c, p)| (c.to_string(), p.to_string()))
                .collect()
        });

        let mut entries = Vec::with_capacity(pending.len());
        for (category, product) in &priority {
            if let Some(pos) = pending
                .iter()
                .position(|e| &e.category == category && &e.product == product)
            {
                entries.push(pending.remove(pos));
            } else {
                tracing::debug!(%category, %product, "priority entry not in catalog; ignored");
            }
        }
        entries.extend(pending);

        Self { entries }
    }

    /// First product, in search order, with a keyword matching `haystack`.
    pub fn find(&self, haystack: &str) -> Option<&ProductEntry> {
        if haystack.trim().is_empty() {
            return None;
        }
        let lower = haystack.to_lowercase();
        self.entries.iter().find(|e| e.matches(haystack, &lower))
    }

    /// `(category, product)` pairs in search order.
    pub fn ordered(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.category.as_str(), e.product.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CatalogFile {
    fn validate(&self) -> Result<()> {
        if self.schema_version != 1 {
            return Err(anyhow!(
                "Unsupported product catalog schema_version={} (expected 1)",
                self.schema_version
            ));
        }
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(anyhow!("Category name must not be empty"));
            }
            for product in &category.products {
                if product.name.trim().is_empty() {
                    return Err(anyhow!(
                        "Product name in category '{}' must not be empty",
                        category.name
                    ));
                }
                if !seen.insert((category.name.as_str(), product.name.as_str())) {
                    return Err(anyhow!(
                        "Duplicate product '{}' in category '{}'",
                        product.name,
                        category.name
                    ));
                }
            }
        }
        Ok(())
    }
}
