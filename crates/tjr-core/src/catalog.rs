//! Product catalog for purchases (`<code>.<destination>.<pin>`).

use std::{fs, path::Path};

use serde::Deserialize;

use crate::Result;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Product {
    pub code: String,
    pub name: String,
    pub price: u64,
}

/// Static, read-only product table keeping declaration order for listings.
#[derive(Clone, Debug)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Default for Catalog {
    fn default() -> Self {
        let products = [
            ("dana10", 10_000),
            ("dana20", 20_000),
            ("dana30", 30_000),
            ("dana50", 50_000),
            ("dana100", 100_000),
            ("dana44", 44_000),
        ]
        .into_iter()
        .map(|(code, price)| Product {
            code: code.to_string(),
            name: code.to_string(),
            price,
        })
        .collect();
        Self { products }
    }
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    /// Load a JSON array of `{ "code", "name", "price" }` objects.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let products: Vec<Product> = serde_json::from_str(&raw)?;
        Ok(Self::new(products))
    }

    /// Product codes are matched case-insensitively.
    pub fn get(&self, code: &str) -> Option<&Product> {
        self.products
            .iter()
            .find(|p| p.code.eq_ignore_ascii_case(code))
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }
}
