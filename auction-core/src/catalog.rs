//! Product catalog and the per-run selection drawn from it.

use std::collections::BTreeSet;
use std::path::Path;

use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::config::CatalogConfig;
use crate::error::{Result, SimError};
use crate::types::{Price, Product, ProductId};

/// One entry of a product feed. Only `id` and `initial_price` are required.
///
/// ```json
/// [{"id": 1, "name": "lamp", "category": "home", "subcategory": "lighting",
///   "initial_price": 25.0, "ranking": 4.5}]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Tsify)]
pub struct ProductRecord {
    pub id: ProductId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    pub initial_price: Price,
    #[serde(default)]
    pub ranking: Option<f64>,
}

impl From<ProductRecord> for Product {
    fn from(record: ProductRecord) -> Self {
        let product = Product::new(record.id, record.initial_price)
            .with_name(record.name)
            .with_category(record.category, record.subcategory);
        match record.ranking {
            Some(ranking) => product.with_ranking(ranking),
            None => product,
        }
    }
}

/// Every product available to auction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductCatalog {
    products: Vec<Product>,
}

impl ProductCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    /// Build a catalog of `config.size` products with ids `1..=size` and
    /// uniformly drawn initial prices.
    pub fn generate<R: Rng>(config: &CatalogConfig, rng: &mut R) -> Self {
        let products = (1..=config.size)
            .map(|id| {
                let price = rng.random_range(config.price_min..config.price_max);
                Product::new(ProductId(id), price).with_name(format!("product-{id}"))
            })
            .collect();
        Self { products }
    }

    /// Build from feed records, rejecting duplicate ids and prices that are
    /// negative or not finite.
    pub fn from_records(records: Vec<ProductRecord>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for record in &records {
            if !seen.insert(record.id) {
                return Err(SimError::InvalidCatalog(format!(
                    "duplicate product id {}",
                    record.id.0
                )));
            }
            if !(record.initial_price.is_finite() && record.initial_price >= 0.0) {
                return Err(SimError::InvalidCatalog(format!(
                    "product {} has initial price {}",
                    record.id.0, record.initial_price
                )));
            }
        }
        Ok(Self {
            products: records.into_iter().map(Product::from).collect(),
        })
    }

    /// Parse a JSON array of `ProductRecord`s.
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<ProductRecord> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    /// Read a JSON product feed from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn get(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Pick `count` products at random, keeping catalog order.
    /// Asking for more than the catalog holds returns all of it.
    pub fn select<R: Rng>(&self, count: usize, rng: &mut R) -> ProductSelection {
        if count >= self.products.len() {
            return ProductSelection::new(self.products.clone());
        }
        let mut picked = index::sample(rng, self.products.len(), count).into_vec();
        picked.sort_unstable();
        ProductSelection::new(picked.into_iter().map(|i| self.products[i].clone()).collect())
    }
}

/// Products chosen for one run. Handed to the auctioneer and to every
/// agent when they are built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductSelection {
    products: Vec<Product>,
}

impl ProductSelection {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn ids(&self) -> Vec<ProductId> {
        self.products.iter().map(|p| p.id).collect()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn into_products(self) -> Vec<Product> {
        self.products
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn catalog(n: u32) -> ProductCatalog {
        ProductCatalog::new((1..=n).map(|i| Product::new(ProductId(i), 10.0 * i as f64)).collect())
    }

    #[test]
    fn selection_preserves_catalog_order() {
        let mut rng = StdRng::seed_from_u64(42);
        let selection = catalog(20).select(6, &mut rng);
        let ids = selection.ids();
        assert_eq!(ids.len(), 6);
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids out of order: {ids:?}");
    }

    #[test]
    fn oversized_selection_returns_everything() {
        let mut rng = StdRng::seed_from_u64(42);
        let selection = catalog(3).select(10, &mut rng);
        assert_eq!(selection.ids(), vec![ProductId(1), ProductId(2), ProductId(3)]);
    }

    #[test]
    fn same_seed_same_selection() {
        let cat = catalog(30);
        let a = cat.select(5, &mut StdRng::seed_from_u64(7));
        let b = cat.select(5, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    const FEED: &str = r#"[
        {"id": 3, "name": "lamp", "category": "home", "subcategory": "lighting",
         "initial_price": 25.0, "ranking": 4.5},
        {"id": 7, "initial_price": 12.5}
    ]"#;

    #[test]
    fn feed_keeps_product_metadata() {
        let cat = ProductCatalog::from_json(FEED).unwrap();
        assert_eq!(cat.len(), 2);

        let lamp = cat.get(ProductId(3)).unwrap();
        assert_eq!(lamp.name, "lamp");
        assert_eq!(lamp.category, "home");
        assert_eq!(lamp.subcategory, "lighting");
        assert_eq!(lamp.initial_price, 25.0);
        assert_eq!(lamp.current_best_price, 25.0);
        assert!(!lamp.sold);
        assert_eq!(lamp.announcement().ranking, Some(4.5));

        let bare = cat.get(ProductId(7)).unwrap();
        assert!(bare.name.is_empty());
        assert_eq!(bare.ranking, None);
    }

    #[test]
    fn feed_rejects_duplicate_ids() {
        let json = r#"[{"id": 1, "initial_price": 5.0}, {"id": 1, "initial_price": 6.0}]"#;
        assert!(matches!(
            ProductCatalog::from_json(json),
            Err(SimError::InvalidCatalog(_))
        ));
    }

    #[test]
    fn feed_rejects_negative_price() {
        let json = r#"[{"id": 1, "initial_price": -5.0}]"#;
        assert!(matches!(
            ProductCatalog::from_json(json),
            Err(SimError::InvalidCatalog(_))
        ));
    }

    #[test]
    fn feed_missing_price_is_a_json_error() {
        let json = r#"[{"id": 1, "name": "lamp"}]"#;
        assert!(matches!(
            ProductCatalog::from_json(json),
            Err(SimError::Json(_))
        ));
    }

    #[test]
    fn load_reads_feed_from_disk() {
        let path = std::env::temp_dir().join(format!("auction_feed_{}.json", std::process::id()));
        std::fs::write(&path, FEED).unwrap();
        let cat = ProductCatalog::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cat, ProductCatalog::from_json(FEED).unwrap());

        assert!(matches!(
            ProductCatalog::load(path.with_extension("missing")),
            Err(SimError::Io(_))
        ));
    }

    #[test]
    fn generated_prices_stay_in_range() {
        let cfg = CatalogConfig::default();
        let cat = ProductCatalog::generate(&cfg, &mut StdRng::seed_from_u64(1));
        assert_eq!(cat.len(), cfg.size as usize);
        for p in cat.products() {
            assert!(
                p.initial_price >= cfg.price_min && p.initial_price < cfg.price_max,
                "price {} out of range",
                p.initial_price
            );
            assert_eq!(p.current_best_price, p.initial_price);
        }
        assert!(cat.get(ProductId(1)).is_some());
    }
}
