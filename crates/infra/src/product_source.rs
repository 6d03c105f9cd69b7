//! Product resolution chain.
//!
//! Redemption pricing needs a product's *current* price and stock flag.
//! Lookup is modeled as an ordered chain of `ProductSource` resolvers
//! instead of inline fallbacks: the live catalog projection is consulted
//! first, then the built-in demo seed list (so a fresh install can quote
//! and redeem before any admin has created products).

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use cubemerch_catalog::{Category, ProductId};
use cubemerch_core::AggregateId;

use crate::projections::CatalogProjection;
use crate::read_model::ReadModelStore;

/// Resolved product data, exactly what pricing needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductView {
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub category: Category,
    pub in_stock: bool,
}

/// One resolver in the lookup chain.
pub trait ProductSource: Send + Sync {
    fn resolve(&self, product_id: ProductId) -> Option<ProductView>;
}

/// Resolver backed by the live catalog projection.
pub struct ProjectionProductSource<S>
where
    S: ReadModelStore<ProductId, crate::projections::ProductReadModel>,
{
    projection: Arc<CatalogProjection<S>>,
}

impl<S> ProjectionProductSource<S>
where
    S: ReadModelStore<ProductId, crate::projections::ProductReadModel>,
{
    pub fn new(projection: Arc<CatalogProjection<S>>) -> Self {
        Self { projection }
    }
}

impl<S> ProductSource for ProjectionProductSource<S>
where
    S: ReadModelStore<ProductId, crate::projections::ProductReadModel>,
{
    fn resolve(&self, product_id: ProductId) -> Option<ProductView> {
        self.projection.get(&product_id).map(|rm| ProductView {
            product_id: rm.product_id,
            name: rm.name,
            price: rm.price,
            category: rm.category,
            in_stock: rm.in_stock,
        })
    }
}

/// Namespace for deriving stable demo-product identifiers.
const SEED_NAMESPACE: Uuid = Uuid::from_u128(0x50c0be00_5eed_4000_8000_000000000001);

/// Built-in demo catalog (last resolver in the chain).
#[derive(Debug, Default)]
pub struct SeedProductSource;

impl SeedProductSource {
    pub fn new() -> Self {
        Self
    }

    /// Stable id for a seed product, addressable across restarts.
    pub fn seed_id(slug: &str) -> ProductId {
        ProductId::new(AggregateId::derived(SEED_NAMESPACE, slug.as_bytes()))
    }

    pub fn all() -> Vec<ProductView> {
        let seed = |slug: &str, name: &str, price_cents: i64, category: Category| ProductView {
            product_id: Self::seed_id(slug),
            name: name.to_string(),
            price: Decimal::new(price_cents, 2),
            category,
            in_stock: true,
        };

        vec![
            seed("premium-t-shirt", "50Cube Premium T-Shirt", 2999, Category::Apparel),
            seed("coffee-mug", "50Cube Coffee Mug", 1999, Category::Drinkware),
            seed("hoodie", "50Cube Hoodie", 5999, Category::Apparel),
            seed("notebook", "50Cube Notebook", 2499, Category::Stationery),
            seed("sticker-pack", "50Cube Sticker Pack", 999, Category::Accessories),
            seed("backpack", "50Cube Backpack", 7999, Category::Bags),
            seed("wireless-headphones", "50Cube Wireless Headphones", 8999, Category::Electronics),
            seed("mechanical-keyboard", "50Cube Mechanical Keyboard", 14999, Category::Electronics),
        ]
    }
}

impl ProductSource for SeedProductSource {
    fn resolve(&self, product_id: ProductId) -> Option<ProductView> {
        Self::all().into_iter().find(|p| p.product_id == product_id)
    }
}

/// Ordered chain of resolvers; first hit wins.
pub struct ProductSourceChain {
    sources: Vec<Arc<dyn ProductSource>>,
}

impl ProductSourceChain {
    pub fn new(sources: Vec<Arc<dyn ProductSource>>) -> Self {
        Self { sources }
    }

    pub fn resolve(&self, product_id: ProductId) -> Option<ProductView> {
        self.sources.iter().find_map(|s| s.resolve(product_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryReadModelStore;

    #[test]
    fn seed_products_resolve_by_stable_id() {
        let source = SeedProductSource::new();
        let id = SeedProductSource::seed_id("coffee-mug");

        let view = source.resolve(id).unwrap();
        assert_eq!(view.name, "50Cube Coffee Mug");
        assert_eq!(view.price, Decimal::new(1999, 2));
        assert!(view.in_stock);
    }

    #[test]
    fn chain_prefers_earlier_sources_and_falls_back() {
        let store = Arc::new(InMemoryReadModelStore::new());
        let projection = Arc::new(CatalogProjection::new(store));
        let chain = ProductSourceChain::new(vec![
            Arc::new(ProjectionProductSource::new(projection)),
            Arc::new(SeedProductSource::new()),
        ]);

        // Projection is empty, so the seed list answers.
        let id = SeedProductSource::seed_id("backpack");
        assert_eq!(chain.resolve(id).unwrap().name, "50Cube Backpack");

        // Unknown everywhere.
        assert!(chain.resolve(ProductId::new(AggregateId::new())).is_none());
    }
}
