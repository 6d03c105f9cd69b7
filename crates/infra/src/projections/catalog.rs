use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use cubemerch_catalog::{Category, ProductEvent, ProductId};
use cubemerch_events::EventEnvelope;

use super::cursors::{CursorDecision, ProjectionCursors};
use super::ProjectionError;
use crate::read_model::ReadModelStore;

pub const AGGREGATE_TYPE: &str = "catalog.product";

/// Queryable product read model (the storefront catalog).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductReadModel {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: Category,
    pub image_url: String,
    pub in_stock: bool,
    pub inventory: u32,
}

#[derive(Debug)]
pub struct CatalogProjection<S>
where
    S: ReadModelStore<ProductId, ProductReadModel>,
{
    store: S,
    cursors: ProjectionCursors,
}

impl<S> CatalogProjection<S>
where
    S: ReadModelStore<ProductId, ProductReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, product_id: &ProductId) -> Option<ProductReadModel> {
        self.store.get(product_id)
    }

    pub fn list(&self) -> Vec<ProductReadModel> {
        self.store.list()
    }

    /// Storefront view: in-stock products, optionally narrowed to a category.
    pub fn list_in_stock(&self, category: Option<Category>) -> Vec<ProductReadModel> {
        self.store
            .list()
            .into_iter()
            .filter(|p| p.in_stock)
            .filter(|p| category.map_or(true, |c| p.category == c))
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        match self.cursors.check(aggregate_id, seq)? {
            CursorDecision::Skip => return Ok(()),
            CursorDecision::Apply => {}
        }

        let ev: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let product_id = match &ev {
            ProductEvent::ProductCreated(e) => e.product_id,
            ProductEvent::ProductUpdated(e) => e.product_id,
            ProductEvent::StockSet(e) => e.product_id,
        };
        if product_id.0 != aggregate_id {
            return Err(ProjectionError::MismatchedStream(
                "event product_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            ProductEvent::ProductCreated(e) => {
                self.store.upsert(
                    e.product_id,
                    ProductReadModel {
                        product_id: e.product_id,
                        name: e.name,
                        description: e.description,
                        price: e.price,
                        category: e.category,
                        image_url: e.image_url,
                        in_stock: true,
                        inventory: e.inventory,
                    },
                );
            }
            ProductEvent::ProductUpdated(e) => {
                if let Some(mut rm) = self.store.get(&e.product_id) {
                    rm.name = e.name;
                    rm.description = e.description;
                    rm.price = e.price;
                    rm.category = e.category;
                    rm.image_url = e.image_url;
                    self.store.upsert(e.product_id, rm);
                }
            }
            ProductEvent::StockSet(e) => {
                if let Some(mut rm) = self.store.get(&e.product_id) {
                    rm.in_stock = e.in_stock;
                    rm.inventory = e.inventory;
                    self.store.upsert(e.product_id, rm);
                }
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.store.clear();
        self.cursors.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
