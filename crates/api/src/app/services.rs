use std::sync::Arc;

use serde_json::Value as JsonValue;

use cubemerch_accounts::AccountId;
use cubemerch_catalog::{Category, ProductId};
use cubemerch_core::DomainError;
use cubemerch_events::{EventBus, EventEnvelope, InMemoryEventBus};
use cubemerch_infra::command_dispatcher::{CommandDispatcher, DispatchError};
use cubemerch_infra::event_store::{EventStore, InMemoryEventStore, StoredEvent};
use cubemerch_infra::payment::PaymentAuthorizer;
use cubemerch_infra::product_source::{
    ProductSourceChain, ProjectionProductSource, SeedProductSource,
};
use cubemerch_infra::projections::{
    AccountReadModel, AccountsProjection, CatalogProjection, LaneReadModel, LanesProjection,
    PlatformMetricsProjection, ProductReadModel, RedemptionReadModel, RedemptionsProjection,
};
use cubemerch_infra::read_model::InMemoryReadModelStore;
use cubemerch_infra::redemption_executor::RedemptionExecutor;
use cubemerch_lanes::{LaneId, LaneState};
use cubemerch_pricing::PricingConfig;
use cubemerch_redemption::RedemptionId;

type Store = Arc<dyn EventStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<Store, Bus>;

type CatalogRm = Arc<InMemoryReadModelStore<ProductId, ProductReadModel>>;
type AccountsRm = Arc<InMemoryReadModelStore<AccountId, AccountReadModel>>;
type RedemptionsRm = Arc<InMemoryReadModelStore<RedemptionId, RedemptionReadModel>>;
type LanesRm = Arc<InMemoryReadModelStore<LaneId, LaneReadModel>>;

/// Wired application services: dispatcher, executor, projections.
pub struct AppServices {
    dispatcher: Arc<Dispatcher>,
    executor: RedemptionExecutor<Store, Bus>,
    catalog_projection: Arc<CatalogProjection<CatalogRm>>,
    accounts_projection: Arc<AccountsProjection<AccountsRm>>,
    redemptions_projection: Arc<RedemptionsProjection<RedemptionsRm>>,
    lanes_projection: Arc<LanesProjection<LanesRm>>,
    metrics_projection: Arc<PlatformMetricsProjection>,
}

pub async fn build_services() -> AppServices {
    let store = build_store().await;
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    let catalog_projection: Arc<CatalogProjection<CatalogRm>> =
        Arc::new(CatalogProjection::new(Arc::new(InMemoryReadModelStore::new())));
    let accounts_projection: Arc<AccountsProjection<AccountsRm>> =
        Arc::new(AccountsProjection::new(Arc::new(InMemoryReadModelStore::new())));
    let redemptions_projection: Arc<RedemptionsProjection<RedemptionsRm>> =
        Arc::new(RedemptionsProjection::new(Arc::new(InMemoryReadModelStore::new())));
    let lanes_projection: Arc<LanesProjection<LanesRm>> =
        Arc::new(LanesProjection::new(Arc::new(InMemoryReadModelStore::new())));
    let metrics_projection = Arc::new(PlatformMetricsProjection::new());

    // Background subscriber: bus -> projections.
    {
        let sub = bus.subscribe();
        let catalog_projection = catalog_projection.clone();
        let accounts_projection = accounts_projection.clone();
        let redemptions_projection = redemptions_projection.clone();
        let lanes_projection = lanes_projection.clone();
        let metrics_projection = metrics_projection.clone();
        tokio::task::spawn_blocking(move || loop {
            match sub.recv() {
                Ok(env) => {
                    let apply_ok = match env.aggregate_type() {
                        "catalog.product" => {
                            catalog_projection.apply_envelope(&env).map_err(|e| e.to_string())
                        }
                        "accounts.account" => {
                            if let Err(e) = accounts_projection.apply_envelope(&env) {
                                Err(e.to_string())
                            } else if let Err(e) = metrics_projection.apply_envelope(&env) {
                                Err(e.to_string())
                            } else {
                                Ok(())
                            }
                        }
                        "redemption.record" => {
                            if let Err(e) = redemptions_projection.apply_envelope(&env) {
                                Err(e.to_string())
                            } else if let Err(e) = metrics_projection.apply_envelope(&env) {
                                Err(e.to_string())
                            } else {
                                Ok(())
                            }
                        }
                        "lanes.lane" => {
                            lanes_projection.apply_envelope(&env).map_err(|e| e.to_string())
                        }
                        _ => Ok(()),
                    };

                    if let Err(e) = apply_ok {
                        tracing::warn!("projection apply failed: {e}");
                    }
                }
                Err(_) => break,
            }
        });
    }

    let dispatcher: Arc<Dispatcher> = Arc::new(CommandDispatcher::new(store, bus));

    let product_chain = Arc::new(ProductSourceChain::new(vec![
        Arc::new(ProjectionProductSource::new(catalog_projection.clone())),
        Arc::new(SeedProductSource::new()),
    ]));

    let executor = RedemptionExecutor::new(
        dispatcher.clone(),
        product_chain,
        build_payment_authorizer(),
        PricingConfig::default(),
    );

    AppServices {
        dispatcher,
        executor,
        catalog_projection,
        accounts_projection,
        redemptions_projection,
        lanes_projection,
        metrics_projection,
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_store() -> Store {
    Arc::new(InMemoryEventStore::new())
}

#[cfg(feature = "postgres")]
async fn build_store() -> Store {
    use cubemerch_infra::event_store::PostgresEventStore;

    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if !use_persistent {
        return Arc::new(InMemoryEventStore::new());
    }

    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
    let pool = sqlx::PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to Postgres");

    let store = PostgresEventStore::new(pool);
    store.ensure_schema().await.expect("Failed to run event store schema");
    Arc::new(store)
}

#[cfg(not(feature = "stripe"))]
fn build_payment_authorizer() -> Arc<dyn PaymentAuthorizer> {
    Arc::new(cubemerch_infra::payment::InMemoryPaymentAuthorizer::new())
}

#[cfg(feature = "stripe")]
fn build_payment_authorizer() -> Arc<dyn PaymentAuthorizer> {
    use cubemerch_infra::payment::{InMemoryPaymentAuthorizer, StripePaymentAuthorizer};

    match std::env::var("STRIPE_SECRET_KEY") {
        Ok(key) if !key.is_empty() => Arc::new(StripePaymentAuthorizer::new(key)),
        _ => {
            tracing::warn!("STRIPE_SECRET_KEY not set; using in-memory payment authorizer");
            Arc::new(InMemoryPaymentAuthorizer::new())
        }
    }
}

impl AppServices {
    pub fn executor(&self) -> &RedemptionExecutor<Store, Bus> {
        &self.executor
    }

    pub fn dispatch<A>(
        &self,
        aggregate_id: cubemerch_core::AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(cubemerch_core::AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: cubemerch_core::Aggregate<Error = DomainError>,
        A::Event: cubemerch_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        self.dispatcher
            .dispatch::<A>(aggregate_id, aggregate_type, command, make_aggregate)
    }

    pub fn products_get(&self, product_id: &ProductId) -> Option<ProductReadModel> {
        self.catalog_projection.get(product_id)
    }

    pub fn products_list(&self) -> Vec<ProductReadModel> {
        self.catalog_projection.list()
    }

    pub fn products_list_in_stock(&self, category: Option<Category>) -> Vec<ProductReadModel> {
        self.catalog_projection.list_in_stock(category)
    }

    pub fn accounts_get(&self, account_id: &AccountId) -> Option<AccountReadModel> {
        self.accounts_projection.get(account_id)
    }

    pub fn redemptions_get(&self, redemption_id: &RedemptionId) -> Option<RedemptionReadModel> {
        self.redemptions_projection.get(redemption_id)
    }

    pub fn redemptions_for_account(&self, account_id: AccountId) -> Vec<RedemptionReadModel> {
        self.redemptions_projection.list_for_account(account_id)
    }

    pub fn lanes_get(&self, lane_id: &LaneId) -> Option<LaneReadModel> {
        self.lanes_projection.get(lane_id)
    }

    pub fn lanes_list(&self, state: Option<LaneState>) -> Vec<LaneReadModel> {
        self.lanes_projection.list(state)
    }

    pub fn metrics(&self) -> &PlatformMetricsProjection {
        &self.metrics_projection
    }
}
