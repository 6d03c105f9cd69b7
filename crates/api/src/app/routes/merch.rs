use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use cubemerch_catalog::{Category, ProductId};
use cubemerch_core::AggregateId;
use cubemerch_infra::product_source::{ProductSource, SeedProductSource};
use cubemerch_infra::redemption_executor::RedemptionOrder;
use cubemerch_redemption::RedemptionId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::AccountContext;

pub fn router() -> Router {
    Router::new().nest("/merch", merch_router())
}

fn merch_router() -> Router {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
        .route("/quote", post(quote))
        .route("/redeem", post(redeem))
        .route("/redemptions/:id", get(get_redemption))
}

#[derive(Debug, Deserialize)]
struct CatalogQuery {
    category: Option<String>,
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<CatalogQuery>,
) -> axum::response::Response {
    let category = match query.category.as_deref() {
        None | Some("all") => None,
        Some(raw) => match raw.parse::<Category>() {
            Ok(c) => Some(c),
            Err(e) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_input", e.to_string())
            }
        },
    };

    let products = services.products_list_in_stock(category);
    let items: Vec<_> = if products.is_empty() && services.products_list().is_empty() {
        // Fresh install: surface the demo seed catalog until an admin has
        // created real products.
        SeedProductSource::all()
            .into_iter()
            .filter(|p| category.map_or(true, |c| p.category == c))
            .map(dto::product_view_to_json)
            .collect()
    } else {
        products.into_iter().map(dto::product_to_json).collect()
    };

    (StatusCode::OK, Json(serde_json::json!({ "products": items }))).into_response()
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id"),
    };
    let product_id = ProductId::new(agg);

    if let Some(rm) = services.products_get(&product_id) {
        return (StatusCode::OK, Json(dto::product_to_json(rm))).into_response();
    }
    if let Some(view) = SeedProductSource::new().resolve(product_id) {
        return (StatusCode::OK, Json(dto::product_view_to_json(view))).into_response();
    }

    errors::json_error(StatusCode::NOT_FOUND, "product_not_found", "product not found")
}

pub async fn quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Json(body): Json<dto::QuoteRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match body.product_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id"),
    };

    match services
        .executor()
        .quote(account.account_id(), ProductId::new(agg), body.credits_to_use)
    {
        Ok(quote) => (
            StatusCode::OK,
            Json(serde_json::json!({ "quote": dto::quote_to_json(&quote) })),
        )
            .into_response(),
        Err(e) => errors::redemption_error_to_response(e),
    }
}

pub async fn redeem(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Json(body): Json<dto::RedeemRequest>,
) -> axum::response::Response {
    let agg: AggregateId = match body.product_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id"),
    };

    let order = RedemptionOrder {
        account_id: account.account_id(),
        product_id: ProductId::new(agg),
        credits_to_use: body.credits_to_use,
        shipping_address: body.shipping_address.into_domain(),
        idempotency_key: body.idempotency_key,
    };

    match services.executor().execute(order).await {
        Ok(confirmation) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "success": true,
                "redemption_id": confirmation.redemption_id.to_string(),
                "payment_reference": confirmation.payment_reference,
                "replayed": confirmation.replayed,
            })),
        )
            .into_response(),
        Err(e) => errors::redemption_error_to_response(e),
    }
}

pub async fn get_redemption(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid redemption id")
        }
    };

    match services.redemptions_get(&RedemptionId::new(agg)) {
        // Redemptions are only visible to their owner (or an admin).
        Some(rm) if account.is_admin() || rm.account_id == account.account_id() => {
            (StatusCode::OK, Json(dto::redemption_to_json(rm))).into_response()
        }
        _ => errors::json_error(StatusCode::NOT_FOUND, "not_found", "redemption not found"),
    }
}
