use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use cubemerch_accounts::{
    Account, AccountCommand, AccountId, GrantCredits, HoldCredits, RecordActivity,
    ResolvePendingCredits,
};
use cubemerch_catalog::{CreateProduct, Product, ProductCommand, ProductId, SetStock, UpdateProduct};
use cubemerch_core::AggregateId;
use cubemerch_lanes::{CreateLane, Difficulty, Lane, LaneCommand, LaneId, LaneState, SetLaneState};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::AccountContext;

pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/lanes", get(list_lanes).post(create_lane))
        .route("/lanes/:id/state", put(set_lane_state))
        .route("/products", get(list_all_products).post(create_product))
        .route("/products/:id", put(update_product))
        .route("/products/:id/stock", put(set_stock))
        .route("/accounts/:id/credits/grant", post(grant_credits))
        .route("/accounts/:id/credits/hold", post(hold_credits))
        .route("/accounts/:id/credits/resolve", post(resolve_pending))
        .route("/accounts/:id/activity", post(record_activity))
}

fn require_admin(account: &AccountContext) -> Result<(), axum::response::Response> {
    if account.is_admin() {
        Ok(())
    } else {
        Err(errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "admin access required",
        ))
    }
}

fn parse_id(raw: &str, what: &'static str) -> Result<AggregateId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
    })
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    since: Option<String>,
}

pub async fn metrics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Query(query): Query<MetricsQuery>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&account) {
        return resp;
    }

    let since = match query.since.as_deref() {
        None | Some("") => None,
        Some(raw) => match raw.parse::<NaiveDate>() {
            Ok(date) => Some(date),
            Err(_) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_input",
                    "since must be a YYYY-MM-DD date",
                )
            }
        },
    };

    let totals = services.metrics().totals(since);
    let series: Vec<_> = services
        .metrics()
        .series(since)
        .into_iter()
        .map(|(date, day)| {
            serde_json::json!({
                "date": date.to_string(),
                "bursts": day.bursts,
                "wins": day.wins,
                "purchases": day.purchases,
                "referrals": day.referrals,
                "redemptions": day.redemptions,
            })
        })
        .collect();

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "metrics": {
                "bursts": totals.bursts,
                "wins": totals.wins,
                "purchases": totals.purchases,
                "referrals": totals.referrals,
                "redemptions": totals.redemptions,
                "chart_data": series,
            }
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct LanesQuery {
    state: Option<String>,
}

pub async fn list_lanes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Query(query): Query<LanesQuery>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&account) {
        return resp;
    }

    let state = match query.state.as_deref() {
        None | Some("all") => None,
        Some(raw) => match raw.parse::<LaneState>() {
            Ok(s) => Some(s),
            Err(e) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_input", e.to_string())
            }
        },
    };

    let items: Vec<_> = services
        .lanes_list(state)
        .into_iter()
        .map(dto::lane_to_json)
        .collect();
    (StatusCode::OK, Json(serde_json::json!({ "lanes": items }))).into_response()
}

pub async fn create_lane(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Json(body): Json<dto::CreateLaneRequest>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&account) {
        return resp;
    }

    let category = match dto::parse_lane_category(&body.category) {
        Ok(c) => c,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_input", e.to_string()),
    };
    let difficulty = match body.difficulty.as_deref() {
        None => Difficulty::Beginner,
        Some(raw) => match dto::parse_difficulty(raw) {
            Ok(d) => d,
            Err(e) => {
                return errors::json_error(StatusCode::BAD_REQUEST, "invalid_input", e.to_string())
            }
        },
    };

    let agg = AggregateId::new();
    let lane_id = LaneId::new(agg);
    let cmd = LaneCommand::CreateLane(CreateLane {
        lane_id,
        name: body.name,
        category,
        impact_score: body.impact_score,
        difficulty,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Lane>(agg, "lanes.lane", cmd, |id| Lane::empty(LaneId::new(id))) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn set_lane_state(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetLaneStateRequest>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&account) {
        return resp;
    }
    let agg = match parse_id(&id, "lane") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let state = match body.state.parse::<LaneState>() {
        Ok(s) => s,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_input", e.to_string()),
    };

    let cmd = LaneCommand::SetLaneState(SetLaneState {
        lane_id: LaneId::new(agg),
        state,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Lane>(agg, "lanes.lane", cmd, |id| Lane::empty(LaneId::new(id))) {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "id": agg.to_string() }))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_all_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&account) {
        return resp;
    }

    let items: Vec<_> = services
        .products_list()
        .into_iter()
        .map(dto::product_to_json)
        .collect();
    (StatusCode::OK, Json(serde_json::json!({ "products": items }))).into_response()
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Json(body): Json<dto::CreateProductRequest>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&account) {
        return resp;
    }

    let price = match dto::parse_price(body.price) {
        Ok(p) => p,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_input", e.to_string()),
    };
    let category = match body.category.parse() {
        Ok(c) => c,
        Err(e) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_input",
                format!("{e}"),
            )
        }
    };

    let agg = AggregateId::new();
    let product_id = ProductId::new(agg);
    let cmd = ProductCommand::CreateProduct(CreateProduct {
        product_id,
        name: body.name,
        description: body.description,
        price,
        category,
        image_url: body.image_url.unwrap_or_default(),
        inventory: body.inventory.unwrap_or(100),
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Product>(agg, "catalog.product", cmd, |id| {
        Product::empty(ProductId::new(id))
    }) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateProductRequest>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&account) {
        return resp;
    }
    let agg = match parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let price = match dto::parse_price(body.price) {
        Ok(p) => p,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_input", e.to_string()),
    };
    let category = match body.category.parse() {
        Ok(c) => c,
        Err(e) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_input",
                format!("{e}"),
            )
        }
    };

    let cmd = ProductCommand::UpdateProduct(UpdateProduct {
        product_id: ProductId::new(agg),
        name: body.name,
        description: body.description,
        price,
        category,
        image_url: body.image_url.unwrap_or_default(),
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Product>(agg, "catalog.product", cmd, |id| {
        Product::empty(ProductId::new(id))
    }) {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "id": agg.to_string() }))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn set_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetStockRequest>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&account) {
        return resp;
    }
    let agg = match parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let inventory = body.inventory.unwrap_or(if body.in_stock { 100 } else { 0 });
    let cmd = ProductCommand::SetStock(SetStock {
        product_id: ProductId::new(agg),
        in_stock: body.in_stock,
        inventory,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Product>(agg, "catalog.product", cmd, |id| {
        Product::empty(ProductId::new(id))
    }) {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "id": agg.to_string() }))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn grant_credits(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CreditAmountRequest>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&account) {
        return resp;
    }
    let agg = match parse_id(&id, "account") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = AccountCommand::GrantCredits(GrantCredits {
        account_id: AccountId::new(agg),
        amount: body.amount,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Account>(agg, "accounts.account", cmd, |id| {
        Account::empty(AccountId::new(id))
    }) {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "id": agg.to_string() }))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn hold_credits(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CreditAmountRequest>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&account) {
        return resp;
    }
    let agg = match parse_id(&id, "account") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = AccountCommand::HoldCredits(HoldCredits {
        account_id: AccountId::new(agg),
        amount: body.amount,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Account>(agg, "accounts.account", cmd, |id| {
        Account::empty(AccountId::new(id))
    }) {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "id": agg.to_string() }))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn resolve_pending(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&account) {
        return resp;
    }
    let agg = match parse_id(&id, "account") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = AccountCommand::ResolvePendingCredits(ResolvePendingCredits {
        account_id: AccountId::new(agg),
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Account>(agg, "accounts.account", cmd, |id| {
        Account::empty(AccountId::new(id))
    }) {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "id": agg.to_string() }))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn record_activity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordActivityRequest>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&account) {
        return resp;
    }
    let agg = match parse_id(&id, "account") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let kind = match dto::parse_activity_kind(&body.kind) {
        Ok(k) => k,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_input", e.to_string()),
    };

    let cmd = AccountCommand::RecordActivity(RecordActivity {
        account_id: AccountId::new(agg),
        kind,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Account>(agg, "accounts.account", cmd, |id| {
        Account::empty(AccountId::new(id))
    }) {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "id": agg.to_string() }))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
