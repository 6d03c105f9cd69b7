use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use cubemerch_accounts::{Account, AccountCommand, AccountId, OpenAccount};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::AccountContext;

/// Demo accounts start with a credit grant, like the original platform's
/// onboarding bonus.
const DEFAULT_DEMO_CREDITS: u64 = 2500;

pub fn router() -> Router {
    Router::new()
        .route("/accounts", post(open_account))
        .route("/me", get(me))
        .route("/me/redemptions", get(my_redemptions))
}

pub async fn open_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
    body: Option<Json<dto::OpenAccountRequest>>,
) -> axum::response::Response {
    let account_id = account.account_id();
    let initial_credits = body
        .and_then(|Json(b)| b.initial_credits)
        .unwrap_or(DEFAULT_DEMO_CREDITS);

    let cmd = AccountCommand::OpenAccount(OpenAccount {
        account_id,
        initial_credits,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Account>(
        account_id.0,
        "accounts.account",
        cmd,
        |id| Account::empty(AccountId::new(id)),
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": account_id.to_string(),
                "credit_balance": initial_credits,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
) -> axum::response::Response {
    match services.accounts_get(&account.account_id()) {
        Some(rm) => (StatusCode::OK, Json(dto::account_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "user_not_found", "account not found"),
    }
}

pub async fn my_redemptions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(account): Extension<AccountContext>,
) -> axum::response::Response {
    let items: Vec<_> = services
        .redemptions_for_account(account.account_id())
        .into_iter()
        .map(dto::redemption_to_json)
        .collect();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
