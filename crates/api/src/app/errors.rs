use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use cubemerch_infra::command_dispatcher::DispatchError;
use cubemerch_infra::redemption_executor::RedemptionError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Map dispatch failures onto the HTTP taxonomy.
///
/// Business-rule rejections are 409s so callers can tell "fix your input"
/// (400) apart from "the rule said no" and from "try again later" (5xx).
pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_input", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::PendingCreditsBlock => json_error(
            StatusCode::CONFLICT,
            "pending_credits_block",
            "redemption blocked: unresolved pending credits",
        ),
        DispatchError::InsufficientCredits {
            requested,
            available,
        } => json_error(
            StatusCode::CONFLICT,
            "insufficient_credits",
            format!("insufficient credits: requested {requested}, available {available}"),
        ),
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

/// Map redemption-flow failures onto the HTTP taxonomy.
pub fn redemption_error_to_response(err: RedemptionError) -> axum::response::Response {
    match err {
        RedemptionError::InvalidInput(msg) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_input", msg)
        }
        RedemptionError::UserNotFound => {
            json_error(StatusCode::NOT_FOUND, "user_not_found", "account not found")
        }
        RedemptionError::ProductNotFound => json_error(
            StatusCode::NOT_FOUND,
            "product_not_found",
            "product not found or not in stock",
        ),
        RedemptionError::PendingCreditsBlock => json_error(
            StatusCode::CONFLICT,
            "pending_credits_block",
            "redemption blocked: you have pending credits that need to be resolved",
        ),
        RedemptionError::InsufficientCredits {
            requested,
            available,
        } => json_error(
            StatusCode::CONFLICT,
            "insufficient_credits",
            format!("insufficient credits: requested {requested}, available {available}"),
        ),
        RedemptionError::PaymentProviderUnavailable(msg) => {
            json_error(StatusCode::BAD_GATEWAY, "payment_provider_unavailable", msg)
        }
        RedemptionError::Persistence(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "persistence_failure", msg)
        }
    }
}
