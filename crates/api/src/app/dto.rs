//! Request/response DTOs and JSON mapping helpers.
//!
//! Money is computed as `Decimal` everywhere inside the domain; this module
//! is the only place values are display-rounded (2 decimal places) and
//! converted to JSON numbers.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use cubemerch_accounts::ActivityKind;
use cubemerch_core::{round_display, DomainError};
use cubemerch_infra::product_source::ProductView;
use cubemerch_infra::projections::{
    AccountReadModel, LaneReadModel, ProductReadModel, RedemptionReadModel,
};
use cubemerch_lanes::{Difficulty, LaneCategory};
use cubemerch_pricing::Quote;
use cubemerch_redemption::ShippingAddress;

/// Display-rounded JSON number for a currency amount.
fn money(value: Decimal) -> f64 {
    round_display(value).to_f64().unwrap_or(0.0)
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub product_id: String,
    pub credits_to_use: u64,
}

#[derive(Debug, Deserialize)]
pub struct ShippingAddressDto {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: Option<String>,
}

impl ShippingAddressDto {
    pub fn into_domain(self) -> ShippingAddress {
        ShippingAddress {
            street: self.street,
            city: self.city,
            state: self.state,
            zip_code: self.zip_code,
            country: self.country.unwrap_or_else(|| "US".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub product_id: String,
    pub credits_to_use: u64,
    /// Informational/display only. The authoritative amount is recomputed
    /// server-side from the current product price.
    #[serde(default)]
    #[allow(dead_code)]
    pub cash_amount: Option<f64>,
    pub shipping_address: ShippingAddressDto,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub initial_credits: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CreditAmountRequest {
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
pub struct RecordActivityRequest {
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub inventory: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub in_stock: bool,
    #[serde(default)]
    pub inventory: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLaneRequest {
    pub name: String,
    pub category: String,
    pub impact_score: u8,
    #[serde(default)]
    pub difficulty: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetLaneStateRequest {
    pub state: String,
}

/// Parse a JSON price (number) into an exact decimal amount.
pub fn parse_price(price: f64) -> Result<Decimal, DomainError> {
    Decimal::from_f64_retain(price)
        .map(|d| d.round_dp(2))
        .ok_or_else(|| DomainError::validation("price is not a finite number"))
}

pub fn parse_activity_kind(kind: &str) -> Result<ActivityKind, DomainError> {
    match kind {
        "burst" => Ok(ActivityKind::Burst),
        "win" => Ok(ActivityKind::Win),
        "purchase" => Ok(ActivityKind::Purchase),
        "referral" => Ok(ActivityKind::Referral),
        other => Err(DomainError::validation(format!(
            "unknown activity kind '{other}'"
        ))),
    }
}

pub fn parse_lane_category(category: &str) -> Result<LaneCategory, DomainError> {
    match category {
        "Programming" => Ok(LaneCategory::Programming),
        "Frontend" => Ok(LaneCategory::Frontend),
        "Backend" => Ok(LaneCategory::Backend),
        "Mobile" => Ok(LaneCategory::Mobile),
        "AI/ML" => Ok(LaneCategory::AiMl),
        "DevOps" => Ok(LaneCategory::DevOps),
        "Design" => Ok(LaneCategory::Design),
        other => Err(DomainError::validation(format!(
            "unknown lane category '{other}'"
        ))),
    }
}

pub fn parse_difficulty(difficulty: &str) -> Result<Difficulty, DomainError> {
    match difficulty {
        "beginner" => Ok(Difficulty::Beginner),
        "intermediate" => Ok(Difficulty::Intermediate),
        "advanced" => Ok(Difficulty::Advanced),
        other => Err(DomainError::validation(format!(
            "unknown difficulty '{other}'"
        ))),
    }
}

pub fn quote_to_json(quote: &Quote) -> JsonValue {
    json!({
        "item_price": money(quote.item_price),
        "credits_to_use": quote.credits_applied,
        "credits_value": money(quote.credits_value),
        "cash_amount": money(quote.cash_amount),
        "shipping": money(quote.shipping),
        "tax": money(quote.tax),
        "total": money(quote.total),
        "max_credits_allowed": quote.max_credits_allowed,
        "credits_used_percentage": round_display(quote.credits_used_percentage)
            .to_f64()
            .unwrap_or(0.0),
    })
}

pub fn product_to_json(rm: ProductReadModel) -> JsonValue {
    json!({
        "id": rm.product_id.to_string(),
        "name": rm.name,
        "description": rm.description,
        "price": money(rm.price),
        "category": rm.category.to_string(),
        "image_url": rm.image_url,
        "in_stock": rm.in_stock,
        "inventory": rm.inventory,
    })
}

/// Seed products surface through the same shape as catalog rows.
pub fn product_view_to_json(view: ProductView) -> JsonValue {
    json!({
        "id": view.product_id.to_string(),
        "name": view.name,
        "description": "",
        "price": money(view.price),
        "category": view.category.to_string(),
        "image_url": "",
        "in_stock": view.in_stock,
        "inventory": 0,
    })
}

pub fn account_to_json(rm: AccountReadModel) -> JsonValue {
    json!({
        "id": rm.account_id.to_string(),
        "credit_balance": rm.credit_balance,
        "pending_credits": rm.pending_credits,
        "stats": {
            "bursts": rm.stats.bursts,
            "wins": rm.stats.wins,
            "purchases": rm.stats.purchases,
            "referrals": rm.stats.referrals,
            "redemptions": rm.redemptions,
        },
    })
}

pub fn redemption_to_json(rm: RedemptionReadModel) -> JsonValue {
    json!({
        "id": rm.redemption_id.to_string(),
        "account_id": rm.account_id.to_string(),
        "product_id": rm.product_id.to_string(),
        "credits_used": rm.credits_used,
        "cash_amount": money(rm.cash_amount),
        "total_amount": money(rm.total_amount),
        "payment_reference": rm.payment_reference,
        "status": status_str(rm.status),
        "shipping_address": {
            "street": rm.shipping_address.street,
            "city": rm.shipping_address.city,
            "state": rm.shipping_address.state,
            "zip_code": rm.shipping_address.zip_code,
            "country": rm.shipping_address.country,
        },
        "requested_at": rm.requested_at.to_rfc3339(),
        "updated_at": rm.updated_at.to_rfc3339(),
    })
}

fn status_str(status: cubemerch_redemption::RedemptionStatus) -> &'static str {
    match status {
        cubemerch_redemption::RedemptionStatus::Pending => "pending",
        cubemerch_redemption::RedemptionStatus::Completed => "completed",
        cubemerch_redemption::RedemptionStatus::Failed => "failed",
        cubemerch_redemption::RedemptionStatus::Refunded => "refunded",
    }
}

pub fn lane_to_json(rm: LaneReadModel) -> JsonValue {
    let category = match rm.category {
        LaneCategory::Programming => "Programming",
        LaneCategory::Frontend => "Frontend",
        LaneCategory::Backend => "Backend",
        LaneCategory::Mobile => "Mobile",
        LaneCategory::AiMl => "AI/ML",
        LaneCategory::DevOps => "DevOps",
        LaneCategory::Design => "Design",
    };
    let state = match rm.state {
        cubemerch_lanes::LaneState::Ok => "ok",
        cubemerch_lanes::LaneState::Watchlist => "watchlist",
        cubemerch_lanes::LaneState::Save => "save",
        cubemerch_lanes::LaneState::Archive => "archive",
    };
    let difficulty = match rm.difficulty {
        Difficulty::Beginner => "beginner",
        Difficulty::Intermediate => "intermediate",
        Difficulty::Advanced => "advanced",
    };

    json!({
        "id": rm.lane_id.to_string(),
        "name": rm.name,
        "category": category,
        "impact_score": rm.impact_score,
        "state": state,
        "difficulty": difficulty,
        "metrics": {
            "views": rm.views,
            "completions": rm.completions,
        },
    })
}
