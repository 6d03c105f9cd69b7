//! `cubemerch-api` — HTTP surface for the credit-redemption platform.

pub mod app;
pub mod auth;
pub mod context;
pub mod middleware;
