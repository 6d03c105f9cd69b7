//! Pricing domain module.
//!
//! The quote calculator is a pure function over an injected configuration:
//! no IO, no hidden state, bit-identical output for identical input. The
//! redemption path re-runs it server-side against the current product price;
//! client-submitted quotes are display material only.

pub mod quote;

pub use quote::{compute_quote, PricingConfig, Quote};
