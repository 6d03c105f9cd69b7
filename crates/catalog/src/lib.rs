//! Catalog domain module (event-sourced).
//!
//! This crate contains business rules for the merchandise catalog,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage).

pub mod product;

pub use product::{
    Category, CreateProduct, Product, ProductCommand, ProductCreated, ProductEvent, ProductId,
    ProductUpdated, SetStock, StockSet, UpdateProduct,
};
