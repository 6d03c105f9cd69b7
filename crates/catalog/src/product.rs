use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cubemerch_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use cubemerch_events::Event;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Merchandise category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Apparel,
    Drinkware,
    Stationery,
    Accessories,
    Bags,
    Electronics,
}

impl core::str::FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Apparel" => Ok(Category::Apparel),
            "Drinkware" => Ok(Category::Drinkware),
            "Stationery" => Ok(Category::Stationery),
            "Accessories" => Ok(Category::Accessories),
            "Bags" => Ok(Category::Bags),
            "Electronics" => Ok(Category::Electronics),
            other => Err(DomainError::validation(format!(
                "unknown category '{other}'"
            ))),
        }
    }
}

impl core::fmt::Display for Category {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Category::Apparel => "Apparel",
            Category::Drinkware => "Drinkware",
            Category::Stationery => "Stationery",
            Category::Accessories => "Accessories",
            Category::Bags => "Bags",
            Category::Electronics => "Electronics",
        };
        f.write_str(s)
    }
}

/// Aggregate root: Product.
///
/// Price is a plain attribute read at quote/redemption time; there is no
/// reservation or locking of the price across a redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    description: String,
    price: Decimal,
    category: Option<Category>,
    image_url: String,
    in_stock: bool,
    inventory: u32,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            description: String::new(),
            price: Decimal::ZERO,
            category: None,
            image_url: String::new(),
            in_stock: false,
            inventory: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn inventory(&self) -> u32 {
        self.inventory
    }

    /// Check if the product can be redeemed (must exist and be in stock).
    pub fn is_redeemable(&self) -> bool {
        self.created && self.in_stock
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: Category,
    pub image_url: String,
    pub inventory: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct (admin edit of catalog attributes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: Category,
    pub image_url: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStock {
    pub product_id: ProductId,
    pub in_stock: bool,
    pub inventory: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    SetStock(SetStock),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: Category,
    pub image_url: String,
    pub inventory: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: Category,
    pub image_url: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSet {
    pub product_id: ProductId,
    pub in_stock: bool,
    pub inventory: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    StockSet(StockSet),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "catalog.product.created",
            ProductEvent::ProductUpdated(_) => "catalog.product.updated",
            ProductEvent::StockSet(_) => "catalog.product.stock_set",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::StockSet(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.price = e.price;
                self.category = Some(e.category);
                self.image_url = e.image_url.clone();
                self.in_stock = true;
                self.inventory = e.inventory;
                self.created = true;
            }
            ProductEvent::ProductUpdated(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.price = e.price;
                self.category = Some(e.category);
                self.image_url = e.image_url.clone();
            }
            ProductEvent::StockSet(e) => {
                self.in_stock = e.in_stock;
                self.inventory = e.inventory;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::SetStock(cmd) => self.handle_set_stock(cmd),
        }
    }
}

impl Product {
    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn validate_attributes(name: &str, description: &str, price: Decimal) -> Result<(), DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if description.trim().is_empty() {
            return Err(DomainError::validation("description cannot be empty"));
        }
        if price < Decimal::ZERO {
            return Err(DomainError::validation("price cannot be negative"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }

        Self::validate_attributes(&cmd.name, &cmd.description, cmd.price)?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            name: cmd.name.clone(),
            description: cmd.description.clone(),
            price: cmd.price,
            category: cmd.category,
            image_url: cmd.image_url.clone(),
            inventory: cmd.inventory,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_product_id(cmd.product_id)?;

        Self::validate_attributes(&cmd.name, &cmd.description, cmd.price)?;

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            product_id: cmd.product_id,
            name: cmd.name.clone(),
            description: cmd.description.clone(),
            price: cmd.price,
            category: cmd.category,
            image_url: cmd.image_url.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_stock(&self, cmd: &SetStock) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_product_id(cmd.product_id)?;

        Ok(vec![ProductEvent::StockSet(StockSet {
            product_id: cmd.product_id,
            in_stock: cmd.in_stock,
            inventory: cmd.inventory,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn create_cmd(product_id: ProductId) -> CreateProduct {
        CreateProduct {
            product_id,
            name: "Premium T-Shirt".to_string(),
            description: "Comfortable cotton t-shirt.".to_string(),
            price: Decimal::new(2999, 2),
            category: Category::Apparel,
            image_url: "/images/tshirt.jpg".to_string(),
            inventory: 100,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn create_product_emits_product_created_event() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);

        let events = product
            .handle(&ProductCommand::CreateProduct(create_cmd(product_id)))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            ProductEvent::ProductCreated(e) => {
                assert_eq!(e.product_id, product_id);
                assert_eq!(e.name, "Premium T-Shirt");
                assert_eq!(e.price, Decimal::new(2999, 2));
            }
            _ => panic!("Expected ProductCreated event"),
        }
    }

    #[test]
    fn create_product_rejects_empty_name() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let mut cmd = create_cmd(product_id);
        cmd.name = "   ".to_string();

        let err = product.handle(&ProductCommand::CreateProduct(cmd)).unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for empty name"),
        }
    }

    #[test]
    fn create_product_rejects_negative_price() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let mut cmd = create_cmd(product_id);
        cmd.price = Decimal::new(-100, 2);

        let err = product.handle(&ProductCommand::CreateProduct(cmd)).unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for negative price"),
        }
    }

    #[test]
    fn create_product_rejects_duplicate_creation() {
        let product_id = test_product_id();
        let mut product = Product::empty(product_id);

        let events = product
            .handle(&ProductCommand::CreateProduct(create_cmd(product_id)))
            .unwrap();
        product.apply(&events[0]);

        let err = product
            .handle(&ProductCommand::CreateProduct(create_cmd(product_id)))
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict error for duplicate creation"),
        }
    }

    #[test]
    fn update_requires_existing_product() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let cmd = UpdateProduct {
            product_id,
            name: "Hoodie".to_string(),
            description: "Fleece-lined hoodie.".to_string(),
            price: Decimal::new(5999, 2),
            category: Category::Apparel,
            image_url: String::new(),
            occurred_at: test_time(),
        };

        let err = product.handle(&ProductCommand::UpdateProduct(cmd)).unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn stock_toggle_updates_redeemability() {
        let product_id = test_product_id();
        let mut product = Product::empty(product_id);

        let events = product
            .handle(&ProductCommand::CreateProduct(create_cmd(product_id)))
            .unwrap();
        product.apply(&events[0]);
        assert!(product.is_redeemable());

        let events = product
            .handle(&ProductCommand::SetStock(SetStock {
                product_id,
                in_stock: false,
                inventory: 0,
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);
        assert!(!product.is_redeemable());
        assert_eq!(product.version(), 2);
    }

    #[test]
    fn update_replaces_price_used_for_quotes() {
        let product_id = test_product_id();
        let mut product = Product::empty(product_id);

        let events = product
            .handle(&ProductCommand::CreateProduct(create_cmd(product_id)))
            .unwrap();
        product.apply(&events[0]);

        let events = product
            .handle(&ProductCommand::UpdateProduct(UpdateProduct {
                product_id,
                name: "Premium T-Shirt".to_string(),
                description: "Comfortable cotton t-shirt.".to_string(),
                price: Decimal::new(3499, 2),
                category: Category::Apparel,
                image_url: "/images/tshirt.jpg".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap();
        product.apply(&events[0]);

        assert_eq!(product.price(), Decimal::new(3499, 2));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let product_id = test_product_id();
        let mut product = Product::empty(product_id);

        let events = product
            .handle(&ProductCommand::CreateProduct(create_cmd(product_id)))
            .unwrap();
        product.apply(&events[0]);
        let version_before = product.version();

        let cmd = ProductCommand::SetStock(SetStock {
            product_id,
            in_stock: false,
            inventory: 0,
            occurred_at: test_time(),
        });
        let events1 = product.handle(&cmd).unwrap();
        let events2 = product.handle(&cmd).unwrap();

        assert_eq!(product.version(), version_before);
        assert_eq!(events1, events2);
    }
}
