use crate::{
    entities::{cart, cart_item, product},
    errors::ServiceError,
    services::products::{load_images, primary_image},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartDto {
    pub user_id: i32,
    pub items: Vec<CartItemDto>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Sum of current price times quantity.
    #[schema(value_type = String)]
    pub total: Decimal,
}

impl CartDto {
    fn empty(user_id: i32) -> Self {
        Self {
            user_id,
            items: Vec::new(),
            last_updated: None,
            total: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItemDto {
    pub product_id: i32,
    pub quantity: i32,
    /// Current product price, not the price when the item was added.
    #[schema(value_type = String)]
    pub price: Decimal,
    pub name: String,
    pub image_url: Option<String>,
    pub stock: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct AddCartItemRequest {
    #[validate(range(min = 1))]
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct RemoveCartItemsRequest {
    pub product_ids: Vec<i32>,
}

/// One cart per user, created on first add and dropped once empty.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: i32) -> Result<CartDto, ServiceError> {
        load_cart_dto(&*self.db, user_id).await
    }

    /// Adds `quantity` units, merging with an existing line for the same product.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: i32,
        product_id: i32,
        quantity: i32,
    ) -> Result<CartDto, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::BadRequest(
                "Quantity must be greater than zero".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let product = product::Entity::find_by_id(product_id)
            .one(&txn)
            .await?
            .filter(|p| p.visible)
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;

        let now = Utc::now();
        let cart = match find_cart(&txn, user_id).await? {
            Some(cart) => cart,
            None => {
                cart::ActiveModel {
                    user_id: Set(user_id),
                    created_at: Set(now),
                    last_updated: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
        };

        let existing = find_item(&txn, cart.id, product_id).await?;
        let already = existing.as_ref().map(|i| i.quantity).unwrap_or(0);
        if already + quantity > product.stock {
            return Err(ServiceError::OperationFailed(format!(
                "Only {} available for '{}'. Cannot add {}.",
                product.stock, product.name, quantity
            )));
        }

        match existing {
            Some(item) => {
                let mut active = item.into_active_model();
                active.quantity = Set(already + quantity);
                active.price_at_addition = Set(product.price);
                active.update(&txn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    price_at_addition: Set(product.price),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
            }
        }
        touch(&txn, cart).await?;
        txn.commit().await?;

        info!(user_id, product_id, quantity, "Item added to cart");
        self.get_cart(user_id).await
    }

    /// Sets an item's quantity; zero or less removes it.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: i32,
        product_id: i32,
        quantity: i32,
    ) -> Result<CartDto, ServiceError> {
        if quantity <= 0 {
            return self.remove_item(user_id, product_id).await;
        }

        let txn = self.db.begin().await?;
        let cart = find_cart(&txn, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart not found for user {}", user_id)))?;
        let item = find_item(&txn, cart.id, product_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;
        let product = product::Entity::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;

        if quantity > product.stock {
            return Err(ServiceError::OperationFailed(format!(
                "Only {} available for '{}'. Cannot set quantity to {}.",
                product.stock, product.name, quantity
            )));
        }

        let mut active = item.into_active_model();
        active.quantity = Set(quantity);
        active.update(&txn).await?;
        touch(&txn, cart).await?;
        txn.commit().await?;

        info!(user_id, product_id, quantity, "Cart quantity updated");
        self.get_cart(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: i32, product_id: i32) -> Result<CartDto, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = find_cart(&txn, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart not found for user {}", user_id)))?;
        let item = find_item(&txn, cart.id, product_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;

        cart_item::Entity::delete_by_id(item.id).exec(&txn).await?;
        drop_if_empty_or_touch(&txn, cart).await?;
        txn.commit().await?;

        info!(user_id, product_id, "Item removed from cart");
        self.get_cart(user_id).await
    }

    /// Removes several products at once; ids not in the cart are ignored.
    #[instrument(skip(self))]
    pub async fn remove_items(
        &self,
        user_id: i32,
        product_ids: Vec<i32>,
    ) -> Result<CartDto, ServiceError> {
        let txn = self.db.begin().await?;
        let removed = remove_cart_products(&txn, user_id, &product_ids).await?;
        txn.commit().await?;

        info!(user_id, removed, "Items removed from cart");
        self.get_cart(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: i32) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        if let Some(cart) = find_cart(&txn, user_id).await? {
            cart_item::Entity::delete_many()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .exec(&txn)
                .await?;
            cart::Entity::delete_by_id(cart.id).exec(&txn).await?;
            info!(user_id, "Cart cleared");
        }
        txn.commit().await?;
        Ok(())
    }
}

/// Deletes the given products from the user's cart and drops the cart when
/// nothing is left. Returns the number of lines removed.
pub async fn remove_cart_products<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    product_ids: &[i32],
) -> Result<u64, ServiceError> {
    let Some(cart) = find_cart(conn, user_id).await? else {
        return Ok(0);
    };
    if product_ids.is_empty() {
        return Ok(0);
    }

    let result = cart_item::Entity::delete_many()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .filter(cart_item::Column::ProductId.is_in(product_ids.iter().copied()))
        .exec(conn)
        .await?;
    drop_if_empty_or_touch(conn, cart).await?;
    Ok(result.rows_affected)
}

async fn find_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<Option<cart::Model>, ServiceError> {
    Ok(cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await?)
}

async fn find_item<C: ConnectionTrait>(
    conn: &C,
    cart_id: i32,
    product_id: i32,
) -> Result<Option<cart_item::Model>, ServiceError> {
    Ok(cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .filter(cart_item::Column::ProductId.eq(product_id))
        .one(conn)
        .await?)
}

async fn touch<C: ConnectionTrait>(conn: &C, cart: cart::Model) -> Result<(), ServiceError> {
    let mut active = cart.into_active_model();
    active.last_updated = Set(Utc::now());
    active.update(conn).await?;
    Ok(())
}

async fn drop_if_empty_or_touch<C: ConnectionTrait>(
    conn: &C,
    cart: cart::Model,
) -> Result<(), ServiceError> {
    let remaining = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .count(conn)
        .await?;
    if remaining == 0 {
        cart::Entity::delete_by_id(cart.id).exec(conn).await?;
        Ok(())
    } else {
        touch(conn, cart).await
    }
}

async fn load_cart_dto<C: ConnectionTrait>(conn: &C, user_id: i32) -> Result<CartDto, ServiceError> {
    let Some(cart) = find_cart(conn, user_id).await? else {
        return Ok(CartDto::empty(user_id));
    };

    let items = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .order_by_asc(cart_item::Column::Id)
        .all(conn)
        .await?;
    let products: HashMap<i32, product::Model> = product::Entity::find()
        .filter(product::Column::Id.is_in(items.iter().map(|i| i.product_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let images = load_images(conn, products.keys().copied()).await?;

    let mut total = Decimal::ZERO;
    let items: Vec<CartItemDto> = items
        .into_iter()
        .filter_map(|item| {
            let product = products.get(&item.product_id)?;
            total += product.price * Decimal::from(item.quantity);
            Some(CartItemDto {
                product_id: item.product_id,
                quantity: item.quantity,
                price: product.price,
                name: product.name.clone(),
                image_url: images
                    .get(&product.id)
                    .and_then(|imgs| primary_image(imgs))
                    .map(|img| img.image_url.clone()),
                stock: product.stock,
            })
        })
        .collect();

    Ok(CartDto {
        user_id,
        items,
        last_updated: Some(cart.last_updated),
        total,
    })
}
