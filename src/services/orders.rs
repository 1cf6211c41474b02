use crate::{
    entities::{order, order_item, product, OrderStatus, PaymentMethod},
    errors::ServiceError,
    services::{
        carts::remove_cart_products,
        payments::{RefundProcessor, VnPayGateway, VNP_SUCCESS_CODE},
        products::{decrease_stock, increase_stock, load_images, primary_image},
    },
    PaginatedResponse,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, JoinType, Order as SortOrder, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, RelationTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

/// Flat shipping fee added once per order.
pub const SHIPPING_FEE: Decimal = Decimal::ZERO;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemDto {
    pub order_item_id: i32,
    pub product_id: i32,
    pub product_name: String,
    pub product_image_url: Option<String>,
    pub quantity: i32,
    /// Unit price at purchase time.
    #[schema(value_type = String)]
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDto {
    pub order_id: i32,
    pub user_id: i32,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub vnpay_transaction_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub full_name_shipping: Option<String>,
    pub phone_shipping: Option<String>,
    pub address_shipping: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemDto>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct OrderItemRequest {
    pub product_id: i32,
    pub quantity: i32,
}

/// Checkout of the items the buyer selected in the cart
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
    #[validate(length(max = 50))]
    pub full_name_shipping: Option<String>,
    #[validate(length(max = 15))]
    pub phone_shipping: Option<String>,
    #[validate(length(max = 255))]
    pub address_shipping: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderResponse {
    pub order: OrderDto,
    /// Present for VNPay orders: where to send the buyer to pay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminOrderFilter {
    pub status: Option<OrderStatus>,
    pub user_id: Option<i32>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

/// Order lifecycle: checkout with stock reservation, payment return handling,
/// admin status changes and cancellation with restock and refund.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    vnpay: VnPayGateway,
    refunds: Arc<dyn RefundProcessor>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        vnpay: VnPayGateway,
        refunds: Arc<dyn RefundProcessor>,
    ) -> Self {
        Self { db, vnpay, refunds }
    }

    /// Places an order for the selected items.
    ///
    /// Everything happens in one transaction: each line reserves stock with
    /// a conditional decrement, so a concurrent buyer taking the last unit
    /// makes this request fail and roll back instead of overselling.
    #[instrument(skip(self, request))]
    pub async fn create_from_selected_items(
        &self,
        user_id: i32,
        request: CreateOrderRequest,
        client_ip: &str,
    ) -> Result<CreateOrderResponse, ServiceError> {
        request.validate()?;
        if request.items.is_empty() {
            return Err(ServiceError::BadRequest(
                "Order must contain at least one item".to_string(),
            ));
        }
        let full_name = required(&request.full_name_shipping, "Shipping full name")?;
        let phone = required(&request.phone_shipping, "Shipping phone")?;
        let address = required(&request.address_shipping, "Shipping address")?;
        let payment_method = request
            .payment_method
            .ok_or_else(|| ServiceError::BadRequest("Payment method is required".to_string()))?;

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let order = order::ActiveModel {
            user_id: Set(user_id),
            total_amount: Set(Decimal::ZERO),
            status: Set(OrderStatus::Pending),
            payment_method: Set(payment_method),
            full_name_shipping: Set(Some(full_name)),
            phone_shipping: Set(Some(phone)),
            address_shipping: Set(Some(address)),
            notes: Set(request.notes.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let product_ids: BTreeSet<i32> = request.items.iter().map(|i| i.product_id).collect();
        let products: HashMap<i32, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut total = Decimal::ZERO;
        let mut lines = 0usize;
        for item in &request.items {
            if item.quantity <= 0 {
                warn!(product_id = item.product_id, "Skipping order line with non-positive quantity");
                continue;
            }
            let product = products
                .get(&item.product_id)
                .ok_or_else(|| ServiceError::not_found("Product", item.product_id))?;
            if product.stock < item.quantity {
                return Err(ServiceError::OperationFailed(format!(
                    "Insufficient stock for '{}': requested {}, available {}",
                    product.name, item.quantity, product.stock
                )));
            }

            decrease_stock(&txn, product.id, item.quantity).await?;
            order_item::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(product.id),
                quantity: Set(item.quantity),
                price: Set(product.price),
                ..Default::default()
            }
            .insert(&txn)
            .await?;

            total += product.price * Decimal::from(item.quantity);
            lines += 1;
        }

        if lines == 0 {
            return Err(ServiceError::BadRequest(
                "No valid items in the selected order".to_string(),
            ));
        }
        total += SHIPPING_FEE;

        let order_id = order.id;
        let payment_url = match payment_method {
            PaymentMethod::VnPay => Some(
                self.vnpay
                    .create_payment_url(order_id, total, client_ip, now)?,
            ),
            PaymentMethod::Cod => None,
        };

        let mut active = order.into_active_model();
        active.total_amount = Set(total);
        active.vnpay_transaction_id = Set(payment_url
            .as_ref()
            .map(|_| format!("PENDING_VNPAY_{}", order_id)));
        let order = active.update(&txn).await?;

        let dto = build_order_dto(&txn, order).await?;
        txn.commit().await?;

        info!(order_id, user_id, total = %total, lines, "Order created");
        Ok(CreateOrderResponse {
            order: dto,
            payment_url,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: i32) -> Result<OrderDto, ServiceError> {
        let order = find_order(&*self.db, order_id).await?;
        build_order_dto(&*self.db, order).await
    }

    /// A buyer's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_user_orders(
        &self,
        user_id: i32,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<OrderDto>, ServiceError> {
        let paginator = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        let items = build_order_dtos(&*self.db, orders).await?;

        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    #[instrument(skip(self))]
    pub async fn list_orders_admin(
        &self,
        filter: AdminOrderFilter,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<OrderDto>, ServiceError> {
        let column = match filter.sort_by.as_deref().unwrap_or("created_at") {
            "created_at" | "createdAt" | "orderDate" => order::Column::CreatedAt,
            "id" | "orderId" => order::Column::Id,
            "total_amount" | "totalAmount" => order::Column::TotalAmount,
            "status" => order::Column::Status,
            other => {
                return Err(ServiceError::BadRequest(format!(
                    "Unsupported sort field '{}'",
                    other
                )))
            }
        };
        let direction = sort_direction(filter.sort_dir.as_deref());

        let mut query = order::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(user_id) = filter.user_id {
            query = query.filter(order::Column::UserId.eq(user_id));
        }

        let paginator = query
            .order_by(column, direction.clone())
            .order_by(order::Column::Id, direction)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        let items = build_order_dtos(&*self.db, orders).await?;

        Ok(PaginatedResponse::new(items, total, page, limit))
    }

    /// Admin status change following the transition table.
    ///
    /// Moving to CANCELED restocks every line and refunds a paid order; a
    /// failure at either step leaves the order untouched.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: i32,
        new_status: OrderStatus,
    ) -> Result<OrderDto, ServiceError> {
        let txn = self.db.begin().await?;
        let order = find_order(&txn, order_id).await?;
        let current = order.status;

        if current == new_status {
            let dto = build_order_dto(&txn, order).await?;
            txn.commit().await?;
            return Ok(dto);
        }
        if !current.can_transition_to(new_status) {
            return Err(ServiceError::BadRequest(format!(
                "Invalid status transition from {} to {}",
                current, new_status
            )));
        }

        if new_status == OrderStatus::Canceled {
            restock_order(&txn, order_id).await?;
            if current == OrderStatus::Paid {
                self.refunds.refund(&order).await?;
            }
        }

        let mut active = order.into_active_model();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await?;

        let dto = build_order_dto(&txn, order).await?;
        txn.commit().await?;

        info!(order_id, from = %current, to = %new_status, "Order status updated");
        Ok(dto)
    }

    /// Buyer-initiated cancellation, allowed until the order ships.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: i32,
        reason: Option<String>,
    ) -> Result<OrderDto, ServiceError> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                ServiceError::BadRequest("Cancellation reason is required".to_string())
            })?;

        let txn = self.db.begin().await?;
        let order = find_order(&txn, order_id).await?;
        let current = order.status;
        if !current.is_cancellable_by_customer() {
            return Err(ServiceError::BadRequest(format!(
                "Order {} cannot be canceled in status {}; only PENDING, PAID or PROCESSING orders can be canceled",
                order_id, current
            )));
        }

        restock_order(&txn, order_id).await?;
        if current == OrderStatus::Paid {
            self.refunds.refund(&order).await?;
        }

        let mut active = order.into_active_model();
        active.status = Set(OrderStatus::Canceled);
        active.cancellation_reason = Set(Some(reason));
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await?;

        let dto = build_order_dto(&txn, order).await?;
        txn.commit().await?;

        info!(order_id, previous = %current, "Order canceled by customer");
        Ok(dto)
    }

    /// Applies the outcome VNPay reports on the return URL.
    ///
    /// Only PENDING orders change; a repeated callback returns the order as is.
    #[instrument(skip(self, params))]
    pub async fn handle_vnpay_return(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<OrderDto, ServiceError> {
        if !self.vnpay.verify_return(params) {
            warn!("VNPay return rejected: bad signature");
            return Err(ServiceError::BadRequest(
                "Invalid VNPay signature".to_string(),
            ));
        }

        let txn_ref = params.get("vnp_TxnRef").map(String::as_str).unwrap_or("");
        let order_id: i32 = txn_ref.parse().map_err(|_| {
            ServiceError::BadRequest(format!("Invalid order reference in VNPay return: '{}'", txn_ref))
        })?;
        let response_code = params
            .get("vnp_ResponseCode")
            .map(String::as_str)
            .unwrap_or("");

        let txn = self.db.begin().await?;
        let order = find_order(&txn, order_id).await?;
        if order.status != OrderStatus::Pending {
            info!(order_id, status = %order.status, "VNPay return for already processed order");
            let dto = build_order_dto(&txn, order).await?;
            txn.commit().await?;
            return Ok(dto);
        }

        let user_id = order.user_id;
        let paid = response_code == VNP_SUCCESS_CODE;
        let mut active = order.into_active_model();
        if paid {
            active.status = Set(OrderStatus::Paid);
            active.vnpay_transaction_id =
                Set(params.get("vnp_TransactionNo").filter(|t| !t.is_empty()).cloned());
        } else {
            restock_order(&txn, order_id).await?;
            active.status = Set(OrderStatus::Canceled);
        }
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await?;
        let dto = build_order_dto(&txn, order).await?;
        txn.commit().await?;

        if paid {
            info!(order_id, "VNPay payment succeeded");
            let product_ids: Vec<i32> = dto.items.iter().map(|i| i.product_id).collect();
            match remove_cart_products(&*self.db, user_id, &product_ids).await {
                Ok(removed) => info!(order_id, removed, "Paid items removed from cart"),
                Err(e) => error!(order_id, error = %e, "Failed to clear paid items from cart"),
            }
        } else {
            info!(order_id, response_code, "VNPay payment failed; order canceled and restocked");
        }

        Ok(dto)
    }

    /// Ids of the user's COMPLETED orders that contain the product, oldest first.
    #[instrument(skip(self))]
    pub async fn completed_orders_containing(
        &self,
        user_id: i32,
        product_id: i32,
    ) -> Result<Vec<i32>, ServiceError> {
        completed_order_ids_containing(&*self.db, user_id, product_id).await
    }
}

pub async fn completed_order_ids_containing<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    product_id: i32,
) -> Result<Vec<i32>, ServiceError> {
    let orders = order::Entity::find()
        .join(JoinType::InnerJoin, order::Relation::OrderItem.def())
        .filter(order::Column::UserId.eq(user_id))
        .filter(order::Column::Status.eq(OrderStatus::Completed))
        .filter(order_item::Column::ProductId.eq(product_id))
        .order_by_asc(order::Column::CreatedAt)
        .order_by_asc(order::Column::Id)
        .all(conn)
        .await?;

    let mut ids = Vec::with_capacity(orders.len());
    for o in orders {
        if !ids.contains(&o.id) {
            ids.push(o.id);
        }
    }
    Ok(ids)
}

async fn find_order<C: ConnectionTrait>(conn: &C, order_id: i32) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order", order_id))
}

/// Puts every line of the order back into stock.
async fn restock_order<C: ConnectionTrait>(conn: &C, order_id: i32) -> Result<(), ServiceError> {
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(conn)
        .await?;
    for item in &items {
        increase_stock(conn, item.product_id, item.quantity)
            .await
            .map_err(|e| {
                error!(order_id, product_id = item.product_id, error = %e, "Restock failed");
                ServiceError::OperationFailed(format!(
                    "Failed to restock items of order {}",
                    order_id
                ))
            })?;
    }
    info!(order_id, lines = items.len(), "Order items restocked");
    Ok(())
}

fn required(value: &Option<String>, field: &str) -> Result<String, ServiceError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::BadRequest(format!("{} is required", field)))
}

pub(crate) fn sort_direction(dir: Option<&str>) -> SortOrder {
    match dir {
        Some(d) if d.eq_ignore_ascii_case("asc") => SortOrder::Asc,
        _ => SortOrder::Desc,
    }
}

pub async fn build_order_dto<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> Result<OrderDto, ServiceError> {
    let mut dtos = build_order_dtos(conn, vec![order]).await?;
    dtos.pop()
        .ok_or_else(|| ServiceError::InternalError("order mapping produced no row".into()))
}

/// Maps orders to DTOs with their lines, product names and primary images.
pub async fn build_order_dtos<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<order::Model>,
) -> Result<Vec<OrderDto>, ServiceError> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.is_in(orders.iter().map(|o| o.id)))
        .order_by_asc(order_item::Column::Id)
        .all(conn)
        .await?;
    let product_ids: BTreeSet<i32> = items.iter().map(|i| i.product_id).collect();
    let names: HashMap<i32, String> = product::Entity::find()
        .filter(product::Column::Id.is_in(product_ids.iter().copied()))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();
    let images = load_images(conn, product_ids).await?;

    let mut lines: HashMap<i32, Vec<OrderItemDto>> = HashMap::new();
    for item in items {
        lines.entry(item.order_id).or_default().push(OrderItemDto {
            order_item_id: item.id,
            product_id: item.product_id,
            product_name: names.get(&item.product_id).cloned().unwrap_or_default(),
            product_image_url: images
                .get(&item.product_id)
                .and_then(|imgs| primary_image(imgs))
                .map(|img| img.image_url.clone()),
            quantity: item.quantity,
            price: item.price,
        });
    }

    Ok(orders
        .into_iter()
        .map(|o| OrderDto {
            items: lines.remove(&o.id).unwrap_or_default(),
            order_id: o.id,
            user_id: o.user_id,
            total_amount: o.total_amount,
            status: o.status,
            payment_method: o.payment_method,
            vnpay_transaction_id: o.vnpay_transaction_id,
            cancellation_reason: o.cancellation_reason,
            full_name_shipping: o.full_name_shipping,
            phone_shipping: o.phone_shipping,
            address_shipping: o.address_shipping,
            notes: o.notes,
            created_at: o.created_at,
            updated_at: o.updated_at,
        })
        .collect())
}
