use crate::{
    config::StoreConfig,
    entities::{invoice, order, order_item, product, user, PaymentMethod},
    errors::ServiceError,
    services::orders::SHIPPING_FEE,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict,
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceItemDto {
    pub product_name: String,
    /// Product barcode, or "N/A".
    pub sku: String,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub price: Decimal,
    #[schema(value_type = String)]
    pub line_total: Decimal,
}

/// Printable invoice: store header, customer block and lines.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvoiceDetailDto {
    pub store_name: String,
    pub store_email: String,
    pub store_address: String,
    pub store_phone: String,
    pub store_tax_code: String,
    pub invoice_number: String,
    pub invoice_date: DateTime<Utc>,
    pub order_id: i32,
    pub order_date: DateTime<Utc>,
    pub customer_name: String,
    pub customer_address: String,
    pub customer_phone: String,
    pub customer_email: String,
    pub notes: Option<String>,
    pub items: Vec<InvoiceItemDto>,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    #[schema(value_type = String)]
    pub shipping_fee: Decimal,
    #[schema(value_type = String)]
    pub discount: Decimal,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
}

#[derive(Clone)]
pub struct InvoiceService {
    db: Arc<DatabaseConnection>,
    store: StoreConfig,
}

impl InvoiceService {
    pub fn new(db: Arc<DatabaseConnection>, store: StoreConfig) -> Self {
        Self { db, store }
    }

    /// Returns the order's invoice, issuing it on first request.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, order_id: i32) -> Result<invoice::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = find_order(&txn, order_id).await?;
        let invoice = get_or_create_for(&txn, &order).await?;
        txn.commit().await?;
        Ok(invoice)
    }

    /// Full invoice view for an order.
    #[instrument(skip(self))]
    pub async fn invoice_for_order(&self, order_id: i32) -> Result<InvoiceDetailDto, ServiceError> {
        let txn = self.db.begin().await?;
        let order = find_order(&txn, order_id).await?;
        let invoice = get_or_create_for(&txn, &order).await?;

        let customer = user::Entity::find_by_id(order.user_id).one(&txn).await?;
        let lines = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Id)
            .all(&txn)
            .await?;
        let products: HashMap<i32, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(lines.iter().map(|l| l.product_id)))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        txn.commit().await?;

        let items: Vec<InvoiceItemDto> = lines
            .into_iter()
            .map(|line| {
                let product = products.get(&line.product_id);
                InvoiceItemDto {
                    product_name: product.map(|p| p.name.clone()).unwrap_or_default(),
                    sku: product
                        .and_then(|p| p.barcode.clone())
                        .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                    quantity: line.quantity,
                    price: line.price,
                    line_total: line.price * Decimal::from(line.quantity),
                }
            })
            .collect();
        let subtotal: Decimal = items.iter().map(|i| i.line_total).sum();

        let customer_name = order
            .full_name_shipping
            .clone()
            .or_else(|| customer.as_ref().map(|c| c.full_name()))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        Ok(InvoiceDetailDto {
            store_name: self.store.name.clone(),
            store_email: self.store.email.clone(),
            store_address: self.store.address.clone(),
            store_phone: self.store.phone.clone(),
            store_tax_code: self.store.tax_code.clone(),
            invoice_number: invoice.invoice_number,
            invoice_date: invoice.created_at,
            order_id: order.id,
            order_date: order.created_at,
            customer_name,
            customer_address: order
                .address_shipping
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            customer_phone: order
                .phone_shipping
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            customer_email: customer
                .map(|c| c.email)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            notes: order.notes.clone(),
            items,
            subtotal,
            shipping_fee: SHIPPING_FEE,
            discount: Decimal::ZERO,
            total_amount: order.total_amount,
            payment_method: order.payment_method,
        })
    }
}

/// "INV-" followed by eight uppercase hex characters.
pub fn generate_invoice_number() -> String {
    let id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("INV-{}", id.to_uppercase())
}

async fn find_order<C: ConnectionTrait>(conn: &C, order_id: i32) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Order", order_id))
}

/// Issues the order's invoice unless one exists. The insert yields to a
/// concurrent request that already issued it.
async fn get_or_create_for<C: ConnectionTrait>(
    conn: &C,
    order: &order::Model,
) -> Result<invoice::Model, ServiceError> {
    let inserted = invoice::Entity::insert(invoice::ActiveModel {
        order_id: Set(order.id),
        invoice_number: Set(generate_invoice_number()),
        total_amount: Set(order.total_amount),
        created_at: Set(Utc::now()),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::column(invoice::Column::OrderId)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(conn)
    .await?;

    let invoice = invoice::Entity::find()
        .filter(invoice::Column::OrderId.eq(order.id))
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::InternalError(format!("Invoice for order {} was not stored", order.id))
        })?;

    if inserted > 0 {
        info!(order_id = order.id, invoice_number = %invoice.invoice_number, "Invoice issued");
    }
    Ok(invoice)
}
