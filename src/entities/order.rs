use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Order lifecycle state.
///
/// ```text
/// PENDING    -> PAID | PROCESSING | CANCELED
/// PAID       -> PROCESSING | SHIPPED | CANCELED
/// PROCESSING -> SHIPPED | CANCELED
/// SHIPPED    -> COMPLETED
/// COMPLETED, CANCELED are final
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum OrderStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PAID")]
    Paid,
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "SHIPPED")]
    Shipped,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "CANCELED")]
    Canceled,
}

impl OrderStatus {
    pub fn allowed_transitions(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Paid, Processing, Canceled],
            Paid => &[Processing, Shipped, Canceled],
            Processing => &[Shipped, Canceled],
            Shipped => &[Completed],
            Completed | Canceled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_final(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// States from which the buyer may still cancel.
    pub fn is_cancellable_by_customer(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Paid | OrderStatus::Processing
        )
    }

    /// Orders whose total counts as revenue.
    pub fn counts_as_revenue(self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Completed)
    }

    pub fn revenue_statuses() -> Vec<OrderStatus> {
        <OrderStatus as sea_orm::Iterable>::iter()
            .filter(|s| s.counts_as_revenue())
            .collect()
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum PaymentMethod {
    #[sea_orm(string_value = "VN_PAY")]
    VnPay,
    #[sea_orm(string_value = "COD")]
    Cod,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub vnpay_transaction_id: Option<String>,
    pub cancellation_reason: Option<String>,
    pub full_name_shipping: Option<String>,
    pub phone_shipping: Option<String>,
    pub address_shipping: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
    #[sea_orm(has_one = "super::invoice::Entity")]
    Invoice,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Related<super::invoice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoice.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
