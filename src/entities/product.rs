use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    /// Never negative; only changed through conditional updates.
    pub stock: i32,
    #[sea_orm(unique)]
    pub barcode: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub movement: Option<String>,
    pub case_material: Option<String>,
    pub strap_material: Option<String>,
    pub dial_color: Option<String>,
    pub water_resistance: Option<String>,
    pub category_id: i32,
    pub visible: bool,
    pub average_rating: Decimal,
    pub review_count: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,
    #[sea_orm(has_many = "super::product_image::Entity")]
    Images,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::product_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Images.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
