use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240501_000001_create_users_table::Migration),
            Box::new(m20240501_000002_create_catalog_tables::Migration),
            Box::new(m20240501_000003_create_cart_tables::Migration),
            Box::new(m20240501_000004_create_order_tables::Migration),
            Box::new(m20240501_000005_create_engagement_tables::Migration),
            Box::new(m20240501_000006_create_reset_password_tokens_table::Migration),
        ]
    }
}

mod m20240501_000001_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240501_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Users::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Users::Username).string_len(50).not_null())
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(ColumnDef::new(Users::Email).string_len(100).not_null())
                        .col(ColumnDef::new(Users::FirstName).string_len(50).null())
                        .col(ColumnDef::new(Users::LastName).string_len(50).null())
                        .col(ColumnDef::new(Users::Phone).string_len(15).null())
                        .col(ColumnDef::new(Users::Address).string_len(255).null())
                        .col(ColumnDef::new(Users::DateOfBirth).date().null())
                        .col(ColumnDef::new(Users::Role).string_len(20).not_null())
                        .col(ColumnDef::new(Users::Provider).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("ux_users_username")
                        .table(Users::Table)
                        .col(Users::Username)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("ux_users_email")
                        .table(Users::Table)
                        .col(Users::Email)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Users {
        Table,
        Id,
        Username,
        PasswordHash,
        Email,
        FirstName,
        LastName,
        Phone,
        Address,
        DateOfBirth,
        Role,
        Provider,
        CreatedAt,
    }
}

mod m20240501_000002_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240501_000002_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Categories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Categories::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Categories::Name).string_len(100).not_null())
                        .col(ColumnDef::new(Categories::Description).text().null())
                        .col(
                            ColumnDef::new(Categories::Visible)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Categories::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Categories::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string_len(100).not_null())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(
                            ColumnDef::new(Products::Price)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::Stock)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(Products::Stock).gte(0)),
                        )
                        .col(ColumnDef::new(Products::Barcode).string_len(64).null())
                        .col(ColumnDef::new(Products::Brand).string_len(100).null())
                        .col(ColumnDef::new(Products::Model).string_len(100).null())
                        .col(ColumnDef::new(Products::Movement).string_len(100).null())
                        .col(ColumnDef::new(Products::CaseMaterial).string_len(100).null())
                        .col(ColumnDef::new(Products::StrapMaterial).string_len(100).null())
                        .col(ColumnDef::new(Products::DialColor).string_len(50).null())
                        .col(ColumnDef::new(Products::WaterResistance).string_len(50).null())
                        .col(ColumnDef::new(Products::CategoryId).integer().not_null())
                        .col(
                            ColumnDef::new(Products::Visible)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::AverageRating)
                                .decimal_len(3, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::ReviewCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_products_category_id")
                                .from(Products::Table, Products::CategoryId)
                                .to(Categories::Table, Categories::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("ux_products_barcode")
                        .table(Products::Table)
                        .col(Products::Barcode)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_category_id")
                        .table(Products::Table)
                        .col(Products::CategoryId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_created_at")
                        .table(Products::Table)
                        .col(Products::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductImages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductImages::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ProductImages::ProductId).integer().not_null())
                        .col(ColumnDef::new(ProductImages::ImageUrl).string_len(512).not_null())
                        .col(
                            ColumnDef::new(ProductImages::IsPrimary)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ProductImages::DisplayOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_images_product_id")
                                .from(ProductImages::Table, ProductImages::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_images_product_id")
                        .table(ProductImages::Table)
                        .col(ProductImages::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductImages::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Categories::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Categories {
        Table,
        Id,
        Name,
        Description,
        Visible,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(crate) enum Products {
        Table,
        Id,
        Name,
        Description,
        Price,
        Stock,
        Barcode,
        Brand,
        Model,
        Movement,
        CaseMaterial,
        StrapMaterial,
        DialColor,
        WaterResistance,
        CategoryId,
        Visible,
        AverageRating,
        ReviewCount,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductImages {
        Table,
        Id,
        ProductId,
        ImageUrl,
        IsPrimary,
        DisplayOrder,
    }
}

mod m20240501_000003_create_cart_tables {
    use super::m20240501_000001_create_users_table::Users;
    use super::m20240501_000002_create_catalog_tables::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240501_000003_create_cart_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Carts::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Carts::UserId).integer().not_null())
                        .col(
                            ColumnDef::new(Carts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::LastUpdated)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_carts_user_id")
                                .from(Carts::Table, Carts::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("ux_carts_user_id")
                        .table(Carts::Table)
                        .col(Carts::UserId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartItems::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(CartItems::CartId).integer().not_null())
                        .col(ColumnDef::new(CartItems::ProductId).integer().not_null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(CartItems::PriceAtAddition)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_cart_id")
                                .from(CartItems::Table, CartItems::CartId)
                                .to(Carts::Table, Carts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_product_id")
                                .from(CartItems::Table, CartItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("ux_cart_items_cart_product")
                        .table(CartItems::Table)
                        .col(CartItems::CartId)
                        .col(CartItems::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Carts {
        Table,
        Id,
        UserId,
        CreatedAt,
        LastUpdated,
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        CartId,
        ProductId,
        Quantity,
        PriceAtAddition,
    }
}

mod m20240501_000004_create_order_tables {
    use super::m20240501_000001_create_users_table::Users;
    use super::m20240501_000002_create_catalog_tables::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240501_000004_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Orders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Orders::UserId).integer().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::PaymentMethod).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::VnpayTransactionId).string_len(100).null())
                        .col(ColumnDef::new(Orders::CancellationReason).string().null())
                        .col(ColumnDef::new(Orders::FullNameShipping).string_len(50).null())
                        .col(ColumnDef::new(Orders::PhoneShipping).string_len(15).null())
                        .col(ColumnDef::new(Orders::AddressShipping).string_len(255).null())
                        .col(ColumnDef::new(Orders::Notes).text().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_user_id")
                                .from(Orders::Table, Orders::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_user_id")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_created_at")
                        .table(Orders::Table)
                        .col(Orders::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).integer().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).integer().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::Price)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_product_id")
                                .from(OrderItems::Table, OrderItems::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Invoices::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Invoices::OrderId).integer().not_null())
                        .col(ColumnDef::new(Invoices::InvoiceNumber).string_len(100).not_null())
                        .col(
                            ColumnDef::new(Invoices::TotalAmount)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoices_order_id")
                                .from(Invoices::Table, Invoices::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("ux_invoices_order_id")
                        .table(Invoices::Table)
                        .col(Invoices::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        UserId,
        TotalAmount,
        Status,
        PaymentMethod,
        VnpayTransactionId,
        CancellationReason,
        FullNameShipping,
        PhoneShipping,
        AddressShipping,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        Quantity,
        Price,
    }

    #[derive(DeriveIden)]
    enum Invoices {
        Table,
        Id,
        OrderId,
        InvoiceNumber,
        TotalAmount,
        CreatedAt,
    }
}

mod m20240501_000005_create_engagement_tables {
    use super::m20240501_000001_create_users_table::Users;
    use super::m20240501_000002_create_catalog_tables::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240501_000005_create_engagement_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Favorites::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Favorites::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Favorites::UserId).integer().not_null())
                        .col(ColumnDef::new(Favorites::ProductId).integer().not_null())
                        .col(
                            ColumnDef::new(Favorites::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_favorites_user_id")
                                .from(Favorites::Table, Favorites::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_favorites_product_id")
                                .from(Favorites::Table, Favorites::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("ux_favorites_user_product")
                        .table(Favorites::Table)
                        .col(Favorites::UserId)
                        .col(Favorites::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductReviews::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductReviews::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ProductReviews::ProductId).integer().not_null())
                        .col(ColumnDef::new(ProductReviews::UserId).integer().not_null())
                        .col(ColumnDef::new(ProductReviews::OrderId).integer().not_null())
                        .col(
                            ColumnDef::new(ProductReviews::Rating)
                                .integer()
                                .not_null()
                                .check(Expr::col(ProductReviews::Rating).between(1, 5)),
                        )
                        .col(ColumnDef::new(ProductReviews::Comment).string_len(1000).null())
                        .col(
                            ColumnDef::new(ProductReviews::ReviewDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductReviews::IsVisible)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_reviews_product_id")
                                .from(ProductReviews::Table, ProductReviews::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_reviews_user_id")
                                .from(ProductReviews::Table, ProductReviews::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("ux_product_reviews_user_product_order")
                        .table(ProductReviews::Table)
                        .col(ProductReviews::UserId)
                        .col(ProductReviews::ProductId)
                        .col(ProductReviews::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_reviews_product_id")
                        .table(ProductReviews::Table)
                        .col(ProductReviews::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductReviews::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Favorites::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Favorites {
        Table,
        Id,
        UserId,
        ProductId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductReviews {
        Table,
        Id,
        ProductId,
        UserId,
        OrderId,
        Rating,
        Comment,
        ReviewDate,
        IsVisible,
    }
}

mod m20240501_000006_create_reset_password_tokens_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240501_000006_create_reset_password_tokens_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ResetPasswordTokens::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ResetPasswordTokens::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(ResetPasswordTokens::Email)
                                .string_len(100)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ResetPasswordTokens::Token)
                                .string_len(6)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ResetPasswordTokens::ExpiryDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_reset_password_tokens_email")
                        .table(ResetPasswordTokens::Table)
                        .col(ResetPasswordTokens::Email)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ResetPasswordTokens::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ResetPasswordTokens {
        Table,
        Id,
        Email,
        Token,
        ExpiryDate,
    }
}
