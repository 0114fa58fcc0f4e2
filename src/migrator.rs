use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_orders_table::Migration),
            Box::new(m20250301_000002_create_order_items_table::Migration),
            Box::new(m20250301_000003_create_pending_payments_table::Migration),
            Box::new(m20250301_000004_create_stock_levels_table::Migration),
        ]
    }
}

mod m20250301_000001_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000001_create_orders_table"
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
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::OrderStatus).string_len(32).not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Orders::FulfillmentStatus)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::PaymentMethod).string_len(32).not_null())
                        .col(ColumnDef::new(Orders::Subtotal).decimal_len(12, 2).not_null())
                        .col(
                            ColumnDef::new(Orders::ShippingCost)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::Discount)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Total).decimal_len(12, 2).not_null())
                        .col(ColumnDef::new(Orders::CustomerName).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerEmail).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerPhone).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerDni).string().null())
                        .col(ColumnDef::new(Orders::AddressLine).string().not_null())
                        .col(ColumnDef::new(Orders::DistrictCode).string().not_null())
                        .col(ColumnDef::new(Orders::AddressReference).string().null())
                        .col(ColumnDef::new(Orders::ShippingRateId).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingCarrier).string().null())
                        .col(ColumnDef::new(Orders::ShippingEstimatedDays).string().null())
                        .col(ColumnDef::new(Orders::CouponCode).string().null())
                        .col(ColumnDef::new(Orders::AdminNotes).text().null())
                        .col(ColumnDef::new(Orders::TrackingNumber).string().null())
                        .col(ColumnDef::new(Orders::Courier).string().null())
                        .col(ColumnDef::new(Orders::ChargeId).string().null())
                        .col(
                            ColumnDef::new(Orders::ViewToken)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Orders::IdempotencyKey)
                                .string_len(200)
                                .null()
                                .unique_key(),
                        )
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
                        .col(ColumnDef::new(Orders::PaidAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Orders::ShippedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DeliveredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_payment_status_created_at")
                        .table(Orders::Table)
                        .col(Orders::PaymentStatus)
                        .col(Orders::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Orders {
        Table,
        Id,
        OrderNumber,
        OrderStatus,
        PaymentStatus,
        FulfillmentStatus,
        PaymentMethod,
        Subtotal,
        ShippingCost,
        Discount,
        Total,
        CustomerName,
        CustomerEmail,
        CustomerPhone,
        CustomerDni,
        AddressLine,
        DistrictCode,
        AddressReference,
        ShippingRateId,
        ShippingCarrier,
        ShippingEstimatedDays,
        CouponCode,
        AdminNotes,
        TrackingNumber,
        Courier,
        ChargeId,
        ViewToken,
        IdempotencyKey,
        CreatedAt,
        UpdatedAt,
        PaidAt,
        ShippedAt,
        DeliveredAt,
        Version,
    }
}

mod m20250301_000002_create_order_items_table {
    use super::m20250301_000001_create_orders_table::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000002_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::VariantId).uuid().null())
                        .col(ColumnDef::new(OrderItems::ProductName).string().not_null())
                        .col(ColumnDef::new(OrderItems::VariantName).string().null())
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::LineTotal)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::Image).string().null())
                        .col(ColumnDef::new(OrderItems::Options).text().null())
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
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
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        VariantId,
        ProductName,
        VariantName,
        UnitPrice,
        Quantity,
        LineTotal,
        Image,
        Options,
        CreatedAt,
    }
}

mod m20250301_000003_create_pending_payments_table {
    use super::m20250301_000001_create_orders_table::Orders;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000003_create_pending_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PendingPayments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PendingPayments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PendingPayments::OrderId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PendingPayments::VerificationStatus)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PendingPayments::ProofImageUrl).string().null())
                        .col(
                            ColumnDef::new(PendingPayments::CustomerReference)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(PendingPayments::ReviewNotes).text().null())
                        .col(
                            ColumnDef::new(PendingPayments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PendingPayments::SubmittedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PendingPayments::ReviewedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_pending_payments_order_id")
                                .from(PendingPayments::Table, PendingPayments::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PendingPayments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PendingPayments {
        Table,
        Id,
        OrderId,
        VerificationStatus,
        ProofImageUrl,
        CustomerReference,
        ReviewNotes,
        CreatedAt,
        SubmittedAt,
        ReviewedAt,
    }
}

mod m20250301_000004_create_stock_levels_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250301_000004_create_stock_levels_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockLevels::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockLevels::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLevels::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockLevels::VariantId).uuid().null())
                        .col(
                            ColumnDef::new(StockLevels::Available)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLevels::UpdatedAt)
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
                        .name("idx_stock_levels_product_variant")
                        .table(StockLevels::Table)
                        .col(StockLevels::ProductId)
                        .col(StockLevels::VariantId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockLevels::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockLevels {
        Table,
        Id,
        ProductId,
        VariantId,
        Available,
        UpdatedAt,
    }
}
