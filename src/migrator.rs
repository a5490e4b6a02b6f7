use sea_orm::DatabaseBackend;
use sea_orm_migration::prelude::*;

use crate::entities::stock_movement::QUANTITY_SCALE;

pub struct Migrator;

/// SQLite caps decimal precision at 16 digits.
fn quantity_precision(manager: &SchemaManager) -> u32 {
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => 16,
        _ => 19,
    }
}

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_reference_tables::Migration),
            Box::new(m20240601_000002_create_stock_ledger_tables::Migration),
            Box::new(m20240601_000003_create_order_tables::Migration),
            Box::new(m20240601_000004_seed_movement_types::Migration),
        ]
    }
}

// Migration implementations

mod m20240601_000001_create_reference_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_reference_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Materials::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Materials::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Materials::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Materials::Name).string().not_null())
                        .col(ColumnDef::new(Materials::UnitOfMeasure).string().not_null())
                        .col(
                            ColumnDef::new(Materials::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Warehouses::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Warehouses::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Warehouses::Name).string().not_null())
                        .col(
                            ColumnDef::new(Warehouses::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Warehouses::MaintenanceInstanceId)
                                .uuid()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(MovementTypes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MovementTypes::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MovementTypes::Operation).string().not_null())
                        .col(
                            ColumnDef::new(MovementTypes::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(MovementTypes::AdjustmentDirection)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(MovementTypes::Description).string().null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MovementTypes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Warehouses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Materials::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Materials {
        Table,
        Id,
        Code,
        Name,
        UnitOfMeasure,
        IsActive,
    }

    #[derive(DeriveIden)]
    pub enum Warehouses {
        Table,
        Id,
        Name,
        IsActive,
        MaintenanceInstanceId,
    }

    #[derive(DeriveIden)]
    pub enum MovementTypes {
        Table,
        Id,
        Operation,
        Code,
        AdjustmentDirection,
        Description,
    }
}

mod m20240601_000002_create_stock_ledger_tables {

    use super::m20240601_000001_create_reference_tables::MovementTypes;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_stock_ledger_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let precision = super::quantity_precision(manager);

            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(StockMovements::WarehouseId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::MaterialId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::MovementTypeId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::Quantity)
                                .decimal_len(precision, super::QUANTITY_SCALE)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::MovementDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::UnitPrice)
                                .decimal_len(precision, super::QUANTITY_SCALE)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::ProcessedByUserId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::CollectedByUserId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::CollectedByWorkerId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::MaintenanceRequestId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::PickingOrderItemId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::RestrictionOrderItemId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(StockMovements::Notes).text().null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_movements_movement_type")
                                .from(StockMovements::Table, StockMovements::MovementTypeId)
                                .to(MovementTypes::Table, MovementTypes::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_pair")
                        .table(StockMovements::Table)
                        .col(StockMovements::WarehouseId)
                        .col(StockMovements::MaterialId)
                        .col(StockMovements::Id)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_picking_item")
                        .table(StockMovements::Table)
                        .col(StockMovements::PickingOrderItemId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WarehouseStocks::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WarehouseStocks::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WarehouseStocks::WarehouseId).uuid().not_null())
                        .col(ColumnDef::new(WarehouseStocks::MaterialId).uuid().not_null())
                        .col(
                            ColumnDef::new(WarehouseStocks::InitialStockQuantity)
                                .decimal_len(precision, super::QUANTITY_SCALE)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WarehouseStocks::BalanceInMinusOut)
                                .decimal_len(precision, super::QUANTITY_SCALE)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WarehouseStocks::ReconciliationFlaggedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WarehouseStocks::UpdatedAt)
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
                        .name("idx_warehouse_stocks_pair")
                        .table(WarehouseStocks::Table)
                        .col(WarehouseStocks::WarehouseId)
                        .col(WarehouseStocks::MaterialId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WarehouseStocks::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        WarehouseId,
        MaterialId,
        MovementTypeId,
        Quantity,
        MovementDate,
        UnitPrice,
        ProcessedByUserId,
        CollectedByUserId,
        CollectedByWorkerId,
        MaintenanceRequestId,
        PickingOrderItemId,
        RestrictionOrderItemId,
        Notes,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum WarehouseStocks {
        Table,
        Id,
        WarehouseId,
        MaterialId,
        InitialStockQuantity,
        BalanceInMinusOut,
        ReconciliationFlaggedAt,
        UpdatedAt,
    }
}

mod m20240601_000003_create_order_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let precision = super::quantity_precision(manager);

            manager
                .create_table(
                    Table::create()
                        .table(RestrictionOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RestrictionOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RestrictionOrders::WarehouseId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RestrictionOrders::Status).string().not_null())
                        .col(ColumnDef::new(RestrictionOrders::Notes).text().null())
                        .col(
                            ColumnDef::new(RestrictionOrders::ProcessedByUserId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RestrictionOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RestrictionOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RestrictionOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RestrictionOrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RestrictionOrderItems::RestrictionOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RestrictionOrderItems::MaterialId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RestrictionOrderItems::QuantityRestricted)
                                .decimal_len(precision, super::QUANTITY_SCALE)
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_restriction_order_items_order")
                                .from(
                                    RestrictionOrderItems::Table,
                                    RestrictionOrderItems::RestrictionOrderId,
                                )
                                .to(RestrictionOrders::Table, RestrictionOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PickingOrders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(PickingOrders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(PickingOrders::WarehouseId).uuid().not_null())
                        .col(ColumnDef::new(PickingOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(PickingOrders::MaintenanceRequestId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(PickingOrders::MaterialRequestId).uuid().null())
                        .col(
                            ColumnDef::new(PickingOrders::BeCollectedByUserId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PickingOrders::BeCollectedByWorkerId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PickingOrders::DesiredPickupDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PickingOrders::ReadyAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PickingOrders::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PickingOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PickingOrders::UpdatedAt)
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
                        .name("idx_picking_orders_warehouse_status")
                        .table(PickingOrders::Table)
                        .col(PickingOrders::WarehouseId)
                        .col(PickingOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PickingOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PickingOrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PickingOrderItems::PickingOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PickingOrderItems::MaterialId).uuid().not_null())
                        .col(
                            ColumnDef::new(PickingOrderItems::MaterialInstanceId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PickingOrderItems::QuantityToPick)
                                .decimal_len(precision, super::QUANTITY_SCALE)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PickingOrderItems::QuantityWithdrawn)
                                .decimal_len(precision, super::QUANTITY_SCALE)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PickingOrderItems::MaterialRequestItemId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PickingOrderItems::UnitPrice)
                                .decimal_len(precision, super::QUANTITY_SCALE)
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_picking_order_items_order")
                                .from(PickingOrderItems::Table, PickingOrderItems::PickingOrderId)
                                .to(PickingOrders::Table, PickingOrders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PickingOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PickingOrders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RestrictionOrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RestrictionOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum RestrictionOrders {
        Table,
        Id,
        WarehouseId,
        Status,
        Notes,
        ProcessedByUserId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum RestrictionOrderItems {
        Table,
        Id,
        RestrictionOrderId,
        MaterialId,
        QuantityRestricted,
    }

    #[derive(DeriveIden)]
    enum PickingOrders {
        Table,
        Id,
        WarehouseId,
        Status,
        MaintenanceRequestId,
        MaterialRequestId,
        BeCollectedByUserId,
        BeCollectedByWorkerId,
        DesiredPickupDate,
        ReadyAt,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PickingOrderItems {
        Table,
        Id,
        PickingOrderId,
        MaterialId,
        MaterialInstanceId,
        QuantityToPick,
        QuantityWithdrawn,
        MaterialRequestItemId,
        UnitPrice,
    }
}

mod m20240601_000004_seed_movement_types {

    use super::m20240601_000001_create_reference_tables::MovementTypes;
    use sea_orm_migration::prelude::*;
    use sea_orm_migration::sea_orm::prelude::Uuid;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_seed_movement_types"
        }
    }

    /// (code, operation, adjustment direction, description)
    const SEED: &[(&str, &str, Option<&str>, &str)] = &[
        ("IN_PURCHASE", "IN", None, "Goods received from a purchase"),
        ("IN_DONATION", "IN", None, "Goods received as a donation"),
        ("IN_RETURN", "IN", None, "Unused material returned to the warehouse"),
        ("IN_TRANSFER", "IN", None, "Received from another warehouse"),
        ("OUT_SERVICE_USAGE", "OUT", None, "Handed out for a maintenance service"),
        ("OUT_DISPOSAL_DAMAGE", "OUT", None, "Disposed of as damaged"),
        ("OUT_DISPOSAL_EXPIRED", "OUT", None, "Disposed of as expired"),
        ("OUT_TRANSFER", "OUT", None, "Sent to another warehouse"),
        (
            "OUT_RESTRICTION_WRITE_OFF",
            "OUT",
            None,
            "Restricted quantity written off",
        ),
        (
            "ADJUSTMENT_INCREASE",
            "ADJUSTMENT",
            Some("INCREASE"),
            "Inventory correction upwards",
        ),
        (
            "ADJUSTMENT_DECREASE",
            "ADJUSTMENT",
            Some("DECREASE"),
            "Inventory correction downwards",
        ),
        (
            "ADJUSTMENT_RECOUNT",
            "ADJUSTMENT",
            Some("BASELINE"),
            "Physical recount; sets a new baseline",
        ),
        (
            "RESERVATION_PICKING_ORDER",
            "RESERVATION",
            None,
            "Soft hold by a picking order",
        ),
        ("RESTRICTION_HOLD", "RESTRICTION", None, "Hold by a restriction order"),
    ];

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut insert = Query::insert();
            insert.into_table(MovementTypes::Table).columns([
                MovementTypes::Id,
                MovementTypes::Operation,
                MovementTypes::Code,
                MovementTypes::AdjustmentDirection,
                MovementTypes::Description,
            ]);

            for (code, operation, direction, description) in SEED {
                insert
                    .values([
                        Uuid::new_v4().into(),
                        (*operation).into(),
                        (*code).into(),
                        direction.map(|d| d.to_string()).into(),
                        (*description).into(),
                    ])
                    .map_err(|e| DbErr::Custom(format!("invalid movement type seed: {}", e)))?;
            }

            manager.exec_stmt(insert.to_owned()).await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let codes: Vec<&str> = SEED.iter().map(|(code, ..)| *code).collect();
            manager
                .exec_stmt(
                    Query::delete()
                        .from_table(MovementTypes::Table)
                        .and_where(Expr::col(MovementTypes::Code).is_in(codes))
                        .to_owned(),
                )
                .await
        }
    }
}
