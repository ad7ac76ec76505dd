pub mod cart;
pub mod coupon;
pub mod order;
pub mod order_part;
pub mod product;
pub mod user;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr,
    EntityTrait, Schema, Set, TransactionTrait,
};
use tracing::info;

use crate::entities::{
    cart::Entity as Cart,
    coupon::Entity as Coupon,
    order::Entity as Order,
    order_part::Entity as OrderPart,
    product::{Entity as Product, VariantGroup, VariantGroups, VariantOption},
    user::{Entity as User, Role},
};

/// Opens the database. In-memory SQLite is pinned to a single pooled connection,
/// otherwise every connection would see its own empty database.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options.sqlx_logging(false);
    if database_url.contains(":memory:") || database_url.contains("mode=memory") {
        options.max_connections(1).min_connections(1);
    }
    Database::connect(options).await
}

pub async fn setup_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, User).await?;
    create_table(db, Product).await?;
    create_table(db, Cart).await?;
    create_table(db, Coupon).await?;
    create_table(db, Order).await?;
    create_table(db, OrderPart).await?;
    Ok(())
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(backend.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(backend.build(&index)).await?;
    }
    Ok(())
}

/// Ids of the accounts created by [`seed_demo_data`].
#[derive(Clone, Copy, Debug)]
pub struct DemoAccounts {
    pub admin_id: i32,
    pub vendor_id: i32,
    pub user_id: i32,
}

/// Development fixture: one account per role, a product with a size axis and a coupon.
pub async fn seed_demo_data(db: &DatabaseConnection) -> Result<DemoAccounts, DbErr> {
    let txn = db.begin().await?;

    let admin = user::ActiveModel {
        username: Set("admin".to_owned()),
        role: Set(Role::Admin),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    let vendor = user::ActiveModel {
        username: Set("vendor".to_owned()),
        role: Set(Role::Vendor),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    let shopper = user::ActiveModel {
        username: Set("user".to_owned()),
        role: Set(Role::User),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let mut shirt = product::Model {
        id: 0,
        vendor_id: vendor.id,
        name: "Linen shirt".to_owned(),
        base_price: 2500,
        variants: VariantGroups(vec![VariantGroup {
            name: "Size".to_owned(),
            options: vec![
                VariantOption {
                    value: "Medium".to_owned(),
                    price_modifier: 0,
                    stock: 10,
                    sku: Some("SHIRT-M".to_owned()),
                },
                VariantOption {
                    value: "Large".to_owned(),
                    price_modifier: 200,
                    stock: 5,
                    sku: Some("SHIRT-L".to_owned()),
                },
            ],
        }]),
        total_stock: 0,
        is_active: true,
    };
    shirt.recompute_total_stock();
    product::ActiveModel {
        vendor_id: Set(shirt.vendor_id),
        name: Set(shirt.name),
        base_price: Set(shirt.base_price),
        variants: Set(shirt.variants),
        total_stock: Set(shirt.total_stock),
        is_active: Set(shirt.is_active),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let now = Utc::now();
    coupon::ActiveModel {
        code: Set("WELCOME10".to_owned()),
        discount_type: Set(coupon::DiscountType::Percentage),
        value: Set(10),
        min_order_amount: Set(0),
        max_uses: Set(100),
        used_count: Set(0),
        vendor_id: Set(None),
        is_active: Set(true),
        expires_at: Set(now + Duration::days(30)),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(admin = admin.id, vendor = vendor.id, user = shopper.id, "Seeded demo data");

    Ok(DemoAccounts {
        admin_id: admin.id,
        vendor_id: vendor.id,
        user_id: shopper.id,
    })
}
