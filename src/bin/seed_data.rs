//! Seed data script - populates the database with a demo catalog
//!
//! Run with: cargo run --bin seed-data
//!
//! This creates:
//! - 8 sarees across silk, cotton, georgette and designer collections
//! - one admin and one customer profile
//!
//! When APP__JWT_SECRET is set, session tokens for both profiles are printed
//! so the admin routes can be exercised with curl.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use serde_json::json;
use std::{sync::Arc, time::Duration as StdDuration};
use tracing::{info, warn};
use uuid::Uuid;

use saree_storefront::{
    auth::{AuthConfig, AuthService},
    entities::{
        product,
        profile::{self, ROLE_ADMIN, ROLE_CUSTOMER},
    },
    migrator::Migrator,
};
use sea_orm_migration::MigratorTrait;

struct SeedProduct {
    name: &'static str,
    description: &'static str,
    price: Decimal,
    original_price: Option<Decimal>,
    category: &'static str,
    fabric: &'static str,
    color: &'static str,
    stock: i32,
    featured: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("=== Saree Storefront Seed Data ===");

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://storefront.db?mode=rwc".to_string());

    let mut options = ConnectOptions::new(database_url.clone());
    options
        .max_connections(5)
        .min_connections(1)
        .connect_timeout(StdDuration::from_secs(10))
        .acquire_timeout(StdDuration::from_secs(10));

    info!("Connecting to database: {}", database_url);
    let db = Database::connect(options).await?;
    Migrator::up(&db, None).await?;

    let products = create_products(&db).await?;
    info!("Created {} products", products.len());

    let admin = create_profile(&db, "Store Admin", "admin@elegancesarees.com", ROLE_ADMIN).await?;
    let customer =
        create_profile(&db, "Priya Sharma", "priya@example.in", ROLE_CUSTOMER).await?;
    info!("Created admin {} and customer {}", admin.id, customer.id);

    match std::env::var("APP__JWT_SECRET") {
        Ok(secret) => {
            let auth = AuthService::new(
                AuthConfig {
                    jwt_secret: secret,
                    jwt_issuer: std::env::var("APP__JWT_ISSUER").ok(),
                },
                Arc::new(db.clone()),
            );
            for (label, who) in [("admin", &admin), ("customer", &customer)] {
                let token = auth.issue_token(who.id, who.email.clone(), Duration::days(7))?;
                info!("{} token: {}", label, token);
            }
        }
        Err(_) => warn!("APP__JWT_SECRET not set; skipping demo tokens"),
    }

    info!("Try: curl http://localhost:8080/api/products?featured=true");
    info!("Or explore interactively at: http://localhost:8080/swagger-ui");
    Ok(())
}

fn catalog() -> Vec<SeedProduct> {
    vec![
        SeedProduct {
            name: "Kanjivaram Silk Saree",
            description: "Handwoven pure mulberry silk with zari temple border.",
            price: dec!(12499),
            original_price: Some(dec!(14999)),
            category: "silk",
            fabric: "Silk",
            color: "Maroon",
            stock: 6,
            featured: true,
        },
        SeedProduct {
            name: "Banarasi Brocade Saree",
            description: "Katan silk with floral brocade pallu.",
            price: dec!(9999),
            original_price: None,
            category: "silk",
            fabric: "Silk",
            color: "Royal Blue",
            stock: 4,
            featured: true,
        },
        SeedProduct {
            name: "Chanderi Cotton Saree",
            description: "Lightweight cotton silk blend for daily wear.",
            price: dec!(2499),
            original_price: Some(dec!(2999)),
            category: "cotton",
            fabric: "Cotton",
            color: "Mint Green",
            stock: 25,
            featured: false,
        },
        SeedProduct {
            name: "Handloom Tant Saree",
            description: "Bengal handloom cotton with contrast border.",
            price: dec!(1499),
            original_price: None,
            category: "cotton",
            fabric: "Cotton",
            color: "White",
            stock: 40,
            featured: false,
        },
        SeedProduct {
            name: "Printed Georgette Saree",
            description: "Flowing georgette with digital floral print.",
            price: dec!(1899),
            original_price: Some(dec!(2299)),
            category: "georgette",
            fabric: "Georgette",
            color: "Peach",
            stock: 18,
            featured: true,
        },
        SeedProduct {
            name: "Sequinned Party Saree",
            description: "Georgette base with all-over sequin work.",
            price: dec!(4599),
            original_price: None,
            category: "georgette",
            fabric: "Georgette",
            color: "Black",
            stock: 3,
            featured: false,
        },
        SeedProduct {
            name: "Designer Bridal Lehenga Saree",
            description: "Pre-draped net saree with zardozi embroidery.",
            price: dec!(18999),
            original_price: Some(dec!(22999)),
            category: "designer",
            fabric: "Net",
            color: "Red",
            stock: 2,
            featured: true,
        },
        SeedProduct {
            name: "Organza Ruffle Saree",
            description: "Sheer organza with ruffled hem and satin blouse piece.",
            price: dec!(3299),
            original_price: None,
            category: "designer",
            fabric: "Organza",
            color: "Lavender",
            stock: 0,
            featured: false,
        },
    ]
}

async fn create_products(db: &DatabaseConnection) -> anyhow::Result<Vec<product::Model>> {
    let now = Utc::now();
    let mut created = Vec::new();

    for (index, seed) in catalog().into_iter().enumerate() {
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(seed.name.to_string()),
            description: Set(Some(seed.description.to_string())),
            price: Set(seed.price),
            original_price: Set(seed.original_price),
            category: Set(Some(seed.category.to_string())),
            subcategory: Set(None),
            fabric: Set(Some(seed.fabric.to_string())),
            color: Set(Some(seed.color.to_string())),
            stock_quantity: Set(Some(seed.stock)),
            images: Set(json!([format!("/images/sarees/{}.jpg", index + 1)])),
            featured: Set(seed.featured),
            active: Set(true),
            // Spread creation times so "newest" sorting is stable
            created_at: Set(now - Duration::minutes(index as i64)),
            updated_at: Set(now),
        };
        created.push(product.insert(db).await?);
    }

    Ok(created)
}

async fn create_profile(
    db: &DatabaseConnection,
    name: &str,
    email: &str,
    role: &str,
) -> anyhow::Result<profile::Model> {
    let now = Utc::now();
    let model = profile::ActiveModel {
        id: Set(Uuid::new_v4()),
        full_name: Set(Some(name.to_string())),
        email: Set(Some(email.to_string())),
        phone: Set(Some("9876543210".to_string())),
        role: Set(role.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;
    Ok(model)
}
