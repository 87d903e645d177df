//! Database seeder for Vigil development and testing.
//!
//! Seeds the three-tier plan catalog (free, standard, premium) and
//! activates each version so the API has a current catalog to serve.
//!
//! Usage: cargo run --bin seeder

use chrono::Utc;
use vigil_core::plan::PlanQuotas;
use vigil_db::entities::sea_orm_active_enums::BillingPeriod;
use vigil_db::repositories::{CatalogError, CreateVersionInput, PlanRepository};
use vigil_shared::{Currency, Money};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set in environment");

    println!("Connecting to database...");
    let db = vigil_db::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    let plans = PlanRepository::new(db);

    for input in catalog() {
        seed_plan(&plans, input).await;
    }

    println!("Seeding complete!");
}

/// The development catalog. Prices are VND minor units per month.
fn catalog() -> Vec<CreateVersionInput> {
    let now = Utc::now();

    vec![
        CreateVersionInput {
            code: "free".to_string(),
            version: "2024-01".to_string(),
            tier: 0,
            price: Money::new(0, Currency::Vnd),
            billing_period: BillingPeriod::Monthly,
            quotas: PlanQuotas {
                camera_quota: Some(1),
                retention_days: 7,
                caregiver_seats: Some(1),
                sites: Some(1),
            },
            effective_from: now,
            effective_to: None,
        },
        CreateVersionInput {
            code: "standard".to_string(),
            version: "2024-01".to_string(),
            tier: 1,
            price: Money::new(199_000, Currency::Vnd),
            billing_period: BillingPeriod::Monthly,
            quotas: PlanQuotas {
                camera_quota: Some(4),
                retention_days: 30,
                caregiver_seats: Some(3),
                sites: Some(2),
            },
            effective_from: now,
            effective_to: None,
        },
        CreateVersionInput {
            code: "premium".to_string(),
            version: "2024-01".to_string(),
            tier: 2,
            price: Money::new(499_000, Currency::Vnd),
            billing_period: BillingPeriod::Monthly,
            quotas: PlanQuotas {
                camera_quota: None,
                retention_days: 90,
                caregiver_seats: Some(10),
                sites: Some(5),
            },
            effective_from: now,
            effective_to: None,
        },
    ]
}

/// Publishes and activates one plan version, skipping codes that already
/// have a current version.
async fn seed_plan(plans: &PlanRepository, input: CreateVersionInput) {
    let code = input.code.clone();

    println!("Seeding plan '{code}'...");
    match plans.current_version(&code).await {
        Ok(existing) => {
            println!(
                "  Plan '{code}' already has current version {}, skipping...",
                existing.version
            );
            return;
        }
        Err(CatalogError::PlanNotFound(_)) => {}
        Err(e) => {
            eprintln!("  Failed to check plan '{code}': {e}");
            return;
        }
    }

    let draft = match plans.create_version(input).await {
        Ok(d) => d,
        Err(e) => {
            eprintln!("  Failed to create plan '{code}': {e}");
            return;
        }
    };

    match plans.activate_version(draft.id).await {
        Ok(active) => println!("  Created and activated '{code}' version {}", active.version),
        Err(e) => eprintln!("  Failed to activate plan '{code}': {e}"),
    }
}
