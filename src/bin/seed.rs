use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let pool = create_pool(&config.database_url).await?;

    let admin_id = ensure_user_with_role(&pool, "admin@example.com", "admin123", "admin").await?;
    let user_id = ensure_user_with_role(&pool, "user@example.com", "user123", "user").await?;
    seed_catalog(&pool).await?;
    seed_coupons(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user_with_role(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    // If user already exists, fetch id
    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products = vec![
        ("Storefront Hoodie", "Warm hoodie for late deploys", 550000, 50),
        ("Ferris Mug", "Coffee tastes better with Ferris", 120000, 100),
        ("Sticker Pack", "Decorate your laptop", 50000, 200),
        ("E-book: Async Rust", "Learn async Rust patterns", 250000, 75),
    ];

    for (name, desc, price, stock) in products {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO products (id, name, description, price, stock)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(stock)
        .fetch_optional(pool)
        .await?;

        // Size variants for the hoodie only.
        if name == "Storefront Hoodie" {
            if let Some((product_id,)) = row {
                for (variant, price, stock) in [("S", 550000, 10), ("M", 550000, 20), ("L", 580000, 15)] {
                    sqlx::query(
                        r#"
                        INSERT INTO product_variants (id, product_id, name, price, stock)
                        VALUES ($1, $2, $3, $4, $5)
                        ON CONFLICT (product_id, name) DO NOTHING
                        "#,
                    )
                    .bind(Uuid::new_v4())
                    .bind(product_id)
                    .bind(variant)
                    .bind(price)
                    .bind(stock)
                    .execute(pool)
                    .await?;
                }
            }
        }
    }

    println!("Seeded catalog");
    Ok(())
}

async fn seed_coupons(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let expires = Utc::now() + Duration::days(30);
    let coupons = vec![
        ("WELCOME10", "percent", 10i64, None::<i32>),
        ("LAUNCH50", "fixed", 50000i64, Some(100)),
    ];

    for (code, discount_type, amount, usage_limit) in coupons {
        sqlx::query(
            r#"
            INSERT INTO coupons (id, code, discount_type, amount, expires_at, usage_limit)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(discount_type)
        .bind(amount)
        .bind(expires)
        .bind(usage_limit)
        .execute(pool)
        .await?;
    }

    println!("Seeded coupons");
    Ok(())
}
