use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum_food_delivery_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "admin@example.com", "admin123", "Admin", "admin").await?;
    let owner_id =
        ensure_user(&pool, "owner@example.com", "owner123", "Demo Owner", "owner").await?;
    let customer_id = ensure_user(
        &pool,
        "customer@example.com",
        "customer123",
        "Demo Customer",
        "customer",
    )
    .await?;
    let driver_id = ensure_user(
        &pool,
        "driver@example.com",
        "driver123",
        "Demo Driver",
        "driver",
    )
    .await?;

    let restaurant_id = ensure_restaurant(&pool, owner_id).await?;
    seed_menu(&pool, restaurant_id).await?;

    println!(
        "Seed completed. Admin: {admin_id}, Owner: {owner_id}, Customer: {customer_id}, Driver: {driver_id}"
    );
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    name: &str,
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
        INSERT INTO users (id, email, password_hash, name, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(name)
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

async fn ensure_restaurant(pool: &sqlx::PgPool, owner_id: Uuid) -> anyhow::Result<Uuid> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO restaurants (id, owner_id, name, town, address, delivery_fee, min_order, categories)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (owner_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(owner_id)
    .bind("Mama Njama's Kitchen")
    .bind("Limbe")
    .bind("12 Seaside Road")
    .bind(500_i64)
    .bind(1000_i64)
    .bind(serde_json::json!(["cameroonian", "grill"]))
    .fetch_optional(pool)
    .await?;

    let restaurant_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) =
                sqlx::query_as("SELECT id FROM restaurants WHERE owner_id = $1")
                    .bind(owner_id)
                    .fetch_one(pool)
                    .await?;
            existing.0
        }
    };

    println!("Ensured restaurant {restaurant_id}");
    Ok(restaurant_id)
}

async fn seed_menu(pool: &sqlx::PgPool, restaurant_id: Uuid) -> anyhow::Result<()> {
    let items = vec![
        ("Ndole with Plantains", "Bitterleaf stew, peanut base", 2500_i64, "mains"),
        ("Grilled Bar Fish", "Whole fish with pepper sauce", 3500_i64, "grill"),
        ("Jollof Rice", "Smoky tomato rice", 2000_i64, "mains"),
        ("Puff-Puff", "Fried dough, six pieces", 500_i64, "snacks"),
    ];

    for (name, description, price, category) in items {
        sqlx::query(
            r#"
            INSERT INTO menu_items (id, restaurant_id, name, description, price, category)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE NOT EXISTS (
                SELECT 1 FROM menu_items WHERE restaurant_id = $2 AND name = $3
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(restaurant_id)
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(category)
        .execute(pool)
        .await?;
    }

    println!("Seeded menu items");
    Ok(())
}
