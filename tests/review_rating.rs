use axum_food_delivery_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{restaurants::CreateRestaurantRequest, reviews::CreateReviewRequest},
    entity::{orders::ActiveModel as OrderActive, users::ActiveModel as UserActive},
    error::AppError,
    lifecycle::{OrderStatus, Role},
    middleware::auth::AuthUser,
    routes::params::Pagination,
    services::{restaurant_service, review_service},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

// Reviews only land on delivered orders, and every accepted review folds
// into the restaurant's mean rating.
#[tokio::test]
async fn reviews_update_restaurant_rating() -> anyhow::Result<()> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(());
            }
        };

    let state = setup_state(&database_url).await?;

    let owner_id = create_user(&state, Role::Owner, "owner@example.com").await?;
    let first_id = create_user(&state, Role::Customer, "first@example.com").await?;
    let second_id = create_user(&state, Role::Customer, "second@example.com").await?;

    let owner = AuthUser {
        user_id: owner_id,
        role: Role::Owner,
    };
    let first = AuthUser {
        user_id: first_id,
        role: Role::Customer,
    };
    let second = AuthUser {
        user_id: second_id,
        role: Role::Customer,
    };

    let restaurant = restaurant_service::create_restaurant(
        &state,
        &owner,
        CreateRestaurantRequest {
            name: "Chez Therese".into(),
            town: "Douala".into(),
            address: "12 Rue Joffre".into(),
            delivery_fee: 300,
            min_order: 1000,
            categories: vec!["cameroonian".into()],
        },
    )
    .await?
    .data
    .expect("restaurant");
    assert_eq!(restaurant.rating, 0.0);

    let first_order = seed_order(&state, first_id, restaurant.id, OrderStatus::Delivered).await?;
    let second_order = seed_order(&state, second_id, restaurant.id, OrderStatus::Delivered).await?;
    let pending_order = seed_order(&state, first_id, restaurant.id, OrderStatus::Pending).await?;

    // Ratings live on a 1..=5 scale.
    let out_of_range = review_service::create_review(
        &state,
        &first,
        CreateReviewRequest {
            order_id: first_order,
            rating: 6,
            comment: None,
        },
    )
    .await;
    assert!(matches!(out_of_range, Err(AppError::BadRequest(_))));

    // The order has to be delivered first.
    let too_early = review_service::create_review(
        &state,
        &first,
        CreateReviewRequest {
            order_id: pending_order,
            rating: 4,
            comment: None,
        },
    )
    .await;
    assert!(matches!(too_early, Err(AppError::Conflict(_))));

    // Only the customer who placed the order may review it.
    let not_yours = review_service::create_review(
        &state,
        &second,
        CreateReviewRequest {
            order_id: first_order,
            rating: 1,
            comment: Some("never ordered this".into()),
        },
    )
    .await;
    assert!(matches!(not_yours, Err(AppError::Forbidden)));

    // Two concurrent reviews serialize on the restaurant row; both count.
    let (a, b) = tokio::join!(
        review_service::create_review(
            &state,
            &first,
            CreateReviewRequest {
                order_id: first_order,
                rating: 5,
                comment: Some("Best ndole in town".into()),
            },
        ),
        review_service::create_review(
            &state,
            &second,
            CreateReviewRequest {
                order_id: second_order,
                rating: 3,
                comment: None,
            },
        ),
    );
    a?;
    b?;

    let rated = restaurant_service::get_restaurant(&state, restaurant.id)
        .await?
        .data
        .expect("restaurant");
    assert!(
        (rated.rating - 4.0).abs() < f64::EPSILON,
        "mean of 5 and 3 should be 4.0, got {}",
        rated.rating
    );

    let reviews = review_service::list_restaurant_reviews(
        &state,
        restaurant.id,
        Pagination {
            page: None,
            per_page: None,
        },
    )
    .await?;
    assert_eq!(reviews.meta.and_then(|m| m.total), Some(2));

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;
    let orm = create_orm_conn(database_url).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE audit_logs, reviews, order_items, orders, menu_items, restaurants, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState::new(pool, orm))
}

async fn create_user(state: &AppState, role: Role, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        name: Set(email.split('@').next().unwrap_or("user").to_string()),
        phone: Set(None),
        town: Set(None),
        role: Set(role.as_str().into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn seed_order(
    state: &AppState,
    customer_id: Uuid,
    restaurant_id: Uuid,
    status: OrderStatus,
) -> anyhow::Result<Uuid> {
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer_id),
        restaurant_id: Set(restaurant_id),
        driver_id: Set(None),
        status: Set(status.as_str().into()),
        delivery_address: Set(Some("Akwa".into())),
        subtotal: Set(1300),
        delivery_fee: Set(300),
        total: Set(1600),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(order.id)
}
