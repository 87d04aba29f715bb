use axum_food_delivery_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        menus::CreateMenuItemRequest,
        orders::{CreateOrderRequest, OrderItemRequest, UpdateOrderStatusRequest},
        restaurants::CreateRestaurantRequest,
    },
    entity::users::ActiveModel as UserActive,
    error::AppError,
    lifecycle::Role,
    middleware::auth::AuthUser,
    routes::params::{OrderListQuery, Pagination},
    services::{menu_service, order_service, restaurant_service},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

// Integration flow: customer places an order, the kitchen walks it to ready,
// two drivers race to accept it, the winner delivers it.
#[tokio::test]
async fn order_lifecycle_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
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

    let customer_id = create_user(&state, Role::Customer, "customer@example.com").await?;
    let owner_id = create_user(&state, Role::Owner, "owner@example.com").await?;
    let driver_a_id = create_user(&state, Role::Driver, "driver.a@example.com").await?;
    let driver_b_id = create_user(&state, Role::Driver, "driver.b@example.com").await?;

    let customer = AuthUser {
        user_id: customer_id,
        role: Role::Customer,
    };
    let owner = AuthUser {
        user_id: owner_id,
        role: Role::Owner,
    };
    let driver_a = AuthUser {
        user_id: driver_a_id,
        role: Role::Driver,
    };
    let driver_b = AuthUser {
        user_id: driver_b_id,
        role: Role::Driver,
    };

    // Owner opens a restaurant with two dishes.
    let restaurant = restaurant_service::create_restaurant(
        &state,
        &owner,
        CreateRestaurantRequest {
            name: "Savanna Grill".into(),
            town: "Buea".into(),
            address: "1 Molyko Road".into(),
            delivery_fee: 200,
            min_order: 1000,
            categories: vec!["grill".into()],
        },
    )
    .await?
    .data
    .expect("restaurant");

    let ndole = menu_service::create_menu_item(
        &state,
        &owner,
        restaurant.id,
        CreateMenuItemRequest {
            name: "Ndole".into(),
            description: Some("Bitterleaf stew".into()),
            price: 500,
            category: "mains".into(),
        },
    )
    .await?
    .data
    .expect("menu item");

    let fish = menu_service::create_menu_item(
        &state,
        &owner,
        restaurant.id,
        CreateMenuItemRequest {
            name: "Grilled Fish".into(),
            description: None,
            price: 300,
            category: "grill".into(),
        },
    )
    .await?
    .data
    .expect("menu item");

    // The server recomputes totals; a stale client total is rejected.
    let mismatch = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            restaurant_id: restaurant.id,
            items: vec![
                OrderItemRequest {
                    menu_item_id: ndole.id,
                    quantity: 2,
                },
                OrderItemRequest {
                    menu_item_id: fish.id,
                    quantity: 1,
                },
            ],
            delivery_address: Some("Mile 17".into()),
            total: 1400,
        },
    )
    .await;
    assert!(matches!(mismatch, Err(AppError::BadRequest(_))));

    // 2 * 500 + 300 = 1300 subtotal, 200 fee.
    let placed = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            restaurant_id: restaurant.id,
            items: vec![
                OrderItemRequest {
                    menu_item_id: ndole.id,
                    quantity: 2,
                },
                OrderItemRequest {
                    menu_item_id: fish.id,
                    quantity: 1,
                },
            ],
            delivery_address: Some("Mile 17".into()),
            total: 1500,
        },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(placed.order.status, "pending");
    assert_eq!(placed.order.subtotal, 1300);
    assert_eq!(placed.order.delivery_fee, 200);
    assert_eq!(placed.order.total, 1500);
    assert_eq!(placed.items.len(), 2);

    // A lone fish is below the 1000 minimum.
    let small = order_service::create_order(
        &state,
        &customer,
        CreateOrderRequest {
            restaurant_id: restaurant.id,
            items: vec![OrderItemRequest {
                menu_item_id: fish.id,
                quantity: 1,
            }],
            delivery_address: None,
            total: 500,
        },
    )
    .await;
    assert!(matches!(small, Err(AppError::BadRequest(_))));

    let order_id = placed.order.id;

    // Customers cannot drive the lifecycle.
    let customer_push = order_service::update_order_status(
        &state,
        &customer,
        order_id,
        UpdateOrderStatusRequest {
            status: "confirmed".into(),
            driver_id: None,
        },
    )
    .await;
    assert!(matches!(customer_push, Err(AppError::Forbidden)));

    // No skipping stages.
    let skip = order_service::update_order_status(
        &state,
        &owner,
        order_id,
        UpdateOrderStatusRequest {
            status: "ready".into(),
            driver_id: None,
        },
    )
    .await;
    assert!(matches!(skip, Err(AppError::Conflict(_))));

    // Kitchen advances one stage at a time.
    for status in ["confirmed", "preparing", "ready"] {
        let resp = order_service::update_order_status(
            &state,
            &owner,
            order_id,
            UpdateOrderStatusRequest {
                status: status.into(),
                driver_id: None,
            },
        )
        .await?;
        assert_eq!(resp.data.expect("order").order.status, status);
    }

    // The ready order is discoverable by drivers.
    let available = order_service::list_available_orders(
        &state,
        &driver_a,
        Pagination {
            page: None,
            per_page: None,
        },
    )
    .await?
    .data
    .expect("available");
    assert_eq!(available.items.len(), 1);

    // Two drivers race for the same order; exactly one wins.
    let (a, b) = tokio::join!(
        order_service::accept_delivery(&state, &driver_a, order_id),
        order_service::accept_delivery(&state, &driver_b, order_id),
    );
    let a_won = a.is_ok();
    let b_won = b.is_ok();
    assert!(a_won ^ b_won, "exactly one driver may claim the order");
    let (winner, claimed, lost) = if a_won {
        (&driver_a, a?, b)
    } else {
        (&driver_b, b?, a)
    };
    assert!(matches!(lost, Err(AppError::Conflict(_))));

    let claimed = claimed.data.expect("claimed order");
    assert_eq!(claimed.order.status, "delivering");
    assert_eq!(claimed.order.driver_id, Some(winner.user_id));

    // Nothing is left for the next driver to discover.
    let drained = order_service::list_available_orders(
        &state,
        &driver_b,
        Pagination {
            page: None,
            per_page: None,
        },
    )
    .await?
    .data
    .expect("available");
    assert!(drained.items.is_empty());

    // Only the assigned driver completes the delivery.
    let other = if winner.user_id == driver_a_id {
        &driver_b
    } else {
        &driver_a
    };
    let outsider = order_service::update_order_status(
        &state,
        other,
        order_id,
        UpdateOrderStatusRequest {
            status: "delivered".into(),
            driver_id: None,
        },
    )
    .await;
    assert!(matches!(outsider, Err(AppError::Forbidden)));

    let done = order_service::update_order_status(
        &state,
        winner,
        order_id,
        UpdateOrderStatusRequest {
            status: "delivered".into(),
            driver_id: None,
        },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(done.order.status, "delivered");

    // Delivered is terminal.
    let resurrect = order_service::update_order_status(
        &state,
        &owner,
        order_id,
        UpdateOrderStatusRequest {
            status: "cancelled".into(),
            driver_id: None,
        },
    )
    .await;
    assert!(matches!(resurrect, Err(AppError::Conflict(_))));

    // Each participant sees the order where they expect it.
    let mine = order_service::list_my_orders(&state, &customer, default_query())
        .await?
        .data
        .expect("orders");
    assert_eq!(mine.items.len(), 1);

    let assigned = order_service::list_assigned_orders(&state, winner, default_query())
        .await?
        .data
        .expect("orders");
    assert_eq!(assigned.items.len(), 1);

    let incoming =
        order_service::list_restaurant_orders(&state, &owner, restaurant.id, default_query())
            .await?
            .data
            .expect("orders");
    assert_eq!(incoming.items.len(), 1);

    Ok(())
}

fn default_query() -> OrderListQuery {
    OrderListQuery {
        pagination: Pagination {
            page: None,
            per_page: None,
        },
        status: None,
        sort_order: None,
    }
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
