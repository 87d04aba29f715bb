use axum_food_delivery_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::auth::{LoginRequest, RegisterRequest, UpdateProfileRequest},
    error::AppError,
    lifecycle::Role,
    middleware::auth::AuthUser,
    services::auth_service,
    state::AppState,
};
use sea_orm::{ConnectionTrait, Statement};
use uuid::Uuid;

#[tokio::test]
async fn register_login_and_profile_flow() -> anyhow::Result<()> {
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
    unsafe { std::env::set_var("JWT_SECRET", "integration-test-secret") };

    let state = setup_state(&database_url).await?;

    let registered = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "ama@example.com".into(),
            password: "correct horse".into(),
            name: "Ama".into(),
            phone: Some("+237650000001".into()),
            town: None,
            role: None,
        },
    )
    .await?
    .data
    .expect("user");
    assert_eq!(registered.role, "customer");

    // Email is unique.
    let duplicate = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "ama@example.com".into(),
            password: "another".into(),
            name: "Ama Again".into(),
            phone: None,
            town: None,
            role: None,
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    // Privileged roles are provisioned out of band, never self-registered.
    let sneaky = auth_service::register_user(
        &state,
        RegisterRequest {
            email: "boss@example.com".into(),
            password: "root".into(),
            name: "Boss".into(),
            phone: None,
            town: None,
            role: Some("admin".into()),
        },
    )
    .await;
    assert!(matches!(sneaky, Err(AppError::BadRequest(_))));

    let wrong_password = auth_service::login_user(
        &state,
        LoginRequest {
            email: "ama@example.com".into(),
            password: "incorrect horse".into(),
        },
    )
    .await;
    assert!(matches!(wrong_password, Err(AppError::Unauthorized(_))));

    let unknown_email = auth_service::login_user(
        &state,
        LoginRequest {
            email: "nobody@example.com".into(),
            password: "correct horse".into(),
        },
    )
    .await;
    assert!(matches!(unknown_email, Err(AppError::Unauthorized(_))));

    let session = auth_service::login_user(
        &state,
        LoginRequest {
            email: "ama@example.com".into(),
            password: "correct horse".into(),
        },
    )
    .await?
    .data
    .expect("login");
    assert!(!session.token.is_empty());
    assert_eq!(session.user.id, registered.id);

    let me = AuthUser {
        user_id: registered.id,
        role: Role::Customer,
    };

    let verified = auth_service::verify_user(&state, &me)
        .await?
        .data
        .expect("user");
    assert_eq!(verified.email, "ama@example.com");

    // A token for a vanished account fails closed.
    let ghost = AuthUser {
        user_id: Uuid::new_v4(),
        role: Role::Customer,
    };
    let gone = auth_service::verify_user(&state, &ghost).await;
    assert!(matches!(gone, Err(AppError::NotFound)));

    let updated = auth_service::update_profile(
        &state,
        &me,
        UpdateProfileRequest {
            name: Some("Ama Nkeng".into()),
            phone: None,
            town: Some("Bamenda".into()),
        },
    )
    .await?
    .data
    .expect("user");
    assert_eq!(updated.name, "Ama Nkeng");
    assert_eq!(updated.town.as_deref(), Some("Bamenda"));
    assert_eq!(updated.phone.as_deref(), Some("+237650000001"));

    let blank_name = auth_service::update_profile(
        &state,
        &me,
        UpdateProfileRequest {
            name: Some("   ".into()),
            phone: None,
            town: None,
        },
    )
    .await;
    assert!(matches!(blank_name, Err(AppError::BadRequest(_))));

    auth_service::logout_user(&state, &me).await?;

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
