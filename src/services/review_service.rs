use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::reviews::{CreateReviewRequest, ReviewList},
    entity::{
        orders::Entity as Orders,
        restaurants::{ActiveModel as RestaurantActive, Entity as Restaurants},
        reviews::{
            ActiveModel as ReviewActive, Column as ReviewCol, Entity as Reviews,
            Model as ReviewModel,
        },
    },
    error::{AppError, AppResult},
    lifecycle::OrderStatus,
    middleware::auth::AuthUser,
    models::Review,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

/// Records a review for a delivered order and folds it into the
/// restaurant's rating.
///
/// Insert and aggregate run in one transaction holding the restaurant row
/// lock, so two concurrent reviewers serialize and neither mean overwrites
/// the other. Any failure rolls the whole thing back; the review and the
/// rating land together or not at all.
pub async fn create_review(
    state: &AppState,
    user: &AuthUser,
    payload: CreateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::BadRequest(
            "Rating must be between 1 and 5".into(),
        ));
    }
    if payload
        .comment
        .as_deref()
        .is_some_and(|c| c.trim().is_empty())
    {
        return Err(AppError::BadRequest("Comment must not be empty".into()));
    }

    let order = Orders::find_by_id(payload.order_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if order.customer_id != user.user_id {
        return Err(AppError::Forbidden);
    }
    if order.status != OrderStatus::Delivered.as_str() {
        return Err(AppError::Conflict(
            "Only delivered orders can be reviewed".into(),
        ));
    }

    let txn = state.orm.begin().await?;

    let restaurant = Restaurants::find_by_id(order.restaurant_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let review = ReviewActive {
        id: Set(Uuid::new_v4()),
        restaurant_id: Set(restaurant.id),
        customer_id: Set(user.user_id),
        order_id: Set(order.id),
        rating: Set(payload.rating),
        comment: Set(payload.comment),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let backend = txn.get_database_backend();
    let row = txn
        .query_one(Statement::from_sql_and_values(
            backend,
            "SELECT AVG(rating)::float8 AS avg_rating FROM reviews WHERE restaurant_id = $1",
            [restaurant.id.into()],
        ))
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("rating aggregate returned no row")))?;
    let avg: Option<f64> = row.try_get("", "avg_rating")?;
    let rating = avg.unwrap_or(0.0);

    let restaurant_id = restaurant.id;
    let mut active: RestaurantActive = restaurant.into();
    active.rating = Set(rating);
    active.update(&txn).await?;

    txn.commit().await?;

    tracing::debug!(restaurant_id = %restaurant_id, rating, "restaurant rating recomputed");

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "review_create",
        Some("reviews"),
        Some(serde_json::json!({
            "review_id": review.id,
            "restaurant_id": restaurant_id,
            "rating": review.rating,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Review submitted",
        review_from_entity(review),
        Some(Meta::empty()),
    ))
}

/// Public review feed for a restaurant, newest first.
pub async fn list_restaurant_reviews(
    state: &AppState,
    restaurant_id: Uuid,
    pagination: Pagination,
) -> AppResult<ApiResponse<ReviewList>> {
    Restaurants::find_by_id(restaurant_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let (page, limit, offset) = pagination.normalize();
    let finder = Reviews::find()
        .filter(ReviewCol::RestaurantId.eq(restaurant_id))
        .order_by_desc(ReviewCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(review_from_entity)
        .collect();

    let meta = Meta::paginated(page, limit, total);
    Ok(ApiResponse::success(
        "Reviews",
        ReviewList { items },
        Some(meta),
    ))
}

pub(crate) fn review_from_entity(model: ReviewModel) -> Review {
    Review {
        id: model.id,
        restaurant_id: model.restaurant_id,
        customer_id: model.customer_id,
        order_id: model.order_id,
        rating: model.rating,
        comment: model.comment,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
