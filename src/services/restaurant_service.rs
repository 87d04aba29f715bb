use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::restaurants::{CreateRestaurantRequest, RestaurantList, UpdateRestaurantRequest},
    entity::restaurants::{
        ActiveModel as RestaurantActive, Categories, Column as RestaurantCol,
        Entity as Restaurants, Model as RestaurantModel,
    },
    error::{AppError, AppResult},
    lifecycle::Role,
    middleware::auth::{AuthUser, ensure_role},
    models::Restaurant,
    response::{ApiResponse, Meta},
    routes::params::{RestaurantQuery, RestaurantSortBy, SortOrder},
    state::AppState,
};

/// Public listing: active restaurants only, filterable by town, category
/// and name.
pub async fn list_restaurants(
    state: &AppState,
    query: RestaurantQuery,
) -> AppResult<ApiResponse<RestaurantList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all().add(RestaurantCol::IsActive.eq(true));

    if let Some(town) = query.town.as_ref().filter(|t| !t.is_empty()) {
        condition = condition.add(RestaurantCol::Town.eq(town.clone()));
    }

    if let Some(category) = query.category.as_ref().filter(|c| !c.is_empty()) {
        condition = condition.add(Expr::cust_with_values(
            "categories @> ?",
            [serde_json::json!([category])],
        ));
    }

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(RestaurantCol::Name.contains(search));
    }

    let sort_by = query.sort_by.unwrap_or(RestaurantSortBy::Rating);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        RestaurantSortBy::Rating => RestaurantCol::Rating,
        RestaurantSortBy::CreatedAt => RestaurantCol::CreatedAt,
        RestaurantSortBy::DeliveryFee => RestaurantCol::DeliveryFee,
        RestaurantSortBy::Name => RestaurantCol::Name,
    };

    let mut finder = Restaurants::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(restaurant_from_entity)
        .collect();

    let meta = Meta::paginated(page, limit, total);
    Ok(ApiResponse::success(
        "Restaurants",
        RestaurantList { items },
        Some(meta),
    ))
}

/// Public detail; inactive restaurants are invisible here.
pub async fn get_restaurant(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Restaurant>> {
    let restaurant = Restaurants::find_by_id(id)
        .one(&state.orm)
        .await?
        .filter(|r| r.is_active)
        .ok_or(AppError::NotFound)?;

    Ok(ApiResponse::success(
        "Restaurant",
        restaurant_from_entity(restaurant),
        Some(Meta::empty()),
    ))
}

/// The owner's own restaurant, active or not.
pub async fn get_my_restaurant(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<Restaurant>> {
    let restaurant = Restaurants::find()
        .filter(RestaurantCol::OwnerId.eq(user.user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(ApiResponse::success(
        "Restaurant",
        restaurant_from_entity(restaurant),
        Some(Meta::empty()),
    ))
}

pub async fn create_restaurant(
    state: &AppState,
    user: &AuthUser,
    payload: CreateRestaurantRequest,
) -> AppResult<ApiResponse<Restaurant>> {
    ensure_role(user, Role::Owner)?;
    validate_new_restaurant(&payload)?;

    let existing = Restaurants::find()
        .filter(RestaurantCol::OwnerId.eq(user.user_id))
        .one(&state.orm)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Owner already has a restaurant".into()));
    }

    let restaurant = RestaurantActive {
        id: Set(Uuid::new_v4()),
        owner_id: Set(user.user_id),
        name: Set(payload.name),
        town: Set(payload.town),
        address: Set(payload.address),
        delivery_fee: Set(payload.delivery_fee),
        min_order: Set(payload.min_order),
        categories: Set(Categories(payload.categories)),
        rating: NotSet,
        is_active: NotSet,
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "restaurant_create",
        Some("restaurants"),
        Some(serde_json::json!({ "restaurant_id": restaurant.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Restaurant created",
        restaurant_from_entity(restaurant),
        Some(Meta::empty()),
    ))
}

pub async fn update_restaurant(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateRestaurantRequest,
) -> AppResult<ApiResponse<Restaurant>> {
    let existing = Restaurants::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if existing.owner_id != user.user_id && user.role != Role::Admin {
        return Err(AppError::Forbidden);
    }

    validate_restaurant_update(&payload)?;

    let mut active: RestaurantActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(town) = payload.town {
        active.town = Set(town);
    }
    if let Some(address) = payload.address {
        active.address = Set(address);
    }
    if let Some(delivery_fee) = payload.delivery_fee {
        active.delivery_fee = Set(delivery_fee);
    }
    if let Some(min_order) = payload.min_order {
        active.min_order = Set(min_order);
    }
    if let Some(categories) = payload.categories {
        active.categories = Set(Categories(categories));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    let updated = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "restaurant_update",
        Some("restaurants"),
        Some(serde_json::json!({ "restaurant_id": updated.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Restaurant updated",
        restaurant_from_entity(updated),
        Some(Meta::empty()),
    ))
}

fn validate_new_restaurant(payload: &CreateRestaurantRequest) -> Result<(), AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }
    if payload.town.trim().is_empty() {
        return Err(AppError::BadRequest("Town is required".into()));
    }
    if payload.address.trim().is_empty() {
        return Err(AppError::BadRequest("Address is required".into()));
    }
    validate_money_and_categories(
        Some(payload.delivery_fee),
        Some(payload.min_order),
        Some(&payload.categories),
    )
}

fn validate_restaurant_update(payload: &UpdateRestaurantRequest) -> Result<(), AppError> {
    if payload.name.as_deref().is_some_and(|v| v.trim().is_empty()) {
        return Err(AppError::BadRequest("Name must not be empty".into()));
    }
    if payload.town.as_deref().is_some_and(|v| v.trim().is_empty()) {
        return Err(AppError::BadRequest("Town must not be empty".into()));
    }
    if payload
        .address
        .as_deref()
        .is_some_and(|v| v.trim().is_empty())
    {
        return Err(AppError::BadRequest("Address must not be empty".into()));
    }
    validate_money_and_categories(
        payload.delivery_fee,
        payload.min_order,
        payload.categories.as_deref(),
    )
}

fn validate_money_and_categories(
    delivery_fee: Option<i64>,
    min_order: Option<i64>,
    categories: Option<&[String]>,
) -> Result<(), AppError> {
    if delivery_fee.is_some_and(|fee| fee < 0) {
        return Err(AppError::BadRequest(
            "Delivery fee must not be negative".into(),
        ));
    }
    if min_order.is_some_and(|min| min < 0) {
        return Err(AppError::BadRequest(
            "Minimum order must not be negative".into(),
        ));
    }
    if let Some(categories) = categories {
        if categories.is_empty() {
            return Err(AppError::BadRequest(
                "At least one category is required".into(),
            ));
        }
        if categories.iter().any(|c| c.trim().is_empty()) {
            return Err(AppError::BadRequest("Categories must not be empty".into()));
        }
    }
    Ok(())
}

pub(crate) fn restaurant_from_entity(model: RestaurantModel) -> Restaurant {
    Restaurant {
        id: model.id,
        owner_id: model.owner_id,
        name: model.name,
        town: model.town,
        address: model.address,
        delivery_fee: model.delivery_fee,
        min_order: model.min_order,
        categories: model.categories.0,
        rating: model.rating,
        is_active: model.is_active,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateRestaurantRequest {
        CreateRestaurantRequest {
            name: "Trattoria Nonna".into(),
            town: "Limbe".into(),
            address: "12 Seaside Rd".into(),
            delivery_fee: 500,
            min_order: 1000,
            categories: vec!["italian".into(), "pizza".into()],
        }
    }

    #[test]
    fn accepts_a_complete_request() {
        assert!(validate_new_restaurant(&request()).is_ok());
    }

    #[test]
    fn rejects_negative_money_fields() {
        let mut payload = request();
        payload.delivery_fee = -1;
        assert!(matches!(
            validate_new_restaurant(&payload),
            Err(AppError::BadRequest(_))
        ));

        let mut payload = request();
        payload.min_order = -500;
        assert!(matches!(
            validate_new_restaurant(&payload),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn rejects_missing_categories_and_blank_fields() {
        let mut payload = request();
        payload.categories.clear();
        assert!(validate_new_restaurant(&payload).is_err());

        let mut payload = request();
        payload.name = "   ".into();
        assert!(validate_new_restaurant(&payload).is_err());
    }

    #[test]
    fn update_validation_ignores_absent_fields() {
        let payload = UpdateRestaurantRequest {
            name: None,
            town: None,
            address: None,
            delivery_fee: None,
            min_order: None,
            categories: None,
            is_active: Some(false),
        };
        assert!(validate_restaurant_update(&payload).is_ok());

        let payload = UpdateRestaurantRequest {
            name: None,
            town: None,
            address: None,
            delivery_fee: Some(-10),
            min_order: None,
            categories: None,
            is_active: None,
        };
        assert!(validate_restaurant_update(&payload).is_err());
    }
}
