use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{CreateOrderRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
    entity::{
        menu_items::{Column as MenuItemCol, Entity as MenuItems, Model as MenuItemModel},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        restaurants::Entity as Restaurants,
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    lifecycle::{OrderStatus, Role},
    middleware::auth::{AuthUser, ensure_driver, ensure_role},
    models::{Order, OrderItem},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, Pagination, SortOrder},
    state::AppState,
};

/// Creates a pending order. Prices and the fee come from the store, never
/// from the client; the client's total must match what the server computes.
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_role(user, Role::Customer)?;

    if payload.items.is_empty() {
        return Err(AppError::BadRequest("Order has no items".into()));
    }
    if payload.items.iter().any(|line| line.quantity <= 0) {
        return Err(AppError::BadRequest("Quantities must be positive".into()));
    }
    if payload
        .delivery_address
        .as_deref()
        .is_some_and(|a| a.trim().is_empty())
    {
        return Err(AppError::BadRequest(
            "Delivery address must not be empty".into(),
        ));
    }

    let txn = state.orm.begin().await?;

    let restaurant = Restaurants::find_by_id(payload.restaurant_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    if !restaurant.is_active {
        return Err(AppError::BadRequest(
            "Restaurant is not accepting orders".into(),
        ));
    }

    // Lock the menu rows so prices cannot shift under the totals check.
    let ids: Vec<Uuid> = payload.items.iter().map(|line| line.menu_item_id).collect();
    let rows = MenuItems::find()
        .filter(
            Condition::all()
                .add(MenuItemCol::Id.is_in(ids))
                .add(MenuItemCol::RestaurantId.eq(restaurant.id)),
        )
        .lock(LockType::Update)
        .all(&txn)
        .await?;
    let by_id: HashMap<Uuid, &MenuItemModel> = rows.iter().map(|row| (row.id, row)).collect();

    let mut lines: Vec<(&MenuItemModel, i32)> = Vec::with_capacity(payload.items.len());
    for line in &payload.items {
        let item = *by_id.get(&line.menu_item_id).ok_or_else(|| {
            AppError::BadRequest(format!(
                "Menu item {} is not on this menu",
                line.menu_item_id
            ))
        })?;
        if !item.available {
            return Err(AppError::BadRequest(format!(
                "{} is currently unavailable",
                item.name
            )));
        }
        lines.push((item, line.quantity));
    }

    let subtotal: i64 = lines
        .iter()
        .map(|(item, quantity)| item.price * i64::from(*quantity))
        .sum();
    if subtotal < restaurant.min_order {
        return Err(AppError::BadRequest(format!(
            "Order is below the restaurant minimum of {}",
            restaurant.min_order
        )));
    }

    let delivery_fee = restaurant.delivery_fee;
    let total = subtotal + delivery_fee;
    if payload.total != total {
        return Err(AppError::BadRequest(format!(
            "Total mismatch: client sent {}, server computed {}",
            payload.total, total
        )));
    }

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        customer_id: Set(user.user_id),
        restaurant_id: Set(restaurant.id),
        driver_id: Set(None),
        status: Set(OrderStatus::Pending.as_str().into()),
        delivery_address: Set(payload.delivery_address),
        subtotal: Set(subtotal),
        delivery_fee: Set(delivery_fee),
        total: Set(total),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(lines.len());
    for (item, quantity) in &lines {
        let inserted = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            menu_item_id: Set(Some(item.id)),
            name: Set(item.name.clone()),
            quantity: Set(*quantity),
            price: Set(item.price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(inserted));
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_create",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "restaurant_id": order.restaurant_id,
            "total": order.total,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order placed",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// The caller's own orders as a customer.
pub async fn list_my_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let condition = Condition::all().add(OrderCol::CustomerId.eq(user.user_id));
    list_orders_where(state, condition, query).await
}

/// Incoming orders for a restaurant; its owner or an admin only.
pub async fn list_restaurant_orders(
    state: &AppState,
    user: &AuthUser,
    restaurant_id: Uuid,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let restaurant = Restaurants::find_by_id(restaurant_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if restaurant.owner_id != user.user_id && user.role != Role::Admin {
        return Err(AppError::Forbidden);
    }

    let condition = Condition::all().add(OrderCol::RestaurantId.eq(restaurant_id));
    list_orders_where(state, condition, query).await
}

/// Orders assigned to the calling driver.
pub async fn list_assigned_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_driver(user)?;
    let condition = Condition::all().add(OrderCol::DriverId.eq(user.user_id));
    list_orders_where(state, condition, query).await
}

/// Ready orders with an empty driver slot, oldest first.
pub async fn list_available_orders(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_driver(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::Status.eq(OrderStatus::Ready.as_str()))
                .add(OrderCol::DriverId.is_null()),
        )
        .order_by_asc(OrderCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::paginated(page, limit, total);
    Ok(ApiResponse::success(
        "Available orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

/// Order detail for its participants: the customer, the restaurant owner,
/// the assigned driver, or an admin.
pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    ensure_participant(state, user, &order).await?;

    let items = load_order_items(&state.orm, order.id).await?;
    Ok(ApiResponse::success(
        "Order",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Applies one lifecycle transition under a row lock.
///
/// The restaurant owner (or an admin) drives the kitchen stages and may
/// cancel before delivery starts; the assigned driver may complete
/// `delivering` to `delivered`. Moving into `delivering` here requires a
/// driver-capable assignee while the order's driver slot is still empty.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let target = OrderStatus::parse(&payload.status)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown status {:?}", payload.status)))?;

    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let current = stored_status(&order)?;

    let restaurant = Restaurants::find_by_id(order.restaurant_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let manages_restaurant = restaurant.owner_id == user.user_id || user.role == Role::Admin;
    let completes_own_delivery = user.role.can_deliver()
        && order.driver_id == Some(user.user_id)
        && target == OrderStatus::Delivered;
    if !manages_restaurant && !completes_own_delivery {
        return Err(AppError::Forbidden);
    }

    if !current.may_transition_to(target) {
        return Err(AppError::Conflict(format!(
            "Cannot move order from {} to {}",
            current, target
        )));
    }

    if payload
        .driver_id
        .is_some_and(|requested| order.driver_id.is_some_and(|existing| existing != requested))
    {
        return Err(AppError::Conflict("Order already has a driver".into()));
    }

    let mut assigned_driver: Option<Uuid> = None;
    if target.requires_driver() && order.driver_id.is_none() {
        let driver_id = payload
            .driver_id
            .ok_or_else(|| AppError::BadRequest("A driver is required for delivering".into()))?;
        let driver = Users::find_by_id(driver_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::BadRequest("Driver does not exist".into()))?;
        let driver_role = Role::parse(&driver.role).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "user {} has unrecognized role {:?}",
                driver.id,
                driver.role
            ))
        })?;
        if !driver_role.can_deliver() {
            return Err(AppError::BadRequest("Assignee cannot deliver orders".into()));
        }
        assigned_driver = Some(driver_id);
    }

    let mut active: OrderActive = order.into();
    active.status = Set(target.as_str().into());
    if let Some(driver_id) = assigned_driver {
        active.driver_id = Set(Some(driver_id));
    }
    let order = active.update(&txn).await?;

    let items = load_order_items(&txn, order.id).await?;
    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "from": current.as_str(),
            "to": target.as_str(),
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order status updated",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Atomically claims a ready, unassigned order for the calling driver.
///
/// The guard is a single compare-and-set: of two concurrent acceptors
/// exactly one updates a row; the loser refetches to tell a vanished order
/// (404) from one already taken or not yet ready (409).
pub async fn accept_delivery(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_driver(user)?;

    let result = Orders::update_many()
        .col_expr(OrderCol::DriverId, Expr::value(user.user_id))
        .col_expr(
            OrderCol::Status,
            Expr::value(OrderStatus::Delivering.as_str()),
        )
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(id))
                .add(OrderCol::Status.eq(OrderStatus::Ready.as_str()))
                .add(OrderCol::DriverId.is_null()),
        )
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return match Orders::find_by_id(id).one(&state.orm).await? {
            None => Err(AppError::NotFound),
            Some(_) => Err(AppError::Conflict(
                "Order is not available for pickup".into(),
            )),
        };
    }

    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let items = load_order_items(&state.orm, order.id).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "delivery_accept",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Delivery accepted",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub(crate) async fn list_orders_where(
    state: &AppState,
    mut condition: Condition,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();

    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let known = OrderStatus::parse(status)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown status {:?}", status)))?;
        condition = condition.add(OrderCol::Status.eq(known.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;
    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::paginated(page, limit, total);
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

async fn ensure_participant(
    state: &AppState,
    user: &AuthUser,
    order: &OrderModel,
) -> AppResult<()> {
    if order.customer_id == user.user_id
        || order.driver_id == Some(user.user_id)
        || user.role == Role::Admin
    {
        return Ok(());
    }
    let owns_restaurant = Restaurants::find_by_id(order.restaurant_id)
        .one(&state.orm)
        .await?
        .is_some_and(|r| r.owner_id == user.user_id);
    if owns_restaurant {
        return Ok(());
    }
    Err(AppError::Forbidden)
}

async fn load_order_items<C>(conn: &C, order_id: Uuid) -> AppResult<Vec<OrderItem>>
where
    C: ConnectionTrait,
{
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect())
}

fn stored_status(order: &OrderModel) -> AppResult<OrderStatus> {
    OrderStatus::parse(&order.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "order {} has unrecognized status {:?}",
            order.id,
            order.status
        ))
    })
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        customer_id: model.customer_id,
        restaurant_id: model.restaurant_id,
        driver_id: model.driver_id,
        status: model.status,
        delivery_address: model.delivery_address,
        subtotal: model.subtotal,
        delivery_fee: model.delivery_fee,
        total: model.total,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        menu_item_id: model.menu_item_id,
        name: model.name,
        quantity: model.quantity,
        price: model.price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
