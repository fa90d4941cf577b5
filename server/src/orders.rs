//! Order placement and mutation.
//!
//! Placement runs in two stages: a fail-fast validation pass over the raw
//! payload (required fields, table range, payment method, receipt, line-item
//! parsing, receipt encoding), then a single transaction that re-reads each
//! product, snapshots its price, inserts the order and its items, and
//! decrements stock. The decrement is conditional (`stock >= n`) and checked
//! via affected-row count, so two concurrent orders cannot both drain the
//! same stock. Any failure inside the transaction rolls everything back; a
//! reader never sees an order without its items or a decrement without its
//! order.
//!
//! Mutations (status flags, buyer info, wholesale item replacement,
//! deletion) each run in their own statement or transaction. Replacement
//! takes caller-computed prices verbatim and does not re-check stock, and
//! deletion does not restore stock; both match the deployed behavior this
//! service replaces.

use std::{collections::HashMap, sync::Arc};

use axum::{
    Json,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;

use crate::{
    auth::{AuthUser, Permission},
    config::Config,
    database::{OrderFilter, push_order_filters},
    error::AppError,
    models::{
        BuyerUpdate, DraftItem, Order, OrderDraft, OrderItem, OrderRecord, PaymentMethod,
        ReplaceItemsPayload, ReplacementItem, StatusUpdate,
    },
    state::AppState,
    utils::{encode_image, parse_items},
};

/// A draft that passed every pre-transaction check.
pub struct ValidatedOrder {
    buyer_name: String,
    buyer_phone: Option<String>,
    table_number: Option<i64>,
    payment_method: PaymentMethod,
    note: Option<String>,
    /// Encoded data URI, already size-checked.
    receipt: Option<String>,
    items: Vec<DraftItem>,
}

/// Price snapshot for one line, taken inside the commit transaction and
/// reused verbatim for the subtotal, the total, and the inserted row.
struct Line {
    product_id: i64,
    quantity: i64,
    unit_price: f64,
    subtotal: f64,
}

pub fn validate_draft(draft: OrderDraft, config: &Config) -> Result<ValidatedOrder, AppError> {
    let buyer_name = draft
        .buyer_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .ok_or(AppError::MissingField("buyer_name"))?;

    let raw_method = draft
        .payment_method
        .as_deref()
        .map(str::trim)
        .filter(|method| !method.is_empty())
        .ok_or(AppError::MissingField("payment_method"))?;

    if let Some(table) = draft.table_number {
        if table < 1 || table > config.table_max {
            return Err(AppError::InvalidRange {
                value: table,
                max: config.table_max,
            });
        }
    }

    let payment_method = PaymentMethod::parse(raw_method)
        .ok_or_else(|| AppError::InvalidPaymentMethod(raw_method.to_string()))?;

    if payment_method == PaymentMethod::Transfer && draft.receipt.is_none() {
        return Err(AppError::MissingReceipt);
    }

    let items = parse_items(draft.items.as_ref().ok_or(AppError::MalformedLineItems)?)?;

    let receipt = draft
        .receipt
        .map(|(mime, bytes)| encode_image(&mime, &bytes, config.max_receipt_bytes))
        .transpose()?;

    Ok(ValidatedOrder {
        buyer_name,
        buyer_phone: draft.buyer_phone,
        table_number: draft.table_number,
        payment_method,
        note: draft.note,
        receipt,
        items,
    })
}

/// Places an order: validates the draft, then commits the order, its line
/// items, and the stock decrements as one transaction. On any error nothing
/// is persisted and no stock changes.
pub async fn create_order(
    pool: &SqlitePool,
    config: &Config,
    draft: OrderDraft,
) -> Result<OrderRecord, AppError> {
    let order = validate_draft(draft, config)?;

    let mut tx = pool.begin().await?;

    let mut lines = Vec::with_capacity(order.items.len());
    let mut total = 0.0;

    for item in &order.items {
        let row: Option<(f64, i64)> =
            sqlx::query_as("SELECT price, stock FROM products WHERE id = ? AND available = 1")
                .bind(item.product_id)
                .fetch_optional(&mut *tx)
                .await?;

        let (unit_price, stock) = row.ok_or(AppError::ProductNotFound(item.product_id))?;

        if stock < item.quantity {
            return Err(AppError::InsufficientStock {
                product_id: item.product_id,
                requested: item.quantity,
                available: stock,
            });
        }

        let subtotal = unit_price * item.quantity as f64;
        total += subtotal;

        lines.push(Line {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price,
            subtotal,
        });
    }

    let inserted = sqlx::query(
        "INSERT INTO orders (buyer_name, buyer_phone, table_number, payment_method, total, receipt, note, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&order.buyer_name)
    .bind(&order.buyer_phone)
    .bind(order.table_number)
    .bind(order.payment_method.as_str())
    .bind(total)
    .bind(&order.receipt)
    .bind(&order.note)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await?;

    let order_id = inserted.last_insert_rowid();

    for line in &lines {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, quantity, unit_price, subtotal) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.subtotal)
        .execute(&mut *tx)
        .await?;

        // Conditional decrement guards against a concurrent order draining
        // the same stock between our read and this write.
        let decremented =
            sqlx::query("UPDATE products SET stock = stock - ? WHERE id = ? AND stock >= ?")
                .bind(line.quantity)
                .bind(line.product_id)
                .bind(line.quantity)
                .execute(&mut *tx)
                .await?;

        if decremented.rows_affected() == 0 {
            let available: i64 = sqlx::query_scalar("SELECT stock FROM products WHERE id = ?")
                .bind(line.product_id)
                .fetch_one(&mut *tx)
                .await?;

            return Err(AppError::InsufficientStock {
                product_id: line.product_id,
                requested: line.quantity,
                available,
            });
        }
    }

    tx.commit().await?;

    info!(
        "Order {order_id} placed for {} ({} items, total {total})",
        order.buyer_name,
        lines.len()
    );

    fetch_order(pool, order_id).await
}

pub async fn fetch_order(pool: &SqlitePool, id: i64) -> Result<OrderRecord, AppError> {
    let order: Order = sqlx::query_as("SELECT * FROM orders WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::OrderNotFound(id))?;

    let items = fetch_items(pool, &[id]).await?;

    Ok(OrderRecord { order, items })
}

async fn fetch_items(pool: &SqlitePool, order_ids: &[i64]) -> Result<Vec<OrderItem>, AppError> {
    if order_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
        "SELECT oi.id, oi.order_id, oi.product_id, p.name AS product_name, \
         oi.quantity, oi.unit_price, oi.subtotal \
         FROM order_items oi JOIN products p ON p.id = oi.product_id \
         WHERE oi.order_id IN (",
    );

    let mut separated = builder.separated(", ");
    for id in order_ids {
        separated.push_bind(*id);
    }
    builder.push(") ORDER BY oi.id");

    let items = builder.build_query_as().fetch_all(pool).await?;

    Ok(items)
}

pub async fn list_orders(
    pool: &SqlitePool,
    filter: &OrderFilter,
) -> Result<Vec<OrderRecord>, AppError> {
    let mut builder: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("SELECT * FROM orders WHERE 1=1");
    push_order_filters(&mut builder, filter);
    builder.push(" ORDER BY created_at DESC, id DESC");

    let orders: Vec<Order> = builder.build_query_as().fetch_all(pool).await?;

    let ids: Vec<i64> = orders.iter().map(|order| order.id).collect();
    let items = fetch_items(pool, &ids).await?;

    let mut by_order: HashMap<i64, Vec<OrderItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }

    Ok(orders
        .into_iter()
        .map(|order| {
            let items = by_order.remove(&order.id).unwrap_or_default();
            OrderRecord { order, items }
        })
        .collect())
}

/// Sets `paid` and/or `delivered`; absent flags are untouched. Setting is
/// plain assignment, so repeating an update is idempotent.
pub async fn update_status(
    pool: &SqlitePool,
    id: i64,
    update: StatusUpdate,
) -> Result<OrderRecord, AppError> {
    if update.paid.is_none() && update.delivered.is_none() {
        return Err(AppError::MissingField("paid or delivered"));
    }

    let result = sqlx::query(
        "UPDATE orders SET paid = COALESCE(?, paid), delivered = COALESCE(?, delivered) WHERE id = ?",
    )
    .bind(update.paid)
    .bind(update.delivered)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::OrderNotFound(id));
    }

    fetch_order(pool, id).await
}

/// Wholesale line-item replacement: drops every existing item, inserts the
/// replacement set verbatim (prices and subtotals come precomputed from the
/// vendor console), and re-derives the order total from the new subtotals,
/// all in one transaction. Stock is not re-checked against the replacement
/// quantities.
pub async fn replace_items(
    pool: &SqlitePool,
    id: i64,
    items: Vec<ReplacementItem>,
) -> Result<f64, AppError> {
    if items.is_empty() {
        return Err(AppError::MalformedLineItems);
    }

    let mut tx = pool.begin().await?;

    sqlx::query_scalar::<_, i64>("SELECT id FROM orders WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::OrderNotFound(id))?;

    sqlx::query("DELETE FROM order_items WHERE order_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let mut new_total = 0.0;

    for item in &items {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, quantity, unit_price, subtotal) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.subtotal)
        .execute(&mut *tx)
        .await?;

        new_total += item.subtotal;
    }

    sqlx::query("UPDATE orders SET total = ? WHERE id = ?")
        .bind(new_total)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(new_total)
}

/// Partial buyer-info edit; unset fields keep their current value.
pub async fn update_buyer(
    pool: &SqlitePool,
    config: &Config,
    id: i64,
    update: BuyerUpdate,
) -> Result<OrderRecord, AppError> {
    if matches!(update.buyer_name.as_deref(), Some(name) if name.trim().is_empty()) {
        return Err(AppError::MissingField("buyer_name"));
    }

    if let Some(table) = update.table_number {
        if table < 1 || table > config.table_max {
            return Err(AppError::InvalidRange {
                value: table,
                max: config.table_max,
            });
        }
    }

    let result = sqlx::query(
        "UPDATE orders SET \
         buyer_name = COALESCE(?, buyer_name), \
         buyer_phone = COALESCE(?, buyer_phone), \
         table_number = COALESCE(?, table_number), \
         note = COALESCE(?, note) \
         WHERE id = ?",
    )
    .bind(&update.buyer_name)
    .bind(&update.buyer_phone)
    .bind(update.table_number)
    .bind(&update.note)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::OrderNotFound(id));
    }

    fetch_order(pool, id).await
}

/// Deletes an order; its items go with it via cascade. Stock consumed by
/// the order is not restored.
pub async fn delete_order(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM orders WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::OrderNotFound(id));
    }

    Ok(())
}

pub async fn create_order_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    let draft = extract_draft(request, &state).await?;
    let order = create_order(&state.pool, &state.config, draft).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "order": order })),
    ))
}

/// Orders arrive as plain JSON, or as multipart form data when a receipt
/// file is attached.
async fn extract_draft(request: Request, state: &Arc<AppState>) -> Result<OrderDraft, AppError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|_| AppError::MalformedPayload)?;

        draft_from_multipart(multipart).await
    } else {
        let bytes = axum::body::to_bytes(request.into_body(), state.config.max_receipt_bytes)
            .await
            .map_err(|_| AppError::MalformedPayload)?;

        serde_json::from_slice(&bytes).map_err(|_| AppError::MalformedPayload)
    }
}

async fn draft_from_multipart(mut multipart: Multipart) -> Result<OrderDraft, AppError> {
    let mut draft = OrderDraft::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::MalformedPayload)?
    {
        let Some(name) = field.name().map(String::from) else {
            continue;
        };

        if name == "receipt" {
            let mime = field.content_type().unwrap_or("image/jpeg").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|_| AppError::MalformedPayload)?;
            draft.receipt = Some((mime, data.to_vec()));
            continue;
        }

        let text = field.text().await.map_err(|_| AppError::MalformedPayload)?;

        match name.as_str() {
            "buyer_name" => draft.buyer_name = Some(text),
            "buyer_phone" => draft.buyer_phone = Some(text),
            "table" | "table_number" => {
                draft.table_number =
                    Some(text.trim().parse().map_err(|_| AppError::MalformedPayload)?);
            }
            "payment_method" => draft.payment_method = Some(text),
            // kept as a raw string; parse_items handles it during validation
            "items" => draft.items = Some(serde_json::Value::String(text)),
            "note" => draft.note = Some(text),
            _ => {}
        }
    }

    Ok(draft)
}

pub async fn list_orders_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(filter): Query<OrderFilter>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permission::ViewOrders)?;

    let orders = list_orders(&state.pool, &filter).await?;

    Ok(Json(json!({ "success": true, "orders": orders })))
}

pub async fn update_status_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(update): Json<StatusUpdate>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permission::EditOrders)?;

    let order = update_status(&state.pool, id, update).await?;

    Ok(Json(json!({ "success": true, "order": order })))
}

pub async fn replace_items_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<ReplaceItemsPayload>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permission::EditOrders)?;

    let new_total = replace_items(&state.pool, id, payload.items).await?;

    info!("Order {id} items replaced by {}", auth.username);

    Ok(Json(json!({ "success": true, "new_total": new_total })))
}

pub async fn update_buyer_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(update): Json<BuyerUpdate>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permission::EditOrders)?;

    let order = update_buyer(&state.pool, &state.config, id, update).await?;

    Ok(Json(json!({ "success": true, "order": order })))
}

pub async fn delete_order_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permission::DeleteOrders)?;

    delete_order(&state.pool, id).await?;

    info!("Order {id} deleted by {}", auth.username);

    Ok(Json(json!({ "success": true, "message": "Order deleted" })))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sqlx::SqlitePool;

    use super::*;
    use crate::{config::test_config, database::test_pool};

    async fn seed_product(pool: &SqlitePool, name: &str, price: f64, stock: i64) -> i64 {
        sqlx::query(
            "INSERT INTO products (name, price, stock, category) VALUES (?, ?, ?, 'food')",
        )
        .bind(name)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn stock_of(pool: &SqlitePool, id: i64) -> i64 {
        sqlx::query_scalar("SELECT stock FROM products WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn draft(buyer: &str, method: &str, items: serde_json::Value) -> OrderDraft {
        OrderDraft {
            buyer_name: Some(buyer.to_string()),
            payment_method: Some(method.to_string()),
            items: Some(items),
            ..OrderDraft::default()
        }
    }

    #[tokio::test]
    async fn test_cash_order_decrements_stock() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 5).await;

        let order = create_order(
            &pool,
            &config,
            draft("Ana", "cash", json!([{"product_id": product, "quantity": 2}])),
        )
        .await
        .unwrap();

        assert_eq!(order.order.total, 200.0);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].unit_price, 100.0);
        assert_eq!(order.items[0].subtotal, 200.0);
        assert_eq!(order.items[0].product_name, "Empanada");
        assert_eq!(stock_of(&pool, product).await, 3);
    }

    #[tokio::test]
    async fn test_insufficient_stock_changes_nothing() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 1).await;

        let err = create_order(
            &pool,
            &config,
            draft("Ana", "cash", json!([{"product_id": product, "quantity": 2}])),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            AppError::InsufficientStock {
                requested: 2,
                available: 1,
                ..
            }
        ));
        assert_eq!(stock_of(&pool, product).await, 1);

        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orders, 0);
    }

    #[tokio::test]
    async fn test_one_bad_line_aborts_whole_order() {
        let pool = test_pool().await;
        let config = test_config();
        let plenty = seed_product(&pool, "Empanada", 100.0, 10).await;
        let scarce = seed_product(&pool, "Limonada", 50.0, 1).await;

        let err = create_order(
            &pool,
            &config,
            draft(
                "Ana",
                "cash",
                json!([
                    {"product_id": plenty, "quantity": 2},
                    {"product_id": scarce, "quantity": 3},
                ]),
            ),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::InsufficientStock { .. }));
        // the passing line must not have left a partial decrement behind
        assert_eq!(stock_of(&pool, plenty).await, 10);
        assert_eq!(stock_of(&pool, scarce).await, 1);

        let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_items")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(items, 0);
    }

    #[tokio::test]
    async fn test_total_is_sum_of_subtotals() {
        let pool = test_pool().await;
        let config = test_config();
        let first = seed_product(&pool, "Empanada", 100.0, 10).await;
        let second = seed_product(&pool, "Limonada", 50.0, 10).await;

        let order = create_order(
            &pool,
            &config,
            draft(
                "Ana",
                "cash",
                json!([
                    {"product_id": first, "quantity": 2},
                    {"product_id": second, "quantity": 3},
                ]),
            ),
        )
        .await
        .unwrap();

        let sum: f64 = order.items.iter().map(|item| item.subtotal).sum();
        assert_eq!(order.order.total, sum);
        assert_eq!(order.order.total, 350.0);
    }

    #[tokio::test]
    async fn test_unavailable_product_rejected() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 5).await;
        sqlx::query("UPDATE products SET available = 0 WHERE id = ?")
            .bind(product)
            .execute(&pool)
            .await
            .unwrap();

        let err = create_order(
            &pool,
            &config,
            draft("Ana", "cash", json!([{"product_id": product, "quantity": 1}])),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::ProductNotFound(id) if id == product));
    }

    #[tokio::test]
    async fn test_price_snapshot_survives_price_change() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 5).await;

        let order = create_order(
            &pool,
            &config,
            draft("Ana", "cash", json!([{"product_id": product, "quantity": 1}])),
        )
        .await
        .unwrap();

        sqlx::query("UPDATE products SET price = 999.0 WHERE id = ?")
            .bind(product)
            .execute(&pool)
            .await
            .unwrap();

        let reread = fetch_order(&pool, order.order.id).await.unwrap();
        assert_eq!(reread.items[0].unit_price, 100.0);
        assert_eq!(reread.order.total, 100.0);
    }

    #[tokio::test]
    async fn test_transfer_requires_receipt() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 5).await;

        let err = create_order(
            &pool,
            &config,
            draft(
                "Ana",
                "transfer",
                json!([{"product_id": product, "quantity": 1}]),
            ),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::MissingReceipt));
    }

    #[tokio::test]
    async fn test_transfer_with_receipt_stores_data_uri() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 5).await;

        let mut submission = draft(
            "Ana",
            "transfer",
            json!([{"product_id": product, "quantity": 1}]),
        );
        submission.receipt = Some(("image/png".to_string(), vec![137, 80, 78, 71]));

        let order = create_order(&pool, &config, submission).await.unwrap();

        let receipt = order.order.receipt.unwrap();
        assert!(receipt.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_oversized_receipt_rejected_before_commit() {
        let pool = test_pool().await;
        let mut config = test_config();
        config.max_receipt_bytes = 16;
        let product = seed_product(&pool, "Empanada", 100.0, 5).await;

        let mut submission = draft(
            "Ana",
            "transfer",
            json!([{"product_id": product, "quantity": 1}]),
        );
        submission.receipt = Some(("image/png".to_string(), vec![0u8; 256]));

        let err = create_order(&pool, &config, submission).await.unwrap_err();

        assert!(matches!(err, AppError::PayloadTooLarge { limit: 16, .. }));
        assert_eq!(stock_of(&pool, product).await, 5);
    }

    #[tokio::test]
    async fn test_table_number_bounds() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 5).await;

        for table in [0, 51] {
            let mut submission = draft(
                "Ana",
                "cash",
                json!([{"product_id": product, "quantity": 1}]),
            );
            submission.table_number = Some(table);

            let err = create_order(&pool, &config, submission).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidRange { value, max: 50 } if value == table));
        }

        let mut submission = draft(
            "Ana",
            "cash",
            json!([{"product_id": product, "quantity": 1}]),
        );
        submission.table_number = Some(50);
        assert!(create_order(&pool, &config, submission).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let pool = test_pool().await;
        let config = test_config();

        let mut no_buyer = draft("  ", "cash", json!([{"product_id": 1, "quantity": 1}]));
        no_buyer.buyer_name = Some("  ".to_string());
        assert!(matches!(
            create_order(&pool, &config, no_buyer).await,
            Err(AppError::MissingField("buyer_name"))
        ));

        let mut no_method = draft("Ana", "", json!([{"product_id": 1, "quantity": 1}]));
        no_method.payment_method = None;
        assert!(matches!(
            create_order(&pool, &config, no_method).await,
            Err(AppError::MissingField("payment_method"))
        ));

        assert!(matches!(
            create_order(
                &pool,
                &config,
                draft("Ana", "card", json!([{"product_id": 1, "quantity": 1}])),
            )
            .await,
            Err(AppError::InvalidPaymentMethod(_))
        ));

        assert!(matches!(
            create_order(&pool, &config, draft("Ana", "cash", json!([]))).await,
            Err(AppError::MalformedLineItems)
        ));
    }

    #[tokio::test]
    async fn test_status_toggle_is_assignment() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 5).await;

        let order = create_order(
            &pool,
            &config,
            draft("Ana", "cash", json!([{"product_id": product, "quantity": 1}])),
        )
        .await
        .unwrap();
        let id = order.order.id;

        let first = update_status(
            &pool,
            id,
            StatusUpdate {
                paid: Some(true),
                delivered: None,
            },
        )
        .await
        .unwrap();
        assert!(first.order.paid);
        assert!(!first.order.delivered);

        let second = update_status(
            &pool,
            id,
            StatusUpdate {
                paid: Some(true),
                delivered: None,
            },
        )
        .await
        .unwrap();
        // still just true, not accumulated into anything else
        assert!(second.order.paid);
        assert!(!second.order.delivered);

        let third = update_status(
            &pool,
            id,
            StatusUpdate {
                paid: Some(false),
                delivered: Some(true),
            },
        )
        .await
        .unwrap();
        assert!(!third.order.paid);
        assert!(third.order.delivered);
    }

    #[tokio::test]
    async fn test_status_update_requires_a_flag() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 5).await;

        let order = create_order(
            &pool,
            &config,
            draft("Ana", "cash", json!([{"product_id": product, "quantity": 1}])),
        )
        .await
        .unwrap();

        assert!(matches!(
            update_status(
                &pool,
                order.order.id,
                StatusUpdate {
                    paid: None,
                    delivered: None,
                },
            )
            .await,
            Err(AppError::MissingField(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_items_recomputes_total() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 5).await;
        let other = seed_product(&pool, "Limonada", 50.0, 5).await;

        let order = create_order(
            &pool,
            &config,
            draft("Ana", "cash", json!([{"product_id": product, "quantity": 2}])),
        )
        .await
        .unwrap();
        let id = order.order.id;

        let new_total = replace_items(
            &pool,
            id,
            vec![ReplacementItem {
                product_id: other,
                quantity: 2,
                unit_price: 250.0,
                subtotal: 500.0,
            }],
        )
        .await
        .unwrap();
        assert_eq!(new_total, 500.0);

        let reread = fetch_order(&pool, id).await.unwrap();
        assert_eq!(reread.order.total, 500.0);
        assert_eq!(reread.items.len(), 1);
        assert_eq!(reread.items[0].product_id, other);

        let sum: f64 = reread.items.iter().map(|item| item.subtotal).sum();
        assert_eq!(reread.order.total, sum);
    }

    #[tokio::test]
    async fn test_replace_items_rejects_empty_list() {
        let pool = test_pool().await;

        assert!(matches!(
            replace_items(&pool, 1, Vec::new()).await,
            Err(AppError::MalformedLineItems)
        ));
    }

    #[tokio::test]
    async fn test_buyer_update_merges() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 5).await;

        let mut submission = draft(
            "Ana",
            "cash",
            json!([{"product_id": product, "quantity": 1}]),
        );
        submission.buyer_phone = Some("555-0100".to_string());
        submission.table_number = Some(3);

        let order = create_order(&pool, &config, submission).await.unwrap();

        let updated = update_buyer(
            &pool,
            &config,
            order.order.id,
            BuyerUpdate {
                buyer_name: Some("Ana Maria".to_string()),
                buyer_phone: None,
                table_number: None,
                note: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.order.buyer_name, "Ana Maria");
        assert_eq!(updated.order.buyer_phone.as_deref(), Some("555-0100"));
        assert_eq!(updated.order.table_number, Some(3));
    }

    #[tokio::test]
    async fn test_delete_cascades_items_and_keeps_stock() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 5).await;

        let order = create_order(
            &pool,
            &config,
            draft("Ana", "cash", json!([{"product_id": product, "quantity": 2}])),
        )
        .await
        .unwrap();

        delete_order(&pool, order.order.id).await.unwrap();

        let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_items")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(items, 0);

        // consumed stock stays consumed
        assert_eq!(stock_of(&pool, product).await, 3);

        assert!(matches!(
            fetch_order(&pool, order.order.id).await,
            Err(AppError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_orders_filters_by_table() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 20).await;

        for table in [Some(5), Some(7), None] {
            let mut submission = draft(
                "Ana",
                "cash",
                json!([{"product_id": product, "quantity": 1}]),
            );
            submission.table_number = table;
            create_order(&pool, &config, submission).await.unwrap();
        }

        let all = list_orders(&pool, &OrderFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|record| record.items.len() == 1));

        let table_five = list_orders(
            &pool,
            &OrderFilter {
                table: Some(5),
                ..OrderFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(table_five.len(), 1);
        assert_eq!(table_five[0].order.table_number, Some(5));
    }

    #[tokio::test]
    async fn test_list_orders_filters_by_date() {
        let pool = test_pool().await;
        let config = test_config();
        let product = seed_product(&pool, "Empanada", 100.0, 20).await;

        create_order(
            &pool,
            &config,
            draft("Ana", "cash", json!([{"product_id": product, "quantity": 1}])),
        )
        .await
        .unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();

        let hit = list_orders(
            &pool,
            &OrderFilter {
                from: Some(today.clone()),
                to: Some(today),
                table: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(hit.len(), 1);

        let miss = list_orders(
            &pool,
            &OrderFilter {
                from: Some("1999-01-01".to_string()),
                to: Some("1999-12-31".to_string()),
                table: None,
            },
        )
        .await
        .unwrap();
        assert!(miss.is_empty());
    }
}
