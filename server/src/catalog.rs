use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;

use crate::{
    auth::{AuthUser, Permission},
    error::AppError,
    models::{CreateProduct, Product, UpdateProduct},
    state::AppState,
    utils::check_encoded_size,
};

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

/// Storefront listing: available products only, optionally narrowed by
/// category/subcategory.
pub async fn list_products(
    pool: &SqlitePool,
    query: &CatalogQuery,
) -> Result<Vec<Product>, AppError> {
    let mut builder: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("SELECT * FROM products WHERE available = 1");

    if let Some(category) = &query.category {
        builder.push(" AND category = ").push_bind(category.clone());
    }

    if let Some(subcategory) = &query.subcategory {
        builder
            .push(" AND subcategory = ")
            .push_bind(subcategory.clone());
    }

    builder.push(" ORDER BY name");

    let products = builder.build_query_as().fetch_all(pool).await?;

    Ok(products)
}

/// Vendor listing: every row, retired products included.
pub async fn list_all_products(pool: &SqlitePool) -> Result<Vec<Product>, AppError> {
    let products = sqlx::query_as("SELECT * FROM products ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(products)
}

pub async fn fetch_product(pool: &SqlitePool, id: i64) -> Result<Product, AppError> {
    sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::ProductNotFound(id))
}

pub async fn create_product(
    pool: &SqlitePool,
    payload: CreateProduct,
    image_limit: usize,
) -> Result<Product, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::MissingField("name"));
    }

    if payload.category.trim().is_empty() {
        return Err(AppError::MissingField("category"));
    }

    if payload.price < 0.0 {
        return Err(AppError::InvalidValue("price"));
    }

    if payload.stock < 0 {
        return Err(AppError::InvalidValue("stock"));
    }

    if let Some(image) = &payload.image {
        check_encoded_size(image, image_limit)?;
    }

    let result = sqlx::query(
        "INSERT INTO products (name, description, price, stock, category, subcategory, image) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.price)
    .bind(payload.stock)
    .bind(&payload.category)
    .bind(&payload.subcategory)
    .bind(&payload.image)
    .execute(pool)
    .await?;

    fetch_product(pool, result.last_insert_rowid()).await
}

/// Partial update; absent fields keep their current value.
pub async fn update_product(
    pool: &SqlitePool,
    id: i64,
    payload: UpdateProduct,
    image_limit: usize,
) -> Result<Product, AppError> {
    if matches!(payload.price, Some(price) if price < 0.0) {
        return Err(AppError::InvalidValue("price"));
    }

    if matches!(payload.stock, Some(stock) if stock < 0) {
        return Err(AppError::InvalidValue("stock"));
    }

    if let Some(image) = &payload.image {
        check_encoded_size(image, image_limit)?;
    }

    let result = sqlx::query(
        "UPDATE products SET \
         name = COALESCE(?, name), \
         description = COALESCE(?, description), \
         price = COALESCE(?, price), \
         stock = COALESCE(?, stock), \
         category = COALESCE(?, category), \
         subcategory = COALESCE(?, subcategory), \
         available = COALESCE(?, available), \
         image = COALESCE(?, image) \
         WHERE id = ?",
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.price)
    .bind(payload.stock)
    .bind(&payload.category)
    .bind(&payload.subcategory)
    .bind(payload.available)
    .bind(&payload.image)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::ProductNotFound(id));
    }

    fetch_product(pool, id).await
}

/// Soft delete. The row stays so historical order items keep resolving;
/// the product just stops being orderable or publicly listed.
pub async fn deactivate_product(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE products SET available = 0 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::ProductNotFound(id));
    }

    Ok(())
}

pub async fn list_products_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse, AppError> {
    let products = list_products(&state.pool, &query).await?;

    Ok(Json(json!({ "success": true, "products": products })))
}

pub async fn list_all_products_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permission::ManageCatalog)?;

    let products = list_all_products(&state.pool).await?;

    Ok(Json(json!({ "success": true, "products": products })))
}

pub async fn create_product_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<CreateProduct>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permission::ManageCatalog)?;

    let product = create_product(&state.pool, payload, state.config.max_receipt_bytes).await?;

    info!("Product {} created by {}", product.id, auth.username);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "product": product })),
    ))
}

pub async fn update_product_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateProduct>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permission::ManageCatalog)?;

    let product = update_product(&state.pool, id, payload, state.config.max_receipt_bytes).await?;

    Ok(Json(json!({ "success": true, "product": product })))
}

pub async fn delete_product_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    auth.require(Permission::ManageCatalog)?;

    deactivate_product(&state.pool, id).await?;

    info!("Product {id} deactivated by {}", auth.username);

    Ok(Json(json!({ "success": true, "message": "Product deactivated" })))
}
