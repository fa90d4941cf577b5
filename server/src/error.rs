use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Table number {value} is outside the valid range 1-{max}")]
    InvalidRange { value: i64, max: i64 },

    #[error("{0} must be non-negative")]
    InvalidValue(&'static str),

    #[error("Unknown payment method: {0}")]
    InvalidPaymentMethod(String),

    #[error("Transfer orders require a receipt image")]
    MissingReceipt,

    #[error("Line items must be a non-empty list of product and quantity")]
    MalformedLineItems,

    #[error("Product {0} not found or unavailable")]
    ProductNotFound(i64),

    #[error("Order {0} not found")]
    OrderNotFound(i64),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("Encoded image is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// Machine-checkable error kind, stable across message wording changes.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::MalformedPayload => "malformed-payload",
            AppError::MissingField(_) => "missing-field",
            AppError::InvalidRange { .. } => "invalid-range",
            AppError::InvalidValue(_) => "invalid-range",
            AppError::InvalidPaymentMethod(_) => "invalid-payment-method",
            AppError::MissingReceipt => "missing-receipt",
            AppError::MalformedLineItems => "malformed-line-items",
            AppError::ProductNotFound(_) => "product-not-found",
            AppError::OrderNotFound(_) => "order-not-found",
            AppError::InsufficientStock { .. } => "insufficient-stock",
            AppError::PayloadTooLarge { .. } => "payload-too-large",
            AppError::InvalidCredentials => "invalid-credentials",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::Database(_) => "persistence-failure",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload
            | AppError::MissingField(_)
            | AppError::InvalidRange { .. }
            | AppError::InvalidValue(_)
            | AppError::InvalidPaymentMethod(_)
            | AppError::MissingReceipt
            | AppError::MalformedLineItems
            | AppError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ProductNotFound(_) | AppError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidCredentials | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Database(err) = &self {
            error!("database error: {err}");
        }

        let body = Json(json!({
            "success": false,
            "error": self.kind(),
            "message": self.to_string(),
        }));

        (self.status(), body).into_response()
    }
}
