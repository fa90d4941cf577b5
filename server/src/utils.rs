use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::{error::AppError, models::DraftItem};

/// Encodes an uploaded image as a MIME-prefixed base64 data URI, rejecting
/// results larger than `limit` bytes. Oversized uploads fail loudly instead
/// of being truncated.
pub fn encode_image(mime: &str, bytes: &[u8], limit: usize) -> Result<String, AppError> {
    let encoded = format!("data:{mime};base64,{}", STANDARD.encode(bytes));

    check_encoded_size(&encoded, limit)?;

    Ok(encoded)
}

/// Size gate for images that arrive already encoded (catalog uploads send
/// the data URI directly).
pub fn check_encoded_size(encoded: &str, limit: usize) -> Result<(), AppError> {
    if encoded.len() > limit {
        return Err(AppError::PayloadTooLarge {
            size: encoded.len(),
            limit,
        });
    }

    Ok(())
}

/// Parses the `items` payload into line items. Multipart submissions carry
/// the list as a JSON string field, JSON submissions as a plain array; both
/// land here as a `serde_json::Value`.
pub fn parse_items(raw: &serde_json::Value) -> Result<Vec<DraftItem>, AppError> {
    let items: Vec<DraftItem> = match raw {
        serde_json::Value::String(text) => {
            serde_json::from_str(text).map_err(|_| AppError::MalformedLineItems)?
        }
        serde_json::Value::Array(_) => {
            serde_json::from_value(raw.clone()).map_err(|_| AppError::MalformedLineItems)?
        }
        _ => return Err(AppError::MalformedLineItems),
    };

    if items.is_empty() || items.iter().any(|item| item.quantity < 1) {
        return Err(AppError::MalformedLineItems);
    }

    Ok(items)
}
