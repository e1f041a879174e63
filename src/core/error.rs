//! Typed error handling for the store
//!
//! Every request handler returns a [`StoreError`] (or an [`AdminError`] on
//! back-office routes), which renders as the JSON envelope
//! `{success: false, error, code, details?}`.
//!
//! # Error Categories
//!
//! - [`ValidationError`]: malformed or incomplete input, rejected before any write
//! - [`PricingError`]: references to products/variants the catalog cannot price
//! - [`StorageError`]: failures of the external store, after compensation
//! - [`EntityError`]: lookups with no match
//! - [`TransitionError`]: status changes outside the allowed workflow
//! - [`RequestError`]: authentication, authorization and throttling
//! - [`ConfigError`]: configuration parsing and validation

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// The main error type of the store
#[derive(Debug)]
pub enum StoreError {
    /// Input validation errors
    Validation(ValidationError),

    /// Reference errors raised while pricing a cart
    Pricing(PricingError),

    /// Storage backend errors
    Storage(StorageError),

    /// Entity lookup errors
    Entity(EntityError),

    /// Order status workflow errors
    Transition(TransitionError),

    /// HTTP/Request errors
    Request(RequestError),

    /// Configuration errors
    Config(ConfigError),

    /// Internal errors (should not happen in normal operation)
    Internal(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Validation(e) => write!(f, "{}", e),
            StoreError::Pricing(e) => write!(f, "{}", e),
            StoreError::Storage(e) => write!(f, "{}", e),
            StoreError::Entity(e) => write!(f, "{}", e),
            StoreError::Transition(e) => write!(f, "{}", e),
            StoreError::Request(e) => write!(f, "{}", e),
            StoreError::Config(e) => write!(f, "{}", e),
            StoreError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Validation(e) => Some(e),
            StoreError::Pricing(e) => Some(e),
            StoreError::Storage(e) => Some(e),
            StoreError::Entity(e) => Some(e),
            StoreError::Transition(e) => Some(e),
            StoreError::Request(e) => Some(e),
            StoreError::Config(e) => Some(e),
            StoreError::Internal(_) => None,
        }
    }
}

/// Error envelope returned by every failing endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    /// Message meant for the person looking at the screen
    pub error: String,
    /// Error code for programmatic handling
    pub code: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl StoreError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::Pricing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StoreError::Entity(e) => e.status_code(),
            StoreError::Transition(e) => e.status_code(),
            StoreError::Request(e) => e.status_code(),
            StoreError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::Validation(_) => "VALIDATION_ERROR",
            StoreError::Pricing(e) => e.error_code(),
            StoreError::Storage(e) => e.error_code(),
            StoreError::Entity(e) => e.error_code(),
            StoreError::Transition(e) => e.error_code(),
            StoreError::Request(e) => e.error_code(),
            StoreError::Config(_) => "CONFIG_ERROR",
            StoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Friendly, localized message shown to shoppers
    pub fn public_message(&self) -> String {
        match self {
            StoreError::Validation(_) => {
                "Revisa los datos del formulario e intenta de nuevo.".to_string()
            }
            StoreError::Pricing(_) => {
                "No pudimos calcular el precio de tu pedido. Actualiza tu carrito e intenta de nuevo."
                    .to_string()
            }
            StoreError::Storage(_) => {
                "No pudimos registrar tu pedido. Intenta de nuevo en unos minutos.".to_string()
            }
            StoreError::Entity(EntityError::OrderNotFound) => {
                "No encontramos ningún pedido con ese código.".to_string()
            }
            StoreError::Entity(_) => "No encontramos lo que buscas.".to_string(),
            StoreError::Transition(_) => {
                "El cambio de estado no está permitido.".to_string()
            }
            StoreError::Request(RequestError::RateLimited { .. }) => {
                "Demasiadas solicitudes. Espera un momento antes de intentar de nuevo.".to_string()
            }
            StoreError::Request(RequestError::Unauthorized { .. }) => {
                "Debes iniciar sesión.".to_string()
            }
            StoreError::Request(RequestError::Forbidden { .. }) => {
                "No tienes permiso para realizar esta acción.".to_string()
            }
            StoreError::Config(_) | StoreError::Internal(_) => {
                "Ocurrió un error inesperado.".to_string()
            }
        }
    }

    /// Convert to the customer-facing error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            error: self.public_message(),
            code: self.error_code().to_string(),
            details: self.details(),
        }
    }

    /// Convert to the back-office error response, which shows the raw message
    pub fn to_admin_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            error: self.to_string(),
            code: self.error_code().to_string(),
            details: self.details(),
        }
    }

    /// Get additional details for the error
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            StoreError::Validation(ValidationError::FieldErrors(errors)) => {
                Some(serde_json::json!({ "fields": errors }))
            }
            StoreError::Validation(ValidationError::FieldError { field, message }) => {
                Some(serde_json::json!({
                    "fields": [{ "field": field, "message": message }]
                }))
            }
            StoreError::Validation(e) => Some(serde_json::Value::String(e.to_string())),
            StoreError::Pricing(PricingError::UnknownVariants { variant_ids }) => {
                Some(serde_json::json!({ "variant_ids": variant_ids }))
            }
            StoreError::Pricing(e) => Some(serde_json::Value::String(e.to_string())),
            StoreError::Storage(e) => Some(serde_json::Value::String(e.to_string())),
            StoreError::Transition(TransitionError::NotAllowed { from, to }) => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            _ => None,
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            StoreError::Request(RequestError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }

    fn render(&self, body: ErrorResponse) -> Response {
        let mut response = (self.status_code(), Json(body)).into_response();
        if let Some(secs) = self.retry_after() {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        if self.status_code().is_server_error() {
            tracing::error!(code = self.error_code(), "request failed: {}", self);
        }
        let body = self.to_response();
        self.render(body)
    }
}

/// Error returned by back-office handlers
///
/// Same status codes and codes as [`StoreError`], but the `error` field
/// carries the raw diagnostic message.
#[derive(Debug)]
pub struct AdminError(pub StoreError);

impl<E> From<E> for AdminError
where
    E: Into<StoreError>,
{
    fn from(err: E) -> Self {
        AdminError(err.into())
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        if self.0.status_code().is_server_error() {
            tracing::error!(code = self.0.error_code(), "admin request failed: {}", self.0);
        }
        let body = self.0.to_admin_response();
        self.0.render(body)
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors related to input validation
#[derive(Debug)]
pub enum ValidationError {
    /// Single field validation error
    FieldError { field: String, message: String },

    /// Multiple field validation errors
    FieldErrors(Vec<FieldValidationError>),

    /// Invalid JSON format
    InvalidJson { message: String },

    /// Missing required argument
    MissingArgument { argument: String },
}

/// A single field validation error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValidationError {
    pub field: String,
    pub message: String,
}

impl FieldValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::FieldError { field, message } => {
                write!(f, "Validation error for field '{}': {}", field, message)
            }
            ValidationError::FieldErrors(errors) => {
                let msgs: Vec<String> = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                write!(f, "Validation errors: {}", msgs.join(", "))
            }
            ValidationError::InvalidJson { message } => {
                write!(f, "Invalid JSON: {}", message)
            }
            ValidationError::MissingArgument { argument } => {
                write!(f, "Missing required argument: {}", argument)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        StoreError::Validation(err)
    }
}

// =============================================================================
// Pricing Errors
// =============================================================================

/// Errors raised while resolving authoritative prices
#[derive(Debug)]
pub enum PricingError {
    /// Variants absent from the catalog
    UnknownVariants { variant_ids: Vec<String> },

    /// A variant that belongs to another product than the one requested
    ProductMismatch { variant_id: String, product_id: String },

    /// The price lookup itself failed
    LookupFailed { message: String },
}

impl fmt::Display for PricingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PricingError::UnknownVariants { variant_ids } => {
                write!(f, "Unknown variants: {}", variant_ids.join(", "))
            }
            PricingError::ProductMismatch {
                variant_id,
                product_id,
            } => {
                write!(
                    f,
                    "Variant '{}' does not belong to product '{}'",
                    variant_id, product_id
                )
            }
            PricingError::LookupFailed { message } => {
                write!(f, "Price lookup failed: {}", message)
            }
        }
    }
}

impl std::error::Error for PricingError {}

impl PricingError {
    pub fn error_code(&self) -> &'static str {
        match self {
            PricingError::UnknownVariants { .. } => "UNKNOWN_VARIANT",
            PricingError::ProductMismatch { .. } => "VARIANT_PRODUCT_MISMATCH",
            PricingError::LookupFailed { .. } => "PRICING_FAILED",
        }
    }
}

impl From<PricingError> for StoreError {
    fn from(err: PricingError) -> Self {
        StoreError::Pricing(err)
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to storage backends
#[derive(Debug)]
pub enum StorageError {
    /// Query execution error
    QueryError { operation: String, message: String },

    /// Transaction error
    TransactionError { message: String },

    /// A write failed and the already-committed steps were removed
    RolledBack { step: String, message: String },

    /// A write failed and removing the committed steps failed too
    RollbackFailed {
        step: String,
        message: String,
        rollback_message: String,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::QueryError { operation, message } => {
                write!(f, "Failed to {}: {}", operation, message)
            }
            StorageError::TransactionError { message } => {
                write!(f, "Transaction error: {}", message)
            }
            StorageError::RolledBack { step, message } => {
                write!(f, "Failed to insert {} (rolled back): {}", step, message)
            }
            StorageError::RollbackFailed {
                step,
                message,
                rollback_message,
            } => {
                write!(
                    f,
                    "Failed to insert {}: {}; rollback also failed: {}",
                    step, message, rollback_message
                )
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl StorageError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::QueryError { .. } => "STORAGE_ERROR",
            StorageError::TransactionError { .. } => "STORAGE_TRANSACTION_ERROR",
            StorageError::RolledBack { .. } => "STORAGE_ERROR",
            StorageError::RollbackFailed { .. } => "STORAGE_ROLLBACK_FAILED",
        }
    }

    /// Wrap a backend failure for the named operation
    pub fn query(operation: &str, err: impl fmt::Display) -> Self {
        StorageError::QueryError {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::Storage(err)
    }
}

// =============================================================================
// Entity Errors
// =============================================================================

/// Errors related to entity lookups
#[derive(Debug)]
pub enum EntityError {
    /// Entity was not found
    NotFound { entity_type: String, id: String },

    /// Tracking lookup found nothing; says nothing about which part was wrong
    OrderNotFound,
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityError::NotFound { entity_type, id } => {
                write!(f, "{} with id '{}' not found", entity_type, id)
            }
            EntityError::OrderNotFound => write!(f, "Order not found"),
        }
    }
}

impl std::error::Error for EntityError {}

impl EntityError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::NOT_FOUND
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            EntityError::NotFound { .. } => "ENTITY_NOT_FOUND",
            EntityError::OrderNotFound => "ORDER_NOT_FOUND",
        }
    }

    pub fn not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        EntityError::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<EntityError> for StoreError {
    fn from(err: EntityError) -> Self {
        StoreError::Entity(err)
    }
}

// =============================================================================
// Transition Errors
// =============================================================================

/// Errors related to the order status workflow
#[derive(Debug)]
pub enum TransitionError {
    /// The move is not in the transition table
    NotAllowed { from: String, to: String },

    /// The requested status is not a known code
    UnknownStatus { value: String },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::NotAllowed { from, to } => {
                write!(f, "Transition from '{}' to '{}' is not allowed", from, to)
            }
            TransitionError::UnknownStatus { value } => {
                write!(f, "Unknown status '{}'", value)
            }
        }
    }
}

impl std::error::Error for TransitionError {}

impl TransitionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TransitionError::NotAllowed { .. } => StatusCode::CONFLICT,
            TransitionError::UnknownStatus { .. } => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            TransitionError::NotAllowed { .. } => "INVALID_TRANSITION",
            TransitionError::UnknownStatus { .. } => "UNKNOWN_STATUS",
        }
    }
}

impl From<TransitionError> for StoreError {
    fn from(err: TransitionError) -> Self {
        StoreError::Transition(err)
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors related to HTTP requests
#[derive(Debug)]
pub enum RequestError {
    /// No valid session
    Unauthorized { message: String },

    /// Session without the required privileges
    Forbidden { message: String },

    /// Too many requests from the same client
    RateLimited { retry_after_secs: u64 },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Unauthorized { message } => {
                write!(f, "Unauthorized: {}", message)
            }
            RequestError::Forbidden { message } => {
                write!(f, "Forbidden: {}", message)
            }
            RequestError::RateLimited { retry_after_secs } => {
                write!(f, "Rate limit exceeded, retry in {}s", retry_after_secs)
            }
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            RequestError::Forbidden { .. } => StatusCode::FORBIDDEN,
            RequestError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::Unauthorized { .. } => "UNAUTHORIZED",
            RequestError::Forbidden { .. } => "FORBIDDEN",
            RequestError::RateLimited { .. } => "RATE_LIMITED",
        }
    }
}

impl From<RequestError> for StoreError {
    fn from(err: RequestError) -> Self {
        StoreError::Request(err)
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to parse configuration file
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Invalid value in configuration
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// IO error while reading configuration
    IoError { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError { file, message } => {
                if let Some(file) = file {
                    write!(f, "Failed to parse config file '{}': {}", file, message)
                } else {
                    write!(f, "Failed to parse config: {}", message)
                }
            }
            ConfigError::InvalidValue {
                field,
                value,
                message,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, message
                )
            }
            ConfigError::IoError { message } => {
                write!(f, "IO error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for StoreError {
    fn from(err: ConfigError) -> Self {
        StoreError::Config(err)
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Validation(ValidationError::InvalidJson {
            message: err.to_string(),
        })
    }
}

/// Convert from anyhow::Error for code paths that have no better category
impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Internal(err.to_string())
    }
}

// =============================================================================
// Result type alias
// =============================================================================

/// A specialized Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
