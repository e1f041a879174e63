//! Checkout payload and its validation
//!
//! The payload is accepted leniently (every field optional, ids as text) so
//! that one pass can report every problem at once instead of failing on the
//! first malformed field.

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::core::entity::PersonalizationType;
use crate::core::error::{FieldValidationError, ValidationError};
use crate::core::field::{FieldFormat, non_blank, optional_uuid};

/// Name of the hidden form field that only bots fill in
pub const HONEYPOT_FIELD: &str = "_honey";

/// Body of `POST /api/orders/create`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateOrderRequest {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub shipping_department: Option<String>,
    pub shipping_municipality: Option<String>,
    pub shipping_address: Option<String>,
    pub payment_method: Option<String>,
    pub items: Vec<CartLineRequest>,
}

/// One cart line as sent by the storefront
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CartLineRequest {
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub size_id: Option<String>,
    pub patch_id: Option<String>,
    /// Kept as raw JSON so a bad value becomes a field error
    pub quantity: Option<Value>,
    pub personalization_type: Option<String>,
    pub player_id: Option<String>,
    pub custom_number: Option<Value>,
    pub custom_name: Option<String>,
    /// Advisory only; never read for any computation
    pub unit_price: Option<Value>,
}

/// Customer and shipping fields of a validated order
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub shipping_department: String,
    pub shipping_municipality: String,
    pub shipping_address: String,
}

/// A cart line that passed validation; not priced yet
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub size_id: Option<Uuid>,
    pub patch_id: Option<Uuid>,
    pub player_id: Option<Uuid>,
    pub quantity: u32,
    pub personalization_type: PersonalizationType,
    pub custom_name: Option<String>,
    pub custom_number: Option<String>,
}

/// Output of [`CreateOrderRequest::validate`]
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedOrder {
    pub customer: CustomerDetails,
    pub payment_method: String,
    pub lines: Vec<CartLine>,
}

/// Whether a raw payload carries a filled-in honeypot field
pub fn is_honeypot(payload: &Value) -> bool {
    match payload.get(HONEYPOT_FIELD) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

impl CreateOrderRequest {
    /// Check every field and build the validated order
    ///
    /// All problems are reported together in one `FieldErrors`.
    pub fn validate(&self) -> Result<ValidatedOrder, ValidationError> {
        let mut errors = Vec::new();

        let name = required(&self.customer_name, "customer_name", &mut errors);
        let email = required(&self.customer_email, "customer_email", &mut errors);
        let phone = required(&self.customer_phone, "customer_phone", &mut errors);
        let department = required(&self.shipping_department, "shipping_department", &mut errors);
        let municipality = required(
            &self.shipping_municipality,
            "shipping_municipality",
            &mut errors,
        );
        let address = required(&self.shipping_address, "shipping_address", &mut errors);
        let payment_method = required(&self.payment_method, "payment_method", &mut errors);

        if let Some(email) = &email {
            if !FieldFormat::Email.validate(email) {
                errors.push(FieldValidationError::new(
                    "customer_email",
                    "must be a valid email address",
                ));
            }
        }
        if let Some(phone) = &phone {
            if !FieldFormat::Phone.validate(phone) {
                errors.push(FieldValidationError::new(
                    "customer_phone",
                    "must be a valid phone number",
                ));
            }
        }

        if self.items.is_empty() {
            errors.push(FieldValidationError::new(
                "items",
                "at least one item is required",
            ));
        }

        let lines: Vec<CartLine> = self
            .items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| item.validate(index, &mut errors))
            .collect();

        if !errors.is_empty() {
            return Err(ValidationError::FieldErrors(errors));
        }

        match (
            name,
            email,
            phone,
            department,
            municipality,
            address,
            payment_method,
        ) {
            (
                Some(name),
                Some(email),
                Some(phone),
                Some(shipping_department),
                Some(shipping_municipality),
                Some(shipping_address),
                Some(payment_method),
            ) => Ok(ValidatedOrder {
                customer: CustomerDetails {
                    name,
                    email: email.to_lowercase(),
                    phone,
                    shipping_department,
                    shipping_municipality,
                    shipping_address,
                },
                payment_method,
                lines,
            }),
            _ => Err(ValidationError::FieldErrors(errors)),
        }
    }
}

impl CartLineRequest {
    fn validate(&self, index: usize, errors: &mut Vec<FieldValidationError>) -> Option<CartLine> {
        let before = errors.len();
        let field = |name: &str| format!("items[{}].{}", index, name);

        let product_id = match optional_uuid(self.product_id.as_deref()) {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                errors.push(FieldValidationError::new(field("product_id"), "is required"));
                None
            }
            Err(_) => {
                errors.push(FieldValidationError::new(
                    field("product_id"),
                    "must be a valid id",
                ));
                None
            }
        };

        // Products without a priced variant are not purchasable
        let variant_id = match optional_uuid(self.variant_id.as_deref()) {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                errors.push(FieldValidationError::new(
                    field("variant_id"),
                    "is required; select a version of the product",
                ));
                None
            }
            Err(_) => {
                errors.push(FieldValidationError::new(
                    field("variant_id"),
                    "must be a valid id",
                ));
                None
            }
        };

        let size_id = optional_id(self.size_id.as_deref(), &field("size_id"), errors);
        let patch_id = optional_id(self.patch_id.as_deref(), &field("patch_id"), errors);
        let player_id = optional_id(self.player_id.as_deref(), &field("player_id"), errors);

        let quantity = match self.quantity.as_ref().map(parse_quantity) {
            Some(Some(quantity)) => Some(quantity),
            Some(None) => {
                errors.push(FieldValidationError::new(
                    field("quantity"),
                    "must be a positive integer",
                ));
                None
            }
            None => {
                errors.push(FieldValidationError::new(field("quantity"), "is required"));
                None
            }
        };

        let personalization_type =
            match PersonalizationType::parse(self.personalization_type.as_deref().unwrap_or("")) {
                Some(kind) => kind,
                None => {
                    errors.push(FieldValidationError::new(
                        field("personalization_type"),
                        "must be one of none, player, custom",
                    ));
                    PersonalizationType::None
                }
            };

        let custom_name = non_blank(self.custom_name.as_deref());
        let custom_number = self.custom_number.as_ref().and_then(text_value);

        let (player_id, custom_name, custom_number) = match personalization_type {
            PersonalizationType::None => (None, None, None),
            PersonalizationType::Player => {
                if non_blank(self.player_id.as_deref()).is_none() {
                    errors.push(FieldValidationError::new(
                        field("player_id"),
                        "is required for player personalization",
                    ));
                }
                (player_id, custom_name, custom_number)
            }
            PersonalizationType::Custom => {
                if custom_name.is_none() && custom_number.is_none() {
                    errors.push(FieldValidationError::new(
                        field("custom_name"),
                        "a name or a number is required for custom personalization",
                    ));
                }
                (None, custom_name, custom_number)
            }
        };

        if errors.len() != before {
            return None;
        }

        Some(CartLine {
            product_id: product_id?,
            variant_id: variant_id?,
            size_id,
            patch_id,
            player_id,
            quantity: quantity?,
            personalization_type,
            custom_name,
            custom_number,
        })
    }
}

fn required(
    value: &Option<String>,
    field: &str,
    errors: &mut Vec<FieldValidationError>,
) -> Option<String> {
    let value = non_blank(value.as_deref());
    if value.is_none() {
        errors.push(FieldValidationError::new(field, "is required"));
    }
    value
}

/// Optional foreign key; empty text is treated as absent
fn optional_id(
    value: Option<&str>,
    field: &str,
    errors: &mut Vec<FieldValidationError>,
) -> Option<Uuid> {
    optional_uuid(value).unwrap_or_else(|_| {
        errors.push(FieldValidationError::new(field, "must be a valid id"));
        None
    })
}

fn parse_quantity(value: &Value) -> Option<u32> {
    let quantity = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    if quantity == 0 {
        return None;
    }
    u32::try_from(quantity).ok()
}

/// Jersey numbers arrive as either text or numbers
fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_blank(Some(s)),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
