//! Quantities at the API boundary: plain decimal strings without the storage
//! scale, `null` when unknown.

use rust_decimal::Decimal;
use serde::Serializer;

/// Renders a quantity as a plain decimal string without storage padding
/// (`70.0000` becomes `"70"`).
pub fn encode_quantity(quantity: &Decimal) -> String {
    quantity.normalize().to_string()
}

pub fn serialize_quantity<S>(quantity: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&encode_quantity(quantity))
}

/// Unknown quantities serialise as `null`.
pub fn serialize_optional_quantity<S>(
    quantity: &Option<Decimal>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match quantity {
        Some(q) => serializer.serialize_some(&encode_quantity(q)),
        None => serializer.serialize_none(),
    }
}
