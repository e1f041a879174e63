//! Authoritative pricing of cart lines
//!
//! Prices always come from the catalog. Whatever price the client sent is
//! dropped during validation and never reaches this module.

use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::PricingError;
use crate::core::service::CatalogService;
use crate::orders::request::CartLine;

/// A cart line with its authoritative unit price
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub line: CartLine,
    pub unit_price: f64,
}

impl PricedLine {
    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.line.quantity)
    }
}

/// Resolves variant prices in one batch lookup
#[derive(Clone)]
pub struct PricingResolver {
    catalog: Arc<dyn CatalogService>,
}

impl PricingResolver {
    pub fn new(catalog: Arc<dyn CatalogService>) -> Self {
        Self { catalog }
    }

    /// Price every line or none
    ///
    /// Fails when any variant is unknown to the catalog or belongs to a
    /// different product than the line names.
    pub async fn resolve(&self, lines: Vec<CartLine>) -> Result<Vec<PricedLine>, PricingError> {
        let mut seen = HashSet::new();
        let variant_ids: Vec<Uuid> = lines
            .iter()
            .map(|line| line.variant_id)
            .filter(|id| seen.insert(*id))
            .collect();

        let prices = self
            .catalog
            .variant_prices(&variant_ids)
            .await
            .map_err(|e| PricingError::LookupFailed {
                message: format!("{:#}", e),
            })?;

        let unknown: Vec<String> = variant_ids
            .iter()
            .filter(|id| !prices.contains_key(id))
            .map(Uuid::to_string)
            .collect();
        if !unknown.is_empty() {
            tracing::warn!(variants = ?unknown, "cart references unknown variants");
            return Err(PricingError::UnknownVariants {
                variant_ids: unknown,
            });
        }

        lines
            .into_iter()
            .map(|line| {
                let price = prices
                    .get(&line.variant_id)
                    .ok_or_else(|| PricingError::UnknownVariants {
                        variant_ids: vec![line.variant_id.to_string()],
                    })?;
                if price.product_id != line.product_id {
                    return Err(PricingError::ProductMismatch {
                        variant_id: line.variant_id.to_string(),
                        product_id: line.product_id.to_string(),
                    });
                }
                Ok(PricedLine {
                    unit_price: price.price,
                    line,
                })
            })
            .collect()
    }
}

/// Sum of `unit_price * quantity` over all lines
pub fn subtotal(lines: &[PricedLine]) -> f64 {
    lines.iter().map(PricedLine::line_total).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::PersonalizationType;
    use crate::storage::InMemoryStore;

    fn line(product_id: Uuid, variant_id: Uuid, quantity: u32) -> CartLine {
        CartLine {
            product_id,
            variant_id,
            size_id: None,
            patch_id: None,
            player_id: None,
            quantity,
            personalization_type: PersonalizationType::None,
            custom_name: None,
            custom_number: None,
        }
    }

    #[tokio::test]
    async fn test_prices_come_from_catalog() {
        let store = InMemoryStore::new();
        let product = store.add_product("Olimpia Local 2025", None);
        let variant = store.add_variant(product, "Fan", 500.0);

        let resolver = PricingResolver::new(Arc::new(store));
        let priced = resolver
            .resolve(vec![line(product, variant, 2)])
            .await
            .unwrap();

        assert_eq!(priced[0].unit_price, 500.0);
        assert_eq!(subtotal(&priced), 1000.0);
    }

    #[tokio::test]
    async fn test_repeated_variant_is_priced_once_per_line() {
        let store = InMemoryStore::new();
        let product = store.add_product("Motagua Visita 2025", None);
        let variant = store.add_variant(product, "Jugador", 750.0);

        let resolver = PricingResolver::new(Arc::new(store));
        let priced = resolver
            .resolve(vec![line(product, variant, 1), line(product, variant, 3)])
            .await
            .unwrap();

        assert_eq!(priced.len(), 2);
        assert_eq!(subtotal(&priced), 3000.0);
    }

    #[tokio::test]
    async fn test_unknown_variant_fails_whole_cart() {
        let store = InMemoryStore::new();
        let product = store.add_product("Honduras Local", None);
        let variant = store.add_variant(product, "Fan", 600.0);
        let missing = Uuid::new_v4();

        let resolver = PricingResolver::new(Arc::new(store));
        let err = resolver
            .resolve(vec![line(product, variant, 1), line(product, missing, 1)])
            .await
            .unwrap_err();

        match err {
            PricingError::UnknownVariants { variant_ids } => {
                assert_eq!(variant_ids, vec![missing.to_string()]);
            }
            other => panic!("expected unknown variants, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_variant_of_other_product_is_rejected() {
        let store = InMemoryStore::new();
        let product = store.add_product("Real España Local", None);
        let other = store.add_product("Marathón Local", None);
        let variant = store.add_variant(other, "Fan", 550.0);

        let resolver = PricingResolver::new(Arc::new(store));
        let err = resolver
            .resolve(vec![line(product, variant, 1)])
            .await
            .unwrap_err();

        assert!(matches!(err, PricingError::ProductMismatch { .. }));
    }
}
