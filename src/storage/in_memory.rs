//! In-memory store for testing and development
//!
//! Implements every data trait over `RwLock`-guarded tables. Individual
//! write steps can be made to fail with [`InMemoryStore::inject_failure`],
//! which is how the compensating rollback of the order writer is exercised.

use crate::core::entity::{
    AdminRecord, Category, ItemLabels, League, Order, OrderItem, Patch, Payment, PaymentStatus,
    Player, Product, ProductListing, Size, Team, Variant, VariantPrice,
};
use crate::core::query::OrderFilter;
use crate::core::service::{AdminDirectory, CatalogService, OrderService};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Write operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteStep {
    Order,
    Items,
    Payment,
    DeleteOrder,
    DeleteItems,
}

#[derive(Default)]
struct Tables {
    leagues: HashMap<Uuid, League>,
    teams: HashMap<Uuid, Team>,
    categories: HashMap<Uuid, Category>,
    products: HashMap<Uuid, Product>,
    variants: HashMap<Uuid, Variant>,
    sizes: HashMap<Uuid, Size>,
    patches: HashMap<Uuid, Patch>,
    players: HashMap<Uuid, Player>,
    orders: HashMap<Uuid, Order>,
    items: HashMap<Uuid, OrderItem>,
    payments: HashMap<Uuid, Payment>,
    /// Keyed by lowercased email
    admins: HashMap<String, AdminRecord>,
}

/// In-memory store
///
/// Cheap to clone; clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    failures: Arc<RwLock<HashSet<WriteStep>>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))
    }

    /// Seeding never fails; a poisoned lock still holds usable tables
    fn seed(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_failure(&self, step: WriteStep) -> Result<()> {
        let failing = self
            .failures
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?
            .contains(&step);
        if failing {
            anyhow::bail!("injected failure at step {:?}", step);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    /// Make every future call of `step` fail
    pub fn inject_failure(&self, step: WriteStep) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(step);
    }

    pub fn clear_failures(&self) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    fn snapshot(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn order_count(&self) -> usize {
        self.snapshot().orders.len()
    }

    pub fn item_count(&self) -> usize {
        self.snapshot().items.len()
    }

    pub fn payment_count(&self) -> usize {
        self.snapshot().payments.len()
    }

    // -------------------------------------------------------------------------
    // Catalog seeding
    // -------------------------------------------------------------------------

    pub fn add_league(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.seed().leagues.insert(
            id,
            League {
                id,
                name: name.to_string(),
            },
        );
        id
    }

    pub fn add_team(&self, name: &str, league_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.seed().teams.insert(
            id,
            Team {
                id,
                name: name.to_string(),
                league_id,
            },
        );
        id
    }

    pub fn add_category(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.seed().categories.insert(
            id,
            Category {
                id,
                name: name.to_string(),
            },
        );
        id
    }

    /// Add an active product with a slug derived from its name
    pub fn add_product(&self, name: &str, team_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.insert_product(Product {
            id,
            name: name.to_string(),
            slug: slugify(name),
            team_id,
            category_id: None,
            image_url: None,
            active: true,
        });
        id
    }

    pub fn insert_product(&self, product: Product) {
        self.seed().products.insert(product.id, product);
    }

    /// Add an active variant carrying the authoritative price
    pub fn add_variant(&self, product_id: Uuid, name: &str, price: f64) -> Uuid {
        let id = Uuid::new_v4();
        self.seed().variants.insert(
            id,
            Variant {
                id,
                product_id,
                name: name.to_string(),
                price,
                active: true,
            },
        );
        id
    }

    /// Change the catalog price of a variant
    pub fn set_variant_price(&self, variant_id: Uuid, price: f64) {
        if let Some(variant) = self.seed().variants.get_mut(&variant_id) {
            variant.price = price;
        }
    }

    pub fn add_size(&self, label: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.seed().sizes.insert(
            id,
            Size {
                id,
                label: label.to_string(),
            },
        );
        id
    }

    pub fn add_patch(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.seed().patches.insert(
            id,
            Patch {
                id,
                name: name.to_string(),
            },
        );
        id
    }

    pub fn add_player(&self, team_id: Option<Uuid>, name: &str, number: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.seed().players.insert(
            id,
            Player {
                id,
                team_id,
                name: name.to_string(),
                number: number.map(str::to_string),
            },
        );
        id
    }

    /// Whitelist an admin email
    pub fn add_admin(&self, email: &str) {
        let record = AdminRecord {
            email: email.trim().to_lowercase(),
            full_name: None,
            invited_by: None,
            created_at: Utc::now(),
        };
        self.seed().admins.insert(record.email.clone(), record);
    }

    /// Small catalog for local development
    pub fn seed_demo(&self) {
        let liga = self.add_league("Liga Nacional de Honduras");
        let seleccion = self.add_league("Selecciones");
        let jerseys = self.add_category("Camisetas");

        let olimpia = self.add_team("Olimpia", Some(liga));
        let motagua = self.add_team("Motagua", Some(liga));
        let honduras = self.add_team("Honduras", Some(seleccion));

        for (team, name) in [
            (olimpia, "Olimpia Local 2025"),
            (motagua, "Motagua Local 2025"),
            (honduras, "Honduras Local 2025"),
        ] {
            let product = self.add_product(name, Some(team));
            if let Some(p) = self.seed().products.get_mut(&product) {
                p.category_id = Some(jerseys);
            }
            self.add_variant(product, "Fan", 850.0);
            self.add_variant(product, "Jugador", 1250.0);
        }

        for label in ["S", "M", "L", "XL"] {
            self.add_size(label);
        }
        self.add_patch("Liga Nacional");
        self.add_player(Some(olimpia), "Jerry Bengtson", Some("27"));
        self.add_player(Some(honduras), "Alberth Elis", Some("17"));

        tracing::info!("seeded demo catalog");
    }
}

fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[async_trait]
impl CatalogService for InMemoryStore {
    async fn variant_prices(&self, variant_ids: &[Uuid]) -> Result<HashMap<Uuid, VariantPrice>> {
        let tables = self.read()?;
        Ok(variant_ids
            .iter()
            .filter_map(|id| tables.variants.get(id))
            .filter(|variant| variant.active)
            .map(|variant| {
                (
                    variant.id,
                    VariantPrice {
                        variant_id: variant.id,
                        product_id: variant.product_id,
                        price: variant.price,
                    },
                )
            })
            .collect())
    }

    async fn describe_items(&self, items: &[OrderItem]) -> Result<Vec<ItemLabels>> {
        let tables = self.read()?;
        Ok(items
            .iter()
            .map(|item| {
                let product = tables.products.get(&item.product_id);
                let team = product
                    .and_then(|p| p.team_id)
                    .and_then(|id| tables.teams.get(&id));
                let player = item.player_id.and_then(|id| tables.players.get(&id));
                ItemLabels {
                    product_name: product.map(|p| p.name.clone()),
                    team_name: team.map(|t| t.name.clone()),
                    variant_name: item
                        .variant_id
                        .and_then(|id| tables.variants.get(&id))
                        .map(|v| v.name.clone()),
                    size_label: item
                        .size_id
                        .and_then(|id| tables.sizes.get(&id))
                        .map(|s| s.label.clone()),
                    patch_name: item
                        .patch_id
                        .and_then(|id| tables.patches.get(&id))
                        .map(|p| p.name.clone()),
                    player_name: player.map(|p| p.name.clone()),
                    player_number: player.and_then(|p| p.number.clone()),
                }
            })
            .collect())
    }

    async fn list_products(&self) -> Result<Vec<ProductListing>> {
        let tables = self.read()?;
        let mut listings: Vec<ProductListing> = tables
            .products
            .values()
            .filter(|p| p.active)
            .map(|product| {
                let team = product.team_id.and_then(|id| tables.teams.get(&id));
                let mut variants: Vec<Variant> = tables
                    .variants
                    .values()
                    .filter(|v| v.product_id == product.id && v.active)
                    .cloned()
                    .collect();
                variants.sort_by(|a, b| a.price.total_cmp(&b.price));
                ProductListing {
                    product: product.clone(),
                    team: team.map(|t| t.name.clone()),
                    league: team
                        .and_then(|t| t.league_id)
                        .and_then(|id| tables.leagues.get(&id))
                        .map(|l| l.name.clone()),
                    category: product
                        .category_id
                        .and_then(|id| tables.categories.get(&id))
                        .map(|c| c.name.clone()),
                    variants,
                }
            })
            .collect();
        listings.sort_by(|a, b| a.product.name.cmp(&b.product.name));
        Ok(listings)
    }
}

#[async_trait]
impl OrderService for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.check_failure(WriteStep::Order)?;
        let mut tables = self.write()?;
        if tables.orders.contains_key(&order.id) {
            anyhow::bail!("duplicate order id {}", order.id);
        }
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_items(&self, items: &[OrderItem]) -> Result<()> {
        self.check_failure(WriteStep::Items)?;
        let mut tables = self.write()?;
        if let Some(orphan) = items
            .iter()
            .find(|item| !tables.orders.contains_key(&item.order_id))
        {
            anyhow::bail!("order {} does not exist", orphan.order_id);
        }
        for item in items {
            tables.items.insert(item.id, item.clone());
        }
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        self.check_failure(WriteStep::Payment)?;
        let mut tables = self.write()?;
        if !tables.orders.contains_key(&payment.order_id) {
            anyhow::bail!("order {} does not exist", payment.order_id);
        }
        tables.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn delete_order(&self, order_id: &Uuid) -> Result<()> {
        self.check_failure(WriteStep::DeleteOrder)?;
        let mut tables = self.write()?;
        tables.orders.remove(order_id);
        tables.payments.retain(|_, p| &p.order_id != order_id);
        Ok(())
    }

    async fn delete_items(&self, order_id: &Uuid) -> Result<()> {
        self.check_failure(WriteStep::DeleteItems)?;
        self.write()?.items.retain(|_, i| &i.order_id != order_id);
        Ok(())
    }

    async fn get_order(&self, id: &Uuid) -> Result<Option<Order>> {
        Ok(self.read()?.orders.get(id).cloned())
    }

    async fn find_order_in_range(&self, lower: &Uuid, upper: &Uuid) -> Result<Option<Order>> {
        Ok(self
            .read()?
            .orders
            .values()
            .filter(|o| &o.id >= lower && &o.id <= upper)
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let tables = self.read()?;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| filter.matches(&o.created_at, &o.status))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            orders.truncate(limit);
        }
        Ok(orders)
    }

    async fn items_for_order(&self, order_id: &Uuid) -> Result<Vec<OrderItem>> {
        let tables = self.read()?;
        let mut items: Vec<OrderItem> = tables
            .items
            .values()
            .filter(|i| &i.order_id == order_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.created_at);
        Ok(items)
    }

    async fn items_for_orders(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
        let wanted: HashSet<&Uuid> = order_ids.iter().collect();
        let tables = self.read()?;
        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in tables.items.values().filter(|i| wanted.contains(&i.order_id)) {
            grouped.entry(item.order_id).or_default().push(item.clone());
        }
        Ok(grouped)
    }

    async fn payments_for_order(&self, order_id: &Uuid) -> Result<Vec<Payment>> {
        let tables = self.read()?;
        let mut payments: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| &p.order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn update_order_status(&self, id: &Uuid, status: &str) -> Result<Option<Order>> {
        let mut tables = self.write()?;
        Ok(tables.orders.get_mut(id).map(|order| {
            order.status = status.to_string();
            order.touch();
            order.clone()
        }))
    }

    async fn advance_order_status(&self, id: &Uuid, from: &str, to: &str) -> Result<bool> {
        let mut tables = self.write()?;
        match tables.orders.get_mut(id) {
            Some(order) if order.status == from => {
                order.status = to.to_string();
                order.touch();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_payment(&self, id: &Uuid) -> Result<Option<Payment>> {
        Ok(self.read()?.payments.get(id).cloned())
    }

    async fn update_payment_status(
        &self,
        id: &Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Payment>> {
        let mut tables = self.write()?;
        Ok(tables.payments.get_mut(id).map(|payment| {
            payment.status = status;
            payment.updated_at = Utc::now();
            payment.clone()
        }))
    }
}

#[async_trait]
impl AdminDirectory for InMemoryStore {
    async fn is_admin(&self, email: &str) -> Result<bool> {
        Ok(self
            .read()?
            .admins
            .contains_key(&email.trim().to_lowercase()))
    }

    async fn upsert_admin(&self, record: AdminRecord) -> Result<AdminRecord> {
        let key = record.email.trim().to_lowercase();
        let mut tables = self.write()?;
        let stored = tables
            .admins
            .entry(key.clone())
            .and_modify(|existing| {
                if record.full_name.is_some() {
                    existing.full_name = record.full_name.clone();
                }
            })
            .or_insert_with(|| AdminRecord {
                email: key,
                ..record
            });
        Ok(stored.clone())
    }

    async fn list_admins(&self) -> Result<Vec<AdminRecord>> {
        let mut admins: Vec<AdminRecord> = self.read()?.admins.values().cloned().collect();
        admins.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(admins)
    }
}
