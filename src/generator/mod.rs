//! Bulk synthetic data for the sample tables.
//!
//! Creates the four `sample_*` tables when missing, clears them and
//! refills them in multi-row batches. Only one generation may run at a
//! time; its progress is observable through [`GenerationState`].

mod rows;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

use crate::db::{DatabaseBackend, DatabaseClient};
use crate::error::{Result, SandboxError};

/// Most customers one generation may create.
pub const MAX_CUSTOMERS: u64 = 1_000_000;
/// Most products one generation may create.
pub const MAX_PRODUCTS: u64 = 100_000;
/// Most orders one generation may create.
pub const MAX_ORDERS: u64 = 5_000_000;
/// Upper bound on the average items per order.
pub const MAX_ITEMS_PER_ORDER: u32 = 20;

/// Rows per INSERT statement.
const BATCH_SIZE: usize = 5000;

/// Seed used when none is given, so repeated runs produce the same data.
pub const DEFAULT_SEED: u64 = 0x5A4D_B0C5;

/// Snapshot of the generator's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationStatus {
    pub is_generating: bool,
    /// Percent complete, 0 to 100.
    pub progress: u8,
    pub current_task: String,
}

/// Shared progress cell with a single-writer guard.
#[derive(Debug, Clone, Default)]
pub struct GenerationState {
    inner: Arc<Mutex<GenerationStatus>>,
}

impl GenerationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current status.
    pub fn status(&self) -> GenerationStatus {
        self.lock().clone()
    }

    /// Claims the generator, failing if a generation is already running.
    pub fn begin(&self) -> Result<GenerationGuard> {
        let mut status = self.lock();
        if status.is_generating {
            return Err(SandboxError::conflict("Data generation is already in progress"));
        }
        *status = GenerationStatus {
            is_generating: true,
            progress: 0,
            current_task: "Starting...".to_string(),
        };
        Ok(GenerationGuard {
            state: self.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, GenerationStatus> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Exclusive claim on the generator. Releases it when dropped.
#[derive(Debug)]
pub struct GenerationGuard {
    state: GenerationState,
}

impl GenerationGuard {
    /// Publishes progress for observers.
    pub fn report(&self, progress: u8, task: impl Into<String>) {
        let mut status = self.state.lock();
        status.progress = progress.min(100);
        status.current_task = task.into();
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.state.lock().is_generating = false;
    }
}

/// How much data to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationRequest {
    pub customers: u64,
    pub products: u64,
    pub orders: u64,
    pub items_per_order: u32,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            customers: 10_000,
            products: 1_000,
            orders: 50_000,
            items_per_order: 3,
        }
    }
}

impl GenerationRequest {
    /// Checks the counts against the generator's limits.
    pub fn validate(&self) -> Result<()> {
        check_range("customers", self.customers, 1, MAX_CUSTOMERS)?;
        check_range("products", self.products, 1, MAX_PRODUCTS)?;
        check_range("orders", self.orders, 0, MAX_ORDERS)?;
        check_range(
            "items_per_order",
            u64::from(self.items_per_order),
            1,
            u64::from(MAX_ITEMS_PER_ORDER),
        )
    }
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SandboxError::invalid_request(format!(
            "{name} must be between {min} and {max}, got {value}"
        )))
    }
}

/// Rows written by a completed generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub customers: u64,
    pub products: u64,
    pub orders: u64,
    pub order_items: u64,
    pub elapsed_ms: u64,
}

struct SampleTable {
    name: &'static str,
    columns: &'static str,
    indexes: &'static [(&'static str, &'static str)],
}

// Parents before children; clearing walks this list backwards.
const SAMPLE_TABLES: &[SampleTable] = &[
    SampleTable {
        name: "sample_customers",
        columns: "id BIGINT PRIMARY KEY, first_name VARCHAR(50) NOT NULL, \
                  last_name VARCHAR(50) NOT NULL, email VARCHAR(120) NOT NULL, \
                  phone VARCHAR(20), city VARCHAR(50), country VARCHAR(50), \
                  registration_date DATE, status VARCHAR(20) NOT NULL",
        indexes: &[
            ("idx_customers_city", "city"),
            ("idx_customers_status", "status"),
        ],
    },
    SampleTable {
        name: "sample_products",
        columns: "id BIGINT PRIMARY KEY, name VARCHAR(200) NOT NULL, \
                  category VARCHAR(50) NOT NULL, brand VARCHAR(50), \
                  price DECIMAL(10,2) NOT NULL, cost DECIMAL(10,2), \
                  stock_quantity INTEGER NOT NULL, sku VARCHAR(20) NOT NULL, \
                  is_active SMALLINT NOT NULL",
        indexes: &[("idx_products_category", "category")],
    },
    SampleTable {
        name: "sample_orders",
        columns: "id BIGINT PRIMARY KEY, customer_id BIGINT NOT NULL, order_date DATE, \
                  order_status VARCHAR(20) NOT NULL, total_amount DECIMAL(12,2) NOT NULL, \
                  payment_method VARCHAR(20), \
                  FOREIGN KEY (customer_id) REFERENCES sample_customers (id)",
        indexes: &[
            ("idx_orders_customer", "customer_id"),
            ("idx_orders_date", "order_date"),
        ],
    },
    SampleTable {
        name: "sample_order_items",
        columns: "id BIGINT PRIMARY KEY, order_id BIGINT NOT NULL, product_id BIGINT NOT NULL, \
                  quantity INTEGER NOT NULL, unit_price DECIMAL(10,2) NOT NULL, \
                  discount_percent INTEGER NOT NULL, subtotal DECIMAL(12,2) NOT NULL, \
                  FOREIGN KEY (order_id) REFERENCES sample_orders (id), \
                  FOREIGN KEY (product_id) REFERENCES sample_products (id)",
        indexes: &[
            ("idx_order_items_order", "order_id"),
            ("idx_order_items_product", "product_id"),
        ],
    },
];

/// DDL creating every sample table and index for `backend`.
pub fn schema_statements(backend: DatabaseBackend) -> Vec<String> {
    let mut statements = Vec::new();
    for table in SAMPLE_TABLES {
        match backend {
            DatabaseBackend::MySql => {
                let indexes: String = table
                    .indexes
                    .iter()
                    .map(|(name, column)| format!(", INDEX {name} ({column})"))
                    .collect();
                statements.push(format!(
                    "CREATE TABLE IF NOT EXISTS {} ({}{indexes})",
                    table.name, table.columns
                ));
            }
            DatabaseBackend::Sqlite => {
                statements.push(format!(
                    "CREATE TABLE IF NOT EXISTS {} ({})",
                    table.name, table.columns
                ));
                statements.extend(table.indexes.iter().map(|(name, column)| {
                    format!("CREATE INDEX IF NOT EXISTS {name} ON {} ({column})", table.name)
                }));
            }
        }
    }
    statements
}

/// Fills the sample tables through an admin connection.
pub struct SampleDataGenerator {
    db: Arc<dyn DatabaseClient>,
    state: GenerationState,
    seed: u64,
}

impl SampleDataGenerator {
    pub fn new(db: Arc<dyn DatabaseClient>, state: GenerationState) -> Self {
        Self {
            db,
            state,
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    /// Replaces the sample data with freshly generated rows.
    ///
    /// Fails with a conflict if another generation holds the state cell.
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationReport> {
        request.validate()?;
        let guard = self.state.begin()?;
        let start = Instant::now();
        let mut rng = StdRng::seed_from_u64(self.seed);

        guard.report(0, "Preparing tables...");
        for statement in schema_statements(self.db.backend()) {
            self.db.execute_admin(&statement).await?;
        }

        guard.report(2, "Clearing existing data...");
        for table in SAMPLE_TABLES.iter().rev() {
            self.db
                .execute_admin(&format!("DELETE FROM {}", table.name))
                .await?;
        }
        guard.report(5, "Generating customers...");

        let customers = self
            .insert_rows(&guard, "sample_customers", request.customers, (5, 25), |id| {
                rows::customer(&mut rng, id)
            })
            .await?;

        guard.report(25, "Generating products...");
        let products = self
            .insert_rows(&guard, "sample_products", request.products, (25, 40), |id| {
                rows::product(&mut rng, id)
            })
            .await?;

        guard.report(40, "Generating orders...");
        let orders = self
            .insert_rows(&guard, "sample_orders", request.orders, (40, 70), |id| {
                rows::order(&mut rng, id, request.customers)
            })
            .await?;

        guard.report(70, "Generating order items...");
        let order_items = self.insert_order_items(&guard, &mut rng, &request).await?;

        guard.report(100, "Completed!");
        let report = GenerationReport {
            customers,
            products,
            orders,
            order_items,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(?report, "Sample data generated");
        Ok(report)
    }

    /// Inserts ids `1..=count` built by `render`, advancing progress over `span`.
    async fn insert_rows<F>(
        &self,
        guard: &GenerationGuard,
        table: &str,
        count: u64,
        span: (u8, u8),
        mut render: F,
    ) -> Result<u64>
    where
        F: FnMut(u64) -> String,
    {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        for id in 1..=count {
            batch.push(render(id));
            if batch.len() == BATCH_SIZE || id == count {
                self.flush(table, &mut batch).await?;
                guard.report(span_progress(span, id, count), format!("Generating {table}..."));
            }
        }
        Ok(count)
    }

    async fn insert_order_items(
        &self,
        guard: &GenerationGuard,
        rng: &mut StdRng,
        request: &GenerationRequest,
    ) -> Result<u64> {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        let mut next_id = 0u64;

        for order_id in 1..=request.orders {
            for _ in 0..rows::item_count(rng, request.items_per_order) {
                next_id += 1;
                batch.push(rows::order_item(rng, next_id, order_id, request.products));
            }
            if batch.len() >= BATCH_SIZE || order_id == request.orders {
                self.flush("sample_order_items", &mut batch).await?;
                guard.report(
                    span_progress((70, 100), order_id, request.orders),
                    "Generating order items...",
                );
            }
        }
        Ok(next_id)
    }

    async fn flush(&self, table: &str, batch: &mut Vec<String>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let sql = format!("INSERT INTO {table} VALUES {}", batch.join(", "));
        batch.clear();
        self.db.execute_admin(&sql).await?;
        Ok(())
    }
}

fn span_progress((from, to): (u8, u8), done: u64, total: u64) -> u8 {
    if total == 0 {
        return to;
    }
    let width = u64::from(to - from);
    from + (width * done / total) as u8
}
