//! SQL execution tool
//!
//! Runs generated queries against the retail store and reports structured
//! results. Execution failures are reported in [`QueryOutcome`], never raised.

use crate::models::QueryOutcome;
use crate::Result;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Static knowledge the SQL generator depends on, appended to live schema text
const DOMAIN_NOTES: &str = r#"

Revenue Calculation: UnitPrice * Quantity * (1 - Discount)
Common Joins:
  - orders JOIN order_items ON orders.OrderID = order_items.OrderID
  - order_items JOIN products ON order_items.ProductID = products.ProductID
  - products JOIN categories ON products.CategoryID = categories.CategoryID (to get CategoryName)
  - orders JOIN customers ON orders.CustomerID = customers.CustomerID

IMPORTANT SQLite Syntax:
  - Use strftime('%Y', OrderDate) for year extraction
  - Use strftime('%m', OrderDate) for month extraction
  - Date filtering: OrderDate >= '1997-01-01' AND OrderDate <= '1997-12-31'
  - NEVER use DATEPART, YEAR() or MONTH() - use strftime() instead
  - CategoryName is in categories table, NOT products - always JOIN categories!"#;

/// Used when the store cannot be introspected
pub const FALLBACK_SCHEMA: &str = r#"
Database Schema (SQLite):

categories (CategoryID, CategoryName, Description)
products (ProductID, ProductName, CategoryID, UnitPrice, UnitsInStock, Discontinued)
customers (CustomerID, CompanyName, ContactName, Country, City, Region)
orders (OrderID, CustomerID, OrderDate, RequiredDate, ShippedDate, ShipCountry, Freight)
order_items (OrderID, ProductID, UnitPrice, Quantity, Discount)

Revenue Calculation: UnitPrice * Quantity * (1 - Discount)
"#;

/// Trait for the relational store boundary
#[async_trait::async_trait]
pub trait QueryTool: Send + Sync {
    /// Human/LLM-readable schema. Always produces text.
    async fn schema(&self) -> String;

    /// Run one query and report the outcome
    async fn execute(&self, query: &str) -> QueryOutcome;
}

/// SQLite-backed query tool
pub struct SqliteTool {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteTool {
    /// Open the database read-only. Connections are established lazily, so an
    /// unavailable file surfaces as execution errors and the fallback schema.
    pub fn open(path: &Path, timeout: Duration) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_lazy_with(options);

        Self { pool, timeout }
    }

    pub fn from_pool(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn introspect(&self) -> Result<String> {
        let tables = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut parts = vec!["Database Schema (SQLite):\n".to_string()];

        for table in tables {
            let name: String = table.try_get("name")?;
            let pragma = format!("PRAGMA table_info(\"{}\")", name.replace('"', "\"\""));
            let columns = sqlx::query(&pragma).fetch_all(&self.pool).await?;

            parts.push(format!("\n{}:", name));
            for column in columns {
                let column_name: String = column.try_get("name")?;
                let column_type: String = column.try_get("type").unwrap_or_default();
                let pk: i64 = column.try_get("pk").unwrap_or(0);
                let pk_marker = if pk > 0 { " (PRIMARY KEY)" } else { "" };
                parts.push(format!("  - {} ({}){}", column_name, column_type, pk_marker));
            }
        }

        let mut schema = parts.join("\n");
        schema.push_str(DOMAIN_NOTES);
        Ok(schema)
    }

    async fn run_query(&self, query: &str) -> Result<(Vec<Map<String, Value>>, Vec<String>)> {
        let rows = sqlx::query(query).fetch_all(&self.pool).await?;

        let columns: Vec<String> = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            // No rows to read names from; ask the driver instead
            None => match (&self.pool).describe(query).await {
                Ok(described) => described.columns().iter().map(|c| c.name().to_string()).collect(),
                Err(_) => Vec::new(),
            },
        };

        let records = rows.iter().map(row_to_record).collect();
        Ok((records, columns))
    }
}

#[async_trait::async_trait]
impl QueryTool for SqliteTool {
    async fn schema(&self) -> String {
        match self.introspect().await {
            Ok(schema) => schema,
            Err(e) => {
                warn!(error = %e, "Schema introspection failed, using fallback schema");
                FALLBACK_SCHEMA.to_string()
            }
        }
    }

    async fn execute(&self, query: &str) -> QueryOutcome {
        if query.trim().is_empty() {
            return QueryOutcome::failure("Empty SQL query");
        }

        match tokio::time::timeout(self.timeout, self.run_query(query)).await {
            Ok(Ok((rows, columns))) => {
                let tables_used = extract_table_names(query);
                debug!(rows = rows.len(), tables = ?tables_used, "SQL executed");
                QueryOutcome::success(rows, columns, tables_used)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "SQL execution failed");
                QueryOutcome::failure(e.to_string())
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "SQL execution timed out");
                QueryOutcome::failure(format!(
                    "Query timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            }
        }
    }
}

/// Map a row to a JSON record using each cell's runtime storage class
fn row_to_record(row: &SqliteRow) -> Map<String, Value> {
    let mut record = Map::with_capacity(row.len());

    for (i, column) in row.columns().iter().enumerate() {
        let value = match row.try_get_raw(i) {
            Ok(raw) if raw.is_null() => Value::Null,
            Ok(raw) => {
                let type_name = raw.type_info().name().to_string();
                decode_cell(row, i, &type_name)
            }
            Err(_) => Value::Null,
        };
        record.insert(column.name().to_string(), value);
    }

    record
}

fn decode_cell(row: &SqliteRow, i: usize, type_name: &str) -> Value {
    match type_name {
        "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(i).map(Value::from).unwrap_or(Value::Null),
        "REAL" | "NUMERIC" => row.try_get::<f64, _>(i).map(Value::from).unwrap_or(Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(i)
            .map(|bytes| Value::String(hex::encode(bytes)))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(i)
            .map(Value::String)
            .or_else(|_| row.try_get::<i64, _>(i).map(Value::from))
            .or_else(|_| row.try_get::<f64, _>(i).map(Value::from))
            .unwrap_or(Value::Null),
    }
}

/// Best-effort lexical scan for tables named after `FROM` / `JOIN`.
///
/// Not a parser: subqueries, CTE names and alias-only references may be
/// over- or under-reported.
pub fn extract_table_names(query: &str) -> Vec<String> {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    let mut tables: Vec<String> = Vec::new();

    for pair in tokens.windows(2) {
        let keyword = pair[0].trim_matches(|c: char| !c.is_alphanumeric());
        if !(keyword.eq_ignore_ascii_case("from") || keyword.eq_ignore_ascii_case("join")) {
            continue;
        }

        // Subquery, not a table
        if pair[1].starts_with('(') {
            continue;
        }

        let candidate = pair[1].trim_matches(|c: char| matches!(c, '(' | ')' | ',' | ';' | '"' | '`' | '[' | ']'));
        if candidate.is_empty() {
            continue;
        }

        let name = canonical_table_name(candidate);
        if !tables.contains(&name) {
            tables.push(name);
        }
    }

    tables
}

/// `order_items` → `Order_Items`, `ORDERS` → `Orders`
pub fn canonical_table_name(raw: &str) -> String {
    raw.to_lowercase()
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("_")
}
