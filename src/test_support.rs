//! Fixtures shared by unit tests: a small Northwind-style store and corpus

use crate::retrieval::DocumentIndex;
use crate::tools::SqliteTool;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;

const FIXTURE_DDL: &[&str] = &[
    "CREATE TABLE categories (CategoryID INTEGER PRIMARY KEY, CategoryName TEXT NOT NULL, Description TEXT)",
    "CREATE TABLE products (ProductID INTEGER PRIMARY KEY, ProductName TEXT NOT NULL, CategoryID INTEGER, UnitPrice REAL, UnitsInStock INTEGER, Discontinued INTEGER)",
    "CREATE TABLE customers (CustomerID TEXT PRIMARY KEY, CompanyName TEXT NOT NULL, ContactName TEXT, Country TEXT, City TEXT, Region TEXT)",
    "CREATE TABLE orders (OrderID INTEGER PRIMARY KEY, CustomerID TEXT, OrderDate TEXT, RequiredDate TEXT, ShippedDate TEXT, ShipCountry TEXT, Freight REAL)",
    "CREATE TABLE order_items (OrderID INTEGER, ProductID INTEGER, UnitPrice REAL, Quantity INTEGER, Discount REAL, PRIMARY KEY (OrderID, ProductID))",
];

const FIXTURE_ROWS: &[&str] = &[
    "INSERT INTO categories VALUES (1, 'Beverages', 'Soft drinks, coffees, teas'), (2, 'Dairy Products', 'Cheeses')",
    "INSERT INTO products VALUES (1, 'Chai', 1, 18, 39, 0), (2, 'Chang', 1, 19, 17, 0), (3, 'Gorgonzola', 2, 12.5, 0, 0)",
    "INSERT INTO customers VALUES ('ALFKI', 'Alfreds Futterkiste', 'Maria Anders', 'Germany', 'Berlin', NULL), ('BONAP', 'Bon app''', 'Laurence Lebihan', 'France', 'Marseille', NULL)",
    "INSERT INTO orders VALUES \
        (10248, 'ALFKI', '1996-07-04', '1996-08-01', '1996-07-16', 'Germany', 32.38), \
        (10400, 'ALFKI', '1997-01-15', '1997-02-12', '1997-01-20', 'Germany', 83.93), \
        (10550, 'BONAP', '1997-06-10', '1997-07-08', '1997-06-15', 'France', 4.32), \
        (10800, 'BONAP', '1997-12-20', '1998-01-17', '1997-12-28', 'France', 137.44), \
        (10900, 'ALFKI', '1998-02-01', '1998-03-01', '1998-02-10', 'Germany', 1.66)",
    "INSERT INTO order_items VALUES \
        (10248, 1, 18, 10, 0), \
        (10400, 2, 19, 20, 0.1), \
        (10550, 1, 18, 5, 0), \
        (10550, 3, 12.5, 4, 0), \
        (10800, 3, 12.5, 8, 0.05), \
        (10900, 2, 19, 2, 0)",
];

/// One-connection in-memory pool, so every query sees the same database
pub async fn fixture_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");

    for statement in FIXTURE_DDL.iter().chain(FIXTURE_ROWS) {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("fixture statement");
    }

    pool
}

pub async fn fixture_tool() -> SqliteTool {
    SqliteTool::from_pool(fixture_pool().await, Duration::from_secs(5))
}

pub fn fixture_documents() -> Vec<(String, String)> {
    vec![
        (
            "product_policy.md".to_string(),
            "# Returns & Policy\n\nBeverages unopened: 14 days return window.\n\nPerishables (Dairy, Seafood): 3-7 days return window.".to_string(),
        ),
        (
            "marketing_calendar.md".to_string(),
            "# Marketing Calendar (1997)\n\nSummer Beverages 1997: dates 1997-06-01 to 1997-06-30.\n\nWinter Classics 1997: dates 1997-12-01 to 1997-12-31.".to_string(),
        ),
        (
            "kpi_definitions.md".to_string(),
            "# KPI Definitions\n\nAverage Order Value (AOV) = SUM(UnitPrice * Quantity * (1 - Discount)) / COUNT(DISTINCT OrderID).".to_string(),
        ),
    ]
}

pub fn fixture_index() -> DocumentIndex {
    DocumentIndex::from_documents(fixture_documents())
}
