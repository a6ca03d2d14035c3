//! Basic mapper usage example
//!
//! This example demonstrates basic mapper operations including:
//! - Registering record types as tables
//! - Creating tables from the mappings
//! - Inserting, updating and deleting records
//! - Loading records by key and by query
//! - Tracing generated statements
//!
//! Run with: cargo run --example basic_usage

use rust_dbmap::prelude::*;
use std::sync::Arc;

#[derive(Debug, Default)]
struct User {
    id: i64,
    username: String,
    email: String,
    age: Option<i32>,
    balance: f64,
    is_active: bool,
    version: i64,
}

impl_record!(User {
    id: i64,
    username: String,
    email: String,
    age: Option<i32>,
    balance: f64,
    is_active: bool,
    version: i64,
});

fn user(username: &str, age: Option<i32>, balance: f64) -> User {
    User {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        age,
        balance,
        is_active: true,
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Rust DbMap - Basic Usage Example ===\n");

    let ctx = Context::background();

    // Connect to an in-memory SQLite database
    println!("1. Connecting to database...");
    let conn = SqliteDatabase::connect(":memory:").await?;
    let mut dbmap = DbMap::new(Box::new(conn), Box::new(SqliteDialect));
    println!("   ✓ Connected\n");

    // Register the record type and configure its columns
    println!("2. Registering tables...");
    let users = dbmap.add_table_with_name::<User, _>("users");
    users.set_keys(true, &["id"]);
    users.col_map("username").set_max_size(32).set_unique(true);
    users.col_map("email").set_max_size(64);

    let table = dbmap
        .table_for::<User>()
        .ok_or_else(|| DatabaseError::configuration("users is not registered"))?;
    println!("   {}", dbmap.create_table_sql(table, true));
    dbmap.create_tables_if_not_exists(&ctx).await?;
    println!("   ✓ Tables created\n");

    dbmap.trace_on("   [sql] ", Arc::new(WriterSink::new(std::io::stdout())));

    // Insert records; generated keys and versions are written back
    println!("3. Inserting records...");
    let mut alice = user("alice", Some(30), 1500.50);
    let mut bob = user("bob", Some(25), 2300.75);
    let mut charlie = user("charlie", None, 980.25);
    dbmap
        .insert(&ctx, &mut [&mut alice, &mut bob, &mut charlie])
        .await?;
    println!("   ✓ alice id={} version={}\n", alice.id, alice.version);

    // Update a record
    println!("4. Updating a record...");
    bob.balance += 100.0;
    let rows = dbmap.update(&ctx, &mut [&mut bob]).await?;
    println!("   ✓ {} row(s) updated, bob is now at version {}\n", rows, bob.version);

    // Load by primary key
    println!("5. Loading by key...");
    let loaded: User = dbmap.get(&ctx, &[bob.id.into()]).await?;
    println!("   ✓ {:?}\n", loaded);

    // Query into records
    println!("6. Querying...");
    let rich: Vec<User> = dbmap
        .select(
            &ctx,
            "select * from users where balance > ? order by balance desc",
            &[1000.0.into()],
        )
        .await?;
    for u in &rich {
        let age = u.age.map_or_else(|| "?".to_string(), |a| a.to_string());
        println!("   {} ({}): {:.2}", u.username, age, u.balance);
    }
    println!();

    // Values longer than the configured size are rejected before reaching the database
    println!("7. Validating column sizes...");
    let mut long = user(&"x".repeat(40), None, 0.0);
    match dbmap.insert(&ctx, &mut [&mut long]).await {
        Err(e) => println!("   ✓ Rejected: {}\n", e),
        Ok(()) => println!("   ✗ Unexpectedly accepted\n"),
    }

    // Delete
    println!("8. Deleting...");
    let rows = dbmap.delete(&ctx, &mut [&mut charlie]).await?;
    println!("   ✓ {} row(s) deleted\n", rows);

    dbmap.trace_off();
    dbmap.drop_tables(&ctx).await?;
    dbmap.close().await?;

    println!("=== Example completed successfully ===");
    Ok(())
}
