//! Transaction example
//!
//! This example demonstrates transactions and concurrency control including:
//! - Beginning transactions
//! - Committing changes
//! - Rolling back on errors
//! - Lifecycle hooks that run inside the transaction
//! - Optimistic locking with a version column
//!
//! Run with: cargo run --example transactions

use async_trait::async_trait;
use rust_dbmap::prelude::*;
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
struct Account {
    id: i64,
    name: String,
    balance: f64,
    version: i64,
}

impl_record!(Account with hooks {
    id: i64,
    name: String,
    balance: f64,
    version: i64,
});

#[async_trait]
impl Hooks for Account {
    async fn pre_update(&mut self, _ctx: &Context, _exec: &dyn SqlExecutor) -> Result<()> {
        if self.balance < 0.0 {
            return Err(DatabaseError::hook(format!(
                "insufficient funds in account {}",
                self.name
            )));
        }
        Ok(())
    }

    async fn post_update(&mut self, ctx: &Context, exec: &dyn SqlExecutor) -> Result<()> {
        exec.execute(
            ctx,
            "insert into audit (account_id, balance) values (?, ?)",
            &[self.id.into(), self.balance.into()],
        )
        .await?;
        Ok(())
    }
}

async fn transfer(
    ctx: &Context,
    dbmap: &DbMap,
    from: &mut Account,
    to: &mut Account,
    amount: f64,
) -> Result<()> {
    let tx = dbmap.begin(ctx).await?;
    from.balance -= amount;
    to.balance += amount;

    match tx.update(ctx, &mut [from, to]).await {
        Ok(_) => tx.commit().await,
        Err(e) => {
            tx.rollback().await?;
            Err(e)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Rust DbMap - Transaction Example ===\n");

    let ctx = Context::background();
    let conn = SqliteDatabase::connect(":memory:").await?;
    let mut dbmap = DbMap::new(Box::new(conn), Box::new(SqliteDialect));
    dbmap.trace_on("", Arc::new(LogSink));

    // Create accounts table
    println!("1. Setting up accounts table...");
    dbmap.add_table::<Account>().set_keys(true, &["id"]);
    dbmap.create_tables(&ctx).await?;
    dbmap
        .exec(
            &ctx,
            "create table audit (account_id integer not null, balance real not null)",
            &[],
        )
        .await?;

    let mut alice = Account {
        name: "Alice".to_string(),
        balance: 1000.0,
        ..Default::default()
    };
    let mut bob = Account {
        name: "Bob".to_string(),
        balance: 500.0,
        ..Default::default()
    };
    dbmap.insert(&ctx, &mut [&mut alice, &mut bob]).await?;
    println!("   ✓ Alice: {:.2}, Bob: {:.2}\n", alice.balance, bob.balance);

    // Successful transfer
    println!("2. Transferring 200 from Alice to Bob...");
    transfer(&ctx, &dbmap, &mut alice, &mut bob, 200.0).await?;
    println!("   ✓ Alice: {:.2}, Bob: {:.2}\n", alice.balance, bob.balance);

    // Failing transfer is rolled back
    println!("3. Transferring 5000 from Bob to Alice...");
    let mut bob_attempt = bob.clone();
    let mut alice_attempt = alice.clone();
    match transfer(&ctx, &dbmap, &mut bob_attempt, &mut alice_attempt, 5000.0).await {
        Ok(()) => println!("   ✗ Transfer unexpectedly succeeded\n"),
        Err(e) => println!("   ✓ Rolled back: {}\n", e),
    }
    let stored: Account = dbmap.get(&ctx, &[bob.id.into()]).await?;
    println!("   Bob still has {:.2}\n", stored.balance);

    // Concurrent modification is detected through the version column
    println!("4. Detecting a stale update...");
    let mut stale = alice.clone();
    alice.balance += 1.0;
    dbmap.update(&ctx, &mut [&mut alice]).await?;
    stale.balance += 2.0;
    match dbmap.update(&ctx, &mut [&mut stale]).await {
        Err(e) if e.is_optimistic_lock() => {
            println!("   ✓ Stale copy rejected ({} rows): {}\n", e.rows_affected().unwrap_or(0), e)
        }
        other => println!("   ✗ Unexpected result: {:?}\n", other),
    }

    let audit = dbmap
        .connection()
        .fetch_all(&ctx, "select * from audit", &[])
        .await?;
    println!("5. Audit trail has {} entries", audit.len());

    println!("\n=== Example completed successfully ===");
    Ok(())
}
