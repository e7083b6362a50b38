//! Reference workloads over the transactional interface
//!
//! Business work is a closure over a transaction handle; the coordinator
//! owns begin, commit and the retry loop. Bodies here are idempotent
//! under replay and perform no external side effects, which is exactly
//! what the retry contract requires of every consumer.
//!
//! Journal and order rows use the transaction timestamp as their primary
//! key: each incarnation of a restarted body gets a fresh timestamp, so
//! replays never collide with their own earlier (discarded) attempt.

use crate::coordinator::{Coordinator, Tx, FINANCIAL, INVENTORY};
use crate::error::{Error, Result};
use crate::types::value::Value;
use rust_decimal::Decimal;
use std::cmp::Ordering;

fn balance_after(tx: &mut Tx, account: &Value, delta: Decimal) -> Result<Vec<Value>> {
    let row = tx
        .read(FINANCIAL, "accounts", account)?
        .ok_or_else(|| Error::RowNotFound {
            table: "accounts".into(),
            key: account.clone(),
        })?;
    let schema = tx.schema(FINANCIAL, "accounts")?;
    let idx = schema.column_index("balance")?;
    let balance = row[idx].add(&Value::Decimal(delta))?;
    if balance.compare(&Value::Decimal(Decimal::ZERO))? == Ordering::Less {
        return Err(Error::InsufficientFunds {
            account: account.clone(),
        });
    }
    let mut updated = row;
    updated[idx] = balance;
    Ok(updated)
}

fn journal_row(tx: &Tx, account_id: i64, kind: &str, amount: Decimal) -> Vec<Value> {
    vec![
        Value::Integer(tx.ts() as i64),
        Value::Integer(account_id),
        Value::String(kind.into()),
        Value::Decimal(amount),
        Value::Timestamp(tx.ts()),
    ]
}

/// Move `amount` between two accounts and journal the movement.
pub fn transfer_funds(
    coordinator: &Coordinator,
    from_account: i64,
    to_account: i64,
    amount: Decimal,
) -> Result<()> {
    let from_key = Value::Integer(from_account);
    let to_key = Value::Integer(to_account);
    coordinator.run(|tx| {
        let from_row = balance_after(tx, &from_key, -amount)?;
        let to_row = balance_after(tx, &to_key, amount)?;
        tx.update(FINANCIAL, "accounts", &from_key, from_row)?;
        tx.update(FINANCIAL, "accounts", &to_key, to_row)?;
        tx.insert(
            FINANCIAL,
            "transactions",
            journal_row(tx, from_account, "transfer", amount),
        )?;
        Ok(())
    })
}

/// Credit an account.
pub fn deposit(coordinator: &Coordinator, account: i64, amount: Decimal) -> Result<()> {
    let key = Value::Integer(account);
    coordinator.run(|tx| {
        let row = balance_after(tx, &key, amount)?;
        tx.update(FINANCIAL, "accounts", &key, row)?;
        tx.insert(
            FINANCIAL,
            "transactions",
            journal_row(tx, account, "deposit", amount),
        )?;
        Ok(())
    })
}

/// Debit an account; fails on insufficient funds.
pub fn withdraw(coordinator: &Coordinator, account: i64, amount: Decimal) -> Result<()> {
    let key = Value::Integer(account);
    coordinator.run(|tx| {
        let row = balance_after(tx, &key, -amount)?;
        tx.update(FINANCIAL, "accounts", &key, row)?;
        tx.insert(
            FINANCIAL,
            "transactions",
            journal_row(tx, account, "withdrawal", amount),
        )?;
        Ok(())
    })
}

/// Place an order across both stores: order and line items in
/// `inventory`, stock decrements per product, and the account debit plus
/// journal row in `financial`. Returns the order id.
pub fn place_order(
    coordinator: &Coordinator,
    user_id: i64,
    items: &[(i64, i64)],
) -> Result<i64> {
    coordinator.run(|tx| {
        let products = tx.schema(INVENTORY, "products")?;
        let price_idx = products.column_index("price")?;
        let stock_idx = products.column_index("stock")?;

        let order_id = tx.ts() as i64;
        let mut total = Decimal::ZERO;

        for (line, (product_id, qty)) in items.iter().enumerate() {
            let product_key = Value::Integer(*product_id);
            let mut product = tx
                .read(INVENTORY, "products", &product_key)?
                .ok_or_else(|| Error::RowNotFound {
                    table: "products".into(),
                    key: product_key.clone(),
                })?;
            let stock = product[stock_idx].as_integer().unwrap_or(0);
            if stock < *qty {
                return Err(Error::InsufficientStock {
                    product: product_key,
                });
            }
            let unit_price = product[price_idx].as_decimal().unwrap_or(Decimal::ZERO);
            total += unit_price * Decimal::from(*qty);

            product[stock_idx] = Value::Integer(stock - qty);
            tx.update(INVENTORY, "products", &product_key, product)?;

            tx.insert(
                INVENTORY,
                "order_items",
                vec![
                    Value::Integer(order_id * 1000 + line as i64),
                    Value::Integer(order_id),
                    Value::Integer(*product_id),
                    Value::Integer(*qty),
                    Value::Decimal(unit_price),
                ],
            )?;
        }

        // Debit the buyer's account in the financial store.
        let accounts = tx.scan_index(FINANCIAL, "accounts", "user_id", &Value::Integer(user_id))?;
        let account = accounts.first().ok_or_else(|| Error::RowNotFound {
            table: "accounts".into(),
            key: Value::Integer(user_id),
        })?;
        let account_key = account[0].clone();
        let account_id = account_key.as_integer().unwrap_or(0);
        let debited = balance_after(tx, &account_key, -total)?;
        tx.update(FINANCIAL, "accounts", &account_key, debited)?;
        tx.insert(
            FINANCIAL,
            "transactions",
            journal_row(tx, account_id, "purchase", total),
        )?;

        tx.insert(
            INVENTORY,
            "orders",
            vec![
                Value::Integer(order_id),
                Value::Integer(user_id),
                Value::String("placed".into()),
                Value::Decimal(total),
                Value::Timestamp(tx.ts()),
            ],
        )?;
        Ok(order_id)
    })
}
