//! SQL for customers and their notes

use sqlx::{Executor, Postgres};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub id: i64,
    pub login: String,
    pub github_id: Option<i64>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct Note {
    pub id: i64,
    pub customer_id: i64,
    pub body: String,
}

/// Insert a customer, returning the stored row
pub async fn insert_customer<'c, E>(
    exe: E,
    login: &str,
    github_id: Option<i64>,
    name: Option<&str>,
) -> Result<Customer, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        INSERT INTO customers (login, github_id, name)
        VALUES ($1, $2, $3)
        RETURNING id, login, github_id, name
    "#};
    sqlx::query_as(query)
        .bind(login)
        .bind(github_id)
        .bind(name)
        .fetch_one(exe)
        .await
}

pub async fn get_customer<'c, E>(exe: E, id: i64) -> Result<Option<Customer>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT id, login, github_id, name
        FROM customers
        WHERE id = $1
    "#};
    sqlx::query_as(query).bind(id).fetch_optional(exe).await
}

/// Insert a note for an existing customer
///
/// Returns `None` when the customer does not exist.
pub async fn insert_note<'c, E>(
    exe: E,
    customer_id: i64,
    body: &str,
) -> Result<Option<Note>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        INSERT INTO customer_notes (customer_id, body)
        SELECT id, $2 FROM customers WHERE id = $1
        RETURNING id, customer_id, body
    "#};
    sqlx::query_as(query)
        .bind(customer_id)
        .bind(body)
        .fetch_optional(exe)
        .await
}

/// All notes of a customer, oldest first
pub async fn list_notes<'c, E>(exe: E, customer_id: i64) -> Result<Vec<Note>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT id, customer_id, body
        FROM customer_notes
        WHERE customer_id = $1
        ORDER BY id
    "#};
    sqlx::query_as(query).bind(customer_id).fetch_all(exe).await
}

/// Whether the error is a unique constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}
