
use ephemeral_db::{ContainerSpec, EphemeralDb};
use hermetic_config::EnvironmentConfig;
use sqlx::{PgPool, postgres::PgPoolOptions};

/// A fresh database plus a pool into it. The container is removed on drop.
pub(super) struct TestDb {
    pub pool: PgPool,
    _db: EphemeralDb,
}

impl TestDb {
    pub async fn with_schema(ddl: &str) -> Self {
        monitoring::logging::init();

        let config = EnvironmentConfig::from_env().expect("environment config should load");
        let mut db = EphemeralDb::new(ContainerSpec::from_config(&config.database));
        let info = db.start().await.expect("ephemeral database should start");
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&info.url())
            .await
            .expect("should connect to the ephemeral database");
        sqlx::raw_sql(ddl)
            .execute(&pool)
            .await
            .expect("schema should apply");

        Self { pool, _db: db }
    }

    pub async fn exec(&self, sql: &str) {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .unwrap_or_else(|err| panic!("statement failed: {sql}: {err}"));
    }
}


/// Customers, their orders and notes, products, and order line items.
///
/// `line_items` sits on a diamond (orders and products both reference customers
/// indirectly), `employees` references itself.
pub(super) const SHOP_SCHEMA: &str = indoc::indoc! {r#"
    CREATE TABLE customers (
        id    bigserial PRIMARY KEY,
        login text NOT NULL UNIQUE
    );
    CREATE TABLE products (
        id        bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
        vendor_id bigint NOT NULL REFERENCES customers (id),
        name      text NOT NULL
    );
    CREATE TABLE orders (
        id          bigserial PRIMARY KEY,
        customer_id bigint NOT NULL REFERENCES customers (id)
    );
    CREATE TABLE line_items (
        order_id   bigint NOT NULL REFERENCES orders (id),
        product_id bigint NOT NULL REFERENCES products (id),
        quantity   int NOT NULL
    );
    CREATE TABLE customer_notes (
        id          bigserial PRIMARY KEY,
        customer_id bigint NOT NULL REFERENCES customers (id),
        body        text NOT NULL
    );
    CREATE TABLE employees (
        id         bigserial PRIMARY KEY,
        manager_id bigint REFERENCES employees (id)
    );
"#};

pub(super) const SHOP_SEED: &str = indoc::indoc! {r#"
    INSERT INTO customers (login) VALUES ('alice'), ('bob');
    INSERT INTO products (vendor_id, name) VALUES (2, 'widget');
    INSERT INTO orders (customer_id) VALUES (1), (1);
    INSERT INTO line_items (order_id, product_id, quantity) VALUES (1, 1, 3), (2, 1, 1);
    INSERT INTO customer_notes (customer_id, body) VALUES (1, 'vip');
    INSERT INTO employees (id, manager_id) VALUES (1, NULL), (2, 1);
"#};
