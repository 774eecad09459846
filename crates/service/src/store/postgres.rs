//! `PostgreSQL` implementation of the order store.
//!
//! Queries are built at runtime (`sqlx::query`/`query_as`) to avoid SQLx
//! offline mode cache requirements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use order_cache_core::{Delivery, Item, Order, OrderUid, Payment};
use secrecy::SecretString;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument};

use super::{OrderStore, StoreError, create_pool};

const UPSERT_ORDER: &str = r"
    INSERT INTO orders
        (order_uid, track_number, entry, locale, internal_signature, customer_id,
         delivery_service, shardkey, sm_id, date_created, oof_shard)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (order_uid) DO UPDATE SET
        track_number = EXCLUDED.track_number,
        entry = EXCLUDED.entry,
        locale = EXCLUDED.locale,
        internal_signature = EXCLUDED.internal_signature,
        customer_id = EXCLUDED.customer_id,
        delivery_service = EXCLUDED.delivery_service,
        shardkey = EXCLUDED.shardkey,
        sm_id = EXCLUDED.sm_id,
        date_created = EXCLUDED.date_created,
        oof_shard = EXCLUDED.oof_shard
";

const UPSERT_DELIVERY: &str = r"
    INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (order_uid) DO UPDATE SET
        name = EXCLUDED.name,
        phone = EXCLUDED.phone,
        zip = EXCLUDED.zip,
        city = EXCLUDED.city,
        address = EXCLUDED.address,
        region = EXCLUDED.region,
        email = EXCLUDED.email
";

const UPSERT_PAYMENT: &str = r"
    INSERT INTO payments
        (order_uid, transaction, request_id, currency, provider, amount, payment_dt,
         bank, delivery_cost, goods_total, custom_fee)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (order_uid) DO UPDATE SET
        transaction = EXCLUDED.transaction,
        request_id = EXCLUDED.request_id,
        currency = EXCLUDED.currency,
        provider = EXCLUDED.provider,
        amount = EXCLUDED.amount,
        payment_dt = EXCLUDED.payment_dt,
        bank = EXCLUDED.bank,
        delivery_cost = EXCLUDED.delivery_cost,
        goods_total = EXCLUDED.goods_total,
        custom_fee = EXCLUDED.custom_fee
";

const DELETE_STALE_ITEMS: &str = r"
    DELETE FROM items
    WHERE order_uid = $1 AND NOT (chrt_id = ANY($2))
";

const UPSERT_ITEM: &str = r"
    INSERT INTO items
        (order_uid, chrt_id, track_number, price, rid, name, sale, size,
         total_price, nm_id, brand, status)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    ON CONFLICT (order_uid, chrt_id) DO UPDATE SET
        track_number = EXCLUDED.track_number,
        price = EXCLUDED.price,
        rid = EXCLUDED.rid,
        name = EXCLUDED.name,
        sale = EXCLUDED.sale,
        size = EXCLUDED.size,
        total_price = EXCLUDED.total_price,
        nm_id = EXCLUDED.nm_id,
        brand = EXCLUDED.brand,
        status = EXCLUDED.status
";

const SELECT_ORDERS: &str = r"
    SELECT order_uid, track_number, entry, locale, internal_signature, customer_id,
           delivery_service, shardkey, sm_id, date_created, oof_shard
    FROM orders
    ORDER BY order_uid
";

const SELECT_ORDER_BY_ID: &str = r"
    SELECT order_uid, track_number, entry, locale, internal_signature, customer_id,
           delivery_service, shardkey, sm_id, date_created, oof_shard
    FROM orders
    WHERE order_uid = $1
";

const SELECT_DELIVERY: &str = r"
    SELECT name, phone, zip, city, address, region, email
    FROM deliveries
    WHERE order_uid = $1
";

const SELECT_PAYMENT: &str = r"
    SELECT transaction, request_id, currency, provider, amount, payment_dt, bank,
           delivery_cost, goods_total, custom_fee
    FROM payments
    WHERE order_uid = $1
";

const SELECT_ITEMS: &str = r"
    SELECT chrt_id, track_number, price, rid, name, sale, size, total_price, nm_id,
           brand, status
    FROM items
    WHERE order_uid = $1
    ORDER BY chrt_id
";

/// Order store backed by a `PostgreSQL` pool.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

/// Internal row type for the `orders` table.
///
/// `order_uid` is read as a plain string so a bad identifier surfaces as
/// data corruption for that row instead of a decode failure for the query.
#[derive(sqlx::FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i32,
    date_created: DateTime<Utc>,
    oof_shard: String,
}

impl OrderRow {
    fn into_order(
        self,
        order_uid: OrderUid,
        delivery: Delivery,
        payment: Payment,
        items: Vec<Item>,
    ) -> Order {
        Order {
            order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery,
            payment,
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

impl PgOrderStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the pool and wrap it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the database cannot be reached.
    pub async fn connect(database_url: &SecretString) -> Result<Self, StoreError> {
        Ok(Self::new(create_pool(database_url).await?))
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Load the delivery, payment, and items owned by `row` and build the order.
///
/// A missing delivery or payment row fails the whole load.
async fn assemble(conn: &mut PgConnection, row: OrderRow) -> Result<Order, StoreError> {
    let order_uid = OrderUid::try_from(row.order_uid.clone()).map_err(|e| {
        StoreError::DataCorruption(format!("invalid order_uid {:?}: {e}", row.order_uid))
    })?;

    let delivery = sqlx::query_as::<_, Delivery>(SELECT_DELIVERY)
        .bind(&order_uid)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::Incomplete {
            order_uid: order_uid.to_string(),
            missing: "delivery",
        })?;

    let payment = sqlx::query_as::<_, Payment>(SELECT_PAYMENT)
        .bind(&order_uid)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::Incomplete {
            order_uid: order_uid.to_string(),
            missing: "payment",
        })?;

    let items = sqlx::query_as::<_, Item>(SELECT_ITEMS)
        .bind(&order_uid)
        .fetch_all(&mut *conn)
        .await?;

    Ok(row.into_order(order_uid, delivery, payment, items))
}

#[async_trait]
impl OrderStore for PgOrderStore {
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid, items = order.items.len()))]
    async fn upsert(&self, order: &Order) -> Result<(), StoreError> {
        // Dropping `tx` on any early return rolls the whole aggregate back.
        let mut tx = self.pool.begin().await?;

        sqlx::query(UPSERT_ORDER)
            .bind(&order.order_uid)
            .bind(&order.track_number)
            .bind(&order.entry)
            .bind(&order.locale)
            .bind(&order.internal_signature)
            .bind(&order.customer_id)
            .bind(&order.delivery_service)
            .bind(&order.shardkey)
            .bind(order.sm_id)
            .bind(order.date_created)
            .bind(&order.oof_shard)
            .execute(&mut *tx)
            .await?;

        let delivery = &order.delivery;
        sqlx::query(UPSERT_DELIVERY)
            .bind(&order.order_uid)
            .bind(&delivery.name)
            .bind(&delivery.phone)
            .bind(&delivery.zip)
            .bind(&delivery.city)
            .bind(&delivery.address)
            .bind(&delivery.region)
            .bind(&delivery.email)
            .execute(&mut *tx)
            .await?;

        let payment = &order.payment;
        sqlx::query(UPSERT_PAYMENT)
            .bind(&order.order_uid)
            .bind(&payment.transaction)
            .bind(&payment.request_id)
            .bind(&payment.currency)
            .bind(&payment.provider)
            .bind(payment.amount)
            .bind(payment.payment_dt)
            .bind(&payment.bank)
            .bind(payment.delivery_cost)
            .bind(payment.goods_total)
            .bind(payment.custom_fee)
            .execute(&mut *tx)
            .await?;

        let removed = sqlx::query(DELETE_STALE_ITEMS)
            .bind(&order.order_uid)
            .bind(order.chrt_ids())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for item in &order.items {
            sqlx::query(UPSERT_ITEM)
                .bind(&order.order_uid)
                .bind(item.chrt_id)
                .bind(&item.track_number)
                .bind(item.price)
                .bind(&item.rid)
                .bind(&item.name)
                .bind(item.sale)
                .bind(&item.size)
                .bind(item.total_price)
                .bind(item.nm_id)
                .bind(&item.brand)
                .bind(item.status)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(removed_items = removed, "Upserted order");
        Ok(())
    }

    fn load_all(&self) -> BoxStream<'_, Result<Order, StoreError>> {
        // Child rows are read on a second pooled connection while the cursor
        // over `orders` stays open on the first.
        Box::pin(async_stream::stream! {
            match self.pool.acquire().await {
                Err(e) => {
                    yield Err(StoreError::Database(e));
                }
                Ok(mut conn) => {
                    let mut rows = sqlx::query_as::<_, OrderRow>(SELECT_ORDERS).fetch(&self.pool);
                    while let Some(row) = rows.next().await {
                        match row {
                            Ok(row) => {
                                let result = assemble(&mut conn, row).await;
                                let fatal = matches!(&result, Err(e) if !e.is_row_level());
                                yield result;
                                if fatal {
                                    break;
                                }
                            }
                            Err(sqlx::Error::ColumnDecode { index, source }) => {
                                yield Err(StoreError::DataCorruption(format!(
                                    "undecodable column {index} in orders: {source}"
                                )));
                            }
                            Err(e) => {
                                yield Err(StoreError::Database(e));
                                break;
                            }
                        }
                    }
                }
            }
        })
    }

    #[instrument(skip(self), fields(order_uid = %order_uid))]
    async fn load_by_id(&self, order_uid: &OrderUid) -> Result<Option<Order>, StoreError> {
        // One snapshot for all four tables, so a concurrent upsert can never
        // produce an order mixing two versions.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, OrderRow>(SELECT_ORDER_BY_ID)
            .bind(order_uid)
            .fetch_optional(&mut *tx)
            .await?;

        let order = match row {
            Some(row) => Some(assemble(&mut tx, row).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(order)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
