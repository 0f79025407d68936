use tracing::debug;

use crate::config::MAX_BUCKETS;
use crate::db::models::BucketRow;
use crate::error::Result;
use crate::types::{AggregateBucket, Granularity};

/// Offers counted as failed / successful. The denominator of the success
/// percentage is the union of the two; offers still in flight (created,
/// reserved) are not counted against either side.
const FAILED_STATUSES: &str = "('expired', 'cancelled')";
const SUCCESS_STATUS: &str = "'takerPaid'";
const SETTLED_STATUSES: &str = "('expired', 'cancelled', 'takerPaid')";

/// Build the aggregation SQL for one granularity. Bucket and label
/// expressions come from the `Granularity` enum — the only caller-controlled
/// input is the variant choice, never a query fragment.
///
/// The inner query takes the most recent `MAX_BUCKETS` buckets (DESC LIMIT);
/// the outer select flips them back to ascending order.
fn build_query(granularity: Granularity) -> String {
    let bucket = granularity.bucket_expr();
    let label = granularity.label_format();
    format!(
        r#"
        SELECT date, success_percentage, failed, success, profit, volume, volume_sats,
               avg_reserved_seconds, avg_total_seconds
        FROM (
            SELECT
                {bucket} AS bucket_start,
                strftime('{label}', {bucket}) AS date,
                ROUND(
                    100.0 - CAST(COUNT(*) FILTER (WHERE status IN {FAILED_STATUSES}) AS REAL)
                        / NULLIF(COUNT(*) FILTER (WHERE status IN {SETTLED_STATUSES}), 0)
                        * 100.0,
                    2
                ) AS success_percentage,
                COUNT(*) FILTER (WHERE status IN {FAILED_STATUSES}) AS failed,
                COUNT(*) FILTER (WHERE status = {SUCCESS_STATUS}) AS success,
                SUM(maker_fees + taker_fees - taker_invoice_fees)
                    FILTER (WHERE status = {SUCCESS_STATUS}) AS profit,
                SUM(fiat_amount) FILTER (WHERE status = {SUCCESS_STATUS}) AS volume,
                SUM(amount_sats) FILTER (WHERE status = {SUCCESS_STATUS}) AS volume_sats,
                AVG(strftime('%s', reserved_at) - strftime('%s', created_at))
                    FILTER (WHERE status = {SUCCESS_STATUS}) AS avg_reserved_seconds,
                AVG(strftime('%s', taker_paid_at) - strftime('%s', created_at))
                    FILTER (WHERE status = {SUCCESS_STATUS}) AS avg_total_seconds
            FROM offers
            GROUP BY bucket_start
            ORDER BY bucket_start DESC
            LIMIT ?
        )
        ORDER BY bucket_start ASC
        "#
    )
}

/// Run the aggregation for one granularity. Returns the most recent 90
/// buckets in ascending time order; buckets with no offers are absent.
pub async fn fetch_offer_stats(
    pool: &sqlx::SqlitePool,
    granularity: Granularity,
) -> Result<Vec<AggregateBucket>> {
    let sql = build_query(granularity);
    let rows = sqlx::query_as::<_, BucketRow>(&sql)
        .bind(MAX_BUCKETS)
        .fetch_all(pool)
        .await?;

    debug!(
        granularity = %granularity,
        buckets = rows.len(),
        "offer aggregation complete"
    );

    Ok(rows.into_iter().map(to_bucket).collect())
}

/// Explicit defaults at the aggregation boundary: empty SUMs come back NULL
/// from SQLite and must surface as 0, never as NULL or NaN. The success
/// percentage and the per-offer averages stay None when undefined.
fn to_bucket(r: BucketRow) -> AggregateBucket {
    AggregateBucket {
        date: r.date,
        success_percentage: r.success_percentage,
        failed: r.failed,
        success: r.success,
        profit: r.profit.unwrap_or(0),
        volume: r.volume.unwrap_or(0.0),
        volume_sats: r.volume_sats.unwrap_or(0),
        avg_reserved_seconds: r.avg_reserved_seconds,
        avg_total_seconds: r.avg_total_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> sqlx::SqlitePool {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations");
        pool
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_offer(
        pool: &sqlx::SqlitePool,
        status: &str,
        created_at: &str,
        reserved_at: Option<&str>,
        taker_paid_at: Option<&str>,
        fiat_amount: f64,
        amount_sats: i64,
        maker_fees: i64,
        taker_fees: i64,
        taker_invoice_fees: i64,
    ) {
        sqlx::query(
            r#"
            INSERT INTO offers (status, created_at, reserved_at, taker_paid_at,
                                fiat_amount, amount_sats, maker_fees, taker_fees, taker_invoice_fees)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(status)
        .bind(created_at)
        .bind(reserved_at)
        .bind(taker_paid_at)
        .bind(fiat_amount)
        .bind(amount_sats)
        .bind(maker_fees)
        .bind(taker_fees)
        .bind(taker_invoice_fees)
        .execute(pool)
        .await
        .expect("insert offer");
    }

    /// A paid offer with fixed fees and timings, created at the given time.
    async fn paid_offer(pool: &sqlx::SqlitePool, created_at: &str) {
        insert_offer(
            pool,
            "takerPaid",
            created_at,
            Some(created_at),
            Some(created_at),
            100.0,
            250_000,
            300,
            200,
            50,
        )
        .await;
    }

    #[tokio::test]
    async fn success_percentage_matches_formula() {
        let pool = test_pool().await;
        // 1 success + 1 failed + 1 in-flight on the same day
        insert_offer(&pool, "takerPaid", "2024-03-10 12:00:00", None, None, 500.0, 1_000_000, 100, 100, 30).await;
        insert_offer(&pool, "expired", "2024-03-10 13:00:00", None, None, 0.0, 0, 0, 0, 0).await;
        insert_offer(&pool, "created", "2024-03-10 14:00:00", None, None, 0.0, 0, 0, 0, 0).await;

        let rows = fetch_offer_stats(&pool, Granularity::Daily).await.unwrap();
        assert_eq!(rows.len(), 1);
        let b = &rows[0];
        assert_eq!(b.date, "2024-03-10");
        // 100 - 1/(1+1)*100 = 50.00; the in-flight offer is not in the denominator
        assert_eq!(b.success_percentage, Some(50.0));
        assert_eq!(b.failed, 1);
        assert_eq!(b.success, 1);
    }

    #[tokio::test]
    async fn zero_denominator_yields_none_not_zero() {
        let pool = test_pool().await;
        insert_offer(&pool, "created", "2024-03-10 12:00:00", None, None, 0.0, 0, 0, 0, 0).await;
        insert_offer(&pool, "reserved", "2024-03-10 13:00:00", None, None, 0.0, 0, 0, 0, 0).await;

        let rows = fetch_offer_stats(&pool, Granularity::Daily).await.unwrap();
        assert_eq!(rows.len(), 1);
        let b = &rows[0];
        assert_eq!(b.success_percentage, None);
        assert_eq!(b.failed, 0);
        assert_eq!(b.success, 0);
        // Empty SUMs surface as explicit zeros
        assert_eq!(b.profit, 0);
        assert_eq!(b.volume, 0.0);
        assert_eq!(b.volume_sats, 0);
        assert_eq!(b.avg_reserved_seconds, None);
    }

    #[tokio::test]
    async fn profit_and_volume_sum_only_successful_offers() {
        let pool = test_pool().await;
        // profit per offer = maker + taker - taker_invoice
        insert_offer(&pool, "takerPaid", "2024-03-10 10:00:00", None, None, 200.0, 400_000, 100, 50, 20).await;
        insert_offer(&pool, "takerPaid", "2024-03-10 11:00:00", None, None, 300.0, 600_000, 200, 80, 40).await;
        // Failed offer's fees must not count
        insert_offer(&pool, "cancelled", "2024-03-10 12:00:00", None, None, 999.0, 999_999, 500, 500, 0).await;

        let rows = fetch_offer_stats(&pool, Granularity::Daily).await.unwrap();
        assert_eq!(rows.len(), 1);
        let b = &rows[0];
        assert_eq!(b.profit, (100 + 50 - 20) + (200 + 80 - 40));
        assert_eq!(b.volume, 500.0);
        assert_eq!(b.volume_sats, 1_000_000);
    }

    #[tokio::test]
    async fn average_timings_are_in_seconds() {
        let pool = test_pool().await;
        insert_offer(
            &pool,
            "takerPaid",
            "2024-03-10 10:00:00",
            Some("2024-03-10 10:01:00"),
            Some("2024-03-10 10:05:00"),
            100.0,
            100_000,
            10,
            10,
            5,
        )
        .await;
        insert_offer(
            &pool,
            "takerPaid",
            "2024-03-10 11:00:00",
            Some("2024-03-10 11:03:00"),
            Some("2024-03-10 11:15:00"),
            100.0,
            100_000,
            10,
            10,
            5,
        )
        .await;

        let rows = fetch_offer_stats(&pool, Granularity::Daily).await.unwrap();
        let b = &rows[0];
        // (60 + 180) / 2 and (300 + 900) / 2
        assert_eq!(b.avg_reserved_seconds, Some(120.0));
        assert_eq!(b.avg_total_seconds, Some(600.0));
    }

    #[tokio::test]
    async fn weekly_buckets_use_iso_weeks() {
        let pool = test_pool().await;
        // 2024-01-01 is a Monday and 2024-01-07 the following Sunday —
        // both belong to ISO week 2024-W01.
        paid_offer(&pool, "2024-01-01 09:00:00").await;
        paid_offer(&pool, "2024-01-07 23:00:00").await;
        // Next Monday opens a new week.
        paid_offer(&pool, "2024-01-08 00:30:00").await;

        let rows = fetch_offer_stats(&pool, Granularity::Weekly).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, "2024-W01");
        assert_eq!(rows[0].success, 2);
        assert_eq!(rows[1].date, "2024-W02");
        assert_eq!(rows[1].success, 1);
    }

    #[tokio::test]
    async fn monthly_buckets_collapse_days() {
        let pool = test_pool().await;
        paid_offer(&pool, "2024-01-03 09:00:00").await;
        paid_offer(&pool, "2024-01-28 09:00:00").await;
        paid_offer(&pool, "2024-03-15 09:00:00").await;

        let rows = fetch_offer_stats(&pool, Granularity::Monthly).await.unwrap();
        // February has no offers — absent, not zero-filled
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, "2024-01");
        assert_eq!(rows[0].success, 2);
        assert_eq!(rows[1].date, "2024-03");
    }

    #[tokio::test]
    async fn returns_most_recent_90_buckets_ascending() {
        let pool = test_pool().await;
        // 100 daily buckets: 2024-01-01 .. 2024-04-09
        for i in 0..100i64 {
            let day: String = sqlx::query_scalar("SELECT date('2024-01-01', ? || ' days')")
                .bind(i)
                .fetch_one(&pool)
                .await
                .unwrap();
            paid_offer(&pool, &format!("{day} 12:00:00")).await;
        }

        let rows = fetch_offer_stats(&pool, Granularity::Daily).await.unwrap();
        assert_eq!(rows.len(), 90);
        // The oldest 10 days fell off the cap
        assert_eq!(rows[0].date, "2024-01-11");
        assert_eq!(rows[89].date, "2024-04-09");
        for pair in rows.windows(2) {
            assert!(pair[0].date < pair[1].date, "buckets must ascend");
        }
    }

    #[tokio::test]
    async fn aggregation_is_idempotent() {
        let pool = test_pool().await;
        paid_offer(&pool, "2024-02-01 09:00:00").await;
        insert_offer(&pool, "expired", "2024-02-02 09:00:00", None, None, 0.0, 0, 0, 0, 0).await;

        let first = fetch_offer_stats(&pool, Granularity::Daily).await.unwrap();
        let second = fetch_offer_stats(&pool, Granularity::Daily).await.unwrap();
        assert_eq!(first, second);
    }
}
