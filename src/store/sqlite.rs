//! SQLite store
//!
//! Schema is created on connect. Timestamps are stored as epoch
//! milliseconds and decimals as text so no precision is lost.

use super::{Store, StoreError};
use crate::alert::{AlertConfig, AlertEvent, AlertKind, PriceObservation};
use crate::config::StoreConfig;
use crate::outcome::{ExitReason, HorizonReturns, Settlement};
use crate::universe::{Symbol, SymbolUniverse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tokio::sync::RwLock;
use uuid::Uuid;

const SCHEMA: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS symbols (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL UNIQUE,
        name TEXT,
        exchange TEXT NOT NULL,
        quarantine_until_ms INTEGER,
        failure_streak INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS price_observations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        price TEXT NOT NULL,
        volume INTEGER,
        timestamp_ms INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_observations_symbol_ts ON price_observations (symbol, timestamp_ms)",
    r#"
    CREATE TABLE IF NOT EXISTS alert_configs (
        symbol TEXT PRIMARY KEY,
        threshold_pct TEXT NOT NULL,
        enabled INTEGER NOT NULL,
        created_at_ms INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS alert_events (
        id TEXT PRIMARY KEY,
        symbol TEXT NOT NULL,
        kind TEXT NOT NULL,
        price_before TEXT NOT NULL,
        price_after TEXT NOT NULL,
        percent_change TEXT NOT NULL,
        volume INTEGER,
        volume_ratio TEXT,
        sent_at_ms INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS settlements (
        alert_id TEXT NOT NULL UNIQUE,
        symbol TEXT NOT NULL,
        kind TEXT NOT NULL,
        alert_time_ms INTEGER NOT NULL,
        alert_price TEXT NOT NULL,
        entry_price TEXT NOT NULL,
        exit_reason TEXT NOT NULL,
        result_pct TEXT NOT NULL,
        max_gain TEXT NOT NULL,
        max_drawdown TEXT NOT NULL,
        hold_minutes INTEGER NOT NULL,
        volume_ratio TEXT,
        return_1h TEXT,
        return_4h TEXT,
        return_24h TEXT,
        settled_at_ms INTEGER NOT NULL
    )
    "#,
];

fn ts(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StoreError::Corrupt(format!("timestamp {ms}")))
}

fn decimal(text: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(text).map_err(|e| StoreError::Corrupt(format!("decimal '{text}': {e}")))
}

fn opt_dec(text: Option<String>) -> Result<Option<Decimal>, StoreError> {
    text.as_deref().map(decimal).transpose()
}

fn parse<T: FromStr<Err = String>>(text: &str) -> Result<T, StoreError> {
    text.parse().map_err(StoreError::Corrupt)
}

fn symbol_from_row(row: &SqliteRow) -> Result<Symbol, StoreError> {
    Ok(Symbol {
        symbol: row.try_get("symbol")?,
        name: row.try_get("name")?,
        exchange: row.try_get("exchange")?,
        quarantine_until: row
            .try_get::<Option<i64>, _>("quarantine_until_ms")?
            .map(ts)
            .transpose()?,
        failure_streak: row.try_get::<i64, _>("failure_streak")? as u32,
    })
}

fn observation_from_row(row: &SqliteRow) -> Result<PriceObservation, StoreError> {
    Ok(PriceObservation {
        symbol: row.try_get("symbol")?,
        price: decimal(&row.try_get::<String, _>("price")?)?,
        volume: row.try_get::<Option<i64>, _>("volume")?.map(|v| v as u64),
        timestamp: ts(row.try_get("timestamp_ms")?)?,
    })
}

fn alert_from_row(row: &SqliteRow) -> Result<AlertEvent, StoreError> {
    let id: String = row.try_get("id")?;
    Ok(AlertEvent {
        id: Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt(format!("alert id '{id}': {e}")))?,
        symbol: row.try_get("symbol")?,
        kind: parse::<AlertKind>(&row.try_get::<String, _>("kind")?)?,
        price_before: decimal(&row.try_get::<String, _>("price_before")?)?,
        price_after: decimal(&row.try_get::<String, _>("price_after")?)?,
        percent_change: decimal(&row.try_get::<String, _>("percent_change")?)?,
        volume: row.try_get::<Option<i64>, _>("volume")?.map(|v| v as u64),
        volume_ratio: opt_dec(row.try_get("volume_ratio")?)?,
        sent_at: ts(row.try_get("sent_at_ms")?)?,
    })
}

fn settlement_from_row(row: &SqliteRow) -> Result<Settlement, StoreError> {
    let id: String = row.try_get("alert_id")?;
    Ok(Settlement {
        alert_id: Uuid::parse_str(&id)
            .map_err(|e| StoreError::Corrupt(format!("alert id '{id}': {e}")))?,
        symbol: row.try_get("symbol")?,
        kind: parse::<AlertKind>(&row.try_get::<String, _>("kind")?)?,
        alert_time: ts(row.try_get("alert_time_ms")?)?,
        alert_price: decimal(&row.try_get::<String, _>("alert_price")?)?,
        entry_price: decimal(&row.try_get::<String, _>("entry_price")?)?,
        exit_reason: parse::<ExitReason>(&row.try_get::<String, _>("exit_reason")?)?,
        result_pct: decimal(&row.try_get::<String, _>("result_pct")?)?,
        max_gain: decimal(&row.try_get::<String, _>("max_gain")?)?,
        max_drawdown: decimal(&row.try_get::<String, _>("max_drawdown")?)?,
        hold_minutes: row.try_get("hold_minutes")?,
        volume_ratio: opt_dec(row.try_get("volume_ratio")?)?,
        horizons: HorizonReturns {
            one_hour: opt_dec(row.try_get("return_1h")?)?,
            four_hours: opt_dec(row.try_get("return_4h")?)?,
            one_day: opt_dec(row.try_get("return_24h")?)?,
        },
        settled_at: ts(row.try_get("settled_at_ms")?)?,
    })
}

/// SQLite-backed store
pub struct SqliteStore {
    database_url: String,
    max_connections: u32,
    pool: RwLock<SqlitePool>,
}

impl SqliteStore {
    /// Open the database and ensure the schema exists
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = Self::open(&config.database_url, config.max_connections).await?;
        tracing::debug!(url = %config.database_url, "Connected to store");
        Ok(Self {
            database_url: config.database_url.clone(),
            max_connections: config.max_connections,
            pool: RwLock::new(pool),
        })
    }

    async fn open(url: &str, max_connections: u32) -> Result<SqlitePool, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(pool)
    }

    async fn pool(&self) -> SqlitePool {
        self.pool.read().await.clone()
    }
}

#[async_trait]
impl SymbolUniverse for SqliteStore {
    async fn fetch_symbols(&self, limit: usize, offset: usize) -> anyhow::Result<Vec<Symbol>> {
        let rows = sqlx::query(
            "SELECT symbol, name, exchange, quarantine_until_ms, failure_streak \
             FROM symbols ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool().await)
        .await?;
        Ok(rows.iter().map(symbol_from_row).collect::<Result<_, _>>()?)
    }

    async fn set_quarantine(
        &self,
        symbol: &str,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE symbols SET quarantine_until_ms = ? WHERE symbol = ?")
            .bind(until.map(|t| t.timestamp_millis()))
            .bind(symbol)
            .execute(&self.pool().await)
            .await?;
        Ok(())
    }

    async fn set_failure_streak(&self, symbol: &str, streak: u32) -> anyhow::Result<()> {
        sqlx::query("UPDATE symbols SET failure_streak = ? WHERE symbol = ?")
            .bind(streak as i64)
            .bind(symbol)
            .execute(&self.pool().await)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn reconnect(&self) -> Result<(), StoreError> {
        let fresh = Self::open(&self.database_url, self.max_connections).await?;
        let old = std::mem::replace(&mut *self.pool.write().await, fresh);
        old.close().await;
        tracing::info!("Store connection recreated");
        Ok(())
    }

    async fn close(&self) {
        self.pool.read().await.close().await;
    }

    async fn upsert_symbol(&self, symbol: &Symbol) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO symbols (symbol, name, exchange) VALUES (?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                name = excluded.name,
                exchange = excluded.exchange
            "#,
        )
        .bind(&symbol.symbol)
        .bind(&symbol.name)
        .bind(&symbol.exchange)
        .execute(&self.pool().await)
        .await?;
        Ok(())
    }

    async fn append_observations(&self, rows: &[PriceObservation]) -> Result<(), StoreError> {
        let pool = self.pool().await;
        let mut tx = pool.begin().await?;
        for obs in rows {
            sqlx::query(
                "INSERT INTO price_observations (symbol, price, volume, timestamp_ms) VALUES (?, ?, ?, ?)",
            )
            .bind(&obs.symbol)
            .bind(obs.price.to_string())
            .bind(obs.volume.map(|v| v as i64))
            .bind(obs.timestamp.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn baselines_at(
        &self,
        symbols: &[String],
        at: DateTime<Utc>,
    ) -> Result<HashMap<String, PriceObservation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT o.symbol, o.price, o.volume, o.timestamp_ms
            FROM price_observations o
            JOIN (
                SELECT symbol, MAX(timestamp_ms) AS ts
                FROM price_observations
                WHERE timestamp_ms <= ?
                GROUP BY symbol
            ) latest ON o.symbol = latest.symbol AND o.timestamp_ms = latest.ts
            "#,
        )
        .bind(at.timestamp_millis())
        .fetch_all(&self.pool().await)
        .await?;

        let wanted: HashSet<&str> = symbols.iter().map(String::as_str).collect();
        let mut out = HashMap::new();
        for row in &rows {
            let obs = observation_from_row(row)?;
            if wanted.contains(obs.symbol.as_str()) {
                out.insert(obs.symbol.clone(), obs);
            }
        }
        Ok(out)
    }

    async fn prune_observations(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM price_observations WHERE timestamp_ms < ?")
            .bind(before.timestamp_millis())
            .execute(&self.pool().await)
            .await?;
        Ok(result.rows_affected())
    }

    async fn alert_configs(&self) -> Result<Vec<AlertConfig>, StoreError> {
        let rows = sqlx::query(
            "SELECT symbol, threshold_pct, enabled, created_at_ms FROM alert_configs ORDER BY symbol",
        )
        .fetch_all(&self.pool().await)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(AlertConfig {
                    symbol: row.try_get("symbol")?,
                    threshold_pct: decimal(&row.try_get::<String, _>("threshold_pct")?)?,
                    enabled: row.try_get("enabled")?,
                    created_at: ts(row.try_get("created_at_ms")?)?,
                })
            })
            .collect()
    }

    async fn upsert_alert_config(
        &self,
        symbol: &str,
        threshold_pct: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO alert_configs (symbol, threshold_pct, enabled, created_at_ms)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                threshold_pct = excluded.threshold_pct,
                enabled = 1
            "#,
        )
        .bind(symbol)
        .bind(threshold_pct.to_string())
        .bind(now.timestamp_millis())
        .execute(&self.pool().await)
        .await?;
        Ok(())
    }

    async fn disable_alert_config(&self, symbol: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE alert_configs SET enabled = 0 WHERE symbol = ?")
            .bind(symbol)
            .execute(&self.pool().await)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn symbols_alerted_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, StoreError> {
        let rows = sqlx::query("SELECT DISTINCT symbol FROM alert_events WHERE sent_at_ms > ?")
            .bind(since.timestamp_millis())
            .fetch_all(&self.pool().await)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("symbol").map_err(StoreError::from))
            .collect()
    }

    async fn append_alert(&self, alert: &AlertEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO alert_events (
                id, symbol, kind, price_before, price_after, percent_change,
                volume, volume_ratio, sent_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.id.to_string())
        .bind(&alert.symbol)
        .bind(alert.kind.as_str())
        .bind(alert.price_before.to_string())
        .bind(alert.price_after.to_string())
        .bind(alert.percent_change.to_string())
        .bind(alert.volume.map(|v| v as i64))
        .bind(alert.volume_ratio.map(|r| r.to_string()))
        .bind(alert.sent_at.timestamp_millis())
        .execute(&self.pool().await)
        .await?;
        Ok(())
    }

    async fn alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<AlertEvent>, StoreError> {
        let rows = sqlx::query("SELECT * FROM alert_events WHERE sent_at_ms >= ? ORDER BY sent_at_ms")
            .bind(since.timestamp_millis())
            .fetch_all(&self.pool().await)
            .await?;
        rows.iter().map(alert_from_row).collect()
    }

    async fn settlement_exists(&self, alert_id: Uuid) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM settlements WHERE alert_id = ?")
            .bind(alert_id.to_string())
            .fetch_optional(&self.pool().await)
            .await?;
        Ok(row.is_some())
    }

    async fn insert_settlement(&self, s: &Settlement) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO settlements (
                alert_id, symbol, kind, alert_time_ms, alert_price, entry_price,
                exit_reason, result_pct, max_gain, max_drawdown, hold_minutes,
                volume_ratio, return_1h, return_4h, return_24h, settled_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(alert_id) DO NOTHING
            "#,
        )
        .bind(s.alert_id.to_string())
        .bind(&s.symbol)
        .bind(s.kind.as_str())
        .bind(s.alert_time.timestamp_millis())
        .bind(s.alert_price.to_string())
        .bind(s.entry_price.to_string())
        .bind(s.exit_reason.as_str())
        .bind(s.result_pct.to_string())
        .bind(s.max_gain.to_string())
        .bind(s.max_drawdown.to_string())
        .bind(s.hold_minutes)
        .bind(s.volume_ratio.map(|r| r.to_string()))
        .bind(s.horizons.one_hour.map(|r| r.to_string()))
        .bind(s.horizons.four_hours.map(|r| r.to_string()))
        .bind(s.horizons.one_day.map(|r| r.to_string()))
        .bind(s.settled_at.timestamp_millis())
        .execute(&self.pool().await)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn settlements_since(&self, since: DateTime<Utc>) -> Result<Vec<Settlement>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM settlements WHERE alert_time_ms >= ? ORDER BY alert_time_ms")
                .bind(since.timestamp_millis())
                .fetch_all(&self.pool().await)
                .await?;
        rows.iter().map(settlement_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::TradeOutcome;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let store = SqliteStore::connect(&StoreConfig {
            database_url: url,
            chunk_size: 100,
            max_connections: 1,
        })
        .await
        .unwrap();
        (dir, store)
    }

    fn alert(symbol: &str, sent_at: DateTime<Utc>) -> AlertEvent {
        AlertEvent {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            kind: AlertKind::VolumeSpikeUp,
            price_before: dec!(10.00),
            price_after: dec!(10.75),
            percent_change: dec!(7.5),
            volume: Some(120_000),
            volume_ratio: Some(dec!(2.4)),
            sent_at,
        }
    }

    #[tokio::test]
    async fn test_symbols_keep_insertion_order_and_ledger_fields() {
        let (_dir, store) = open_store().await;
        for t in ["MSFT", "AAPL", "ZZZZ"] {
            store.upsert_symbol(&Symbol::new(t, None, "NASDAQ")).await.unwrap();
        }
        let until = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap()
            + Duration::days(7);
        store.set_quarantine("AAPL", Some(until)).await.unwrap();
        store.set_failure_streak("ZZZZ", 2).await.unwrap();

        let symbols = store.fetch_symbols(10, 0).await.unwrap();
        let names: Vec<_> = symbols.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(names, vec!["MSFT", "AAPL", "ZZZZ"]);
        assert_eq!(symbols[1].quarantine_until, Some(until));
        assert_eq!(symbols[2].failure_streak, 2);

        assert_eq!(store.fetch_symbols(2, 2).await.unwrap().len(), 1);
        store.close().await;
    }

    #[tokio::test]
    async fn test_observations_baseline_and_prune() {
        let (_dir, store) = open_store().await;
        let now = Utc::now();
        let rows: Vec<PriceObservation> = [(3, dec!(10.5)), (2, dec!(11.25)), (0, dec!(12))]
            .into_iter()
            .map(|(h, price)| PriceObservation {
                symbol: "AAA".to_string(),
                price,
                volume: Some(1_000),
                timestamp: now - Duration::hours(h),
            })
            .collect();
        store.append_observations(&rows).await.unwrap();

        let baselines = store
            .baselines_at(&["AAA".to_string()], now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(baselines["AAA"].price, dec!(11.25));

        let removed = store
            .prune_observations(now - Duration::minutes(150))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        store.close().await;
    }

    #[tokio::test]
    async fn test_alerts_and_cooldown_set() {
        let (_dir, store) = open_store().await;
        let now = Utc::now();
        let recent = alert("AAA", now - Duration::hours(1));
        store.append_alert(&recent).await.unwrap();
        store.append_alert(&alert("BBB", now - Duration::hours(6))).await.unwrap();

        let cooling = store.symbols_alerted_since(now - Duration::hours(4)).await.unwrap();
        assert!(cooling.contains("AAA"));
        assert!(!cooling.contains("BBB"));

        let alerts = store.alerts_since(now - Duration::days(1)).await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1].id, recent.id);
        assert_eq!(alerts[1].volume_ratio, Some(dec!(2.4)));
        store.close().await;
    }

    #[tokio::test]
    async fn test_settlement_is_unique_per_alert() {
        let (_dir, store) = open_store().await;
        let event = alert("AAA", Utc::now() - Duration::days(2));
        let settlement = Settlement::new(
            &event,
            dec!(10.76075),
            TradeOutcome {
                exit_reason: ExitReason::TakeProfit,
                result_pct: dec!(3),
                max_gain: dec!(3.4),
                max_drawdown: dec!(-0.2),
                hold_minutes: 45,
            },
            HorizonReturns {
                one_hour: Some(dec!(1.2)),
                four_hours: None,
                one_day: Some(dec!(-0.5)),
            },
            Utc::now(),
        );

        assert!(!store.settlement_exists(event.id).await.unwrap());
        assert!(store.insert_settlement(&settlement).await.unwrap());
        assert!(!store.insert_settlement(&settlement).await.unwrap());
        assert!(store.settlement_exists(event.id).await.unwrap());

        let stored = store
            .settlements_since(Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].entry_price, dec!(10.76075));
        assert_eq!(stored[0].horizons.four_hours, None);
        assert_eq!(stored[0].exit_reason, ExitReason::TakeProfit);
        store.close().await;
    }

    #[tokio::test]
    async fn test_alert_configs_and_reconnect() {
        let (_dir, store) = open_store().await;
        let now = Utc::now();
        store.upsert_alert_config("TSLA", dec!(3.5), now).await.unwrap();
        store.reconnect().await.unwrap();
        assert!(store.disable_alert_config("TSLA").await.unwrap());
        let configs = store.alert_configs().await.unwrap();
        assert_eq!(configs[0].threshold_pct, dec!(3.5));
        assert!(!configs[0].enabled);

        store.close().await;
        assert!(matches!(store.alert_configs().await, Err(StoreError::Closed)));
    }
}
