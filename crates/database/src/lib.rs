// In crates/database/src/lib.rs

use app_config::DatabaseSettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    LogLevel, LogRecord, NewPosition, NewSession, Position, PositionClose, PositionStatus,
    Session, SessionAnalytics, SessionStatus, StrategyConfig,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub mod error;
mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};

use types::{LogRow, PositionRow, SessionRow};

/// The persistence operations the engine and the web layer depend on.
///
/// Implemented for [`Db`] below; engine tests substitute an in-memory mock.
/// Every mutation commits independently; the engine never deletes records.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_session(&self, new: &NewSession) -> Result<Session>;
    async fn update_session(&self, id: i64, name: &str, config: &StrategyConfig)
        -> Result<Option<Session>>;
    async fn get_session(&self, id: i64) -> Result<Option<Session>>;
    async fn list_sessions(&self) -> Result<Vec<Session>>;
    async fn list_running_sessions(&self) -> Result<Vec<Session>>;
    async fn set_session_status(
        &self,
        id: i64,
        status: SessionStatus,
        error_message: Option<&str>,
    ) -> Result<()>;
    async fn record_analytics(&self, analytics: &SessionAnalytics) -> Result<()>;

    async fn insert_position(&self, new: &NewPosition) -> Result<Position>;
    async fn close_position(
        &self,
        position_id: i64,
        close: &PositionClose,
        closed_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn open_positions(&self, session_id: i64) -> Result<Vec<Position>>;
    async fn list_positions(
        &self,
        session_id: i64,
        status: Option<PositionStatus>,
    ) -> Result<Vec<Position>>;

    async fn append_log(
        &self,
        session_id: i64,
        level: LogLevel,
        message: &str,
        detail: Option<serde_json::Value>,
    ) -> Result<LogRecord>;
    async fn list_logs(
        &self,
        session_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<LogRecord>, i64)>;
}

/// A wrapper around the `sqlx` connection pool.
#[derive(Debug, Clone)]
pub struct Db(PgPool);

/// Establishes a connection pool to the PostgreSQL database and runs migrations.
pub async fn connect(settings: &DatabaseSettings) -> Result<Db> {
    let pool = PgPoolOptions::new().max_connections(5).connect(&settings.url).await?;

    // Run database migrations. This ensures the database schema is up-to-date.
    sqlx::migrate!("../../migrations").run(&pool).await?;

    Ok(Db(pool))
}

const SESSION_COLUMNS: &str = "id, name, instrument, granularity, short_window, long_window, \
     units, tp_multiplier, sl_multiplier, neutral_threshold, status, last_signal, \
     last_short_ma, last_long_ma, last_price, last_evaluated_at, error_message, \
     created_at, updated_at";

const POSITION_COLUMNS: &str = "id, session_id, direction, units, entry_price, tp_price, \
     sl_price, status, broker_trade_id, exit_price, realized_pl, close_reason, \
     opened_at, closed_at";

#[async_trait]
impl Store for Db {
    async fn create_session(&self, new: &NewSession) -> Result<Session> {
        let sql = format!(
            "INSERT INTO sessions \
             (name, instrument, granularity, short_window, long_window, units, \
              tp_multiplier, sl_multiplier, neutral_threshold) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {SESSION_COLUMNS}"
        );
        let row: SessionRow = sqlx::query_as(&sql)
            .bind(&new.name)
            .bind(&new.config.instrument.0)
            .bind(&new.config.granularity)
            .bind(new.config.short_window as i32)
            .bind(new.config.long_window as i32)
            .bind(new.config.units)
            .bind(new.config.tp_multiplier)
            .bind(new.config.sl_multiplier)
            .bind(new.config.neutral_threshold)
            .fetch_one(&self.0)
            .await
            .map_err(Error::OperationFailed)?;

        row.into_session()
    }

    async fn update_session(
        &self,
        id: i64,
        name: &str,
        config: &StrategyConfig,
    ) -> Result<Option<Session>> {
        let sql = format!(
            "UPDATE sessions SET \
             name = $2, instrument = $3, granularity = $4, short_window = $5, \
             long_window = $6, units = $7, tp_multiplier = $8, sl_multiplier = $9, \
             neutral_threshold = $10, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {SESSION_COLUMNS}"
        );
        let row: Option<SessionRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(name)
            .bind(&config.instrument.0)
            .bind(&config.granularity)
            .bind(config.short_window as i32)
            .bind(config.long_window as i32)
            .bind(config.units)
            .bind(config.tp_multiplier)
            .bind(config.sl_multiplier)
            .bind(config.neutral_threshold)
            .fetch_optional(&self.0)
            .await
            .map_err(Error::OperationFailed)?;

        row.map(SessionRow::into_session).transpose()
    }

    async fn get_session(&self, id: i64) -> Result<Option<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1");
        let row: Option<SessionRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.0)
            .await
            .map_err(Error::OperationFailed)?;

        row.map(SessionRow::into_session).transpose()
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY id");
        let rows: Vec<SessionRow> =
            sqlx::query_as(&sql).fetch_all(&self.0).await.map_err(Error::OperationFailed)?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    async fn list_running_sessions(&self) -> Result<Vec<Session>> {
        let sql =
            format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE status = 'running' ORDER BY id");
        let rows: Vec<SessionRow> =
            sqlx::query_as(&sql).fetch_all(&self.0).await.map_err(Error::OperationFailed)?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    async fn set_session_status(
        &self,
        id: i64,
        status: SessionStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET status = $2, error_message = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error_message)
        .execute(&self.0)
        .await
        .map_err(Error::OperationFailed)?;

        Ok(())
    }

    async fn record_analytics(&self, analytics: &SessionAnalytics) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET \
             last_signal = $2, last_short_ma = $3, last_long_ma = $4, last_price = $5, \
             last_evaluated_at = $6, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(analytics.session_id)
        .bind(analytics.signal.as_str())
        .bind(analytics.short_ma)
        .bind(analytics.long_ma)
        .bind(analytics.last_price)
        .bind(analytics.evaluated_at)
        .execute(&self.0)
        .await
        .map_err(Error::OperationFailed)?;

        Ok(())
    }

    async fn insert_position(&self, new: &NewPosition) -> Result<Position> {
        let sql = format!(
            "INSERT INTO positions \
             (session_id, direction, units, entry_price, tp_price, sl_price, broker_trade_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {POSITION_COLUMNS}"
        );
        let row: PositionRow = sqlx::query_as(&sql)
            .bind(new.session_id)
            .bind(new.direction.as_str())
            .bind(new.units)
            .bind(new.entry_price)
            .bind(new.tp_price)
            .bind(new.sl_price)
            .bind(&new.broker_trade_id)
            .fetch_one(&self.0)
            .await
            .map_err(Error::OperationFailed)?;

        row.into_position()
    }

    async fn close_position(
        &self,
        position_id: i64,
        close: &PositionClose,
        closed_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE positions SET \
             status = 'closed', exit_price = $2, realized_pl = $3, close_reason = $4, \
             closed_at = $5 \
             WHERE id = $1 AND status = 'open'",
        )
        .bind(position_id)
        .bind(close.exit_price)
        .bind(close.realized_pl)
        .bind(close.reason.as_str())
        .bind(closed_at)
        .execute(&self.0)
        .await
        .map_err(Error::OperationFailed)?;

        Ok(())
    }

    async fn open_positions(&self, session_id: i64) -> Result<Vec<Position>> {
        self.list_positions(session_id, Some(PositionStatus::Open)).await
    }

    async fn list_positions(
        &self,
        session_id: i64,
        status: Option<PositionStatus>,
    ) -> Result<Vec<Position>> {
        let sql = format!(
            "SELECT {POSITION_COLUMNS} FROM positions \
             WHERE session_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY opened_at"
        );
        let rows: Vec<PositionRow> = sqlx::query_as(&sql)
            .bind(session_id)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.0)
            .await
            .map_err(Error::OperationFailed)?;

        rows.into_iter().map(PositionRow::into_position).collect()
    }

    async fn append_log(
        &self,
        session_id: i64,
        level: LogLevel,
        message: &str,
        detail: Option<serde_json::Value>,
    ) -> Result<LogRecord> {
        let row: LogRow = sqlx::query_as(
            "INSERT INTO session_logs (session_id, level, message, detail) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, session_id, level, message, detail, created_at",
        )
        .bind(session_id)
        .bind(level.as_str())
        .bind(message)
        .bind(detail)
        .fetch_one(&self.0)
        .await
        .map_err(Error::OperationFailed)?;

        row.into_record()
    }

    async fn list_logs(
        &self,
        session_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<LogRecord>, i64)> {
        let offset = (page.max(1) - 1) as i64 * page_size as i64;

        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT id, session_id, level, message, detail, created_at \
             FROM session_logs WHERE session_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(session_id)
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(&self.0)
        .await
        .map_err(Error::OperationFailed)?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM session_logs WHERE session_id = $1")
                .bind(session_id)
                .fetch_one(&self.0)
                .await
                .map_err(Error::OperationFailed)?;

        let records =
            rows.into_iter().map(LogRow::into_record).collect::<Result<Vec<_>>>()?;
        Ok((records, total))
    }
}
