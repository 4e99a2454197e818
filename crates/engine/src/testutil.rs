// In crates/engine/src/testutil.rs

//! In-memory collaborators for engine tests: a mock store with a mutation
//! counter, a canned market-data source, and a scriptable trade gateway.

use api_client::{self, MarketData, OpenTrade, OrderFill, TradeGateway};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use core_types::{
    Candle, Direction, Instrument, LogLevel, LogRecord, NewPosition, NewSession, Position,
    PositionClose, PositionStatus, Session, SessionAnalytics, SessionStatus, StrategyConfig,
};
use database::Store;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A stopped session with a 2/4 window crossover on EUR_USD.
pub fn session_fixture() -> Session {
    let now = Utc::now();
    Session {
        id: 0,
        name: "test-session".to_string(),
        config: StrategyConfig {
            instrument: Instrument("EUR_USD".to_string()),
            granularity: "M5".to_string(),
            short_window: 2,
            long_window: 4,
            units: dec!(100),
            tp_multiplier: dec!(0.02),
            sl_multiplier: dec!(0.01),
            neutral_threshold: dec!(0.001),
        },
        status: SessionStatus::Stopped,
        last_signal: None,
        last_short_ma: None,
        last_long_ma: None,
        last_price: None,
        last_evaluated_at: None,
        error_message: None,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
struct StoreData {
    sessions: Vec<Session>,
    positions: Vec<Position>,
    logs: Vec<LogRecord>,
    next_session_id: i64,
    next_position_id: i64,
    next_log_id: i64,
    mutations: usize,
}

/// In-memory [`Store`] that counts every mutating call, so tests can assert
/// that guarded paths write nothing at all.
pub struct MockStore {
    data: Mutex<StoreData>,
}

impl MockStore {
    pub fn new() -> Self {
        Self { data: Mutex::new(StoreData::default()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreData> {
        self.data.lock().expect("mock store poisoned")
    }

    /// Seeds a session without counting it as an engine mutation.
    pub async fn add_session(&self, mut session: Session) -> Session {
        let mut data = self.lock();
        data.next_session_id += 1;
        session.id = data.next_session_id;
        data.sessions.push(session.clone());
        session
    }

    /// Seeds an open position without counting it as an engine mutation.
    pub async fn add_open_position(
        &self,
        session_id: i64,
        direction: Direction,
        units: Decimal,
        entry_price: Decimal,
        broker_trade_id: Option<&str>,
    ) -> Position {
        let mut data = self.lock();
        data.next_position_id += 1;
        let position = Position {
            id: data.next_position_id,
            session_id,
            direction,
            units: units * direction.sign(),
            entry_price,
            tp_price: None,
            sl_price: None,
            status: PositionStatus::Open,
            broker_trade_id: broker_trade_id.map(str::to_string),
            exit_price: None,
            realized_pl: None,
            close_reason: None,
            opened_at: Utc::now(),
            closed_at: None,
        };
        data.positions.push(position.clone());
        position
    }

    pub async fn session(&self, id: i64) -> Session {
        self.lock().sessions.iter().find(|s| s.id == id).cloned().expect("session seeded")
    }

    pub async fn positions(&self) -> Vec<Position> {
        self.lock().positions.clone()
    }

    pub async fn logs(&self) -> Vec<LogRecord> {
        self.lock().logs.clone()
    }

    pub async fn mutation_count(&self) -> usize {
        self.lock().mutations
    }
}

#[async_trait]
impl Store for MockStore {
    async fn create_session(&self, new: &NewSession) -> database::Result<Session> {
        let mut session = session_fixture();
        session.name = new.name.clone();
        session.config = new.config.clone();
        let mut data = self.lock();
        data.next_session_id += 1;
        session.id = data.next_session_id;
        data.sessions.push(session.clone());
        data.mutations += 1;
        Ok(session)
    }

    async fn update_session(
        &self,
        id: i64,
        name: &str,
        config: &StrategyConfig,
    ) -> database::Result<Option<Session>> {
        let mut data = self.lock();
        data.mutations += 1;
        let session = data.sessions.iter_mut().find(|s| s.id == id);
        Ok(session.map(|s| {
            s.name = name.to_string();
            s.config = config.clone();
            s.updated_at = Utc::now();
            s.clone()
        }))
    }

    async fn get_session(&self, id: i64) -> database::Result<Option<Session>> {
        Ok(self.lock().sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn list_sessions(&self) -> database::Result<Vec<Session>> {
        Ok(self.lock().sessions.clone())
    }

    async fn list_running_sessions(&self) -> database::Result<Vec<Session>> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Running)
            .cloned()
            .collect())
    }

    async fn set_session_status(
        &self,
        id: i64,
        status: SessionStatus,
        error_message: Option<&str>,
    ) -> database::Result<()> {
        let mut data = self.lock();
        data.mutations += 1;
        if let Some(session) = data.sessions.iter_mut().find(|s| s.id == id) {
            session.status = status;
            session.error_message = error_message.map(str::to_string);
            session.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn record_analytics(&self, analytics: &SessionAnalytics) -> database::Result<()> {
        let mut data = self.lock();
        data.mutations += 1;
        if let Some(session) = data.sessions.iter_mut().find(|s| s.id == analytics.session_id) {
            session.last_signal = Some(analytics.signal);
            session.last_short_ma = Some(analytics.short_ma);
            session.last_long_ma = Some(analytics.long_ma);
            session.last_price = Some(analytics.last_price);
            session.last_evaluated_at = Some(analytics.evaluated_at);
            session.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_position(&self, new: &NewPosition) -> database::Result<Position> {
        let mut data = self.lock();
        data.mutations += 1;
        data.next_position_id += 1;
        let position = Position {
            id: data.next_position_id,
            session_id: new.session_id,
            direction: new.direction,
            units: new.units,
            entry_price: new.entry_price,
            tp_price: new.tp_price,
            sl_price: new.sl_price,
            status: PositionStatus::Open,
            broker_trade_id: new.broker_trade_id.clone(),
            exit_price: None,
            realized_pl: None,
            close_reason: None,
            opened_at: Utc::now(),
            closed_at: None,
        };
        data.positions.push(position.clone());
        Ok(position)
    }

    async fn close_position(
        &self,
        position_id: i64,
        close: &PositionClose,
        closed_at: chrono::DateTime<Utc>,
    ) -> database::Result<()> {
        let mut data = self.lock();
        data.mutations += 1;
        if let Some(position) = data
            .positions
            .iter_mut()
            .find(|p| p.id == position_id && p.status == PositionStatus::Open)
        {
            position.status = PositionStatus::Closed;
            position.exit_price = close.exit_price;
            position.realized_pl = close.realized_pl;
            position.close_reason = Some(close.reason.as_str().to_string());
            position.closed_at = Some(closed_at);
        }
        Ok(())
    }

    async fn open_positions(&self, session_id: i64) -> database::Result<Vec<Position>> {
        self.list_positions(session_id, Some(PositionStatus::Open)).await
    }

    async fn list_positions(
        &self,
        session_id: i64,
        status: Option<PositionStatus>,
    ) -> database::Result<Vec<Position>> {
        Ok(self
            .lock()
            .positions
            .iter()
            .filter(|p| p.session_id == session_id && status.is_none_or(|s| p.status == s))
            .cloned()
            .collect())
    }

    async fn append_log(
        &self,
        session_id: i64,
        level: LogLevel,
        message: &str,
        detail: Option<serde_json::Value>,
    ) -> database::Result<LogRecord> {
        let mut data = self.lock();
        data.mutations += 1;
        data.next_log_id += 1;
        let record = LogRecord {
            id: data.next_log_id,
            session_id,
            level,
            message: message.to_string(),
            detail,
            created_at: Utc::now(),
        };
        data.logs.push(record.clone());
        Ok(record)
    }

    async fn list_logs(
        &self,
        session_id: i64,
        page: u32,
        page_size: u32,
    ) -> database::Result<(Vec<LogRecord>, i64)> {
        let data = self.lock();
        let mut logs: Vec<LogRecord> =
            data.logs.iter().filter(|l| l.session_id == session_id).cloned().collect();
        logs.reverse();
        let total = logs.len() as i64;
        let start = ((page.max(1) - 1) * page_size) as usize;
        let page: Vec<LogRecord> =
            logs.into_iter().skip(start).take(page_size as usize).collect();
        Ok((page, total))
    }
}

/// Canned candle source.
pub struct MockMarket {
    candles: Vec<Candle>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockMarket {
    /// Complete candles, five minutes apart, closing at the given prices.
    pub fn with_closes(closes: &[Decimal]) -> Self {
        let start = Utc::now() - Duration::minutes(5 * closes.len() as i64);
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, close)| Candle {
                complete: true,
                time: start + Duration::minutes(5 * i as i64),
                open: *close,
                high: *close,
                low: *close,
                close: *close,
            })
            .collect();
        Self { candles, fail: false, calls: AtomicUsize::new(0) }
    }

    pub fn with_candles(candles: Vec<Candle>) -> Self {
        Self { candles, fail: false, calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { candles: Vec::new(), fail: true, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketData for MockMarket {
    async fn candles(
        &self,
        _instrument: &Instrument,
        _granularity: &str,
        _count: u32,
    ) -> api_client::Result<Vec<Candle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(api_client::Error::ApiError {
                status: 503,
                message: "candle service unavailable".to_string(),
            });
        }
        Ok(self.candles.clone())
    }
}

/// Scriptable trade gateway recording every call it receives.
pub struct MockGateway {
    fill: OrderFill,
    open: Vec<OpenTrade>,
    fail_orders: bool,
    fail_open_trades: bool,
    placed: Mutex<Vec<(String, Decimal)>>,
    closed: Mutex<Vec<String>>,
    open_queries: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            fill: OrderFill { price: dec!(1.1), realized_pl: None, trade_id: Some("1".to_string()) },
            open: Vec::new(),
            fail_orders: false,
            fail_open_trades: false,
            placed: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            open_queries: AtomicUsize::new(0),
        }
    }

    pub fn with_fill(mut self, fill: OrderFill) -> Self {
        self.fill = fill;
        self
    }

    pub fn with_open_trade(mut self, id: &str, instrument: &str) -> Self {
        self.open.push(OpenTrade {
            id: id.to_string(),
            instrument: instrument.to_string(),
            price: dec!(1.1),
            current_units: dec!(100),
        });
        self
    }

    pub fn failing_orders(mut self) -> Self {
        self.fail_orders = true;
        self
    }

    pub fn failing_open_trades(mut self) -> Self {
        self.fail_open_trades = true;
        self
    }

    pub fn placed_orders(&self) -> Vec<(String, Decimal)> {
        self.placed.lock().expect("mock gateway poisoned").clone()
    }

    pub fn closed_trades(&self) -> Vec<String> {
        self.closed.lock().expect("mock gateway poisoned").clone()
    }

    pub fn open_trades_queries(&self) -> usize {
        self.open_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TradeGateway for MockGateway {
    async fn place_market_order(
        &self,
        instrument: &Instrument,
        units: Decimal,
        _tp_price: Option<Decimal>,
        _sl_price: Option<Decimal>,
    ) -> api_client::Result<OrderFill> {
        if self.fail_orders {
            return Err(api_client::Error::ApiError {
                status: 400,
                message: "order rejected".to_string(),
            });
        }
        self.placed
            .lock()
            .expect("mock gateway poisoned")
            .push((instrument.0.clone(), units));
        Ok(self.fill.clone())
    }

    async fn close_trade(&self, trade_id: &str) -> api_client::Result<OrderFill> {
        if self.fail_orders {
            return Err(api_client::Error::ApiError {
                status: 400,
                message: "close rejected".to_string(),
            });
        }
        self.closed.lock().expect("mock gateway poisoned").push(trade_id.to_string());
        Ok(self.fill.clone())
    }

    async fn open_trades(&self) -> api_client::Result<Vec<OpenTrade>> {
        self.open_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_open_trades {
            return Err(api_client::Error::ApiError {
                status: 503,
                message: "account service unavailable".to_string(),
            });
        }
        Ok(self.open.clone())
    }
}
