use log::LevelFilter;
use std::{
    env, fmt,
    sync::{Arc, Mutex},
    time::Duration,
};
use tether_core::{
    Connection, ConnectionConfig, ConnectionId, ConnectionPool, Driver, ErrorCodes, PoolConfig,
    RowLabeled, RowsAffected, Statement, Value, VendorError,
};

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

/// What happened on the fake backend, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(ConnectionId),
    Execute(ConnectionId, String),
    Fetch(ConnectionId, String),
    AutoCommit(ConnectionId, bool),
    Commit(ConnectionId),
    Rollback(ConnectionId),
    Close(ConnectionId),
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub events: Mutex<Vec<Event>>,
    /// Statements containing the text fail with the vendor code and sqlstate.
    pub failures: Mutex<Vec<(String, Option<i32>, Option<String>)>>,
    pub fail_connect: Mutex<bool>,
    pub fail_commit: Mutex<bool>,
    pub fail_rollback: Mutex<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeDriver {
    pub state: Arc<FakeState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self, max_connections: usize, acquire_timeout: Duration) -> ConnectionPool<Self> {
        let config = PoolConfig::from_url("fake://memory")
            .expect("valid url")
            .with_max_connections(max_connections)
            .with_acquire_timeout(acquire_timeout);
        ConnectionPool::new(self.clone(), config).expect("valid pool configuration")
    }

    pub fn fail_on(&self, text: &str, vendor_code: Option<i32>, sql_state: Option<&str>) {
        self.state.failures.lock().unwrap().push((
            text.to_owned(),
            vendor_code,
            sql_state.map(ToOwned::to_owned),
        ));
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.events.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| matches(e)).count()
    }

    pub fn commits(&self) -> usize {
        self.count(|e| matches!(e, Event::Commit(..)))
    }

    pub fn rollbacks(&self) -> usize {
        self.count(|e| matches!(e, Event::Rollback(..)))
    }

    pub fn executed(&self) -> Vec<(ConnectionId, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Execute(id, sql) | Event::Fetch(id, sql) => Some((id, sql)),
                _ => None,
            })
            .collect()
    }
}

impl Driver for FakeDriver {
    type Connection = FakeConnection;

    const NAME: &'static str = "fake";

    async fn connect(&self, _config: &ConnectionConfig) -> Result<FakeConnection, FakeError> {
        if *self.state.fail_connect.lock().unwrap() {
            return Err(FakeError {
                vendor_code: Some(90046),
                sql_state: Some("08001".into()),
                message: "connection refused".into(),
            });
        }
        let id = ConnectionId::next();
        self.state.events.lock().unwrap().push(Event::Connect(id));
        Ok(FakeConnection {
            id,
            auto_commit: true,
            state: self.state.clone(),
        })
    }

    fn error_codes(&self) -> ErrorCodes {
        ErrorCodes::h2()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeError {
    pub vendor_code: Option<i32>,
    pub sql_state: Option<String>,
    pub message: String,
}

impl fmt::Display for FakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FakeError {}

impl VendorError for FakeError {
    fn vendor_code(&self) -> Option<i32> {
        self.vendor_code
    }
    fn sql_state(&self) -> Option<&str> {
        self.sql_state.as_deref()
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    id: ConnectionId,
    auto_commit: bool,
    state: Arc<FakeState>,
}

impl FakeConnection {
    fn record(&self, event: Event) {
        self.state.events.lock().unwrap().push(event);
    }

    /// `sleep <ms>` suspends, configured failures fail.
    async fn run(&self, sql: &str) -> Result<(), FakeError> {
        if let Some(ms) = sql.strip_prefix("sleep ") {
            tokio::time::sleep(Duration::from_millis(ms.trim().parse().unwrap_or(0))).await;
        }
        let failure = self
            .state
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(text, ..)| sql.contains(text.as_str()))
            .cloned();
        if let Some((_, vendor_code, sql_state)) = failure {
            return Err(FakeError {
                vendor_code,
                sql_state,
                message: format!("statement `{}` failed", sql),
            });
        }
        Ok(())
    }
}

impl Connection for FakeConnection {
    type Error = FakeError;

    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn execute(&mut self, statement: &Statement) -> Result<RowsAffected, FakeError> {
        self.record(Event::Execute(self.id, statement.sql().to_owned()));
        self.run(statement.sql()).await?;
        Ok(RowsAffected {
            rows_affected: 1,
            last_affected_id: None,
        })
    }

    /// One row with the connection id and the statement, none if the query
    /// mentions `nothing`.
    async fn fetch(&mut self, statement: &Statement) -> Result<Vec<RowLabeled>, FakeError> {
        self.record(Event::Fetch(self.id, statement.sql().to_owned()));
        self.run(statement.sql()).await?;
        if statement.sql().contains("nothing") {
            return Ok(Vec::new());
        }
        Ok(vec![RowLabeled::new(
            ["connection_id".to_owned(), "sql".to_owned()].into(),
            [
                Value::Int64(Some(self.id.get() as i64)),
                Value::Varchar(Some(statement.sql().to_owned())),
            ]
            .into(),
        )])
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), FakeError> {
        self.record(Event::AutoCommit(self.id, enabled));
        self.auto_commit = enabled;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), FakeError> {
        if *self.state.fail_commit.lock().unwrap() {
            return Err(FakeError {
                vendor_code: Some(40001),
                sql_state: Some("40001".into()),
                message: "serialization failure".into(),
            });
        }
        self.record(Event::Commit(self.id));
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), FakeError> {
        if *self.state.fail_rollback.lock().unwrap() {
            return Err(FakeError {
                vendor_code: Some(90067),
                sql_state: Some("08006".into()),
                message: "connection broken".into(),
            });
        }
        self.record(Event::Rollback(self.id));
        Ok(())
    }

    async fn close(self) -> Result<(), FakeError> {
        self.record(Event::Close(self.id));
        Ok(())
    }
}
