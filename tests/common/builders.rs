//! Customer fixtures and dispatcher wiring shared by the integration tests

#![allow(dead_code)] // Not every test binary uses every helper

use range_dispatch::config::DispatchConfig;
use range_dispatch::error::{DispatchError, DispatchResult};
use range_dispatch::execution::Dispatcher;
use range_dispatch::messaging::LocalTransport;
use range_dispatch::storage::{InMemorySink, InMemoryTable, SourceRow};
use range_dispatch::worker::{
    ChunkPipeline, FnMapper, ItemProcessor, KeyedItem, RowMapper, UnitExecutor,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

impl KeyedItem for Customer {
    fn key(&self) -> i64 {
        self.id
    }
}

/// Raw customer row as stored in the source table
#[derive(Debug, Clone)]
pub struct CustomerRecord {
    pub first_name: String,
    pub last_name: String,
}

pub fn customer_table(count: i64) -> Arc<InMemoryTable<CustomerRecord>> {
    Arc::new(InMemoryTable::new(
        "customer",
        (0..count).map(|id| {
            (
                id,
                CustomerRecord {
                    first_name: format!("first{id}"),
                    last_name: format!("last{id}"),
                },
            )
        }),
    ))
}

/// Maps rows to customers, failing on `poison_key` while `poisoned` is set
pub struct CustomerMapper {
    poison_key: Option<i64>,
    poisoned: Arc<AtomicBool>,
}

impl CustomerMapper {
    pub fn new() -> Self {
        Self {
            poison_key: None,
            poisoned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the switch that clears the poison for a replay
    pub fn poisoned_at(key: i64) -> (Self, Arc<AtomicBool>) {
        let poisoned = Arc::new(AtomicBool::new(true));
        let mapper = Self {
            poison_key: Some(key),
            poisoned: Arc::clone(&poisoned),
        };
        (mapper, poisoned)
    }
}

impl RowMapper<SourceRow<CustomerRecord>> for CustomerMapper {
    type Item = Customer;

    fn map_row(&self, row: SourceRow<CustomerRecord>) -> DispatchResult<Customer> {
        if Some(row.key) == self.poison_key && self.poisoned.load(Ordering::SeqCst) {
            return Err(DispatchError::mapping(Some(row.key), "malformed customer row"));
        }
        Ok(Customer {
            id: row.key,
            first_name: row.data.first_name,
            last_name: row.data.last_name,
        })
    }
}

/// Upper-cases both name fields
pub struct UppercaseNames;

impl ItemProcessor<Customer> for UppercaseNames {
    type Output = Customer;

    fn process(&self, customer: Customer) -> DispatchResult<Customer> {
        Ok(Customer {
            first_name: customer.first_name.to_uppercase(),
            last_name: customer.last_name.to_uppercase(),
            ..customer
        })
    }
}

pub fn customer_pipeline(
    table: Arc<InMemoryTable<CustomerRecord>>,
    mapper: CustomerMapper,
    sink: Arc<InMemorySink<Customer>>,
    chunk_size: usize,
) -> Arc<dyn UnitExecutor> {
    Arc::new(ChunkPipeline::new(table, mapper, UppercaseNames, sink, chunk_size))
}

/// Pipeline over plain integer rows, handy for transports that only need an executor
pub fn key_pipeline(
    table: Arc<InMemoryTable<i64>>,
    sink: Arc<InMemorySink<i64>>,
    chunk_size: usize,
) -> Arc<dyn UnitExecutor> {
    Arc::new(ChunkPipeline::new(
        table,
        FnMapper(|row: SourceRow<i64>| Ok(row.data)),
        range_dispatch::worker::IdentityProcessor,
        sink,
        chunk_size,
    ))
}

/// Short timeouts and polling so failing tests fail fast
pub fn test_config() -> DispatchConfig {
    DispatchConfig {
        step_name: "customer_load".to_string(),
        step_timeout_ms: 10_000,
        reply_poll_interval_ms: 10,
        ..DispatchConfig::default()
    }
}

pub fn local_dispatcher(
    config: DispatchConfig,
    executor: Arc<dyn UnitExecutor>,
) -> (Dispatcher, Arc<LocalTransport>) {
    let transport = Arc::new(LocalTransport::start(
        executor,
        config.local_workers,
        config.local_queue_capacity,
    ));
    let dispatcher = Dispatcher::new(config, transport.clone()).expect("valid test config");
    (dispatcher, transport)
}
