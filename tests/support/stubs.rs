//! In-process providers and observers for driving the pipeline in tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use vcp_scanner::core::events::{ScanEvent, ScanObserver};
use vcp_scanner::models::bar::{PriceBar, PriceSeries, SymbolKey};
use vcp_scanner::services::market_data::{DataProvider, FetchError};

/// What a [`ScriptedProvider`] does for one symbol.
#[derive(Clone)]
pub enum Script {
    Bars(Vec<PriceBar>),
    NotFound,
    Network,
    Hang,
    Panic,
}

/// Answers per symbol from a fixed script; unknown symbols are not found.
pub struct ScriptedProvider {
    name: String,
    real: bool,
    available: bool,
    timeout: Duration,
    scripts: HashMap<String, Script>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            real: true,
            available: true,
            timeout: Duration::from_millis(200),
            scripts: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn synthetic(mut self) -> Self {
        self.real = false;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn script(mut self, symbol: &str, script: Script) -> Self {
        self.scripts.insert(symbol.to_string(), script);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_real(&self) -> bool {
        self.real
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, key: &SymbolKey, depth: usize) -> Result<PriceSeries, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.scripts.get(&key.symbol) {
            Some(Script::Bars(bars)) => {
                Ok(PriceSeries::new(key.clone(), bars.clone())?.truncate_to_recent(depth))
            }
            Some(Script::Network) => Err(FetchError::Network("connection reset".into())),
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(FetchError::Network("unreachable".into()))
            }
            Some(Script::Panic) => panic!("scripted provider panic for {}", key),
            Some(Script::NotFound) | None => Err(FetchError::NotFound(key.ticker())),
        }
    }
}

/// Records every event in order.
#[derive(Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<ScanEvent>>,
}

impl CollectingObserver {
    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                ScanEvent::BatchStarted { size, .. } => Some(*size),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&ScanEvent) -> bool) -> usize {
        self.events().iter().filter(|e| matches(e)).count()
    }
}

impl ScanObserver for CollectingObserver {
    fn on_event(&self, event: &ScanEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
