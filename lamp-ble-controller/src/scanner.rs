//! Finding a lamp by its advertised name

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::DiscoveryError;

/// How long a search runs by default
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One advertising device seen during a scan
#[derive(Debug, Clone)]
pub struct DiscoveredPeripheral<P> {
    /// Platform identifier, usually the address
    pub id: String,
    pub advertised_name: Option<String>,
    pub is_low_energy: bool,
    pub handle: P,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    PoweredOff,
    Io(String),
    Unknown,
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::PoweredOff => write!(f, "Bluetooth adapter is powered off"),
            ScanError::Io(e) => write!(f, "I/O error: {e}"),
            ScanError::Unknown => write!(f, "unknown scan error"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ScanEvent<P> {
    Discovered(DiscoveredPeripheral<P>),
    Error(ScanError),
    /// The platform ended the scan
    Finished,
}

/// Platform scanner
#[allow(async_fn_in_trait)]
pub trait ScanSource {
    type Peripheral;

    async fn start_scan(&mut self) -> Result<(), DiscoveryError>;

    async fn stop_scan(&mut self) -> Result<(), DiscoveryError>;

    /// Next scan event, `None` once the source has nothing more to report
    async fn next_event(&mut self) -> Option<ScanEvent<Self::Peripheral>>;
}

#[derive(Debug)]
pub enum SearchOutcome<P> {
    DeviceFound(DiscoveredPeripheral<P>),
    DeviceNotFound,
    /// Another search on this scanner is still running
    AlreadySearching,
}

type ErrorObserver = Box<dyn Fn(&ScanError) + Send + Sync>;

#[derive(Default)]
pub struct CentralScanner {
    searching: AtomicBool,
    observers: Vec<ErrorObserver>,
}

struct SearchGuard<'a>(&'a AtomicBool);

impl Drop for SearchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CentralScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_searching(&self) -> bool {
        self.searching.load(Ordering::Acquire)
    }

    /// Called for every scan error; errors don't end the search by themselves
    pub fn on_error(&mut self, observer: impl Fn(&ScanError) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Scan until a low energy device advertising `target_name` shows up.
    ///
    /// The first match wins and the scan stops right away.
    pub async fn start_search<S: ScanSource>(
        &self,
        source: &mut S,
        target_name: &str,
        timeout: Duration,
    ) -> Result<SearchOutcome<S::Peripheral>, DiscoveryError> {
        if self
            .searching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(SearchOutcome::AlreadySearching);
        }
        let _guard = SearchGuard(&self.searching);

        tracing::debug!(target = target_name, "searching for low energy devices");
        source.start_scan().await?;
        let found = tokio::time::timeout(timeout, self.first_match(source, target_name))
            .await
            .unwrap_or(None);
        if let Err(e) = source.stop_scan().await {
            tracing::warn!(error = %e, "failed to stop scan");
        }

        Ok(match found {
            Some(peripheral) => {
                tracing::info!(id = %peripheral.id, "lamp device found");
                SearchOutcome::DeviceFound(peripheral)
            }
            None => {
                tracing::warn!(target = target_name, "lamp device not found");
                SearchOutcome::DeviceNotFound
            }
        })
    }

    async fn first_match<S: ScanSource>(
        &self,
        source: &mut S,
        target_name: &str,
    ) -> Option<DiscoveredPeripheral<S::Peripheral>> {
        while let Some(event) = source.next_event().await {
            match event {
                ScanEvent::Discovered(peripheral) => {
                    if is_target(&peripheral, target_name) {
                        return Some(peripheral);
                    }
                    tracing::trace!(id = %peripheral.id, "skipping");
                }
                ScanEvent::Error(e) => {
                    tracing::warn!(error = %e, "scan error");
                    for observer in &self.observers {
                        observer(&e);
                    }
                }
                ScanEvent::Finished => break,
            }
        }
        None
    }
}

fn is_target<P>(peripheral: &DiscoveredPeripheral<P>, target_name: &str) -> bool {
    peripheral.is_low_energy && peripheral.advertised_name.as_deref() == Some(target_name)
}
