//! Core functionality for actual scanning behaviour.
use crate::errors::ScanError;
use log::{debug, warn};

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use hickory_resolver::TokioAsyncResolver;
use std::{
    net::{IpAddr, Ipv4Addr},
    num::NonZero,
    sync::Arc,
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::{self, Instant},
};

/// Something able to turn an address into the names it is registered under.
///
/// An `Ok` with no names is a successful answer and is not retried.
#[async_trait]
pub trait ReverseLookup: Send + Sync {
    async fn lookup(&self, address: Ipv4Addr) -> Result<Vec<String>, ScanError>;
}

#[async_trait]
impl ReverseLookup for TokioAsyncResolver {
    async fn lookup(&self, address: Ipv4Addr) -> Result<Vec<String>, ScanError> {
        let names = self
            .reverse_lookup(IpAddr::V4(address))
            .await
            .map_err(|e| ScanError::LookupFailure(e.to_string()))?;
        Ok(names.iter().map(|name| name.to_string()).collect())
    }
}

/// Final state of one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// First name returned by the lookup.
    Resolved(String),
    /// The lookup succeeded without any name.
    NoName,
    /// Every attempt failed, or the scan ran out of time.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub address: Ipv4Addr,
    pub outcome: ScanOutcome,
}

struct ScannerResolver {
    lookup: Arc<dyn ReverseLookup>,
    tries: NonZero<u8>,
    timeout: Duration,
}

impl std::fmt::Debug for ScannerResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerResolver")
            .field("tries", &self.tries)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ScannerResolver {
    /// Looks the address up at most self.tries times.
    /// Stops at the first successful answer, even an empty one.
    /// A failed attempt is only logged; running out of attempts, or out of
    /// time when a deadline is given, ends in `ScanOutcome::Failed`.
    async fn resolve_with_retry(&self, address: Ipv4Addr, deadline: Option<Instant>) -> ScanResult {
        let tries = self.tries.get();
        let mut outcome = ScanOutcome::Failed;
        for nr_try in 1..=tries {
            let wait = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        debug!("Scan deadline reached before try {} for {}", nr_try, address);
                        break;
                    }
                    left.min(self.timeout)
                }
                None => self.timeout,
            };

            match self.attempt(address, wait).await {
                Ok(names) => {
                    debug!("Lookup of {} answered after {} tries", address, nr_try);
                    outcome = names
                        .into_iter()
                        .next()
                        .map_or(ScanOutcome::NoName, ScanOutcome::Resolved);
                    break;
                }
                Err(e) => debug!("Try {} for {} failed: {}", nr_try, address, e),
            }
        }

        ScanResult { address, outcome }
    }

    /// Performs one lookup bounded by `wait`.
    async fn attempt(&self, address: Ipv4Addr, wait: Duration) -> Result<Vec<String>, ScanError> {
        time::timeout(wait, self.lookup.lookup(address))
            .await
            .map_err(|_| ScanError::LookupFailure(format!("no answer within {wait:?}")))?
    }
}

/// Aborts the task when dropped, so a scan that is abandoned half way does
/// not leave lookups running behind it.
struct AbortOnDrop(JoinHandle<ScanResult>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The class for the scanner
/// batch_size is how many addresses are looked up at the same time.
/// timeout bounds every single lookup attempt, tries is the number of attempts
/// per address.
/// scan_timeout, when set, bounds the whole scan: no attempt starts after it
/// and attempts running into it are cut short.
#[derive(Debug)]
pub struct Scanner {
    batch_size: usize,
    scan_timeout: Option<Duration>,
    resolver: Arc<ScannerResolver>,
}

impl Scanner {
    pub fn new(
        lookup: Arc<dyn ReverseLookup>,
        batch_size: usize,
        timeout: Duration,
        tries: u8,
        scan_timeout: Option<Duration>,
    ) -> Self {
        Self {
            batch_size: batch_size.max(1),
            scan_timeout,
            resolver: Arc::new(ScannerResolver {
                lookup,
                timeout,
                tries: NonZero::new(tries).unwrap_or(NonZero::<u8>::MIN),
            }),
        }
    }

    /// Spawns one task per address, at most `batch_size` at a time, and
    /// yields every result as soon as its task finishes.
    ///
    /// The stream ends once every task has finished. Dropping it aborts the
    /// tasks still in flight.
    pub fn stream<I>(&self, addresses: I) -> impl Stream<Item = ScanResult> + Send + 'static
    where
        I: IntoIterator<Item = Ipv4Addr>,
        I::IntoIter: Send + 'static,
    {
        let deadline = self.scan_timeout.map(|t| Instant::now() + t);
        let resolver = Arc::clone(&self.resolver);

        stream::iter(addresses)
            .map(move |address| {
                let resolver = Arc::clone(&resolver);
                let task = tokio::spawn(async move {
                    resolver.resolve_with_retry(address, deadline).await
                });
                (address, AbortOnDrop(task))
            })
            .map(|(address, mut task)| async move {
                match (&mut task.0).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Lookup task for {} did not finish: {}", address, e);
                        ScanResult {
                            address,
                            outcome: ScanOutcome::Failed,
                        }
                    }
                }
            })
            .buffer_unordered(self.batch_size)
    }

    /// Runs the whole scan and returns every result, in completion order.
    pub async fn run<I>(&self, addresses: I) -> Vec<ScanResult>
    where
        I: IntoIterator<Item = Ipv4Addr>,
        I::IntoIter: Send + 'static,
    {
        let addresses = addresses.into_iter();
        debug!(
            "Start scanning addresses. \nBatch size {}\nNumber of addresses {}\nTries {}\nTimeout {:?}",
            self.batch_size,
            addresses.size_hint().0,
            self.resolver.tries,
            self.resolver.timeout,
        );

        let results = self.stream(addresses).collect::<Vec<_>>().await;

        debug!(
            "Named hosts found: {}",
            results
                .iter()
                .filter(|r| matches!(r.outcome, ScanOutcome::Resolved(_)))
                .count()
        );
        results
    }
}
