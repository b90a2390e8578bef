//! # Test Fixtures
//!
//! A [`Contexts`] set owns one [`MemoryNetwork`] and the buses bound to it,
//! so a scenario reads like the extension it models:
//!
//! ```rust,ignore
//! let contexts = Contexts::new();
//! let background = contexts.named("background");
//! let options = contexts.named("options");
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use switchboard::{Bus, BusConfig, MemoryHost, MemoryNetwork, MessageSender, TargetId};

/// Upper bound for any single await in a scenario.
pub const SCENARIO_TIMEOUT: Duration = Duration::from_secs(2);

/// Contexts sharing one in-memory network.
#[derive(Debug, Default)]
pub struct Contexts {
    network: MemoryNetwork,
    config: BusConfig,
}

impl Contexts {
    /// Contexts using [`BusConfig::for_testing`].
    pub fn new() -> Self {
        Self::with_config(BusConfig::for_testing())
    }

    /// Contexts sharing `config`.
    pub fn with_config(config: BusConfig) -> Self {
        switchboard_telemetry::init_test_logging();
        Self {
            network: MemoryNetwork::new(),
            config,
        }
    }

    /// The underlying network.
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    /// Bus for the context `name`, bound and reachable.
    pub fn named(&self, name: &str) -> Bus {
        self.bind(self.network.host(name))
    }

    /// Bus for the content script of tab `tab_id`, bound and reachable.
    pub fn tab(&self, tab_id: i64) -> Bus {
        self.bind(self.network.tab_host(tab_id))
    }

    /// Bus for `name` that other contexts cannot connect to.
    pub fn unbound(&self, name: &str) -> (Bus, Arc<MemoryHost>) {
        let host = self.network.host(name);
        let bus = Bus::new(host.clone(), self.config.clone()).unwrap();
        (bus, host)
    }

    fn bind(&self, host: Arc<MemoryHost>) -> Bus {
        let bus = Bus::new(host.clone(), self.config.clone()).unwrap();
        host.bind(&bus);
        bus
    }
}

/// Await `future`, failing the test if it takes longer than
/// [`SCENARIO_TIMEOUT`].
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(SCENARIO_TIMEOUT, future)
        .await
        .expect("scenario step timed out")
}

/// Let spawned listener tasks run.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Target for the context `name`.
pub fn name(name: &str) -> TargetId {
    TargetId::name(name)
}

/// Sender as seen by a listener for a message from `name`.
pub fn from(name: &str) -> MessageSender {
    MessageSender::new(TargetId::name(name), Some(TargetId::name(name)))
}

/// Shared log of what a listener saw.
pub type Seen<T> = Arc<parking_lot::Mutex<Vec<T>>>;

/// Empty [`Seen`] log.
pub fn seen<T>() -> Seen<T> {
    Arc::new(parking_lot::Mutex::new(Vec::new()))
}
