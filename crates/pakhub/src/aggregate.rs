use std::sync::Arc;

use futures_util::FutureExt as _;
use futures_util::future::{BoxFuture, join_all};
use log::{debug, warn};
use thiserror::Error;

use pakhub_backend::{
    BackendError, GemStatus, ManagerCapabilities, Mutation, Package, SoftwareManager,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    pub gem: &'static str,
    pub error: BackendError,
}

/// Merged result of a read fan-out. Items keep backend order, then each
/// backend's own order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOut<T> {
    pub items: Vec<T>,
    pub failures: Vec<BackendFailure>,
}

impl<T> Default for FanOut<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> FanOut<T> {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("no enabled gem handles packages from '{origin}'")]
    NoBackendForOrigin { origin: String },
    #[error("{gem} does not support {operation}")]
    Unsupported {
        gem: &'static str,
        operation: &'static str,
    },
    #[error("{gem} failed: {source}")]
    Backend {
        gem: &'static str,
        #[source]
        source: BackendError,
    },
}

/// All loaded managers behind one interface.
pub struct AggregateManager {
    managers: Vec<Arc<dyn SoftwareManager>>,
}

impl AggregateManager {
    #[must_use]
    pub fn new(managers: Vec<Arc<dyn SoftwareManager>>) -> Self {
        Self { managers }
    }

    /// Every loaded manager, disabled ones included.
    #[must_use]
    pub fn managers(&self) -> &[Arc<dyn SoftwareManager>] {
        &self.managers
    }

    #[must_use]
    pub fn active_names(&self) -> Vec<&'static str> {
        self.active().map(|manager| manager.name()).collect()
    }

    #[must_use]
    pub fn gem_statuses(&self) -> Vec<GemStatus> {
        self.managers
            .iter()
            .map(|manager| GemStatus {
                name: manager.name(),
                enabled: manager.is_enabled(),
                default_enabled: manager.is_default_enabled(),
            })
            .collect()
    }

    fn active(&self) -> impl Iterator<Item = &Arc<dyn SoftwareManager>> {
        self.managers.iter().filter(|manager| manager.is_enabled())
    }

    async fn fan_out<'a, T, F>(
        &'a self,
        operation: &'static str,
        accepts: fn(ManagerCapabilities) -> bool,
        call: F,
    ) -> FanOut<T>
    where
        F: Fn(&'a dyn SoftwareManager) -> BoxFuture<'a, Result<Vec<T>, BackendError>>,
    {
        let active: Vec<&'a Arc<dyn SoftwareManager>> = self
            .active()
            .filter(|manager| accepts(manager.capabilities()))
            .collect();
        debug!("Fanning {operation} out to {} gems", active.len());

        let results = join_all(active.iter().map(|&manager| call(&**manager))).await;

        let mut merged = FanOut::default();
        for (manager, result) in active.iter().zip(results) {
            match result {
                Ok(items) => merged.items.extend(items),
                Err(error) => {
                    if error.is_transient() {
                        warn!(
                            "{} failed during {operation}, may recover: {error}",
                            manager.name()
                        );
                    } else {
                        warn!("{} failed during {operation}: {error}", manager.name());
                    }
                    merged.failures.push(BackendFailure {
                        gem: manager.name(),
                        error,
                    });
                }
            }
        }
        merged
    }

    /// Gems that do not declare search support are left out.
    pub async fn search(&self, query: &str) -> FanOut<Package> {
        self.fan_out(
            "search",
            |capabilities| capabilities.supports_search,
            |manager| manager.search(query),
        )
        .await
    }

    pub async fn list_installed(&self) -> FanOut<Package> {
        self.fan_out("list_installed", any_gem, |manager| manager.list_installed())
            .await
    }

    pub async fn list_updates(&self) -> FanOut<Package> {
        self.fan_out("list_updates", any_gem, |manager| manager.list_updates())
            .await
    }

    /// Warm every enabled gem up. Items are the gems that prepared
    /// successfully.
    pub async fn prepare(&self) -> FanOut<&'static str> {
        self.fan_out("prepare", any_gem, |manager| {
            async move { manager.prepare().await.map(|()| vec![manager.name()]) }.boxed()
        })
        .await
    }

    /// The enabled gem owning `origin`, provided it declares `mutation`.
    fn route(
        &self,
        origin: &str,
        mutation: Mutation,
    ) -> Result<&Arc<dyn SoftwareManager>, AggregateError> {
        let manager = self
            .active()
            .find(|manager| manager.handles_origin(origin))
            .ok_or_else(|| AggregateError::NoBackendForOrigin {
                origin: origin.to_string(),
            })?;
        if !manager.capabilities().allows(mutation) {
            return Err(AggregateError::Unsupported {
                gem: manager.name(),
                operation: mutation.as_str(),
            });
        }
        Ok(manager)
    }

    async fn mutate(&self, package: &Package, mutation: Mutation) -> Result<(), AggregateError> {
        let manager = self.route(&package.origin, mutation)?;
        debug!("Routing {} of {} to {}", mutation.as_str(), package.id, manager.name());
        let result = match mutation {
            Mutation::Install => manager.install(package).await,
            Mutation::Uninstall => manager.uninstall(package).await,
            Mutation::Upgrade => manager.upgrade(package).await,
        };
        result.map_err(|source| AggregateError::Backend {
            gem: manager.name(),
            source,
        })
    }

    pub async fn install(&self, package: &Package) -> Result<(), AggregateError> {
        self.mutate(package, Mutation::Install).await
    }

    pub async fn uninstall(&self, package: &Package) -> Result<(), AggregateError> {
        self.mutate(package, Mutation::Uninstall).await
    }

    pub async fn upgrade(&self, package: &Package) -> Result<(), AggregateError> {
        self.mutate(package, Mutation::Upgrade).await
    }
}

fn any_gem(_: ManagerCapabilities) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use pakhub_backend::{BackendError, ManagerCapabilities, Package, SoftwareManager};

    use super::{AggregateError, AggregateManager};

    struct FakeManager {
        name: &'static str,
        enabled: bool,
        delay: Duration,
        capabilities: ManagerCapabilities,
        results: Result<Vec<&'static str>, BackendError>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeManager {
        fn new(name: &'static str, results: Result<Vec<&'static str>, BackendError>) -> Self {
            Self {
                name,
                enabled: true,
                delay: Duration::ZERO,
                capabilities: ManagerCapabilities {
                    supports_search: true,
                    supports_install: true,
                    supports_uninstall: true,
                    supports_upgrade: true,
                },
                results,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn disabled(mut self) -> Self {
            self.enabled = false;
            self
        }

        fn with_capabilities(mut self, capabilities: ManagerCapabilities) -> Self {
            self.capabilities = capabilities;
            self
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn packages(&self) -> Result<Vec<Package>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results.clone().map(|ids| {
                ids.into_iter()
                    .map(|id| Package::new(self.name, id).installed(true))
                    .collect()
            })
        }
    }

    #[async_trait]
    impl SoftwareManager for FakeManager {
        fn name(&self) -> &'static str {
            self.name
        }

        fn capabilities(&self) -> ManagerCapabilities {
            self.capabilities
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }

        fn is_default_enabled(&self) -> bool {
            true
        }

        async fn prepare(&self) -> Result<(), BackendError> {
            self.packages().map(|_| ())
        }

        async fn search(&self, _query: &str) -> Result<Vec<Package>, BackendError> {
            tokio::time::sleep(self.delay).await;
            self.packages()
        }

        async fn list_installed(&self) -> Result<Vec<Package>, BackendError> {
            self.packages()
        }

        async fn install(&self, _package: &Package) -> Result<(), BackendError> {
            self.packages().map(|_| ())
        }

        async fn uninstall(&self, _package: &Package) -> Result<(), BackendError> {
            self.packages().map(|_| ())
        }
    }

    fn ids(packages: &[Package]) -> Vec<&str> {
        packages.iter().map(|package| package.id.as_str()).collect()
    }

    fn aggregate(managers: Vec<FakeManager>) -> AggregateManager {
        AggregateManager::new(
            managers
                .into_iter()
                .map(|manager| Arc::new(manager) as Arc<dyn SoftwareManager>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn search_merges_in_declaration_order_not_completion_order() {
        let manager = aggregate(vec![
            FakeManager::new("slow", Ok(vec!["s1", "s2"])).delayed(Duration::from_millis(30)),
            FakeManager::new("fast", Ok(vec!["f1"])),
        ]);

        let result = manager.search("anything").await;

        assert_eq!(ids(&result.items), vec!["s1", "s2", "f1"]);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn failing_backend_is_isolated_and_reported() {
        let manager = aggregate(vec![
            FakeManager::new("a", Ok(vec!["a1"])),
            FakeManager::new(
                "b",
                Err(BackendError::Timeout {
                    after: Duration::from_secs(60),
                }),
            ),
            FakeManager::new("c", Ok(vec!["c1"])),
        ]);

        let result = manager.list_installed().await;

        assert_eq!(ids(&result.items), vec!["a1", "c1"]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].gem, "b");
        assert!(result.failures[0].error.is_transient());
    }

    #[tokio::test]
    async fn disabled_backends_are_never_called() {
        let disabled = FakeManager::new("off", Ok(vec!["x"])).disabled();
        let calls = Arc::clone(&disabled.calls);
        let manager = aggregate(vec![FakeManager::new("on", Ok(vec!["y"])), disabled]);

        let search = manager.search("x").await;
        let prepared = manager.prepare().await;
        let installed = manager.list_installed().await;

        assert_eq!(ids(&search.items), vec!["y"]);
        assert_eq!(prepared.items, vec!["on"]);
        assert_eq!(ids(&installed.items), vec!["y"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.active_names(), vec!["on"]);
        assert_eq!(manager.managers().len(), 2);
    }

    #[tokio::test]
    async fn list_updates_uses_backend_defaults() {
        let manager = aggregate(vec![FakeManager::new("a", Ok(vec!["a1"]))]);

        let result = manager.list_updates().await;

        assert!(result.items.is_empty());
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn mutations_route_to_the_origin_backend() {
        let first = FakeManager::new("first", Ok(Vec::new()));
        let second = FakeManager::new("second", Ok(Vec::new()));
        let first_calls = Arc::clone(&first.calls);
        let second_calls = Arc::clone(&second.calls);
        let manager = aggregate(vec![first, second]);

        manager
            .install(&Package::new("second", "pkg"))
            .await
            .expect("install routes to second");
        manager
            .uninstall(&Package::new("second", "pkg"))
            .await
            .expect("uninstall routes to second");

        assert_eq!(first_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn routing_errors_are_explicit() {
        let manager = aggregate(vec![
            FakeManager::new("on", Ok(Vec::new())),
            FakeManager::new("off", Ok(Vec::new())).disabled(),
        ]);

        assert_eq!(
            manager.install(&Package::new("unknown", "pkg")).await,
            Err(AggregateError::NoBackendForOrigin {
                origin: "unknown".to_string()
            })
        );
        assert_eq!(
            manager.install(&Package::new("off", "pkg")).await,
            Err(AggregateError::NoBackendForOrigin {
                origin: "off".to_string()
            })
        );
        assert_eq!(
            manager.upgrade(&Package::new("on", "pkg")).await,
            Err(AggregateError::Backend {
                gem: "on",
                source: BackendError::unsupported("upgrade"),
            })
        );
    }

    #[tokio::test]
    async fn declared_capabilities_gate_search_and_mutations() {
        let read_only = FakeManager::new("catalog", Ok(vec!["c1"])).with_capabilities(
            ManagerCapabilities {
                supports_search: true,
                ..ManagerCapabilities::default()
            },
        );
        let no_search = FakeManager::new("local", Ok(vec!["l1"])).with_capabilities(
            ManagerCapabilities {
                supports_install: true,
                ..ManagerCapabilities::default()
            },
        );
        let catalog_calls = Arc::clone(&read_only.calls);
        let local_calls = Arc::clone(&no_search.calls);
        let manager = aggregate(vec![read_only, no_search]);

        let search = manager.search("x").await;
        assert_eq!(ids(&search.items), vec!["c1"]);
        assert_eq!(local_calls.load(Ordering::SeqCst), 0);

        let installed = manager.list_installed().await;
        assert_eq!(ids(&installed.items), vec!["c1", "l1"]);

        assert_eq!(
            manager.upgrade(&Package::new("catalog", "pkg")).await,
            Err(AggregateError::Unsupported {
                gem: "catalog",
                operation: "upgrade",
            })
        );
        assert_eq!(
            manager.install(&Package::new("catalog", "pkg")).await,
            Err(AggregateError::Unsupported {
                gem: "catalog",
                operation: "install",
            })
        );
        assert_eq!(catalog_calls.load(Ordering::SeqCst), 2);

        manager
            .install(&Package::new("local", "pkg"))
            .await
            .expect("install routes to local");
        assert_eq!(local_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn gem_statuses_cover_disabled_managers() {
        let manager = aggregate(vec![
            FakeManager::new("on", Ok(Vec::new())),
            FakeManager::new("off", Ok(Vec::new())).disabled(),
        ]);

        let statuses = manager.gem_statuses();

        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].enabled);
        assert_eq!(statuses[1].name, "off");
        assert!(!statuses[1].enabled);
        assert!(statuses[1].default_enabled);
    }
}
