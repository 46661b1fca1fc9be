//! Dependency-ordered module initialization
//!
//! Every module is declared up front as a typed handle; its init runs
//! behind the join of its dependencies' readiness futures. A failed init
//! reports a critical event and leaves the handle unresolved forever,
//! which parks every transitive dependent. The only way to reach a
//! module's API object is through [`Module::ready`], so using a module
//! before its dependencies is structurally impossible.

use crate::session::{EventBus, EventKind};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Type-erased readiness future, used in dependency lists.
pub type Readiness = BoxFuture<'static, ()>;

/// Typed handle to a module's eventual API object.
pub struct Module<T> {
    name: &'static str,
    tx: Arc<watch::Sender<Option<Arc<T>>>>,
    rx: watch::Receiver<Option<Arc<T>>>,
}

impl<T> Clone for Module<T> {
    fn clone(&self) -> Self {
        Module {
            name: self.name,
            tx: Arc::clone(&self.tx),
            rx: self.rx.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Module<T> {
    /// Declares a module that has not loaded yet.
    pub fn declare(name: &'static str) -> Module<T> {
        let (tx, rx) = watch::channel(None);
        Module {
            name,
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Resolves to the module's API object once init succeeded. Never
    /// resolves if the module failed to load.
    pub fn ready(&self) -> impl Future<Output = Arc<T>> + Send + 'static {
        let mut rx = self.rx.clone();
        async move {
            loop {
                let loaded = rx
                    .wait_for(|slot| slot.is_some())
                    .await
                    .map(|slot| slot.as_ref().map(Arc::clone));
                match loaded {
                    Ok(Some(api)) => return api,
                    Ok(None) => {}
                    Err(_) => std::future::pending::<()>().await,
                }
            }
        }
    }

    /// Type-erased readiness, for dependency lists.
    pub fn readiness(&self) -> Readiness {
        let ready = self.ready();
        async move {
            let _ = ready.await;
        }
        .boxed()
    }

    /// The API object, if the module already loaded.
    pub fn get(&self) -> Option<Arc<T>> {
        self.rx.borrow().clone()
    }
}

/// Joins a set of readiness futures into one that fires exactly once,
/// when the last of them has resolved.
pub fn join(deps: Vec<Readiness>) -> Readiness {
    async move {
        futures::future::join_all(deps).await;
    }
    .boxed()
}

/// Spawns module init tasks gated on their dependencies.
pub struct ModuleLoader {
    bus: EventBus,
}

impl ModuleLoader {
    pub fn new(bus: EventBus) -> ModuleLoader {
        ModuleLoader { bus }
    }

    /// Schedules `init` for `module`: all of `deps` must resolve first.
    /// On success the handle resolves for every waiter; on failure a
    /// critical event is raised and the handle stays pending.
    pub fn load<T, F>(&self, module: &Module<T>, deps: Vec<Readiness>, init: F)
    where
        T: Send + Sync + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let name = module.name;
        let tx = Arc::clone(&module.tx);
        let bus = self.bus.clone();
        tokio::spawn(async move {
            futures::future::join_all(deps).await;
            match init.await {
                Ok(api) => {
                    let _ = tx.send(Some(Arc::new(api)));
                    tracing::debug!(target: "lockbox::modules", "module {name} loaded");
                }
                Err(err) => {
                    bus.emit(
                        EventKind::Critical,
                        format!("[modules.{name}] failed to load module: {err:#}"),
                    );
                }
            }
        });
    }
}
