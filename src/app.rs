//! Application bootstrap
//!
//! Declares the feature modules, wires their dependency graph, and runs
//! the post-load branch: resume an existing session or fall back to a
//! refresh attempt that lands on the login view. The API object of a
//! module is only reachable through `Module::ready`, so nothing can use
//! a module before its dependencies resolved.

use crate::clock::Clock;
use crate::config::Config;
use crate::files::Files;
use crate::gateway::Gateway;
use crate::keyring::Keyring;
use crate::luks::Luks;
use crate::messaging::Messaging;
use crate::modules::{join, Module, ModuleLoader};
use crate::notify::ViewSink;
use crate::session::{EventBus, EventKind, SessionContext, SessionManager};
use std::sync::Arc;

/// API object of the `ui` module: the installed view collaborator.
pub struct Ui {
    pub view: Arc<dyn ViewSink>,
}

/// Typed handles to every feature module.
pub struct Modules {
    pub ui: Module<Ui>,
    pub backend: Module<Gateway>,
    pub session: Module<SessionManager>,
    pub keyring: Module<Keyring>,
    pub luks: Module<Luks>,
    pub clock: Module<Clock>,
    pub messaging: Module<Messaging>,
    pub files: Module<Files>,
}

impl Modules {
    /// Readiness of the whole graph.
    pub fn all_ready(&self) -> crate::modules::Readiness {
        join(vec![
            self.ui.readiness(),
            self.backend.readiness(),
            self.session.readiness(),
            self.keyring.readiness(),
            self.luks.readiness(),
            self.clock.readiness(),
            self.messaging.readiness(),
            self.files.readiness(),
        ])
    }
}

pub struct App {
    pub session: SessionContext,
    pub bus: EventBus,
    pub modules: Modules,
    view: Arc<dyn ViewSink>,
}

impl App {
    /// Wires the module graph. The gateway is constructed eagerly so a
    /// bad server URL fails here instead of parking the whole graph.
    ///
    /// Load order: `ui` first; `backend` after `ui`; `session` after
    /// both; `keyring`, `luks`, `clock` after `session`; `messaging`
    /// additionally after `keyring`; `files` after `messaging`.
    pub fn bootstrap(config: &Config, view: Arc<dyn ViewSink>) -> anyhow::Result<App> {
        let session = SessionContext::new();
        let bus = EventBus::new(session.clone());
        let gateway = Gateway::new(&config.server, session.clone(), bus.clone())?;
        let loader = ModuleLoader::new(bus.clone());

        let modules = Modules {
            ui: Module::declare("ui"),
            backend: Module::declare("backend"),
            session: Module::declare("session"),
            keyring: Module::declare("keyring"),
            luks: Module::declare("luks"),
            clock: Module::declare("clock"),
            messaging: Module::declare("messaging"),
            files: Module::declare("files"),
        };

        {
            let bus = bus.clone();
            let view = Arc::clone(&view);
            loader.load(&modules.ui, Vec::new(), async move {
                bus.attach_view(Arc::clone(&view));
                Ok(Ui { view })
            });
        }

        loader.load(&modules.backend, vec![modules.ui.readiness()], async move {
            Ok(gateway)
        });

        {
            let backend = modules.backend.clone();
            let ui = modules.ui.clone();
            let session = session.clone();
            let bus = bus.clone();
            let poll_interval = config.status.poll_interval();
            loader.load(
                &modules.session,
                vec![modules.ui.readiness(), modules.backend.readiness()],
                async move {
                    let gateway = backend.ready().await;
                    let ui = ui.ready().await;
                    Ok(SessionManager::new(
                        gateway,
                        session,
                        bus,
                        Arc::clone(&ui.view),
                        poll_interval,
                    ))
                },
            );
        }

        let core_deps = || {
            vec![
                modules.ui.readiness(),
                modules.backend.readiness(),
                modules.session.readiness(),
            ]
        };

        {
            let backend = modules.backend.clone();
            let bus = bus.clone();
            loader.load(&modules.keyring, core_deps(), async move {
                Ok(Keyring::new(backend.ready().await, bus))
            });
        }
        {
            let backend = modules.backend.clone();
            let bus = bus.clone();
            loader.load(&modules.luks, core_deps(), async move {
                Ok(Luks::new(backend.ready().await, bus))
            });
        }
        {
            let backend = modules.backend.clone();
            let bus = bus.clone();
            loader.load(&modules.clock, core_deps(), async move {
                Ok(Clock::new(backend.ready().await, bus))
            });
        }
        {
            let mut deps = core_deps();
            deps.push(modules.keyring.readiness());
            let backend = modules.backend.clone();
            let bus = bus.clone();
            loader.load(&modules.messaging, deps, async move {
                Ok(Messaging::new(backend.ready().await, bus))
            });
        }
        {
            let mut deps = core_deps();
            deps.push(modules.keyring.readiness());
            deps.push(modules.messaging.readiness());
            let backend = modules.backend.clone();
            let bus = bus.clone();
            loader.load(&modules.files, deps, async move {
                Ok(Files::new(backend.ready().await, bus))
            });
        }

        Ok(App {
            session,
            bus,
            modules,
            view,
        })
    }

    pub fn view(&self) -> Arc<dyn ViewSink> {
        Arc::clone(&self.view)
    }

    /// Waits for the whole graph, then resumes an existing session or
    /// attempts a refresh. A refresh rejection ends on the login view
    /// through the normal event classification.
    pub async fn started(&self) {
        self.modules.all_ready().await;
        self.bus
            .emit(EventKind::Info, "[modules] application modules loaded");

        let manager = self.modules.session.ready().await;

        // Every session adoption pushes the client's time to the
        // appliance, whose clock does not survive a power cycle.
        let clock = self.modules.clock.ready().await;
        manager.set_opened_hook(Arc::new(move || {
            let clock = Arc::clone(&clock);
            tokio::spawn(async move {
                let _ = clock.sync().await;
            });
        }));

        if self.session.has_session() {
            self.view.show_browser();
            manager.resume().await;
        } else {
            let _ = manager.refresh().await;
        }
    }
}
