use std::sync::Arc;

use anyhow::Context;
use engine_logging::{engine_info, engine_warn};
use sifter_engine::{ContextHandle, ContextId, FileStore, HttpBackend, Origin, Services, SifterSettings};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::commands::{parse_command, Command, HELP};
use crate::config::AppConfig;
use crate::render;

/// Contexts sharing one origin, plus which one receives commands.
struct Console {
    origin: Origin,
    services: Services,
    settings: SifterSettings,
    contexts: Vec<ContextHandle>,
    active: usize,
}

impl Console {
    fn open_context(&mut self) -> ContextId {
        let handle = ContextHandle::open(&self.origin, self.services.clone(), self.settings.clone());
        let id = handle.id();
        let mut rx = handle.subscribe();
        let line = render::summary(id, &rx.borrow_and_update());
        println!("{line}");
        tokio::spawn(print_snapshots(id, rx));
        self.contexts.push(handle);
        self.active = self.contexts.len() - 1;
        id
    }

    fn active(&self) -> Option<&ContextHandle> {
        self.contexts.get(self.active)
    }

    /// Returns `false` once the console should exit.
    async fn execute(&mut self, command: Command) -> bool {
        match command {
            Command::Open => {
                let id = self.open_context();
                println!("context {id} is active");
            }
            Command::Use(id) => match self.contexts.iter().position(|c| c.id() == id) {
                Some(index) => {
                    self.active = index;
                    println!("context {id} is active");
                }
                None => println!("no context {id}"),
            },
            Command::Close => {
                if self.contexts.is_empty() {
                    println!("no open context");
                } else {
                    let handle = self.contexts.remove(self.active);
                    let id = handle.id();
                    handle.close().await;
                    self.active = self.contexts.len().saturating_sub(1);
                    println!("context {id} closed");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
            command => match self.active() {
                Some(ctx) => dispatch(ctx, command),
                None => println!("no open context, use `open`"),
            },
        }
        true
    }

    async fn shutdown(self) {
        for handle in self.contexts {
            handle.close().await;
        }
    }
}

fn dispatch(ctx: &ContextHandle, command: Command) {
    match command {
        Command::Set(field) => ctx.set_field(field),
        Command::Query => ctx.run_query(),
        Command::Job => ctx.start_job(),
        Command::Cancel => ctx.cancel_job(),
        Command::Select(key) => ctx.select(key),
        Command::Show => println!("{}", render::detail(ctx.id(), &ctx.snapshot())),
        Command::Open | Command::Use(_) | Command::Close | Command::Help | Command::Quit => {}
    }
}

async fn print_snapshots(id: ContextId, mut rx: watch::Receiver<sifter_core::SessionState>) {
    while rx.changed().await.is_ok() {
        let line = render::summary(id, &rx.borrow_and_update());
        println!("{line}");
    }
}

/// Runs the console until `quit` or end of input.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&config.backend_settings())
        .with_context(|| format!("invalid backend url {:?}", config.base_url))?;
    let origin = Origin::new(Arc::new(FileStore::new(&config.state_dir)));
    engine_info!(
        "Starting with backend {} and state dir {:?}",
        config.base_url,
        config.state_dir
    );

    let mut console = Console {
        origin,
        services: Services::single(Arc::new(backend)),
        settings: config.sifter_settings(),
        contexts: Vec::new(),
        active: 0,
    };
    console.open_context();
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        match parse_command(&line) {
            Ok(Some(command)) => {
                if !console.execute(command).await {
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => {
                engine_warn!("Rejected command {:?}: {}", line, err);
                println!("error: {err:#}");
            }
        }
    }

    console.shutdown().await;
    engine_info!("Console exited");
    Ok(())
}
