use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use hashspace_core::core::config::BackendKind;
use hashspace_core::history::{CausalHistoryAgent, ObjectPacker, StateSyncAgent};
use hashspace_core::mutable::MutableObject;
use hashspace_core::{Config, Hash, HashedObject, Keyring, KnownObject, LiteralContext, Store};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "hashspace-node")]
#[command(about = "Inspect, verify and pack hashspace literal contexts")]
struct Cli {
    /// Storage backend, overriding the config file.
    #[arg(long)]
    backend: Option<BackendKind>,

    /// SQLite database file, overriding the config file.
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store every literal of a context file.
    Import { file: PathBuf },
    /// Write the closure of a stored object as a context file.
    Export {
        hash: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Check hashes, signatures and validation of every root of a context file.
    Verify { file: PathBuf },
    /// Pack the closure of a stored object under an object budget.
    Pack {
        hash: String,
        #[arg(long)]
        max_objects: Option<usize>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print the causal history state of a stored mutable object.
    State { hash: String },
    /// Follow the causal history state of a stored mutable object.
    Watch { hash: String },
    /// Print a stored object of a known class.
    Show { hash: String },
    /// Replay every stored op of a set and print its elements.
    Values { hash: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hashspace_node=info,hashspace_core=info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load().await?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(database) = cli.database {
        config.database = Some(database);
    }

    let store = Store::open(&config, Arc::new(Keyring::new())).await?;

    match cli.command {
        Command::Import { file } => {
            let context = read_context(&file).await?;
            let stored = store.receive_literals(&context).await?;
            info!(file = %file.display(), literals = context.len(), stored, "imported");
            println!("{stored} new of {} literals", context.len());
        }
        Command::Export { hash, out } => {
            let hash = Hash::parse(&hash)?;
            let context = store
                .load_literal_context(&hash)
                .await?
                .with_context(|| format!("{hash} is not stored"))?;
            write_output(&context, out).await?;
        }
        Command::Verify { file } => {
            let context = read_context(&file).await?;
            context.check_hashes()?;
            let mut failed = 0usize;
            for root in &context.root_hashes {
                match KnownObject::decode(root, &context) {
                    Ok(object) => println!("ok      {} {}", root, object.class_name()),
                    Err(e) => {
                        failed += 1;
                        warn!(root = %root.short(), error = %e, "root failed verification");
                        println!("FAILED  {root} {e}");
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} roots failed", context.root_hashes.len());
            }
        }
        Command::Pack {
            hash,
            max_objects,
            out,
        } => {
            let hash = Hash::parse(&hash)?;
            let max_objects = max_objects.unwrap_or(config.max_objects);
            let mut packer = ObjectPacker::new(store.clone());
            if !packer.try_to_add_object_with_deps(&hash, max_objects).await? {
                bail!("closure of {hash} exceeds {max_objects} objects");
            }
            info!(root = %hash.short(), literals = packer.len(), "packed");
            write_output(&packer.into_context(), out).await?;
        }
        Command::State { hash } => {
            let hash = Hash::parse(&hash)?;
            let agent = CausalHistoryAgent::new(store.clone(), hash);
            let state = agent.get_stored_state().await?;
            println!("state   {}", state.hash());
            for header in state.terminal_op_headers() {
                println!(
                    "op      {} height {} prev {}",
                    header.op_hash(),
                    header.height(),
                    header.prev_op_headers().count()
                );
            }
        }
        Command::Watch { hash } => {
            let hash = Hash::parse(&hash)?;
            let agent = Arc::new(CausalHistoryAgent::new(store.clone(), hash));
            let mut states = agent.watch_stored_state();
            let task = agent.clone().spawn(Duration::from_millis(config.refresh_ms.max(1)));
            loop {
                tokio::select! {
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if let Some(state) = states.borrow_and_update().as_ref() {
                            println!("state   {} terminal {}", state.hash(), state.terminal_ops().count());
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            task.abort();
        }
        Command::Values { hash } => {
            let hash = Hash::parse(&hash)?;
            let object = store
                .load_any(&hash)
                .await?
                .with_context(|| format!("{hash} is not stored"))?;
            let (values, pending) = match object {
                KnownObject::MutableSet(mut set) => {
                    set.op_log_mut().set_pending_limit(config.pending_limit);
                    store.load_all_changes(&mut set).await?;
                    (set.values().into_iter().cloned().collect::<Vec<_>>(), set.pending_count())
                }
                KnownObject::PermissionedSet(mut set) => {
                    set.op_log_mut().set_pending_limit(config.pending_limit);
                    set.load_all_changes(&store).await?;
                    (set.values().into_iter().cloned().collect::<Vec<_>>(), set.pending_count())
                }
                other => bail!("{hash} is a {}, not a set", other.class_name()),
            };
            for value in values {
                println!("{value}");
            }
            if pending > 0 {
                warn!(set = %hash.short(), pending, "ops still wait for dependencies");
            }
        }
        Command::Show { hash } => {
            let hash = Hash::parse(&hash)?;
            let object = store
                .load_any(&hash)
                .await?
                .with_context(|| format!("{hash} is not stored"))?;
            println!("{object:#?}");
        }
    }
    Ok(())
}

async fn read_context(file: &PathBuf) -> anyhow::Result<LiteralContext> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    Ok(LiteralContext::from_json(&text)?)
}

async fn write_output(context: &LiteralContext, out: Option<PathBuf>) -> anyhow::Result<()> {
    let json = context.to_json()?;
    match out {
        Some(path) => tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
