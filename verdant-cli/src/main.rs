//! Verdant: live terminal client for a product-structure project.
//!
//! Loads the project graph, follows the server's live updates, and takes
//! edit, undo and redo commands on stdin. Set `RUST_LOG=debug` for channel
//! and applier diagnostics.

mod command;
mod view;

use anyhow::{bail, Context};
use clap::Parser;
use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};
use verdant_collab::{project_from_link, ProjectId, Session, SyncConfig};
use verdant_core::DEFAULT_HISTORY_LIMIT;

use command::{Command, Target, HELP};

#[derive(Parser, Debug)]
#[command(name = "verdant")]
#[command(version, about, long_about = None)]
struct Args {
    /// API root; the live socket is derived from it
    #[arg(long, env = "VERDANT_SERVER", default_value = "http://127.0.0.1:8000")]
    server: String,

    /// Project to open
    #[arg(short, long, env = "VERDANT_PROJECT")]
    project: Option<ProjectId>,

    /// A link carrying `?project=<id>`; wins over --project
    #[arg(long)]
    link: Option<String>,

    /// Undo checkpoints to keep
    #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    history_limit: usize,

    /// Consecutive failed reconnects before live updates stop
    #[arg(long, default_value_t = 8)]
    max_attempts: u32,
}

impl Args {
    fn project_id(&self) -> anyhow::Result<ProjectId> {
        match (&self.link, self.project) {
            (Some(link), _) => Ok(project_from_link(link)?),
            (None, Some(project)) => Ok(project),
            (None, None) => bail!("no project given: pass --project, --link or set VERDANT_PROJECT"),
        }
    }

    fn config(&self) -> SyncConfig {
        let mut config = SyncConfig::new(self.server.clone());
        config.history_limit = self.history_limit;
        config.reconnect.max_attempts = self.max_attempts;
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let project = args.project_id()?;
    let session =
        Session::start(args.config(), project).context("could not start the session")?;
    info!("opening project {project} on {}", args.server);
    println!("{HELP}");

    let mut state = session.state();
    let mut status = session.status();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", view::status_line(&status.borrow_and_update()));
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", view::summary(&state.borrow_and_update()));
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        if let Err(e) = run(&session, command).await {
                            eprintln!("error: {e}");
                        }
                    }
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
    }

    session.close().await;
    Ok(())
}

async fn run(session: &Session, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Show => println!("{}", view::render(&session.snapshot())),
        Command::Help => println!("{HELP}"),
        Command::Score => {
            let graph = session.snapshot();
            println!(
                "material weight {:.2} · sustainability score {:.3}",
                graph.material_weight(),
                graph.sustainability_score()
            );
        }
        Command::Parents(level) => {
            let graph = session.snapshot();
            let candidates = graph.parent_candidates(level);
            if candidates.is_empty() {
                println!("no candidates for level {level}");
            }
            for node in candidates {
                println!("{}", view::node_line(node));
            }
        }
        Command::Node(draft) => {
            let node = session.create_node(draft).await?;
            println!("created node #{}", node.id);
        }
        Command::Material(draft) => {
            let material = session.create_material(draft).await?;
            println!("created material #{}", material.id);
        }
        Command::Link(draft) => {
            let edge = session.create_relation(draft).await?;
            println!("created relation #{}", edge.id);
        }
        Command::Remove(Target::Node, id) => session.delete_node(id).await?,
        Command::Remove(Target::Material, id) => session.delete_material(id).await?,
        Command::Remove(Target::Link, id) => session.delete_relation(id).await?,
        Command::Undo => {
            if !session.undo().await? {
                println!("nothing to undo");
            }
        }
        Command::Redo => {
            if !session.redo().await? {
                println!("nothing to redo");
            }
        }
        Command::Quit => {}
    }
    Ok(())
}
