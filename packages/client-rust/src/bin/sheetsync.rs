//! `sheetsync` command-line client.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use sheetsync_client::{ClientConfig, ClientRuntime, SyncEvent, SyncOutcome};
use sheetsync_core::{ColumnType, NewColumn, Table};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sheetsync")]
#[command(about = "Dashboard tables synced from Google Sheets")]
struct Cli {
    /// Server API base URL.
    #[arg(long, global = true, env = "SHEETSYNC_API_URL", default_value = "http://localhost:5500/api/v1")]
    api_url: String,
    /// Directory for tables, sync preferences and the session.
    #[arg(long, global = true, env = "SHEETSYNC_DATA_DIR", default_value = ".sheetsync")]
    data_dir: PathBuf,
    /// Sheet (tab) whose values are synced.
    #[arg(long, global = true, env = "SHEETSYNC_SHEET_NAME", default_value = "Sheet1")]
    sheet_name: String,
    /// Per-request timeout in seconds.
    #[arg(long, global = true, env = "SHEETSYNC_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account and log in.
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "SHEETSYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log in with an existing account.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SHEETSYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session.
    Logout,
    /// List tables.
    Tables,
    /// Create a table; its columns are filled from the sheet.
    Create {
        name: String,
        /// Column as `Name` or `Name:date`. Repeatable.
        #[arg(long = "column", value_parser = parse_column)]
        columns: Vec<NewColumn>,
    },
    /// Append a dashboard-only column.
    AddColumn {
        table: String,
        name: String,
        #[arg(long)]
        date: bool,
    },
    /// Print a table's rows and make it current.
    Show { table: String },
    /// Bind a table to a spreadsheet and sync it once.
    Connect { table: String, sheet_id: String },
    /// Sync a connected table now.
    Refresh { table: String },
    /// Enable polling and print sync events.
    Watch {
        /// Table to enable; omitted, only previously enabled tables poll.
        table: Option<String>,
        /// Stop after this many seconds instead of waiting for Ctrl-C.
        #[arg(long)]
        for_secs: Option<u64>,
    },
    /// Disable polling for a table.
    Unwatch { table: String },
}

fn parse_column(raw: &str) -> Result<NewColumn, String> {
    match raw.rsplit_once(':') {
        Some((name, kind)) => {
            let column_type = match kind.to_ascii_lowercase().as_str() {
                "date" => ColumnType::Date,
                "text" => ColumnType::Text,
                other => return Err(format!("unknown column type {other:?}")),
            };
            Ok(NewColumn {
                name: name.to_string(),
                column_type,
            })
        }
        None => Ok(NewColumn::text(raw)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ClientConfig {
        api_base_url: cli.api_url,
        data_dir: cli.data_dir,
        request_timeout: Duration::from_secs(cli.timeout_secs),
        sheet_name: cli.sheet_name,
        ..ClientConfig::default()
    };
    let rt = ClientRuntime::open(&config)?;

    match cli.command {
        Command::Signup {
            name,
            email,
            password,
        } => {
            let user = rt.auth.signup(&name, &email, &password).await?;
            println!("signed up as {} <{}>", user.name, user.email);
        }
        Command::Login { email, password } => {
            let user = rt.auth.login(&email, &password).await?;
            println!("logged in as {} <{}>", user.name, user.email);
        }
        Command::Logout => {
            rt.auth.logout();
            println!("logged out");
        }
        Command::Tables => {
            for table in rt.store.tables() {
                let sync = if rt.engine.is_enabled(&table.id) { "on" } else { "off" };
                println!(
                    "{}  {}  sheet={}  rows={}  sync={sync}",
                    table.id,
                    table.name,
                    table.google_sheet_id.as_deref().unwrap_or("-"),
                    table.rows.len(),
                );
            }
        }
        Command::Create { name, columns } => {
            let table = rt.store.create(&name, columns)?;
            println!("created {} ({})", table.name, table.id);
        }
        Command::AddColumn { table, name, date } => {
            let table = resolve(&rt, &table)?;
            let column = if date {
                NewColumn::date(name)
            } else {
                NewColumn::text(name)
            };
            rt.store.add_column(&table.id, column)?;
            println!("column added to {}", table.name);
        }
        Command::Show { table } => {
            let table = resolve(&rt, &table)?;
            let table = rt.engine.select(&table.id)?;
            print_table(&table);
        }
        Command::Connect { table, sheet_id } => {
            let table = resolve(&rt, &table)?;
            let table = rt.engine.connect(&table.id, &sheet_id).await?;
            println!("connected {} to {sheet_id}: {} rows", table.name, table.rows.len());
        }
        Command::Refresh { table } => {
            let table = resolve(&rt, &table)?;
            let table = rt.engine.refresh(&table.id).await?;
            println!("refreshed {}: {} rows", table.name, table.rows.len());
        }
        Command::Watch { table, for_secs } => {
            let mut events = rt.engine.subscribe();
            if let Some(table) = table {
                let table = resolve(&rt, &table)?;
                rt.engine.enable(&table.id)?;
            }
            rt.engine.resume();
            if !rt.store.tables().iter().any(|t| rt.engine.is_enabled(&t.id)) {
                return Err(anyhow!("no table has polling enabled"));
            }
            let deadline = async {
                match for_secs {
                    Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                    None => {
                        let _ = tokio::signal::ctrl_c().await;
                    }
                }
            };
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    () = &mut deadline => break,
                    event = events.recv() => match event {
                        Ok(event) => print_event(&rt, &event),
                        Err(RecvError::Lagged(n)) => eprintln!("skipped {n} events"),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            rt.engine.shutdown().await;
        }
        Command::Unwatch { table } => {
            let table = resolve(&rt, &table)?;
            rt.engine.disable(&table.id);
            println!("polling disabled for {}", table.name);
        }
    }
    Ok(())
}

fn resolve(rt: &ClientRuntime, reference: &str) -> anyhow::Result<std::sync::Arc<Table>> {
    rt.store
        .resolve(reference)
        .with_context(|| format!("no table named or with id {reference:?}"))
}

fn print_table(table: &Table) {
    let headers: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    println!("{}", headers.join("\t"));
    for row in &table.rows {
        let cells: Vec<&str> = table
            .columns
            .iter()
            .map(|c| row.get(&c.key()).map_or("", String::as_str))
            .collect();
        println!("{}", cells.join("\t"));
    }
}

fn print_event(rt: &ClientRuntime, event: &SyncEvent) {
    let name = rt
        .store
        .find(&event.table_id)
        .map_or_else(|| event.table_id.to_string(), |t| t.name.clone());
    let next = event
        .next_interval
        .map_or_else(|| "-".to_string(), |d| format!("{}ms", d.as_millis()));
    match &event.outcome {
        SyncOutcome::Failed(e) => println!("{name}: failed ({e}), next in {next}"),
        outcome => println!("{name}: {outcome:?}, next in {next}"),
    }
}
