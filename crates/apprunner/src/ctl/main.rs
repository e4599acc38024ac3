//! apprunnerctl - contract client for the application runtime.
//!
//! Plays the part of an embedded page: resolve a page, call server methods,
//! trigger events and watch the event stream.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use apprunner::{RuntimeClient, RuntimeEndpoint};
use apprunner_protocol::{EventTrigger, MethodInvocation, PageRef, StreamUpdate};
use clap::{Parser, Subcommand};
use futures::StreamExt;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9190";

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let client = RuntimeClient::new(RuntimeEndpoint::parse(&cli.endpoint)?);

    match cli.command {
        Command::Resolve { application, page } => {
            handle_resolve(&client, PageRef::new(application, page), cli.json).await
        }
        Command::Invoke {
            application,
            method,
            args,
        } => handle_invoke(&client, application, method, args, cli.json).await,
        Command::Trigger {
            application,
            page,
            name,
            args,
        } => handle_trigger(&client, application, page, name, args, cli.json).await,
        Command::Watch {
            application,
            page,
            heartbeats,
        } => handle_watch(&client, PageRef::new(application, page), heartbeats, cli.json).await,
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "apprunnerctl",
    author,
    version,
    about = "Talk to an application runtime the way an embedded page does."
)]
struct Cli {
    /// Runtime endpoint (http://host:port or unix:/path)
    #[arg(long, short = 'e', default_value = DEFAULT_ENDPOINT, env = "APPRUNNER_ENDPOINT")]
    endpoint: String,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve a page to its file, title and version
    Resolve {
        application: String,
        page: String,
    },
    /// Invoke a server method. Each argument must be a JSON value
    Invoke {
        application: String,
        method: String,
        args: Vec<String>,
    },
    /// Trigger an application event from a page
    Trigger {
        application: String,
        page: String,
        name: String,
        args: Vec<String>,
    },
    /// Print the event stream of a page until it closes
    Watch {
        application: String,
        page: String,
        /// Also print heartbeats
        #[arg(long)]
        heartbeats: bool,
    },
}

fn check_json_args(args: &[String]) -> Result<()> {
    for (i, arg) in args.iter().enumerate() {
        serde_json::from_str::<serde_json::Value>(arg)
            .with_context(|| format!("argument {i} is not valid JSON: {arg}"))?;
    }
    Ok(())
}

async fn handle_resolve(client: &RuntimeClient, page: PageRef, json: bool) -> Result<()> {
    let resolved = client.resolve_page(page).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
    } else {
        println!("File:    {}", resolved.application_file_name);
        println!("Title:   {}", resolved.page_title);
        match resolved.application_version {
            Some(version) => println!("Version: {}", version.to_rfc3339()),
            None => println!("Version: (untracked)"),
        }
    }
    Ok(())
}

async fn handle_invoke(
    client: &RuntimeClient,
    application_id: String,
    method: String,
    arguments: Vec<String>,
    json: bool,
) -> Result<()> {
    check_json_args(&arguments)?;
    let result = client
        .invoke_method(MethodInvocation {
            application_id,
            method,
            arguments,
        })
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.result);
    }
    Ok(())
}

async fn handle_trigger(
    client: &RuntimeClient,
    application_id: String,
    page_id: String,
    name: String,
    arguments: Vec<String>,
    json: bool,
) -> Result<()> {
    check_json_args(&arguments)?;
    client
        .trigger_event(EventTrigger {
            application_id,
            page_id,
            name: name.clone(),
            arguments,
        })
        .await?;
    if json {
        println!(r#"{{"status": "triggered", "name": {}}}"#, serde_json::to_string(&name)?);
    } else {
        println!("Triggered {name}");
    }
    Ok(())
}

async fn handle_watch(
    client: &RuntimeClient,
    page: PageRef,
    heartbeats: bool,
    json: bool,
) -> Result<()> {
    let mut stream = client.consume_events(page.clone()).await?;
    eprintln!("Watching {page} (Ctrl+C to stop)");

    while let Some(update) = stream.next().await {
        let update = update?;
        if update.is_heartbeat() && !heartbeats {
            continue;
        }
        if json {
            println!("{}", serde_json::to_string(&update)?);
            continue;
        }
        match update {
            StreamUpdate::Heartbeat => println!("<heartbeat>"),
            StreamUpdate::Event(event) => {
                println!("{}({})", event.name, event.arguments.join(", "))
            }
        }
    }

    eprintln!("Stream closed");
    Ok(())
}
