use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use service_upsert::api::ManagementApi;
use service_upsert::backend::DaemonCli;
use service_upsert::config::{self, Settings};
use service_upsert::orchestrator::{self, Upsert};
use service_upsert::request::UpsertRequest;
use service_upsert::{Error, Result, logging, naming};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Settings file (TOML); falls back to $SVC_UPSERT_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Copy a service into a new one, or update it if it already exists
    Upsert {
        /// Target service name
        #[arg(long, required_unless_present = "branch")]
        name: Option<String>,
        /// Derive the target name from the template by replacing the placeholder with this branch
        #[arg(long)]
        branch: Option<String>,
        /// Template service to copy from when the target does not exist
        #[arg(long = "copy-from")]
        copy_from: String,
        /// Image the service will run
        #[arg(long)]
        image: String,
        /// Domain used for the routing label (<name>.<domain>)
        #[arg(long)]
        domain: Option<String>,
        /// Registry auth token sent as X-Registry-Auth (see [registry] in the settings file)
        #[arg(long)]
        auth: Option<String>,
        /// Update through the local docker CLI instead of the API
        #[arg(long, short = 'd')]
        daemon: bool,
        /// Management API endpoint
        #[arg(long)]
        endpoint: Option<String>,
    },
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let settings = match config::load_or_default(args.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(&settings.logging) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match args.cmd {
        Command::Upsert {
            name,
            branch,
            copy_from,
            image,
            domain,
            auth,
            daemon,
            endpoint,
        } => {
            let code = match cmd_upsert(
                &settings,
                UpsertArgs {
                    name,
                    branch,
                    copy_from,
                    image,
                    domain,
                    auth,
                    daemon,
                    endpoint,
                },
            ) {
                Ok(code) => code,
                Err(e) => {
                    tracing::error!("{e}");
                    1
                }
            };
            ExitCode::from(code as u8)
        }
    }
}

struct UpsertArgs {
    name: Option<String>,
    branch: Option<String>,
    copy_from: String,
    image: String,
    domain: Option<String>,
    auth: Option<String>,
    daemon: bool,
    endpoint: Option<String>,
}

fn cmd_upsert(settings: &Settings, a: UpsertArgs) -> Result<i32> {
    let target = match (a.name, a.branch) {
        (Some(name), _) => name,
        (None, Some(branch)) => {
            naming::derive_target_name(&a.copy_from, &branch, &settings.naming.placeholder)?
        }
        (None, None) => return Err(Error::validation("--name or --branch is required")),
    };

    let mut req =
        UpsertRequest::new(target, a.copy_from, a.image).with_daemon_fallback(a.daemon);
    if let Some(domain) = a.domain {
        req = req.with_routing_domain(domain);
    }
    if let Some(auth) = settings.registry_auth(a.auth.as_deref())? {
        req = req.with_registry_auth(auth);
    }

    let api = ManagementApi::new(
        &settings.endpoint(a.endpoint.as_deref()),
        settings.http_timeout(),
    )?;
    let daemon = DaemonCli::new(settings.daemon.program.clone(), settings.daemon_timeout())
        .with_program_args(settings.daemon.args.clone())
        .with_routing_label(settings.routing.label_key.clone());
    tracing::debug!(endpoint = api.endpoint(), program = daemon.program(), "backends ready");

    let upsert = Upsert::new(&api, &api, &daemon, settings.routing.clone());
    let result = upsert.run(&req);
    match &result {
        Ok(out) if out.success => match &out.id {
            Some(id) => println!("{} {:?} via {} (id {id})", out.target, out.action, out.backend),
            None => println!("{} {:?} via {}", out.target, out.action, out.backend),
        },
        Ok(out) => {
            let msg = out.message.as_deref().unwrap_or("not accepted");
            tracing::error!(target_service = %out.target, backend = %out.backend, "{msg}");
        }
        Err(failure) => tracing::error!("{failure}"),
    }
    Ok(orchestrator::exit_code(&result))
}
