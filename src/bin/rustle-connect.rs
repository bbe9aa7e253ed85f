use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rustle_connect::execution::RunOptions;
use rustle_connect::host::{Host, SshHost};
use rustle_connect::template::HandlebarsRenderer;
use rustle_connect::transfer::{FileTransfer, RsyncTransfer};
use rustle_connect::{ConnectSettings, Connection, Inventory, LocalConnection, LocalHost};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "rustle-connect")]
#[command(about = "Run commands and move files on local and SSH hosts")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct RustleConnectCli {
    /// Target host: inventory name, `local`, or `[user@]addr[:port]`
    #[arg(short = 'H', long, default_value = "local")]
    host: String,

    /// Inventory file with named hosts and gateways
    #[arg(short, long)]
    inventory: Option<PathBuf>,

    /// Elevate with sudo on the target
    #[arg(long)]
    sudo: bool,

    /// Read no ssh_config files
    #[arg(long)]
    no_ssh_config: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a shell command on the host
    Run {
        command: String,

        /// Report failures instead of exiting with an error
        #[arg(long)]
        warn: bool,

        /// Do not echo output while the command runs
        #[arg(long)]
        hide: bool,

        #[arg(long)]
        cwd: Option<String>,

        /// Seconds to wait for the command
        #[arg(long)]
        timeout: Option<u64>,

        /// Environment variable as KEY=VALUE
        #[arg(short, long)]
        env: Vec<String>,
    },

    /// Upload a file, or a rendered template with --template
    Put {
        src: String,
        dst: String,

        /// Treat SRC as a template path under --template-dir
        #[arg(long)]
        template: bool,

        #[arg(long, default_value = "templates")]
        template_dir: PathBuf,

        /// Template variables as a JSON object
        #[arg(long, default_value = "{}")]
        vars: String,
    },

    /// Download a file to the controller
    Get { src: String, dst: String },

    /// Mirror a local directory onto an SSH host with rsync
    Sync {
        src: String,
        dst: String,

        #[arg(long)]
        exclude: Vec<String>,

        #[arg(long)]
        delete: bool,
    },

    /// List inventory hosts
    Hosts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = RustleConnectCli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    let settings = if cli.no_ssh_config {
        ConnectSettings::without_ssh_config()
    } else {
        ConnectSettings::default()
    };

    let inventory = match &cli.inventory {
        Some(path) => Some(
            Inventory::load(path)
                .await
                .with_context(|| format!("Failed to load inventory {}", path.display()))?,
        ),
        None => None,
    };

    if let Command::Hosts = cli.command {
        list_hosts(inventory.as_ref());
        return Ok(());
    }

    let host = resolve_host(&cli.host, inventory.as_ref(), cli.sudo)?;
    let connection = host.connect(&settings)?;

    let outcome = dispatch(&cli.command, connection.as_ref(), &host, &settings).await;
    if let Err(e) = connection.close().await {
        error!("Failed to close connection to {}: {}", host, e);
    }

    let exit_code = outcome?;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn dispatch(
    command: &Command,
    connection: &dyn Connection,
    host: &Host,
    settings: &ConnectSettings,
) -> Result<i32> {
    match command {
        Command::Run {
            command,
            warn,
            hide,
            cwd,
            timeout,
            env,
        } => {
            let mut options = RunOptions::new()
                .with_hide(*hide)
                .with_warn(*warn)
                .with_show_command(!*hide);
            if let Some(cwd) = cwd {
                options = options.with_cwd(cwd);
            }
            if let Some(secs) = timeout {
                options = options.with_timeout(Duration::from_secs(*secs));
            }
            for pair in env {
                let Some((key, value)) = pair.split_once('=') else {
                    bail!("Invalid environment variable '{}', expected KEY=VALUE", pair);
                };
                options = options.with_env(key, value);
            }

            let result = match connection.run(command, &options).await {
                Ok(result) => result,
                Err(e) => match e.return_code() {
                    Some(return_code) => {
                        error!("{}", e);
                        return Ok(return_code);
                    }
                    None => return Err(e.into()),
                },
            };
            if *hide {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            return Ok(result.return_code);
        }
        Command::Put {
            src,
            dst,
            template,
            template_dir,
            vars,
        } => {
            let transfer = FileTransfer::new(settings);
            let outcome = if *template {
                let context: serde_json::Value =
                    serde_json::from_str(vars).context("--vars must be a JSON object")?;
                let renderer = HandlebarsRenderer::new(template_dir);
                transfer
                    .put_template(&renderer, src, &context, connection, dst)
                    .await?
            } else {
                transfer.put(src, connection, dst).await?
            };
            info!("{} {}: {:?}", host, dst, outcome);
        }
        Command::Get { src, dst } => {
            let outcome = FileTransfer::new(settings).get(connection, src, dst).await?;
            info!("{} {}: {:?}", host, src, outcome);
        }
        Command::Sync {
            src,
            dst,
            exclude,
            delete,
        } => {
            let Some(ssh) = host.as_ssh() else {
                bail!("sync needs an SSH host, got {}", host);
            };
            let rsync = exclude
                .iter()
                .fold(RsyncTransfer::new().with_delete(*delete), |rsync, pattern| {
                    rsync.with_exclude(pattern)
                });
            let controller = LocalConnection::new(LocalHost::new(), settings);
            rsync.sync(&controller, src, ssh, dst).await?;
        }
        Command::Hosts => {}
    }

    Ok(0)
}

fn resolve_host(spec: &str, inventory: Option<&Inventory>, sudo: bool) -> Result<Host> {
    if let Some(host) = inventory.and_then(|inventory| inventory.host(spec)) {
        let mut host = host.clone();
        if sudo {
            match &mut host {
                Host::Local(local) => local.use_sudo = true,
                Host::Ssh(ssh) => ssh.use_sudo = true,
            }
        }
        return Ok(host);
    }

    if spec == "local" || spec == "localhost" {
        return Ok(LocalHost::new().with_sudo(sudo).into());
    }

    let (user, rest) = match spec.split_once('@') {
        Some((user, rest)) => (Some(user), rest),
        None => (None, spec),
    };
    // `[v6]:port`, `name:port` or a bare address
    let (addr, port) = match rest.rsplit_once(':') {
        Some((addr, port)) if !addr.contains(':') || addr.ends_with(']') => (
            addr.trim_start_matches('[').trim_end_matches(']'),
            Some(port.parse::<u16>().with_context(|| format!("Invalid port in '{spec}'"))?),
        ),
        _ => (rest, None),
    };

    let mut host = SshHost::new(addr)?.with_sudo(sudo);
    if let Some(user) = user {
        host = host.with_user(user);
    }
    if let Some(port) = port {
        host = host.with_port(port);
    }
    Ok(host.into())
}

fn list_hosts(inventory: Option<&Inventory>) {
    let Some(inventory) = inventory else {
        println!("No inventory given, use --inventory <file>");
        return;
    };

    for (name, host) in inventory.hosts() {
        match host.as_ssh() {
            Some(ssh) => {
                let via = ssh
                    .gateway()
                    .map(|gateway| format!(" via {}", gateway.endpoint()))
                    .unwrap_or_default();
                println!("{name:<20} {}{via}", ssh.endpoint());
            }
            None => println!("{name:<20} local"),
        }
    }
}
