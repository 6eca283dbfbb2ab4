//! CLI entry point for `echomail`.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};

use echomail::config::Config;
use echomail::envelope::header::format_date;
use echomail::mailer::{self, OriginPolicy};
use echomail::store::MailRoot;
use echomail::{Envelope, Message};

/// Store-and-forward echomail over batch file transfer.
#[derive(Parser)]
#[command(name = "echomail", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Package a message from stdin into an envelope on stdout
    Send {
        /// Root of the echomail tree (defaults to mail.root from the config)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
        /// Do not save the outgoing message into the echomail tree
        #[arg(long)]
        no_save: bool,
        /// Files to attach
        #[arg(value_name = "ATTACHMENT")]
        attachments: Vec<PathBuf>,
    },
    /// Receive an envelope from stdin into the echomail tree
    Receive {
        /// Root of the echomail tree (defaults to mail.root from the config)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
        /// Do not verify the sender against the transport origin
        #[arg(long)]
        no_origin: bool,
    },
    /// Regenerate the gemtext index pages of the echomail tree
    Index {
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
    },
    /// List the groups in the echomail tree
    Groups {
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Decode an envelope and describe its contents
    Inspect {
        /// Envelope file (stdin if omitted)
        file: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config {
        /// Write it to the configuration file
        #[arg(long)]
        save: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = echomail::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Send {
            root,
            no_save,
            attachments,
        } => cmd_send(root, no_save, &attachments, &config),
        Commands::Receive { root, no_origin } => cmd_receive(root, no_origin, &config),
        Commands::Index { root } => cmd_index(root, &config),
        Commands::Groups { root, json } => cmd_groups(root, json, &config),
        Commands::Inspect { file, json } => cmd_inspect(file.as_deref(), json),
        Commands::Config { save } => cmd_config(&config, save),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = echomail::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "echomail.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Resolve the mail root from the command line or the config.
fn open_root(root: Option<PathBuf>, config: &Config) -> anyhow::Result<MailRoot> {
    let Some(path) = root.or_else(|| config.mail.root.clone()) else {
        anyhow::bail!("No mail root given: pass --root or set mail.root in the config");
    };
    Ok(MailRoot::open(path)?)
}

fn read_stdin() -> anyhow::Result<Vec<u8>> {
    let mut data = Vec::new();
    std::io::stdin()
        .read_to_end(&mut data)
        .context("error reading stdin")?;
    Ok(data)
}

/// Read a message from stdin and write its envelope to stdout.
fn cmd_send(
    root: Option<PathBuf>,
    no_save: bool,
    attachments: &[PathBuf],
    config: &Config,
) -> anyhow::Result<()> {
    let root = if no_save {
        None
    } else {
        Some(open_root(root, config)?)
    };

    let body = read_stdin()?;
    let data = mailer::send(root.as_ref(), body, attachments).context("error sending message")?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}

/// Read an envelope from stdin and store it.
fn cmd_receive(root: Option<PathBuf>, no_origin: bool, config: &Config) -> anyhow::Result<()> {
    let root = open_root(root, config)?;

    let policy = if no_origin || !config.mail.verify_origin {
        OriginPolicy::Skip
    } else {
        OriginPolicy::Require(std::env::var(&config.mail.origin_var).ok())
    };

    let data = read_stdin()?;
    match mailer::receive(&root, &data, &policy) {
        Ok(_) => Ok(()),
        Err(e @ echomail::EchomailError::MissingOrigin(_)) => Err(anyhow::Error::new(e).context(
            format!(
                "{} is not set; if your transport cannot supply it, use --no-origin",
                config.mail.origin_var
            ),
        )),
        Err(e) => Err(anyhow::Error::new(e).context("error receiving message")),
    }
}

/// Regenerate the index pages.
fn cmd_index(root: Option<PathBuf>, config: &Config) -> anyhow::Result<()> {
    let root = open_root(root, config)?;
    let summary = echomail::index::write_indexes(&root).context("index generation error")?;
    println!(
        "  Indexed {} message(s) in {} group(s)",
        summary.messages, summary.groups
    );
    Ok(())
}

/// List groups found in the mail root.
fn cmd_groups(root: Option<PathBuf>, json: bool, config: &Config) -> anyhow::Result<()> {
    let root = open_root(root, config)?;
    let groups = root.groups()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }

    println!();
    println!("  {} group(s)", groups.len());
    println!();
    for group in &groups {
        println!("  {:<40} {}", group.name, group.dir);
    }
    println!();
    Ok(())
}

/// Decode an envelope and print what it carries.
fn cmd_inspect(file: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let data = match file {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("error reading {}", path.display()))?
        }
        None => read_stdin()?,
    };

    let msg = Envelope::read(&data)
        .and_then(Envelope::parse)
        .context("error unwrapping envelope")?;

    if json {
        print_message_json(&msg, data.len())
    } else {
        print_message_table(&msg, data.len());
        Ok(())
    }
}

fn print_message_table(msg: &Message, size: usize) {
    println!();
    println!("  {:<14} {}", "MsgId", msg.msg_id);
    println!("  {:<14} {}", "Sender", msg.sender);
    println!("  {:<14} {}", "Group", msg.group);
    println!("  {:<14} {}", "Group dir", msg.group_dir());
    if let Some(date) = &msg.date {
        println!("  {:<14} {}", "Date", format_date(date));
    }
    println!("  {:<14} {} bytes", "Envelope", size);
    println!("  {:<14} {} bytes", "Message", msg.body.len());

    println!();
    println!("  Header:");
    for (key, value) in &msg.header {
        println!("    {key}: {value}");
    }

    if !msg.attachments.is_empty() {
        println!();
        println!("  Attachments:");
        for (name, content) in &msg.attachments {
            println!("    {:>10}  {name}", content.len());
        }
    }
    println!();
}

fn print_message_json(msg: &Message, size: usize) -> anyhow::Result<()> {
    let attachments: Vec<serde_json::Value> = msg
        .attachments
        .iter()
        .map(|(name, content)| {
            serde_json::json!({
                "name": name,
                "size": content.len(),
            })
        })
        .collect();

    let output = serde_json::json!({
        "msg_id": msg.msg_id,
        "sender": msg.sender,
        "group": msg.group,
        "group_dir": msg.group_dir(),
        "date": msg.date.map(|d| d.to_rfc3339()),
        "header": msg.header,
        "envelope_size": size,
        "message_size": msg.body.len(),
        "attachments": attachments,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Print the effective configuration, optionally saving it.
fn cmd_config(config: &Config, save: bool) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    if save {
        echomail::config::save_config(config)?;
        if let Some(path) = echomail::config::config_file_path() {
            eprintln!("  Saved to {}", path.display());
        }
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "echomail", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
