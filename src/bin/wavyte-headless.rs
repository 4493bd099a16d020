use std::{
    fs::File,
    io::{BufReader, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "wavyte-headless", version)]
struct Cli {
    /// Log lifecycle steps, served files and browser console output.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flatten recorded mount samples into asset positions.
    Assets(AssetsArgs),
    /// List the compositions of a bundle.
    #[cfg(feature = "chromium")]
    Compositions(CompositionsArgs),
}

#[derive(Parser, Debug)]
struct AssetsArgs {
    /// Mount samples JSON: an object mapping output frame to mounted elements.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Continuity tolerance in source frames.
    #[arg(long, default_value_t = 0.5)]
    epsilon: f64,

    /// Write the positions here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[cfg(feature = "chromium")]
#[derive(Parser, Debug)]
struct CompositionsArgs {
    /// Serve URL (http/https) or bundle directory.
    bundle: String,

    /// Input props as a JSON object.
    #[arg(long)]
    props: Option<String>,

    /// Environment variable for the bundle, as KEY=VALUE. Repeatable.
    #[arg(long = "env", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Per-stage deadline in milliseconds.
    #[arg(long)]
    timeout_ms: Option<f64>,

    /// Port for the bundle server.
    #[arg(long)]
    port: Option<u16>,

    /// Browser binary to launch.
    #[arg(long)]
    browser_executable: Option<PathBuf>,

    /// Launch options JSON file (`headless`, `gl`, `args`, ...).
    #[arg(long)]
    chromium_options: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Assets(args) => cmd_assets(args),
        #[cfg(feature = "chromium")]
        Command::Compositions(args) => cmd_compositions(args, cli.verbose).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let f = File::open(path).with_context(|| format!("open {what} '{}'", path.display()))?;
    serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parse {what} JSON"))
}

fn write_json<T: serde::Serialize>(value: &T, out: Option<&Path>) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("encode output JSON")?;
    match out {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create output dir '{}'", parent.display()))?;
            }
            std::fs::write(path, text).with_context(|| format!("write '{}'", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{text}").context("write stdout")?;
        }
    }
    Ok(())
}

fn cmd_assets(args: AssetsArgs) -> anyhow::Result<()> {
    let timeline: wavyte_headless::MountTimeline = read_json(&args.in_path, "mount samples")?;
    let opts = wavyte_headless::FlattenOpts {
        epsilon: args.epsilon,
    };
    let positions = wavyte_headless::flatten(&timeline, &opts)?;
    write_json(&positions, args.out.as_deref())
}

#[cfg(feature = "chromium")]
fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))
}

#[cfg(feature = "chromium")]
async fn cmd_compositions(args: CompositionsArgs, verbose: bool) -> anyhow::Result<()> {
    let mut opts = wavyte_headless::DiscoverOptions {
        timeout_ms: args.timeout_ms,
        port: args.port,
        browser_executable: args.browser_executable,
        env_variables: args.env.into_iter().collect(),
        verbose,
        ..Default::default()
    };
    if let Some(props) = &args.props {
        opts.input_props = serde_json::from_str(props).context("parse --props JSON")?;
    }
    if let Some(path) = &args.chromium_options {
        opts.chromium_options = read_json(path, "chromium options")?;
    }

    let compositions = wavyte_headless::discover(
        wavyte_headless::BundleSource::parse(&args.bundle),
        &opts,
        &wavyte_headless::ChromiumLauncher,
    )
    .await?;
    write_json(&compositions, None)
}
