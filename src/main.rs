use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use condor_certcheck::chain::VerifierKind;
use condor_certcheck::config::{Config, ConfigError, OutputFormat, Settings};
use condor_certcheck::source::SourceKind;
use condor_certcheck::ValidationOutcome;
use std::path::PathBuf;
use std::process::exit;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Checks the validity of an HTCondor-CE server certificate",
    long_about = None
)]
struct Args {
    /// Hostname of the HTCondor-CE
    #[arg(short = 'H', long)]
    hostname: Option<String>,

    /// CA bundle used to verify the certificate chain
    #[arg(long)]
    ca_bundle: Option<PathBuf>,

    /// User proxy used to authenticate to the CE
    #[arg(long)]
    user_proxy: Option<PathBuf>,

    /// Timeout for the whole check, in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Collector port
    #[arg(short, long)]
    port: Option<u16>,

    /// Wait before retrying an empty probe response, in seconds
    #[arg(long)]
    backoff: Option<u64>,

    /// Warn when fewer days of validity remain
    #[arg(long)]
    warning_days: Option<i64>,

    /// Directory for the temporary certificate file
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    /// Certificate source: tls, command
    #[arg(long)]
    source: Option<SourceKind>,

    /// Helper program printing the server certificate (command source)
    #[arg(long)]
    probe_command: Option<PathBuf>,

    /// Chain verifier: library, openssl
    #[arg(long)]
    verifier: Option<VerifierKind>,

    /// Output format: text, json
    #[arg(short, long)]
    output: Option<OutputFormat>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long, action = ArgAction::SetTrue)]
    print_config: bool,

    /// Log to stderr, repeat for more detail
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            hostname: self.hostname,
            ca_bundle: self.ca_bundle,
            user_proxy: self.user_proxy,
            port: self.port,
            timeout: self.timeout,
            backoff: self.backoff,
            warning_days: self.warning_days,
            artifact_dir: self.artifact_dir,
            source: self.source,
            probe_command: self.probe_command,
            verifier: self.verifier,
            output: self.output,
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(config_path: Option<PathBuf>, cli: Config) -> Result<Settings, ConfigError> {
    let file_config = match config_path {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration file");
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    Config::defaults()
        .merge_with(file_config)
        .merge_with(cli)
        .resolve()
}

fn report(outcome: ValidationOutcome, output: OutputFormat) -> ! {
    match output {
        OutputFormat::Text => println!("{}", outcome),
        OutputFormat::Json => println!("{}", outcome.to_json()),
    }
    exit(outcome.exit_code());
}

/// Usage errors are reported like any other UNKNOWN result. `None` for
/// `--help` and `--version`, which clap prints itself.
fn parse_error_outcome(err: &clap::Error) -> Option<ValidationOutcome> {
    if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
        return None;
    }
    let rendered = err.to_string();
    let line = rendered.lines().next().unwrap_or_default();
    let line = line.strip_prefix("error: ").unwrap_or(line);
    Some(ValidationOutcome::unknown(format!("Invalid arguments: {}", line)))
}

fn main() {
    let mut args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => match parse_error_outcome(&e) {
            Some(outcome) => report(outcome, OutputFormat::Text),
            None => e.exit(),
        },
    };
    init_tracing(args.verbose);

    if args.print_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    let config_path = args.config.take();
    let requested_output = args.output.unwrap_or(OutputFormat::Text);
    let settings = match load_settings(config_path, args.into_config()) {
        Ok(settings) => settings,
        Err(e) => report(ValidationOutcome::unknown(e.to_string()), requested_output),
    };

    let outcome = match settings.checker() {
        Ok(checker) => checker.validate_within(settings.timeout),
        Err(e) => e.into(),
    };
    report(outcome, settings.output);
}
