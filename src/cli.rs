//! Command-line interface for promise-misuse.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use crate::analysis::SuspensionClassifier;
use crate::config::{self, Config};
use crate::detect::Runner;
use crate::observation::AsyncId;
use crate::report;
use crate::session::Session;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Diagnose promise misuse from async lifecycle traces.
///
/// Reads the newline-delimited JSON trace written by the async hooks
/// collector and reports promises that were allocated but never consumed,
/// and promises whose result was unwrapped by more than one dependent.
#[derive(Parser)]
#[command(name = "promise-misuse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Write debug logs to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a recorded trace
    #[command(visible_alias = "check")]
    Analyze(AnalyzeArgs),
    /// Create a new configuration file from a template
    Init(InitArgs),
}

/// Arguments for the analyze command.
#[derive(Parser)]
pub struct AnalyzeArgs {
    /// Trace file to read, or "-" for stdin
    #[arg(default_value = "-")]
    pub trace: PathBuf,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long)]
    pub format: Option<String>,

    /// Also report the context still running at end of stream
    #[arg(short, long)]
    pub verbose: bool,

    /// Comma-separated promise ids whose raw state is logged
    #[arg(long, value_delimiter = ',')]
    pub raw: Vec<AsyncId>,

    /// Show suppressed promises by reason
    #[arg(long)]
    pub show_suppressed: bool,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "promise-misuse.yaml")]
    pub output: PathBuf,

    /// Template to use
    #[arg(short, long, default_value = DEFAULT_TEMPLATE)]
    pub template: String,

    /// List available templates
    #[arg(short, long)]
    pub list: bool,
}

/// Available config templates.
struct Template {
    name: &'static str,
    description: &'static str,
    content: &'static str,
}

/// All available templates.
static TEMPLATES: &[Template] = &[
    Template {
        name: "default",
        description: "Runtime frames filtered, last executing context hidden",
        content: include_str!("templates/default.yaml"),
    },
    Template {
        name: "verbose",
        description: "Report everything, including the context still running at exit",
        content: include_str!("templates/verbose.yaml"),
    },
    Template {
        name: "app-only",
        description: "Ignore allocations made inside node_modules and test helpers",
        content: include_str!("templates/app-only.yaml"),
    },
];

/// Load the explicit config, a discovered one, or the defaults.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => config::discover(),
    };

    let Some(path) = path else {
        return Ok(Config::default());
    };

    tracing::debug!(path = %path.display(), "loading config");
    let config = Config::parse_file(&path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    config::validate(&config)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Run the analyze command.
pub fn run_analyze(args: &AnalyzeArgs) -> anyhow::Result<i32> {
    let config = load_config(args.config.as_deref())?;

    let format = args
        .format
        .clone()
        .unwrap_or_else(|| config.get_format().to_string());
    if format != "pretty" && format != "json" {
        anyhow::bail!("unknown format {:?}, must be 'pretty' or 'json'", format);
    }

    let runner = Runner::from_config(&config)?.verbose(args.verbose || config.is_verbose());

    // Ingest
    let raw_ids = config.raw_ids.iter().chain(&args.raw).copied();
    let mut session = Session::new().with_raw_ids(raw_ids);
    let source = args.trace.to_string_lossy().to_string();
    if source == "-" {
        session.feed_reader(io::stdin().lock())?;
    } else {
        let file = File::open(&args.trace)
            .with_context(|| format!("failed to open trace {}", args.trace.display()))?;
        session.feed_reader(BufReader::new(file))?;
    }
    if !session.is_ended() {
        tracing::warn!("trace ended without an end record");
    }

    // Classify and detect
    let snapshot = session.finish(&SuspensionClassifier::default());
    let result = runner.run(&snapshot);

    // Output results
    match format.as_str() {
        "json" => report::write_json(&source, &result)?,
        _ => report::write_pretty(&source, &result, args.show_suppressed)?,
    }

    if result.has_findings() {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Default name of the template `init` writes.
const DEFAULT_TEMPLATE: &str = "default";

fn find_template(name: &str) -> anyhow::Result<&'static Template> {
    TEMPLATES.iter().find(|t| t.name == name).ok_or_else(|| {
        let known: Vec<_> = TEMPLATES.iter().map(|t| t.name).collect();
        anyhow::anyhow!("unknown template {:?} (available: {})", name, known.join(", "))
    })
}

/// Run the init command.
///
/// Writes the chosen template as a config file. The written file is parsed
/// and validated again so a broken template never reaches a user.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.list {
        print_templates();
        return Ok(EXIT_SUCCESS);
    }

    let template = find_template(&args.template)?;
    if args.output.exists() {
        anyhow::bail!(
            "{} already exists, pass --output to write elsewhere",
            args.output.display()
        );
    }

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&args.output, template.content)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    config::validate(&Config::parse_file(&args.output)?)?;

    println!(
        "Created {} from template '{}'",
        args.output.display(),
        template.name
    );
    println!();
    println!("Record a trace with the async hooks collector, then run:");
    println!(
        "  promise-misuse analyze trace.ndjson --config {}",
        args.output.display()
    );
    Ok(EXIT_SUCCESS)
}

fn print_templates() {
    println!("Available templates:");
    println!();
    for template in TEMPLATES {
        let marker = if template.name == DEFAULT_TEMPLATE { "*" } else { " " };
        println!("  {} {:<12} {}", marker, template.name, template.description);
    }
    println!();
    println!("  * written when --template is not given");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze_args() {
        let cli = Cli::parse_from([
            "promise-misuse",
            "analyze",
            "trace.ndjson",
            "--raw",
            "12,40",
            "--format",
            "json",
            "--debug",
        ]);
        assert!(cli.debug);
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.trace, PathBuf::from("trace.ndjson"));
        assert_eq!(args.raw, vec![12, 40]);
        assert_eq!(args.format.as_deref(), Some("json"));
        assert!(!args.verbose);
    }

    #[test]
    fn test_trace_defaults_to_stdin() {
        let cli = Cli::parse_from(["promise-misuse", "analyze"]);
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.trace, PathBuf::from("-"));
    }

    #[test]
    fn test_templates_are_valid_configs() {
        for template in TEMPLATES {
            let config: Config = serde_yaml::from_str(template.content)
                .unwrap_or_else(|e| panic!("template {} failed to parse: {}", template.name, e));
            config::validate(&config)
                .unwrap_or_else(|e| panic!("template {} is invalid: {}", template.name, e));
        }
    }

    #[test]
    fn test_init_writes_template() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("conf/promise-misuse.yaml");
        let args = InitArgs {
            output: output.clone(),
            template: "app-only".to_string(),
            list: false,
        };
        assert_eq!(run_init(&args).unwrap(), EXIT_SUCCESS);
        let config = Config::parse_file(&output).unwrap();
        assert!(!config.excluded_paths.is_empty());

        let err = run_init(&args).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_init_unknown_template() {
        let dir = TempDir::new().unwrap();
        let args = InitArgs {
            output: dir.path().join("promise-misuse.yaml"),
            template: "nope".to_string(),
            list: false,
        };
        let err = run_init(&args).unwrap_err();
        assert!(err.to_string().contains("available: default, verbose, app-only"));
        assert!(!args.output.exists());
    }

    #[test]
    fn test_load_explicit_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "format: json\nraw_ids: [7]\n").unwrap();
        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.get_format(), "json");
        assert_eq!(config.raw_ids, vec![7]);

        std::fs::write(&path, "format: sarif\n").unwrap();
        assert!(load_config(Some(path.as_path())).is_err());
    }
}
