use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term::{self, termcolor::StandardStream};
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use rbs_syntax::{Buffer, Declaration, ParseError, ParseOptions, WriterConfig};

#[derive(Parser)]
#[command(author, version, about = "rbs-sig - Check and format RBS type signatures")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Spaces per indentation level when writing signatures
    #[arg(long, global = true, env = "RBS_SIG_INDENT", default_value_t = 2)]
    indent: usize,

    /// When to use colors
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse signature files and report errors
    Check {
        /// Files or directories; directories are searched for *.rbs
        #[arg(value_name = "PATHS", required = true)]
        paths: Vec<PathBuf>,
        /// Output format
        #[arg(long, short, default_value = "text")]
        format: ReportFormat,
    },
    /// Rewrite signature files in canonical form
    Format {
        /// Files or directories; directories are searched for *.rbs
        #[arg(value_name = "PATHS")]
        paths: Vec<PathBuf>,
        /// Check formatting without modifying files
        #[arg(long)]
        check: bool,
    },
    /// Parse a single type and print it canonically
    Type {
        /// Type text, e.g. `Array[Integer]?`
        #[arg(value_name = "TEXT")]
        text: String,
        /// Names to treat as bound type variables
        #[arg(long = "var", value_name = "NAME")]
        variables: Vec<String>,
    },
    /// Parse a single method type and print it canonically
    MethodType {
        /// Method type text, e.g. `[T] (T) -> void`
        #[arg(value_name = "TEXT")]
        text: String,
        /// Names to treat as bound type variables
        #[arg(long = "var", value_name = "NAME")]
        variables: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorMode {
    /// Color when writing to a terminal
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl ColorMode {
    fn choice(self) -> term::termcolor::ColorChoice {
        use term::termcolor::ColorChoice;
        match self {
            Self::Auto => ColorChoice::Auto,
            Self::Always => ColorChoice::Always,
            Self::Never => ColorChoice::Never,
        }
    }
}

/// Settings shared by every subcommand.
struct Session {
    writer: WriterConfig,
    color: ColorMode,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("RBS_SIG_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {}
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let session = Session {
        writer: WriterConfig {
            indent: " ".repeat(cli.indent),
        },
        color: cli.color,
    };

    match cli.command {
        Commands::Check { paths, format } => check_files(&session, &paths, format),
        Commands::Format { paths, check } => format_files(&session, &paths, check),
        Commands::Type { text, variables } => {
            let options = ParseOptions::default().with_variables(variables);
            let parsed = rbs_syntax::Parser::parse_type(Buffer::new("<input>", text), &options);
            print_parsed(&session, parsed)
        }
        Commands::MethodType { text, variables } => {
            let options = ParseOptions::default().with_variables(variables);
            let parsed = rbs_syntax::Parser::parse_method_type(Buffer::new("<input>", text), &options);
            print_parsed(&session, parsed)
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Expand directories into the `*.rbs` files below them, sorted by name.
fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
            let is_rbs = entry.path().extension().is_some_and(|ext| ext == "rbs");
            if entry.file_type().is_file() && is_rbs {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

fn read_signature(path: &Path) -> Result<(String, Result<Vec<Declaration>, ParseError>)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let buffer = Buffer::new(path.display().to_string(), content.clone());
    let parsed = rbs_syntax::Parser::parse_signature(buffer, &ParseOptions::default());
    Ok((content, parsed))
}

/// Render a parse error with the offending source lines.
fn report_error(session: &Session, error: &ParseError) -> Result<()> {
    let location = error.location();
    let buffer = location.buffer();
    let file = SimpleFile::new(buffer.name(), buffer.content());

    let label = match error.token_kind() {
        Some(kind) => format!("token `{}` ({kind})", error.text()),
        None => format!("character `{}`", error.text()),
    };
    let diagnostic = Diagnostic::error()
        .with_message(error.message())
        .with_labels(vec![Label::primary((), location.range()).with_message(label)]);

    let stream = StandardStream::stderr(session.color.choice());
    term::emit(&mut stream.lock(), &term::Config::default(), &file, &diagnostic)?;
    Ok(())
}

fn print_parsed<T: std::fmt::Display>(
    session: &Session,
    parsed: Result<T, ParseError>,
) -> Result<bool> {
    match parsed {
        Ok(node) => {
            println!("{node}");
            Ok(true)
        }
        Err(error) => {
            report_error(session, &error)?;
            Ok(false)
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn check_files(session: &Session, paths: &[PathBuf], format: ReportFormat) -> Result<bool> {
    let files = collect_files(paths)?;
    let mut reports = Vec::new();
    let mut error_count = 0;

    for path in &files {
        tracing::debug!(path = %path.display(), "checking");
        let (_, parsed) = read_signature(path)?;

        match (&parsed, format) {
            (Ok(_), ReportFormat::Text) => println!("{} {}", "✓".green().bold(), path.display()),
            (Err(error), ReportFormat::Text) => report_error(session, error)?,
            (_, ReportFormat::Json) => {}
        }

        let report = match &parsed {
            Ok(decls) => serde_json::json!({
                "path": path.display().to_string(),
                "declarations": decls.len(),
                "error": null,
            }),
            Err(error) => {
                let (line, column) = error.location().start_loc();
                serde_json::json!({
                    "path": path.display().to_string(),
                    "declarations": null,
                    "error": {
                        "message": error.message(),
                        "token": error.text(),
                        "line": line,
                        "column": column,
                        "detail": error.to_string(),
                    },
                })
            }
        };
        if parsed.is_err() {
            error_count += 1;
        }
        reports.push(report);
    }

    match format {
        ReportFormat::Text => {
            if error_count > 0 {
                eprintln!(
                    "\n{}: {} of {} file(s) failed to parse",
                    "error".red().bold(),
                    error_count,
                    files.len()
                );
            }
        }
        ReportFormat::Json => {
            let report = serde_json::json!({
                "files": reports,
                "checked": files.len(),
                "errors": error_count,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(error_count == 0)
}

fn format_files(session: &Session, paths: &[PathBuf], check: bool) -> Result<bool> {
    if paths.is_empty() {
        eprintln!("{}: No files specified", "error".red().bold());
        return Ok(false);
    }

    let mut all_ok = true;

    for path in collect_files(paths)? {
        let (content, parsed) = read_signature(&path)?;

        let decls = match parsed {
            Ok(decls) => decls,
            Err(error) => {
                eprintln!(
                    "{}: Failed to parse {}",
                    "error".red().bold(),
                    path.display()
                );
                report_error(session, &error)?;
                all_ok = false;
                continue;
            }
        };

        let formatted = rbs_syntax::format(&decls, &session.writer);

        if check {
            if formatted != content {
                println!(
                    "{}: {} would be reformatted",
                    "warning".yellow().bold(),
                    path.display()
                );
                all_ok = false;
            } else {
                println!("{} {}", "✓".green().bold(), path.display());
            }
        } else if formatted != content {
            std::fs::write(&path, &formatted)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} {}", "formatted".green().bold(), path.display());
        } else {
            println!("{} {} (unchanged)", "✓".green().bold(), path.display());
        }
    }

    Ok(all_ok)
}
