//! `workspace-arena-cli` entry point.
//!
//! ## CLI Subcommands
//!
//! - `workspace-arena-cli config [show|defaults|validate] [--file PATH]`
//! - `workspace-arena-cli demo [--threads N] [--cycles N] [--max-request BYTES] [--file PATH]`
//! - `workspace-arena-cli version`
//! - `workspace-arena-cli help [COMMAND]`

use std::path::Path;
use std::process::ExitCode;

use workspace_arena::cli::{config_cmd, demo_cmd, flag_value, has_flag};
use workspace_arena::config::{self, EnvConfig};
use workspace_arena::telemetry::init_logging;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    init_cli_logging(&args);

    match command {
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            let file = flag_value(&args, "--file").map(Path::new);
            match subcommand {
                "show" => exit_code(config_cmd::run_show(file)),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => exit_code(config_cmd::run_validate(file)),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "demo" => exit_code(demo_cmd::run(&args[2..])),
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("workspace-arena-cli {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

/// Logging follows the same file and `WSA_*` layering as every command.
/// A file that fails to load is reported by the command itself.
fn init_cli_logging(args: &[String]) {
    let effective = flag_value(args, "--file")
        .and_then(|path| config::load_file(path).ok())
        .map(EnvConfig::with_env_overrides)
        .unwrap_or_else(config::load);
    let mut logging = effective.logging;
    if has_flag(args, "--verbose") || has_flag(args, "-v") {
        logging = logging.with_level("workspace_arena=debug");
    }
    if let Err(e) = init_logging(&logging) {
        eprintln!("WARNING: logging disabled: {}", e);
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "workspace-arena-cli v{}

USAGE:
    workspace-arena-cli [COMMAND] [OPTIONS]

COMMANDS:
    config       Show or validate workspace defaults (show, defaults, validate)
    demo         Run scoped loops against a mock allocator and print a JSON report
    version      Show version information
    help         Show this help message

OPTIONS:
    -h, --help     Show help for command
    -V, --version  Show version information
    -v, --verbose  Enable debug logging

ENVIRONMENT:
    WSA_*           Workspace defaults (see `config defaults`)
    WSA_LOG_FORMAT  json or pretty (default: pretty)
    WSA_LOG_LEVEL   Log filter directive (default: warn)
    WSA_LOG_FILE    Append logs to a file instead of stderr

EXIT CODES:
    0  Success
    1  Failure / warnings
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "config" => {
            eprintln!(
                "workspace-arena-cli config - Manage configuration

USAGE:
    workspace-arena-cli config <SUBCOMMAND> [--file PATH]

SUBCOMMANDS:
    show           Show effective configuration (file, then WSA_* overrides)
    defaults       Show built-in defaults
    validate       Validate configuration (exit 0 valid, 1 warnings, 2 errors)

EXAMPLES:
    workspace-arena-cli config show
    workspace-arena-cli config validate --file workspace.toml
"
            );
        }
        "demo" => {
            eprintln!(
                "workspace-arena-cli demo - Run a sample workload

USAGE:
    workspace-arena-cli demo [OPTIONS]

OPTIONS:
    --threads N          Worker threads, each with its own registry (default: 2)
    --cycles N           Scope cycles per worker (default: 8)
    --max-request BYTES  Largest single allocation (default: 4096)
    --file PATH          Load workspace defaults from a TOML file

DESCRIPTION:
    Prints per-thread workspace statistics and reclaimer counters as JSON.
    Exits 1 if any memory is left unreclaimed.
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'workspace-arena-cli help' for general usage.",
                command
            );
        }
    }
}
