use anyhow::Result;
use fuzzboard_app::{RunOptions, TrackerSelection};
use fuzzboard_core::CoreError;
use std::path::PathBuf;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();
    let cli = parse_cli_flags(std::env::args().skip(1))?;

    let config_path = fuzzboard_config::resolve_config_path(cli.config)?;
    let config = fuzzboard_config::load_from_path(&config_path)?;
    tracing::info!(path = %config_path.display(), "loaded configuration");

    let options = RunOptions {
        selection: cli.tracker.unwrap_or_default(),
        offline: cli.offline,
    };
    if let Err(error) = fuzzboard_app::run(&config, options).await {
        tracing::error!(error = %error, "run failed; no outputs were written");
        return Err(error.into());
    }

    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CliFlags {
    config: Option<PathBuf>,
    tracker: Option<TrackerSelection>,
    offline: bool,
}

fn parse_cli_flags(mut args: impl Iterator<Item = String>) -> Result<CliFlags, CoreError> {
    let mut flags = CliFlags::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = read_cli_value(
                    &arg,
                    args.next().ok_or_else(|| {
                        CoreError::Configuration(
                            "Missing value after --config. Use --config <path>.".to_owned(),
                        )
                    })?,
                )?;
                flags.config = Some(PathBuf::from(value));
            }
            "--tracker" => {
                let value = read_cli_value(
                    &arg,
                    args.next().ok_or_else(|| {
                        CoreError::Configuration(
                            "Missing value after --tracker. Use --tracker <bugzilla|github|all>."
                                .to_owned(),
                        )
                    })?,
                )?;
                flags.tracker = Some(value.parse()?);
            }
            "--offline" => flags.offline = true,
            "--help" | "-h" => {
                print_cli_help();
                std::process::exit(0);
            }
            value if value.starts_with("--") => {
                return Err(CoreError::Configuration(format!(
                    "Unknown flag '{value}'. Run with --help for valid flags."
                )));
            }
            unknown => {
                return Err(CoreError::Configuration(format!(
                    "Unexpected argument '{unknown}'. Run with --help for valid flags."
                )));
            }
        }
    }

    Ok(flags)
}

fn print_cli_help() {
    println!("Usage: fuzzboard [--config <path>] [--tracker <bugzilla|github|all>] [--offline]");
    println!();
    println!("  --config <path>      Configuration file (default: $FUZZBOARD_CONFIG or ./fuzzboard.toml)");
    println!("  --tracker <tracker>  Trackers to refresh (bugzilla, github or all; default all)");
    println!("  --offline            Re-parse the Bugzilla download saved in scratch_dir");
    println!("  --help               Show this help message");
}

fn read_cli_value(flag: &str, value: String) -> Result<String, CoreError> {
    let value = value.trim().to_owned();
    if value.is_empty() {
        return Err(CoreError::Configuration(format!(
            "Flag '{flag}' requires a non-empty value."
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliFlags, CoreError> {
        parse_cli_flags(args.iter().map(|arg| (*arg).to_owned()))
    }

    #[test]
    fn parses_all_flags() {
        let flags = parse(&["--config", "site/fuzzboard.toml", "--tracker", "GitHub", "--offline"])
            .expect("parse flags");

        assert_eq!(
            flags,
            CliFlags {
                config: Some(PathBuf::from("site/fuzzboard.toml")),
                tracker: Some(TrackerSelection::Github),
                offline: true,
            }
        );
    }

    #[test]
    fn no_flags_select_defaults() {
        assert_eq!(parse(&[]).expect("parse flags"), CliFlags::default());
    }

    #[test]
    fn rejects_missing_values_and_unknown_arguments() {
        assert!(matches!(parse(&["--config"]), Err(CoreError::Configuration(_))));
        assert!(matches!(parse(&["--tracker", " "]), Err(CoreError::Configuration(_))));
        assert!(matches!(parse(&["--tracker", "jira"]), Err(CoreError::Configuration(_))));
        assert!(matches!(parse(&["--verbose"]), Err(CoreError::Configuration(_))));
        assert!(matches!(parse(&["bugzilla"]), Err(CoreError::Configuration(_))));
    }
}
