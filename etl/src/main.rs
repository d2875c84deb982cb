use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use common::config::{DEFAULT_CONFIG_PATH, Settings};
use common::telemetry::init_tracing;
use std::process;
use tracing::error;

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Sets a custom config file")
}

fn load_settings(matches: &ArgMatches) -> anyhow::Result<Settings> {
    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let settings = Settings::load(config_path).with_context(|| {
        format!(
            "loading configuration from {}",
            config_path.unwrap_or(DEFAULT_CONFIG_PATH)
        )
    })?;
    init_tracing(&settings.logging);
    Ok(settings)
}

fn run(matches: ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("generate", sub)) => {
            let settings = load_settings(sub)?;
            etl::generate_source_csv(&settings).context("generating synthetic dataset")?;
        }
        Some(("etl", sub)) => {
            let settings = load_settings(sub)?;
            etl::run_etl_pipeline(&settings).context("running ETL")?;
        }
        _ => anyhow::bail!("Please specify a valid subcommand"),
    }
    Ok(())
}

fn main() {
    let matches = Command::new("ETL Pipeline Manager")
        .version("1.0")
        .about("Generates production data and loads it into the SQLite store")
        .subcommand(
            Command::new("generate")
                .about("Write the synthetic production CSV")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("etl")
                .about("Run the ETL pipeline")
                .arg(config_arg()),
        )
        .get_matches();

    if let Err(e) = run(matches) {
        if e
            .downcast_ref::<common::Error>()
            .is_some_and(common::Error::is_stage_fatal)
        {
            error!("Stage aborted, store left untouched");
        }
        error!("{:#}", e);
        eprintln!("ETL pipeline error: {:#}", e);
        process::exit(1);
    }
}
