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

async fn run(matches: ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("report", sub)) => {
            let settings = load_settings(sub)?;
            analytics::run_analytics_pipeline(&settings)
                .await
                .context("building report")?;
        }
        Some(("pipeline", sub)) => {
            let settings = load_settings(sub)?;
            etl::run_etl_pipeline(&settings).context("running ETL")?;
            analytics::run_analytics_pipeline(&settings)
                .await
                .context("building report")?;
        }
        _ => anyhow::bail!("Please specify a valid subcommand"),
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let matches = Command::new("Production Analytics")
        .version("1.0")
        .about("Aggregates stored production data, forecasts and writes the dashboard")
        .subcommand(
            Command::new("report")
                .about("Read the store and write the dashboard report")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("pipeline")
                .about("Run the ETL and then the report")
                .arg(config_arg()),
        )
        .get_matches();

    if let Err(e) = run(matches).await {
        if e
            .downcast_ref::<common::Error>()
            .is_some_and(common::Error::is_stage_fatal)
        {
            error!("Stage aborted, store left untouched");
        }
        error!("{:#}", e);
        eprintln!("Analytics pipeline error: {:#}", e);
        process::exit(1);
    }
}
