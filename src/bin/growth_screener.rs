use growth_screener::config::Config;
use growth_screener::models::screening::QualifiedCandidate;
use growth_screener::services::{ResultStore, ScreeningPipeline, SymbolUniverse};

use anyhow::{bail, Context};
use chrono_tz::America::New_York;
use clap::{App, Arg, SubCommand};
use log::{info, warn};

fn parse_number(value: Option<&str>, name: &str) -> anyhow::Result<Option<usize>> {
    value
        .map(|v| v.parse::<usize>().with_context(|| format!("invalid --{}: {}", name, v)))
        .transpose()
}

fn print_candidates(candidates: &[QualifiedCandidate]) {
    if candidates.is_empty() {
        println!("No stocks met the screening criteria.");
        return;
    }

    println!(
        "{:<4} {:<7} {:<32} {:>9} {:>10} {:>10} {:>10} {:>7}",
        "#", "Symbol", "Company", "Score", "Price", "SMA200", "Rev Q/Q%", "Strict"
    );
    println!("{:-<96}", "");
    for (i, c) in candidates.iter().enumerate() {
        let name: String = c.company_name.chars().take(32).collect();
        println!(
            "{:<4} {:<7} {:<32} {:>9.2} {:>10.2} {:>10.2} {:>10.2} {:>7}",
            i + 1,
            c.symbol,
            name,
            c.score,
            c.technical.current_price,
            c.technical.sma200,
            c.fundamental.quarterly_revenue_growth,
            if c.meets_all_criteria { "yes" } else { "no" }
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let app = App::new("growth_screener")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Screens US equities on moving-average trend and growth, then ranks the survivors")
        .subcommand(
            SubCommand::with_name("screen")
                .about("Run the screener and print the top ranked stocks")
                .arg(
                    Arg::with_name("limit")
                        .short('l')
                        .long("limit")
                        .value_name("N")
                        .help("Number of stocks to return")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("max-symbols")
                        .long("max-symbols")
                        .value_name("N")
                        .help("Maximum universe size")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("symbols")
                        .short('s')
                        .long("symbols")
                        .value_name("A,B,...")
                        .help("Screen only these symbols instead of the standard universe")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("refresh")
                        .short('r')
                        .long("refresh")
                        .help("Ignore stored results and screen again")
                        .takes_value(false),
                ),
        )
        .subcommand(
            SubCommand::with_name("details")
                .about("Show technical, fundamental and chart data for one stock as JSON")
                .arg(
                    Arg::with_name("symbol")
                        .short('s')
                        .long("symbol")
                        .value_name("SYMBOL")
                        .required(true)
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("history")
                .about("List recent screening sessions")
                .arg(
                    Arg::with_name("limit")
                        .short('l')
                        .long("limit")
                        .value_name("N")
                        .takes_value(true)
                        .default_value("10"),
                ),
        );

    let matches = app.get_matches();
    let mut config = Config::from_env();
    let store = ResultStore::new(&config.data_dir);

    if let Some(matches) = matches.subcommand_matches("screen") {
        let limit = parse_number(matches.value_of("limit"), "limit")?.unwrap_or(config.default_limit);
        if let Some(max) = parse_number(matches.value_of("max-symbols"), "max-symbols")? {
            config = config.with_max_universe_size(max);
        }
        let custom: Option<Vec<String>> = matches
            .value_of("symbols")
            .map(|list| list.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect());

        if !matches.is_present("refresh") && custom.is_none() {
            let fresh = store.fresh_results(chrono::Duration::hours(config.result_cache_hours))?;
            if !fresh.is_empty() {
                info!("Using {} stored results newer than {}h", fresh.len(), config.result_cache_hours);
                print_candidates(&fresh.into_iter().take(limit).collect::<Vec<_>>());
                return Ok(());
            }
        }

        let mut pipeline = ScreeningPipeline::from_config(config)?;
        if let Some(symbols) = custom {
            pipeline = pipeline.with_universe(SymbolUniverse::custom(symbols));
        }

        let outcome = pipeline.run(limit).await?;
        if outcome.rate_limited {
            warn!("Provider rate limit reached, results are partial");
        }
        store.record_run(&outcome)?;

        println!(
            "Screened {} symbols in {:.1}s",
            outcome.processed_count, outcome.session.execution_time
        );
        print_candidates(&outcome.candidates);
    } else if let Some(matches) = matches.subcommand_matches("details") {
        let Some(symbol) = matches.value_of("symbol") else {
            bail!("--symbol is required");
        };
        let pipeline = ScreeningPipeline::from_config(config)?;
        let details = pipeline.get_stock_details(symbol).await;
        println!("{}", serde_json::to_string_pretty(&details)?);
    } else if let Some(matches) = matches.subcommand_matches("history") {
        let limit = parse_number(matches.value_of("limit"), "limit")?.unwrap_or(10);
        let sessions = store.sessions()?;
        if sessions.is_empty() {
            println!("No screening sessions recorded in {}", store.sessions_path().display());
        }
        for session in sessions.iter().rev().take(limit) {
            println!(
                "{}  symbols: {:>4}  qualified: {:>3}  took {:.1}s",
                session.timestamp.with_timezone(&New_York).format("%Y-%m-%d %H:%M %Z"),
                session.symbol_count,
                session.qualified_count,
                session.execution_time
            );
        }
    } else {
        info!("No command specified. Use --help for usage information.");
    }

    Ok(())
}
