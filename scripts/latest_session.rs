use growth_screener::config::Config;
use growth_screener::services::ResultStore;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let config = Config::from_env();
    let store = ResultStore::new(&config.data_dir);
    if !store.sessions_path().exists() {
        return Err(format!(
            "{} does not exist, run 'growth_screener screen' first",
            store.sessions_path().display()
        )
        .into());
    }

    match store.latest_session()? {
        Some(session) => {
            println!("Last screening: {}", session.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Symbols processed: {}", session.symbol_count);
            println!("Qualified: {}", session.qualified_count);
            println!("Execution time: {:.1}s", session.execution_time);
        }
        None => println!("No screening sessions recorded"),
    }

    Ok(())
}
