use growth_screener::config::Config;
use growth_screener::services::ResultStore;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Config::from_env();
    let store = ResultStore::new(&config.data_dir);
    store.init()?;

    println!(
        "Created empty result store: {}, {}",
        store.results_path().display(),
        store.sessions_path().display()
    );
    Ok(())
}
