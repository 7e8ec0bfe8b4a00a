// Free-agent market entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database
// 4. Load inputs and run free agency
// 5. Print signings, final caps, and top needs

use capmarket_app::config;
use capmarket_app::db;
use capmarket_app::pipeline;
use capmarket_engine::market::ledger::CapEntry;
use capmarket_engine::report;

use anyhow::Context;
use tracing::info;

fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, stdout is for the report)
    init_tracing()?;
    info!("capmarket starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: market={}, season={:?}, {} rounds",
        config.market.name, config.market.season, config.auction.rounds
    );

    // 3. Open database
    let db = db::Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    // 4. Load inputs and run free agency
    let base_dir = std::env::current_dir().context("failed to read current directory")?;
    let summary = pipeline::run(&config, &base_dir, &db)?;

    // 5. Print the results
    println!(
        "{}: {} free agents, {} teams (run {})",
        config.market.name, summary.free_agents, summary.teams, summary.run_id
    );
    println!();
    println!("Highest needs before free agency:");
    print!("{}", report::render_top_matches(&summary.top_matches));

    for round in &summary.outcome.rounds {
        println!();
        println!(
            "Round {} ({} waves, spent {:.3}):",
            round.round,
            round.auction.waves,
            round.auction.total_spent()
        );
        print!("{}", report::render_signings(&round.auction.signings));
    }

    println!();
    println!("Remaining cap:");
    let caps: Vec<_> = summary
        .outcome
        .teams
        .iter()
        .map(|t| CapEntry {
            team: t.name.clone(),
            remaining: t.cap,
        })
        .collect();
    print!("{}", report::render_caps(&caps));

    if !summary.outcome.unsigned.is_empty() {
        let names: Vec<&str> = summary.outcome.unsigned.iter().map(|p| p.name.as_str()).collect();
        println!();
        println!("Unsigned: {}", names.join(", "));
    }

    println!();
    for path in &summary.output_files {
        println!("Wrote {}", path.display());
    }

    info!("capmarket finished run {}", summary.run_id);
    Ok(())
}

/// Initialize tracing to log to `logs/capmarket.log`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("capmarket.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("capmarket=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
