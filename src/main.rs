use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use sharkiya_lib::{
    config::{AppConfig, ConfigStore},
    db::{open_store, SqliteStore},
    evaluate,
    filters::{apply_filters, DatePreset, FilterCriteria},
    models::Event,
    sort::{sorted, SortOption},
    state::InteractionState,
    stats::events_stats,
    utils, Action,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    #[arg(long, global = true, help = "Config file (defaults to <data dir>/config.json)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter and sort the catalog once
    List {
        #[arg(long)]
        city: Option<String>,
        #[arg(long = "category", help = "Accepted category, repeatable")]
        categories: Vec<String>,
        #[arg(long, value_parser = parse_preset, default_value = "All")]
        date: DatePreset,
        #[arg(long)]
        max_price: Option<f64>,
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, value_parser = parse_sort, default_value = "Date (Soonest)")]
        sort: SortOption,
        #[arg(long, help = "Center the radius on a configured city")]
        near: Option<String>,
        #[arg(long, requires = "lon")]
        lat: Option<f64>,
        #[arg(long, requires = "lat")]
        lon: Option<f64>,
        #[arg(long, default_value_t = 0.0)]
        radius_km: f64,
        #[arg(long)]
        json: bool,
    },
    /// Catalog summary
    Stats,
    /// Run one interaction cycle against persisted session state
    Cycle {
        #[arg(long, help = "Session state file (defaults to <data dir>/session.json)")]
        state: Option<PathBuf>,
        #[arg(long, help = "JSON array of actions")]
        actions: Option<PathBuf>,
    },
    /// Import events from a JSON array into the database
    Import { path: PathBuf },
    /// Export every database event as JSON
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_preset(raw: &str) -> Result<DatePreset, String> {
    DatePreset::from_label(raw).ok_or_else(|| format!("unknown date preset: {raw}"))
}

fn parse_sort(raw: &str) -> Result<SortOption, String> {
    SortOption::from_label(raw).ok_or_else(|| format!("unknown sort option: {raw}"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing log subscriber")?;

    let config = match cli.config {
        Some(path) => ConfigStore::load_from(path),
        None => ConfigStore::load(),
    }
    .read();
    let now = config.local_now().context("resolving local time")?;

    match cli.command {
        Commands::List {
            city,
            categories,
            date,
            max_price,
            search,
            sort,
            near,
            lat,
            lon,
            radius_km,
            json,
        } => {
            let events = load_events(&config)?;
            let center = match (near, lat, lon) {
                (Some(name), _, _) => config
                    .city(&name)
                    .map(|c| c.coordinates())
                    .ok_or_else(|| anyhow!("unknown city: {name}"))?,
                (None, Some(lat), Some(lon)) => sharkiya_lib::geo::Coordinates::new(lat, lon),
                _ => config.default_center,
            };
            let mut criteria = FilterCriteria::default()
                .with_categories(categories)
                .with_date_preset(date)
                .with_search(search)
                .with_circle(center, radius_km.min(config.max_radius_km));
            criteria.city = city;
            criteria.max_price = max_price.or(config.default_max_price);

            let geo_active = criteria.geo_active();
            let result = sorted(apply_filters(&events, &criteria, now), sort, geo_active);
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_events(&result, events.len());
            }
        }
        Commands::Stats => {
            let events = load_events(&config)?;
            let stats = events_stats(&events, now);
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Cycle { state, actions } => {
            let state_path = state.unwrap_or_else(utils::session_path);
            let mut session = read_session(&state_path, &config)?;
            let actions: Vec<Action> = match actions {
                Some(path) => {
                    let raw = fs::read_to_string(&path)
                        .with_context(|| format!("reading actions {}", path.display()))?;
                    serde_json::from_str(&raw)
                        .with_context(|| format!("parsing actions {}", path.display()))?
                }
                None => Vec::new(),
            };

            let events = load_events(&config)?;
            let view = evaluate(&mut session, &events, &actions, &config, now);
            println!("{}", serde_json::to_string_pretty(&view)?);

            utils::ensure_parent(&state_path);
            fs::write(&state_path, serde_json::to_string_pretty(&session)?)
                .with_context(|| format!("writing session {}", state_path.display()))?;
        }
        Commands::Import { path } => {
            let store = SqliteStore::open_default(&config).context("opening event database")?;
            let result = store.import_json(&path);
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.failed > 0 {
                warn!(failed = result.failed, "some events were not imported");
            }
        }
        Commands::Export { output } => {
            let store = SqliteStore::open_default(&config).context("opening event database")?;
            let exported = store.export_json().context("exporting events")?;
            match output {
                Some(path) => {
                    utils::ensure_parent(&path);
                    fs::write(&path, exported)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "exported events");
                }
                None => println!("{exported}"),
            }
        }
    }

    Ok(())
}

fn load_events(config: &AppConfig) -> anyhow::Result<Vec<Event>> {
    let store = open_store(config).context("opening event store")?;
    let loaded = store.load();
    for diagnostic in &loaded.diagnostics {
        eprintln!("warning: {diagnostic}");
    }
    Ok(loaded.events)
}

fn read_session(path: &Path, config: &AppConfig) -> anyhow::Result<InteractionState> {
    if !path.exists() {
        return Ok(InteractionState::new(config.default_center));
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading session {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing session {}", path.display()))
}

fn print_events(events: &[Event], total: usize) {
    println!("{} of {} events", events.len(), total);
    for event in events {
        let distance = utils::format_distance(event.distance_km)
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        println!(
            "{:<16} {:<24} {}  {}, {}  {}{}",
            event.id,
            event.title,
            utils::format_when(&event.date_start),
            event.venue,
            event.city,
            utils::format_price(event.price),
            distance
        );
    }
}
