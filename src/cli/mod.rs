use crate::{
    config::EnvConfig,
    core::{FileSessionStorage, Orchestrator, ProgressSnapshot, TripStore},
    services::{normalizer::normalize_text, HttpBackend},
    types::{
        request::{DEFAULT_PACE, DEFAULT_PRIORITY, DEFAULT_TRANSPORT},
        Itinerary, TripRequest,
    },
};
use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{error, info};

/// CLI entry point for the tripgen tool
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let matches = command().get_matches();

    let env_config = EnvConfig::from_env()?;

    match matches.subcommand() {
        Some(("generate", sub)) => generate(sub, env_config).await,
        Some(("normalize", sub)) => normalize_file(sub),
        Some(("last", sub)) => print_last(sub, env_config),
        _ => Err("unknown subcommand".into()),
    }
}

fn command() -> Command {
    Command::new("tripgen")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Generate, normalize and inspect travel itineraries")
        .subcommand_required(true)
        .subcommand(
            Command::new("generate")
                .about("Generate an itinerary through the trip service")
                .args(trip_args())
                .arg(
                    Arg::new("base-url")
                        .short('u')
                        .long("base-url")
                        .value_name("URL")
                        .help("Trip service base URL (or set TRIPGEN_BASE_URL)"),
                )
                .arg(
                    Arg::new("timeout")
                        .short('t')
                        .long("timeout")
                        .value_name("SECONDS")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .help("Primary request wait budget before falling back"),
                )
                .arg(
                    Arg::new("fallback-timeout")
                        .long("fallback-timeout")
                        .value_name("SECONDS")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .help("Upper bound for the fallback request"),
                )
                .arg(session_dir_arg()),
        )
        .subcommand(
            Command::new("normalize")
                .about("Normalize a saved raw generation response")
                .arg(
                    Arg::new("file")
                        .help("File holding the raw response body")
                        .required(true)
                        .index(1),
                )
                .args(trip_args()),
        )
        .subcommand(
            Command::new("last")
                .about("Print the last itinerary stored in the session")
                .arg(session_dir_arg()),
        )
}

async fn generate(
    matches: &ArgMatches,
    env_config: EnvConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = trip_request(matches);

    let base_url = matches
        .get_one::<String>("base-url")
        .cloned()
        .unwrap_or(env_config.base_url);

    let mut config = env_config.orchestrator;
    if let Some(secs) = matches.get_one::<u64>("timeout") {
        config.primary_timeout = Duration::from_secs(*secs);
    }
    if let Some(secs) = matches.get_one::<u64>("fallback-timeout") {
        config.fallback_timeout = Duration::from_secs(*secs);
    }

    let session_dir = matches
        .get_one::<String>("session-dir")
        .map(PathBuf::from)
        .unwrap_or(env_config.session_dir);
    let store = Arc::new(TripStore::new(Arc::new(FileSessionStorage::new(
        &session_dir,
    ))));

    let backend = HttpBackend::new(base_url)?;
    info!("Generating {}-day trip to {}", request.days, request.city);
    info!("Base URL: {}", backend.base_url());

    let orchestrator = Orchestrator::new(backend)
        .with_config(config)
        .with_store(store);

    let progress = spawn_progress_printer(orchestrator.progress().subscribe());

    let result = orchestrator.submit(&request).await;
    progress.abort();
    eprintln!();

    match result {
        Ok(outcome) => {
            info!(
                "Itinerary produced by the {:?} path in {:.1}s",
                outcome.path,
                outcome.elapsed.as_secs_f64()
            );
            print_itinerary(&outcome.itinerary)?;
            Ok(())
        }
        Err(err) => {
            error!("Trip generation failed: {}", err);
            eprintln!("错误: {}", err.user_message());
            Err(err.into())
        }
    }
}

fn normalize_file(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let path = matches
        .get_one::<String>("file")
        .ok_or("a raw response file is required")?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read raw response from {path}"))?;

    let context = trip_request(matches).validated()?;
    let itinerary = normalize_text(&text, &context)?;
    print_itinerary(&itinerary)?;
    Ok(())
}

fn print_last(
    matches: &ArgMatches,
    env_config: EnvConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let session_dir = matches
        .get_one::<String>("session-dir")
        .map(PathBuf::from)
        .unwrap_or(env_config.session_dir);
    let storage = Arc::new(FileSessionStorage::new(session_dir));
    let store = TripStore::new(storage.clone());

    match store.get() {
        Some(itinerary) => print_itinerary(&itinerary)?,
        None => eprintln!("No itinerary stored in {}", storage.dir().display()),
    }
    Ok(())
}

fn print_itinerary(itinerary: &Itinerary) -> crate::Result<()> {
    println!("{}", serde_json::to_string_pretty(itinerary)?);
    Ok(())
}

fn spawn_progress_printer(
    mut updates: tokio::sync::watch::Receiver<ProgressSnapshot>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = *updates.borrow_and_update();
            if snapshot.visible {
                eprint!("\rAI 正在生成行程… {:>3.0}%", snapshot.value);
            }
        }
    })
}

fn trip_request(matches: &ArgMatches) -> TripRequest {
    let city = matches
        .get_one::<String>("city")
        .cloned()
        .unwrap_or_default();
    let days = matches.get_one::<u32>("days").copied().unwrap_or(3);
    let preferences: Vec<String> = matches
        .get_many::<String>("preference")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let mut request = TripRequest::new(city, days).with_preferences(preferences);
    if let Some(pace) = matches.get_one::<String>("pace") {
        request = request.with_pace(pace.as_str());
    }
    if let Some(transport) = matches.get_one::<String>("transport") {
        request = request.with_transport(transport.as_str());
    }
    if let Some(priority) = matches.get_one::<String>("priority") {
        request = request.with_priority(priority.as_str());
    }
    request
}

fn trip_args() -> Vec<Arg> {
    vec![
        Arg::new("city")
            .short('c')
            .long("city")
            .value_name("CITY")
            .help("Destination city")
            .required(true),
        Arg::new("days")
            .short('d')
            .long("days")
            .value_name("COUNT")
            .value_parser(clap::value_parser!(u32).range(1..=30))
            .help("Trip length in days")
            .default_value("3"),
        Arg::new("preference")
            .short('p')
            .long("preference")
            .value_name("TAG")
            .action(ArgAction::Append)
            .help("Interest preference, repeatable (自然, 美食, 文化, ...)"),
        Arg::new("pace")
            .long("pace")
            .value_name("PACE")
            .help("Travel pace")
            .default_value(DEFAULT_PACE),
        Arg::new("transport")
            .long("transport")
            .value_name("MODE")
            .help("driving, walking, transit or bicycling")
            .default_value(DEFAULT_TRANSPORT),
        Arg::new("priority")
            .long("priority")
            .value_name("PRIORITY")
            .help("Planning priority")
            .default_value(DEFAULT_PRIORITY),
    ]
}

fn session_dir_arg() -> Arg {
    Arg::new("session-dir")
        .long("session-dir")
        .value_name("DIR")
        .help("Session storage directory (or set TRIPGEN_SESSION_DIR)")
}
