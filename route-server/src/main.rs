use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use route_server::cache::TimetableCache;
use route_server::config::{Settings, SourceSettings};
use route_server::fetcher::WindowFetcher;
use route_server::source::{ConfiguredSource, MockTimetableSource, TransportApiClient};
use route_server::store::SqliteStore;
use route_server::web::{AppState, create_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "route_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    let source = match settings.source {
        SourceSettings::Live(config) => {
            info!(base_url = %config.base_url, "Using Transport API timetable source");
            ConfiguredSource::Live(TransportApiClient::new(config)?)
        }
        SourceSettings::Mock(dir) => {
            let mock = MockTimetableSource::new(&dir)?;
            let stations = mock.available_stations().await;
            info!(dir = %dir.display(), stations = stations.len(), "Using mock timetable source");
            ConfiguredSource::Mock(mock)
        }
    };

    let store = SqliteStore::connect(&settings.database_url).await?;

    info!(
        timezone = %settings.fetch.timezone,
        window_secs = settings.fetch.window.num_seconds(),
        concurrency = settings.fetch.concurrency,
        upper_bound_wait_mins = settings.route.upper_bound_wait_mins,
        max_single_journey_secs = settings.route.max_single_journey_secs,
        "Loaded configuration"
    );

    let state = AppState::new(
        TimetableCache::new(store),
        WindowFetcher::new(source, settings.fetch),
        settings.route,
    );
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    info!(%addr, "Route planner listening");
    info!("  GET /health        - Health check");
    info!("  GET /arrival_time  - Arrival time for a route, e.g. ?stations=KGX,PBO,YRK&date=2024-07-01&start_time=09:30&max_wait=30");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
