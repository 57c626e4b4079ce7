use std::{process, sync::Arc};

use lectern::{
    application::{
        error::AppError,
        query::ContentQuery,
        resolver::{ContentResolver, ResolverSettings},
        router::QueryRouter,
    },
    cache::{CacheConfig, CacheKey, CacheManager, MemoryKvStore},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, EdgeState},
        telemetry,
    },
};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Resolve(args) => run_resolve(settings, args).await,
    }
}

async fn init_resolver(settings: &config::Settings) -> Result<ContentResolver, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    let repositories = PostgresRepositories::new(pool);
    repositories
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let resolver_settings = ResolverSettings {
        default_project_slug: settings.content.default_project_slug.clone(),
        boolean_policy: settings.content.boolean_strings,
    };
    Ok(ContentResolver::new(Arc::new(repositories), resolver_settings))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let resolver = init_resolver(&settings).await?;
    let router = Arc::new(QueryRouter::new(resolver));

    let cache_config = CacheConfig::from(&settings.cache);
    let store = Arc::new(MemoryKvStore::new(cache_config.max_entries_non_zero()));
    let cache = Arc::new(CacheManager::new(store, cache_config));

    let state = EdgeState::new(router, cache, settings.auth.cache_clear_token.clone());
    let app = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "lectern::serve",
        addr = %settings.server.addr,
        cache_enabled = settings.cache.enabled,
        "edge service listening"
    );

    let (stop_tx, mut stop_rx) = watch::channel(());
    let server = axum::serve(listener, app.into_make_service()).with_graceful_shutdown(async move {
        let _ = stop_rx.changed().await;
    });
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server => return server_outcome(result),
        () = shutdown_signal() => {}
    }

    info!(
        target = "lectern::serve",
        grace_seconds = settings.server.graceful_shutdown.as_secs(),
        "shutdown requested, draining connections"
    );
    let _ = stop_tx.send(());
    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(result) => server_outcome(result),
        Err(_) => {
            warn!(
                target = "lectern::serve",
                "graceful shutdown window elapsed, dropping open connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn server_outcome(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::from(InfraError::server(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target = "lectern::serve", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn run_resolve(
    settings: config::Settings,
    args: config::ResolveArgs,
) -> Result<(), AppError> {
    let params: Map<String, Value> = serde_json::from_str(&args.params)
        .map_err(|err| AppError::validation(format!("--params must be a JSON object: {err}")))?;

    let query = ContentQuery::new(args.method, params).with_version(args.deployed_version_id);
    let key = CacheKey::for_query(&settings.cache.namespace, &query);
    info!(
        target = "lectern::resolve",
        method = %query.method,
        cache_key = %key.key,
        "resolving query"
    );

    let router = QueryRouter::new(init_resolver(&settings).await?);
    let response = router.dispatch(&query.method, query.params).await;
    let rendered = serde_json::to_string_pretty(&response)
        .map_err(|err| AppError::unexpected(format!("failed to encode response: {err}")))?;
    println!("{rendered}");
    Ok(())
}
