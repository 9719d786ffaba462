//! data-service sandbox
//!
//! Small command for exercising a pool against a live upstream:
//! 1. Loads pool defaults from TOML (`--config`, `DATA_SERVICE_CONFIG`, or `data-service.toml`)
//! 2. Issues `GET <route>` (default `/`)
//! 3. Logs every lifecycle event (next, error, cancel, complete)
//! 4. On Ctrl+C, aborts everything in flight and waits for settlement

use anyhow::{Context, Result};
use data_service::{Payload, Pool, PoolConfig, Status};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments
#[derive(Debug, PartialEq)]
struct Args {
    config: Option<String>,
    route: String,
}

/// `--config <path>` anywhere, first other argument is the route.
fn parse_args(args: &[String]) -> Args {
    let mut config = None;
    let mut route = None;
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config = iter.next().cloned();
        } else if route.is_none() {
            route = Some(arg.clone());
        }
    }
    Args {
        config,
        route: route.unwrap_or_else(|| "/".to_string()),
    }
}

/// Load config from the resolved path. A missing default file falls back to built-in defaults.
fn load_config(cli_path: Option<&str>) -> Result<PoolConfig> {
    let path = PoolConfig::resolve_path(cli_path);
    if cli_path.is_none() && !path.exists() {
        info!(path = %path.display(), "no config file, using defaults");
        return Ok(PoolConfig::default());
    }
    info!(path = %path.display(), "loading configuration");
    PoolConfig::load(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

fn describe(payload: &Payload) -> String {
    match payload {
        Payload::Empty => "empty".to_string(),
        Payload::Json(value) => value.to_string(),
        Payload::Text(text) => text.clone(),
        Payload::Binary(bytes) => format!("{} bytes", bytes.len()),
    }
}

/// Issue one GET and wait for it to settle, aborting on Ctrl+C.
async fn run(pool: &Pool, route: &str) -> Status {
    let (done_tx, done_rx) = oneshot::channel();
    let op = pool.get(route, None);
    op.on_next(|resp| {
        info!(
            status = resp.status,
            data = %describe(&resp.data),
            "next"
        )
    })
    .on_error(|e| error!(error = %e, "error"))
    .on_cancel(|| warn!("cancelled"))
    .on_complete(move |cancelled| {
        info!(cancelled, "complete");
        let _ = done_tx.send(());
    });

    tokio::pin!(done_rx);
    tokio::select! {
        _ = &mut done_rx => {}
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, aborting in-flight operations");
            pool.abort_all();
            let _ = done_rx.await;
        }
    }
    op.status()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let args: Vec<String> = std::env::args().collect();
    let args = parse_args(&args);
    let config = load_config(args.config.as_deref())?;

    info!(
        base_url = %config.base_url,
        timeout_ms = config.timeout_ms,
        headers = config.headers.len(),
        route = %args.route,
        "configuration loaded"
    );

    let pool = Pool::from_config(&config);
    let status = run(&pool, &args.route).await;
    info!(outcome = status.label(), in_flight = pool.in_flight(), "sandbox finished");

    println!("{}", prometheus.render());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::header;
    use axum::routing::get;
    use data_service::Defaults;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_args_defaults_route() {
        assert_eq!(
            parse_args(&args(&["sandbox"])),
            Args {
                config: None,
                route: "/".into()
            }
        );
    }

    #[test]
    fn parse_args_reads_config_and_route_in_any_order() {
        let expected = Args {
            config: Some("/etc/ds.toml".into()),
            route: "/items".into(),
        };
        assert_eq!(
            parse_args(&args(&["sandbox", "--config", "/etc/ds.toml", "/items"])),
            expected
        );
        assert_eq!(
            parse_args(&args(&["sandbox", "/items", "--config", "/etc/ds.toml"])),
            expected
        );
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let err = load_config(Some("/nonexistent/ds.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to load config"), "got: {err}");
    }

    #[test]
    fn describe_summarizes_payloads() {
        assert_eq!(describe(&Payload::Empty), "empty");
        assert_eq!(describe(&Payload::Text("hi".into())), "hi");
        assert_eq!(
            describe(&Payload::Json(serde_json::json!({"a": 1}))),
            r#"{"a":1}"#
        );
        assert_eq!(
            describe(&Payload::Binary(vec![1u8, 2, 3].into())),
            "3 bytes"
        );
    }

    #[tokio::test]
    async fn run_settles_against_live_upstream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let app = Router::new().route(
                "/items",
                get(|| async { ([(header::CONTENT_TYPE, "application/json")], r#"{"a":1}"#) }),
            );
            axum::serve(listener, app).await.unwrap();
        });

        let pool = Pool::with_client(
            reqwest::Client::new(),
            Defaults {
                base_url: format!("http://{addr}"),
                timeout: Duration::from_secs(5),
                ..Defaults::default()
            },
        );
        let status = run(&pool, "/items").await;
        assert_eq!(status, Status::Succeeded);
        assert_eq!(pool.in_flight(), 0);
        server.abort();
    }
}
