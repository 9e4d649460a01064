use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;
use webium::handlers::Deferred;
use webium::middleware::{MetricsMiddleware, TracingMiddleware};
use webium::{App, AppOptions, Handler, Outcome, Routes};

/// Demo server for webium
#[derive(Parser)]
#[command(name = "webium-demo", version, about = "Run a small webium application", long_about = None)]
struct Args {
    /// Address to bind
    #[arg(short, long, env = "WEBIUM_ADDR", default_value = "127.0.0.1:8080")]
    addr: String,

    /// Application options file (YAML, JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn init_logging(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("webium=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);

    let options = match &args.config {
        Some(path) => AppOptions::from_path(path)?,
        None => AppOptions::default(),
    };
    let metrics = Arc::new(MetricsMiddleware::new());

    let mut app = App::new(options);
    app.attach(metrics.handler())
        .attach(webium::middleware::into_handler(Arc::new(TracingMiddleware)));

    app.get("/", Handler::value(|_req, _res| Ok(Outcome::value("Hello, World!"))))?
        .get(
            "/user/:id",
            Handler::value(|req, _res| Ok(Outcome::from(json!({ "id": req.param("id") })))),
        )?
        .post(
            "/echo",
            Handler::value(|req, _res| Ok(Outcome::from(req.body.clone().unwrap_or(json!({}))))),
        )?
        .get(
            "/slow/:ms(\\d+)",
            Handler::value(|req, _res| {
                let ms: u64 = req.param("ms").and_then(|v| v.parse().ok()).unwrap_or(0);
                Ok(Outcome::from(Deferred::spawn(move || {
                    may::coroutine::sleep(std::time::Duration::from_millis(ms));
                    Ok(Outcome::value(json!({ "slept_ms": ms })))
                })))
            }),
        )?;

    let collector = Arc::clone(&metrics);
    app.get(
        "/metrics",
        Handler::continuation(move |_req, res, _next| {
            res.set_content_type("text");
            res.end(collector.render());
            Ok(None)
        }),
    )?;

    let addr = app.listen(args.addr.as_str())?;
    info!(addr = %addr, "webium demo ready");
    app.wait()?;
    Ok(())
}
