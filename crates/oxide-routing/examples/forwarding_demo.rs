//! Forwarding Demo
//!
//! Builds a small named route tree from YAML, mounts it into a host router
//! and dispatches a few requests, one of which forwards internally.
//! Run with: cargo run -p oxide-routing --example forwarding_demo

use std::sync::Arc;

use indexmap::IndexMap;
use oxide_router::{handler_fn, LoggingMiddleware, PathParams, Request, Router, RouterError};
use oxide_routing::{forward, path_for, Controller, ForwardOptions, NamedRouter, RouterOptions};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const ROUTES: &str = r"
home:
  pattern: /
  controller: pages.home
articles:
  pattern: /articles
  controller: articles.index
  routes:
    latest:
      pattern: /latest
      controller: articles.latest
    article:
      pattern: /:id
      controller: articles.show
      requirements:
        id: \d+
";

fn pages() -> Controller {
    Controller::new("pages").action(
        "home",
        handler_fn(|req, res| {
            Box::pin(async move {
                let params: PathParams = [("id", "1")].into_iter().collect();
                let link = path_for(req, "article", &params, &IndexMap::new())
                    .map_err(RouterError::from)?;
                res.send_text(format!("welcome, start at {link}"));
                Ok(())
            })
        }),
    )
}

fn articles() -> Controller {
    Controller::new("articles")
        .action(
            "index",
            handler_fn(|_req, res| {
                Box::pin(async move {
                    res.send_text("all articles");
                    Ok(())
                })
            }),
        )
        .action(
            "show",
            handler_fn(|req, res| {
                Box::pin(async move {
                    let id = req.params.get("id").unwrap_or("?");
                    res.send_text(format!("article {id} via {}", req.original_url));
                    Ok(())
                })
            }),
        )
        .action(
            "latest",
            handler_fn(|req, res| {
                Box::pin(async move {
                    forward(req, res, "article", ForwardOptions::new().param("id", "3"))
                        .await
                        .map_err(RouterError::from)
                })
            }),
        )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let routes = NamedRouter::new(RouterOptions::default())?;
    routes.register_controller(pages());
    routes.register_controller(articles());
    routes.load_str(ROUTES)?;

    let mut app = Router::new();
    app.use_middleware(Arc::new(LoggingMiddleware));
    app.use_middleware(Arc::new(routes.middleware()?));

    for path in ["/", "/articles", "/articles/2", "/articles/latest", "/articles/x"] {
        let res = app.dispatch(Request::get(path)).await;
        info!(
            path,
            status = res.status,
            body = %res.body_string().unwrap_or_default(),
            "Dispatched"
        );
    }
    Ok(())
}
