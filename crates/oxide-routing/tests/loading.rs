//! Tests for loading route tables from YAML files.

mod common;
use common::*;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use oxide_router::{handler_fn, JsonBodyParser, Request};
use oxide_routing::{
    Controller, ForwardOptions, RouteConfig, RouterEvent, RouterOptions, RoutingError,
};

fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn admin_controller(log: &Log) -> Controller {
    Controller::new("admin")
        .action("home", reply(log, "home"))
        .action("dashboard", reply(log, "dashboard"))
        .action("users", describe(log, "users"))
}

#[tokio::test]
async fn nested_resources_resolve_relative_to_their_file() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "routes.yml",
        "home:\n  pattern: /\n  controller: admin.home\nadmin:\n  pattern: /admin\n  resource: admin/routes.yml\n",
    );
    write(
        dir.path(),
        "admin/routes.yml",
        "dashboard:\n  pattern: /dashboard\n  controller: admin.dashboard\npeople:\n  pattern: /people\n  resource: people.yml\n",
    );
    write(
        dir.path(),
        "admin/people.yml",
        "people_list:\n  controller: admin.users\n",
    );

    let log = log();
    let router = router_with(RouterOptions::default().base_path(dir.path()));
    router.register_controller(admin_controller(&log));
    let created = router.load_file("routes.yml").unwrap();
    assert_eq!(created.keys().collect::<Vec<_>>(), vec!["home", "admin"]);
    assert_eq!(
        router.route_names(),
        vec!["home", "admin", "dashboard", "people", "people_list"]
    );

    assert_eq!(
        router
            .path_for("people_list", &params(&[]), &no_query())
            .unwrap(),
        "/admin/people"
    );
    let res = send(&router, Request::get("/admin/dashboard")).await;
    assert_eq!(body(&res), "dashboard");
    let res = send(&router, Request::get("/admin/people")).await;
    assert_eq!(body(&res), "users GET /");
}

#[test]
fn duplicate_names_across_files_fail() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "routes.yml",
        "home:\n  pattern: /\n  controller: admin.home\nadmin:\n  pattern: /admin\n  resource: admin.yml\n",
    );
    write(dir.path(), "admin.yml", "home:\n  pattern: /home\n  controller: admin.home\n");

    let log = log();
    let router = router_with(RouterOptions::default().base_path(dir.path()));
    router.register_controller(admin_controller(&log));
    let err = router.load_file("routes.yml").unwrap_err();
    assert!(matches!(err, RoutingError::Config(ref message) if message.contains("'home'")));

    let err = router
        .load_str("home:\n  pattern: /\n  controller: admin.home\nhome:\n  pattern: /home\n  controller: admin.dashboard\n")
        .unwrap_err();
    assert!(matches!(err, RoutingError::Config(ref message) if message.contains("'home'")));
    assert!(router.route_names().is_empty());
}

#[tokio::test]
async fn failed_load_leaves_no_routes_behind() {
    let log = log();
    let router = router();
    router.register_controller(admin_controller(&log));
    router
        .load_str("home:\n  pattern: /\n  controller: admin.home\n")
        .unwrap();

    let err = router
        .load_str(
            "dashboard:\n  pattern: /dashboard\n  controller: admin.dashboard\nadmin:\n  pattern: /admin\n  routes:\n    people:\n      controller: admin.users\n    broken:\n      pattern: /broken\n      controller: admin.vanish\n",
        )
        .unwrap_err();
    assert!(matches!(err, RoutingError::Config(_)));
    assert_eq!(router.route_names(), vec!["home"]);

    router
        .load_str("dashboard:\n  pattern: /dashboard\n  controller: admin.dashboard\n")
        .unwrap();
    assert_eq!(router.route_names(), vec!["home", "dashboard"]);
    let res = send(&router, Request::get("/dashboard")).await;
    assert_eq!(body(&res), "dashboard");
}

#[test]
fn missing_and_malformed_files() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "broken.yml", "home: [unclosed\n");
    write(dir.path(), "unknown.yml", "home:\n  controller: admin.home\n  colour: red\n");

    let router = router_with(RouterOptions::default().base_path(dir.path()));
    router.register_controller(admin_controller(&log()));

    assert!(matches!(
        router.load_file("absent.yml"),
        Err(RoutingError::Io { .. })
    ));
    assert!(matches!(
        router.load_file("broken.yml"),
        Err(RoutingError::Parse { .. })
    ));
    assert!(matches!(
        router.load_file("unknown.yml"),
        Err(RoutingError::Parse { .. })
    ));
}

#[test]
fn empty_file_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "empty.yml", "");

    let router = router_with(RouterOptions::default().base_path(dir.path()));
    assert!(router.load_file("empty.yml").unwrap().is_empty());
    assert!(router.route_names().is_empty());
}

#[test]
fn reserved_names_and_bare_entries_are_rejected() {
    let router = router();
    router.register_controller(admin_controller(&log()));
    assert!(matches!(
        router.load_str("bad#name:\n  controller: admin.home\n"),
        Err(RoutingError::Config(_))
    ));
    assert!(matches!(
        router.load_str("bare:\n  pattern: /bare\n"),
        Err(RoutingError::Config(_))
    ));
    assert!(matches!(
        router.load_str("ghost:\n  controller: admin.vanish\n"),
        Err(RoutingError::Config(_))
    ));
}

#[test]
fn requirement_without_parameter() {
    let yaml = "home:\n  pattern: /\n  controller: admin.home\n  requirements:\n    id: \\d+\n";

    let strict = router();
    strict.register_controller(admin_controller(&log()));
    assert!(matches!(
        strict.load_str(yaml),
        Err(RoutingError::Pattern { .. })
    ));

    let lenient = router_with(RouterOptions::default().strict_requirements(false));
    lenient.register_controller(admin_controller(&log()));
    assert!(lenient.load_str(yaml).is_ok());
}

#[tokio::test]
async fn inline_routes_and_controller_prefix() {
    let log = log();
    let router = router_with(RouterOptions::default().controller_prefix("app/controllers"));
    router.controllers().register("./admin", {
        let log = Arc::clone(&log);
        move || admin_controller(&log)
    });

    let node = router
        .add_route(
            "panel",
            RouteConfig::segment("/panel")
                .route("dash", RouteConfig::action("/dash", "../controllers/admin.dashboard"))
                .meta("section", "ops"),
        )
        .unwrap();
    assert_eq!(node.metadata()["section"], "ops");

    let res = send(&router, Request::get("/panel/dash")).await;
    assert_eq!(body(&res), "dashboard");
}

#[tokio::test]
async fn before_mount_listener_can_attach_middleware() {
    let router = router();
    router.on_event(|event| {
        if let RouterEvent::BeforeMount(node) = event {
            if node.metadata().get("body").and_then(|v| v.as_str()) == Some("json") {
                let _ = node.use_middleware(Arc::new(JsonBodyParser), None);
            }
        }
    });
    router.register_controller(
        Controller::new("items")
            .action(
                "create",
                handler_fn(|req, res| {
                    Box::pin(async move {
                        let name = req
                            .body
                            .parsed()
                            .and_then(|v| v.get("name").and_then(|n| n.as_str().map(String::from)))
                            .unwrap_or_else(|| "-".to_string());
                        res.send_text(name);
                        Ok(())
                    })
                }),
            )
            .action(
                "submit",
                forwarder(&log(), "submit", "create", ForwardOptions::new()),
            ),
    );
    router
        .load_str(
            "create:\n  pattern: /items\n  controller: items.create\n  methods: post\n  metadata:\n    body: json\nsubmit:\n  pattern: /submit\n  controller: items.submit\n  methods: post\n",
        )
        .unwrap();

    let res = send(&router, Request::post("/items").body(r#"{"name":"widget"}"#)).await;
    assert_eq!(body(&res), "widget");
    let res = send(&router, Request::post("/submit").body(r#"{"name":"gadget"}"#)).await;
    assert_eq!(body(&res), "gadget");
}
