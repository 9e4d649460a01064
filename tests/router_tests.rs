//! Registration surface tests through the public API
//!
//! Covers the `Routes` operations shared by `Router` and `App`, the query
//! operations (`contains`, `methods`), and merge behaviour between units.

use http::Method;
use regex::Regex;
use webium::router::{Matcher, PathSpec, RouteError, METHODS};
use webium::{App, Handler, Mode, Outcome, Router, Routes};

fn ok(body: &'static str) -> Handler {
    Handler::value(move |_req, _res| Ok(Outcome::value(body)))
}

fn verb_zoo() -> Router {
    let mut router = Router::new();
    router
        .get("/", ok("root"))
        .unwrap()
        .get("/zoo/animals", ok("list"))
        .unwrap()
        .post("/zoo/animals", ok("create"))
        .unwrap()
        .get("/zoo/animals/:id", ok("show"))
        .unwrap()
        .put("/zoo/animals/:id", ok("update"))
        .unwrap()
        .patch("/zoo/animals/:id", ok("patch"))
        .unwrap()
        .delete("/zoo/animals/:id", ok("delete"))
        .unwrap()
        .head("/zoo/health", ok("health"))
        .unwrap()
        .options("/zoo/health", ok("options"))
        .unwrap();
    router
}

#[test]
fn test_contains_every_registration() {
    let router = verb_zoo();
    let pairs = [
        ("GET", "/"),
        ("GET", "/zoo/animals"),
        ("POST", "/zoo/animals"),
        ("GET", "/zoo/animals/:id"),
        ("PUT", "/zoo/animals/:id"),
        ("PATCH", "/zoo/animals/:id"),
        ("DELETE", "/zoo/animals/:id"),
        ("HEAD", "/zoo/health"),
        ("OPTIONS", "/zoo/health"),
    ];
    for (method, path) in pairs {
        assert!(router.contains(method, path, None), "{method} {path}");
    }
    assert!(!router.contains("DELETE", "/zoo/animals", None));
    assert!(!router.contains("GET", "/zoo/animals/:name", None));
}

#[test]
fn test_contains_survives_unrelated_merge() {
    let mut router = verb_zoo();
    let mut other = Router::new();
    other.get("/keepers", ok("keepers")).unwrap();
    router.attach(other);
    assert!(router.contains("GET", "/zoo/animals", None));
    assert!(router.contains("get", "/keepers", None));
    assert_eq!(router.routes().len(), 5);
}

#[test]
fn test_methods_reports_registered_verbs() {
    let router = verb_zoo();
    let mut methods = router.methods("/zoo/animals/:id");
    methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(
        methods,
        vec![Method::DELETE, Method::GET, Method::PATCH, Method::PUT]
    );
    assert!(router.methods("/unknown").is_empty());
}

#[test]
fn test_contains_specific_handler_instance() {
    let mut router = Router::new();
    let handler = ok("a");
    let other = ok("a");
    router.get("/a", handler.clone()).unwrap();
    assert!(router.contains("GET", "/a", Some(&handler)));
    assert!(!router.contains("GET", "/a", Some(&other)));
}

#[test]
fn test_all_and_any() {
    let mut router = Router::new();
    router.all("/every", ok("every")).unwrap();
    router.any("/anything", ok("any")).unwrap();
    for method in &METHODS {
        assert!(router.contains(method.as_str(), "/every", None));
        assert!(router.contains(method.as_str(), "/anything", None));
    }
    assert_eq!(router.methods("/every").len(), METHODS.len());
}

#[test]
fn test_unique_mode_replaces_chain() {
    let mut router = Router::new();
    let first = ok("first");
    let second = ok("second");
    router.get("/r", first.clone()).unwrap();
    router.get("/r", ok("extra")).unwrap();
    router.method_unique("get", "/r", second.clone()).unwrap();
    let entry = router.entry("/r").unwrap();
    let chain = entry.handlers_for(&Method::GET).unwrap();
    assert_eq!(chain.len(), 1);
    assert!(chain[0].same(&second));

    router
        .method_with_mode("GET", "/r", first.clone(), Mode::Append)
        .unwrap();
    assert_eq!(router.entry("/r").unwrap().handlers_for(&Method::GET).unwrap().len(), 2);
}

#[test]
fn test_custom_method_names() {
    let mut router = Router::new();
    router.method("purge", "/cache", ok("purged")).unwrap();
    assert!(router.contains("PURGE", "/cache", None));
    let err = router.method("bad method", "/cache", ok("x")).unwrap_err();
    assert!(matches!(err, RouteError::InvalidMethod { .. }));
}

#[test]
fn test_invalid_pattern_is_reported_at_registration() {
    let mut router = Router::new();
    let err = router.get("/files/:name([a-z", ok("x")).unwrap_err();
    assert!(matches!(
        err,
        RouteError::MalformedTemplate { .. } | RouteError::InvalidPattern { .. }
    ));
    assert!(router.routes().is_empty());
}

#[test]
fn test_regex_spec_registration() {
    let mut router = Router::new();
    let spec = PathSpec::from(Regex::new(r"^/v(?P<version>\d+)/status$").unwrap());
    router.get(spec.clone(), ok("status")).unwrap();
    assert!(router.contains("GET", spec, None));
    let entry = &router.routes()[0];
    assert_eq!(entry.param_names(), vec!["version"]);
}

#[test]
fn test_matcher_against_paths() {
    let matcher = Matcher::compile(&PathSpec::from("/zoo/animals/:id"), false).unwrap();
    let params = matcher.matches("/zoo/animals/42").unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(&*params[0].0, "id");
    assert_eq!(params[0].1, "42");
    assert!(matcher.matches("/zoo/animals/42/").is_some());
    assert!(matcher.matches("/zoo/animals").is_none());
    assert!(matcher.matches("/zoo/animals/42/legs").is_none());
}

#[test]
fn test_merge_keeps_middleware_order_and_unions_chains() {
    let mut target = Router::new();
    let t_mw = ok("t");
    let s_mw = ok("s");
    target.attach(t_mw.clone());
    target.get("/shared", ok("target")).unwrap();

    let mut source = Router::new();
    source.attach(s_mw.clone());
    source.get("/shared", ok("source")).unwrap();
    source.post("/shared", ok("post")).unwrap();

    target.attach(&source);
    assert_eq!(target.middleware().len(), 2);
    assert!(target.middleware()[0].same(&t_mw));
    assert!(target.middleware()[1].same(&s_mw));
    assert_eq!(target.routes().len(), 1);
    let shared = target.entry("/shared").unwrap();
    assert_eq!(shared.handlers_for(&Method::GET).unwrap().len(), 2);
    assert!(shared.handlers_for(&Method::POST).is_some());
    // attaching by reference leaves the source intact
    assert_eq!(source.routes().len(), 1);
}

#[test]
fn test_app_shares_registration_surface() {
    let mut app = App::default();
    app.get("/zoo", ok("zoo"))
        .unwrap()
        .post("/zoo", ok("zoo-post"))
        .unwrap();
    app.attach(verb_zoo());
    assert!(app.router().contains("GET", "/zoo", None));
    assert!(app.router().contains("POST", "/zoo/animals", None));
    // two body units plus nothing from the merged unit
    assert_eq!(app.router().middleware().len(), 2);
}
