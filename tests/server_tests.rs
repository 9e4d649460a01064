//! End-to-end tests over a real listener
//!
//! # Test Strategy
//!
//! Each test builds an `App`, starts it on a free local port through
//! `TestServer` (closed on drop) and talks raw HTTP/1.1 over `TcpStream`.
//!
//! # Coverage
//!
//! - Route params, 404 and 405 through the wire
//! - JSON body decoding from a real request body
//! - Header capitalization, cookies, redirects and JSONP as sent to clients
//! - HEAD responses without a body
//! - Concurrent clients

use std::thread;

use serde_json::json;
use webium::config::Jsonp;
use webium::{App, AppOptions, Cookie, Handler, Outcome, Routes};

mod common;
use common::http::{parse_response, send_request};
use common::test_server::TestServer;

fn demo_app(options: AppOptions) -> App {
    let mut app = App::new(options);
    app.get(
        "/user/:id",
        Handler::value(|req, _res| Ok(Outcome::from(json!({ "id": req.param("id") })))),
    )
    .unwrap()
    .post(
        "/echo",
        Handler::value(|req, _res| Ok(Outcome::from(req.body.clone().unwrap_or(json!({}))))),
    )
    .unwrap()
    .get(
        "/cookie",
        Handler::value(|req, res| {
            res.set_cookie(&Cookie::new("seen", "yes").path("/"));
            let theme = req.cookies.get("theme").cloned();
            Ok(Outcome::from(json!({ "theme": theme })))
        }),
    )
    .unwrap()
    .get(
        "/old",
        Handler::continuation(|_req, res, _next| {
            res.redirect("/new", None);
            Ok(None)
        }),
    )
    .unwrap()
    .get(
        "/data",
        Handler::value(|_req, _res| Ok(Outcome::from(json!({"n": 1})))),
    )
    .unwrap()
    .head(
        "/data",
        Handler::value(|_req, res| {
            res.send(json!(null));
            Ok(Outcome::NoResult)
        }),
    )
    .unwrap();
    app
}

#[test]
fn test_route_param_over_wire() {
    let server = TestServer::start(demo_app(AppOptions::default()));
    let resp = send_request(
        &server.addr(),
        "GET /user/42 HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    let parsed = parse_response(&resp);
    assert_eq!(parsed.status, 200);
    assert_eq!(parsed.json(), json!({"id": "42"}));
    assert!(parsed
        .header("content-type")
        .unwrap()
        .starts_with("application/json"));
}

#[test]
fn test_not_found_and_method_not_allowed_over_wire() {
    let server = TestServer::start(demo_app(AppOptions::default()));
    let resp = send_request(
        &server.addr(),
        "GET /does-not-exist HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    let parsed = parse_response(&resp);
    assert_eq!(parsed.status, 404);
    assert_eq!(parsed.body, "404");

    let resp = send_request(
        &server.addr(),
        "DELETE /user/42 HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    assert_eq!(parse_response(&resp).status, 405);
}

#[test]
fn test_json_body_over_wire() {
    let server = TestServer::start(demo_app(AppOptions::default()));
    let body = r#"{"hello":"world"}"#;
    let req = format!(
        "POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let parsed = parse_response(&send_request(&server.addr(), &req));
    assert_eq!(parsed.status, 200);
    assert_eq!(parsed.json(), json!({"hello": "world"}));
}

#[test]
fn test_cookies_round_trip() {
    let server = TestServer::start(demo_app(AppOptions::default()));
    let resp = send_request(
        &server.addr(),
        "GET /cookie HTTP/1.1\r\nHost: localhost\r\nCookie: theme=dark; other=1\r\n\r\n",
    );
    let parsed = parse_response(&resp);
    assert_eq!(parsed.json(), json!({"theme": "dark"}));
    assert!(parsed.header("set-cookie").unwrap().starts_with("seen=yes"));
    assert!(resp.contains("Set-Cookie:"));
}

#[test]
fn test_redirect_over_wire() {
    let server = TestServer::start(demo_app(AppOptions::default()));
    let parsed = parse_response(&send_request(
        &server.addr(),
        "GET /old HTTP/1.1\r\nHost: localhost\r\n\r\n",
    ));
    assert_eq!(parsed.status, 302);
    assert_eq!(parsed.header("location"), Some("/new"));
}

#[test]
fn test_jsonp_callback() {
    let options = AppOptions {
        jsonp: Jsonp::Toggle(true),
        ..AppOptions::default()
    };
    let server = TestServer::start(demo_app(options));
    let parsed = parse_response(&send_request(
        &server.addr(),
        "GET /data?callback=handle HTTP/1.1\r\nHost: localhost\r\n\r\n",
    ));
    assert_eq!(parsed.status, 200);
    assert_eq!(
        parsed.body,
        "/**/ typeof handle === 'function' && handle({\"n\":1});"
    );
    assert!(parsed
        .header("content-type")
        .unwrap()
        .starts_with("application/javascript"));
}

#[test]
fn test_head_has_no_body() {
    let server = TestServer::start(demo_app(AppOptions::default()));
    let parsed = parse_response(&send_request(
        &server.addr(),
        "HEAD /data HTTP/1.1\r\nHost: localhost\r\n\r\n",
    ));
    assert_eq!(parsed.status, 200);
    assert!(parsed.body.is_empty());
}

#[test]
fn test_concurrent_clients() {
    let server = TestServer::start(demo_app(AppOptions::default()));
    let addr = server.addr();
    let clients: Vec<_> = (0..16)
        .map(|i| {
            thread::spawn(move || {
                let req = format!("GET /user/{i} HTTP/1.1\r\nHost: localhost\r\n\r\n");
                parse_response(&send_request(&addr, &req)).json()
            })
        })
        .collect();
    for (i, client) in clients.into_iter().enumerate() {
        assert_eq!(client.join().unwrap(), json!({ "id": i.to_string() }));
    }
}

#[test]
fn test_listen_twice_fails() {
    common::test_server::setup_may_runtime();
    let mut app = demo_app(AppOptions::default());
    let addr = app.listen(common::test_server::free_addr()).unwrap();
    assert_eq!(app.local_addr(), Some(addr));
    assert!(app.listen(common::test_server::free_addr()).is_err());
    app.close();
    assert!(app.local_addr().is_none());
}
