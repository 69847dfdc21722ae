use crate::utils::{http_mocker, init_logging, RecordingReporter};
use bytes::Bytes;
use chatmock::{response, Error, MockerBuilder, TestReporter, ACCESS_LOG_ENV, HTTPS_ENV};
use http::{Method, Request, Response, StatusCode};
use std::{
    io::Write,
    net::{TcpListener, TcpStream},
    sync::mpsc,
    thread,
    time::Duration,
};

fn no_content(_: &Request<Bytes>, _: &dyn TestReporter) -> Response<Bytes> {
    response::no_content()
}

#[test]
fn drained_mocker_finalizes_cleanly() {
    let (mocker, reporter) = http_mocker();
    mocker.register("Gateway", Method::GET, "/gateway", |_, _| {
        response::json(StatusCode::OK, &serde_json::json!({"url": "wss://gateway"}))
    });

    let res = mocker
        .blocking_client()
        .get(mocker.url("/gateway"))
        .send()
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    mocker.finalize();
    reporter.assert_no_failures();
}

#[test]
fn uninvoked_handlers_are_reported_on_finalize() {
    let (mocker, reporter) = http_mocker();
    mocker.register("Channel", Method::GET, "/channels/1", no_content);
    mocker.register("Channel", Method::GET, "/channels/1", no_content);
    mocker.register("Channel", Method::GET, "/channels/1", no_content);
    mocker.register("DeleteChannel", Method::DELETE, "/channels/1", no_content);
    mocker.register("Guild", Method::GET, "/guilds/7", no_content);

    mocker
        .blocking_client()
        .get(mocker.url("/channels/1"))
        .send()
        .unwrap();

    mocker.finalize();
    // Only the first call reports.
    mocker.finalize();

    let failures = reporter.failures();
    assert_eq!(failures.len(), 1);

    let report = &failures[0];
    assert!(report.starts_with("there are uninvoked handlers:"));
    assert!(report.contains("/channels/1:"));
    assert!(report.contains("/guilds/7:"));

    let line = |name: &str| {
        report
            .lines()
            .map(str::trim)
            .find(|l| l.starts_with(&format!("{}:", name)))
            .unwrap_or_else(|| panic!("no line for {} in {}", name, report))
            .to_string()
    };
    assert!(line("Channel").ends_with("2 uninvoked handlers"));
    assert!(line("DeleteChannel").ends_with("1 uninvoked handler"));
    assert!(line("Guild").ends_with("1 uninvoked handler"));
}

#[test]
fn drop_finalizes() {
    let (mocker, reporter) = http_mocker();
    mocker.register("Invite", Method::GET, "/invites/abc", |_, _| {
        response::no_content()
    });

    drop(mocker);

    let failures = reporter.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("Invite"));
}

#[test]
fn close_stops_serving() {
    let (mocker, reporter) = http_mocker();
    let client = mocker.blocking_client();
    let url = mocker.url("/gateway");

    mocker.close();

    assert!(client.get(url).send().is_err());
    mocker.finalize();
    reporter.assert_no_failures();
}

#[test]
fn forks_evolve_independently() {
    let (base, base_reporter) = http_mocker();
    base.register("Guild", Method::GET, "/guilds/1", |_, _| {
        response::raw(StatusCode::OK, "text/plain", "first")
    });
    base.register("Guild", Method::GET, "/guilds/1", |_, _| {
        response::raw(StatusCode::OK, "text/plain", "second")
    });

    let fork_reporter = RecordingReporter::new();
    let fork = base.fork(fork_reporter.clone());
    assert_ne!(fork.address(), base.address());

    let client = fork.blocking_client();
    let get = |url: String| client.get(url).send().unwrap().text().unwrap();

    assert_eq!(get(fork.url("/guilds/1")), "first");
    assert_eq!(get(fork.url("/guilds/1")), "second");
    assert!(fork.is_drained());
    assert!(!base.is_drained());

    // The base still serves its own copy from the start.
    assert_eq!(get(base.url("/guilds/1")), "first");

    // Registrations after the fork stay local.
    fork.register("Late", Method::GET, "/late", |_, _| response::no_content());
    assert_eq!(
        client.get(base.url("/late")).send().unwrap().status(),
        StatusCode::NOT_FOUND
    );

    fork.finalize();
    base.finalize();

    let fork_failures = fork_reporter.failures();
    assert_eq!(fork_failures.len(), 1);
    assert!(fork_failures[0].contains("Late"));

    let base_failures = base_reporter.failures();
    assert_eq!(base_failures.len(), 2);
    assert_eq!(base_failures[0], "unhandled path '/late'");
    assert!(base_failures[1].contains("1 uninvoked handler"));
}

#[test]
fn https_serves_tls_and_plain_http() {
    init_logging();
    let reporter = RecordingReporter::new();
    let mocker = MockerBuilder::new().https(true).start(reporter.clone());
    assert!(mocker.base_url().starts_with("https://"));

    for body in ["tls", "plain"] {
        mocker.register("Ping", Method::GET, "/ping", move |_, _| {
            response::raw(StatusCode::OK, "text/plain", body)
        });
    }

    let client = mocker.blocking_client();
    let tls = client.get(mocker.url("/ping")).send().unwrap();
    assert_eq!(tls.text().unwrap(), "tls");

    let plain_url = format!("http://{}/ping", mocker.address());
    let plain = client.get(plain_url).send().unwrap();
    assert_eq!(plain.text().unwrap(), "plain");

    mocker.finalize();
    reporter.assert_no_failures();
}

#[test]
fn silent_connections_do_not_block_close() {
    init_logging();
    let reporter = RecordingReporter::new();
    let mocker = MockerBuilder::new().https(true).start(reporter.clone());

    // One connection never sends a byte, the other stops in the middle of a TLS record.
    let _idle = TcpStream::connect(mocker.address()).unwrap();
    let mut stalled = TcpStream::connect(mocker.address()).unwrap();
    stalled.write_all(&[0x16, 0x03]).unwrap();
    thread::sleep(Duration::from_millis(100));

    let (closed_sender, closed_receiver) = mpsc::channel();
    thread::spawn(move || {
        mocker.close();
        let _ = closed_sender.send(());
    });

    closed_receiver
        .recv_timeout(Duration::from_secs(5))
        .expect("close blocked on connections that never started a request");
    reporter.assert_no_failures();
}

#[test]
fn environment_variable_names_are_exported() {
    assert_eq!(HTTPS_ENV, "CHATMOCK_HTTPS");
    assert_eq!(ACCESS_LOG_ENV, "CHATMOCK_ACCESS_LOG");
}

#[test]
fn base_path_is_prepended() {
    init_logging();
    let reporter = RecordingReporter::new();
    let mocker = MockerBuilder::new()
        .https(false)
        .base_path("/api/v9")
        .print_access_log(true)
        .start(reporter.clone());

    mocker.register("CurrentUser", Method::GET, "/users/@me", |_, _| {
        response::no_content()
    });

    let url = mocker.url("/users/@me");
    assert!(url.ends_with("/api/v9/users/@me"));

    let res = mocker.blocking_client().get(url).send().unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    mocker.finalize();
    reporter.assert_no_failures();
}

#[test]
fn occupied_port_is_a_startup_error() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let result = MockerBuilder::new()
        .https(false)
        .port(port)
        .try_start(RecordingReporter::new());

    assert!(matches!(result, Err(Error::ServerError(_))));
}

#[test]
#[should_panic(expected = "cannot start mock server")]
fn occupied_port_aborts_start() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    MockerBuilder::new()
        .https(false)
        .port(port)
        .start(RecordingReporter::new());
}
