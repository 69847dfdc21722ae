use crate::utils::http_mocker;
use chatmock::{
    check_header, check_json_request, check_multipart_request, check_request_query,
    parse_query, response, ExpectedFile, Nullable, NullableString, NullableUint,
};
use http::{header::AUTHORIZATION, HeaderMap, HeaderValue, Method, StatusCode};
use reqwest::blocking::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct ModifyGuild {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    icon: Option<NullableString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    afk_timeout: Option<NullableUint>,
}

fn expect_modify_guild(mocker: &chatmock::Mocker, expected: ModifyGuild) {
    mocker.register("ModifyGuild", Method::PATCH, "/guilds/1", move |req, reporter| {
        check_json_request(reporter, req, &expected);
        response::no_content()
    });
}

#[test]
fn explicit_null_matches_sent_null_and_omitted_field() {
    let (mocker, reporter) = http_mocker();
    let expected = ModifyGuild {
        name: Some("renamed".into()),
        icon: Some(Nullable::Null),
        afk_timeout: Some(Nullable::Value(300)),
    };
    expect_modify_guild(&mocker, expected.clone());
    expect_modify_guild(&mocker, expected);

    let client = mocker.blocking_client();
    for body in [
        json!({"name": "renamed", "icon": null, "afk_timeout": 300}),
        json!({"afk_timeout": 300, "name": "renamed"}),
    ] {
        let res = client.patch(mocker.url("/guilds/1")).json(&body).send().unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    mocker.finalize();
    reporter.assert_no_failures();
}

#[test]
fn set_value_does_not_match_null() {
    let (mocker, reporter) = http_mocker();
    expect_modify_guild(
        &mocker,
        ModifyGuild {
            name: None,
            icon: Some("a_hash".into()),
            afk_timeout: None,
        },
    );

    mocker
        .blocking_client()
        .patch(mocker.url("/guilds/1"))
        .json(&json!({"icon": null}))
        .send()
        .unwrap();

    mocker.finalize();
    let failures = reporter.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("icon"));
}

#[derive(Serialize, Deserialize, Debug)]
struct SendMessage {
    content: String,
}

fn expect_upload(mocker: &chatmock::Mocker, json: Option<SendMessage>, files: Vec<ExpectedFile>) {
    mocker.register("SendMessage", Method::POST, "/channels/1/messages", move |req, reporter| {
        check_multipart_request(reporter, req, json.as_ref(), &files);
        response::json(StatusCode::OK, &json!({"id": "1"}))
    });
}

fn payload_part(content: &str) -> Part {
    Part::text(json!({ "content": content }).to_string())
        .mime_str("application/json")
        .unwrap()
}

fn file_part(name: &str, content: &'static [u8]) -> Part {
    Part::bytes(content).file_name(name.to_string())
}

fn expected_files() -> Vec<ExpectedFile> {
    vec![
        ExpectedFile::new("a.txt", &b"first file, long enough for two chunks"[..]),
        ExpectedFile::new("b.png", &b"\x89PNG\r\n"[..]),
    ]
}

#[test]
fn multipart_upload_in_any_order_passes() {
    let (mocker, reporter) = http_mocker();
    expect_upload(
        &mocker,
        Some(SendMessage {
            content: "with files".into(),
        }),
        expected_files(),
    );

    let form = Form::new()
        .part("file1", file_part("b.png", b"\x89PNG\r\n"))
        .part("payload_json", payload_part("with files"))
        .part(
            "file0",
            file_part("a.txt", b"first file, long enough for two chunks"),
        );

    let res = mocker
        .blocking_client()
        .post(mocker.url("/channels/1/messages"))
        .multipart(form)
        .send()
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    mocker.finalize();
    reporter.assert_no_failures();
}

#[test]
fn multipart_problems_are_all_reported() {
    let (mocker, reporter) = http_mocker();
    expect_upload(
        &mocker,
        Some(SendMessage {
            content: "with files".into(),
        }),
        expected_files(),
    );

    let form = Form::new()
        .part("file5", file_part("x.txt", b"out of range"))
        .part("file0", file_part("a.txt", b"first file, but different content"))
        .part("sticker", Part::text("nope"));

    mocker
        .blocking_client()
        .post(mocker.url("/channels/1/messages"))
        .multipart(form)
        .send()
        .unwrap();

    mocker.finalize();
    let failures = reporter.failures();

    assert_eq!(failures.len(), 5, "{:#?}", failures);
    assert!(failures[0].contains("file index 5 is out of range"));
    assert!(failures[1].starts_with("file 0 ('a.txt')"));
    assert_eq!(failures[2], "unexpected multipart part 'sticker'");
    assert_eq!(failures[3], "no JSON payload received");
    assert_eq!(failures[4], "missing files: 1");
}

#[test]
fn unexpected_json_payload_is_reported() {
    let (mocker, reporter) = http_mocker();
    expect_upload(&mocker, None, vec![]);

    let form = Form::new().part("payload_json", payload_part("surprise"));
    mocker
        .blocking_client()
        .post(mocker.url("/channels/1/messages"))
        .multipart(form)
        .send()
        .unwrap();

    mocker.finalize();
    assert_eq!(reporter.failures(), vec!["got JSON payload but none expected"]);
}

#[test]
fn query_and_headers_are_checked() {
    let (mocker, reporter) = http_mocker();
    let expected_query = parse_query("limit=10&with_counts=true");

    let mut expected_headers = HeaderMap::new();
    expected_headers.insert(AUTHORIZATION, HeaderValue::from_static("Bot token"));

    mocker.register("Guilds", Method::GET, "/users/@me/guilds", move |req, reporter| {
        check_request_query(reporter, req, &expected_query);
        check_header(reporter, &expected_headers, req.headers());
        response::json(StatusCode::OK, &json!([]))
    });
    mocker.register("Guilds", Method::GET, "/users/@me/guilds", |req, reporter| {
        check_request_query(reporter, req, &parse_query("limit=10"));
        response::json(StatusCode::OK, &json!([]))
    });

    let client = mocker.blocking_client();
    client
        .get(mocker.url("/users/@me/guilds?with_counts=true&limit=10"))
        .header(AUTHORIZATION, "Bot token")
        .send()
        .unwrap();
    client
        .get(mocker.url("/users/@me/guilds?limit=10&extra=x"))
        .send()
        .unwrap();

    mocker.finalize();
    let failures = reporter.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("extra"));
}
