//! End-to-end Weiyun resolution tests against a mock provider API.

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use panlink::adapters::{Adapter, AdapterContext, ResolveStep, WeiyunAdapter};
use panlink::engine::{Resolved, ResolveError};
use panlink::model::{Provider, ShareDescriptor, extras_keys};

const VIEW_PATH: &str = "/webapp/json/weiyunShare/WeiyunShareView";
const DIR_LIST_PATH: &str = "/webapp/json/weiyunShareNoLogin/WeiyunShareDirList";
const DOWNLOAD_PATH: &str = "/webapp/json/weiyunShare/WeiyunShareBatchDownload";

fn adapter(server: &MockServer) -> WeiyunAdapter {
    WeiyunAdapter::with_base_url(&server.uri(), AdapterContext::default())
}

fn share(key: &str) -> ShareDescriptor {
    ShareDescriptor::builder()
        .provider(Provider::Weiyun)
        .share_key(key)
        .build()
}

fn envelope(body: serde_json::Value) -> serde_json::Value {
    json!({ "data": {
        "rsp_header": { "retcode": 0 },
        "rsp_body": { "RspMsg_body": body },
    }})
}

/// The share page hands out the `wyctoken` cookie the JSON API requires.
async fn mount_share_page(server: &MockServer, key: &str, token: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{key}")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", format!("wyctoken={token}; Path=/")),
        )
        .mount(server)
        .await;
}

async fn mount_view(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(VIEW_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(body)))
        .mount(server)
        .await;
}

async fn mount_download(server: &MockServer, url: &str, sha: &str) {
    Mock::given(method("POST"))
        .and(path(DOWNLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "file_list": [{
                "retcode": 0,
                "https_download_url": url,
                "file_sha": sha,
            }],
        }))))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_single_file_share_resolves_with_replay_headers() {
    let server = MockServer::start().await;
    mount_share_page(&server, "Xy9z", "13370001").await;
    mount_view(
        &server,
        json!({
            "file_list": [{
                "file_id": "f1",
                "filename": "notes.pdf",
                "file_size": 4096,
                "pdir_key": "root",
            }],
            "dir_list": [],
        }),
    )
    .await;
    mount_download(
        &server,
        "https://cdn.weiyun.example/notes.pdf",
        "0a1b2c3d4e5f60718293a4b5c6d7e8f9aabb1234",
    )
    .await;

    let share = share("Xy9z");
    let step = adapter(&server).resolve(&share).await.unwrap();
    let ResolveStep::Done(Resolved::Link(link)) = step else {
        panic!("expected a direct link");
    };
    assert_eq!(link.url, "https://cdn.weiyun.example/notes.pdf");
    // The CDN rejects fetches missing these; the last 8 sha chars become the
    // FTN5K cookie.
    assert!(
        link.headers
            .iter()
            .any(|(name, value)| name == "Cookie" && value == "FTN5K=aabb1234")
    );
    assert!(link.headers.iter().any(|(name, _)| name == "User-Agent"));
    assert!(
        link.headers
            .iter()
            .any(|(name, value)| name == "Referer" && *value == format!("{}/", server.uri()))
    );
    assert!(share.extras().contains(extras_keys::DOWNLOAD_HEADERS));
}

#[tokio::test]
async fn test_api_calls_echo_the_harvested_token_as_g_tk() {
    let server = MockServer::start().await;
    mount_share_page(&server, "k1", "424242").await;
    Mock::given(method("POST"))
        .and(path(VIEW_PATH))
        .and(query_param("g_tk", "424242"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "file_list": [{ "file_id": "f1", "filename": "a", "file_size": 1, "pdir_key": "r" }],
            "dir_list": [],
        }))))
        .expect(1)
        .mount(&server)
        .await;
    mount_download(&server, "https://cdn/a", "00000000ffffffff").await;

    let step = adapter(&server).resolve(&share("k1")).await.unwrap();
    assert!(matches!(step, ResolveStep::Done(Resolved::Link(_))));
}

#[tokio::test]
async fn test_caller_cookie_supplies_the_token_without_a_page_fetch() {
    let server = MockServer::start().await;
    // No share-page mock: a page fetch would 404 and carry no cookie.
    Mock::given(method("POST"))
        .and(path(VIEW_PATH))
        .and(query_param("g_tk", "777"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "file_list": [{ "file_id": "f1", "filename": "a", "file_size": 1, "pdir_key": "r" }],
            "dir_list": [],
        }))))
        .mount(&server)
        .await;
    mount_download(&server, "https://cdn/a", "1234abcd1234abcd").await;

    let share = ShareDescriptor::builder()
        .provider(Provider::Weiyun)
        .share_key("k2")
        .extra(
            extras_keys::AUTHS,
            json!({ "cookie": "uin=o1; wyctoken=777; skey=@x" }),
        )
        .build();
    let step = adapter(&server).resolve(&share).await.unwrap();
    assert!(matches!(step, ResolveStep::Done(Resolved::Link(_))));
}

#[tokio::test]
async fn test_folder_rooted_share_reports_folder_outcome() {
    let server = MockServer::start().await;
    mount_share_page(&server, "d1", "1").await;
    mount_view(
        &server,
        json!({
            "file_list": [],
            "dir_list": [{ "dir_key": "D100", "dir_name": "archive" }],
        }),
    )
    .await;

    let step = adapter(&server).resolve(&share("d1")).await.unwrap();
    assert!(matches!(
        step,
        ResolveStep::Done(Resolved::Folder { ref folder_id }) if folder_id == "D100"
    ));
}

#[tokio::test]
async fn test_empty_view_is_empty_share() {
    let server = MockServer::start().await;
    mount_share_page(&server, "e1", "1").await;
    mount_view(&server, json!({ "file_list": [], "dir_list": [] })).await;

    let error = adapter(&server).resolve(&share("e1")).await.unwrap_err();
    assert!(matches!(error, ResolveError::EmptyShare { .. }));
    assert!(error.to_string().contains("e1"));
}

#[tokio::test]
async fn test_nonzero_retcode_surfaces_as_provider_error() {
    let server = MockServer::start().await;
    mount_share_page(&server, "p1", "1").await;
    Mock::given(method("POST"))
        .and(path(VIEW_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {
            "rsp_header": { "retcode": 1029, "retmsg": "password required" },
        }})))
        .mount(&server)
        .await;

    let error = adapter(&server).resolve(&share("p1")).await.unwrap_err();
    assert!(matches!(error, ResolveError::Provider { .. }));
    assert!(error.to_string().contains("1029"));
    assert!(error.to_string().contains("password required"));
}

#[tokio::test]
async fn test_listing_flattens_root_files_and_nested_folders() {
    let server = MockServer::start().await;
    mount_share_page(&server, "t1", "1").await;
    mount_view(
        &server,
        json!({
            "file_list": [{
                "file_id": "f0", "filename": "readme.md", "file_size": 10, "pdir_key": "root",
            }],
            "dir_list": [{ "dir_key": "D1", "dir_name": "src" }],
        }),
    )
    .await;
    // D1 holds one file and one subfolder D2, which holds one file. The
    // dir-list endpoint serves both levels.
    Mock::given(method("POST"))
        .and(path(DIR_LIST_PATH))
        .respond_with(move |request: &wiremock::Request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let inner: serde_json::Value =
                serde_json::from_str(body["req_body"].as_str().unwrap()).unwrap();
            let dir_key = inner["ReqMsg_body"][".weiyun.WeiyunShareDirListMsgReq_body"]
                ["dir_key"]
                .as_str()
                .unwrap()
                .to_string();
            let reply = if dir_key == "D1" {
                json!({
                    "file_list": [{
                        "file_id": "f1", "filename": "lib.rs", "file_size": 20, "pdir_key": "D1",
                    }],
                    "dir_list": [{ "dir_key": "D2", "dir_name": "nested" }],
                })
            } else {
                json!({
                    "file_list": [{
                        "file_id": "f2", "filename": "deep.rs", "file_size": 30, "pdir_key": "D2",
                    }],
                    "dir_list": [],
                })
            };
            ResponseTemplate::new(200).set_body_json(json!({ "data": {
                "rsp_header": { "retcode": 0 },
                "rsp_body": { "RspMsg_body": reply },
            }}))
        })
        .mount(&server)
        .await;

    let files = adapter(&server).list_files(&share("t1")).await.unwrap();
    assert_eq!(files.len(), 3);
    let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
    for expected in ["readme.md", "lib.rs", "deep.rs"] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }
    for file in &files {
        assert!(
            file.parser_url
                .as_deref()
                .unwrap()
                .contains("/v2/redirectUrl/weiyun/")
        );
    }
}

#[tokio::test]
async fn test_deferred_parameters_resolve_one_file() {
    let server = MockServer::start().await;
    mount_share_page(&server, "k7", "9").await;
    mount_download(&server, "https://cdn/one.bin", "abcdef0011223344").await;

    let param = json!({
        "file_id": "f9",
        "filename": "one.bin",
        "file_size": 99,
        "pdir_key": "D1",
        "share_key": "k7",
        "share_pwd": "",
    })
    .to_string();
    let share = ShareDescriptor::builder()
        .provider(Provider::Weiyun)
        .share_key("k7")
        .extra(extras_keys::PARAM_JSON, json!(param))
        .build();

    match adapter(&server).resolve_deferred(&share).await.unwrap() {
        Resolved::Link(link) => {
            assert_eq!(link.url, "https://cdn/one.bin");
            assert!(
                link.headers
                    .iter()
                    .any(|(name, value)| name == "Cookie" && value == "FTN5K=11223344")
            );
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}
