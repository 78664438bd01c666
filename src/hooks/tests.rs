//! Tests for the query/mutation adapter.

use super::*;
use crate::client::{HttpClient, RequestConfig};
use crate::config::ApiConfig;
use crate::token_store::MemoryTokenStore;
use mockito::Matcher;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};

fn widgets_api(server: &mockito::ServerGuard) -> ResourceApi {
    let api = ApiConfig {
        base_url: server.url(),
        ..ApiConfig::default()
    };
    let client = HttpClient::new(&api, Arc::new(MemoryTokenStore::new())).unwrap();
    let service = ResourceService::new(client, format!("{}/widgets", server.url()));
    ResourceApi::new(service, QueryCache::default())
}

#[tokio::test]
async fn reads_with_same_url_and_params_share_cache_entry() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("GET", "/widgets/list")
        .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id": 1}]"#)
        .expect(1)
        .create_async()
        .await;

    let api = widgets_api(&server);
    let first = api.get_query(
        RequestDescriptor::new("/list")
            .param("page", "1")
            .config(RequestConfig::new().header("X-Trace", "a")),
        QueryOptions::new(),
    );
    let second = api.get_query(
        RequestDescriptor::new("/list")
            .param("page", "1")
            .config(RequestConfig::new().timeout(Duration::from_secs(2))),
        QueryOptions::new(),
    );

    assert_eq!(first.key(), second.key());
    let a = first.fetch().await.unwrap();
    let b = second.fetch().await.unwrap();

    mock.assert_async().await;
    assert_eq!(a, b);
}

#[tokio::test]
async fn different_params_are_cached_separately() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("GET", "/widgets/list")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .expect(2)
        .create_async()
        .await;

    let api = widgets_api(&server);
    api.get_query(RequestDescriptor::new("/list").param("page", "1"), QueryOptions::new())
        .fetch()
        .await
        .unwrap();
    api.get_query(RequestDescriptor::new("/list").param("page", "2"), QueryOptions::new())
        .fetch()
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn concurrent_fetches_coalesce() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("GET", "/widgets")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let api = widgets_api(&server);
    let query = api.get_query(RequestDescriptor::new(""), QueryOptions::new());

    let (a, b) = tokio::join!(query.fetch(), query.fetch());

    mock.assert_async().await;
    assert!(a.is_ok() && b.is_ok());
}

#[tokio::test]
async fn refetch_bypasses_cache() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("GET", "/widgets")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .expect(2)
        .create_async()
        .await;

    let api = widgets_api(&server);
    let query = api.get_query(RequestDescriptor::new(""), QueryOptions::new());
    query.fetch().await.unwrap();
    query.fetch().await.unwrap();
    query.refetch().await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn failed_fetches_are_not_cached() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("GET", "/widgets")
        .with_status(500)
        .with_body("down")
        .expect(2)
        .create_async()
        .await;

    let api = widgets_api(&server);
    let query = api.get_query(RequestDescriptor::new(""), QueryOptions::new());

    let first = query.fetch().await.unwrap_err();
    let second = query.fetch().await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(first.status(), Some(500));
    assert_eq!(second.status(), Some(500));
    assert_eq!(api.cache().get(query.key()).await, None);
}

#[tokio::test]
async fn query_callbacks_fire_on_success_and_error() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/widgets/ok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{}")
        .create_async()
        .await;
    server
        .mock("GET", "/widgets/broken")
        .with_status(503)
        .create_async()
        .await;

    let successes = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let settled = Arc::new(AtomicUsize::new(0));

    let options = {
        let (s, e, d) = (successes.clone(), errors.clone(), settled.clone());
        QueryOptions::new()
            .on_success(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |_| {
                e.fetch_add(1, Ordering::SeqCst);
            })
            .on_settled(move |_| {
                d.fetch_add(1, Ordering::SeqCst);
            })
    };

    let api = widgets_api(&server);
    let _ = api.get_query(RequestDescriptor::new("/ok"), options.clone()).fetch().await;
    let _ = api.get_query(RequestDescriptor::new("/broken"), options).fetch().await;

    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(settled.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn post_query_is_cached_by_url_and_params() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/widgets/search")
        .match_body(Matcher::Json(serde_json::json!({"q": "gear"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"id": 4}]"#)
        .expect(1)
        .create_async()
        .await;

    let api = widgets_api(&server);
    let query = api.post_query(
        RequestDescriptor::new("/search").body(serde_json::json!({"q": "gear"})),
        QueryOptions::new(),
    );
    query.fetch().await.unwrap();
    let cached = query.fetch().await.unwrap();

    mock.assert_async().await;
    assert_eq!(cached.as_json(), Some(&serde_json::json!([{"id": 4}])));
}

#[tokio::test]
async fn write_mutation_merges_body_into_bound_descriptor() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("PUT", "/widgets/7")
        .match_query(Matcher::UrlEncoded("notify".into(), "false".into()))
        .match_body(Matcher::Json(serde_json::json!({"name": "sprocket"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 7, "name": "sprocket"}"#)
        .create_async()
        .await;

    let api = widgets_api(&server);
    let mutation = api.put_mutation(
        RequestDescriptor::new("/7").param("notify", "false"),
        MutationOptions::new(),
    );
    let body = mutation.mutate(Some(serde_json::json!({"name": "sprocket"}))).await.unwrap();

    mock.assert_async().await;
    assert_eq!(body.as_json().and_then(|v| v["name"].as_str()), Some("sprocket"));
}

#[tokio::test]
async fn delete_mutation_sends_identifier_without_body() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("DELETE", "/widgets/42")
        .match_body(Matcher::Exact(String::new()))
        .with_status(204)
        .create_async()
        .await;

    let api = widgets_api(&server);
    let mutation = api.delete_mutation(RequestDescriptor::new("").id(42), MutationOptions::new());
    mutation.mutate(Some(serde_json::json!({"ignored": true}))).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn successful_mutation_invalidates_requested_prefix() {
    let mut server = mockito::Server::new_async().await;

    let list = server
        .mock("GET", "/widgets/list")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .expect(2)
        .create_async()
        .await;
    server
        .mock("POST", "/widgets")
        .with_status(201)
        .create_async()
        .await;

    let api = widgets_api(&server);
    let query = api.get_query(RequestDescriptor::new("/list"), QueryOptions::new());
    query.fetch().await.unwrap();

    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let mutation = api.post_mutation(
        RequestDescriptor::new(""),
        MutationOptions::new()
            .invalidates("/list")
            .on_success(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
    );
    mutation.mutate(Some(serde_json::json!({"name": "gear"}))).await.unwrap();

    assert_eq!(api.cache().get(query.key()).await, None);
    query.fetch().await.unwrap();

    list.assert_async().await;
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_mutation_keeps_cache_and_reports_error() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/widgets/list")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;
    server
        .mock("PATCH", "/widgets/1")
        .with_status(409)
        .create_async()
        .await;

    let api = widgets_api(&server);
    let query = api.get_query(RequestDescriptor::new("/list"), QueryOptions::new());
    query.fetch().await.unwrap();

    let errors = Arc::new(AtomicUsize::new(0));
    let counter = errors.clone();
    let mutation = api.patch_mutation(
        RequestDescriptor::new("/1"),
        MutationOptions::new().invalidates("/list").on_error(move |err| {
            assert_eq!(err.status(), Some(409));
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert!(mutation.mutate(Some(serde_json::json!({"name": "x"}))).await.is_err());

    assert!(api.cache().get(query.key()).await.is_some());
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalidate_prefix_counts_dropped_entries() {
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", Matcher::Regex(r"^/widgets/.*$".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{}")
        .create_async()
        .await;

    let api = widgets_api(&server);
    for path in ["/a", "/b", "/c"] {
        api.get_query(RequestDescriptor::new(path), QueryOptions::new())
            .fetch()
            .await
            .unwrap();
    }
    assert_eq!(api.cache().entry_count().await, 3);

    let dropped = api
        .cache()
        .invalidate_prefix(&format!("{}/widgets/a", server.url()))
        .await;
    assert_eq!(dropped, 1);
}

#[tokio::test]
async fn config_params_take_part_in_the_cache_key() {
    let mut server = mockito::Server::new_async().await;

    let first_page = server
        .mock("GET", "/widgets/list")
        .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"page": 1}"#)
        .expect(1)
        .create_async()
        .await;
    let second_page = server
        .mock("GET", "/widgets/list")
        .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"page": 2}"#)
        .expect(1)
        .create_async()
        .await;

    let api = widgets_api(&server);
    let p1 = api.get_query(
        RequestDescriptor::new("/list").config(RequestConfig::new().param("page", "1")),
        QueryOptions::new(),
    );
    let p2 = api.get_query(
        RequestDescriptor::new("/list").config(RequestConfig::new().param("page", "2")),
        QueryOptions::new(),
    );

    assert_ne!(p1.key(), p2.key());
    let a = p1.fetch().await.unwrap();
    let b = p2.fetch().await.unwrap();

    first_page.assert_async().await;
    second_page.assert_async().await;
    assert_eq!(a.as_json(), Some(&serde_json::json!({"page": 1})));
    assert_eq!(b.as_json(), Some(&serde_json::json!({"page": 2})));
}
