//! # Content Negotiation Tests
//!
//! End-to-end `Accept` handling through `Api::handle`: default media type,
//! quality values, custom representations and 406 rendering.

use hyper::StatusCode;
use restplus_core::representation::output_text;
use restplus_core::{
    Api, ApiBuilder, ApiConfig, Error, Representations, Request, Resource, Response,
    APPLICATION_JSON, TEXT_PLAIN,
};
use serde_json::json;

fn foo() -> Resource {
    Resource::builder("foo")
        .get(|_, _| async { Ok(json!("data").into()) })
        .build()
}

fn no_default() -> ApiConfig {
    ApiConfig::default().without_default_mediatype()
}

fn api(builder: ApiBuilder) -> Api {
    builder.resource("/test/", foo()).build().unwrap()
}

async fn get(api: &Api, accept: Option<&str>) -> Response {
    let mut request = Request::new(hyper::Method::GET, "/test/");
    if let Some(accept) = accept {
        request.set_header("accept", accept);
    }
    api.handle(request).await
}

#[tokio::test]
async fn test_accept_default_application_json() {
    let api = api(Api::builder(ApiConfig::default()));
    let res = get(&api, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some(APPLICATION_JSON));
}

#[tokio::test]
async fn test_accept_application_json_by_default() {
    let api = api(Api::builder(ApiConfig::default()));
    let res = get(&api, Some("application/json")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some(APPLICATION_JSON));
}

#[tokio::test]
async fn test_accept_no_default_match_acceptable() {
    let api = api(Api::builder(no_default()));
    let res = get(&api, Some("application/json")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some(APPLICATION_JSON));
}

#[tokio::test]
async fn test_accept_default_override_accept() {
    let api = api(Api::builder(ApiConfig::default()));
    let res = get(&api, Some("text/plain")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some(APPLICATION_JSON));
}

#[tokio::test]
async fn test_accept_default_any_pick_first() {
    let api = api(Api::builder(ApiConfig::default()).representation(TEXT_PLAIN, output_text));
    let res = get(&api, Some("*/*")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some(APPLICATION_JSON));
}

#[tokio::test]
async fn test_accept_no_default_no_match_not_acceptable() {
    let api = api(Api::builder(no_default()));
    let res = get(&api, Some("text/plain")).await;
    assert_eq!(res.status, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(res.content_type(), Some(APPLICATION_JSON));
}

#[tokio::test]
async fn test_accept_no_default_custom_repr_match() {
    let api = api(
        Api::builder(no_default())
            .representations(Representations::new().with(TEXT_PLAIN, output_text)),
    );
    let res = get(&api, Some("text/plain")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some(TEXT_PLAIN));
    assert_eq!(&res.body[..], b"data");
}

#[tokio::test]
async fn test_accept_no_default_custom_repr_not_acceptable() {
    let api = api(
        Api::builder(no_default())
            .representations(Representations::new().with(TEXT_PLAIN, output_text)),
    );
    let res = get(&api, Some("application/json")).await;
    assert_eq!(res.status, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(res.content_type(), Some(TEXT_PLAIN));
}

#[tokio::test]
async fn test_accept_no_default_match_q0_not_acceptable() {
    let api = api(Api::builder(no_default()));
    let res = get(&api, Some("application/json; q=0")).await;
    assert_eq!(res.status, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(res.content_type(), Some(APPLICATION_JSON));
}

#[tokio::test]
async fn test_accept_default_match_q0_falls_back() {
    let api = api(Api::builder(ApiConfig::default()));
    let res = get(&api, Some("application/json; q=0")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some(APPLICATION_JSON));
}

#[tokio::test]
async fn test_accept_no_default_accept_highest_quality_of_two() {
    let api = api(Api::builder(no_default()).representation(TEXT_PLAIN, output_text));
    let res = get(&api, Some("application/json; q=0.1, text/plain; q=1.0")).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some(TEXT_PLAIN));
}

#[tokio::test]
async fn test_accept_no_default_accept_highest_quality_of_three() {
    let api = api(
        Api::builder(no_default())
            .representation("text/html", output_text)
            .representation(TEXT_PLAIN, output_text),
    );
    let res = get(
        &api,
        Some("application/json; q=0.1, text/plain; q=0.3, text/html; q=0.2"),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.content_type(), Some(TEXT_PLAIN));
}

#[tokio::test]
async fn test_accept_equal_quality_prefers_header_order() {
    let api = api(Api::builder(no_default()).representation(TEXT_PLAIN, output_text));
    let res = get(&api, Some("text/plain, application/json")).await;
    assert_eq!(res.content_type(), Some(TEXT_PLAIN));
}

#[tokio::test]
async fn test_accept_no_default_no_representations() {
    let api = api(Api::builder(no_default()).representations(Representations::new()));
    let res = get(&api, Some("text/plain")).await;
    assert_eq!(res.status, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(res.content_type(), Some(TEXT_PLAIN));
}

#[test]
fn test_accept_invalid_default_no_representations() {
    let err = Api::builder(ApiConfig::default().with_default_mediatype("nonexistant/mediatype"))
        .representations(Representations::new())
        .resource("/test/", foo())
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::DefaultMediaTypeUnregistered { .. }));
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
