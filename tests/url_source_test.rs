use std::io::Cursor;
use std::time::Duration;

use httpmock::prelude::*;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use parasite_detect_rs::mocks::MockDetector;
use parasite_detect_rs::{
    Dashboard, DashboardError, DashboardSession, DetectionThreshold, ImageRole, RecordingHost,
    SourceRequest, SourceResolver, UrlFetcher,
};

fn png_bytes() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([90, 140, 60])));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn resolver() -> SourceResolver {
    SourceResolver::new(UrlFetcher::new(Duration::from_secs(5)))
}

fn url_session(url: String) -> DashboardSession {
    DashboardSession {
        threshold: DetectionThreshold::default(),
        source: SourceRequest::Url(url),
    }
}

#[test]
fn test_url_image_is_fetched_and_analyzed() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/slides/egg.png");
        then.status(200)
            .header("content-type", "image/png")
            .body(png_bytes());
    });

    let dashboard = Dashboard::new(MockDetector::parasite_eggs(), resolver());
    let mut host = RecordingHost::default();
    let results = dashboard.run(&url_session(server.url("/slides/egg.png")), &mut host);

    mock.assert();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].image.name(), "egg.png");
    assert_eq!(host.captions(ImageRole::Original), ["From URL: egg.png"]);
    assert_eq!(host.cards().len(), 2);
    assert!(host.errors().is_empty());
}

#[test]
fn test_non_image_content_is_one_error_and_no_image() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/page");
        then.status(200)
            .header("content-type", "text/html")
            .body("<html><body>not an image</body></html>");
    });

    let dashboard = Dashboard::new(MockDetector::parasite_eggs(), resolver());
    let mut host = RecordingHost::default();
    let results = dashboard.run(&url_session(server.url("/page")), &mut host);

    assert!(results.is_empty());
    assert_eq!(host.errors().len(), 1);
    assert!(host.errors()[0].starts_with("Failed to load image from URL"));
    assert!(host.captions(ImageRole::Original).is_empty());
}

#[test]
fn test_http_error_status_is_fetch_failure() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/missing.png");
        then.status(404);
    });

    let resolution = resolver().resolve(&SourceRequest::Url(server.url("/missing.png")));

    assert!(resolution.images.is_empty());
    assert_eq!(resolution.failures.len(), 1);
    assert!(matches!(
        resolution.failures[0],
        DashboardError::Fetch { .. }
    ));
}

#[test]
fn test_unreachable_host_is_fetch_failure() {
    // port 9 on localhost (discard) is closed in test environments
    let resolution =
        resolver().resolve(&SourceRequest::Url("http://127.0.0.1:9/egg.png".to_string()));

    assert!(resolution.images.is_empty());
    assert_eq!(resolution.failures.len(), 1);
}

#[test]
fn test_oversized_body_is_fetch_failure_not_decode() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/large.png");
        then.status(200).body(png_bytes());
    });

    let fetcher = UrlFetcher::new(Duration::from_secs(5)).with_max_body_bytes(16);
    let resolution = SourceResolver::new(fetcher)
        .resolve(&SourceRequest::Url(server.url("/large.png")));

    assert!(resolution.images.is_empty());
    assert_eq!(resolution.failures.len(), 1);
    assert!(matches!(
        resolution.failures[0],
        DashboardError::Fetch { .. }
    ));
    assert!(resolution.failures[0]
        .to_string()
        .contains("body exceeds 16 bytes"));
}
