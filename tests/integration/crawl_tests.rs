//! Integration tests for the crawler
//!
//! These tests use wiremock to serve a small gallery site and run the
//! full crawl cycle end-to-end into a temporary crawl root.

use gallery_harvest::config::{parse_config, Config};
use gallery_harvest::crawler::run_crawl;
use gallery_harvest::storage::RunStatus;
use gallery_harvest::{DownloadStatus, ExtractionError, HarvestError, ImageRecord, RunStore};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IMAGE_BODY: &[u8] = b"\xFF\xD8\xFF\xE0 fake jpeg body";

/// Creates a test configuration crawling the mock server into `crawl_root`
fn create_test_config(server: &MockServer, crawl_root: &TempDir) -> Config {
    let toml = format!(
        r#"
[crawler]
allowed-domain = "127.0.0.1"
start-url = "{uri}/"
max-concurrent-requests = 3
request-delay = 0.0
timeout = 5
max-retries = 1
retry-backoff-ms = 10

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
crawl-root = "{root}"
write-summary = true
"#,
        uri = server.uri(),
        root = crawl_root.path().display()
    );
    parse_config(&toml).expect("test config is valid")
}

fn image_names(category: &str, page: u32, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("c{}p{}_{}.jpg", category, page, i))
        .collect()
}

fn listing_page(category: &str, images: &[String], next: Option<u32>) -> String {
    let mut html = format!(
        "<html><head><title>Galerie {}</title></head><body>",
        category
    );
    for image in images {
        html.push_str(&format!(
            r#"<img src="/images/{}/{}" alt="Oeuvre {}">"#,
            category, image, image
        ));
    }
    if let Some(num) = next {
        html.push_str(&format!(
            r#"<a href="/list?galerie={}&amp;num={}">{}</a>"#,
            category, num, num
        ));
    }
    html.push_str("</body></html>");
    html
}

/// Mounts the gallery page listing `categories` as (id, label) pairs
async fn mount_gallery(server: &MockServer, categories: &[(&str, &str)]) {
    let mut html = String::from("<html><head><title>Galerie</title></head><body><div class=\"menu\">");
    for (id, label) in categories {
        html.push_str(&format!(
            r#"<a href="/list?galerie={}&amp;ng={}&amp;num=1">{}</a>"#,
            id, label, label
        ));
    }
    html.push_str("</div></body></html>");

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

async fn mount_listing(server: &MockServer, category: &str, num: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("galerie", category))
        .and(query_param("num", num.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Serves every image path; `expected` is the total number of image requests
async fn mount_images(server: &MockServer, expected: u64) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/images/\d+/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(IMAGE_BODY.to_vec()))
        .expect(expected)
        .mount(server)
        .await;
}

/// Three categories: 16 images on two pages, 16 on two pages, 6 on one page
async fn mount_three_category_site(server: &MockServer) {
    mount_gallery(
        server,
        &[("1", "Huiles"), ("2", "Aquarelles"), ("3", "Pastels")],
    )
    .await;
    mount_listing(server, "1", 1, listing_page("1", &image_names("1", 1, 8), Some(2))).await;
    mount_listing(server, "1", 2, listing_page("1", &image_names("1", 2, 8), None)).await;
    mount_listing(server, "2", 1, listing_page("2", &image_names("2", 1, 10), Some(2))).await;
    mount_listing(server, "2", 2, listing_page("2", &image_names("2", 2, 6), None)).await;
    mount_listing(server, "3", 1, listing_page("3", &image_names("3", 1, 6), None)).await;
}

async fn load_ledger(crawl_root: &TempDir, run_id: &str) -> Vec<ImageRecord> {
    RunStore::new(crawl_root.path())
        .load_ledger(run_id)
        .await
        .expect("ledger is readable")
}

#[tokio::test]
async fn test_every_category_and_page_recorded_once() {
    let server = MockServer::start().await;
    mount_three_category_site(&server).await;
    mount_images(&server, 38).await;

    let crawl_root = TempDir::new().unwrap();
    let config = create_test_config(&server, &crawl_root);
    let summary = run_crawl(config, "hash", CancellationToken::new())
        .await
        .expect("crawl succeeds");

    assert_eq!(summary.categories_total, 3);
    assert_eq!(summary.categories_visited, 3);
    assert_eq!(summary.pages_walked, 5);
    assert_eq!(summary.images_recorded, 38);
    assert_eq!(summary.images_downloaded, 38);
    assert_eq!(summary.images_failed, 0);
    assert_eq!(summary.bytes_downloaded, 38 * IMAGE_BODY.len() as u64);

    let ledger = load_ledger(&crawl_root, &summary.run_id).await;
    assert_eq!(ledger.len(), 38);

    let unique: HashSet<_> = ledger.iter().map(|r| r.original_url.as_str()).collect();
    assert_eq!(unique.len(), 38);

    let mut per_category: HashMap<&str, usize> = HashMap::new();
    for record in &ledger {
        *per_category.entry(record.category.as_str()).or_default() += 1;
    }
    assert_eq!(per_category["1"], 16);
    assert_eq!(per_category["2"], 16);
    assert_eq!(per_category["3"], 6);

    let run_dir = RunStore::new(crawl_root.path()).run_directory(&summary.run_id);
    for record in &ledger {
        assert_eq!(record.status, DownloadStatus::Downloaded);
        assert_eq!(record.crawl_run, summary.run_id);
        assert_eq!(
            record.local_path,
            format!("{}/images/{}/{}", summary.run_id, record.category, record.filename)
        );
        let asset = crawl_root.path().join("crawl_runs").join(&record.local_path);
        assert_eq!(std::fs::read(asset).unwrap(), IMAGE_BODY);
    }
    assert_eq!(ledger[0].category_label, "Huiles");

    assert!(run_dir.join("summary.md").exists());
    let manifest = RunStore::new(crawl_root.path())
        .load_manifest(&summary.run_id)
        .await
        .unwrap();
    assert_eq!(manifest.status, RunStatus::Completed);
    assert_eq!(manifest.config_hash, "hash");
    assert_eq!(manifest.summary.as_ref(), Some(&summary));
}

#[tokio::test]
async fn test_three_page_category_recorded_in_page_order() {
    let server = MockServer::start().await;
    mount_gallery(&server, &[("5", "Huiles")]).await;
    mount_listing(&server, "5", 1, listing_page("5", &image_names("5", 1, 16), Some(2))).await;
    mount_listing(&server, "5", 2, listing_page("5", &image_names("5", 2, 16), Some(3))).await;
    mount_listing(&server, "5", 3, listing_page("5", &image_names("5", 3, 6), None)).await;
    mount_images(&server, 38).await;

    let crawl_root = TempDir::new().unwrap();
    let summary = run_crawl(
        create_test_config(&server, &crawl_root),
        "hash",
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.categories_visited, 1);
    assert_eq!(summary.pages_walked, 3);
    assert_eq!(summary.images_recorded, 38);
    assert_eq!(summary.categories[0].termination, "last page");

    let ledger = load_ledger(&crawl_root, &summary.run_id).await;
    assert_eq!(ledger.len(), 38);
    let unique: HashSet<_> = ledger.iter().map(|r| r.original_url.as_str()).collect();
    assert_eq!(unique.len(), 38);

    // Every record of a page precedes every record of the next page
    let pages: Vec<u32> = ledger
        .iter()
        .map(|record| {
            let name = record.filename.trim_start_matches("c5p");
            name[..1].parse().unwrap()
        })
        .collect();
    let mut expected = vec![1; 16];
    expected.extend(vec![2; 16]);
    expected.extend(vec![3; 6]);
    assert_eq!(pages, expected);
}

#[tokio::test]
async fn test_categories_are_crawled_one_after_another() {
    let server = MockServer::start().await;
    mount_three_category_site(&server).await;
    mount_images(&server, 38).await;

    let crawl_root = TempDir::new().unwrap();
    let config = create_test_config(&server, &crawl_root);
    let summary = run_crawl(config, "hash", CancellationToken::new())
        .await
        .unwrap();

    let ledger = load_ledger(&crawl_root, &summary.run_id).await;
    let order: Vec<&str> = ledger.iter().map(|r| r.category.as_str()).collect();
    let mut expected = vec!["1"; 16];
    expected.extend(vec!["2"; 16]);
    expected.extend(vec!["3"; 6]);
    assert_eq!(order, expected);

    // No request of a category is issued before the previous one is done
    let requests = server.received_requests().await.unwrap();
    let category_of = |request: &wiremock::Request| -> Option<String> {
        let url = &request.url;
        if url.path() == "/list" {
            return url
                .query_pairs()
                .find(|(key, _)| key == "galerie")
                .map(|(_, value)| value.into_owned());
        }
        url.path()
            .strip_prefix("/images/")
            .and_then(|rest| rest.split('/').next())
            .map(str::to_string)
    };
    let sequence: Vec<String> = requests.iter().filter_map(category_of).collect();
    let mut finished = HashSet::new();
    for window in sequence.windows(2) {
        if window[0] != window[1] {
            assert!(
                finished.insert(window[0].clone()),
                "category {} resumed after another one started",
                window[0]
            );
            assert!(!finished.contains(&window[1]));
        }
    }
}

#[tokio::test]
async fn test_second_run_downloads_nothing() {
    let server = MockServer::start().await;
    mount_three_category_site(&server).await;
    // Both runs together fetch each image exactly once
    mount_images(&server, 38).await;

    let crawl_root = TempDir::new().unwrap();

    let first = run_crawl(
        create_test_config(&server, &crawl_root),
        "hash",
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let second = run_crawl(
        create_test_config(&server, &crawl_root),
        "hash",
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(second.images_recorded, 38);
    assert_eq!(second.images_downloaded, 0);
    assert_eq!(second.bytes_downloaded, 0);
    assert_eq!(second.images_skipped_duplicate, 38);

    let first_paths: HashMap<String, String> = load_ledger(&crawl_root, &first.run_id)
        .await
        .into_iter()
        .map(|r| (r.original_url, r.local_path))
        .collect();
    let second_ledger = load_ledger(&crawl_root, &second.run_id).await;
    assert_eq!(second_ledger.len(), 38);
    for record in &second_ledger {
        assert_eq!(record.status, DownloadStatus::AlreadyPresent);
        assert_eq!(record.crawl_run, second.run_id);
        assert_eq!(
            Some(&record.local_path),
            first_paths.get(&record.original_url)
        );
        assert_eq!(record.size_bytes, IMAGE_BODY.len() as u64);
    }

    let runs = RunStore::new(crawl_root.path()).list_runs().await.unwrap();
    assert_eq!(runs, vec![first.run_id.clone(), second.run_id.clone()]);
}

#[tokio::test]
async fn test_off_domain_urls_are_never_fetched() {
    let server = MockServer::start().await;

    let gallery = r#"<html><body>
        <a href="/list?galerie=1&amp;ng=Huiles&amp;num=1">Huiles</a>
        <a href="http://mirror.example.org/list?galerie=9&amp;ng=Copies&amp;num=1">Copies</a>
    </body></html>"#;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gallery))
        .mount(&server)
        .await;

    let page = r#"<html><body>
        <img src="/images/1/local.jpg">
        <img src="http://cdn.example.org/images/1/remote.jpg">
    </body></html>"#;
    mount_listing(&server, "1", 1, page.to_string()).await;
    mount_images(&server, 1).await;

    let crawl_root = TempDir::new().unwrap();
    let summary = run_crawl(
        create_test_config(&server, &crawl_root),
        "hash",
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.categories_total, 1);
    assert_eq!(summary.urls_rejected, 2);
    assert_eq!(summary.images_recorded, 1);

    let ledger = load_ledger(&crawl_root, &summary.run_id).await;
    assert_eq!(ledger.len(), 1);
    assert!(ledger[0].original_url.ends_with("/images/1/local.jpg"));
    assert!(ledger
        .iter()
        .all(|record| !record.original_url.contains("example.org")));
}

#[tokio::test]
async fn test_empty_last_page_fetched_once() {
    let server = MockServer::start().await;
    mount_gallery(&server, &[("4", "Dessins")]).await;
    mount_listing(&server, "4", 1, listing_page("4", &image_names("4", 1, 3), Some(2))).await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("galerie", "4"))
        .and(query_param("num", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page("4", &[], None)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("num", "3"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mount_images(&server, 3).await;

    let crawl_root = TempDir::new().unwrap();
    let summary = run_crawl(
        create_test_config(&server, &crawl_root),
        "hash",
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.pages_walked, 2);
    assert_eq!(summary.images_recorded, 3);
    assert_eq!(summary.low_confidence_terminations, 1);
    assert_eq!(summary.categories[0].termination, "empty last page");
    assert!(summary.categories[0].low_confidence);
}

#[tokio::test]
async fn test_failures_do_not_stop_the_crawl() {
    let server = MockServer::start().await;
    mount_gallery(&server, &[("1", "Huiles"), ("2", "Aquarelles")]).await;

    // Category 1: page 2 keeps failing, one image is gone
    mount_listing(&server, "1", 1, listing_page("1", &image_names("1", 1, 4), Some(2))).await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("galerie", "1"))
        .and(query_param("num", "2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/images/1/c1p1_2.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    mount_listing(&server, "2", 1, listing_page("2", &image_names("2", 1, 5), None)).await;
    mount_images(&server, 8).await;

    let crawl_root = TempDir::new().unwrap();
    let summary = run_crawl(
        create_test_config(&server, &crawl_root),
        "hash",
        CancellationToken::new(),
    )
    .await
    .expect("page and image failures are not fatal");

    assert_eq!(summary.categories_visited, 2);
    assert_eq!(summary.pages_failed, 1);
    assert_eq!(summary.images_recorded, 9);
    assert_eq!(summary.images_downloaded, 8);
    assert_eq!(summary.images_failed, 1);
    assert_eq!(summary.categories[0].termination, "fetch failed");
    assert_eq!(summary.categories[1].images, 5);

    let ledger = load_ledger(&crawl_root, &summary.run_id).await;
    let failed: Vec<_> = ledger
        .iter()
        .filter(|record| record.status == DownloadStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].filename, "c1p1_2.jpg");
    assert_eq!(failed[0].size_bytes, 0);
    assert!(failed[0].error.is_some());
    assert_eq!(
        ledger.iter().filter(|record| record.category == "2").count(),
        5
    );

    let manifest = RunStore::new(crawl_root.path())
        .load_manifest(&summary.run_id)
        .await
        .unwrap();
    assert_eq!(manifest.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_gallery_without_categories_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body>Bientôt</body></html>"),
        )
        .mount(&server)
        .await;

    let crawl_root = TempDir::new().unwrap();
    let result = run_crawl(
        create_test_config(&server, &crawl_root),
        "hash",
        CancellationToken::new(),
    )
    .await;

    assert!(matches!(
        result,
        Err(HarvestError::Enumeration(ExtractionError::NoCategoryControl { .. }))
    ));
    let runs = RunStore::new(crawl_root.path()).list_runs().await.unwrap();
    assert!(runs.is_empty());
}

#[tokio::test]
async fn test_unreachable_gallery_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let crawl_root = TempDir::new().unwrap();
    let result = run_crawl(
        create_test_config(&server, &crawl_root),
        "hash",
        CancellationToken::new(),
    )
    .await;

    assert!(matches!(
        result,
        Err(HarvestError::Enumeration(ExtractionError::GalleryFetch(_)))
    ));
}

#[tokio::test]
async fn test_max_categories_limits_the_crawl() {
    let server = MockServer::start().await;
    mount_three_category_site(&server).await;
    mount_images(&server, 16).await;

    let crawl_root = TempDir::new().unwrap();
    let mut config = create_test_config(&server, &crawl_root);
    config.crawler.max_categories = Some(1);

    let summary = run_crawl(config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.categories_total, 3);
    assert_eq!(summary.categories_visited, 1);
    assert_eq!(summary.images_recorded, 16);
}

#[tokio::test]
async fn test_off_domain_redirect_counted_as_rejected() {
    let server = MockServer::start().await;
    mount_gallery(&server, &[("1", "Huiles")]).await;
    let names = vec!["kept.jpg".to_string(), "moved.jpg".to_string()];
    mount_listing(&server, "1", 1, listing_page("1", &names, None)).await;

    Mock::given(method("GET"))
        .and(path("/images/1/moved.jpg"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "http://cdn.example.org/images/1/moved.jpg"),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_images(&server, 1).await;

    let crawl_root = TempDir::new().unwrap();
    let summary = run_crawl(
        create_test_config(&server, &crawl_root),
        "hash",
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.images_recorded, 2);
    assert_eq!(summary.images_downloaded, 1);
    assert_eq!(summary.images_failed, 0);
    assert_eq!(summary.urls_rejected, 1);

    let ledger = load_ledger(&crawl_root, &summary.run_id).await;
    assert_eq!(ledger[1].filename, "moved.jpg");
    assert_eq!(ledger[1].status, DownloadStatus::Failed);
}

#[tokio::test]
async fn test_interrupted_crawl_keeps_partial_ledger() {
    let server = MockServer::start().await;
    mount_gallery(&server, &[("1", "Huiles"), ("2", "Aquarelles")]).await;
    mount_listing(&server, "1", 1, listing_page("1", &image_names("1", 1, 6), None)).await;

    // The second category must never be reached
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("galerie", "2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/images/2/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    // One request at a time, 300ms each: six images take about 1.8s
    Mock::given(method("GET"))
        .and(path_regex(r"^/images/1/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(IMAGE_BODY.to_vec())
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let crawl_root = TempDir::new().unwrap();
    let mut config = create_test_config(&server, &crawl_root);
    config.crawler.max_concurrent_requests = 1;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        trigger.cancel();
    });

    let summary = run_crawl(config, "hash", cancel)
        .await
        .expect("an interrupted crawl still finalizes its run");

    assert!(summary.cancelled);
    assert_eq!(summary.categories_visited, 1);
    assert_eq!(summary.images_recorded, 6);
    assert!(summary.images_downloaded >= 1);
    assert!(summary.images_cancelled >= 1);
    assert_eq!(summary.images_downloaded + summary.images_cancelled, 6);

    let store = RunStore::new(crawl_root.path());
    let manifest = store.load_manifest(&summary.run_id).await.unwrap();
    assert_eq!(manifest.status, RunStatus::Interrupted);
    assert!(manifest.finished_at.is_some());

    let ledger = load_ledger(&crawl_root, &summary.run_id).await;
    assert_eq!(ledger.len(), 6);
    let downloaded = ledger
        .iter()
        .filter(|record| record.status == DownloadStatus::Downloaded)
        .count();
    let cancelled = ledger
        .iter()
        .filter(|record| record.status == DownloadStatus::Cancelled)
        .count();
    assert_eq!(downloaded, summary.images_downloaded);
    assert_eq!(cancelled, summary.images_cancelled);

    // Downloaded records come first; nothing starts after the cancellation
    let first_cancelled = ledger
        .iter()
        .position(|record| record.status == DownloadStatus::Cancelled)
        .unwrap();
    assert!(ledger[first_cancelled..]
        .iter()
        .all(|record| record.status == DownloadStatus::Cancelled));
}
