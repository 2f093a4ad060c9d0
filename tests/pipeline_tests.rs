/// End-to-end pipeline tests against a mock vulnerable site
/// Crawl -> generate -> execute -> analyze through the real HTTP client

use ethioscan::auth::{AllowlistAuthorizer, AuthorizationGate};
use ethioscan::config::ScanConfig;
use ethioscan::control::{Progress, ScanControl};
use ethioscan::models::{Category, Origin, Profile, RuleSet, Severity};
use ethioscan::orchestrator::{ScanReport, Scanner};
use ethioscan::payloads::{BuiltinCatalog, JsonCatalog};
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Echoes `q` back without escaping
struct ReflectingSearch;

impl Respond for ReflectingSearch {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let q = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_string(format!("<p>Results for {}</p>", q))
    }
}

/// Leaks a database error whenever `id` contains a quote
struct QuoteSensitiveItem;

impl Respond for QuoteSensitiveItem {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        if id.contains('\'') {
            ResponseTemplate::new(200).set_body_string(format!(
                "<b>Warning</b>: You have an error in your SQL syntax near '{}' at line 1",
                id
            ))
        } else {
            ResponseTemplate::new(200).set_body_string("<h1>Item details</h1>")
        }
    }
}

async fn lab_site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
                 <a href="/item?id=1">Item</a>
                 <a href="/search?q=hello">Search</a>
                 <form action="/login" method="post">
                   <input name="user"><input name="pass" type="password">
                 </form>
               </body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET")).and(path("/item")).respond_with(QuoteSensitiveItem).mount(&server).await;
    Mock::given(method("GET")).and(path("/search")).respond_with(ReflectingSearch).mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;
    server
}

fn lab_config(server: &MockServer) -> ScanConfig {
    let mut config = ScanConfig::new(&format!("{}/", server.uri()));
    config.max_depth = 1;
    config.delay = Duration::ZERO;
    config.retries = 0;
    config.timeout = Duration::from_secs(5);
    config
}

fn allow_all_local() -> AuthorizationGate {
    AuthorizationGate::new(Box::new(AllowlistAuthorizer::from_domains(["127.0.0.1", "localhost"])))
}

async fn scan(config: &ScanConfig) -> ScanReport {
    Scanner::from_config(config)
        .expect("client builds")
        .run(config, &allow_all_local(), &BuiltinCatalog::new())
        .await
        .expect("scan succeeds")
}

#[tokio::test]
async fn test_sql_error_detected_on_id_parameter() {
    let server = lab_site().await;
    let report = scan(&lab_config(&server)).await;

    let sqli: Vec<_> = report.findings.iter().filter(|f| f.category == Category::Sqli).collect();
    assert!(!sqli.is_empty(), "expected SQL error findings");
    assert!(sqli.iter().all(|f| f.param == "id"));
    assert!(sqli.iter().all(|f| f.severity == Severity::High));
    assert!(sqli[0].evidence.to_lowercase().contains("sql syntax"));
    assert!(sqli[0].evidence.chars().count() <= 200);
}

#[tokio::test]
async fn test_reflected_script_detected_on_search() {
    let server = lab_site().await;
    let report = scan(&lab_config(&server)).await;

    let xss: Vec<_> = report.findings.iter().filter(|f| f.category == Category::Xss).collect();
    assert!(!xss.is_empty(), "expected reflected scripting findings");
    assert!(xss.iter().all(|f| f.param == "q"));
    assert!(xss.iter().any(|f| f.payload == "<script>alert(1)</script>"));
}

#[tokio::test]
async fn test_form_submissions_analyzed() {
    let server = lab_site().await;
    let report = scan(&lab_config(&server)).await;

    assert!(report.summary.by_origin.get(&Origin::Form).copied().unwrap_or(0) > 0);
    let anomalies: Vec<_> = report
        .findings
        .iter()
        .filter(|f| f.category == Category::Anomaly && f.status == Some(503))
        .collect();
    assert!(!anomalies.is_empty());
    assert!(anomalies.iter().all(|f| f.param == "user" || f.param == "pass"));
}

#[tokio::test]
async fn test_report_counts_are_consistent() {
    let server = lab_site().await;
    let report = scan(&lab_config(&server)).await;

    assert!(!report.cancelled);
    assert_eq!(report.crawl.pages.len(), 3);
    assert_eq!(report.crawl.forms.len(), 1);
    assert_eq!(report.crawl.params.len(), 2);
    assert_eq!(report.executed, report.summary.total);
    assert_eq!(report.errored, 0);
    assert!(report.finished_at >= report.started_at);

    // Most severe first
    let severities: Vec<Severity> = report.findings.iter().map(|f| f.severity).collect();
    let mut sorted = severities.clone();
    sorted.sort();
    assert_eq!(severities, sorted);
}

#[tokio::test]
async fn test_fast_rules_skip_anomalies() {
    let server = lab_site().await;
    let mut config = lab_config(&server);
    config.rule_set = RuleSet::Fast;
    let report = scan(&config).await;

    assert!(report.findings.iter().all(|f| matches!(f.category, Category::Sqli | Category::Xss)));
    assert!(report.findings.iter().any(|f| f.category == Category::Sqli));
}

#[tokio::test]
async fn test_max_tests_caps_execution() {
    let server = lab_site().await;
    let mut config = lab_config(&server);
    config.max_tests = 3;
    let report = scan(&config).await;

    assert_eq!(report.summary.total, 3);
    assert_eq!(report.executed, 3);
    // Parameters are tested before forms
    assert_eq!(report.summary.by_origin.get(&Origin::Param).copied(), Some(3));
}

#[tokio::test]
async fn test_custom_catalog_drives_generation() {
    let server = lab_site().await;
    let mut config = lab_config(&server);
    config.profile = Profile::Safe;
    let catalog = JsonCatalog::from_json(
        r#"{"xss": [{"payload": "<svg onload=alert(7)>", "note": "custom"}],
            "traversal": [{"payload": "../../etc/passwd", "note": "lab-only"}]}"#,
    )
    .expect("catalog parses");

    let report = Scanner::from_config(&config)
        .expect("client builds")
        .run(&config, &allow_all_local(), &catalog)
        .await
        .expect("scan succeeds");

    assert!(report.summary.by_category.get(&Category::Traversal).is_none());
    assert!(report
        .findings
        .iter()
        .any(|f| f.category == Category::Xss && f.payload == "<svg onload=alert(7)>"));
}

#[tokio::test]
async fn test_progress_events_in_phase_order() {
    let server = lab_site().await;
    let config = lab_config(&server);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let scanner = Scanner::from_config(&config).expect("client builds").with_progress(tx);
    let report = scanner
        .run(&config, &allow_all_local(), &BuiltinCatalog::new())
        .await
        .expect("scan succeeds");
    drop(scanner);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let position = |pred: &dyn Fn(&Progress) -> bool| events.iter().position(|e| pred(e));
    let crawl_started = position(&|e| matches!(e, Progress::CrawlStarted { .. })).expect("crawl started");
    let crawl_finished = position(&|e| matches!(e, Progress::CrawlFinished { .. })).expect("crawl finished");
    let generated = position(&|e| matches!(e, Progress::TestsGenerated { .. })).expect("tests generated");
    assert!(crawl_started < crawl_finished && crawl_finished < generated);

    let completed = events.iter().filter(|e| matches!(e, Progress::TestCompleted { .. })).count();
    assert_eq!(completed, report.executed);
    let raised = events.iter().filter(|e| matches!(e, Progress::FindingRaised { .. })).count();
    assert_eq!(raised, report.findings.len());
}

#[tokio::test]
async fn test_cancellation_mid_execution_returns_partial_report() {
    let server = MockServer::start().await;
    Mock::given(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a href="/slow?id=1">x</a>"#))
        .mount(&server)
        .await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok").set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let mut config = lab_config(&server);
    config.concurrency = 1;
    let control = ScanControl::new();
    let scanner = Scanner::from_config(&config).expect("client builds").with_control(control.clone());

    let canceller = tokio::spawn(async move {
        // crawl takes ~300ms, then probes run one at a time
        tokio::time::sleep(Duration::from_millis(1000)).await;
        control.cancel();
    });

    let report = scanner
        .run(&config, &allow_all_local(), &BuiltinCatalog::new())
        .await
        .expect("cancelled scan still reports");
    canceller.await.expect("canceller");

    assert!(report.cancelled);
    assert_eq!(report.crawl.pages.len(), 2);
    assert!(report.summary.total > 0);
    assert!(report.executed < report.summary.total);
}
