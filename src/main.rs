// Main CLI entry point for EthioScan
// Uses clap for argument parsing; only builds a ScanConfig and hands off to the Scanner

use anyhow::{bail, Context, Result};
use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use ethioscan::analyzer::detection_stats;
use ethioscan::auth::{AllowlistAuthorizer, AuthorizationGate};
use ethioscan::config::{
    ScanConfig, DEFAULT_CONCURRENCY, DEFAULT_MAX_DEPTH, DEFAULT_MAX_PER_PARAM, DEFAULT_MAX_TESTS, DEFAULT_RETRIES,
};
use ethioscan::control::{Progress, ScanControl};
use ethioscan::models::{Profile, RuleSet};
use ethioscan::orchestrator::{ScanReport, Scanner};
use ethioscan::payloads::{BuiltinCatalog, JsonCatalog, PayloadCatalog};
use ethioscan::reporting::{default_report_name, export_csv, export_json};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("ethioscan")
        .version(crate_version!())
        .about("Crawl a web application and probe its inputs for injection and information leakage")
        .after_help("EXAMPLES:\n  ethioscan --url http://testphp.vulnweb.com/ --depth 2\n  ethioscan -u http://lab.local/ --lab --max-tests 500 --out lab.json --csv lab.csv\n  ethioscan -u http://staging.local/ --confirm-allow I_HAVE_PERMISSION --fast\n\nOnly scan targets you are authorized to test. Targets must be listed in the\nallowlist file unless the override phrase is given.")
        .arg(Arg::new("url")
            .short('u')
            .long("url")
            .required(true)
            .num_args(1)
            .help("Seed URL to crawl (http or https)"))
        .arg(Arg::new("depth")
            .short('d')
            .long("depth")
            .num_args(1)
            .value_parser(value_parser!(usize))
            .default_value("2")
            .help("Maximum crawl depth"))
        .arg(Arg::new("concurrency")
            .short('c')
            .long("concurrency")
            .num_args(1)
            .value_parser(value_parser!(usize))
            .default_value("5")
            .help("Maximum in-flight requests"))
        .arg(Arg::new("timeout")
            .short('t')
            .long("timeout")
            .num_args(1)
            .value_parser(value_parser!(f64))
            .default_value("10")
            .help("Per-request timeout in seconds"))
        .arg(Arg::new("delay_ms")
            .long("delay-ms")
            .num_args(1)
            .value_parser(value_parser!(u64))
            .default_value("200")
            .help("Polite delay before each crawl fetch, in milliseconds"))
        .arg(Arg::new("retries")
            .long("retries")
            .num_args(1)
            .value_parser(value_parser!(u32))
            .default_value("2")
            .help("Crawl fetch retries on transient failures"))
        .arg(Arg::new("max_tests")
            .long("max-tests")
            .num_args(1)
            .value_parser(value_parser!(usize))
            .default_value("200")
            .help("Maximum number of test cases"))
        .arg(Arg::new("max_per_param")
            .long("max-per-param")
            .num_args(1)
            .value_parser(value_parser!(usize))
            .default_value("2")
            .help("Maximum payloads per category for each parameter"))
        .arg(Arg::new("profile")
            .short('p')
            .long("profile")
            .num_args(1)
            .value_parser(["safe", "lab", "all"])
            .default_value("safe")
            .help("Payload profile"))
        .arg(Arg::new("lab")
            .long("lab")
            .action(ArgAction::SetTrue)
            .help("Shorthand for --profile lab (enables lab-only payloads)"))
        .arg(Arg::new("fast")
            .long("fast")
            .action(ArgAction::SetTrue)
            .help("Only run SQL error and reflected scripting rules"))
        .arg(Arg::new("allowlist")
            .long("allowlist")
            .num_args(1)
            .default_value("allowlist.txt")
            .help("File of authorized domains, one per line"))
        .arg(Arg::new("confirm_allow")
            .long("confirm-allow")
            .num_args(1)
            .help("Override phrase for targets missing from the allowlist"))
        .arg(Arg::new("payloads")
            .long("payloads")
            .num_args(1)
            .help("JSON payload catalog replacing the built-in one"))
        .arg(Arg::new("out")
            .short('o')
            .long("out")
            .num_args(1)
            .help("JSON report path (default: timestamped file name)"))
        .arg(Arg::new("csv")
            .long("csv")
            .num_args(0..=1)
            .default_missing_value("")
            .help("Also export findings as CSV, optionally to the given path"))
}

fn build_config(matches: &clap::ArgMatches) -> Result<ScanConfig> {
    let target = matches.get_one::<String>("url").context("--url is required")?;
    let mut config = ScanConfig::new(target);

    config.max_depth = matches.get_one::<usize>("depth").copied().unwrap_or(DEFAULT_MAX_DEPTH);
    config.concurrency = matches.get_one::<usize>("concurrency").copied().unwrap_or(DEFAULT_CONCURRENCY);
    config.max_tests = matches.get_one::<usize>("max_tests").copied().unwrap_or(DEFAULT_MAX_TESTS);
    config.max_per_param = matches.get_one::<usize>("max_per_param").copied().unwrap_or(DEFAULT_MAX_PER_PARAM);
    config.retries = matches.get_one::<u32>("retries").copied().unwrap_or(DEFAULT_RETRIES);

    if let Some(secs) = matches.get_one::<f64>("timeout") {
        if !secs.is_finite() || *secs <= 0.0 {
            bail!("--timeout must be a positive number of seconds");
        }
        config.timeout = match Duration::try_from_secs_f64(*secs) {
            Ok(timeout) => timeout,
            Err(e) => bail!("--timeout {} is out of range: {}", secs, e),
        };
    }
    if let Some(ms) = matches.get_one::<u64>("delay_ms") {
        config.delay = Duration::from_millis(*ms);
    }

    config.profile = if matches.get_flag("lab") {
        Profile::Lab
    } else {
        matches
            .get_one::<String>("profile")
            .map(|p| p.parse::<Profile>())
            .transpose()
            .map_err(anyhow::Error::msg)?
            .unwrap_or_default()
    };
    config.rule_set = if matches.get_flag("fast") { RuleSet::Fast } else { RuleSet::Full };

    config.validate()?;
    Ok(config)
}

fn load_gate(matches: &clap::ArgMatches) -> Result<AuthorizationGate> {
    let path = matches
        .get_one::<String>("allowlist")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("allowlist.txt"));

    let allowlist = if path.exists() {
        AllowlistAuthorizer::from_file(&path)
            .with_context(|| format!("failed to read allowlist {}", path.display()))?
    } else {
        warn!("allowlist {} not found; no domain is pre-authorized", path.display());
        AllowlistAuthorizer::default()
    };

    let phrase = matches.get_one::<String>("confirm_allow").map(|s| s.as_str());
    Ok(AuthorizationGate::new(Box::new(allowlist)).with_override(phrase))
}

fn load_catalog(matches: &clap::ArgMatches) -> Result<Box<dyn PayloadCatalog>> {
    match matches.get_one::<String>("payloads") {
        Some(path) => {
            let catalog = JsonCatalog::from_file(Path::new(path))
                .with_context(|| format!("failed to load payload catalog {}", path))?;
            info!("using payload catalog {}", path);
            Ok(Box::new(catalog))
        }
        None => Ok(Box::new(BuiltinCatalog::new())),
    }
}

fn log_progress(event: &Progress) {
    match event {
        Progress::CrawlStarted { target } => info!("crawl started at {}", target),
        Progress::PageCrawled { pages_crawled, queued } => {
            info!("crawled {} pages ({} queued for next level)", pages_crawled, queued)
        }
        Progress::CrawlFinished { pages, forms, params } => {
            info!("discovered {} pages, {} forms, {} parameterized URLs", pages, forms, params)
        }
        Progress::TestsGenerated { total } => info!("generated {} test cases", total),
        Progress::TestCompleted { completed, total } => {
            if completed % 25 == 0 || completed == total {
                info!("executed {}/{} test cases", completed, total);
            }
        }
        Progress::FindingRaised { category, severity } => {
            warn!("{} finding ({})", category, severity)
        }
    }
}

fn print_summary(report: &ScanReport) {
    println!();
    println!("Scan {} for {}", if report.cancelled { "CANCELLED" } else { "complete" }, report.target);
    println!("  Duration:        {:.1}s", report.duration_secs());
    println!("  Pages crawled:   {}", report.crawl.pages.len());
    println!("  Forms found:     {}", report.crawl.forms.len());
    println!("  Parameters:      {}", report.crawl.params.len());
    println!("  Tests executed:  {} of {} ({} errored)", report.executed, report.summary.total, report.errored);
    println!("  Findings:        {}", report.findings.len());

    for finding in report.findings.iter().take(10) {
        println!(
            "  [{}] {} on '{}' {}",
            finding.severity.to_string().to_uppercase(),
            finding.category,
            finding.param,
            finding.url
        );
    }
    if report.findings.len() > 10 {
        println!("  ... and {} more", report.findings.len() - 10);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ethioscan=info")),
        )
        .init();

    let matches = cli().get_matches();
    let config = build_config(&matches)?;
    let gate = load_gate(&matches)?;
    let catalog = load_catalog(&matches)?;

    let stats = detection_stats(config.rule_set);
    info!(
        "{:?} rules: {} SQL fingerprints, {} script indicators, {} error keywords",
        stats.rule_set, stats.sql_fingerprints, stats.script_indicators, stats.error_keywords
    );

    let control = ScanControl::new();
    let ctrl_c = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after in-flight requests");
            ctrl_c.cancel();
        }
    });

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let progress_task = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            log_progress(&event);
        }
    });

    let scanner = Scanner::from_config(&config)?
        .with_control(control)
        .with_progress(progress_tx);
    let report = scanner.run(&config, &gate, &*catalog).await?;
    drop(scanner);
    let _ = progress_task.await;

    let json_path = matches
        .get_one::<String>("out")
        .map(PathBuf::from)
        .unwrap_or_else(|| default_report_name("json"));
    export_json(&report, &json_path)
        .with_context(|| format!("failed to write {}", json_path.display()))?;
    println!("JSON report written to {}", json_path.display());

    if let Some(csv) = matches.get_one::<String>("csv") {
        let csv_path = if csv.is_empty() { default_report_name("csv") } else { PathBuf::from(csv) };
        export_csv(&report.findings, &csv_path)
            .with_context(|| format!("failed to write {}", csv_path.display()))?;
        println!("CSV report written to {}", csv_path.display());
    }

    print_summary(&report);
    Ok(())
}
