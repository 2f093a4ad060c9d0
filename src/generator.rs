// Test case generation from the crawl surface and the payload catalog
//
// Priority order is fixed so truncation at `max_total` is reproducible:
// parameters before forms, discovery order before catalog order.

use crate::fetcher::{ACCEPT, USER_AGENT};
use crate::models::{Category, CrawlResult, Form, Method, Origin, ParamBinding, PayloadEntry, Profile, TestCase};
use crate::mutator::{idor_perturbations, is_numeric_value};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};
use url::form_urlencoded;
use uuid::Uuid;

/// Value placed in every form field that is not under test
pub const BENIGN_VALUE: &str = "test_value";

/// Generate at most `max_total` test cases.
pub fn generate(
    crawl: &CrawlResult,
    catalog: &[PayloadEntry],
    profile: Profile,
    max_per_param: usize,
    max_total: usize,
) -> Vec<TestCase> {
    let selected = select_payloads(catalog, profile, max_per_param);
    let mut cases = Vec::new();
    if max_total == 0 {
        return cases;
    }

    for binding in &crawl.params {
        for name in &binding.params {
            let mut payloads: Vec<PayloadEntry> = selected.clone();
            if let Some(value) = binding.url.query_value(name) {
                if is_numeric_value(&value) {
                    payloads.extend(idor_perturbations(&value).into_iter().take(max_per_param));
                }
            }

            for entry in payloads {
                cases.push(param_case(binding, name, entry));
                if cases.len() >= max_total {
                    info!("test budget of {} reached during parameter cases", max_total);
                    return cases;
                }
            }
        }
    }

    for form in &crawl.forms {
        for field in &form.fields {
            for entry in &selected {
                cases.push(form_case(form, field, entry.clone()));
                if cases.len() >= max_total {
                    info!("test budget of {} reached during form cases", max_total);
                    return cases;
                }
            }
        }
    }

    info!("generated {} test cases", cases.len());
    cases
}

/// Up to `max_per_param` entries of each category, categories in order of first
/// appearance, entries in catalog order. IDOR entries are never taken from the
/// catalog; they are derived from observed numeric values.
fn select_payloads(catalog: &[PayloadEntry], profile: Profile, max_per_param: usize) -> Vec<PayloadEntry> {
    let mut order: Vec<Category> = Vec::new();
    let mut groups: BTreeMap<Category, Vec<PayloadEntry>> = BTreeMap::new();

    for entry in catalog {
        if entry.category == Category::Idor || !entry.category.is_payload_category() {
            continue;
        }
        if !profile.allows(entry) {
            continue;
        }
        let group = groups.entry(entry.category).or_default();
        if group.is_empty() {
            order.push(entry.category);
        }
        if group.len() < max_per_param {
            group.push(entry.clone());
        }
    }

    let selected: Vec<PayloadEntry> = order
        .iter()
        .filter_map(|c| groups.remove(c))
        .flatten()
        .collect();
    debug!("{} payloads selected for profile {}", selected.len(), profile);
    selected
}

fn param_case(binding: &ParamBinding, name: &str, entry: PayloadEntry) -> TestCase {
    TestCase {
        id: Uuid::new_v4(),
        method: Method::GET,
        url: binding.url.with_query_value(name, &entry.payload),
        target: name.to_string(),
        category: entry.category,
        lab_only: entry.lab_only,
        payload: entry,
        origin: Origin::Param,
        fields: Vec::new(),
    }
}

fn form_case(form: &Form, field: &str, entry: PayloadEntry) -> TestCase {
    let fields: Vec<(String, String)> = form
        .fields
        .iter()
        .map(|f| {
            let value = if f == field { entry.payload.clone() } else { BENIGN_VALUE.to_string() };
            (f.clone(), value)
        })
        .collect();

    let url = match form.method {
        Method::GET => form.action.with_query_pairs(&fields),
        Method::POST => form.action.to_string(),
    };

    TestCase {
        id: Uuid::new_v4(),
        method: form.method,
        url,
        target: field.to_string(),
        category: entry.category,
        lab_only: entry.lab_only,
        payload: entry,
        origin: Origin::Form,
        fields,
    }
}

/// Shell-quote for single-quoted strings
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// A curl command that replays the test case by hand.
pub fn curl_command(case: &TestCase) -> String {
    let mut parts = vec!["curl".to_string(), "-X".to_string(), case.method.to_string()];

    if case.method == Method::POST && !case.fields.is_empty() {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(case.fields.iter())
            .finish();
        parts.push("-d".to_string());
        parts.push(shell_quote(&body));
    }

    parts.push(shell_quote(&case.url));
    parts.push("-H".to_string());
    parts.push(shell_quote(&format!("User-Agent: {}", USER_AGENT)));
    parts.push("-H".to_string());
    parts.push(shell_quote(&format!("Accept: {}", ACCEPT)));
    parts.join(" ")
}

/// Counts of generated cases by category and origin
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationSummary {
    pub total: usize,
    pub by_category: BTreeMap<Category, usize>,
    pub by_origin: BTreeMap<Origin, usize>,
    pub lab_only: usize,
}

pub fn summarize(cases: &[TestCase]) -> GenerationSummary {
    let mut summary = GenerationSummary {
        total: cases.len(),
        ..Default::default()
    };
    for case in cases {
        *summary.by_category.entry(case.category).or_insert(0) += 1;
        *summary.by_origin.entry(case.origin).or_insert(0) += 1;
        if case.lab_only {
            summary.lab_only += 1;
        }
    }
    summary
}
