// HTML surface extraction: links, forms and query parameters
// Uses scraper, which recovers from malformed markup instead of failing the page

use crate::models::{Form, Method, ParamBinding};
use crate::urls::{normalize, NormalizedUrl};
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use tracing::debug;

lazy_static! {
    static ref ANCHOR: Selector = Selector::parse("a[href]").unwrap();
    static ref FORM: Selector = Selector::parse("form").unwrap();
    static ref FIELD: Selector = Selector::parse("input[name], textarea[name], select[name]").unwrap();
}

/// Everything discovered on one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub links: Vec<NormalizedUrl>,
    pub forms: Vec<Form>,
    pub params: Vec<ParamBinding>,
}

impl ParsedPage {
    fn add_binding(&mut self, url: &NormalizedUrl) {
        let params = url.query_keys();
        if params.is_empty() || self.params.iter().any(|b| &b.url == url) {
            return;
        }
        self.params.push(ParamBinding {
            url: url.clone(),
            params,
        });
    }
}

/// Extract links, forms and parameter bindings from `html` fetched at `base`.
pub fn parse(base: &NormalizedUrl, html: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    let mut page = ParsedPage::default();

    for anchor in document.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        // Non-web schemes and unresolvable references drop out here
        let Some(link) = normalize(href, Some(base)) else {
            continue;
        };
        page.add_binding(&link);
        if !page.links.contains(&link) {
            page.links.push(link);
        }
    }

    for form in document.select(&FORM) {
        let action = form
            .value()
            .attr("action")
            .and_then(|raw| normalize(raw, Some(base)))
            .unwrap_or_else(|| base.clone());
        let method = Method::from_form_attr(form.value().attr("method"));

        let mut fields: Vec<String> = Vec::new();
        for field in form.select(&FIELD) {
            if let Some(name) = field.value().attr("name") {
                let name = name.trim();
                if !name.is_empty() && !fields.iter().any(|f| f == name) {
                    fields.push(name.to_string());
                }
            }
        }

        debug!("form on {} -> {} {} {:?}", base, method, action, fields);
        page.add_binding(&action);
        page.forms.push(Form {
            page: base.clone(),
            action,
            method,
            fields,
        });
    }

    page
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> NormalizedUrl {
        NormalizedUrl::parse("http://shop.local/catalog/index.html").unwrap()
    }

    #[test]
    fn resolves_links_and_skips_non_web_schemes() {
        let html = r#"
            <a href="item.php?id=3">item</a>
            <a href="/about#team">about</a>
            <a href="mailto:admin@shop.local">mail</a>
            <a href="tel:+251911">call</a>
            <a href="javascript:void(0)">js</a>
            <a href="">empty</a>
            <a href="item.php?id=3">dup</a>
        "#;
        let page = parse(&base(), html);
        let links: Vec<&str> = page.links.iter().map(|l| l.as_str()).collect();
        assert_eq!(
            links,
            vec![
                "http://shop.local/catalog/item.php?id=3",
                "http://shop.local/about",
            ]
        );
    }

    #[test]
    fn extracts_query_bindings_once_per_url() {
        let html = r#"<a href="search?q=shoes&page=2">s</a><a href="search?q=shoes&page=2">s</a>"#;
        let page = parse(&base(), html);
        assert_eq!(page.params.len(), 1);
        assert_eq!(page.params[0].params, vec!["q".to_string(), "page".to_string()]);
    }

    #[test]
    fn extracts_forms_with_default_method_and_action() {
        let html = r#"
            <form>
              <input name="q"><input type="submit">
            </form>
            <form action="/login" method="POST">
              <input name="user"><input name="pass" type="password">
              <textarea name="note"></textarea>
              <select name="lang"><option>am</option></select>
              <input name="user">
            </form>
            <form action="javascript:submit()" method="delete"><input name="x"></form>
        "#;
        let page = parse(&base(), html);
        assert_eq!(page.forms.len(), 3);

        assert_eq!(page.forms[0].method, Method::GET);
        assert_eq!(page.forms[0].action, base());
        assert_eq!(page.forms[0].fields, vec!["q".to_string()]);

        assert_eq!(page.forms[1].method, Method::POST);
        assert_eq!(page.forms[1].action.as_str(), "http://shop.local/login");
        assert_eq!(page.forms[1].fields, vec!["user", "pass", "note", "lang"]);

        // unknown method falls back to GET, script action falls back to the page
        assert_eq!(page.forms[2].method, Method::GET);
        assert_eq!(page.forms[2].action, base());
    }

    #[test]
    fn form_action_query_becomes_binding() {
        let html = r#"<form action="/cart?item=9"><input name="qty"></form>"#;
        let page = parse(&base(), html);
        assert_eq!(page.params.len(), 1);
        assert_eq!(page.params[0].url.as_str(), "http://shop.local/cart?item=9");
    }

    #[test]
    fn malformed_markup_is_not_fatal() {
        let html = r#"<div><a href="/ok">ok</a><form action="/f"<input name="a"></div><a href="http://[::1">bad</a>"#;
        let page = parse(&base(), html);
        assert!(page.links.iter().any(|l| l.as_str() == "http://shop.local/ok"));
    }
}
