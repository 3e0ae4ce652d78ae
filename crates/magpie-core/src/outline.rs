//! HTML to compact text outline
//!
//! Reduces a page to the structure the reconstruction prompt needs:
//! headings, paragraphs, links, images, lists, and form controls. Layout
//! containers recurse; presentation and scripting are dropped.

use regex::Regex;
use scraper::{ElementRef, Html, Node};
use url::Url;

/// Convert a page into a text outline, truncated to `budget` characters.
pub fn page_outline(html: &str, base_url: &Url, budget: usize) -> String {
    let document = Html::parse_document(html);
    let mut output = String::new();
    let mut ctx = Context::default();

    convert_element(document.root_element(), base_url, &mut output, &mut ctx);

    truncate_to_budget(clean_outline(&output), budget)
}

#[derive(Default)]
struct Context {
    list_depth: usize,
    ordinals: Vec<usize>,
}

fn convert_element(element: ElementRef, base_url: &Url, output: &mut String, ctx: &mut Context) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let normalized = normalize_whitespace(text.text.as_ref());
                if !normalized.trim().is_empty() {
                    output.push_str(&normalized);
                }
            }
            Node::Element(_) => {
                if let Some(elem) = ElementRef::wrap(child) {
                    convert_tag(elem, base_url, output, ctx);
                }
            }
            _ => {}
        }
    }
}

fn convert_tag(element: ElementRef, base_url: &Url, output: &mut String, ctx: &mut Context) {
    let tag = element.value().name();

    match tag {
        "script" | "style" | "noscript" | "svg" | "iframe" | "template" | "head" => {}

        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = tag[1..].parse::<usize>().unwrap_or(1);
            ensure_newlines(output, 2);
            output.push_str(&"#".repeat(level));
            output.push(' ');
            convert_element(element, base_url, output, ctx);
            ensure_newlines(output, 2);
        }

        "p" | "blockquote" => {
            ensure_newlines(output, 2);
            convert_element(element, base_url, output, ctx);
            ensure_newlines(output, 2);
        }

        "br" => output.push('\n'),

        "a" => {
            let text: String = element.text().collect();
            let text = normalize_whitespace(&text);
            let text = text.trim();
            match element.value().attr("href") {
                Some(href) if !text.is_empty() => {
                    let resolved = resolve_url(href, base_url);
                    output.push_str(&format!("[{}]({})", text, resolved));
                }
                _ => convert_element(element, base_url, output, ctx),
            }
        }

        "img" => {
            let alt = element.value().attr("alt").unwrap_or("image");
            if let Some(src) = element.value().attr("src") {
                let resolved = resolve_url(src, base_url);
                output.push_str(&format!("![{}]({})", alt, resolved));
            }
        }

        "ul" | "ol" => {
            ensure_newlines(output, 1);
            ctx.list_depth += 1;
            ctx.ordinals.push(if tag == "ol" { 1 } else { 0 });
            convert_element(element, base_url, output, ctx);
            ctx.ordinals.pop();
            ctx.list_depth -= 1;
            ensure_newlines(output, 1);
        }

        "li" => {
            ensure_newlines(output, 1);
            output.push_str(&"  ".repeat(ctx.list_depth.saturating_sub(1)));
            match ctx.ordinals.last_mut() {
                Some(n) if *n > 0 => {
                    output.push_str(&format!("{}. ", n));
                    *n += 1;
                }
                _ => output.push_str("- "),
            }
            convert_element(element, base_url, output, ctx);
        }

        "button" => {
            let label: String = element.text().collect();
            output.push_str(&format!(" [button: {}] ", normalize_whitespace(&label).trim()));
        }

        "input" => {
            let kind = element.value().attr("type").unwrap_or("text");
            if kind == "hidden" {
                return;
            }
            let label = element
                .value()
                .attr("placeholder")
                .or_else(|| element.value().attr("value"))
                .or_else(|| element.value().attr("name"))
                .unwrap_or(kind);
            output.push_str(&format!(" [input {}: {}] ", kind, label));
        }

        "textarea" | "select" => {
            let name = element.value().attr("name").unwrap_or(tag);
            output.push_str(&format!(" [{}: {}] ", tag, name));
        }

        // Layout containers: keep a line break, recurse
        "div" | "section" | "article" | "main" | "header" | "footer" | "nav" | "aside"
        | "form" | "table" | "tr" => {
            ensure_newlines(output, 1);
            convert_element(element, base_url, output, ctx);
            ensure_newlines(output, 1);
        }

        _ => convert_element(element, base_url, output, ctx),
    }
}

fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_whitespace = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push(' ');
            }
            in_whitespace = true;
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }
    out
}

fn ensure_newlines(output: &mut String, count: usize) {
    let trailing = output.chars().rev().take_while(|&c| c == '\n').count();
    for _ in trailing..count {
        output.push('\n');
    }
}

fn resolve_url(href: &str, base_url: &Url) -> String {
    base_url
        .join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

fn clean_outline(outline: &str) -> String {
    let collapse = Regex::new(r"\n{3,}").unwrap();
    collapse.replace_all(outline, "\n\n").trim().to_string()
}

fn truncate_to_budget(outline: String, budget: usize) -> String {
    if outline.chars().count() <= budget {
        return outline;
    }
    let mut truncated: String = outline.chars().take(budget).collect();
    truncated.push_str("\n[outline truncated]");
    truncated
}
