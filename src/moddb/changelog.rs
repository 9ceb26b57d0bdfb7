//! Latest changelog entry from a mod's page on the mod database.

use crate::model::Changelog;
use scraper::{ElementRef, Html, Node, Selector};

fn selector(sel: &'static str) -> Option<Selector> {
    Selector::parse(sel).ok()
}

/// Trim, then drop leading non-word characters (bullets, dashes, asterisks).
fn clean_line(line: &str) -> Option<String> {
    let cleaned = line
        .trim()
        .trim_start_matches(|c: char| !(c.is_alphanumeric() || c == '_'))
        .trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Text of an element split on `<br>`, skipping text inside `skip` (the version heading).
fn split_on_breaks<'a>(el: ElementRef<'a>, skip: Option<ElementRef<'a>>) -> Vec<String> {
    let mut lines = vec![String::new()];
    for node in el.descendants() {
        match node.value() {
            Node::Text(text) => {
                let in_heading =
                    skip.is_some_and(|h| node.ancestors().any(|a| ElementRef::wrap(a) == Some(h)));
                if in_heading {
                    continue;
                }
                if let Some(current) = lines.last_mut() {
                    current.push_str(text);
                }
            }
            Node::Element(e) if e.name() == "br" => lines.push(String::new()),
            _ => {}
        }
    }
    lines
}

/// Parse the first `div.changelogtext` of a mod page. A page without one gives an empty changelog.
pub fn parse_changelog(html: &str, url: &str) -> Changelog {
    let mut changelog = Changelog {
        url: url.to_string(),
        ..Default::default()
    };
    let (Some(container_sel), Some(strong_sel), Some(li_sel), Some(p_sel)) = (
        selector("div.changelogtext"),
        selector("strong"),
        selector("li"),
        selector("p"),
    ) else {
        return changelog;
    };

    let doc = Html::parse_document(html);
    let Some(container) = doc.select(&container_sel).next() else {
        return changelog;
    };

    let heading = container.select(&strong_sel).next();
    changelog.version = heading
        .map(|s| s.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());

    let items: Vec<String> = container
        .select(&li_sel)
        .filter_map(|li| clean_line(&li.text().collect::<String>()))
        .collect();
    changelog.lines = if !items.is_empty() {
        items
    } else {
        container
            .select(&p_sel)
            .flat_map(|p| split_on_breaks(p, heading))
            .filter_map(|line| clean_line(&line))
            .collect()
    };
    changelog
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://mods.vintagestory.at/show/mod/42#tab-files";

    #[test]
    fn list_items_become_lines() {
        let html = r#"<html><body>
<div class="changelogtext"><p><strong>v1.4.2</strong></p>
<ul><li>- Fixed crash on load</li><li>* Added <em>config</em> option</li><li>   </li></ul></div>
<div class="changelogtext"><p><strong>v1.4.1</strong></p><ul><li>Older</li></ul></div>
</body></html>"#;
        let log = parse_changelog(html, URL);
        assert_eq!(log.version.as_deref(), Some("v1.4.2"));
        assert_eq!(log.lines, vec!["Fixed crash on load", "Added config option"]);
        assert_eq!(log.url, URL);
    }

    #[test]
    fn paragraphs_split_on_breaks() {
        let html = r#"<div class="changelogtext"><p><strong>2.0.0</strong><br>
- New recipes<br/>
&gt; Balance changes<br></p><p>Thanks to all testers</p></div>"#;
        let log = parse_changelog(html, URL);
        assert_eq!(log.version.as_deref(), Some("2.0.0"));
        assert_eq!(
            log.lines,
            vec!["New recipes", "Balance changes", "Thanks to all testers"]
        );
    }

    #[test]
    fn missing_container_is_empty() {
        let log = parse_changelog("<html><body><p>nothing</p></body></html>", URL);
        assert_eq!(log.version, None);
        assert!(log.lines.is_empty());
        assert_eq!(log.url, URL);
    }

    #[test]
    fn clean_line_strips_leading_symbols() {
        assert_eq!(clean_line("  -> done ").as_deref(), Some("done"));
        assert_eq!(clean_line("***"), None);
        assert_eq!(clean_line("1.2 fix").as_deref(), Some("1.2 fix"));
    }
}
