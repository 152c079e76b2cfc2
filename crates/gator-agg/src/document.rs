use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::escape;
use quick_xml::events::{BytesStart, BytesText, Event};
use snafu::Snafu;
use tracing::{debug, warn};

const LOG_TARGET: &str = "gator::document";

/// A decoded RSS document
///
/// Transient: only the entries end up in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyndicationDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    /// In document order
    pub entries: Vec<SyndicationEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyndicationEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    /// As found in the document, see [`crate::normalize_pub_date`]
    pub pub_date: String,
    pub guid: String,
}

#[derive(Debug, Snafu)]
#[snafu(display("Malformed syndication document: {reason}"))]
pub struct MalformedDocument {
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
    Guid,
}

impl Field {
    /// Only unprefixed names match, so e.g. `atom:link` never shadows `link`
    fn from_name(start: &BytesStart<'_>) -> Option<Self> {
        Some(match start.name().as_ref() {
            b"title" => Field::Title,
            b"link" => Field::Link,
            b"description" => Field::Description,
            b"pubDate" => Field::PubDate,
            b"guid" => Field::Guid,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Channel,
    Item,
}

/// Text of a field element being read, including text of nested markup
struct Capture {
    field: Field,
    scope: Scope,
    /// Nesting depth of the field element's parent
    depth: usize,
    text: String,
}

// Nesting depths of the elements we care about: `<rss>` is the root at 0.
const CHANNEL_DEPTH: usize = 1;
const CHANNEL_CHILD_DEPTH: usize = 2;
const ITEM_CHILD_DEPTH: usize = 3;

/// Decode an RSS document, leniently
///
/// Unknown and namespaced elements are ignored. An XML error after the root
/// element was opened ends decoding: entries completed so far are kept, and
/// an entry cut off by the error is kept only if its link was read. An error
/// (or end of input) before any element yields [`MalformedDocument`].
///
/// Titles and descriptions are HTML-unescaped once, leniently.
pub fn parse_document(body: &[u8]) -> Result<SyndicationDocument, MalformedDocument> {
    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();

    let mut doc = SyndicationDocument::default();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut in_channel = false;
    let mut item: Option<SyndicationEntry> = None;
    let mut capture: Option<Capture> = None;

    loop {
        buf.clear();
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(err) => {
                if !saw_root {
                    return MalformedDocumentSnafu {
                        reason: err.to_string(),
                    }
                    .fail();
                }
                warn!(
                    target: LOG_TARGET,
                    err = %err,
                    position = reader.buffer_position(),
                    entries = doc.entries.len(),
                    "XML error, keeping what was decoded so far"
                );
                break;
            }
        };

        match event {
            Event::Start(start) => {
                saw_root = true;

                if capture.is_none() {
                    if depth == CHANNEL_DEPTH && start.name().as_ref() == b"channel" {
                        in_channel = true;
                    } else if in_channel && depth == CHANNEL_CHILD_DEPTH {
                        if start.name().as_ref() == b"item" {
                            item = Some(SyndicationEntry::default());
                        } else if let Some(field) = Field::from_name(&start) {
                            capture = Some(Capture {
                                field,
                                scope: Scope::Channel,
                                depth,
                                text: String::new(),
                            });
                        }
                    } else if item.is_some() && depth == ITEM_CHILD_DEPTH {
                        if let Some(field) = Field::from_name(&start) {
                            capture = Some(Capture {
                                field,
                                scope: Scope::Item,
                                depth,
                                text: String::new(),
                            });
                        }
                    }
                }

                depth += 1;
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);

                if capture.as_ref().is_some_and(|c| c.depth == depth) {
                    if let Some(capture) = capture.take() {
                        commit(&mut doc, item.as_mut(), capture);
                    }
                } else if depth == CHANNEL_CHILD_DEPTH && item.is_some() {
                    if let Some(entry) = item.take() {
                        doc.entries.push(entry);
                    }
                } else if depth == CHANNEL_DEPTH && in_channel {
                    in_channel = false;
                }
            }
            Event::Empty(_) => {
                saw_root = true;
            }
            Event::Text(text) => {
                if let Some(capture) = capture.as_mut() {
                    capture.text.push_str(&unescape_xml(&text));
                }
            }
            Event::CData(cdata) => {
                if let Some(capture) = capture.as_mut() {
                    capture.text.push_str(&String::from_utf8_lossy(&cdata));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return MalformedDocumentSnafu {
            reason: "no root element",
        }
        .fail();
    }

    if let Some(entry) = item.take() {
        if entry.link.is_empty() {
            debug!(target: LOG_TARGET, title = %entry.title, "Dropping cut off entry without a link");
        } else {
            doc.entries.push(entry);
        }
    }

    unescape_html(&mut doc.title);
    unescape_html(&mut doc.description);
    for entry in &mut doc.entries {
        unescape_html(&mut entry.title);
        unescape_html(&mut entry.description);
    }

    Ok(doc)
}

/// Store a finished field; the first occurrence of a field wins
fn commit(doc: &mut SyndicationDocument, item: Option<&mut SyndicationEntry>, capture: Capture) {
    let slot = match (capture.scope, item) {
        (Scope::Channel, _) => match capture.field {
            Field::Title => &mut doc.title,
            Field::Link => &mut doc.link,
            Field::Description => &mut doc.description,
            Field::PubDate | Field::Guid => return,
        },
        (Scope::Item, Some(entry)) => match capture.field {
            Field::Title => &mut entry.title,
            Field::Link => &mut entry.link,
            Field::Description => &mut entry.description,
            Field::PubDate => &mut entry.pub_date,
            Field::Guid => &mut entry.guid,
        },
        (Scope::Item, None) => return,
    };

    if slot.is_empty() {
        *slot = capture.text.trim().to_owned();
    }
}

/// XML entities and character references
///
/// HTML-only entities (`&nbsp;`, `&rsquo;`...) resolve here as well. Text that
/// still fails to decode (a bare `&`) is taken as is and left for
/// [`unescape_html`].
fn unescape_xml(text: &BytesText<'_>) -> String {
    match text.unescape_with(escape::resolve_html5_entity) {
        Ok(s) => s.into_owned(),
        Err(_) => String::from_utf8_lossy(text).into_owned(),
    }
}

/// Decode HTML entities and character references, one level
///
/// Anything that doesn't decode, e.g. the `&` in `?a=1&b=2`, is kept as is,
/// and so are the entities around it.
fn unescape_html(s: &mut String) {
    if !s.contains('&') {
        return;
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s.as_str();
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match decode_entity(tail) {
            Some((decoded, len)) => {
                out.push_str(&decoded);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);

    *s = out;
}

/// The entity `s` starts with, decoded, and its length in `s`
fn decode_entity(s: &str) -> Option<(Cow<'_, str>, usize)> {
    let end = 1 + s[1..].find(|c: char| c == ';' || c == '&' || c.is_whitespace())?;
    if s.as_bytes()[end] != b';' {
        return None;
    }

    let decoded = escape::unescape_with(&s[..=end], escape::resolve_html5_entity).ok()?;
    Some((decoded, end + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <atom:link href="https://example.com/feed.xml" rel="self" type="application/rss+xml"/>
    <title>Example &amp;amp; Co</title>
    <link>https://example.com/</link>
    <description>All the news</description>
    <generator>hand</generator>
    <item>
      <title>First</title>
      <link>https://example.com/1</link>
      <dc:creator>someone</dc:creator>
      <description><![CDATA[<p>Hello <b>world</b></p>]]></description>
      <pubDate>Mon, 02 Jan 2006 15:04:05 -0700</pubDate>
      <guid isPermaLink="true">https://example.com/1</guid>
    </item>
    <item>
      <title>Second <em>part</em></title>
      <link>
        https://example.com/2
      </link>
      <pubDate>2006-01-03 10:00:00</pubDate>
    </item>
  </channel>
</rss>
"#;

    #[test]
    fn decodes_channel_and_entries() {
        let doc = parse_document(FEED.as_bytes()).unwrap();

        assert_eq!(doc.title, "Example & Co");
        assert_eq!(doc.link, "https://example.com/");
        assert_eq!(doc.description, "All the news");
        assert_eq!(
            doc.entries,
            vec![
                SyndicationEntry {
                    title: "First".into(),
                    link: "https://example.com/1".into(),
                    description: "<p>Hello <b>world</b></p>".into(),
                    pub_date: "Mon, 02 Jan 2006 15:04:05 -0700".into(),
                    guid: "https://example.com/1".into(),
                },
                SyndicationEntry {
                    title: "Second part".into(),
                    link: "https://example.com/2".into(),
                    description: String::new(),
                    pub_date: "2006-01-03 10:00:00".into(),
                    guid: String::new(),
                },
            ]
        );
    }

    #[test]
    fn unescapes_html_exactly_once() {
        let doc = parse_document(
            br#"<rss><channel><item>
                <title>Fish &amp;amp; Chips &amp;amp;amp; more</title>
                <description>&amp;lt;b&amp;gt;bold&amp;lt;/b&amp;gt;</description>
                <link>https://example.com/a?x=1&amp;amp;y=2</link>
            </item></channel></rss>"#,
        )
        .unwrap();

        let entry = &doc.entries[0];
        assert_eq!(entry.title, "Fish & Chips &amp; more");
        assert_eq!(entry.description, "<b>bold</b>");
        // links are not HTML-unescaped
        assert_eq!(entry.link, "https://example.com/a?x=1&amp;y=2");
    }

    #[test]
    fn html_only_entities_are_decoded() {
        let doc = parse_document(
            b"<rss><channel><item><title>a&nbsp;b</title><link>l</link></item></channel></rss>",
        )
        .unwrap();

        assert_eq!(doc.entries[0].title, "a\u{a0}b");
    }

    #[test]
    fn html_only_entities_do_not_skip_xml_decoding() {
        let doc = parse_document(
            b"<rss><channel><item><title>a&nbsp;b &amp;amp; c</title><link>l</link></item></channel></rss>",
        )
        .unwrap();

        assert_eq!(doc.entries[0].title, "a\u{a0}b & c");
    }

    #[test]
    fn bare_ampersands_do_not_block_unescaping() {
        let doc = parse_document(
            br#"<rss><channel><item>
                <title>Q&amp;A: Don&amp;#8217;t</title>
                <description><![CDATA[<a href="x?a=1&b=2">Don&#8217;t</a> &amp; more]]></description>
                <link>https://example.com/q</link>
            </item></channel></rss>"#,
        )
        .unwrap();

        let entry = &doc.entries[0];
        assert_eq!(entry.title, "Q&A: Don\u{2019}t");
        assert_eq!(
            entry.description,
            "<a href=\"x?a=1&b=2\">Don\u{2019}t</a> & more"
        );
    }

    #[test]
    fn html_unescaping_skips_what_it_cannot_decode() {
        let mut s = String::from("a &lt; b ?x=1&c=2 &#8217; &bogus; &; &#xZZ; &amp;amp; & end&");

        unescape_html(&mut s);

        assert_eq!(s, "a < b ?x=1&c=2 \u{2019} &bogus; &; &#xZZ; &amp; & end&");
    }

    #[test]
    fn keeps_entries_before_a_truncation() {
        let doc = parse_document(
            b"<rss><channel><item><title>A</title><link>https://a</link></item>\
              <item><title>B</title><link>https://b",
        )
        .unwrap();

        let links: Vec<_> = doc.entries.iter().map(|e| e.link.as_str()).collect();
        assert_eq!(links, ["https://a"]);
    }

    #[test]
    fn keeps_cut_off_entry_with_a_link() {
        let doc = parse_document(
            b"<rss><channel><item><link>https://a</link><title>cut",
        )
        .unwrap();

        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.entries[0].link, "https://a");
        assert_eq!(doc.entries[0].title, "");
    }

    #[test]
    fn keeps_entries_before_an_xml_error() {
        let doc = parse_document(
            b"<rss><channel><item><link>https://a</link></item>\
              <item><title>B</title></wrong></channel></rss>",
        )
        .unwrap();

        let links: Vec<_> = doc.entries.iter().map(|e| e.link.as_str()).collect();
        assert_eq!(links, ["https://a"]);
    }

    #[test]
    fn unknown_root_is_an_empty_document() {
        let doc = parse_document(b"<html><body><p>hi</p></body></html>").unwrap();

        assert_eq!(doc, SyndicationDocument::default());
    }

    #[test]
    fn rejects_documents_without_elements() {
        assert!(parse_document(b"").is_err());
        assert!(parse_document(b"   \n").is_err());
        assert!(parse_document(b"not xml at all").is_err());
        assert!(parse_document(b"<?xml version=\"1.0\"?>").is_err());
    }
}
