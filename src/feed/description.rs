// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Turns episode description markup into a plain-text preview and remainder.

use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Number of characters, counted in code points, kept in the preview
pub const PREVIEW_LENGTH: usize = 200;

const ELLIPSIS: &str = "...";

/// Plain-text description split at the preview boundary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDescription {
    pub short: String,
    pub long: String,
}

/// Convert (possibly malformed) HTML into a preview and the remaining text
///
/// Runs of whitespace collapse to one space, `<p>` and `<br>` become line
/// breaks (at most two in a row), leading whitespace and zero-width
/// formatting characters are dropped. The preview is cut at the first
/// whitespace after [`PREVIEW_LENGTH`] characters and gets an ellipsis.
pub fn parse_description(input: &str) -> ParsedDescription {
    let fragment = Html::parse_fragment(input);

    let mut splitter = Splitter::default();
    walk(fragment.root_element(), &mut splitter);
    let parsed = splitter.finish();

    or_raw_input(parsed, input)
}

/// Elements whose content never renders as text
const SKIPPED_ELEMENTS: [&str; 3] = ["script", "style", "head"];

/// html5ever recovers from anything, but if recovery lost every piece of
/// visible text the input had, the raw input becomes the preview
fn or_raw_input(parsed: ParsedDescription, input: &str) -> ParsedDescription {
    if parsed.short.is_empty() && has_visible_text(input) {
        return ParsedDescription {
            short: input.trim().to_string(),
            long: String::new(),
        };
    }
    parsed
}

fn walk(element: ElementRef<'_>, splitter: &mut Splitter) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => splitter.push_text(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                if matches!(name, "p" | "br") {
                    splitter.put('\n');
                }
                if let Some(child) = ElementRef::wrap(child) {
                    walk(child, splitter);
                }
            }
            _ => {}
        }
    }
}

fn is_zero_width(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}' | '\u{200B}'..='\u{200F}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
    )
}

/// Whether `input` has visible characters outside of tags and outside the
/// bodies of skipped elements
fn has_visible_text(input: &str) -> bool {
    let lower = input.to_ascii_lowercase();
    let mut rest = lower.as_str();

    while let Some(c) = rest.chars().next() {
        if c == '<' {
            let name: String = rest[1..]
                .chars()
                .take_while(char::is_ascii_alphanumeric)
                .collect();
            let Some(end) = rest.find('>') else {
                return false;
            };
            rest = &rest[end + 1..];

            if SKIPPED_ELEMENTS.contains(&name.as_str()) {
                match rest.find(&format!("</{name}")) {
                    Some(closing) => rest = &rest[closing..],
                    None => return false,
                }
            }
            continue;
        }

        if !c.is_whitespace() && !is_zero_width(c) {
            return true;
        }
        rest = &rest[c.len_utf8()..];
    }
    false
}

#[derive(Debug)]
struct Splitter {
    short: String,
    long: String,
    count: usize,
    in_short: bool,
    newlines: usize,
}

impl Default for Splitter {
    fn default() -> Self {
        Self {
            short: String::new(),
            long: String::new(),
            count: 0,
            in_short: true,
            newlines: 0,
        }
    }
}

impl Splitter {
    fn push_text(&mut self, text: &str) {
        for c in text.chars() {
            if is_zero_width(c) {
                continue;
            }
            self.put(if c.is_whitespace() { ' ' } else { c });
        }
    }

    fn put(&mut self, c: char) {
        let last = self.last_char();
        match c {
            ' ' if matches!(last, None | Some(' ') | Some('\n')) => return,
            '\n' if last.is_none() || self.newlines >= 2 => return,
            '\n' => self.pop_trailing_space(),
            _ => {}
        }

        if c == '\n' {
            self.newlines += 1;
        } else {
            self.newlines = 0;
        }

        if self.in_short && self.count >= PREVIEW_LENGTH && (c == ' ' || c == '\n') {
            self.in_short = false;
        }

        if self.in_short {
            self.short.push(c);
        } else {
            self.long.push(c);
        }
        self.count += 1;
    }

    fn last_char(&self) -> Option<char> {
        self.long
            .chars()
            .next_back()
            .or_else(|| self.short.chars().next_back())
    }

    fn pop_trailing_space(&mut self) {
        let active = if self.long.is_empty() {
            &mut self.short
        } else {
            &mut self.long
        };
        if active.ends_with(' ') {
            active.pop();
            self.count -= 1;
        }
    }

    fn finish(self) -> ParsedDescription {
        let mut short = self.short.trim_end().to_string();
        let long = self.long.trim().to_string();
        if !long.is_empty() {
            short.push_str(ELLIPSIS);
        }
        ParsedDescription { short, long }
    }
}
