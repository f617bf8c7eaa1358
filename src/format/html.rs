//! Restricted HTML to IRC control codes.

use super::{BOLD, COLOR, RESET, UNDERLINE, color_code};

/// An open style span.
struct Span {
    tag: String,
    code: String,
}

/// Convert a restricted HTML fragment to an IRC line.
///
/// `<b>`/`<strong>` become bold, `<u>` underline and `<font color>` (or
/// `data-mx-color`) a two-digit color. Every other tag is dropped while its
/// text is kept, and entities are decoded.
pub fn html_to_irc(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut open: Vec<Span> = Vec::new();
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        out.push_str(&decode_entities(&rest[..lt]));
        let after = &rest[lt + 1..];
        let Some(gt) = after.find('>') else {
            // Not a tag, just a stray '<'.
            out.push_str(&decode_entities(&rest[lt..]));
            rest = "";
            break;
        };
        let tag = Tag::parse(&after[..gt]);
        rest = &after[gt + 1..];

        match tag {
            Tag::Open { name, attrs } => {
                if let Some(code) = style_code(&name, &attrs) {
                    out.push_str(&code);
                    open.push(Span { tag: name, code });
                }
            }
            Tag::Close { name } => {
                let Some(pos) = open.iter().rposition(|s| s.tag == name) else {
                    continue;
                };
                open.remove(pos);
                out.push(RESET);
                for span in &open {
                    out.push_str(&span.code);
                }
            }
            Tag::Other => {}
        }
    }
    out.push_str(&decode_entities(rest));
    out
}

fn style_code(name: &str, attrs: &[(String, String)]) -> Option<String> {
    match name {
        "b" | "strong" => Some(BOLD.to_string()),
        "u" => Some(UNDERLINE.to_string()),
        "font" | "span" => {
            let color = attrs
                .iter()
                .find(|(k, _)| k == "color" || k == "data-mx-color")
                .map(|(_, v)| v.as_str())?;
            color_code(color).map(|code| format!("{COLOR}{code:02}"))
        }
        _ => None,
    }
}

enum Tag {
    Open {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Close {
        name: String,
    },
    /// Comments, doctypes, and self-closing elements.
    Other,
}

impl Tag {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with('!') || raw.ends_with('/') {
            return Tag::Other;
        }
        if let Some(name) = raw.strip_prefix('/') {
            return Tag::Close {
                name: name.trim().to_ascii_lowercase(),
            };
        }
        let (name, rest) = raw
            .split_once(char::is_whitespace)
            .unwrap_or((raw, ""));
        Tag::Open {
            name: name.to_ascii_lowercase(),
            attrs: parse_attrs(rest),
        }
    }
}

/// Parse `key="value" key='value' key=value` attribute lists.
fn parse_attrs(mut s: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    loop {
        s = s.trim_start();
        if s.is_empty() {
            break;
        }
        let key_end = s.find(|c: char| c == '=' || c.is_whitespace()).unwrap_or(s.len());
        let key = s[..key_end].to_ascii_lowercase();
        s = s[key_end..].trim_start();

        let Some(value_part) = s.strip_prefix('=') else {
            attrs.push((key, String::new()));
            continue;
        };
        let value_part = value_part.trim_start();
        let (value, remaining) = match value_part.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let inner = &value_part[1..];
                match inner.find(q) {
                    Some(end) => (&inner[..end], &inner[end + 1..]),
                    None => (inner, ""),
                }
            }
            _ => {
                let end = value_part.find(char::is_whitespace).unwrap_or(value_part.len());
                (&value_part[..end], &value_part[end..])
            }
        };
        attrs.push((key, decode_entities(value)));
        s = remaining;
    }
    attrs
}

/// Decode the HTML entities Matrix clients emit.
///
/// Unknown entities are left untouched.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        match candidate.find(';').and_then(|semi| {
            decode_entity(&candidate[1..semi]).map(|c| (c, semi))
        }) {
            Some((c, semi)) => {
                out.push(c);
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "quot" => Some('"'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
