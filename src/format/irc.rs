//! IRC control codes to HTML.

use super::{BOLD, COLOR, ITALIC, RESET, REVERSE, UNDERLINE, color_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Char(char),
    Bold,
    Underline,
    /// `None` clears the color.
    Color(Option<u8>),
    Reset,
    /// A code with no HTML rendering (reverse, italic).
    Ignored,
}

/// Split an IRC line into text and control tokens.
fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(line.len());
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        let token = match c {
            BOLD => Token::Bold,
            UNDERLINE => Token::Underline,
            RESET => Token::Reset,
            REVERSE | ITALIC => Token::Ignored,
            COLOR => {
                let fg = take_color_number(&mut chars);
                if fg.is_some() && chars.peek() == Some(&',') {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    if lookahead.peek().is_some_and(char::is_ascii_digit) {
                        chars.next();
                        // Background colors have no HTML equivalent here.
                        let _ = take_color_number(&mut chars);
                    }
                }
                Token::Color(fg)
            }
            other => Token::Char(other),
        };
        tokens.push(token);
    }
    tokens
}

/// Read up to two digits of a color index.
fn take_color_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<u8> {
    let first = chars.peek().copied().filter(char::is_ascii_digit)?;
    chars.next();
    let mut value = first.to_digit(10)? as u8;
    if let Some(second) = chars.peek().copied().filter(char::is_ascii_digit) {
        chars.next();
        value = value * 10 + second.to_digit(10)? as u8;
    }
    Some(value)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Style {
    bold: bool,
    underline: bool,
    color: Option<u8>,
}

impl Style {
    fn open_tags(&self, out: &mut String) {
        if self.bold {
            out.push_str("<b>");
        }
        if self.underline {
            out.push_str("<u>");
        }
        if let Some(name) = self.color.and_then(color_name) {
            out.push_str("<font color=\"");
            out.push_str(name);
            out.push_str("\">");
        }
    }

    fn close_tags(&self, out: &mut String) {
        if self.color.and_then(color_name).is_some() {
            out.push_str("</font>");
        }
        if self.underline {
            out.push_str("</u>");
        }
        if self.bold {
            out.push_str("</b>");
        }
    }
}

/// Render an IRC line as HTML.
///
/// Returns `None` when the line has no formatting, so callers can send
/// a plain body without `formatted_body`.
pub fn irc_to_html(line: &str) -> Option<String> {
    let tokens = tokenize(line);
    if tokens.iter().all(|t| matches!(t, Token::Char(_))) {
        return None;
    }

    let mut out = String::with_capacity(line.len() * 2);
    let mut current = Style::default();
    // Text since the last style change, pending so that empty spans are skipped.
    let mut pending = String::new();
    let mut rendered = Style::default();

    let flush = |style: Style, pending: &mut String, out: &mut String| {
        if pending.is_empty() {
            return;
        }
        style.open_tags(out);
        out.push_str(pending);
        style.close_tags(out);
        pending.clear();
    };

    for token in tokens {
        let next = match token {
            Token::Char(c) => {
                rendered = current;
                escape_into(c, &mut pending);
                continue;
            }
            Token::Bold => Style { bold: !current.bold, ..current },
            Token::Underline => Style { underline: !current.underline, ..current },
            Token::Color(color) => Style { color, ..current },
            Token::Reset => Style::default(),
            Token::Ignored => continue,
        };
        if next != current {
            flush(rendered, &mut pending, &mut out);
            current = next;
        }
    }
    flush(rendered, &mut pending, &mut out);
    Some(out)
}

fn escape_into(c: char, out: &mut String) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        c => out.push(c),
    }
}
