//! Formatting codec between Matrix HTML and mIRC control codes.
//!
//! Matrix carries rich text as a restricted HTML subset in `formatted_body`;
//! IRC carries it as in-band control characters. Style on IRC is global per
//! line rather than scoped, so closing an inner span emits a reset and then
//! re-asserts every still-open outer span.
//!
//! # Control codes
//! - 0x02 (^B): Bold
//! - 0x03 (^C): Color, followed by a two-digit foreground index
//! - 0x0F (^O): Reset all formatting
//! - 0x1F (^_): Underline

mod colors;
mod html;
mod irc;

pub use colors::{color_code, color_name};
pub use html::{decode_entities, html_to_irc};
pub use irc::irc_to_html;

use slirc_proto::FormattedStringExt;

/// Bold toggle.
pub const BOLD: char = '\x02';
/// Color prefix.
pub const COLOR: char = '\x03';
/// Reset all formatting.
pub const RESET: char = '\x0F';
/// Reverse video toggle.
pub const REVERSE: char = '\x16';
/// Italic toggle.
pub const ITALIC: char = '\x1D';
/// Underline toggle.
pub const UNDERLINE: char = '\x1F';

/// Decode an IRC line into a Matrix `body` and optional `formatted_body`.
///
/// The body has bold, color, reset, reverse and underline codes removed.
pub fn decode(line: &str) -> (String, Option<String>) {
    (line.strip_formatting().into_owned(), irc_to_html(line))
}

/// Encode a Matrix message body for IRC.
///
/// Without markup the plain fallback is sent unchanged.
pub fn encode(plain_fallback: &str, markup: Option<&str>) -> String {
    match markup {
        Some(html) => html_to_irc(html),
        None => plain_fallback.to_string(),
    }
}
