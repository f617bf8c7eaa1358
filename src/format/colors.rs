//! mIRC color palette.

/// Named colors and their mIRC index. The first name for an index is the
/// one used when rendering IRC colors back to HTML.
const PALETTE: &[(&str, u8)] = &[
    ("white", 0),
    ("black", 1),
    ("navy", 2),
    ("blue", 2),
    ("green", 3),
    ("red", 4),
    ("maroon", 5),
    ("brown", 5),
    ("purple", 6),
    ("orange", 7),
    ("olive", 7),
    ("yellow", 8),
    ("lime", 9),
    ("lightgreen", 9),
    ("teal", 10),
    ("cyan", 11),
    ("aqua", 11),
    ("royalblue", 12),
    ("lightblue", 12),
    ("fuchsia", 13),
    ("pink", 13),
    ("gray", 14),
    ("grey", 14),
    ("silver", 15),
    ("lightgray", 15),
    ("lightgrey", 15),
];

/// RGB values for each mIRC index, used to resolve `#rrggbb` colors.
const RGB: [(u8, u8, u8); 16] = [
    (255, 255, 255),
    (0, 0, 0),
    (0, 0, 127),
    (0, 147, 0),
    (255, 0, 0),
    (127, 0, 0),
    (156, 0, 156),
    (252, 127, 0),
    (255, 255, 0),
    (0, 252, 0),
    (0, 147, 147),
    (0, 255, 255),
    (0, 0, 252),
    (255, 0, 255),
    (127, 127, 127),
    (210, 210, 210),
];

/// Map an HTML color (name or `#rrggbb`) to its mIRC index.
pub fn color_code(color: &str) -> Option<u8> {
    let color = color.trim();
    if let Some(hex) = color.strip_prefix('#') {
        return nearest_rgb(hex);
    }
    PALETTE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(color))
        .map(|(_, code)| *code)
}

/// Map a mIRC index back to a color name.
pub fn color_name(code: u8) -> Option<&'static str> {
    PALETTE
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(name, _)| *name)
}

fn nearest_rgb(hex: &str) -> Option<u8> {
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let (r, g, b) = (channel(0)?, channel(2)?, channel(4)?);

    let distance = |(pr, pg, pb): (u8, u8, u8)| {
        let dr = i32::from(pr) - i32::from(r);
        let dg = i32::from(pg) - i32::from(g);
        let db = i32::from(pb) - i32::from(b);
        dr * dr + dg * dg + db * db
    };

    (0u8..16).min_by_key(|&i| distance(RGB[usize::from(i)]))
}
