//! A1-style coordinate names: parsing and rendering of column letters, row
//! numbers, points and areas.
//!
//! All indices are 0-based. Parsing is case-insensitive, accepts an optional
//! `$` before each part and rejects anything that would exceed [`MAX_SIZE`].

use crate::{MAX_SIZE, Point, Rect, Size, SizeType};

/// One parsed coordinate component found at the start of a string.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScannedIndex {
    pub index: SizeType,
    pub absolute: bool,
    /// Bytes consumed from the input.
    pub len: usize,
}

/// Scan a column name (`$`? letters) at the start of `s`.
pub fn scan_column(s: &str) -> Option<ScannedIndex> {
    let bytes = s.as_bytes();
    let absolute = bytes.first() == Some(&b'$');
    let mut pos = absolute as usize;
    let mut column: SizeType = 0;
    while let Some(&b) = bytes.get(pos) {
        if !b.is_ascii_alphabetic() {
            break;
        }
        let digit = (b.to_ascii_uppercase() - b'A') as SizeType + 1;
        if (MAX_SIZE.width - digit) / 26 < column {
            return None;
        }
        column = column * 26 + digit;
        pos += 1;
    }
    if column == 0 {
        return None;
    }
    Some(ScannedIndex {
        index: column - 1,
        absolute,
        len: pos,
    })
}

/// Scan a 1-based row number (`$`? digits) at the start of `s`.
pub fn scan_row(s: &str) -> Option<ScannedIndex> {
    let bytes = s.as_bytes();
    let absolute = bytes.first() == Some(&b'$');
    let mut pos = absolute as usize;
    match bytes.get(pos) {
        Some(b'1'..=b'9') => {}
        _ => return None,
    }
    let mut row: SizeType = 0;
    while let Some(&b) = bytes.get(pos) {
        if !b.is_ascii_digit() {
            break;
        }
        let digit = (b - b'0') as SizeType;
        if (MAX_SIZE.height - digit) / 10 < row {
            return None;
        }
        row = row * 10 + digit;
        pos += 1;
    }
    Some(ScannedIndex {
        index: row - 1,
        absolute,
        len: pos,
    })
}

pub fn parse_column(s: &str) -> Option<SizeType> {
    scan_column(s)
        .filter(|c| c.len == s.len())
        .map(|c| c.index)
}

pub fn parse_row(s: &str) -> Option<SizeType> {
    scan_row(s).filter(|r| r.len == s.len()).map(|r| r.index)
}

pub fn parse_point(s: &str) -> Option<Point> {
    let column = scan_column(s)?;
    let rest = &s[column.len..];
    let row = scan_row(rest).filter(|r| r.len == rest.len())?;
    Some(Point::new(column.index, row.index))
}

/// Parse `A1`, `A1:B2`, `A:C` or `3:5`. Whole-column and whole-row forms
/// span `bounds` along the open axis.
pub fn parse_area(s: &str, bounds: Size) -> Option<Rect> {
    let Some((first, second)) = s.split_once(':') else {
        return parse_point(s).map(|pt| Rect::new(pt, Size::ONE));
    };
    if let (Some(a), Some(b)) = (parse_point(first), parse_point(second)) {
        return Some(Rect::spanning(a, b));
    }
    if let (Some(a), Some(b)) = (parse_column(first), parse_column(second)) {
        let (lo, hi) = (a.min(b), a.max(b));
        return Some(Rect::from_xywh(lo, 0, hi - lo + 1, bounds.height));
    }
    if let (Some(a), Some(b)) = (parse_row(first), parse_row(second)) {
        let (lo, hi) = (a.min(b), a.max(b));
        return Some(Rect::from_xywh(0, lo, bounds.width, hi - lo + 1));
    }
    None
}

/// Bijective base-26 column name: 0 → `A`, 25 → `Z`, 26 → `AA`.
pub fn index_to_column(index: SizeType) -> String {
    let mut n = index as u64 + 1;
    let mut buf = Vec::with_capacity(4);
    while n > 0 {
        n -= 1;
        buf.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    buf.reverse();
    buf.into_iter().map(char::from).collect()
}

pub fn index_to_row(index: SizeType) -> String {
    (index as u64 + 1).to_string()
}

pub fn point_to_name(pt: Point) -> String {
    let mut s = index_to_column(pt.x);
    s.push_str(&index_to_row(pt.y));
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_names_roundtrip() {
        assert_eq!(parse_column("A"), Some(0));
        assert_eq!(parse_column("z"), Some(25));
        assert_eq!(parse_column("AA"), Some(26));
        assert_eq!(parse_column("$AB"), Some(27));
        assert_eq!(index_to_column(27), "AB");
        assert_eq!(index_to_column(701), "ZZ");
        assert_eq!(index_to_column(702), "AAA");
        for i in [0, 25, 26, 51, 52, 701, 702, 18_277, MAX_SIZE.width - 1] {
            assert_eq!(parse_column(&index_to_column(i)), Some(i));
        }
    }

    #[test]
    fn test_limits_are_exact() {
        assert_eq!(
            parse_point("CRXO2147483647"),
            Some(Point::new(MAX_SIZE.width - 1, MAX_SIZE.height - 1))
        );
        assert_eq!(parse_point("CRXP1"), None);
        assert_eq!(parse_point("A2147483648"), None);
        assert_eq!(parse_row("2147483647"), Some(MAX_SIZE.height - 1));
    }

    #[test]
    fn test_malformed_rows_rejected() {
        assert_eq!(parse_row("0"), None);
        assert_eq!(parse_row("01"), None);
        assert_eq!(parse_row("1a"), None);
        assert_eq!(parse_point("A"), None);
        assert_eq!(parse_point("1"), None);
        assert_eq!(parse_point("A1B"), None);
    }

    #[test]
    fn test_areas() {
        let bounds = Size::new(10, 20);
        assert_eq!(parse_area("B2", bounds), Some(Rect::from_xywh(1, 1, 1, 1)));
        assert_eq!(
            parse_area("C3:A1", bounds),
            Some(Rect::from_xywh(0, 0, 3, 3))
        );
        assert_eq!(parse_area("3:5", bounds), Some(Rect::from_xywh(0, 2, 10, 3)));
        assert_eq!(parse_area("a:c", bounds), Some(Rect::from_xywh(0, 0, 3, 20)));
        assert_eq!(parse_area("A:5", bounds), None);
    }

    #[test]
    fn test_point_names() {
        assert_eq!(point_to_name(Point::new(2, 3)), "C4");
        assert_eq!(index_to_row(0), "1");
    }
}
