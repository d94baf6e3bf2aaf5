//! Injection point parsing for intruder templates
//!
//! Positions are marked by wrapping text in a pair of `§` characters, e.g.
//! `GET /users/§id§ HTTP/1.1`. Pairs are matched left to right; a trailing
//! unterminated `§` yields no point.

use serde::{Deserialize, Serialize};

/// Delimiter wrapping each injection point
pub const MARKER: char = '§';

/// A marked location in a request template
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InjectionPoint {
    /// Marker text as found in the template, delimiters included
    pub placeholder: String,
    /// Text between the delimiters
    pub value: String,
    /// Byte offset of the opening delimiter
    pub index: usize,
}

impl InjectionPoint {
    /// Byte offset just past the closing delimiter
    pub fn end(&self) -> usize {
        self.index + self.placeholder.len()
    }
}

/// Parser for injection point markers
pub struct PayloadPositionParser;

impl PayloadPositionParser {
    /// Find all injection points in left-to-right order
    pub fn parse(template: &str) -> Vec<InjectionPoint> {
        let mut points = Vec::new();
        let mut search_from = 0;

        while let Some(relative_open) = template[search_from..].find(MARKER) {
            let open = search_from + relative_open;
            let value_start = open + MARKER.len_utf8();

            let Some(relative_close) = template[value_start..].find(MARKER) else {
                break;
            };
            let close = value_start + relative_close;
            let end = close + MARKER.len_utf8();

            points.push(InjectionPoint {
                placeholder: template[open..end].to_string(),
                value: template[value_start..close].to_string(),
                index: open,
            });
            search_from = end;
        }

        points
    }

    /// Replace the given points with `payload`
    ///
    /// `points` must come from `parse` on the same template; markers not in
    /// the slice are left verbatim.
    pub fn inject(template: &str, points: &[InjectionPoint], payload: &str) -> String {
        let mut result = String::with_capacity(template.len() + payload.len() * points.len());
        let mut cursor = 0;

        for point in points {
            result.push_str(&template[cursor..point.index]);
            result.push_str(payload);
            cursor = point.end();
        }
        result.push_str(&template[cursor..]);
        result
    }
}
