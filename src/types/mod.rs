//! Shared types and formatting helpers used throughout the library.

mod transform;

pub use transform::{euler_to_quat, inverted_safe, quat_to_euler, yup_correction, Trs};

use glam::Mat4;
use std::fmt::Write;

/// Format a matrix as 16 space separated floats in row-major order.
pub fn format_matrix(matrix: &Mat4) -> String {
    let mut s = String::with_capacity(16 * 12);
    for row in 0..4 {
        let r = matrix.row(row);
        for v in r.to_array() {
            write!(s, "{} ", v).unwrap();
        }
    }
    s.pop();
    s
}

/// Format a list of values separated by single spaces.
pub fn format_list<T: std::fmt::Display>(values: impl IntoIterator<Item = T>) -> String {
    let mut s = String::new();
    for v in values {
        if !s.is_empty() {
            s.push(' ');
        }
        write!(s, "{}", v).unwrap();
    }
    s
}

/// Strip a duplicate-name suffix such as `.001` from a host object name.
pub fn make_name(name: &str) -> String {
    let bytes = name.as_bytes();
    let n = bytes.len();
    if n >= 4
        && bytes[n - 4] == b'.'
        && bytes[n - 3] == b'0'
        && bytes[n - 2].is_ascii_digit()
        && bytes[n - 1].is_ascii_digit()
    {
        name[..n - 4].to_string()
    } else {
        name.to_string()
    }
}

/// Turn a host object name into a document id that cannot clash with generated ids.
pub fn validate_id(name: &str) -> String {
    if name.starts_with("id-") {
        format!("z{}", name)
    } else {
        make_name(name)
    }
}

/// Escape text for use inside an XML attribute or element.
pub fn xml_escape(text: &str) -> String {
    let mut s = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => s.push_str("&amp;"),
            '<' => s.push_str("&lt;"),
            '>' => s.push_str("&gt;"),
            '"' => s.push_str("&quot;"),
            '\'' => s.push_str("&apos;"),
            _ => s.push(c),
        }
    }
    s
}
