// src/util.rs - Small string helpers

/// Longest prefix of `s` that is at most `max_len` bytes and ends on a char boundary.
pub fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// `s` trimmed and cut to `max_len` bytes, with `…` appended when anything was dropped.
pub fn preview(s: &str, max_len: usize) -> String {
    let s = s.trim();
    let cut = truncate_str(s, max_len);
    if cut.len() < s.len() {
        format!("{}…", cut.trim_end())
    } else {
        cut.to_string()
    }
}
