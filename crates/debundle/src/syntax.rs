//! Surface-level JavaScript scanning helpers
//!
//! These helpers understand just enough of the token grammar (strings,
//! template literals, comments, bracket nesting) to find where a bracketed
//! region or a statement ends. They are not a parser: regular-expression
//! literals are not recognised and may confuse the bracket count.

use std::ops::Range;

/// Whether `c` can appear inside a JavaScript identifier
pub fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Whether `text` is a single plain identifier
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|first| is_identifier_char(first) && !first.is_ascii_digit())
        && chars.all(is_identifier_char)
}

/// Byte offsets where `ident` appears as a standalone reference
///
/// Property names (`obj.ident`) and longer identifiers containing `ident`
/// are skipped; spread syntax (`...ident`) still counts as a reference.
pub fn identifier_occurrences(haystack: &str, ident: &str) -> Vec<usize> {
    if ident.is_empty() {
        return Vec::new();
    }
    haystack
        .match_indices(ident)
        .map(|(start, _)| start)
        .filter(|&start| {
            let before = &haystack[..start];
            let after = &haystack[start + ident.len()..];
            let mut previous = before.chars().rev();
            let prev_ok = match previous.next() {
                None => true,
                Some('.') => before.ends_with("..."),
                Some(c) => !is_identifier_char(c),
            };
            let next_ok = after.chars().next().is_none_or(|c| !is_identifier_char(c));
            prev_ok && next_ok
        })
        .collect()
}

/// Walks source text while tracking strings, comments and bracket depth
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, pos: usize) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Skip a string, template or comment starting at the cursor.
    /// Returns false when the cursor is on ordinary code.
    fn skip_trivia(&mut self) -> bool {
        match (self.peek(0), self.peek(1)) {
            (Some(b'/'), Some(b'/')) => {
                while let Some(b) = self.peek(0) {
                    if b == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
                true
            }
            (Some(b'/'), Some(b'*')) => {
                self.pos += 2;
                while self.pos < self.bytes.len() {
                    if self.peek(0) == Some(b'*') && self.peek(1) == Some(b'/') {
                        self.pos += 2;
                        return true;
                    }
                    self.pos += 1;
                }
                true
            }
            (Some(quote @ (b'"' | b'\'' | b'`')), _) => {
                self.pos += 1;
                while let Some(b) = self.peek(0) {
                    self.pos += 1;
                    if b == b'\\' {
                        self.pos += 1;
                    } else if b == quote || (b == b'\n' && quote != b'`') {
                        break;
                    }
                }
                true
            }
            _ => false,
        }
    }
}

/// Index of the bracket closing the one at `open`, if balanced
pub fn matching_close(text: &str, open: usize) -> Option<usize> {
    let mut cursor = Cursor::new(text, open);
    let mut depth = 0usize;
    while cursor.pos < cursor.bytes.len() {
        if cursor.skip_trivia() {
            continue;
        }
        match cursor.bytes[cursor.pos] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(cursor.pos);
                }
            }
            _ => {}
        }
        cursor.pos += 1;
    }
    None
}

/// Characters that, at the start of the next line, continue an expression
fn continues_expression(next: u8) -> bool {
    b".,?:+-*/%&|^=<>".contains(&next)
}

/// End of the statement that starts at `start`, as an exclusive byte index
///
/// The terminating `;` is included. Without one, the statement ends at a
/// depth-zero line break whose next line does not continue the expression,
/// before a `}` that closes an enclosing block, or at the end of the text.
pub fn statement_end(text: &str, start: usize) -> usize {
    let mut cursor = Cursor::new(text, start);
    let mut depth = 0usize;
    let mut seen_code = false;
    while cursor.pos < cursor.bytes.len() {
        if cursor.skip_trivia() {
            seen_code = true;
            continue;
        }
        let byte = cursor.bytes[cursor.pos];
        match byte {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => match depth.checked_sub(1) {
                Some(next) => depth = next,
                None => return cursor.pos,
            },
            b';' if depth == 0 => return cursor.pos + 1,
            b'\n' if depth == 0 && seen_code => {
                let rest = &text[cursor.pos..];
                let next = rest.bytes().find(|b| !b.is_ascii_whitespace());
                if next.is_none_or(|b| !continues_expression(b)) {
                    return cursor.pos;
                }
            }
            _ => {}
        }
        if !byte.is_ascii_whitespace() {
            seen_code = true;
        }
        cursor.pos += 1;
    }
    text.len()
}

/// Byte ranges of the `/* ... */` comments in `text`, in order
///
/// Comment-like text inside strings, templates and line comments is not
/// reported.
pub fn block_comment_ranges(text: &str) -> Vec<Range<usize>> {
    let mut cursor = Cursor::new(text, 0);
    let mut ranges = Vec::new();
    while cursor.pos < cursor.bytes.len() {
        let start = cursor.pos;
        let is_block = cursor.peek(0) == Some(b'/') && cursor.peek(1) == Some(b'*');
        if cursor.skip_trivia() {
            if is_block {
                ranges.push(start..cursor.pos);
            }
            continue;
        }
        cursor.pos += 1;
    }
    ranges
}

/// Split `text` at depth-zero occurrences of `separator`
pub fn split_top_level(text: &str, separator: u8) -> Vec<&str> {
    let mut cursor = Cursor::new(text, 0);
    let mut depth = 0usize;
    let mut parts = Vec::new();
    let mut part_start = 0;
    while cursor.pos < cursor.bytes.len() {
        if cursor.skip_trivia() {
            continue;
        }
        match cursor.bytes[cursor.pos] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b if b == separator && depth == 0 => {
                parts.push(&text[part_start..cursor.pos]);
                part_start = cursor.pos + 1;
            }
            _ => {}
        }
        cursor.pos += 1;
    }
    parts.push(&text[part_start..]);
    parts
}

/// Remove every `/* ... */` comment from a short code fragment
pub fn strip_block_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("/*") {
        out.push_str(&rest[..open]);
        match rest[open + 2..].find("*/") {
            Some(close) => rest = &rest[open + 2 + close + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Strip one pair of parentheses that wraps the whole expression
pub fn strip_wrapping_parens(expr: &str) -> &str {
    let trimmed = expr.trim();
    if trimmed.starts_with('(') && matching_close(trimmed, 0) == Some(trimmed.len() - 1) {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// Apply non-overlapping `(range, replacement)` edits to `text`
///
/// Edits may be given in any order; overlapping edits after the first are
/// dropped.
pub fn apply_edits(text: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(range, _)| range.start);
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        if range.start < cursor {
            continue;
        }
        out.push_str(&text[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);
    out
}
