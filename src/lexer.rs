/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! The line tokenizer: splits a raw source line into label, mnemonic, and
//! operand.

use std::path::Path;

use crate::ast::RawLine;
use crate::errors::{self, AssemblyError};

/// Strips a `;` comment, respecting double-quoted strings (a `;` inside
/// `"…"` is literal text, not a comment marker).
pub fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ';' => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Splits a comma-separated operand list, treating commas inside `"…"` as
/// literal text rather than separators. Each returned item is trimmed.
pub fn split_csv_respecting_quotes(s: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in s.chars() {
        if in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                current.push(c);
            }
            ',' => {
                items.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    items.push(current.trim().to_string());
    items
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Tokenizes one raw source line. Returns `Ok(None)` for a blank or
/// comment-only line (nothing to assemble, no warning).
pub fn tokenize_line(raw: &str, file: &Path, line_no: usize) -> Result<Option<RawLine>, AssemblyError> {
    let without_comment = strip_comment(raw);
    let trimmed = without_comment.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let mut pos = 0;

    // Optional leading label: identifier (optionally `.`-prefixed for local
    // labels) terminated by `:`.
    let mut label = None;
    {
        let mut j = pos;
        let local = chars.get(j) == Some(&'.');
        if local {
            j += 1;
        }
        if chars.get(j).is_some_and(|&c| is_ident_start(c)) {
            let ident_start = if local { pos } else { j };
            let mut k = j + 1;
            while k < chars.len() && is_ident_char(chars[k]) {
                k += 1;
            }
            if chars.get(k) == Some(&':') {
                label = Some(chars[ident_start..k].iter().collect());
                pos = k + 1;
            }
        }
    }

    // Skip separating whitespace between label and mnemonic.
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }

    if pos >= chars.len() {
        // Label-only line.
        return Ok(Some(RawLine {
            label,
            mnemonic: None,
            operand: None,
        }));
    }

    // Mnemonic: identifier `[A-Za-z_]\w*`. A line that is neither empty, a
    // lone label, nor reducible to `label? mnemonic operand?` is reported as
    // a warning and skipped rather than aborting assembly.
    if !is_ident_start(chars[pos]) {
        log::warn!("[{} line {line_no}] unrecognized line, skipping: '{trimmed}'", file.display());
        return Ok(None);
    }
    let mnem_start = pos;
    pos += 1;
    while pos < chars.len() && is_ident_char(chars[pos]) {
        pos += 1;
    }
    let mnemonic: String = chars[mnem_start..pos].iter().collect();

    // Skip whitespace and at most one comma separating mnemonic from operand.
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    if pos < chars.len() && chars[pos] == ',' {
        pos += 1;
        while pos < chars.len() && chars[pos].is_whitespace() {
            pos += 1;
        }
    }

    let operand = if pos < chars.len() {
        let rest: String = chars[pos..].iter().collect();
        let rest = rest.trim();
        if rest.is_empty() { None } else { Some(rest.to_string()) }
    } else {
        None
    };

    // Legacy `LABEL EQU VALUE` shape: no leading label was found (no `:`
    // seen), but the first identifier is actually a label and `EQU` follows.
    if label.is_none() && operand.is_some() {
        // Check for `LABEL EQU VALUE` (mnemonic we scanned was actually the label).
        let candidate_label = mnemonic.clone();
        let rest_after_label = &trimmed[candidate_label.len()..];
        let rest_trimmed = rest_after_label.trim_start();
        if rest_trimmed.to_ascii_uppercase().starts_with("EQU")
            && rest_trimmed[3..].chars().next().is_none_or(|c| c.is_whitespace())
        {
            let value = rest_trimmed[3..].trim();
            return Ok(Some(RawLine {
                label: Some(candidate_label),
                mnemonic: Some("EQU".to_string()),
                operand: if value.is_empty() { None } else { Some(value.to_string()) },
            }));
        }
    }

    Ok(Some(RawLine {
        label,
        mnemonic: Some(mnemonic),
        operand,
    }))
}

/// Processes the escape sequences recognized inside `DB` string literals:
/// `\n \t \r \0 \\ \" \xHH`.
pub fn process_string_escapes(s: &str, file: &Path, line_no: usize) -> Result<Vec<u8>, AssemblyError> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            i += 1;
            continue;
        }
        i += 1;
        if i >= chars.len() {
            return Err(errors::structural(file, line_no, "unterminated escape sequence in string literal"));
        }
        match chars[i] {
            'n' => {
                out.push(b'\n');
                i += 1;
            }
            't' => {
                out.push(b'\t');
                i += 1;
            }
            'r' => {
                out.push(b'\r');
                i += 1;
            }
            '0' => {
                out.push(0);
                i += 1;
            }
            '\\' => {
                out.push(b'\\');
                i += 1;
            }
            '"' => {
                out.push(b'"');
                i += 1;
            }
            'x' => {
                let hex: String = chars.get(i + 1..i + 3).map(|s| s.iter().collect()).unwrap_or_default();
                if hex.len() != 2 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(errors::structural(
                        file,
                        line_no,
                        "incomplete or invalid \\x hex escape in string literal",
                    ));
                }
                let byte = u8::from_str_radix(&hex, 16).expect("validated hex digits");
                out.push(byte);
                i += 3;
            }
            other => {
                return Err(errors::structural(
                    file,
                    line_no,
                    format!("unknown escape sequence '\\{other}' in string literal"),
                ));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn f() -> PathBuf {
        PathBuf::from("t.asm")
    }

    #[test]
    fn blank_and_comment_only_lines_are_none() {
        assert!(tokenize_line("", &f(), 1).unwrap().is_none());
        assert!(tokenize_line("   ", &f(), 1).unwrap().is_none());
        assert!(tokenize_line("; just a comment", &f(), 1).unwrap().is_none());
    }

    #[test]
    fn unrecognized_line_is_a_warning_not_an_error() {
        // Neither blank, a comment, nor reducible to label?/mnemonic/operand?.
        assert!(tokenize_line("@@@", &f(), 1).unwrap().is_none());
        assert!(tokenize_line("$$$", &f(), 1).unwrap().is_none());
    }

    #[test]
    fn semicolon_inside_string_is_not_a_comment() {
        let t = tokenize_line(r#"DB "a;b""#, &f(), 1).unwrap().unwrap();
        assert_eq!(t.mnemonic.as_deref(), Some("DB"));
        assert_eq!(t.operand.as_deref(), Some(r#""a;b""#));
    }

    #[test]
    fn label_only_line() {
        let t = tokenize_line("LOOP:", &f(), 1).unwrap().unwrap();
        assert_eq!(t.label.as_deref(), Some("LOOP"));
        assert!(t.mnemonic.is_none());
    }

    #[test]
    fn local_label_definition() {
        let t = tokenize_line(".loop: JMP .loop", &f(), 1).unwrap().unwrap();
        assert_eq!(t.label.as_deref(), Some(".loop"));
        assert_eq!(t.mnemonic.as_deref(), Some("JMP"));
        assert_eq!(t.operand.as_deref(), Some(".loop"));
    }

    #[test]
    fn mnemonic_with_comma_separated_operand() {
        let t = tokenize_line("LDI A, #5", &f(), 1).unwrap().unwrap();
        assert_eq!(t.mnemonic.as_deref(), Some("LDI"));
        assert_eq!(t.operand.as_deref(), Some("A, #5"));
    }

    #[test]
    fn legacy_equ_without_colon() {
        let t = tokenize_line("VAL EQU $42", &f(), 1).unwrap().unwrap();
        assert_eq!(t.label.as_deref(), Some("VAL"));
        assert_eq!(t.mnemonic.as_deref(), Some("EQU"));
        assert_eq!(t.operand.as_deref(), Some("$42"));
    }

    #[test]
    fn legacy_equ_with_colon() {
        let t = tokenize_line("VAL: EQU $42", &f(), 1).unwrap().unwrap();
        assert_eq!(t.label.as_deref(), Some("VAL"));
        assert_eq!(t.mnemonic.as_deref(), Some("EQU"));
        assert_eq!(t.operand.as_deref(), Some("$42"));
    }

    #[test]
    fn csv_split_respects_quoted_commas() {
        let items = split_csv_respecting_quotes(r#""a,b", 5, "c""#);
        assert_eq!(items, vec![r#""a,b""#, "5", r#""c""#]);
    }

    #[test]
    fn string_escape_processing() {
        let bytes = process_string_escapes(r"Hi\n", &f(), 1).unwrap();
        assert_eq!(bytes, b"Hi\n");
    }

    #[test]
    fn hex_escape_requires_exactly_two_digits() {
        assert!(process_string_escapes(r"\x4", &f(), 1).is_err());
        assert_eq!(process_string_escapes(r"\x41", &f(), 1).unwrap(), vec![0x41]);
    }

    #[test]
    fn unknown_escape_is_rejected() {
        assert!(process_string_escapes(r"\q", &f(), 1).is_err());
    }
}
