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

//! Macro collection and expansion.
//!
//! Collection walks every `INCLUDE` reachable from the entry file
//! *unconditionally*, before any conditional-assembly gating is evaluated —
//! this mirrors the original implementation's actual behavior rather than
//! "fixing" it, preserving macros from a conditionally-excluded file as
//! still available elsewhere.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::errors::{self, AssemblyError};
use crate::file_reader::FileReader;
use crate::lexer::{self, split_csv_respecting_quotes};

#[derive(Debug, Clone)]
pub struct MacroDefinition {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<String>,
    pub file: PathBuf,
    pub line: usize,
}

/// One expanded macro-body line, carrying the *invocation's* source position
/// rather than its own position inside the macro body.
#[derive(Debug, Clone)]
pub struct ExpandedLine {
    pub text: String,
    pub file: PathBuf,
    pub line: usize,
}

#[derive(Default)]
pub struct MacroTable {
    macros: HashMap<String, MacroDefinition>,
    expansion_counter: u64,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_macro(&self, name: &str) -> bool {
        self.macros.contains_key(&name.to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Collects every `MACRO ... ENDM` definition reachable from `path`,
    /// following `INCLUDE`s recursively, before any first-pass processing.
    pub fn collect_from_file(&mut self, path: &Path, reader: &dyn FileReader) -> Result<(), AssemblyError> {
        let mut stack = Vec::new();
        let mut collected = HashSet::new();
        self.collect_recursive(path, reader, &mut stack, &mut collected)
    }

    fn collect_recursive(
        &mut self,
        path: &Path,
        reader: &dyn FileReader,
        stack: &mut Vec<PathBuf>,
        collected: &mut HashSet<PathBuf>,
    ) -> Result<(), AssemblyError> {
        let canon = normalize_path(path);
        if stack.contains(&canon) {
            return Err(errors::semantic_no_line(format!(
                "circular INCLUDE detected at '{}'",
                canon.display()
            )));
        }
        if collected.contains(&canon) {
            return Ok(());
        }
        stack.push(canon.clone());
        collected.insert(canon.clone());

        let content = reader
            .read_to_string(path)
            .map_err(|e| errors::semantic_no_line(format!("cannot read include file '{}': {e}", path.display())))?;

        let mut open: Option<MacroDefinition> = None;

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let Some(tok) = lexer::tokenize_line(raw, path, line_no)? else {
                if let Some(def) = &mut open {
                    def.body.push(raw.to_string());
                }
                continue;
            };
            let mnemonic_upper = tok.mnemonic.as_deref().map(str::to_ascii_uppercase);

            if let Some(def) = &mut open {
                if mnemonic_upper.as_deref() == Some("ENDM") {
                    let def = open.take().unwrap();
                    let key = def.name.to_ascii_uppercase();
                    if self.macros.contains_key(&key) {
                        return Err(errors::structural(
                            &def.file,
                            def.line,
                            format!("duplicate macro definition '{}'", def.name),
                        ));
                    }
                    self.macros.insert(key, def);
                } else {
                    def.body.push(raw.to_string());
                }
                continue;
            }

            match mnemonic_upper.as_deref() {
                Some("MACRO") => {
                    let operand = tok.operand.unwrap_or_default();
                    let (name, params) = parse_macro_header(&operand, path, line_no)?;
                    open = Some(MacroDefinition {
                        name,
                        params,
                        body: Vec::new(),
                        file: path.to_path_buf(),
                        line: line_no,
                    });
                }
                Some("ENDM") => {
                    return Err(errors::structural(path, line_no, "ENDM without a matching MACRO"));
                }
                Some("INCLUDE") => {
                    let operand = tok.operand.ok_or_else(|| {
                        errors::structural(path, line_no, "INCLUDE requires a quoted file path")
                    })?;
                    let included = resolve_include_path(path, &operand, line_no)?;
                    self.collect_recursive(&included, reader, stack, collected)?;
                }
                _ => {}
            }
        }

        if let Some(def) = open {
            return Err(errors::structural(&def.file, def.line, "MACRO without a matching ENDM"));
        }

        stack.pop();
        Ok(())
    }

    /// Expands one invocation, substituting parameters and mangling `@@`
    /// local labels with a fresh counter value. Does not recurse into
    /// nested macro invocations — the caller re-tokenizes and re-dispatches
    /// each returned line, which is where recursive expansion happens.
    pub fn expand(
        &mut self,
        name: &str,
        args: &[String],
        invocation_file: &Path,
        invocation_line: usize,
    ) -> Result<Vec<ExpandedLine>, AssemblyError> {
        let def = self
            .macros
            .get(&name.to_ascii_uppercase())
            .ok_or_else(|| errors::structural(invocation_file, invocation_line, format!("unknown macro '{name}'")))?
            .clone();

        if args.len() != def.params.len() {
            return Err(errors::structural(
                invocation_file,
                invocation_line,
                format!(
                    "macro '{}' expects {} argument(s), got {}",
                    def.name,
                    def.params.len(),
                    args.len()
                ),
            ));
        }

        self.expansion_counter += 1;
        let n = self.expansion_counter;

        let out = def
            .body
            .iter()
            .map(|line| {
                let substituted = substitute_params(line, &def.params, args);
                let mangled = mangle_local_labels(&substituted, n);
                ExpandedLine {
                    text: mangled,
                    file: invocation_file.to_path_buf(),
                    line: invocation_line,
                }
            })
            .collect();

        Ok(out)
    }
}

fn parse_macro_header(operand: &str, file: &Path, line: usize) -> Result<(String, Vec<String>), AssemblyError> {
    let operand = operand.trim();
    if operand.is_empty() {
        return Err(errors::structural(file, line, "MACRO requires a name"));
    }
    let (name, rest) = match operand.find(char::is_whitespace) {
        Some(idx) => (&operand[..idx], operand[idx..].trim()),
        None => (operand, ""),
    };
    let params = if rest.is_empty() {
        Vec::new()
    } else {
        split_csv_respecting_quotes(rest)
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
    };
    for p in &params {
        if !is_valid_identifier(p) {
            return Err(errors::structural(file, line, format!("invalid macro parameter name '{p}'")));
        }
    }
    Ok((name.to_string(), params))
}

fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Whole-word replacement of each parameter name with its argument text.
fn substitute_params(line: &str, params: &[String], args: &[String]) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            let mut j = i;
            while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            let word: String = chars[start..j].iter().collect();
            if let Some(idx) = params.iter().position(|p| p == &word) {
                out.push_str(&args[idx]);
            } else {
                out.push_str(&word);
            }
            i = j;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

/// Rewrites `@@name` to `__MACRO_<n>_name` for this expansion.
fn mangle_local_labels(line: &str, n: u64) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '@' && chars.get(i + 1) == Some(&'@') {
            let start = i + 2;
            let mut j = start;
            while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            let name: String = chars[start..j].iter().collect();
            out.push_str(&format!("__MACRO_{n}_{name}"));
            i = j;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// Resolves an `INCLUDE "path"` operand relative to the including file's
/// directory, without touching the filesystem (paths may be fabricated, as
/// in tests that use `MockFileReader`).
pub fn resolve_include_path(from_file: &Path, operand: &str, line: usize) -> Result<PathBuf, AssemblyError> {
    let trimmed = operand.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| errors::structural(from_file, line, "INCLUDE path must be a double-quoted string"))?;
    let base_dir = from_file.parent().unwrap_or_else(|| Path::new(""));
    Ok(normalize_path(&base_dir.join(unquoted)))
}

/// Lexically collapses `.` and `..` components without touching the
/// filesystem (`std::fs::canonicalize` would require the path to exist,
/// which fabricated test paths under `MockFileReader` do not).
pub fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
