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

//! The first-pass driver: symbol resolution.
//!
//! Walks the entry file (following `INCLUDE`), applying the line tokenizer,
//! macro engine, and conditional engine to each line in turn; tracks
//! `effective_address` and `active_global_label`; and builds the symbol
//! table and flat token stream consumed by the second pass.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ast::Token;
use crate::conditional::ConditionalStack;
use crate::errors::{self, AssemblyError};
use crate::expr;
use crate::file_reader::FileReader;
use crate::instr_table;
use crate::lexer::{self, split_csv_respecting_quotes};
use crate::macros::{self, MacroTable};
use crate::symbol_table;

pub struct FirstPassOutput {
    pub tokens: Vec<Token>,
    pub symbols: HashMap<String, u16>,
}

struct State {
    symbols: HashMap<String, u16>,
    tokens: Vec<Token>,
    conditional: ConditionalStack,
    effective_address: u32,
    active_global_label: Option<String>,
    last_file: PathBuf,
    last_line: usize,
}

/// Runs macro collection followed by the first pass over `entry` and
/// everything it `INCLUDE`s.
pub fn run<F: FileReader>(entry: &Path, reader: &F) -> Result<FirstPassOutput, AssemblyError> {
    let mut macro_table = MacroTable::new();
    macro_table.collect_from_file(entry, reader)?;
    log::debug!("macro collection complete: {} macro(s) defined", macro_table.len());

    let mut state = State {
        symbols: HashMap::new(),
        tokens: Vec::new(),
        conditional: ConditionalStack::new(),
        effective_address: 0,
        active_global_label: None,
        last_file: entry.to_path_buf(),
        last_line: 0,
    };
    let mut include_stack: Vec<PathBuf> = Vec::new();

    process_file(entry, reader, &mut macro_table, &mut state, &mut include_stack)?;

    state.conditional.finish(&state.last_file.clone(), state.last_line)?;

    log::info!(
        "first pass complete: {} symbol(s), {} token(s)",
        state.symbols.len(),
        state.tokens.len()
    );

    Ok(FirstPassOutput {
        tokens: state.tokens,
        symbols: state.symbols,
    })
}

fn process_file<F: FileReader>(
    path: &Path,
    reader: &F,
    macro_table: &mut MacroTable,
    state: &mut State,
    include_stack: &mut Vec<PathBuf>,
) -> Result<(), AssemblyError> {
    let canon = macros::normalize_path(path);
    if include_stack.contains(&canon) {
        return Err(errors::semantic_no_line(format!(
            "circular INCLUDE detected at '{}'",
            canon.display()
        )));
    }
    include_stack.push(canon);

    let content = reader
        .read_to_string(path)
        .map_err(|e| errors::semantic_no_line(format!("cannot read '{}': {e}", path.display())))?;

    let mut in_macro_def = false;

    for (idx, raw_text) in content.lines().enumerate() {
        let line_no = idx + 1;
        let Some(probe) = lexer::tokenize_line(raw_text, path, line_no)? else {
            continue;
        };
        let mnemonic_upper = probe.mnemonic.as_deref().map(str::to_ascii_uppercase);

        if in_macro_def {
            if mnemonic_upper.as_deref() == Some("ENDM") {
                in_macro_def = false;
            }
            continue;
        }
        if mnemonic_upper.as_deref() == Some("MACRO") {
            in_macro_def = true;
            continue;
        }

        process_line(raw_text, path, line_no, reader, macro_table, state, include_stack)?;
    }

    include_stack.pop();
    Ok(())
}

/// Processes one logical line, whether sourced directly from a file or
/// produced by macro expansion (in which case `file`/`line_no` are the
/// invocation's source position).
#[allow(clippy::too_many_arguments)]
fn process_line<F: FileReader>(
    text: &str,
    file: &Path,
    line_no: usize,
    reader: &F,
    macro_table: &mut MacroTable,
    state: &mut State,
    include_stack: &mut Vec<PathBuf>,
) -> Result<(), AssemblyError> {
    state.last_file = file.to_path_buf();
    state.last_line = line_no;

    let Some(raw) = lexer::tokenize_line(text, file, line_no)? else {
        return Ok(());
    };

    let mnemonic_upper = raw.mnemonic.as_deref().map(str::to_ascii_uppercase);

    if let Some(m) = mnemonic_upper.as_deref() {
        if matches!(m, "IFDEF" | "IFNDEF" | "ELSE" | "ENDIF") {
            state
                .conditional
                .handle(m, raw.operand.as_deref(), &state.symbols, file, line_no)?;
            return Ok(());
        }
    }

    if !state.conditional.should_assemble() {
        return Ok(());
    }

    if let Some(m) = mnemonic_upper.as_deref() {
        if m == "INCLUDE" {
            let operand = raw
                .operand
                .ok_or_else(|| errors::structural(file, line_no, "INCLUDE requires a quoted file path"))?;
            let included = macros::resolve_include_path(file, &operand, line_no)?;
            process_file(&included, reader, macro_table, state, include_stack)?;
            return Ok(());
        }

        if macro_table.is_macro(m) {
            let args = raw
                .operand
                .as_deref()
                .map(split_csv_respecting_quotes)
                .unwrap_or_default();
            let expanded = macro_table.expand(m, &args, file, line_no)?;

            if let Some(label) = &raw.label {
                process_line(&format!("{label}:"), file, line_no, reader, macro_table, state, include_stack)?;
            }
            for line in expanded {
                process_line(&line.text, &line.file, line.line, reader, macro_table, state, include_stack)?;
            }
            return Ok(());
        }
    }

    process_plain_line(&raw, mnemonic_upper.as_deref(), file, line_no, state)
}

fn mangle_label(
    active: &Option<String>,
    label: &str,
    file: &Path,
    line_no: usize,
) -> Result<String, AssemblyError> {
    if let Some(local) = label.strip_prefix('.') {
        let global = active.as_ref().ok_or_else(|| {
            errors::structural(
                file,
                line_no,
                format!("local label '.{local}' defined with no active global label in scope"),
            )
        })?;
        Ok(format!("{global}.{local}"))
    } else {
        Ok(label.to_string())
    }
}

/// Rewrites `.local` references inside an operand string to their mangled
/// `<global>.<local>` form, using the scope in effect *as the line begins*.
/// Content inside double-quoted strings is left untouched.
fn rewrite_local_refs(operand: &str, active: &Option<String>, file: &Path, line_no: usize) -> Result<String, AssemblyError> {
    let chars: Vec<char> = operand.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    let mut in_string = false;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
            continue;
        }
        let prev_is_word = i > 0 && {
            let p = chars[i - 1];
            p.is_ascii_alphanumeric() || p == '_' || p == '.'
        };
        if c == '.' && !prev_is_word && chars.get(i + 1).is_some_and(|d| d.is_ascii_alphabetic() || *d == '_') {
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            let local: String = chars[start..j].iter().collect();
            let global = active.as_ref().ok_or_else(|| {
                errors::structural(
                    file,
                    line_no,
                    format!("local label reference '.{local}' with no active global label in scope"),
                )
            })?;
            out.push_str(&format!("{global}.{local}"));
            i = j;
        } else {
            out.push(c);
            i += 1;
        }
    }
    Ok(out)
}

/// Surface-form register/operand normalization for combined mnemonics.
fn normalize_mnemonic(
    mnemonic_upper: &str,
    operand: Option<&str>,
    file: &Path,
    line_no: usize,
) -> Result<(String, Option<String>), AssemblyError> {
    match mnemonic_upper {
        "LDI" => {
            let op = operand.ok_or_else(|| errors::structural(file, line_no, "LDI requires 'reg, imm'"))?;
            let parts = split_csv_respecting_quotes(op);
            if parts.len() != 2 {
                return Err(errors::structural(file, line_no, "LDI requires exactly two operands: 'reg, imm'"));
            }
            let reg = parts[0].trim().to_ascii_uppercase();
            let imm = parts[1].trim().to_string();
            Ok((format!("LDI_{reg}"), Some(imm)))
        }
        "MOV" => {
            let op = operand.ok_or_else(|| errors::structural(file, line_no, "MOV requires 'dst, src'"))?;
            let parts = split_csv_respecting_quotes(op);
            if parts.len() != 2 {
                return Err(errors::structural(file, line_no, "MOV requires exactly two operands: 'dst, src'"));
            }
            let dst = parts[0].trim().to_ascii_uppercase();
            let src = parts[1].trim().to_ascii_uppercase();
            Ok((format!("MOV_{dst}{src}"), None))
        }
        "INR" | "DCR" | "ADD" | "SUB" | "ADC" | "SBC" | "ANA" | "ORA" | "XRA" | "CMP" => {
            let op = operand.ok_or_else(|| {
                errors::structural(file, line_no, format!("{mnemonic_upper} requires a register operand"))
            })?;
            let reg = op.trim().to_ascii_uppercase();
            Ok((format!("{mnemonic_upper}_{reg}"), None))
        }
        other => Ok((other.to_string(), operand.map(str::to_string))),
    }
}

fn db_byte_count(operand: Option<&str>, file: &Path, line_no: usize) -> Result<u32, AssemblyError> {
    let operand = operand.ok_or_else(|| errors::structural(file, line_no, "DB requires at least one operand"))?;
    let mut total = 0u32;
    for item in split_csv_respecting_quotes(operand) {
        if item.starts_with('"') && item.ends_with('"') && item.len() >= 2 {
            let inner = &item[1..item.len() - 1];
            let bytes = lexer::process_string_escapes(inner, file, line_no)?;
            total += bytes.len() as u32;
        } else {
            total += 1;
        }
    }
    Ok(total)
}

fn dw_byte_count(operand: Option<&str>, file: &Path, line_no: usize) -> Result<u32, AssemblyError> {
    let operand = operand.ok_or_else(|| errors::structural(file, line_no, "DW requires at least one operand"))?;
    let items = split_csv_respecting_quotes(operand);
    if items.is_empty() {
        return Err(errors::structural(file, line_no, "DW requires at least one operand"));
    }
    Ok(items.len() as u32 * 2)
}

fn process_plain_line(
    raw: &crate::ast::RawLine,
    mnemonic_upper: Option<&str>,
    file: &Path,
    line_no: usize,
    state: &mut State,
) -> Result<(), AssemblyError> {
    let label_mangled = match &raw.label {
        Some(label) => Some(mangle_label(&state.active_global_label, label, file, line_no)?),
        None => None,
    };

    let rewritten_operand = match &raw.operand {
        Some(op) => Some(rewrite_local_refs(op, &state.active_global_label, file, line_no)?),
        None => None,
    };

    let is_global_label = raw.label.as_deref().is_some_and(|l| !l.starts_with('.'));
    if is_global_label && mnemonic_upper != Some("EQU") {
        state.active_global_label = raw.label.clone();
    }

    match mnemonic_upper {
        None => {
            // Label-only line: no token, no address advance.
            if let Some(lm) = &label_mangled {
                let addr = require_u16(state.effective_address, file, line_no)?;
                symbol_table::add_symbol(&mut state.symbols, lm, addr, file, line_no)?;
            }
            Ok(())
        }
        Some("ORG") => {
            let operand = rewritten_operand
                .as_deref()
                .ok_or_else(|| errors::structural(file, line_no, "ORG requires an operand"))?;
            let value = expr::eval(strip_hash(operand), &state.symbols, file, line_no)?;
            if !(0..=0xFFFF).contains(&value) {
                return Err(errors::semantic(file, line_no, format!("ORG address {value} out of 16-bit range")));
            }
            state.effective_address = value as u32;
            state.tokens.push(Token {
                label: raw.label.clone(),
                mnemonic: Some("ORG".to_string()),
                operand: rewritten_operand,
                file: file.to_path_buf(),
                line: line_no,
            });
            Ok(())
        }
        Some("EQU") => {
            let lm = label_mangled
                .ok_or_else(|| errors::structural(file, line_no, "EQU requires a label"))?;
            let operand = rewritten_operand
                .as_deref()
                .ok_or_else(|| errors::structural(file, line_no, "EQU requires an operand"))?;
            let value = expr::eval(strip_hash(operand), &state.symbols, file, line_no)?;
            if !(0..=0xFFFF).contains(&value) {
                return Err(errors::semantic(file, line_no, format!("EQU value {value} out of 16-bit range")));
            }
            symbol_table::add_symbol(&mut state.symbols, &lm, value as u16, file, line_no)?;
            state.tokens.push(Token {
                label: raw.label.clone(),
                mnemonic: Some("EQU".to_string()),
                operand: rewritten_operand,
                file: file.to_path_buf(),
                line: line_no,
            });
            Ok(())
        }
        Some(raw_mnemonic) => {
            let (mnemonic, operand) = normalize_mnemonic(raw_mnemonic, rewritten_operand.as_deref(), file, line_no)?;

            if let Some(lm) = &label_mangled {
                let addr = require_u16(state.effective_address, file, line_no)?;
                symbol_table::add_symbol(&mut state.symbols, lm, addr, file, line_no)?;
            }

            let size = match mnemonic.as_str() {
                "DB" => db_byte_count(operand.as_deref(), file, line_no)?,
                "DW" => dw_byte_count(operand.as_deref(), file, line_no)?,
                other => {
                    instr_table::lookup(other)
                        .ok_or_else(|| errors::semantic(file, line_no, format!("unknown mnemonic '{other}'")))?
                        .size as u32
                }
            };

            let new_addr = state.effective_address + size;
            if new_addr > 0x1_0000 {
                return Err(errors::semantic(file, line_no, "address advanced past the 16-bit address space"));
            }

            state.tokens.push(Token {
                label: raw.label.clone(),
                mnemonic: Some(mnemonic),
                operand,
                file: file.to_path_buf(),
                line: line_no,
            });
            state.effective_address = new_addr;
            Ok(())
        }
    }
}

fn require_u16(addr: u32, file: &Path, line_no: usize) -> Result<u16, AssemblyError> {
    u16::try_from(addr).map_err(|_| errors::semantic(file, line_no, format!("address 0x{addr:X} out of 16-bit range")))
}

fn strip_hash(operand: &str) -> &str {
    operand.trim().strip_prefix('#').unwrap_or(operand.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;

    fn assemble_tokens(src: &str) -> FirstPassOutput {
        let mut reader = MockFileReader::default();
        reader.add_file("t.asm", src);
        run(Path::new("t.asm"), &reader).unwrap()
    }

    #[test]
    fn simple_org_and_halt() {
        let out = assemble_tokens("ORG $F000\nHLT\n");
        assert_eq!(out.tokens.len(), 2);
        assert_eq!(out.tokens[0].mnemonic.as_deref(), Some("ORG"));
        assert_eq!(out.tokens[1].mnemonic.as_deref(), Some("HLT"));
    }

    #[test]
    fn equ_then_immediate_load() {
        let out = assemble_tokens("VAL: EQU $42\nORG 0\nLDI A, #VAL\nHLT\n");
        assert_eq!(out.symbols.get("VAL"), Some(&0x42));
        assert_eq!(out.tokens[2].mnemonic.as_deref(), Some("LDI_A"));
        assert_eq!(out.tokens[2].operand.as_deref(), Some("#VAL"));
    }

    #[test]
    fn local_labels_mangle_under_active_global() {
        let out = assemble_tokens("ORG 0\nR1: NOP\n.loop: JMP .loop\n");
        assert_eq!(out.symbols.get("R1"), Some(&0x0000));
        assert_eq!(out.symbols.get("R1.loop"), Some(&0x0001));
        assert_eq!(out.tokens.last().unwrap().operand.as_deref(), Some("R1.loop"));
    }

    #[test]
    fn local_label_with_no_active_scope_fails() {
        let mut reader = MockFileReader::default();
        reader.add_file("t.asm", ".loop: NOP\n");
        assert!(run(Path::new("t.asm"), &reader).is_err());
    }

    #[test]
    fn mov_normalizes_to_combined_mnemonic() {
        let out = assemble_tokens("MOV A, B\n");
        assert_eq!(out.tokens[0].mnemonic.as_deref(), Some("MOV_AB"));
        assert!(out.tokens[0].operand.is_none());
    }

    #[test]
    fn register_unary_ops_normalize() {
        let out = assemble_tokens("INR B\nDCR C\n");
        assert_eq!(out.tokens[0].mnemonic.as_deref(), Some("INR_B"));
        assert_eq!(out.tokens[1].mnemonic.as_deref(), Some("DCR_C"));
    }

    #[test]
    fn db_with_string_and_numeric_items_sizes_correctly() {
        let out = assemble_tokens("ORG 0\nDB \"Hi\\n\", 0\nHLT\n");
        // "Hi\n" -> 3 bytes + 1 numeric item = 4; HLT lands at address 4.
        assert_eq!(out.symbols.len(), 0);
        assert_eq!(out.tokens[1].mnemonic.as_deref(), Some("HLT"));
    }

    #[test]
    fn conditional_ifndef_supplies_default() {
        let mut reader = MockFileReader::default();
        reader.add_file("main.asm", "USER EQU $50\nINCLUDE \"lib.inc\"\n");
        reader.add_file("lib.inc", "IFNDEF USER\nUSER EQU $10\nENDIF\n");
        let out = run(Path::new("main.asm"), &reader).unwrap();
        assert_eq!(out.symbols.get("USER"), Some(&0x50));
    }

    #[test]
    fn unterminated_conditional_fails_at_eof() {
        let mut reader = MockFileReader::default();
        reader.add_file("t.asm", "IFDEF X\nNOP\n");
        assert!(run(Path::new("t.asm"), &reader).is_err());
    }

    #[test]
    fn macro_invocation_expands_with_fresh_local_labels() {
        let mut reader = MockFileReader::default();
        reader.add_file(
            "t.asm",
            "MACRO BUMP\n@@top: INR_A\nJMP @@top\nENDM\nORG 0\nBUMP\nBUMP\n",
        );
        let out = run(Path::new("t.asm"), &reader).unwrap();
        assert!(out.symbols.contains_key("__MACRO_1_top"));
        assert!(out.symbols.contains_key("__MACRO_2_top"));
    }

    #[test]
    fn macro_invocation_label_is_prefixed_onto_expansion() {
        let mut reader = MockFileReader::default();
        reader.add_file("t.asm", "MACRO SETUP\nNOP\nENDM\nORG 0\nSTART: SETUP\nJMP START\n");
        let out = run(Path::new("t.asm"), &reader).unwrap();
        assert_eq!(out.symbols.get("START"), Some(&0x0000));
    }

    #[test]
    fn duplicate_symbol_with_different_value_fails() {
        let mut reader = MockFileReader::default();
        reader.add_file("t.asm", "A EQU 1\nA EQU 2\n");
        assert!(run(Path::new("t.asm"), &reader).is_err());
    }

    #[test]
    fn duplicate_symbol_with_same_value_is_benign() {
        let out = assemble_tokens("A EQU 1\nA EQU 1\n");
        assert_eq!(out.symbols.get("A"), Some(&1));
    }
}
