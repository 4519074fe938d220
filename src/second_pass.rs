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

//! The second-pass emitter: code generation.
//!
//! Walks the token stream produced by the first pass with a running
//! `global_address`, encoding each token's opcode and operand bytes and
//! routing them into the owning region.

use std::collections::HashMap;

use crate::ast::Token;
use crate::errors::{self, AssemblyError};
use crate::expr;
use crate::instr_table;
use crate::lexer::split_csv_respecting_quotes;
use crate::regions::RegionSet;

/// Runs the second pass, appending every emitted byte into `regions`.
pub fn run(tokens: &[Token], symbols: &HashMap<String, u16>, regions: &mut RegionSet) -> Result<(), AssemblyError> {
    let mut global_address: u32 = 0;
    let mut bytes_emitted: u64 = 0;
    let mut bytes_dropped: u64 = 0;

    for token in tokens {
        let mnemonic = token
            .mnemonic
            .as_deref()
            .ok_or_else(|| errors::semantic(&token.file, token.line, "token carries no mnemonic"))?;

        match mnemonic {
            "EQU" => continue,
            "ORG" => {
                let operand = token
                    .operand
                    .as_deref()
                    .ok_or_else(|| errors::structural(&token.file, token.line, "ORG requires an operand"))?;
                let value = expr::eval(strip_hash(operand), symbols, &token.file, token.line)?;
                if !(0..=0xFFFF).contains(&value) {
                    return Err(errors::semantic(&token.file, token.line, format!("ORG address {value} out of 16-bit range")));
                }
                global_address = value as u32;
                regions.invalidate_contiguity();
            }
            "DB" => {
                let operand = token
                    .operand
                    .as_deref()
                    .ok_or_else(|| errors::structural(&token.file, token.line, "DB requires at least one operand"))?;
                for item in split_csv_respecting_quotes(operand) {
                    if item.starts_with('"') && item.ends_with('"') && item.len() >= 2 {
                        let inner = &item[1..item.len() - 1];
                        let bytes = crate::lexer::process_string_escapes(inner, &token.file, token.line)?;
                        for b in bytes {
                            emit(regions, &mut global_address, b, &mut bytes_emitted, &mut bytes_dropped, token)?;
                        }
                    } else {
                        let value = expr::eval(strip_hash(&item), symbols, &token.file, token.line)?;
                        if !(0..=0xFF).contains(&value) {
                            return Err(errors::semantic(
                                &token.file,
                                token.line,
                                format!("DB item {value} out of 8-bit range"),
                            ));
                        }
                        emit(regions, &mut global_address, value as u8, &mut bytes_emitted, &mut bytes_dropped, token)?;
                    }
                }
            }
            "DW" => {
                let operand = token
                    .operand
                    .as_deref()
                    .ok_or_else(|| errors::structural(&token.file, token.line, "DW requires at least one operand"))?;
                for item in split_csv_respecting_quotes(operand) {
                    let value = expr::eval(strip_hash(&item), symbols, &token.file, token.line)?;
                    if !(0..=0xFFFF).contains(&value) {
                        return Err(errors::semantic(
                            &token.file,
                            token.line,
                            format!("DW item {value} out of 16-bit range"),
                        ));
                    }
                    let v = value as u16;
                    emit(regions, &mut global_address, (v & 0xFF) as u8, &mut bytes_emitted, &mut bytes_dropped, token)?;
                    emit(regions, &mut global_address, (v >> 8) as u8, &mut bytes_emitted, &mut bytes_dropped, token)?;
                }
            }
            other => {
                let info = instr_table::lookup(other).ok_or_else(|| {
                    errors::semantic(&token.file, token.line, format!("unknown mnemonic '{other}' at emission time"))
                })?;

                if let Some(opcode) = info.opcode {
                    emit(regions, &mut global_address, opcode, &mut bytes_emitted, &mut bytes_dropped, token)?;
                }

                match info.size {
                    1 => {}
                    2 => {
                        let operand = token.operand.as_deref().ok_or_else(|| {
                            errors::structural(&token.file, token.line, format!("{other} requires an operand"))
                        })?;
                        let value = expr::eval(strip_hash(operand), symbols, &token.file, token.line)?;
                        if !(0..=0xFF).contains(&value) {
                            return Err(errors::semantic(
                                &token.file,
                                token.line,
                                format!("operand {value} out of 8-bit range for '{other}'"),
                            ));
                        }
                        emit(regions, &mut global_address, value as u8, &mut bytes_emitted, &mut bytes_dropped, token)?;
                    }
                    3 => {
                        let operand = token.operand.as_deref().ok_or_else(|| {
                            errors::structural(&token.file, token.line, format!("{other} requires an operand"))
                        })?;
                        let value = expr::eval(strip_hash(operand), symbols, &token.file, token.line)?;
                        if !(0..=0xFFFF).contains(&value) {
                            return Err(errors::semantic(
                                &token.file,
                                token.line,
                                format!("operand {value} out of 16-bit range for '{other}'"),
                            ));
                        }
                        let v = value as u16;
                        emit(regions, &mut global_address, (v & 0xFF) as u8, &mut bytes_emitted, &mut bytes_dropped, token)?;
                        emit(regions, &mut global_address, (v >> 8) as u8, &mut bytes_emitted, &mut bytes_dropped, token)?;
                    }
                    n => {
                        return Err(errors::semantic(
                            &token.file,
                            token.line,
                            format!("unsupported operand size {n} for '{other}'"),
                        ));
                    }
                }
            }
        }
    }

    log::info!("second pass complete: {bytes_emitted} byte(s) emitted, {bytes_dropped} byte(s) dropped (no owning region)");
    Ok(())
}

/// Emits one byte at `*global_address` into the region owning it (logging
/// and counting a drop if none does), then advances the address.
fn emit(
    regions: &mut RegionSet,
    global_address: &mut u32,
    byte: u8,
    bytes_emitted: &mut u64,
    bytes_dropped: &mut u64,
    token: &Token,
) -> Result<(), AssemblyError> {
    if regions.emit_byte(*global_address, byte) {
        *bytes_emitted += 1;
    } else {
        *bytes_dropped += 1;
        log::warn!(
            "[{} line {}] byte 0x{byte:02X} at address 0x{:04X} falls outside every configured region; dropped",
            token.file.display(),
            token.line,
            *global_address
        );
    }
    *global_address += 1;
    Ok(())
}

fn strip_hash(operand: &str) -> &str {
    operand.trim().strip_prefix('#').unwrap_or(operand.trim())
}
