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

//! `IFDEF / IFNDEF / ELSE / ENDIF` as a stack of gating frames.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::{self, AssemblyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondKind {
    IfDef,
    IfNDef,
}

#[derive(Debug, Clone)]
struct CondFrame {
    #[allow(dead_code)]
    kind: CondKind,
    condition_met: bool,
    in_else_block: bool,
    should_assemble: bool,
    origin_file: PathBuf,
    origin_line: usize,
}

/// The stack of open `IFDEF`/`IFNDEF` blocks for one first-pass run.
#[derive(Debug, Default)]
pub struct ConditionalStack {
    frames: Vec<CondFrame>,
}

impl ConditionalStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Whether the line currently being processed should be assembled, given
    /// every enclosing conditional frame.
    pub fn should_assemble(&self) -> bool {
        self.frames.iter().all(|f| f.should_assemble)
    }

    fn parent_gate_excluding_top(&self) -> bool {
        self.frames[..self.frames.len() - 1]
            .iter()
            .all(|f| f.should_assemble)
    }

    /// Returns `true` if `mnemonic` was a conditional directive this engine
    /// consumed (in which case the caller must not emit a token for it).
    pub fn handle(
        &mut self,
        mnemonic: &str,
        operand: Option<&str>,
        symbols: &HashMap<String, u16>,
        file: &Path,
        line: usize,
    ) -> Result<bool, AssemblyError> {
        let parent_gate = self.frames.iter().all(|f| f.should_assemble);

        match mnemonic {
            "IFDEF" | "IFNDEF" => {
                let symbol = operand
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        errors::structural(file, line, format!("{mnemonic} requires a symbol name"))
                    })?;
                let defined = symbols.contains_key(symbol);
                let condition_met = if mnemonic == "IFDEF" { defined } else { !defined };
                let kind = if mnemonic == "IFDEF" {
                    CondKind::IfDef
                } else {
                    CondKind::IfNDef
                };
                self.frames.push(CondFrame {
                    kind,
                    condition_met,
                    in_else_block: false,
                    should_assemble: parent_gate && condition_met,
                    origin_file: file.to_path_buf(),
                    origin_line: line,
                });
                Ok(true)
            }
            "ELSE" => {
                let parent_gate = if self.frames.is_empty() {
                    true
                } else {
                    self.parent_gate_excluding_top()
                };
                let top = self
                    .frames
                    .last_mut()
                    .ok_or_else(|| errors::structural(file, line, "ELSE without a matching IFDEF/IFNDEF"))?;
                if top.in_else_block {
                    return Err(errors::structural(file, line, "multiple ELSE in one conditional block"));
                }
                top.in_else_block = true;
                top.should_assemble = parent_gate && !top.condition_met;
                Ok(true)
            }
            "ENDIF" => {
                if self.frames.pop().is_none() {
                    return Err(errors::structural(file, line, "ENDIF without a matching IFDEF/IFNDEF"));
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Must be called at end-of-input; fails if any block was left open.
    pub fn finish(&self, file: &Path, line: usize) -> Result<(), AssemblyError> {
        if let Some(top) = self.frames.last() {
            return Err(errors::structural(
                file,
                line,
                format!(
                    "unterminated conditional block opened at {}:{}",
                    top.origin_file.display(),
                    top.origin_line
                ),
            ));
        }
        Ok(())
    }
}
