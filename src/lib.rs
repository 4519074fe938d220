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

pub mod ast;
pub mod conditional;
pub mod errors;
pub mod expr;
pub mod file_reader;
pub mod first_pass;
pub mod instr_table;
pub mod lexer;
pub mod macros;
pub mod regions;
pub mod second_pass;
pub mod symbol_table;

use std::path::Path;

use errors::AssemblyError;
use file_reader::FileReader;
use regions::{AssembledRegion, RegionSet};

/// Runs the full two-pass pipeline over `entry` (and anything it
/// `INCLUDE`s), placing emitted bytes into `regions`, and returns the
/// finished contents of every region.
///
/// `regions` is supplied by the caller already configured — either
/// [`RegionSet::single`] or [`RegionSet::from_configs`] — so a single
/// `Assembler` value is created per run, with no global mutable state
/// carried between invocations.
pub fn assemble<F: FileReader>(
    entry: &Path,
    reader: &F,
    mut regions: RegionSet,
) -> Result<Vec<AssembledRegion>, AssemblyError> {
    let first_pass_output = first_pass::run(entry, reader)?;

    second_pass::run(&first_pass_output.tokens, &first_pass_output.symbols, &mut regions)?;

    Ok(regions.into_outputs())
}
