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

//! Symbol table construction and the redefinition rule.

use std::collections::HashMap;
use std::path::Path;

use crate::errors::{self, AssemblyError};

/// Inserts `name -> value` into `table`.
///
/// Redefining a symbol with the *same* value is a benign no-op, logged at
/// debug level; redefining it with a *different* value is a semantic error.
pub fn add_symbol(
    table: &mut HashMap<String, u16>,
    name: &str,
    value: u16,
    file: &Path,
    line: usize,
) -> Result<(), AssemblyError> {
    match table.get(name) {
        None => {
            table.insert(name.to_string(), value);
            Ok(())
        }
        Some(&existing) if existing == value => {
            log::debug!(
                "[{} line {}] symbol '{}' redefined with the same value (0x{:04X}); ignoring",
                file.display(),
                line,
                name,
                value
            );
            Ok(())
        }
        Some(&existing) => Err(errors::semantic(
            file,
            line,
            format!(
                "symbol '{name}' redefined with a different value (was 0x{existing:04X}, now 0x{value:04X})"
            ),
        )),
    }
}
