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

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use sap2asm::assemble;
use sap2asm::file_reader::AsmFileReader;
use sap2asm::regions::RegionSet;
use serde::Deserialize;

/// A two-pass assembler for the SAP2-class 8-bit CPU.
#[derive(ClapParser)]
#[clap(version, author = "Connor Nolan")]
struct Opts {
    /// Input assembly source file.
    input: PathBuf,

    /// Output hex file (single-region mode) or base directory for
    /// `<NAME>.hex` files (when any --region is given).
    output: PathBuf,

    /// Defines one memory region: NAME START_HEX END_HEX. Repeatable.
    #[clap(long = "region", num_args = 3, value_names = ["NAME", "START_HEX", "END_HEX"])]
    region: Vec<String>,

    /// Optional JSON file describing regions, laid out under any --region
    /// flags given on the command line.
    #[clap(long)]
    config: Option<PathBuf>,
}

#[derive(Deserialize)]
struct RegionConfigEntry {
    name: String,
    start: String,
    end: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    let mut entries: Vec<(String, String, String)> = Vec::new();

    if let Some(config_path) = &opts.config {
        let contents = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read region config: {}", config_path.display()))?;
        let parsed: Vec<RegionConfigEntry> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse region config: {}", config_path.display()))?;
        entries.extend(parsed.into_iter().map(|e| (e.name, e.start, e.end)));
    }

    for chunk in opts.region.chunks(3) {
        if let [name, start, end] = chunk {
            entries.push((name.clone(), start.clone(), end.clone()));
        }
    }

    let regions = if entries.is_empty() {
        RegionSet::single(opts.output.clone())
    } else {
        RegionSet::from_configs(&entries, &opts.output)?
    };

    let reader = AsmFileReader;
    let assembled = assemble(&opts.input, &reader, regions)?;

    if !entries.is_empty() {
        fs::create_dir_all(&opts.output)
            .with_context(|| format!("Failed to create output directory: {}", opts.output.display()))?;
    } else if let Some(parent) = opts.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    for region in &assembled {
        fs::write(&region.output_path, &region.contents)
            .with_context(|| format!("Failed to write region file: {}", region.output_path.display()))?;
        println!(
            "Successfully assembled {} to {} (region '{}')",
            opts.input.display(),
            region.output_path.display(),
            region.name
        );
    }

    Ok(())
}
