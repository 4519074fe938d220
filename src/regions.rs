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

//! The region manager: named memory regions and the `@ADDR` contiguity
//! tracker.

use std::path::PathBuf;

use crate::errors::{self, AssemblyError};

/// A named, contiguous 16-bit address range with its own output buffer.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub output_path: PathBuf,
    lines: Vec<String>,
    next_expected_relative: i64,
    has_emitted_any_content: bool,
}

impl Region {
    fn contains(&self, addr: u32) -> bool {
        (self.start..=self.end).contains(&addr)
    }
}

/// The final, in-memory contents produced for one region. File writing is a
/// collaborator's responsibility, not this crate's.
#[derive(Debug, Clone)]
pub struct AssembledRegion {
    pub name: String,
    pub output_path: PathBuf,
    pub contents: String,
}

pub struct RegionSet {
    regions: Vec<Region>,
}

impl RegionSet {
    /// A single implicit region spanning the full 16-bit address space.
    pub fn single(output_path: PathBuf) -> Self {
        Self {
            regions: vec![Region {
                name: "default".to_string(),
                start: 0,
                end: 0xFFFF,
                output_path,
                lines: Vec::new(),
                next_expected_relative: -1,
                has_emitted_any_content: false,
            }],
        }
    }

    /// One region per `(name, start_hex, end_hex)` tuple, each written to
    /// `<base_dir>/<name>.hex`.
    pub fn from_configs(
        configs: &[(String, String, String)],
        base_dir: &std::path::Path,
    ) -> Result<Self, AssemblyError> {
        let mut regions = Vec::with_capacity(configs.len());
        for (name, start_hex, end_hex) in configs {
            let start = parse_hex_bound(start_hex, name)?;
            let end = parse_hex_bound(end_hex, name)?;
            if start > end {
                return Err(errors::semantic_no_line(format!(
                    "region '{name}': start 0x{start:04X} is greater than end 0x{end:04X}"
                )));
            }
            regions.push(Region {
                name: name.clone(),
                start,
                end,
                output_path: base_dir.join(format!("{name}.hex")),
                lines: Vec::new(),
                next_expected_relative: -1,
                has_emitted_any_content: false,
            });
        }
        Ok(Self { regions })
    }

    /// First matching region containing `addr`, by declaration order.
    pub fn find_mut(&mut self, addr: u32) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.contains(addr))
    }

    /// Invalidates every region's contiguity tracker; called whenever `ORG`
    /// changes the address out from under the emitter.
    pub fn invalidate_contiguity(&mut self) {
        for r in &mut self.regions {
            r.next_expected_relative = -1;
        }
    }

    /// Appends `byte` to the region owning `global_addr`, inserting a fresh
    /// `@ADDR` directive line first if this is the region's first byte or the
    /// address is not contiguous with the last emitted byte.
    pub fn emit_byte(&mut self, global_addr: u32, byte: u8) -> bool {
        let Some(region) = self.find_mut(global_addr) else {
            return false;
        };
        let relative = (global_addr - region.start) as i64;
        if !region.has_emitted_any_content || relative != region.next_expected_relative {
            region.lines.push(format!("@{relative:04X}"));
        }
        region.lines.push(format!("{byte:02X}"));
        region.next_expected_relative = relative + 1;
        region.has_emitted_any_content = true;
        true
    }

    /// Drains every region into its final text contents.
    pub fn into_outputs(self) -> Vec<AssembledRegion> {
        self.regions
            .into_iter()
            .map(|r| AssembledRegion {
                name: r.name,
                output_path: r.output_path,
                contents: r
                    .lines
                    .iter()
                    .map(|l| format!("{l}\n"))
                    .collect::<String>(),
            })
            .collect()
    }
}

fn parse_hex_bound(text: &str, region_name: &str) -> Result<u32, AssemblyError> {
    let trimmed = text.trim().trim_start_matches('$').trim_start_matches("0x").trim_start_matches("0X");
    let value = u32::from_str_radix(trimmed, 16).map_err(|_| {
        errors::semantic_no_line(format!("region '{region_name}': invalid hex bound '{text}'"))
    })?;
    if value > 0xFFFF {
        return Err(errors::semantic_no_line(format!(
            "region '{region_name}': bound 0x{value:X} exceeds the 16-bit address space"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_region_spans_the_full_address_space() {
        let mut set = RegionSet::single(PathBuf::from("out.hex"));
        assert!(set.emit_byte(0x0000, 0xAA));
        assert!(set.emit_byte(0xFFFF, 0xBB));
    }

    #[test]
    fn first_byte_always_gets_an_address_directive() {
        let mut set = RegionSet::single(PathBuf::from("out.hex"));
        set.emit_byte(0xF000, 0x01);
        let out = set.into_outputs();
        assert_eq!(out[0].contents, "@F000\n01\n");
    }

    #[test]
    fn non_contiguous_writes_emit_a_fresh_directive() {
        let mut set = RegionSet::single(PathBuf::from("out.hex"));
        set.emit_byte(0x0000, 0xAA);
        set.emit_byte(0x0010, 0xBB);
        let out = set.into_outputs();
        assert_eq!(out[0].contents, "@0000\nAA\n@0010\nBB\n");
    }

    #[test]
    fn contiguous_writes_do_not_repeat_the_directive() {
        let mut set = RegionSet::single(PathBuf::from("out.hex"));
        set.emit_byte(0x0000, 0x00);
        set.emit_byte(0x0001, 0x10);
        set.emit_byte(0x0002, 0x01);
        let out = set.into_outputs();
        assert_eq!(out[0].contents, "@0000\n00\n10\n01\n");
    }

    #[test]
    fn first_match_wins_for_overlapping_regions() {
        let mut set = RegionSet::from_configs(
            &[
                ("a".to_string(), "0".to_string(), "FFFF".to_string()),
                ("b".to_string(), "0".to_string(), "FFFF".to_string()),
            ],
            std::path::Path::new("/out"),
        )
        .unwrap();
        set.emit_byte(0x10, 0x01);
        let out = set.into_outputs();
        assert_eq!(out[0].name, "a");
        assert!(!out[0].contents.is_empty());
        assert!(out[1].contents.is_empty());
    }

    #[test]
    fn byte_outside_every_region_is_dropped_not_fatal() {
        let mut set = RegionSet::from_configs(
            &[("a".to_string(), "0".to_string(), "FF".to_string())],
            std::path::Path::new("/out"),
        )
        .unwrap();
        assert!(!set.emit_byte(0x1000, 0xAA));
    }

    #[test]
    fn org_invalidates_contiguity_tracking() {
        let mut set = RegionSet::single(PathBuf::from("out.hex"));
        set.emit_byte(0x0000, 0x00);
        set.invalidate_contiguity();
        set.emit_byte(0x0001, 0x01);
        let out = set.into_outputs();
        assert_eq!(out[0].contents, "@0000\n00\n@0001\n01\n");
    }

    #[test]
    fn start_greater_than_end_is_rejected() {
        let result = RegionSet::from_configs(
            &[("bad".to_string(), "FF".to_string(), "0".to_string())],
            std::path::Path::new("/out"),
        );
        assert!(result.is_err());
    }
}
