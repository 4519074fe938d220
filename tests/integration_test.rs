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

use std::path::{Path, PathBuf};

use sap2asm::assemble;
use sap2asm::file_reader::{AsmFileReader, MockFileReader};
use sap2asm::regions::RegionSet;

fn assemble_single(src: &str) -> String {
    let mut reader = MockFileReader::default();
    reader.add_file("test.asm", src);
    let regions = RegionSet::single(PathBuf::from("out.hex"));
    let out = assemble(Path::new("test.asm"), &reader, regions).unwrap();
    out[0].contents.clone()
}

fn assemble_single_err(src: &str) -> String {
    let mut reader = MockFileReader::default();
    reader.add_file("test.asm", src);
    let regions = RegionSet::single(PathBuf::from("out.hex"));
    assemble(Path::new("test.asm"), &reader, regions).unwrap_err().to_string()
}

// --- end-to-end scenarios ---------------------------------------------------

#[test]
fn scenario_simple_origin_and_halt() {
    assert_eq!(assemble_single("ORG $F000\nHLT\n"), "@F000\n01\n");
}

#[test]
fn scenario_equ_and_immediate() {
    assert_eq!(
        assemble_single("VAL: EQU $42\nORG 0\nLDI A, #VAL\nHLT\n"),
        "@0000\nB0\n42\n01\n"
    );
}

#[test]
fn scenario_non_contiguous_writes() {
    assert_eq!(
        assemble_single("ORG $0000\nDB $AA\nORG $0010\nDB $BB\n"),
        "@0000\nAA\n@0010\nBB\n"
    );
}

#[test]
fn scenario_local_labels() {
    assert_eq!(
        assemble_single("ORG 0\nR1: NOP\n.loop: JMP .loop\n"),
        "@0000\n00\n10\n01\n00\n"
    );
}

#[test]
fn scenario_conditional_defaulting_via_include() {
    let mut reader = MockFileReader::default();
    reader.add_file("main.asm", "USER EQU $50\nINCLUDE \"lib.inc\"\nORG 0\nLDI A, #USER\n");
    reader.add_file("lib.inc", "IFNDEF USER\nUSER EQU $10\nENDIF\n");
    let regions = RegionSet::single(PathBuf::from("out.hex"));
    let out = assemble(Path::new("main.asm"), &reader, regions).unwrap();
    // USER stays 0x50 (the INCLUDE'd default never applies); LDI A, #USER loads 0x50.
    assert_eq!(out[0].contents, "@0000\nB0\n50\n");
}

#[test]
fn scenario_db_string_with_escapes() {
    assert_eq!(assemble_single("ORG 0\nDB \"Hi\\n\", 0\n"), "@0000\n48\n69\n0A\n00\n");
}

// --- additional end-to-end coverage ----------------------------------------

#[test]
fn macro_expansion_with_parameters_and_hygiene() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "test.asm",
        "MACRO INC_BY val\nLDI A, val\nADD_B\nENDM\nORG 0\nINC_BY 5\nINC_BY 7\n",
    );
    let regions = RegionSet::single(PathBuf::from("out.hex"));
    let out = assemble(Path::new("test.asm"), &reader, regions).unwrap();
    // LDI_A #5, ADD_B, LDI_A #7, ADD_B
    assert_eq!(out[0].contents, "@0000\nB0\n05\n20\nB0\n07\n20\n");
}

#[test]
fn named_regions_partition_output_across_files() {
    let mut reader = MockFileReader::default();
    reader.add_file("test.asm", "ORG $0000\nNOP\nORG $8000\nHLT\n");
    let regions = RegionSet::from_configs(
        &[
            ("low".to_string(), "0000".to_string(), "7FFF".to_string()),
            ("high".to_string(), "8000".to_string(), "FFFF".to_string()),
        ],
        Path::new("/out"),
    )
    .unwrap();
    let out = assemble(Path::new("test.asm"), &reader, regions).unwrap();
    let low = out.iter().find(|r| r.name == "low").unwrap();
    let high = out.iter().find(|r| r.name == "high").unwrap();
    assert_eq!(low.contents, "@0000\n00\n");
    assert_eq!(high.contents, "@0000\n01\n");
    assert_eq!(low.output_path, Path::new("/out/low.hex"));
    assert_eq!(high.output_path, Path::new("/out/high.hex"));
}

#[test]
fn include_resolves_relative_to_including_file_via_real_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.asm"), "INCLUDE \"sub/lib.inc\"\nORG 0\nJMP SHARED\n").unwrap();
    std::fs::create_dir_all(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub/lib.inc"), "SHARED EQU $1234\n").unwrap();

    let reader = AsmFileReader;
    let regions = RegionSet::single(PathBuf::from("out.hex"));
    let out = assemble(&dir.path().join("main.asm"), &reader, regions).unwrap();
    assert_eq!(out[0].contents, "@0000\n10\n34\n12\n");
}

#[test]
fn circular_include_is_rejected_end_to_end() {
    let mut reader = MockFileReader::default();
    reader.add_file("a.asm", "INCLUDE \"b.asm\"\n");
    reader.add_file("b.asm", "INCLUDE \"a.asm\"\n");
    let regions = RegionSet::single(PathBuf::from("out.hex"));
    assert!(assemble(Path::new("a.asm"), &reader, regions).is_err());
}

#[test]
fn dw_emits_multiple_little_endian_words() {
    assert_eq!(assemble_single("ORG 0\nDW $1234, $5678\n"), "@0000\n34\n12\n78\n56\n");
}

#[test]
fn expression_precedence_and_builtin_functions() {
    assert_eq!(
        assemble_single("ORG 0\nDB LOW_BYTE($1234)\nDB HIGH_BYTE($1234)\nDB (1 + 2) << 1\n"),
        "@0000\n34\n12\n06\n"
    );
}

#[test]
fn character_literal_in_db() {
    assert_eq!(assemble_single("ORG 0\nDB 'A', '\\n'\n"), "@0000\n41\n0A\n");
}

#[test]
fn unknown_symbol_reference_fails() {
    let err = assemble_single_err("ORG 0\nJMP NOWHERE\n");
    assert!(err.contains("NOWHERE") || err.contains("unknown symbol"), "{err}");
}

#[test]
fn duplicate_symbol_with_conflicting_value_fails() {
    let err = assemble_single_err("A EQU 1\nA EQU 2\nORG 0\nNOP\n");
    assert!(err.contains("redefined"), "{err}");
}

#[test]
fn stray_endif_fails() {
    assert!(assemble_single_err("ENDIF\n").len() > 0);
}

#[test]
fn unrecognized_line_is_a_warning_not_a_fatal_error() {
    // A bare punctuation line is neither blank, a comment, nor a parseable
    // label/mnemonic line; this is a warning, not an abort, so the rest of
    // the file still assembles.
    assert_eq!(assemble_single("@@@\nORG 0\nHLT\n"), "@0000\n01\n");
}

// --- determinism / idempotence ----------------------------------------------

#[test]
fn reassembling_identical_source_is_bit_identical() {
    let src = "ORG 0\nLOOP: NOP\nJMP LOOP\n";
    assert_eq!(assemble_single(src), assemble_single(src));
}

#[test]
fn full_boot_halt_program_matches_byte_for_byte() {
    let src = r#"
; minimal boot sequence
START EQU $0000
ORG START
MAIN:
    LDI A, #1
    LDI B, #2
    ADD_B
    STA RESULT
    HLT
RESULT: EQU $2000
"#;
    let out = assemble_single(src);
    assert_eq!(out, "@0000\nB0\n01\nB1\n02\n20\nA1\n00\n20\n01\n");
}
