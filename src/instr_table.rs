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

//! The static mnemonic -> (opcode, size) table.
//!
//! `RET, SEC, CLC, PHA, PLA, PHP, PLP, JSR, JNN, JC, JNC` have no opcode in
//! the retrieved original source; the byte values below for those eleven
//! mnemonics were assigned to unused slots in the existing encoding and are
//! not reproduced from any source table.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrInfo {
    pub opcode: Option<u8>,
    pub size: u8,
}

const fn instr(opcode: u8, size: u8) -> InstrInfo {
    InstrInfo {
        opcode: Some(opcode),
        size,
    }
}

const fn data(size: u8) -> InstrInfo {
    InstrInfo { opcode: None, size }
}

/// Looks up a canonical (already-normalized, uppercase) mnemonic.
pub fn lookup(mnemonic: &str) -> Option<InstrInfo> {
    Some(match mnemonic {
        "DB" => data(1),
        "DW" => data(2),

        // zero-operand, size 1
        "NOP" => instr(0x00, 1),
        "HLT" => instr(0x01, 1),
        "RET" => instr(0x02, 1),
        "SEC" => instr(0x03, 1),
        "CLC" => instr(0x04, 1),
        "PHA" => instr(0x05, 1),
        "PLA" => instr(0x06, 1),
        "PHP" => instr(0x07, 1),
        "PLP" => instr(0x08, 1),
        "ADD_B" => instr(0x20, 1),
        "ADD_C" => instr(0x21, 1),
        "ADC_B" => instr(0x22, 1),
        "ADC_C" => instr(0x23, 1),
        "SUB_B" => instr(0x24, 1),
        "SUB_C" => instr(0x25, 1),
        "SBC_B" => instr(0x26, 1),
        "SBC_C" => instr(0x27, 1),
        "INR_A" => instr(0x28, 1),
        "DCR_A" => instr(0x29, 1),
        "ANA_B" => instr(0x30, 1),
        "ANA_C" => instr(0x31, 1),
        "ORA_B" => instr(0x34, 1),
        "ORA_C" => instr(0x35, 1),
        "XRA_B" => instr(0x38, 1),
        "XRA_C" => instr(0x39, 1),
        "CMP_B" => instr(0x3C, 1),
        "CMP_C" => instr(0x3D, 1),
        "RAL" => instr(0x40, 1),
        "RAR" => instr(0x41, 1),
        "CMA" => instr(0x42, 1),
        "INR_B" => instr(0x50, 1),
        "DCR_B" => instr(0x51, 1),
        "INR_C" => instr(0x54, 1),
        "DCR_C" => instr(0x55, 1),
        "MOV_AB" => instr(0x60, 1),
        "MOV_AC" => instr(0x61, 1),
        "MOV_BA" => instr(0x62, 1),
        "MOV_BC" => instr(0x63, 1),
        "MOV_CA" => instr(0x64, 1),
        "MOV_CB" => instr(0x65, 1),

        // one-operand immediate, size 2
        "ANI" => instr(0x32, 2),
        "ORI" => instr(0x36, 2),
        "XRI" => instr(0x3A, 2),
        "LDI_A" => instr(0xB0, 2),
        "LDI_B" => instr(0xB1, 2),
        "LDI_C" => instr(0xB2, 2),

        // two-operand absolute, size 3
        "JMP" => instr(0x10, 3),
        "JZ" => instr(0x11, 3),
        "JNZ" => instr(0x12, 3),
        "JN" => instr(0x13, 3),
        "JSR" => instr(0x14, 3),
        "JNN" => instr(0x15, 3),
        "JC" => instr(0x16, 3),
        "JNC" => instr(0x17, 3),
        "LDA" => instr(0xA0, 3),
        "STA" => instr(0xA1, 3),

        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_operand_instructions_are_size_one_with_no_trailing_operand_bytes() {
        let info = lookup("NOP").unwrap();
        assert_eq!(info.opcode, Some(0x00));
        assert_eq!(info.size, 1);
    }

    #[test]
    fn data_directives_carry_no_opcode() {
        assert_eq!(lookup("DB").unwrap().opcode, None);
        assert_eq!(lookup("DW").unwrap().opcode, None);
        assert_eq!(lookup("DW").unwrap().size, 2);
    }

    #[test]
    fn unknown_mnemonic_is_none() {
        assert!(lookup("FROB").is_none());
    }

    #[test]
    fn no_two_mnemonics_share_an_opcode() {
        let mnemonics = [
            "NOP", "HLT", "RET", "SEC", "CLC", "PHA", "PLA", "PHP", "PLP", "ADD_B", "ADD_C",
            "ADC_B", "ADC_C", "SUB_B", "SUB_C", "SBC_B", "SBC_C", "INR_A", "DCR_A", "ANA_B",
            "ANA_C", "ORA_B", "ORA_C", "XRA_B", "XRA_C", "CMP_B", "CMP_C", "RAL", "RAR", "CMA",
            "INR_B", "DCR_B", "INR_C", "DCR_C", "MOV_AB", "MOV_AC", "MOV_BA", "MOV_BC", "MOV_CA",
            "MOV_CB", "ANI", "ORI", "XRI", "LDI_A", "LDI_B", "LDI_C", "JMP", "JZ", "JNZ", "JN",
            "JSR", "JNN", "JC", "JNC", "LDA", "STA",
        ];
        let mut seen = std::collections::HashSet::new();
        for m in mnemonics {
            let opcode = lookup(m).unwrap().opcode.unwrap();
            assert!(seen.insert(opcode), "opcode 0x{opcode:02X} reused by '{m}'");
        }
    }
}
