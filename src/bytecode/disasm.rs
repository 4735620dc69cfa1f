use std::collections::BTreeSet;
use std::fmt::Write;

use crate::bytecode::ir::CodeObject;
use crate::bytecode::op::{CompareOp, Instruction, Opcode};

/// Print disassembly of a code object
pub fn print_code(code: &CodeObject) {
    print!("{}", disassemble(code));
}

/// Human-readable listing of a code object: a header, then one instruction
/// per line with its offset, source line, mnemonic, operand and a note on
/// what the operand refers to.
pub fn disassemble(code: &CodeObject) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "════════════════════════════════════════");
    let _ = writeln!(out, " {} ({})", code.name, code.filename);
    let _ = writeln!(
        out,
        " args {}  locals {}  stack {}  flags {}",
        code.argcount,
        code.nlocals,
        code.stacksize,
        code.flags.names().join("|")
    );
    let _ = writeln!(out, "════════════════════════════════════════");

    let instrs = match code.instructions() {
        Ok(instrs) => instrs,
        Err(offset) => {
            let _ = writeln!(out, "<bad opcode at offset {}>", offset);
            return out;
        }
    };

    let targets: BTreeSet<usize> = instrs.iter().filter_map(|i| i.jump_target()).collect();
    let mut last_line = None;

    for instr in &instrs {
        if targets.contains(&instr.offset) {
            let _ = writeln!(out, "          ┌──────────────────────────────────");
        }

        let line = code.line_for_offset(instr.offset);
        let line_col = match line {
            Some(n) if line != last_line => format!("{:>4}", n),
            _ => "    ".to_string(),
        };
        last_line = line;

        let marker = if targets.contains(&instr.offset) { "►" } else { " " };
        let _ = write!(out, "{} {:04} {} ", line_col, instr.offset, marker);
        let _ = writeln!(out, "{}", format_instruction(code, instr));
    }

    out
}

fn format_instruction(code: &CodeObject, instr: &Instruction) -> String {
    let mnemonic = instr.opcode.mnemonic();
    if !instr.opcode.has_arg() {
        return mnemonic.to_string();
    }

    let note = match instr.opcode {
        Opcode::LoadConst => code
            .consts
            .get(instr.arg as usize)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "<missing>".to_string()),
        Opcode::LoadFast | Opcode::StoreFast => code
            .varnames
            .get(instr.arg as usize)
            .cloned()
            .unwrap_or_else(|| "<missing>".to_string()),
        Opcode::CompareOp => CompareOp::from_byte(instr.arg)
            .map(|c| c.symbol().to_string())
            .unwrap_or_else(|| "<bad compare>".to_string()),
        _ => match instr.jump_target() {
            Some(target) => {
                let direction = if target <= instr.offset { "↑" } else { "↓" };
                format!("{} (→ {:04})", direction, target)
            }
            None => String::new(),
        },
    };

    format!("{:<20} {:>3} ; {}", mnemonic, instr.arg, note)
}
