use tracing::warn;

use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::{INSTRUCTION_WIDTH, Instruction};

/// Maximum operand-stack depth reached by `instrs`, starting from an empty
/// stack.
///
/// Follows both fall-through and jump edges. Each instruction is analysed
/// once, at the depth of the first path that reaches it; a later path
/// arriving with a different depth is logged and ignored. Jumps to the end of
/// the buffer (or past it) leave the unit.
pub fn max_stack_depth(instrs: &[Instruction]) -> Result<usize, CompileError> {
    let mut depth_at: Vec<Option<usize>> = vec![None; instrs.len()];
    let mut worklist: Vec<(usize, usize)> = Vec::new();
    let mut max = 0;

    if !instrs.is_empty() {
        worklist.push((0, 0));
    }

    while let Some((index, depth)) = worklist.pop() {
        match depth_at[index] {
            Some(seen) => {
                if seen != depth {
                    warn!(
                        offset = index * INSTRUCTION_WIDTH,
                        seen, depth, "stack depth differs between incoming paths"
                    );
                }
                continue;
            }
            None => depth_at[index] = Some(depth),
        }

        let instr = &instrs[index];
        let (pops, pushes) = instr.opcode.stack_effect();
        if pops > depth {
            return Err(CompileError::StackUnderflow {
                offset: instr.offset,
                mnemonic: instr.opcode.mnemonic().to_string(),
            });
        }
        let after = depth - pops + pushes;
        max = max.max(after).max(depth);

        if !instr.opcode.is_terminal() && index + 1 < instrs.len() {
            worklist.push((index + 1, after));
        }
        if let Some(target) = instr.jump_target() {
            let target_index = target / INSTRUCTION_WIDTH;
            if target_index < instrs.len() {
                worklist.push((target_index, after));
            }
        }
    }

    Ok(max)
}
