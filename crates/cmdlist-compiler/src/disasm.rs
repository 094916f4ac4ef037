//! Désassemblage textuel, utilisé par `cmdlist inspect --disasm`.

use core::fmt::Write;

use cmdlist_core::{frame::steps_to_ns, CoreResult};
use cmdlist_parser::ast::Cmd;

use crate::bytecode::decode;

/// Une ligne par instruction : offset, instant de départ (pas et ns), mnémonique.
pub fn disassemble(code: &[u8]) -> CoreResult<String> {
    let mut out = String::new();
    let mut at = 0u64;
    for instr in decode(code) {
        let instr = instr?;
        let _ = write!(
            out,
            "{:04x} | {at:>10} | {:>12} ns | {:<7} {}",
            instr.offset,
            steps_to_ns(at),
            instr.op().mnemonic(),
            operands(&instr.cmd)
        );
        if instr.wait > 0 {
            let _ = write!(out, " ;; +{}", instr.wait);
        }
        out.push('\n');
        at = at.wrapping_add(instr.steps());
    }
    let _ = writeln!(out, ";; total: {at} steps, {} ns", steps_to_ns(at));
    Ok(out)
}

fn operands(cmd: &Cmd) -> String {
    match *cmd {
        Cmd::TtlAll(v) => format!("0x{v:08x}"),
        Cmd::Ttl { chn, on } => format!("{chn}, {}", u8::from(on)),
        Cmd::Wait => String::new(),
        Cmd::Clock(p) => format!("{p}"),
        Cmd::Freq { chn, value } => format!("{chn}, {value}"),
        Cmd::Amp { chn, value } | Cmd::Phase { chn, value } | Cmd::Dac { chn, value } => format!("{chn}, {value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::encode;
    use cmdlist_parser::parse;

    #[test]
    fn lists_instructions_with_start_times() {
        let (code, _) = encode(&parse("ttl(2)=on t=7\nwait(90)\ndac(1)=300").unwrap());
        let text = disassemble(&code).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("0000 |          0 |"));
        assert!(lines[0].contains("TTL     2, 1 ;; +7"));
        assert!(lines[1].contains("|         10 |"));
        assert!(lines[2].contains("DAC     1, 300"));
        assert_eq!(lines[3], ";; total: 145 steps, 1450 ns");
    }

    #[test]
    fn stops_on_garbage() {
        assert!(disassemble(&[0x02, 0, 0, 0, 0, 0xEE]).is_err());
    }
}
