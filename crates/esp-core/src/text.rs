//! Human-readable program text
//!
//! Programs print as whitespace separated tokens, e.g.
//! `slot 4 follow offset 1 read`, and parse back from the same form.

use crate::{EspError, Op, Program};
use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};
use alloy_primitives::{Bytes, U256};
use core::{fmt, str::FromStr};

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::PushWord(word) => write!(f, "push {}", format_word(word)),
            Op::PushBytes(data) => write!(f, "bytes 0x{}", hex::encode(data)),
            Op::Target => write!(f, "target"),
            Op::SetSlot(slot) => write!(f, "slot {}", format_word(slot)),
            Op::Offset(delta) => write!(f, "offset {}", format_word(delta)),
            Op::Follow => write!(f, "follow"),
            Op::Read(1) => write!(f, "read"),
            Op::Read(count) => write!(f, "read {}", count),
            Op::ReadBytes => write!(f, "readbytes"),
            Op::Eval { acquire: true } => write!(f, "eval acquire"),
            Op::Eval { acquire: false } => write!(f, "eval"),
            Op::SetOutput(index) => write!(f, "output {}", index),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", op)?;
        }
        Ok(())
    }
}

/// Words up to u64 print in decimal, wider ones in hex
fn format_word(word: &U256) -> String {
    if *word <= U256::from(u64::MAX) {
        word.to_string()
    } else {
        format!("{:#x}", word)
    }
}

/// Parse a decimal or `0x`-prefixed hex word
pub fn parse_word(token: &str) -> Result<U256, EspError> {
    let parsed = match token.strip_prefix("0x") {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
        None => U256::from_str_radix(token, 10),
    };
    parsed.map_err(|e| EspError::Encoding(format!("invalid word '{}': {}", token, e)))
}

fn parse_small<T: FromStr>(token: &str, what: &str) -> Result<T, EspError> {
    token
        .parse::<T>()
        .map_err(|_| EspError::Encoding(format!("invalid {} '{}'", what, token)))
}

impl FromStr for Program {
    type Err = EspError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        let mut ops = Vec::new();
        let mut i = 0;

        let operand = |i: usize, name: &str| -> Result<&str, EspError> {
            tokens
                .get(i + 1)
                .copied()
                .ok_or_else(|| EspError::Encoding(format!("'{}' expects an operand", name)))
        };

        while i < tokens.len() {
            let token = tokens[i];
            let op = match token {
                "push" => {
                    i += 1;
                    Op::PushWord(parse_word(operand(i - 1, token)?)?)
                }
                "bytes" => {
                    i += 1;
                    let raw = operand(i - 1, token)?;
                    let data = hex::decode(raw.strip_prefix("0x").unwrap_or(raw))?;
                    Op::PushBytes(Bytes::from(data))
                }
                "target" => Op::Target,
                "slot" => {
                    i += 1;
                    Op::SetSlot(parse_word(operand(i - 1, token)?)?)
                }
                "offset" => {
                    i += 1;
                    Op::Offset(parse_word(operand(i - 1, token)?)?)
                }
                "follow" => Op::Follow,
                "read" => {
                    // the count is optional
                    match tokens.get(i + 1).and_then(|t| t.parse::<u8>().ok()) {
                        Some(count) => {
                            i += 1;
                            if count == 0 {
                                return Err(EspError::Encoding("read count must be at least 1".into()));
                            }
                            Op::Read(count)
                        }
                        None => Op::Read(1),
                    }
                }
                "readbytes" => Op::ReadBytes,
                "eval" => {
                    if tokens.get(i + 1) == Some(&"acquire") {
                        i += 1;
                        Op::Eval { acquire: true }
                    } else {
                        Op::Eval { acquire: false }
                    }
                }
                "output" => {
                    i += 1;
                    Op::SetOutput(parse_small::<u8>(operand(i - 1, token)?, "output index")?)
                }
                other => {
                    return Err(EspError::Encoding(format!("unknown op '{}'", other)));
                }
            };
            ops.push(op);
            i += 1;
        }

        Ok(Program { ops })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_demo_programs() {
        let program: Program = "slot 4 follow offset 1 read".parse().unwrap();
        assert_eq!(program, Program::new().set_slot(4).follow().offset(1).read());

        let program: Program = "slot 0 follow read".parse().unwrap();
        assert_eq!(program, Program::new().set_slot(0).follow().read());
    }

    #[test]
    fn test_display_parses_back() {
        let program = Program::new()
            .push_u64(1)
            .push_uint(U256::MAX)
            .push_bytes(alloc::vec![0xde, 0xad])
            .target()
            .set_slot(2)
            .follow()
            .read_slots(2)
            .read_bytes()
            .eval(true)
            .eval(false)
            .set_output(0);

        let text = program.to_string();
        assert_eq!(text.parse::<Program>().unwrap(), program);
    }

    #[test]
    fn test_display_format() {
        let program = Program::new().set_slot(1).follow().read().eval(true).set_output(0);
        assert_eq!(program.to_string(), "slot 1 follow read eval acquire output 0");
    }

    #[test]
    fn test_parse_errors() {
        assert!("jump 4".parse::<Program>().is_err());
        assert!("slot".parse::<Program>().is_err());
        assert!("slot nope".parse::<Program>().is_err());
        assert!("output 300".parse::<Program>().is_err());
        assert!("read 0".parse::<Program>().is_err());
        assert!("bytes 0xzz".parse::<Program>().is_err());
    }

    #[test]
    fn test_parse_hex_words() {
        let program: Program = "push 0xff slot 0x10".parse().unwrap();
        assert_eq!(program.ops[0], Op::PushWord(U256::from(255u64)));
        assert_eq!(program.ops[1], Op::SetSlot(U256::from(16u64)));
    }
}
