//! Binary serialization of prototypes (component L, "dump" side).

use crate::constant::Constant;
use crate::header::Header;
use crate::prototype::{Prototype, UpvalSource};

const TAG_NIL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_STRING: u8 = 3;

/// Serializes a root prototype into the on-disk module format.
///
/// `strip` omits all debug info (line numbers, local-variable records,
/// upvalue names) the way `emberc compile --strip` does.
pub fn dump(root: &Prototype, strip: bool) -> Vec<u8> {
    let mut out = Vec::new();
    write_header(&mut out);
    write_function(&mut out, root, strip);
    out
}

fn write_header(out: &mut Vec<u8>) {
    let h = Header::native();
    out.extend_from_slice(&crate::header::MAGIC);
    out.push(h.version_major);
    out.push(h.version_minor);
    out.push(h.format);
    out.push(match h.endianness {
        crate::header::Endianness::Big => 0,
        crate::header::Endianness::Little => 1,
    });
    out.push(h.size_of_int);
    out.push(h.size_of_size_t);
    out.push(h.size_of_instruction);
    out.push(h.size_of_number);
    out.push(h.integral_number as u8);
}

fn write_int(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_ne_bytes());
}

fn write_size(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_ne_bytes());
}

fn write_string(out: &mut Vec<u8>, s: Option<&[u8]>) {
    match s {
        None => write_size(out, 0),
        Some(bytes) => {
            write_size(out, bytes.len() as u64 + 1);
            out.extend_from_slice(bytes);
            out.push(0);
        }
    }
}

fn write_function(out: &mut Vec<u8>, proto: &Prototype, strip: bool) {
    write_string(out, proto.source_name.as_deref().map(str::as_bytes));
    write_int(out, proto.line_defined as i32);
    write_int(out, proto.last_line_defined as i32);
    out.push(proto.upvalues.len() as u8);
    out.push(proto.num_params);
    out.push(proto.is_vararg as u8);
    out.push(proto.max_stack_size);

    write_int(out, proto.code.len() as i32);
    for inst in &proto.code {
        out.extend_from_slice(&inst.0.to_ne_bytes());
    }

    write_int(out, proto.constants.len() as i32);
    for k in &proto.constants {
        write_constant(out, k);
    }

    write_int(out, proto.prototypes.len() as i32);
    for p in &proto.prototypes {
        write_function(out, p, strip);
    }

    if strip {
        write_int(out, 0);
        write_int(out, 0);
        write_int(out, 0);
    } else {
        match &proto.debug {
            Some(debug) => {
                write_int(out, debug.lines.len() as i32);
                for line in &debug.lines {
                    write_int(out, *line as i32);
                }
                write_int(out, debug.locals.len() as i32);
                for local in &debug.locals {
                    write_string(out, Some(local.name.as_bytes()));
                    write_int(out, local.start_pc as i32);
                    write_int(out, local.end_pc as i32);
                }
                write_int(out, debug.upvalue_names.len() as i32);
                for name in &debug.upvalue_names {
                    write_string(out, Some(name.as_bytes()));
                }
            }
            None => {
                write_int(out, 0);
                write_int(out, 0);
                write_int(out, 0);
            }
        }
    }

    for uv in &proto.upvalues {
        let (kind, idx) = match uv.source {
            UpvalSource::Local(i) => (0u8, i),
            UpvalSource::Upval(i) => (1u8, i),
        };
        out.push(kind);
        out.push(idx);
    }
}

fn write_constant(out: &mut Vec<u8>, k: &Constant) {
    match k {
        Constant::Nil => out.push(TAG_NIL),
        Constant::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(*b as u8);
        }
        Constant::Number(n) => {
            out.push(TAG_NUMBER);
            out.extend_from_slice(&n.to_ne_bytes());
        }
        Constant::Str(s) => {
            out.push(TAG_STRING);
            write_string(out, Some(s));
        }
    }
}

pub(crate) const _TAGS: [u8; 4] = [TAG_NIL, TAG_BOOL, TAG_NUMBER, TAG_STRING];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use crate::opcode::OpCode;

    #[test]
    fn dumps_trivial_prototype() {
        let proto = Prototype {
            source_name: Some("chunk".into()),
            line_defined: 0,
            last_line_defined: 0,
            num_params: 0,
            is_vararg: false,
            max_stack_size: 2,
            code: vec![Instruction::abc(OpCode::Return, 0, 1, 0)],
            constants: vec![Constant::Number(1.0)],
            prototypes: vec![],
            upvalues: vec![],
            debug: None,
        };
        let bytes = dump(&proto, false);
        assert!(bytes.len() > crate::header::Header::native().size_of_instruction as usize);
        assert_eq!(&bytes[0..4], &crate::header::MAGIC);
    }
}
