//! Binary deserialization of prototypes (component L, "undump" side).

use crate::constant::Constant;
use crate::error::{BytecodeError, BytecodeResult};
use crate::header::{Endianness, Header};
use crate::instruction::Instruction;
use crate::prototype::{DebugInfo, LocalVarInfo, Prototype, UpvalDesc, UpvalSource};
use std::sync::Arc;

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> BytecodeResult<&'a [u8]> {
        let end = self.pos + n;
        let slice = self.bytes.get(self.pos..end).ok_or(BytecodeError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> BytecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn int(&mut self) -> BytecodeResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_ne_bytes(b.try_into().unwrap()))
    }

    fn size(&mut self) -> BytecodeResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_ne_bytes(b.try_into().unwrap()))
    }

    fn f64(&mut self) -> BytecodeResult<f64> {
        let b = self.take(8)?;
        Ok(f64::from_ne_bytes(b.try_into().unwrap()))
    }

    fn instruction(&mut self) -> BytecodeResult<Instruction> {
        let b = self.take(4)?;
        Ok(Instruction(u32::from_ne_bytes(b.try_into().unwrap())))
    }

    fn string(&mut self) -> BytecodeResult<Option<Vec<u8>>> {
        let len = self.size()?;
        if len == 0 {
            return Ok(None);
        }
        let total = (len - 1) as usize;
        let bytes = self.take(total)?.to_vec();
        self.take(1)?; // terminator
        Ok(Some(bytes))
    }
}

fn read_header(r: &mut Reader) -> BytecodeResult<Header> {
    let magic = r.take(4)?;
    if magic != crate::header::MAGIC {
        return Err(BytecodeError::BadMagic);
    }
    let version_major = r.u8()?;
    let version_minor = r.u8()?;
    let format = r.u8()?;
    let endianness = match r.u8()? {
        0 => Endianness::Big,
        1 => Endianness::Little,
        _ => return Err(BytecodeError::IncompatibleHeader),
    };
    let size_of_int = r.u8()?;
    let size_of_size_t = r.u8()?;
    let size_of_instruction = r.u8()?;
    let size_of_number = r.u8()?;
    let integral_number = r.u8()? != 0;
    let h = Header {
        version_major,
        version_minor,
        format,
        endianness,
        size_of_int,
        size_of_size_t,
        size_of_instruction,
        size_of_number,
        integral_number,
    };
    if h.version_major != Header::native().version_major {
        return Err(BytecodeError::VersionMismatch {
            major: h.version_major,
            minor: h.version_minor,
            native_major: Header::native().version_major,
            native_minor: Header::native().version_minor,
        });
    }
    if !h.matches_native() {
        return Err(BytecodeError::IncompatibleHeader);
    }
    Ok(h)
}

fn read_constant(r: &mut Reader) -> BytecodeResult<Constant> {
    let tag = r.u8()?;
    match tag {
        0 => Ok(Constant::Nil),
        1 => Ok(Constant::Bool(r.u8()? != 0)),
        2 => Ok(Constant::Number(r.f64()?)),
        3 => Ok(Constant::Str(r.string()?.unwrap_or_default())),
        other => Err(BytecodeError::BadConstantTag(other)),
    }
}

fn read_function(r: &mut Reader) -> BytecodeResult<Arc<Prototype>> {
    let source_name = r
        .string()?
        .map(|b| String::from_utf8_lossy(&b).into_owned());
    let line_defined = r.int()? as u32;
    let last_line_defined = r.int()? as u32;
    let nups = r.u8()?;
    let num_params = r.u8()?;
    let is_vararg = r.u8()? != 0;
    let max_stack_size = r.u8()?;

    let size_code = r.int()?;
    let mut code = Vec::with_capacity(size_code.max(0) as usize);
    for _ in 0..size_code {
        code.push(r.instruction()?);
    }

    let size_k = r.int()?;
    let mut constants = Vec::with_capacity(size_k.max(0) as usize);
    for _ in 0..size_k {
        constants.push(read_constant(r)?);
    }

    let size_p = r.int()?;
    let mut prototypes = Vec::with_capacity(size_p.max(0) as usize);
    for _ in 0..size_p {
        prototypes.push(read_function(r)?);
    }

    let n_lines = r.int()?;
    let mut lines = Vec::with_capacity(n_lines.max(0) as usize);
    for _ in 0..n_lines {
        lines.push(r.int()? as u32);
    }

    let n_locals = r.int()?;
    let mut locals = Vec::with_capacity(n_locals.max(0) as usize);
    for _ in 0..n_locals {
        let name = r
            .string()?
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default();
        let start_pc = r.int()? as u32;
        let end_pc = r.int()? as u32;
        locals.push(LocalVarInfo {
            name,
            start_pc,
            end_pc,
        });
    }

    let n_upval_names = r.int()?;
    let mut upvalue_names = Vec::with_capacity(n_upval_names.max(0) as usize);
    for _ in 0..n_upval_names {
        upvalue_names.push(
            r.string()?
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default(),
        );
    }

    let debug = if n_lines == 0 && n_locals == 0 && n_upval_names == 0 {
        None
    } else {
        Some(DebugInfo {
            lines,
            locals,
            upvalue_names,
        })
    };

    let mut upvalues = Vec::with_capacity(nups as usize);
    for _ in 0..nups {
        let kind = r.u8()?;
        let idx = r.u8()?;
        let source = if kind == 0 {
            UpvalSource::Local(idx)
        } else {
            UpvalSource::Upval(idx)
        };
        let name = debug
            .as_ref()
            .and_then(|d| d.upvalue_names.get(upvalues.len()).cloned())
            .unwrap_or_default();
        upvalues.push(UpvalDesc { name, source });
    }

    Ok(Arc::new(Prototype {
        source_name,
        line_defined,
        last_line_defined,
        num_params,
        is_vararg,
        max_stack_size,
        code,
        constants,
        prototypes,
        upvalues,
        debug,
    }))
}

/// Parses a precompiled module, yielding its root prototype.
pub fn undump(bytes: &[u8]) -> BytecodeResult<Arc<Prototype>> {
    let mut r = Reader::new(bytes);
    read_header(&mut r)?;
    read_function(&mut r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::dump;
    use crate::opcode::OpCode;

    #[test]
    fn round_trips_a_prototype_without_upvalues() {
        let proto = Prototype {
            source_name: Some("chunk".into()),
            line_defined: 1,
            last_line_defined: 1,
            num_params: 2,
            is_vararg: false,
            max_stack_size: 4,
            code: vec![
                Instruction::abc(OpCode::Add, 2, 0, 1),
                Instruction::abc(OpCode::Return, 2, 2, 0),
            ],
            constants: vec![Constant::Number(3.5), Constant::Str(b"hi".to_vec())],
            prototypes: vec![],
            upvalues: vec![],
            debug: None,
        };
        let bytes = dump(&proto, false);
        let loaded = undump(&bytes).unwrap();
        assert_eq!(loaded.code.len(), 2);
        assert_eq!(loaded.constants, proto.constants);
        assert_eq!(loaded.source_name.as_deref(), Some("chunk"));
    }

    #[test]
    fn rejects_bad_magic() {
        let err = undump(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, BytecodeError::BadMagic));
    }
}
