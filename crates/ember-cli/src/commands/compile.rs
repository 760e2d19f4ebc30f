//! `emberc compile` — the code-generator CLI surface (spec §6.3).

use crate::frontend;
use ember_bytecode::prototype::Prototype;
use ember_bytecode::{Instruction, OpCode};
use std::sync::Arc;

/// Parses and compiles one input, yielding its root prototype.
pub fn compile_source(name: &str, source: &str) -> anyhow::Result<Prototype> {
    let block = frontend::parse(source).map_err(|e| anyhow::anyhow!("{name}:{e}"))?;
    ember_compiler::compile(&block, Some(name.to_string()))
        .map_err(|e| anyhow::anyhow!("{name}: {e}"))
}

/// Compiles every input and, when there is more than one, concatenates
/// them by synthesizing a wrapper prototype that calls each in turn and
/// discards its results (spec §6.3, "with multiple input files,
/// concatenate by synthesizing a wrapper prototype").
pub fn compile_all(inputs: &[(String, String)]) -> anyhow::Result<Prototype> {
    let mut protos = Vec::with_capacity(inputs.len());
    for (name, source) in inputs {
        protos.push(Arc::new(compile_source(name, source)?));
    }
    if protos.len() == 1 {
        return Ok(Arc::try_unwrap(protos.pop().unwrap()).unwrap_or_else(|arc| (*arc).clone()));
    }
    Ok(wrap(protos))
}

fn wrap(protos: Vec<Arc<Prototype>>) -> Prototype {
    let mut code = Vec::with_capacity(protos.len() * 2 + 1);
    for (i, _) in protos.iter().enumerate() {
        let reg = i as u32;
        code.push(Instruction::abx(OpCode::Closure, reg, reg));
        code.push(Instruction::abc(OpCode::Call, reg, 1, 1));
    }
    code.push(Instruction::abc(OpCode::Return, 0, 1, 0));
    Prototype {
        source_name: Some("<compile>".to_string()),
        line_defined: 0,
        last_line_defined: 0,
        num_params: 0,
        is_vararg: true,
        max_stack_size: protos.len().max(1) as u8,
        code,
        constants: Vec::new(),
        prototypes: protos,
        upvalues: Vec::new(),
        debug: None,
    }
}

pub fn execute(
    files: Vec<String>,
    output: Option<String>,
    parse_only: bool,
    strip: bool,
    list: u8,
) -> anyhow::Result<()> {
    let inputs = if files.is_empty() {
        let (name, bytes) = super::read_input(None)?;
        vec![(name, String::from_utf8(bytes)?)]
    } else {
        files
            .iter()
            .map(|f| {
                let (name, bytes) = super::read_input(Some(f))?;
                Ok::<_, anyhow::Error>((name, String::from_utf8(bytes)?))
            })
            .collect::<anyhow::Result<Vec<_>>>()?
    };

    let root = compile_all(&inputs)?;

    if list > 0 {
        print!("{}", ember_bytecode::disassemble(&root));
    }

    if parse_only {
        return Ok(());
    }

    let bytes = ember_bytecode::dump::dump(&root, strip);
    let out_path = output.unwrap_or_else(|| "a.ember".to_string());
    std::fs::write(&out_path, bytes)
        .map_err(|e| anyhow::anyhow!("cannot write '{out_path}': {e}"))?;
    Ok(())
}
