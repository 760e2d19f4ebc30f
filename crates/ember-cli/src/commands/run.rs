//! `emberc run` — load a source or precompiled file and execute it (spec
//! §6.3, §4.6 "this is the entry point `ember-cli`'s `run` subcommand
//! uses").

use ember_bytecode::prototype::Prototype;
use ember_core::Vm;
use std::sync::Arc;

/// Loads `bytes` as either a precompiled module (magic-tagged) or
/// EmberScript source text, yielding the root prototype either way.
pub fn load(name: &str, bytes: Vec<u8>) -> anyhow::Result<Arc<Prototype>> {
    if bytes.starts_with(&ember_bytecode::header::MAGIC) {
        return ember_bytecode::undump::undump(&bytes)
            .map_err(|e| anyhow::anyhow!("{name}: {e}"));
    }
    let source = String::from_utf8(bytes).map_err(|e| anyhow::anyhow!("{name}: {e}"))?;
    Ok(Arc::new(super::compile::compile_source(name, &source)?))
}

pub fn execute(file: String, dump: bool) -> anyhow::Result<()> {
    let (name, bytes) = super::read_input(Some(&file))?;
    let root = load(&name, bytes)?;

    if dump {
        print!("{}", ember_bytecode::disassemble(&root));
    }

    let mut vm = Vm::new();
    let closure = vm.wrap_prototype(root);
    let results = vm
        .call_main(closure, Vec::new())
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    for (i, v) in results.iter().enumerate() {
        if i > 0 {
            print!("\t");
        }
        print!("{v}");
    }
    if !results.is_empty() {
        println!();
    }
    Ok(())
}
