//! `emberc disasm` — print disassembly only, no execution (spec §6.3).

pub fn execute(file: String) -> anyhow::Result<()> {
    let (name, bytes) = super::read_input(Some(&file))?;
    let root = super::run::load(&name, bytes)?;
    print!("{}", ember_bytecode::disassemble(&root));
    Ok(())
}
