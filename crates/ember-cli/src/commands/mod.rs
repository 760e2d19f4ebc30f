pub mod compile;
pub mod disasm;
pub mod run;

/// Reads `path`, or standard input when `path` is `None` or `"-"` (spec
/// §6.3, "read from standard input when no file is given").
pub fn read_input(path: Option<&str>) -> anyhow::Result<(String, Vec<u8>)> {
    use std::io::Read;
    match path {
        None | Some("-") => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(("stdin".to_string(), buf))
        }
        Some(p) => {
            let bytes = std::fs::read(p)
                .map_err(|e| anyhow::anyhow!("cannot read '{p}': {e}"))?;
            Ok((p.to_string(), bytes))
        }
    }
}
