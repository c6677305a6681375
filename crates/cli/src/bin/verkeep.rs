use anyhow::Result;

fn main() -> Result<()> {
    verkeep_cli::main_entry()
}
