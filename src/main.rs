//! Sable entry point: build the UCI handler and hand it the terminal.

use sable::uci::UciHandler;

fn main() -> anyhow::Result<()> {
    let mut handler = UciHandler::new()?;
    handler.run();
    Ok(())
}
