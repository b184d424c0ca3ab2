use anyhow::Result;
use clap::Parser;
use tpn::{CLIArguments, run_main, show_main};

fn main() -> Result<()> {
    let args = CLIArguments::parse();

    match args {
        CLIArguments::Run(args) => run_main(args),
        CLIArguments::Show(args) => show_main(args),
    }
}
