use super::super::args::*;
use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Build(args) => super::build::run(args).await,
        Command::Verify(args) => super::verify::run(args),
        Command::Cert(args) => Ok(super::cert::cmd_cert(args)),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}
