pub mod rpf;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Handle RPF archives
    Rpf {
        #[command(subcommand)]
        command: rpf::RpfCommands,
    },
}

impl Commands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            Commands::Rpf { command } => command.handle(),
        }
    }
}
