use clap::Args;
use miette::Result;
use owo_colors::OwoColorize;
use rage_rpf::EntryKind;
use tracing::info;

use super::ArchiveArgs;

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    archive: ArchiveArgs,

    /// Only list files
    #[arg(long, default_value_t = false)]
    files_only: bool,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let rpf = self.archive.open()?;

        for id in rpf.containers() {
            let container = rpf.container(id)?;
            for (_, entry) in container.entries() {
                let size = entry.effective_size().unwrap_or(0);
                match &entry.kind {
                    EntryKind::Directory(_) if self.files_only => {}
                    EntryKind::Directory(_) => println!("{} {}/", "dir ".blue(), entry.path),
                    EntryKind::BinaryFile(_) if entry.is_archive() => {
                        println!("{} {} {}", "rpf ".yellow(), entry.path, size.dimmed())
                    }
                    EntryKind::BinaryFile(_) => println!("bin  {} {}", entry.path, size.dimmed()),
                    EntryKind::ResourceFile(resource) => println!(
                        "{} {} {} (v{})",
                        "rsc ".green(),
                        entry.path,
                        size.dimmed(),
                        resource.version()
                    ),
                }
            }

            if let Some(error) = container.last_error() {
                info!("{}: {}", container.path(), error.red());
            }
        }

        let totals = rpf.root().totals();
        info!(
            archives = totals.archives,
            folders = totals.folders,
            resources = totals.resources,
            binaries = totals.binaries,
            "listed {} files",
            totals.files
        );
        Ok(())
    }
}
