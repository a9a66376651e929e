use std::path::PathBuf;

use clap::Args;
use miette::{miette, Context, IntoDiagnostic, Result};
use rage_rpf::{ContainerId, EntryId, RpfArchive};
use tracing::info;
use walkdir::WalkDir;

use super::ArchiveArgs;

#[derive(Args)]
pub struct InsertArgs {
    #[command(flatten)]
    archive: ArchiveArgs,

    /// An input directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Directory (or nested archive) inside the archive to insert into
    #[arg(long, value_name = "PATH")]
    into: Option<String>,
}

/// Resolve the directory to insert into, stepping inside a nested archive
fn target<S>(rpf: &RpfArchive<S>, into: Option<&str>) -> Result<(ContainerId, EntryId)> {
    let Some(path) = into else {
        return Ok((ContainerId::ROOT, rpf.root().root()));
    };

    let (container, entry) = rpf
        .find_entry(path)
        .ok_or(miette!("unable to find {path} in the archive"))?;
    if let Some(child) = rpf.child_for(container, entry) {
        return Ok((child, rpf.container(child)?.root()));
    }
    match rpf.container(container)?.entry(entry) {
        Some(e) if e.is_directory() => Ok((container, entry)),
        _ => Err(miette!("{path} is not a directory")),
    }
}

impl InsertArgs {
    pub fn handle(&self) -> Result<()> {
        let mut rpf = self.archive.open_mut()?;
        let (container, base) = target(&rpf, self.into.as_deref())?;

        let files = WalkDir::new(&self.directory)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_type().is_dir())
            .collect::<Vec<_>>();

        if files.is_empty() {
            return Err(miette!("directory is empty"));
        }

        for file in files {
            let name = file
                .path()
                .strip_prefix(&self.directory)
                .into_diagnostic()?;
            let parts = name
                .iter()
                .map(|part| {
                    part.to_str()
                        .ok_or(miette!("unable to convert {} to a string", name.display()))
                })
                .collect::<Result<Vec<_>>>()?;
            let Some((file_name, dirs)) = parts.split_last() else {
                continue;
            };

            let mut dir = base;
            for part in dirs {
                dir = match rpf.container(container)?.find_child(dir, part) {
                    Some(existing) => existing,
                    None => rpf.create_directory(container, dir, part)?,
                };
            }

            let data = std::fs::read(file.path())
                .into_diagnostic()
                .context(format!("opening {}", file.path().display()))?;

            match rpf.container(container)?.find_child(dir, file_name) {
                Some(existing) => {
                    info!("replacing {}", name.display());
                    rpf.replace_file(container, existing, &data)
                }
                None => {
                    info!("inserting {}", name.display());
                    rpf.create_file(container, dir, file_name, &data).map(|_| ())
                }
            }
            .context(format!("inserting {}", name.display()))?;
        }

        Ok(())
    }
}
