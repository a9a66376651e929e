use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use rage_rpf::EntryKind;
use rage_rsc::{compression::deflate, ResourceFrame};
use tracing::{info, warn};

use super::{output_path, ArchiveArgs};

#[derive(Args)]
pub struct ExtractArgs {
    #[command(flatten)]
    archive: ArchiveArgs,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let mut rpf = self.archive.open()?;
        let mut skipped = 0;

        for id in rpf.containers() {
            let files = rpf
                .container(id)?
                .file_entries()
                .filter(|(entry, _)| rpf.child_for(id, *entry).is_none())
                .map(|(entry, file)| (entry, file.path.clone(), file.kind.clone()))
                .collect::<Vec<_>>();

            for (entry, path, kind) in files {
                let Some(data) = rpf.extract_file(id, entry) else {
                    skipped += 1;
                    continue;
                };

                let data = match kind {
                    EntryKind::ResourceFile(resource) => {
                        let frame = ResourceFrame::new(
                            resource.version(),
                            resource.system_flags,
                            resource.graphics_flags,
                        );
                        let mut framed = frame.to_bytes()?;
                        framed.extend(deflate(&data)?);
                        framed
                    }
                    _ => data,
                };

                let p = output_path(&self.directory, &path);
                info!("writing {}", p.display());

                if let Some(parent) = p.parent() {
                    std::fs::create_dir_all(parent)
                        .into_diagnostic()
                        .context(format!("creating {}", parent.display()))?;
                }
                let mut out = if !self.overwrite {
                    File::create_new(&p)
                        .into_diagnostic()
                        .context(format!("creating {}", p.display()))?
                } else {
                    File::create(&p)
                        .into_diagnostic()
                        .context(format!("creating {}", p.display()))?
                };
                out.write_all(&data).into_diagnostic()?;
            }
        }

        if skipped > 0 {
            warn!("skipped {skipped} entries that failed to extract");
        }
        Ok(())
    }
}
