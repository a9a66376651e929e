use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use miette::{miette, Context, IntoDiagnostic, Result};
use rage_rpf::{RpfArchive, RpfOptions};

pub mod extract;
pub mod insert;
pub mod list;

#[derive(clap::Subcommand)]
pub enum RpfCommands {
    /// List every entry of an RPF archive, nested archives included
    List(list::ListArgs),
    /// Extract an RPF archive into a directory
    Extract(extract::ExtractArgs),
    /// Insert a directory into an existing RPF archive
    Insert(insert::InsertArgs),
}

impl RpfCommands {
    pub fn handle(&self) -> Result<()> {
        match self {
            RpfCommands::List(list) => list.handle(),
            RpfCommands::Extract(extract) => extract.handle(),
            RpfCommands::Insert(insert) => insert.handle(),
        }
    }
}

/// Options shared by every command that opens an archive
#[derive(Args)]
pub struct ArchiveArgs {
    /// An input RPF file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A file holding the 32 byte AES key
    #[arg(long, value_name = "FILE")]
    aes_key: Option<PathBuf>,

    /// Don't open archives nested in the input
    #[arg(long, default_value_t = false)]
    no_nested: bool,
}

impl ArchiveArgs {
    fn options(&self) -> Result<RpfOptions> {
        let builder = RpfOptions::builder().scan_children(!self.no_nested);
        match &self.aes_key {
            Some(path) => {
                let key = std::fs::read(path)
                    .into_diagnostic()
                    .context(format!("reading {}", path.display()))?;
                let crypto = rage_rpf::AesCrypto::new(&key)?;
                Ok(builder.crypto(Arc::new(crypto)).build())
            }
            None => Ok(builder.build()),
        }
    }

    fn name(&self) -> Result<String> {
        self.file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or(miette!("{} has no file name", self.file.display()))
    }

    /// Open the archive read only
    pub fn open(&self) -> Result<RpfArchive<File>> {
        let file = File::open(&self.file)
            .into_diagnostic()
            .context(format!("path: {}", self.file.display()))?;
        Ok(RpfArchive::new(file, &self.name()?, self.options()?)?)
    }

    /// Open the archive for editing
    pub fn open_mut(&self) -> Result<RpfArchive<File>> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(&self.file)
            .into_diagnostic()
            .context(format!("path: {}", self.file.display()))?;
        Ok(RpfArchive::new(file, &self.name()?, self.options()?)?)
    }
}

/// Join an archive path onto `root`, dropping anything that would escape it
fn output_path(root: &Path, archive_path: &str) -> PathBuf {
    archive_path
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use super::output_path;

    #[test]
    fn output_stays_below_root() {
        let root = Path::new("out");
        assert_eq!(
            output_path(root, "update.rpf/x64/../../etc/passwd"),
            Path::new("out/update.rpf/x64/etc/passwd")
        );
        assert_eq!(output_path(root, "a.rpf\\b.txt"), Path::new("out/a.rpf/b.txt"));
    }
}
