use std::io::{self, Write};

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use tar::{Builder, Header};

const OWNER: &str = "bale";

pub(crate) fn deterministic_tar<W: Write>(writer: W) -> Builder<W> {
    let mut tar = Builder::new(writer);
    tar.mode(tar::HeaderMode::Deterministic);
    tar
}

pub(crate) fn deterministic_tar_gz<W: Write>(writer: W) -> Builder<GzEncoder<W>> {
    let encoder = GzBuilder::new()
        .mtime(0)
        .operating_system(255)
        .write(writer, Compression::best());
    deterministic_tar(encoder)
}

pub(crate) fn append_entry<W: Write>(
    tar: &mut Builder<W>,
    path: &str,
    mode: u32,
    data: &[u8],
) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_username(OWNER)?;
    header.set_groupname(OWNER)?;

    // Handles paths longer than the 100-byte header field.
    tar.append_data(&mut header, path, data)
}
