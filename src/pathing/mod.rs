use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Resolves the append-only datapoint file for a channel.
///
/// The channel name is digested and fanned out over two directory levels so
/// no single directory accumulates every metric:
/// `root/<aa>/<bb>/<full-digest>`.
pub fn datafile_path(root: &Path, channel: &str) -> PathBuf {
    let digest = channel_digest(channel);
    root.join(&digest[0..2]).join(&digest[2..4]).join(digest)
}

fn channel_digest(channel: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(channel.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(64);
    for byte in digest.iter() {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}
