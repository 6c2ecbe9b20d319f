use std::path::{Path, PathBuf};

/// Prefix marking a file that is still being transferred
const WORKING_PREFIX: char = '.';

/// Extension used for fanart and thumbnail images
const IMAGE_EXTENSION: &str = "jpg";

/// Map a file path as reported by the server to a path below `root`
///
/// The remote path is mirrored under the destination root. Both `/` and `\`
/// separate components, drive prefixes are dropped and `..` never climbs
/// above `root`. Returns `None` when nothing of the remote path is left to
/// name a file.
pub fn local_path(root: &Path, remote_file: &str) -> Option<PathBuf> {
    let mut components: Vec<&str> = Vec::new();

    for (index, component) in remote_file.split(['/', '\\']).enumerate() {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            drive if index == 0 && drive.ends_with(':') => {}
            name => components.push(name),
        }
    }

    if components.is_empty() {
        return None;
    }

    Some(
        components
            .into_iter()
            .fold(root.to_path_buf(), |path, name| path.join(name)),
    )
}

/// Split a local path into its directory and file name
pub fn split_path(path: &Path) -> (PathBuf, String) {
    let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    (directory, file_name)
}

/// Name of the in-progress file for `file_name`
pub fn working_name(file_name: &str) -> String {
    format!("{WORKING_PREFIX}{file_name}")
}

/// File name without its last extension
pub fn file_stem(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(pos) if pos > 0 => &file_name[..pos],
        _ => file_name,
    }
}

/// Subtitle file next to the media file, e.g. `movie.en.srt`
pub fn subtitle_file_name(primary: &str, language_code: &str, codec: &str) -> String {
    format!("{}.{}.{}", file_stem(primary), language_code, codec)
}

/// Fanart image next to the media file, e.g. `movie-fanart.jpg`
pub fn fanart_file_name(primary: &str) -> String {
    format!("{}-fanart.{IMAGE_EXTENSION}", file_stem(primary))
}

/// Thumbnail image next to the media file, e.g. `movie.jpg`
pub fn thumb_file_name(primary: &str) -> String {
    format!("{}.{IMAGE_EXTENSION}", file_stem(primary))
}
