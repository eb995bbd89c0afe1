use std::path::{Path, PathBuf};

use log::debug;

pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 2] = ["mp3", "ogg"];

/// Lowercase `.mp3`/`.ogg` only; `.MP3` is not picked up.
pub fn is_supported_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_AUDIO_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Recursively lists supported audio files, as paths relative to `library_root`.
pub fn collect_library_tracks(library_root: &Path) -> Vec<PathBuf> {
    let mut pending_directories = vec![library_root.to_path_buf()];
    let mut tracks = Vec::new();

    while let Some(directory) = pending_directories.pop() {
        let entries = match std::fs::read_dir(&directory) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Failed to read directory {}: {}", directory.display(), err);
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(
                        "Failed to read a directory entry in {}: {}",
                        directory.display(),
                        err
                    );
                    continue;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    debug!("Failed to inspect {}: {}", path.display(), err);
                    continue;
                }
            };

            if file_type.is_dir() {
                pending_directories.push(path);
                continue;
            }

            if file_type.is_file() && is_supported_audio_file(&path) {
                if let Ok(relative) = path.strip_prefix(library_root) {
                    tracks.push(relative.to_path_buf());
                }
            }
        }
    }

    tracks.sort_unstable();
    tracks
}

/// Display title for a file with no catalog entry: the file stem with a
/// leading run of non-letters dropped when whitespace follows it and a word
/// character comes next, so `"03 - Intro.mp3"` becomes `"Intro"`.
///
/// The cut lands on the last word character that is preceded by whitespace
/// and by non-letters only.
pub fn quick_title(filename: &str) -> String {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    strip_leading_track_prefix(&stem).to_string()
}

fn strip_leading_track_prefix(stem: &str) -> &str {
    let mut start = None;
    let mut previous = None;
    for (position, (index, ch)) in stem.char_indices().enumerate() {
        let is_word = ch.is_ascii_alphanumeric() || ch == '_';
        let after_whitespace = previous.is_some_and(|prev: char| prev.is_ascii_whitespace());
        if position >= 2 && is_word && after_whitespace {
            start = Some(index);
        }
        if ch.is_ascii_alphabetic() {
            break;
        }
        previous = Some(ch);
    }
    match start {
        Some(index) => &stem[index..],
        None => stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(test_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock should be after UNIX_EPOCH")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "queuecast_library_{}_{}_{}",
            test_name,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn test_quick_title_strips_track_number_prefix() {
        assert_eq!(quick_title("03 - Intro.mp3"), "Intro");
        assert_eq!(quick_title("album/01. Opening Theme.ogg"), "Opening Theme");
        assert_eq!(quick_title("12 Days.mp3"), "Days");
    }

    #[test]
    fn test_quick_title_keeps_plain_names() {
        assert_eq!(quick_title("Song.ogg"), "Song");
        assert_eq!(quick_title("Song Two.mp3"), "Song Two");
        assert_eq!(quick_title("1999.mp3"), "1999");
        assert_eq!(quick_title("2Pac Track.mp3"), "2Pac Track");
        assert_eq!(quick_title("no_extension"), "no_extension");
    }

    #[test]
    fn test_supported_extensions_match_exact_case() {
        assert!(is_supported_audio_file(Path::new("a.mp3")));
        assert!(is_supported_audio_file(Path::new("a.ogg")));
        assert!(!is_supported_audio_file(Path::new("a.MP3")));
        assert!(!is_supported_audio_file(Path::new("a.Ogg")));
        assert!(!is_supported_audio_file(Path::new("a.flac")));
        assert!(!is_supported_audio_file(Path::new("mp3")));
    }

    #[test]
    fn test_collect_library_tracks_is_recursive_and_relative() {
        let root = unique_temp_dir("scan");
        std::fs::create_dir_all(root.join("artist/album")).expect("dirs should be creatable");
        std::fs::write(root.join("top.mp3"), b"x").expect("fixture");
        std::fs::write(root.join("artist/album/deep.ogg"), b"x").expect("fixture");
        std::fs::write(root.join("artist/cover.jpg"), b"x").expect("fixture");
        std::fs::write(root.join("artist/notes.txt"), b"x").expect("fixture");
        std::fs::write(root.join("artist/LOUD.MP3"), b"x").expect("fixture");

        let tracks = collect_library_tracks(&root);
        assert_eq!(
            tracks,
            vec![
                PathBuf::from("artist/album/deep.ogg"),
                PathBuf::from("top.mp3"),
            ]
        );

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn test_collect_library_tracks_handles_missing_root() {
        let root = unique_temp_dir("missing");
        assert!(collect_library_tracks(&root).is_empty());
    }
}
