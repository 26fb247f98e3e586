//! Path classification: package detection and build-type inference.
//!
//! `classify` is a pure function of the path. Segments are examined from the
//! file name back toward the share root and the first segment carrying a
//! marker decides. Within a single segment an explicit `debug` marker beats
//! `release`, so `app-release-debug.apk` is a debug build. Matching is a
//! case-insensitive substring test, so `appRelease.apk` is a release build.

use crate::types::BuildType;

const DEBUG_MARKER: &str = "debug";
const RELEASE_MARKER: &str = "release";

/// Infers the build type of a share-relative path.
pub fn classify(path: &str) -> BuildType {
    path.split(['/', '\\'])
        .rev()
        .filter(|segment| !segment.is_empty())
        .find_map(classify_segment)
        .unwrap_or(BuildType::Unknown)
}

fn classify_segment(segment: &str) -> Option<BuildType> {
    let lowered = segment.to_ascii_lowercase();
    if lowered.contains(DEBUG_MARKER) {
        Some(BuildType::Debug)
    } else if lowered.contains(RELEASE_MARKER) {
        Some(BuildType::Release)
    } else {
        None
    }
}

/// Whether `file_name` carries one of the package `extensions`.
///
/// Extensions are given without the leading dot and compared
/// case-insensitively.
pub fn is_package_file(file_name: &str, extensions: &[String]) -> bool {
    let Some((stem, ext)) = file_name.rsplit_once('.') else {
        return false;
    };
    !stem.is_empty()
        && extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(ext))
}
