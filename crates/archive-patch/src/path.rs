//! Entry name utilities
//!
//! Archives and patch stores key entries by a normalized name so that the
//! same logical file is found regardless of how a tool spelled its path:
//!
//! - Backslashes become forward slashes
//! - ASCII letters are lowercased
//! - Leading separators are stripped
//!
//! The folder grouping of an entry is everything before its last separator;
//! entries at the archive root live in the folder `""`.

/// Normalize an entry name for storage and lookup
///
/// # Examples
///
/// ```
/// use archive_patch::path::normalize_entry_name;
///
/// assert_eq!(normalize_entry_name("Meshes\\Armor\\Helm.NIF"), "meshes/armor/helm.nif");
/// assert_eq!(normalize_entry_name("/textures/sky.dds"), "textures/sky.dds");
/// ```
pub fn normalize_entry_name(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| if c == '\\' { '/' } else { c.to_ascii_lowercase() })
        .collect();
    normalized.trim_start_matches('/').to_string()
}

/// Split a normalized entry name into its folder and file parts
///
/// # Examples
///
/// ```
/// use archive_patch::path::split_entry_name;
///
/// assert_eq!(split_entry_name("meshes/armor/helm.nif"), ("meshes/armor", "helm.nif"));
/// assert_eq!(split_entry_name("readme.txt"), ("", "readme.txt"));
/// ```
pub fn split_entry_name(name: &str) -> (&str, &str) {
    name.rsplit_once('/').unwrap_or(("", name))
}

/// Join a folder and a file name into a full entry name
pub fn join_entry_name(folder: &str, file: &str) -> String {
    if folder.is_empty() {
        file.to_string()
    } else {
        format!("{folder}/{file}")
    }
}

/// Lowercased extension of an entry name, without the dot
pub fn entry_extension(name: &str) -> Option<&str> {
    let (_, file) = split_entry_name(name);
    file.rsplit_once('.').map(|(_, ext)| ext)
}
