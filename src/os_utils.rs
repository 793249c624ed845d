//! Utilities pertaining to filesystem and other os-level settings
//!

use camino::Utf8Path;

/// Create a novel directory path if it does not exist already
///
/// If the directory already exists no operations are performed
///
/// * `label` - used to describe the error directory in an error message
///
pub fn create_dir_all(dir: &Utf8Path, label: &str) {
    if !dir.is_dir() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            panic!("Can't create new {label} directory at '{dir}': {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_existing_dir() {
        // An existing directory is left as is
        create_dir_all(Utf8Path::new("src"), "test");
        assert!(Utf8Path::new("src").is_dir());
    }
}
