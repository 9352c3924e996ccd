use std::path::{Path, PathBuf};

const HOME_PREFIX: &str = "~";

/// Converts absolute source paths to and from the `~`-relative form stored
/// in data files, so a snapshot stays valid across machines with different
/// home directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCodec {
    home: PathBuf,
}

impl PathCodec {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Absolute path to wire form. Paths outside home stay absolute.
    pub fn encode(&self, path: &Path) -> String {
        if self.home.is_absolute() {
            if let Ok(rest) = path.strip_prefix(&self.home) {
                if rest.as_os_str().is_empty() {
                    return HOME_PREFIX.to_string();
                }
                return format!("{}/{}", HOME_PREFIX, rest.to_string_lossy());
            }
        }
        path.to_string_lossy().into_owned()
    }

    /// Wire form back to an absolute path.
    pub fn decode(&self, value: &str) -> PathBuf {
        if value == HOME_PREFIX {
            return self.home.clone();
        }
        match value.strip_prefix("~/") {
            Some(rest) => self.home.join(rest),
            None => PathBuf::from(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_inside_home() {
        let codec = PathCodec::new("/home/kim");
        assert_eq!(codec.encode(Path::new("/home/kim/dev/app")), "~/dev/app");
        assert_eq!(codec.encode(Path::new("/home/kim")), "~");
    }

    #[test]
    fn test_encode_outside_home_stays_absolute() {
        let codec = PathCodec::new("/home/kim");
        assert_eq!(codec.encode(Path::new("/opt/work")), "/opt/work");
        // a sibling sharing the string prefix is not inside home
        assert_eq!(codec.encode(Path::new("/home/kimberly/x")), "/home/kimberly/x");
    }

    #[test]
    fn test_decode_expands_home() {
        let codec = PathCodec::new("/Users/lee");
        assert_eq!(codec.decode("~/src/site"), PathBuf::from("/Users/lee/src/site"));
        assert_eq!(codec.decode("~"), PathBuf::from("/Users/lee"));
        assert_eq!(codec.decode("/var/data"), PathBuf::from("/var/data"));
    }

    #[test]
    fn test_relative_home_is_never_used_as_prefix() {
        let codec = PathCodec::new("");
        assert_eq!(codec.encode(Path::new("/a/b")), "/a/b");
    }
}
