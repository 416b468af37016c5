///
/// Version and build identification.
///
/// The commit id and build timestamp are taken from the build environment
/// (`COTHREAD_COMMIT_ID`, `COTHREAD_BUILD_TIMESTAMP`) and fall back to
/// "unknown" when not provided.
///

use std::sync::OnceLock;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const COMMIT_ID: &str = match option_env!("COTHREAD_COMMIT_ID") {
    Some(id) => id,
    None => "unknown",
};

pub const BUILD_TIMESTAMP: &str = match option_env!("COTHREAD_BUILD_TIMESTAMP") {
    Some(ts) => ts,
    None => "unknown",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionSelector {
    #[default]
    Short,
    Banner,
    CommitId,
}

impl VersionSelector {
    /// Decode the two-byte selector used by the C ABI: `[1, 1]` asks for the
    /// banner, `[1, 2]` for the commit id, anything else for the version.
    pub fn from_code(code: &[u8]) -> Self {
        match code {
            [1, 1, ..] => VersionSelector::Banner,
            [1, 2, ..] => VersionSelector::CommitId,
            _ => VersionSelector::Short,
        }
    }
}

fn banner() -> &'static str {
    static BANNER: OnceLock<String> = OnceLock::new();
    BANNER.get_or_init(|| {
        format!(
            "\n\nThis is cothread {} - Cooperative threads on native threads\n\
             Licensed under the MIT license\n\n({} {})\n\n",
            VERSION, COMMIT_ID, BUILD_TIMESTAMP
        )
    })
}

pub fn version(selector: VersionSelector) -> &'static str {
    match selector {
        VersionSelector::Short => VERSION,
        VersionSelector::Banner => banner(),
        VersionSelector::CommitId => COMMIT_ID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors() {
        assert_eq!(VersionSelector::from_code(&[]), VersionSelector::Short);
        assert_eq!(VersionSelector::from_code(&[1, 1]), VersionSelector::Banner);
        assert_eq!(VersionSelector::from_code(&[1, 2, 0]), VersionSelector::CommitId);
        assert_eq!(VersionSelector::from_code(&[1, 3]), VersionSelector::Short);
        assert_eq!(VersionSelector::from_code(&[2, 1]), VersionSelector::Short);
    }

    #[test]
    fn test_version_strings() {
        assert_eq!(version(VersionSelector::Short), env!("CARGO_PKG_VERSION"));
        assert_eq!(version(VersionSelector::CommitId), COMMIT_ID);

        let banner = version(VersionSelector::Banner);
        assert!(banner.contains("This is cothread"));
        assert!(banner.contains(VERSION));
        assert!(banner.contains(COMMIT_ID));
    }
}
