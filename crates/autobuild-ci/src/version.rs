//! Version strings and branch-name helpers.

/// Branch name without its `<remote>/` prefix: `origin/release-2.0.1` → `release-2.0.1`.
pub fn local_branch(branch: &str) -> &str {
    branch.split_once('/').map_or(branch, |(_, local)| local)
}

/// Release number of a branch: the text after the last `-` of the local name,
/// or the whole local name when it has no `-`.
pub fn release_number(branch: &str) -> &str {
    let local = local_branch(branch);
    local.rsplit_once('-').map_or(local, |(_, number)| number)
}

/// Version string for building `branch` at `commit`.
///
/// The release number is cut to `max_len` characters (installer volume names
/// have a hard length limit), then joined to the short hash with `_`.
pub fn derive_version(branch: &str, commit: &str, max_len: usize) -> String {
    let number: String = release_number(branch).chars().take(max_len).collect();
    format!("{number}_{commit}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_branch_strips_remote() {
        assert_eq!(local_branch("origin/release-2.0.1"), "release-2.0.1");
        assert_eq!(local_branch("origin/feature/x"), "feature/x");
        assert_eq!(local_branch("master"), "master");
    }

    #[test]
    fn release_number_takes_last_dash_segment() {
        assert_eq!(release_number("origin/release-2.0.1"), "2.0.1");
        assert_eq!(release_number("origin/master"), "master");
        assert_eq!(release_number("origin/hot-fix-3.1.0"), "3.1.0");
    }

    #[test]
    fn long_release_number_truncated_to_eleven() {
        let version = derive_version("origin/release-3.4.5678901234", "abc1234", 11);
        assert_eq!(version, "3.4.5678901_abc1234");
        assert_eq!(version.split('_').next().unwrap().len(), 11);
    }

    #[test]
    fn truncation_boundary() {
        // exactly 11 characters: untouched
        assert_eq!(
            derive_version("origin/release-1.23.456789", "abc1234", 11),
            "1.23.456789_abc1234"
        );
        // 12 characters: last one dropped
        assert_eq!(
            derive_version("origin/release-1.23.4567890", "abc1234", 11),
            "1.23.456789_abc1234"
        );
    }

    #[test]
    fn default_branches_use_their_name() {
        assert_eq!(derive_version("origin/devel", "0f0f0f0", 11), "devel_0f0f0f0");
    }
}
