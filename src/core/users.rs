//! Host account discovery
//!
//! Finds regular accounts whose home directory can seed the live user.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::defaults::MIN_REGULAR_UID;
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// UID of the `nobody` account, never a regular user
const NOBODY_UID: u32 = 65534;

/// A regular host account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostAccount {
    /// Account name
    pub name: String,
    /// Numeric user id
    pub uid: u32,
    /// Home directory
    pub home: PathBuf,
}

/// Parse `passwd` content into regular accounts, sorted by name
///
/// Malformed lines are skipped.
pub fn parse_passwd(content: &str) -> Vec<HostAccount> {
    let mut accounts: Vec<HostAccount> = content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 6 || fields[0].is_empty() || fields[5].is_empty() {
                return None;
            }
            let uid = fields[2].parse::<u32>().ok()?;
            (uid >= MIN_REGULAR_UID && uid != NOBODY_UID).then(|| HostAccount {
                name: fields[0].to_string(),
                uid,
                home: PathBuf::from(fields[5]),
            })
        })
        .collect();
    accounts.sort_by(|a, b| a.name.cmp(&b.name));
    accounts
}

/// Regular accounts in `passwd` whose home directory exists
pub fn seedable_accounts(passwd: &Path) -> Result<Vec<HostAccount>, FilesystemError> {
    let content = filesystem::read_file(passwd)?;
    Ok(parse_passwd(&content)
        .into_iter()
        .filter(|account| account.home.is_dir())
        .collect())
}

/// Home directory of `name`
///
/// Looks the account up in `passwd` and falls back to `<home_base>/<name>`.
pub fn home_of(passwd: &Path, home_base: &Path, name: &str) -> PathBuf {
    let from_passwd = filesystem::read_file(passwd).ok().and_then(|content| {
        content.lines().find_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            (fields.len() >= 6 && fields[0] == name && !fields[5].is_empty())
                .then(|| PathBuf::from(fields[5]))
        })
    });
    from_passwd.unwrap_or_else(|| home_base.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PASSWD: &str = "root:x:0:0::/root:/bin/bash
bin:x:1:1::/:/usr/bin/nologin
nobody:x:65534:65534:Kernel Overflow User:/:/usr/bin/nologin
zoe:x:1001:1001::/home/zoe:/bin/zsh
alice:x:1000:1000:Alice:/home/alice:/bin/bash
broken line
weird:x:notanumber:1000::/home/weird:/bin/sh
";

    #[test]
    fn test_parse_passwd_keeps_regular_accounts() {
        let accounts = parse_passwd(PASSWD);

        let names: Vec<&str> = accounts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "zoe"]);
        assert_eq!(accounts[0].uid, 1000);
        assert_eq!(accounts[0].home, PathBuf::from("/home/alice"));
    }

    #[test]
    fn test_seedable_accounts_require_existing_home() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("alice");
        fs::create_dir(&home).unwrap();
        let passwd = temp.path().join("passwd");
        fs::write(
            &passwd,
            format!(
                "alice:x:1000:1000::{}:/bin/bash\nghost:x:1002:1002::{}:/bin/bash\n",
                home.display(),
                temp.path().join("ghost").display()
            ),
        )
        .unwrap();

        let accounts = seedable_accounts(&passwd).unwrap();

        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "alice");
    }

    #[test]
    fn test_home_of_falls_back_to_home_base() {
        let temp = TempDir::new().unwrap();
        let passwd = temp.path().join("passwd");
        fs::write(&passwd, PASSWD).unwrap();

        assert_eq!(home_of(&passwd, Path::new("/home"), "zoe"), PathBuf::from("/home/zoe"));
        assert_eq!(home_of(&passwd, Path::new("/srv/homes"), "bob"), PathBuf::from("/srv/homes/bob"));
        assert_eq!(
            home_of(&temp.path().join("missing"), Path::new("/h"), "zoe"),
            PathBuf::from("/h/zoe")
        );
    }
}
