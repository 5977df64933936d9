//! Host paths and profile layout

/// archiso's stock releng profile
pub const RELENG_PROFILE: &str = "/usr/share/archiso/configs/releng";

/// pacman's package cache
pub const PACMAN_CACHE: &str = "/var/cache/pacman/pkg";

/// Host pacman configuration
pub const HOST_PACMAN_CONF: &str = "/etc/pacman.conf";

/// Host NetworkManager configuration
pub const HOST_NETWORK_MANAGER: &str = "/etc/NetworkManager";

/// Host account database
pub const HOST_PASSWD: &str = "/etc/passwd";

/// Base of the host home directories, used when `/etc/passwd` is unreadable
pub const HOST_HOME: &str = "/home";

/// Package list inside a profile
pub const PACKAGES_FILE: &str = "packages.x86_64";

/// Profile definition inside a profile
pub const PROFILEDEF_FILE: &str = "profiledef.sh";

/// pacman configuration inside a profile
pub const PROFILE_PACMAN_CONF: &str = "pacman.conf";

/// Root filesystem overlay inside a profile
pub const AIROOTFS_DIR: &str = "airootfs";

/// Files a profile must contain before the build can continue
pub const CRITICAL_PROFILE_FILES: &[&str] = &[PROFILEDEF_FILE, PROFILE_PACMAN_CONF, AIROOTFS_DIR];

/// Local repository location inside the live root filesystem
pub const LOCAL_REPO_REL: &str = "opt/local-repo";

/// Local repository name registered in pacman.conf
pub const LOCAL_REPO_NAME: &str = "local-repo";

/// Directory exclusion list written next to the profile definition
pub const EXCLUDE_DIRS_FILE: &str = "exclude_dirs.txt";
