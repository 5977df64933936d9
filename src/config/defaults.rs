//! Default configuration values

/// Packages that must be present in every image, whatever the operator excludes
pub const REQUIRED_PACKAGES: &[&str] = &[
    "mkinitcpio",
    "mkinitcpio-archiso",
    "squashfs-tools",
    "linux",
    "linux-firmware",
    "base",
];

/// Packages needed for the live session to reach a graphical login
pub const SESSION_PACKAGES: &[&str] = &[
    "xorg-server",
    "gnome-shell",
    "gnome-session",
    "gdm",
    "networkmanager",
    "mesa",
];

/// Name fragments of distribution-specific packages (official-only mode)
pub const DISTRO_PACKAGE_PREFIXES: &[&str] = &["cachyos-", "garuda-", "endeavour-", "manjaro-"];

/// Package lists shorter than this are flagged as risky
pub const MIN_PACKAGE_COUNT: usize = 10;

/// Default image name prefix
pub const DEFAULT_IMAGE_NAME: &str = "custom-arch";

/// Default label prefix; the build month is appended
pub const DEFAULT_LABEL_PREFIX: &str = "ARCH_CUSTOM_";

/// Default publisher written into the profile definition
pub const DEFAULT_PUBLISHER: &str = "Custom Arch Linux";

/// Default application name written into the profile definition
pub const DEFAULT_APPLICATION: &str = "Custom Arch Linux Live/Install";

/// Default hostname of the live system
pub const DEFAULT_LIVE_HOSTNAME: &str = "archiso-live";

/// Default live user account
pub const DEFAULT_USERNAME: &str = "archuser";

/// Default live user password
pub const DEFAULT_USER_PASSWORD: &str = "archuser";

/// Default root password
pub const DEFAULT_ROOT_PASSWORD: &str = "root";

/// Default image builder command
pub const DEFAULT_BUILDER: &str = "mkarchiso";

/// Images at or below this size need a locatable squashfs payload (1 GiB)
pub const MIN_IMAGE_BYTES: u64 = 1024 * 1024 * 1024;

/// Payloads below this size are flagged as suspicious (0.1 GiB)
pub const MIN_PAYLOAD_BYTES: u64 = 1024 * 1024 * 1024 / 10;

/// Maximum age of an image that `--reuse-recent` will accept (24 hours)
pub const REUSE_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Literal the embedded installer requires before wiping a disk
pub const INSTALLER_CONFIRMATION: &str = "WIPE";

/// Installer defaults for the installed system
pub const INSTALL_HOSTNAME: &str = "arch-custom";
pub const INSTALL_TIMEZONE: &str = "America/Denver";
pub const INSTALL_LOCALE: &str = "en_US.UTF-8";

/// Default directory patterns excluded from the image
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    ".cache",
    "cache",
    ".local/share/Trash",
    "Downloads",
    "Downloads/*",
    "Templates",
    "Public",
    "Videos",
    "Music",
    ".mozilla/firefox/*/cache2",
    ".config/google-chrome/*/Cache",
    ".config/chromium/*/Cache",
    "snap",
    ".snap",
    ".docker",
    "docker",
    "VirtualBox VMs",
    ".VirtualBox",
    "tmp",
    "temp",
    ".tmp",
    "node_modules",
    "__pycache__",
    ".npm",
    ".yarn",
    ".gradle",
    ".m2",
    ".steam",
    ".local/share/Steam",
    "go/pkg",
    ".cargo/registry",
];

/// Patterns skipped when seeding the live user's home from a host account
pub const HOME_COPY_EXCLUDES: &[&str] = &[
    ".cache",
    ".local/share/Trash",
    "Downloads",
    ".mozilla/firefox/*/cache2",
    ".config/google-chrome/*/Cache",
    ".config/chromium/*/Cache",
    ".steam",
    ".local/share/Steam",
    "node_modules",
    ".npm",
    ".yarn",
];

/// Lowest UID considered a regular (seedable) host account
pub const MIN_REGULAR_UID: u32 = 1000;
