//! Generated shell scripts
//!
//! Every script is rendered from its inputs alone, so identical inputs give
//! byte-identical files. Values are embedded with [`shell_quote`].

use crate::config::defaults::{INSTALLER_CONFIRMATION, INSTALL_HOSTNAME, INSTALL_LOCALE, INSTALL_TIMEZONE};
use crate::core::build_config::UserConfig;

/// Quote a value as a single-quoted shell word
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Directory under `/etc/skel` holding the seeded home of `username`
pub fn skel_dir_name(username: &str) -> String {
    format!("user_{username}")
}

/// `root/setup_user.sh`: root password, live user creation and wheel membership
pub fn setup_user_script(user: &UserConfig) -> String {
    let mut script = String::from("#!/bin/bash\n# Live user provisioning\n");
    script.push_str(&format!("USERNAME={}\n", shell_quote(&user.username)));
    script.push_str(&format!("USER_PASSWORD={}\n", shell_quote(&user.password)));
    script.push_str(&format!("ROOT_PASSWORD={}\n", shell_quote(&user.root_password)));
    if let Some(source) = &user.copy_from {
        script.push_str(&format!("SOURCE_USER={}\n", shell_quote(source)));
    }
    script.push_str(
        r#"
echo "root:$ROOT_PASSWORD" | chpasswd

if ! id -u "$USERNAME" &>/dev/null; then
    useradd -m -s /bin/bash "$USERNAME"
fi
echo "$USERNAME:$USER_PASSWORD" | chpasswd
usermod -aG wheel "$USERNAME"

"#,
    );
    if user.copy_from.is_some() {
        script.push_str("echo \"User $USERNAME configured from $SOURCE_USER\"\n");
    } else {
        script.push_str("echo \"User $USERNAME created with blank template\"\n");
    }
    script
}

/// `root/restore_user_home.sh`: copy the seeded home into place
///
/// Does nothing unless both the seeded copy and the user's home exist.
pub fn restore_home_script(username: &str) -> String {
    format!(
        r#"#!/bin/bash
# Restore the live user's home from the seeded copy
USERNAME={user}
SOURCE_DIR={source}
DEST_HOME="/home/$USERNAME"

if [ -d "$SOURCE_DIR" ] && [ -d "$DEST_HOME" ]; then
    rsync -a "$SOURCE_DIR/" "$DEST_HOME/"
    chown -R "$USERNAME:$USERNAME" "$DEST_HOME"
    echo "User home directory restored for $USERNAME"
fi
"#,
        user = shell_quote(username),
        source = shell_quote(&format!("/etc/skel/{}", skel_dir_name(username))),
    )
}

/// One independently failing step of the first-boot customization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestEffortStep {
    /// Step name, used for the shell function and failure message
    pub name: &'static str,
    /// Commands chained with `&&`; the first failure fails the step
    pub commands: Vec<String>,
}

impl BestEffortStep {
    fn new(name: &'static str, commands: &[&str]) -> Self {
        Self {
            name,
            commands: commands.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    fn function_name(&self) -> String {
        format!("step_{}", self.name.replace('-', "_"))
    }

    fn render(&self) -> String {
        let body = self
            .commands
            .iter()
            .map(|c| indent(c))
            .collect::<Vec<_>>()
            .join(" &&\n");
        format!("{}() {{\n{body}\n}}\n", self.function_name())
    }

    fn render_call(&self) -> String {
        format!(
            "if ! {}; then\n    echo \"[customize_airootfs] {} failed, continuing\" >&2\nfi\n",
            self.function_name(),
            self.name
        )
    }
}

fn indent(block: &str) -> String {
    block
        .lines()
        .map(|line| if line.is_empty() { String::new() } else { format!("    {line}") })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Steps of `root/customize_airootfs.sh`, in execution order
pub fn customization_steps(user: &UserConfig) -> Vec<BestEffortStep> {
    let mut steps = vec![BestEffortStep::new("provision-user", &["/root/setup_user.sh"])];

    if user.copy_from.is_some() {
        steps.push(BestEffortStep::new("restore-home", &["/root/restore_user_home.sh"]));
    }

    steps.push(BestEffortStep::new(
        "enable-wheel-sudo",
        &["sed -i 's/^# %wheel ALL=(ALL:ALL) ALL/%wheel ALL=(ALL:ALL) ALL/' /etc/sudoers"],
    ));
    steps.push(BestEffortStep::new(
        "enable-networkmanager",
        &["systemctl enable NetworkManager.service"],
    ));
    steps.push(BestEffortStep::new(
        "enable-display-manager",
        &["if pacman -Qq gdm &>/dev/null; then\n    systemctl enable gdm.service\nfi"],
    ));

    if user.autologin {
        steps.push(BestEffortStep {
            name: "gdm-autologin",
            commands: vec![format!(
                "if pacman -Qq gdm &>/dev/null; then\n    mkdir -p /etc/gdm &&\n    printf '%s\\n' {} > /etc/gdm/custom.conf\nfi",
                gdm_custom_conf(&user.username)
                    .lines()
                    .map(shell_quote)
                    .collect::<Vec<_>>()
                    .join(" ")
            )],
        });
    }

    steps.push(BestEffortStep::new(
        "graphical-target",
        &["ln -sf /usr/lib/systemd/system/graphical.target /etc/systemd/system/default.target"],
    ));
    steps
}

fn gdm_custom_conf(username: &str) -> String {
    format!(
        "[daemon]\nAutomaticLoginEnable=True\nAutomaticLogin={username}\n\n[security]\n\n[xdmcp]\n\n[chooser]\n\n[debug]\n"
    )
}

/// `root/customize_airootfs.sh`, run by the image builder inside the root
/// filesystem
///
/// No `set -e`: a failed step is reported and the next one still runs.
pub fn customize_airootfs_script(user: &UserConfig) -> String {
    let steps = customization_steps(user);
    let mut script = String::from(
        "#!/bin/bash\n# First-boot customization of the live system\n\necho \"[customize_airootfs] running...\"\n\n",
    );
    for step in &steps {
        script.push_str(&step.render());
        script.push('\n');
    }
    for step in &steps {
        script.push_str(&step.render_call());
    }
    script.push_str("\necho \"[customize_airootfs] done.\"\n");
    script
}

/// States of the embedded installer
///
/// The installer walks these in order. Only the confirmation phase can end
/// the run early without an error, and every phase that touches the disk
/// comes after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallerPhase {
    /// Show the available disks
    Idle,
    /// Read and validate the target disk
    DeviceChosen,
    /// Require the confirmation literal; abort leaves the disk untouched
    ConfirmationPending,
    /// Write a GPT with an EFI and a root partition
    Partitioning,
    /// Create the filesystems
    Formatting,
    /// Mount the new filesystems under `/mnt`
    Mounting,
    /// pacstrap the package list and write fstab
    Installing,
    /// Configure the installed system in a chroot
    Configuring,
    /// Install systemd-boot and its entries
    BootloaderWritten,
    /// Unmount and finish
    Done,
}

impl InstallerPhase {
    /// All phases in execution order
    pub const SEQUENCE: [Self; 10] = [
        Self::Idle,
        Self::DeviceChosen,
        Self::ConfirmationPending,
        Self::Partitioning,
        Self::Formatting,
        Self::Mounting,
        Self::Installing,
        Self::Configuring,
        Self::BootloaderWritten,
        Self::Done,
    ];

    /// The phase that follows this one on the non-abort path
    pub fn next(self) -> Option<Self> {
        let idx = Self::SEQUENCE.iter().position(|p| *p == self)?;
        Self::SEQUENCE.get(idx + 1).copied()
    }

    /// Whether the phase modifies the target disk
    pub fn is_destructive(self) -> bool {
        !matches!(self, Self::Idle | Self::DeviceChosen | Self::ConfirmationPending)
    }

    /// Shell function implementing the phase
    pub fn function_name(self) -> &'static str {
        match self {
            Self::Idle => "phase_idle",
            Self::DeviceChosen => "phase_device_chosen",
            Self::ConfirmationPending => "phase_confirmation_pending",
            Self::Partitioning => "phase_partitioning",
            Self::Formatting => "phase_formatting",
            Self::Mounting => "phase_mounting",
            Self::Installing => "phase_installing",
            Self::Configuring => "phase_configuring",
            Self::BootloaderWritten => "phase_bootloader",
            Self::Done => "phase_done",
        }
    }

    fn body(self, autologin: bool) -> String {
        match self {
            Self::Idle => PHASE_IDLE.to_string(),
            Self::DeviceChosen => PHASE_DEVICE_CHOSEN.to_string(),
            Self::ConfirmationPending => PHASE_CONFIRMATION.to_string(),
            Self::Partitioning => PHASE_PARTITIONING.to_string(),
            Self::Formatting => PHASE_FORMATTING.to_string(),
            Self::Mounting => PHASE_MOUNTING.to_string(),
            Self::Installing => PHASE_INSTALLING.to_string(),
            Self::Configuring => {
                let gdm = if autologin { CHROOT_GDM_AUTOLOGIN } else { CHROOT_GDM };
                format!("{PHASE_CONFIGURING_HEAD}{CHROOT_COMMON}{gdm}CHROOT\n")
            }
            Self::BootloaderWritten => PHASE_BOOTLOADER.to_string(),
            Self::Done => PHASE_DONE.to_string(),
        }
    }
}

const PHASE_IDLE: &str = r#"    echo "========================================"
    echo "  Custom Arch Installer (UEFI, GPT)"
    echo "========================================"
    echo
    lsblk -dpno NAME,SIZE,MODEL | sed 's/^/  /'
    echo
"#;

const PHASE_DEVICE_CHOSEN: &str = r#"    read -r -p "Install to which disk (e.g. /dev/nvme0n1 or /dev/sda)? " DISK
    if [[ ! -b "$DISK" ]]; then
        echo "ERROR: $DISK is not a block device"
        exit 1
    fi
    if [[ ! -d /sys/firmware/efi/efivars ]]; then
        echo "ERROR: this installer expects UEFI boot (no /sys/firmware/efi/efivars)"
        exit 1
    fi
"#;

const PHASE_CONFIRMATION: &str = r#"    local answer
    echo
    echo "ABOUT TO WIPE: $DISK"
    read -r -p "Type $CONFIRMATION to confirm: " answer
    if [[ "$answer" != "$CONFIRMATION" ]]; then
        echo "Cancelled. $DISK was not modified."
        exit 0
    fi
"#;

const PHASE_PARTITIONING: &str = r#"    echo "[1/6] Partitioning..."
    sgdisk --zap-all "$DISK"
    sgdisk -n 1:0:+512M -t 1:ef00 -c 1:EFI "$DISK"
    sgdisk -n 2:0:0 -t 2:8300 -c 2:ROOT "$DISK"
    partprobe "$DISK"
    sleep 2
    EFI_PART="${DISK}1"
    ROOT_PART="${DISK}2"
    if [[ "$DISK" =~ nvme|mmcblk ]]; then
        EFI_PART="${DISK}p1"
        ROOT_PART="${DISK}p2"
    fi
"#;

const PHASE_FORMATTING: &str = r#"    echo "[2/6] Formatting..."
    mkfs.fat -F32 "$EFI_PART"
    mkfs.ext4 -F "$ROOT_PART"
"#;

const PHASE_MOUNTING: &str = r#"    echo "[3/6] Mounting..."
    mount "$ROOT_PART" /mnt
    mkdir -p /mnt/boot
    mount "$EFI_PART" /mnt/boot
"#;

const PHASE_INSTALLING: &str = r#"    echo "[4/6] Installing packages..."
    if [[ -f "$PKGLIST" ]]; then
        local packages
        mapfile -t packages < <(grep -v -e '^[[:space:]]*#' -e '^[[:space:]]*$' "$PKGLIST")
        pacstrap -K -C /etc/pacman.conf /mnt "${packages[@]}"
    else
        echo "WARN: $PKGLIST not found; installing minimal base only."
        pacstrap -K /mnt base linux linux-firmware networkmanager
    fi
    genfstab -U /mnt >> /mnt/etc/fstab
"#;

const CHROOT_COMMON: &str = r#"set -euo pipefail
ISO_USER="$1"
USER_PASSWORD="$2"
ROOT_PASSWORD="$3"
TARGET_HOSTNAME="$4"
TIMEZONE="$5"
LOCALE="$6"

echo "root:$ROOT_PASSWORD" | chpasswd

ln -sf "/usr/share/zoneinfo/$TIMEZONE" /etc/localtime
hwclock --systohc

sed -i "s/^#$LOCALE/$LOCALE/" /etc/locale.gen || true
locale-gen
echo "LANG=$LOCALE" > /etc/locale.conf

echo "$TARGET_HOSTNAME" > /etc/hostname
cat > /etc/hosts <<EOF
127.0.0.1   localhost
::1         localhost
127.0.1.1   $TARGET_HOSTNAME.localdomain $TARGET_HOSTNAME
EOF

useradd -m -s /bin/bash "$ISO_USER" || true
echo "$ISO_USER:$USER_PASSWORD" | chpasswd
usermod -aG wheel "$ISO_USER"
sed -i 's/^# %wheel ALL=(ALL:ALL) ALL/%wheel ALL=(ALL:ALL) ALL/' /etc/sudoers || true

systemctl enable NetworkManager.service || true
"#;

const PHASE_CONFIGURING_HEAD: &str = r#"    echo "[5/6] Configuring system..."
    arch-chroot /mnt /bin/bash -s -- "$ISO_USER" "$USER_PASSWORD" "$ROOT_PASSWORD" \
        "$TARGET_HOSTNAME" "$TIMEZONE" "$LOCALE" <<'CHROOT'
"#;

const CHROOT_GDM: &str = r#"if pacman -Qq gdm &>/dev/null; then
    systemctl enable gdm.service || true
fi
"#;

const CHROOT_GDM_AUTOLOGIN: &str = r#"if pacman -Qq gdm &>/dev/null; then
    systemctl enable gdm.service || true
    mkdir -p /etc/gdm
    cat > /etc/gdm/custom.conf <<EOF
[daemon]
AutomaticLoginEnable=True
AutomaticLogin=$ISO_USER
EOF
fi
"#;

const PHASE_BOOTLOADER: &str = r#"    echo "[6/6] Installing bootloader..."
    local root_uuid
    root_uuid=$(blkid -s UUID -o value "$ROOT_PART")
    arch-chroot /mnt bootctl install
    mkdir -p /mnt/boot/loader/entries
    cat > /mnt/boot/loader/loader.conf <<EOF
default arch
timeout 3
editor  0
EOF
    cat > /mnt/boot/loader/entries/arch.conf <<EOF
title   Arch Linux (Custom)
linux   /vmlinuz-linux
initrd  /initramfs-linux.img
options root=UUID=$root_uuid rw
EOF
"#;

const PHASE_DONE: &str = r#"    umount -R /mnt
    echo "Installation complete. Reboot when ready."
"#;

/// `root/install.sh`: UEFI installer for the running live system
pub fn installer_script(user: &UserConfig) -> String {
    let mut script = String::from(
        "#!/bin/bash\nset -euo pipefail\n\n# Custom Arch installer (UEFI, GPT, EFI + root)\n# WARNING: this wipes the selected disk.\n\n",
    );
    for (key, value) in [
        ("ISO_USER", user.username.as_str()),
        ("USER_PASSWORD", user.password.as_str()),
        ("ROOT_PASSWORD", user.root_password.as_str()),
        ("TARGET_HOSTNAME", INSTALL_HOSTNAME),
        ("TIMEZONE", INSTALL_TIMEZONE),
        ("LOCALE", INSTALL_LOCALE),
        ("CONFIRMATION", INSTALLER_CONFIRMATION),
        ("PKGLIST", "/root/pkglist.txt"),
    ] {
        script.push_str(&format!("{key}={}\n", shell_quote(value)));
    }
    script.push_str("\nDISK=\"\"\nEFI_PART=\"\"\nROOT_PART=\"\"\n\n");

    for phase in InstallerPhase::SEQUENCE {
        script.push_str(&format!(
            "{}() {{\n{}}}\n\n",
            phase.function_name(),
            phase.body(user.autologin)
        ));
    }
    for phase in InstallerPhase::SEQUENCE {
        script.push_str(phase.function_name());
        script.push('\n');
    }
    script
}
