//! Removable block device discovery

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;

use crate::error::CommandError;
use crate::infra::process::CommandRunner;

/// Default sysfs block device directory
pub const SYS_BLOCK: &str = "/sys/block";

/// A removable disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDevice {
    /// Device node (`/dev/sdb`)
    pub path: PathBuf,
    /// Kernel name (`sdb`)
    pub name: String,
    /// Human-readable size as reported by lsblk
    pub size: String,
    /// Model string
    pub model: String,
}

/// One row of `lsblk -d -n -o NAME,TYPE,SIZE,MODEL`
#[derive(Debug, Clone, PartialEq, Eq)]
struct LsblkRow {
    name: String,
    kind: String,
    size: Option<String>,
    model: Option<String>,
}

const LSBLK_ROW: &str = r"^\s*(\S+)\s+(\S+)(?:\s+(\S+))?(?:\s+(.+?))?\s*$";

fn parse_lsblk(output: &str) -> Vec<LsblkRow> {
    let Ok(re) = Regex::new(LSBLK_ROW) else {
        return Vec::new();
    };
    output
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            Some(LsblkRow {
                name: caps.get(1)?.as_str().to_string(),
                kind: caps.get(2)?.as_str().to_string(),
                size: caps.get(3).map(|m| m.as_str().to_string()),
                model: caps.get(4).map(|m| m.as_str().to_string()),
            })
        })
        .collect()
}

fn is_removable(sys_block: &Path, name: &str) -> bool {
    fs::read_to_string(sys_block.join(name).join("removable"))
        .map(|flag| flag.trim() == "1")
        .unwrap_or(false)
}

/// List removable whole disks
///
/// `sys_block` is normally [`SYS_BLOCK`].
pub fn removable_devices(
    runner: &dyn CommandRunner,
    sys_block: &Path,
) -> Result<Vec<BlockDevice>, CommandError> {
    let output = runner
        .run("lsblk", &["-d", "-n", "-o", "NAME,TYPE,SIZE,MODEL"])?
        .into_result("lsblk")?;

    Ok(parse_lsblk(&output.stdout)
        .into_iter()
        .filter(|row| row.kind == "disk" && is_removable(sys_block, &row.name))
        .map(|row| BlockDevice {
            path: PathBuf::from("/dev").join(&row.name),
            size: row.size.unwrap_or_else(|| "Unknown".to_string()),
            model: row.model.unwrap_or_else(|| "USB Device".to_string()),
            name: row.name,
        })
        .collect())
}

/// Mounted partitions of `device`, as listed by `lsblk -ln -o NAME,MOUNTPOINT`
pub fn mounted_partitions(runner: &dyn CommandRunner, device: &Path) -> Vec<PathBuf> {
    let device_str = device.to_string_lossy();
    let output = match runner.run("lsblk", &["-ln", "-o", "NAME,MOUNTPOINT", device_str.as_ref()]) {
        Ok(output) if output.success() => output,
        _ => return Vec::new(),
    };

    let device_name = device
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    output
        .stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            fields.next()?;
            (name != device_name).then(|| PathBuf::from("/dev").join(name))
        })
        .collect()
}
