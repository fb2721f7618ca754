//! Filesystem creation on freshly created partitions.

use super::spec::FsType;
use crate::process::Cmd;

const EXT2_FEATURES: &str = "none,sparse_super,large_file,filetype,resize_inode,dir_index,ext_attr";
const EXT3_FEATURES: &str =
    "none,sparse_super,large_file,filetype,resize_inode,dir_index,ext_attr,has_journal";
const EXT4_FEATURES: &str = "none,sparse_super,large_file,filetype,resize_inode,dir_index,ext_attr,\
has_journal,extent,huge_file,flex_bg,metadata_csum,64bit,dir_nlink,extra_isize";

/// Command that writes a fresh `fs` onto `device`.
///
/// For swap this only writes the signature; see [`swapon_cmd`].
pub fn format_cmd(device: &str, fs: FsType) -> Cmd {
    let cmd = match fs {
        FsType::Fat32 | FsType::Fat16 | FsType::Vfat => {
            Cmd::new("mkfs").args(["-t", "vfat", device])
        }
        FsType::Ext2 => ext_cmd(device, "ext2", EXT2_FEATURES),
        FsType::Ext3 => ext_cmd(device, "ext3", EXT3_FEATURES),
        FsType::Ext4 => ext_cmd(device, "ext4", EXT4_FEATURES),
        FsType::Xfs => Cmd::new("mkfs").args(["-t", "xfs", "-f", device]),
        FsType::LinuxSwap => Cmd::new("mkswap").arg(device),
    };
    cmd.error_msg(format!("failed to format {} as {}", device, fs))
}

pub fn swapon_cmd(device: &str) -> Cmd {
    Cmd::new("swapon")
        .arg(device)
        .error_msg(format!("failed to activate swap on {}", device))
}

fn ext_cmd(device: &str, fs: &str, features: &str) -> Cmd {
    Cmd::new("mkfs")
        .args(["-t", fs, "-b", "4096", "-O", features, device])
}
