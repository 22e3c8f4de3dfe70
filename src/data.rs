//! Bundled, read-only data the command layer renders verbatim.
//!
//! Everything here is baked into the binary with `include_str!` at compile
//! time rather than read from disk at runtime — there is nothing to
//! invalidate, and `--help`/`--version` output must never depend on the
//! working directory the process happens to be launched from.

pub const LINUX_FS_LIST: &str = include_str!("../data/linux_fs_list.txt");
pub const DEFAULT_CONFIG_JSON: &str = include_str!("../data/default_config.json");
pub const IFCONFIG_TEMPLATE: &str = include_str!("../data/commands/ifconfig/output_template");

pub struct HelpVersion {
    pub help: &'static str,
    pub version: &'static str,
}

macro_rules! help_version {
    ($name:literal) => {
        HelpVersion {
            help: include_str!(concat!("../data/commands/", $name, "/help")),
            version: include_str!(concat!("../data/commands/", $name, "/version")),
        }
    };
}

pub const LS: HelpVersion = help_version!("ls");
pub const WGET: HelpVersion = help_version!("wget");
pub const PING: HelpVersion = help_version!("ping");
pub const IFCONFIG: HelpVersion = help_version!("ifconfig");
pub const UNAME: HelpVersion = help_version!("uname");
