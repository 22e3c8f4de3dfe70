//! Per-utility command implementations.
//!
//! Simple commands (`echo`, `pwd`, `cd`, `ls`, `ifconfig`, `uname`) are
//! synchronous: they read and mutate one [`VirtualHost`] and return the
//! text to print. `ping` and `wget` are long-running and stream their own
//! output on a cooperative task with access to the shell's interrupt flag,
//! so they live outside this trait (see [`ping`] and [`wget`]) and are
//! special-cased by the shell's dispatcher instead of going through the
//! registry.

pub mod cd;
pub mod echo;
pub mod ifconfig;
pub mod ls;
pub mod ping;
pub mod pwd;
pub mod uname;
pub mod wget;

use std::collections::HashMap;

use crate::data::HelpVersion;
use crate::host::VirtualHost;

/// A self-contained argument parser plus output generator for one
/// emulated utility, dispatched by name from the command registry.
pub trait Command: Send + Sync {
    fn run(&self, host: &mut VirtualHost, params: &[String]) -> String;
}

/// If `params` contains `--help`/`-h` or `--version`/`-V`, return the
/// matching canned text verbatim; every command checks this first, per
/// spec §4.3.
pub fn help_or_version(params: &[String], hv: &HelpVersion) -> Option<String> {
    for p in params {
        match p.as_str() {
            "--help" | "-h" => return Some(hv.help.trim_end_matches('\n').to_string()),
            "--version" | "-V" => return Some(hv.version.trim_end_matches('\n').to_string()),
            _ => {}
        }
    }
    None
}

/// Build the name → implementation table for the commands dispatched
/// synchronously through [`Command::run`]. `ping`/`wget` are not in this
/// table; the shell recognizes them before consulting it.
pub fn registry() -> HashMap<&'static str, Box<dyn Command>> {
    let mut m: HashMap<&'static str, Box<dyn Command>> = HashMap::new();
    m.insert("echo", Box::new(echo::Echo));
    m.insert("pwd", Box::new(pwd::Pwd));
    m.insert("cd", Box::new(cd::Cd));
    m.insert("ls", Box::new(ls::Ls));
    m.insert("ifconfig", Box::new(ifconfig::Ifconfig));
    m.insert("uname", Box::new(uname::Uname));
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data;

    #[test]
    fn help_flag_short_circuits() {
        let out = help_or_version(&["--help".to_string()], &data::LS).unwrap();
        assert_eq!(out, data::LS.help.trim_end_matches('\n'));
    }

    #[test]
    fn version_flag_short_circuits() {
        let out = help_or_version(&["-V".to_string()], &data::UNAME).unwrap();
        assert_eq!(out, data::UNAME.version.trim_end_matches('\n'));
    }

    #[test]
    fn no_flag_returns_none() {
        assert!(help_or_version(&["foo".to_string()], &data::LS).is_none());
    }

    #[test]
    fn registry_has_six_synchronous_commands() {
        assert_eq!(registry().len(), 6);
    }
}
