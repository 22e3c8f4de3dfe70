use super::Command;
use crate::host::VirtualHost;

/// `cd` — no params resets to `/`; one param is normalized against the
/// working path and confined to the sandbox root, falling back to `/` on
/// back-reference escape rather than erroring, per spec §4.3/§7.
pub struct Cd;

impl Command for Cd {
    fn run(&self, host: &mut VirtualHost, params: &[String]) -> String {
        if params.is_empty() {
            host.working_path = "/".to_string();
            return String::new();
        }

        let target = &params[0];
        let (virt_path, host_path) = host.fs.normalize_or_root(&host.working_path, target);
        if !host_path.is_dir() {
            return format!("cd: {}: No such file or directory", target);
        }
        host.working_path = virt_path;
        String::new()
    }
}
