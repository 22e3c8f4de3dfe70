use super::Command;
use crate::host::VirtualHost;

/// `pwd` — no params prints the current working path; any params is an
/// error, per spec §4.3.
pub struct Pwd;

impl Command for Pwd {
    fn run(&self, host: &mut VirtualHost, params: &[String]) -> String {
        if !params.is_empty() {
            return "pwd: too many arguments".to_string();
        }
        host.working_path.clone()
    }
}
