/*!
 * Child Process Setup
 * Prepares a `Command` for launching a sibling process
 */

use super::temp::temp_folder;
use crate::core::errors::{IpcError, IpcResult};
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

/// Variables pointed at the private temp folder
pub const TEMP_VARS: &[&str] = &["TEMP", "TMP", "TMPDIR", "HOME", "USERPROFILE", "HOMEPATH"];

/// Variables that could change how a child tool behaves
pub const SCRUBBED_VARS: &[&str] = &[
    "WGETRC",
    "SYSTEM_WGETRC",
    "HTTP_PROXY",
    "FTP_PROXY",
    "NO_PROXY",
    "GNUPGHOME",
    "LC_ALL",
    "LC_COLLATE",
    "LC_CTYPE",
    "LC_MESSAGES",
    "LC_MONETARY",
    "LC_NUMERIC",
    "LC_TIME",
    "LANG",
];

/// Scrub proxy/locale variables, optionally redirect temp and home
/// variables to the private temp folder, put that folder first on `PATH`,
/// and set the working directory
pub fn init_process(command: &mut Command, working_dir: &Path, replace_temp: bool) -> IpcResult<()> {
    for name in SCRUBBED_VARS {
        command.env_remove(name);
        command.env_remove(name.to_ascii_lowercase());
    }

    let temp = temp_folder()?;
    if replace_temp {
        for name in TEMP_VARS {
            command.env(name, &temp);
        }
    }

    let mut paths = vec![temp.clone()];
    if let Some(existing) = std::env::var_os("PATH").filter(|p| !p.is_empty()) {
        paths.extend(std::env::split_paths(&existing));
    }
    let path: OsString = std::env::join_paths(paths)
        .map_err(|e| IpcError::os("join PATH", &temp.display().to_string(), e))?;
    command.env("PATH", path);

    command.current_dir(working_dir);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::ffi::OsStr;

    fn env_of<'a>(command: &'a Command, name: &str) -> Option<Option<&'a OsStr>> {
        command
            .get_envs()
            .find(|(key, _)| *key == OsStr::new(name))
            .map(|(_, value)| value)
    }

    #[test]
    #[serial]
    fn test_init_process_rewrites_environment() {
        let mut command = Command::new("true");
        let dir = std::env::temp_dir();
        init_process(&mut command, &dir, true).unwrap();
        let temp = temp_folder().unwrap();

        assert_eq!(env_of(&command, "LANG"), Some(None));
        assert_eq!(env_of(&command, "http_proxy"), Some(None));
        assert_eq!(env_of(&command, "TMPDIR"), Some(Some(temp.as_os_str())));
        let path = env_of(&command, "PATH").flatten().unwrap();
        assert_eq!(std::env::split_paths(path).next().unwrap(), temp);
        assert_eq!(command.get_current_dir(), Some(dir.as_path()));
    }

    #[test]
    #[serial]
    fn test_init_process_keeps_temp_when_asked() {
        let mut command = Command::new("true");
        init_process(&mut command, Path::new("."), false).unwrap();
        assert_eq!(env_of(&command, "TMPDIR"), None);
    }
}
