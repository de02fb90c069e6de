//! Operating system family of the pool nodes.
//!
//! The provisioner and the task fan-out must agree on where the shared file
//! share is mounted on the node and how it is bound into each container.
//! Both read the convention from here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Operating system family of the pool nodes and task containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    #[default]
    Linux,
    Windows,
}

impl OsFamily {
    /// Relative mount path of the shared file share on each node.
    pub fn mount_path(&self) -> &'static str {
        match self {
            Self::Linux => "azfileshare",
            Self::Windows => "S",
        }
    }

    /// Container run option selecting the working directory.
    pub fn workdir_option(&self, workdir: &str) -> String {
        match self {
            Self::Linux => format!("--workdir /{workdir}/"),
            Self::Windows => format!("-w C:\\{workdir}\\"),
        }
    }

    /// Container run option binding the node's file share into the
    /// container's `logs` directory under `workdir`.
    pub fn bind_mount_option(&self, workdir: &str) -> String {
        match self {
            Self::Linux => format!("--volume /{}/:/{workdir}/logs", self.mount_path()),
            Self::Windows => format!("--volume {}:\\:C:\\{workdir}\\logs", self.mount_path()),
        }
    }

    /// Full container run options for a task.
    pub fn container_run_options(&self, workdir: &str, with_mount: bool) -> String {
        let mut opts = self.workdir_option(workdir);
        if with_mount {
            opts.push(' ');
            opts.push_str(&self.bind_mount_option(workdir));
        }
        opts
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsFamily {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('\'').to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            other => Err(CoreError::UnknownPlatform(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_run_options() {
        let os = OsFamily::Linux;
        assert_eq!(os.container_run_options("src", false), "--workdir /src/");
        assert_eq!(
            os.container_run_options("src", true),
            "--workdir /src/ --volume /azfileshare/:/src/logs"
        );
    }

    #[test]
    fn test_windows_run_options() {
        let os = OsFamily::Windows;
        assert_eq!(os.container_run_options("sim", false), "-w C:\\sim\\");
        assert_eq!(
            os.container_run_options("sim", true),
            "-w C:\\sim\\ --volume S:\\:C:\\sim\\logs"
        );
    }

    #[test]
    fn test_parse_platform() {
        assert_eq!("Windows".parse::<OsFamily>().unwrap(), OsFamily::Windows);
        assert_eq!("'linux'".parse::<OsFamily>().unwrap(), OsFamily::Linux);
        assert!("macos".parse::<OsFamily>().is_err());
    }
}
