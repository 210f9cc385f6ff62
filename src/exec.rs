//! Running external programs.

use std::{path::Path, process::Command};

use tracing::{debug, info};

use crate::errors::DtExtractErr;

/// Build a command, optionally prefixed by a wrapper such as `srun -n 1`.
pub(crate) fn command_with_wrapper(wrapper: Option<&str>, program: &str) -> Command {
    let mut words = wrapper
        .map(|w| w.split_whitespace().collect::<Vec<_>>())
        .unwrap_or_default();
    words.push(program);

    let mut cmd = Command::new(words[0]);
    cmd.args(&words[1..]);
    cmd
}

/// Run a command to completion, failing if it does not exit successfully.
pub(crate) fn run(cmd: &mut Command) -> Result<(), DtExtractErr> {
    let command = describe(cmd);
    debug!("executing {}", command);

    let status = cmd.status()?;
    if status.success() {
        info!("{} completed with status {}", command, status);
        Ok(())
    } else {
        Err(DtExtractErr::CommandFailed {
            command,
            code: status.code(),
        })
    }
}

/// Create a directory and its parents. With a group, the new directory is handed to it and
/// marked set-group-ID so files created inside inherit the group.
pub(crate) fn make_dirs(path: &Path, unix_group: Option<&str>) -> Result<(), DtExtractErr> {
    std::fs::create_dir_all(path)?;

    if let Some(group) = unix_group {
        run(Command::new("chgrp").arg(group).arg(path))?;
        run(Command::new("chmod").arg("g+s").arg(path))?;
    }

    Ok(())
}

fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;

    use tempdir::TempDir;

    #[test]
    fn test_wrapper() {
        let cmd = command_with_wrapper(Some("srun -n 1"), "mars");
        assert_eq!(describe(&cmd), "srun -n 1 mars");

        let cmd = command_with_wrapper(None, "mars");
        assert_eq!(describe(&cmd), "mars");

        let cmd = command_with_wrapper(Some("   "), "mars");
        assert_eq!(describe(&cmd), "mars");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_status() {
        assert!(run(&mut Command::new("true")).is_ok());

        match run(&mut Command::new("false")) {
            Err(DtExtractErr::CommandFailed { command, code }) => {
                assert_eq!(command, "false");
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(matches!(
            run(&mut Command::new("surely-not-a-real-program-name")),
            Err(DtExtractErr::IO(_))
        ));
    }

    #[test]
    fn test_make_dirs() {
        let tmp = TempDir::new("dt-extract-exec").unwrap();
        let path = tmp.path().join("a").join("b");

        make_dirs(&path, None).unwrap();
        assert!(path.is_dir());

        // Existing directories are fine.
        make_dirs(&path, None).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_make_dirs_unknown_group() {
        let tmp = TempDir::new("dt-extract-exec").unwrap();
        let path = tmp.path().join("grouped");

        match make_dirs(&path, Some("surely-not-a-real-group-name")) {
            Err(DtExtractErr::CommandFailed { command, .. }) => {
                assert!(command.starts_with("chgrp surely-not-a-real-group-name"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(path.is_dir());
    }
}
